//! Session authentication extractors.
//!
//! Signup and login put a [`CurrentUser`] into the session; these extractors
//! read it back for handlers that need a logged-in shopper.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::{CurrentUser, session_keys};

/// Extractor that requires a logged-in user.
///
/// Rejects with `401 {"message": "Please log in"}` otherwise.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.email)
/// }
/// ```
pub struct RequireUser(pub CurrentUser);

impl<S> FromRequestParts<S> for RequireUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // Set by SessionManagerLayer
        let session = parts
            .extensions
            .get::<Session>()
            .ok_or_else(|| AppError::Internal("session layer missing".to_string()))?;

        let user: CurrentUser = session
            .get(session_keys::CURRENT_USER)
            .await
            .ok()
            .flatten()
            .ok_or_else(|| AppError::Unauthorized("Please log in".to_string()))?;

        tracing::Span::current().record("user_id", user.id.as_i32());
        Ok(Self(user))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireUser`, this does not reject the request if nobody is logged in.
pub struct OptionalUser(pub Option<CurrentUser>);

impl<S> FromRequestParts<S> for OptionalUser
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = match parts.extensions.get::<Session>() {
            Some(session) => session
                .get::<CurrentUser>(session_keys::CURRENT_USER)
                .await
                .ok()
                .flatten(),
            None => None,
        };

        Ok(Self(user))
    }
}

/// Log a user in on this session.
///
/// The session id is cycled first so a pre-login id cannot be reused.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn set_current_user(
    session: &Session,
    user: &CurrentUser,
) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(session_keys::CURRENT_USER, user).await
}

/// Log out: drop everything stored on this session.
///
/// # Errors
///
/// Returns an error if the session cannot be modified.
pub async fn clear_current_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
