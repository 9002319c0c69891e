//! Request extractors shared by the API handlers.

use axum::extract::{FromRequest, Request, rejection::JsonRejection};
use serde::Deserialize;
use serde::de::DeserializeOwned;

use mercato_core::UserId;

use crate::error::AppError;
use crate::models::CurrentUser;

/// `axum::Json` whose rejections are `{"message": ...}` bodies.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// Request bodies larger than this are rejected.
const BODY_LIMIT: usize = 2 * 1024 * 1024;

/// A JSON body that may be left out entirely.
///
/// An empty (or whitespace) body stands for `T::default()`. Anything else
/// must be valid JSON for `T`, whatever the `Content-Type`.
#[derive(Debug)]
pub struct OptionalJson<T>(pub T);

impl<S, T> FromRequest<S> for OptionalJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Default + Send,
{
    type Rejection = AppError;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let bytes = axum::body::to_bytes(req.into_body(), BODY_LIMIT)
            .await
            .map_err(|err| AppError::BadRequest(format!("Failed to read request body: {err}")))?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self(T::default()));
        }

        let axum::Json(value) = axum::Json::<T>::from_bytes(&bytes)?;
        Ok(Self(value))
    }
}

/// A body that may name the user it acts for.
///
/// Older clients send `userId` with every cart call; it must match the
/// logged-in user.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserScoped {
    #[serde(default)]
    pub user_id: Option<UserId>,
}

/// The user a request acts for: the session user, provided any claimed id matches.
///
/// # Errors
///
/// Returns `AppError::Forbidden` when `claimed` names someone else.
pub fn acting_user(user: &CurrentUser, claimed: Option<UserId>) -> Result<UserId, AppError> {
    match claimed {
        Some(id) if id != user.id => {
            tracing::warn!(session_user = %user.id, claimed = %id, "User id mismatch");
            Err(AppError::Forbidden(
                "Cannot act on another user's cart".to_string(),
            ))
        }
        _ => Ok(user.id),
    }
}
