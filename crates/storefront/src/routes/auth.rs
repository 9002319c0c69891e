//! Auth route handlers.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_sessions::Session;
use tracing::instrument;

use mercato_core::UserId;

use super::extract::ApiJson;
use crate::error::{Result, ResultExt, clear_sentry_user, set_sentry_user};
use crate::middleware::{OptionalUser, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::state::AppState;

/// Signup and login body.
#[derive(Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub message: &'static str,
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub is_logged_in: bool,
    pub user_id: Option<UserId>,
}

async fn start_session(session: &Session, user: &User) -> Result<()> {
    set_current_user(
        session,
        &CurrentUser {
            id: user.id,
            email: user.email.clone(),
        },
    )
    .await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(())
}

/// Create an account and log it in.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn signup(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<Credentials>,
) -> Result<impl IntoResponse> {
    let user = state
        .auth()
        .signup(&body.email, &body.password)
        .await
        .context("Error creating user")?;

    start_session(&session, &user)
        .await
        .context("Error creating user")?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully",
            user_id: user.id,
        }),
    ))
}

/// Log in with email and password.
#[instrument(skip(state, session, body), fields(email = %body.email))]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(body): ApiJson<Credentials>,
) -> Result<Json<AuthResponse>> {
    let user = state
        .auth()
        .login(&body.email, &body.password)
        .await
        .context("Error logging in")?;

    start_session(&session, &user)
        .await
        .context("Error logging in")?;

    Ok(Json(AuthResponse {
        message: "Login successful",
        user_id: user.id,
    }))
}

/// Log out and forget the checkout state.
#[instrument(skip(session))]
pub async fn logout(session: Session) -> Result<Json<serde_json::Value>> {
    clear_current_user(&session)
        .await
        .context("Error logging out")?;
    clear_sentry_user();
    Ok(Json(json!({ "message": "Logged out" })))
}

/// Who is logged in on this session.
pub async fn session_status(OptionalUser(user): OptionalUser) -> Json<SessionResponse> {
    Json(SessionResponse {
        is_logged_in: user.is_some(),
        user_id: user.map(|u| u.id),
    })
}
