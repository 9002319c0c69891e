//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers return `Result<T, AppError>`.
//!
//! Error bodies are always `{"message": "..."}`. Server-side failures never
//! leak their cause: the client sees the operation's context message (for
//! example "Error adding to cart") or a generic one.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use mercato_core::CartError;

use crate::catalog::CatalogError;
use crate::db::RepositoryError;
use crate::services::auth::AuthError;
use crate::services::cart::CartServiceError;
use crate::services::checkout::CheckoutServiceError;
use crate::services::payments::PaymentError;

const INTERNAL_MESSAGE: &str = "Internal server error";

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Cart operation failed.
    #[error("Cart error: {0}")]
    Cart(#[from] CartServiceError),

    /// Checkout operation failed.
    #[error("Checkout error: {0}")]
    Checkout(#[from] CheckoutServiceError),

    /// Payment operation failed.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// Product catalogue request failed.
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is not authenticated.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but acting on someone else's data.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// An error tagged with the operation it interrupted.
    #[error("{context}: {source}")]
    Context {
        context: &'static str,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Auth(err) => auth_status(err),
            Self::Cart(err) => cart_status(err),
            Self::Checkout(err) => checkout_status(err),
            Self::Payment(err) => payment_status(err),
            Self::Catalog(CatalogError::NotFound(_)) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Catalog(_) => StatusCode::BAD_GATEWAY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Context { source, .. } => source.status(),
        }
    }

    /// Message safe to show the client.
    #[must_use]
    pub fn public_message(&self) -> String {
        if let Self::Context { context, source } = self {
            return if source.status().is_server_error() {
                (*context).to_string()
            } else {
                source.public_message()
            };
        }

        if self.status() == StatusCode::INTERNAL_SERVER_ERROR {
            return INTERNAL_MESSAGE.to_string();
        }

        match self {
            Self::Auth(err) => auth_message(err),
            Self::Cart(err) => cart_message(err),
            Self::Checkout(CheckoutServiceError::Checkout(err)) => err.to_string(),
            Self::Checkout(CheckoutServiceError::Payment(err)) | Self::Payment(err) => {
                payment_message(err)
            }
            Self::Checkout(CheckoutServiceError::Cart(err)) => cart_message(err),
            Self::Checkout(err) => err.to_string(),
            Self::Catalog(CatalogError::NotFound(_)) => "Product not found".to_string(),
            Self::Catalog(_) => "Product catalogue unavailable".to_string(),
            Self::NotFound(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::BadRequest(msg) => msg.clone(),
            Self::RateLimited => "Too many requests".to_string(),
            _ => INTERNAL_MESSAGE.to_string(),
        }
    }
}

fn auth_status(err: &AuthError) -> StatusCode {
    match err {
        AuthError::InvalidEmail(_)
        | AuthError::UserNotFound
        | AuthError::InvalidPassword
        | AuthError::UserAlreadyExists
        | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
        AuthError::Repository(_) | AuthError::PasswordHash => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn auth_message(err: &AuthError) -> String {
    match err {
        AuthError::InvalidEmail(_) => "Invalid email address".to_string(),
        AuthError::UserNotFound => "User not found".to_string(),
        AuthError::InvalidPassword => "Invalid password".to_string(),
        AuthError::UserAlreadyExists => "User already exists".to_string(),
        AuthError::WeakPassword(msg) => msg.clone(),
        AuthError::Repository(_) | AuthError::PasswordHash => INTERNAL_MESSAGE.to_string(),
    }
}

fn cart_status(err: &CartServiceError) -> StatusCode {
    match err {
        CartServiceError::CartNotFound
        | CartServiceError::Cart(CartError::InvalidQuantity | CartError::InvalidPrice) => {
            StatusCode::BAD_REQUEST
        }
        CartServiceError::Cart(CartError::ItemNotFound(_)) => StatusCode::NOT_FOUND,
        CartServiceError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cart_message(err: &CartServiceError) -> String {
    match err {
        CartServiceError::CartNotFound => "Cart not found".to_string(),
        CartServiceError::Cart(CartError::ItemNotFound(_)) => "Item not found in cart".to_string(),
        CartServiceError::Cart(CartError::InvalidQuantity) => {
            "Quantity must be a positive integer".to_string()
        }
        CartServiceError::Cart(CartError::InvalidPrice) => "Price cannot be negative".to_string(),
        CartServiceError::Repository(_) => INTERNAL_MESSAGE.to_string(),
    }
}

fn checkout_status(err: &CheckoutServiceError) -> StatusCode {
    match err {
        CheckoutServiceError::Checkout(_) | CheckoutServiceError::ConfirmRequired => {
            StatusCode::BAD_REQUEST
        }
        CheckoutServiceError::Payment(err) => payment_status(err),
        CheckoutServiceError::Cart(err) => cart_status(err),
        CheckoutServiceError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn payment_status(err: &PaymentError) -> StatusCode {
    match err {
        PaymentError::AmountRequired
        | PaymentError::EmptyCart
        | PaymentError::AmountMismatch { .. }
        | PaymentError::InvalidAmount(_)
        | PaymentError::MissingIntent
        | PaymentError::IntentNotFound(_)
        | PaymentError::NotSucceeded(_)
        | PaymentError::AlreadyUsed
        | PaymentError::Signature(_)
        | PaymentError::Payload(_) => StatusCode::BAD_REQUEST,
        PaymentError::WrongOwner => StatusCode::FORBIDDEN,
        PaymentError::Processor(_) | PaymentError::Request(_) => StatusCode::BAD_GATEWAY,
        PaymentError::Repository(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn payment_message(err: &PaymentError) -> String {
    match err {
        PaymentError::IntentNotFound(_) => "Payment intent not found".to_string(),
        PaymentError::Signature(_) => "Invalid webhook signature".to_string(),
        PaymentError::Payload(_) => "Invalid webhook payload".to_string(),
        PaymentError::Processor(_) | PaymentError::Request(_) => {
            "Payment processor error".to_string()
        }
        PaymentError::Repository(_) => INTERNAL_MESSAGE.to_string(),
        other => other.to_string(),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        } else {
            tracing::debug!(error = %self, status = %status, "Request rejected");
        }

        let message = self.public_message();
        (status, Json(json!({ "message": message }))).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Attach an operation message shown to clients when the error is server-side.
pub trait ResultExt<T> {
    /// Wrap the error with `context`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error.
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<AppError>,
{
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|err| AppError::Context {
            context,
            source: Box::new(err.into()),
        })
    }
}

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
///
/// # Example
///
/// ```rust,ignore
/// add_breadcrumb("cart", "Added to cart", Some(&[("product_id", "123")]));
/// ```
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
