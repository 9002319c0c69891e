//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction per route)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions)
//! 5. Rate limiting (governor), per route group

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use auth::{OptionalUser, RequireUser, clear_current_user, set_current_user};
pub use rate_limit::{api_rate_limiter, auth_rate_limiter};
pub use request_id::request_id_middleware;
pub use session::{create_session_layer, postgres_store};
