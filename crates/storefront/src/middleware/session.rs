//! Session middleware configuration.
//!
//! Production uses `PostgreSQL`-backed sessions; tests plug in
//! `tower_sessions::MemoryStore` through the same builder.

use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "mercato_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// The `PostgreSQL` session store.
///
/// The `tower_sessions.session` table is created by the storefront migrations.
#[must_use]
pub fn postgres_store(pool: &PgPool) -> PostgresStore {
    PostgresStore::new(pool.clone())
}

/// Create the session layer over `store`.
///
/// Cookies are `HttpOnly`, `SameSite=Lax`, and `Secure` when the storefront
/// is served over https. Sessions expire after 7 days of inactivity.
#[must_use]
pub fn create_session_layer<S>(store: S, config: &StorefrontConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(config.is_https())
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}
