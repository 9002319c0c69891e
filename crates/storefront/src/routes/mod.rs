//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                       - Liveness check
//! GET  /health/ready                 - Readiness check (store ping)
//!
//! # Auth (rate limited)
//! POST /api/auth/signup              - Create account and log in
//! POST /api/auth/login               - Log in
//! POST /api/auth/logout              - Log out
//! GET  /api/auth/session             - Current login state
//!
//! # Cart (requires login)
//! POST /api/cart/get                 - Cart document
//! POST /api/cart/add                 - Add product or bump its quantity
//! POST /api/cart/update              - Change a line's quantity by a delta
//! POST /api/cart/remove              - Remove a line
//! POST /api/cart/clear               - Empty cart, reset checkout
//!
//! # Products
//! GET  /api/products                 - Product page (?limit&skip)
//! GET  /api/products/{id}            - Product detail
//!
//! # Payments
//! POST /api/create-payment-intent    - Start a card payment (requires login)
//! POST /api/payments/webhook         - Signed processor webhook
//!
//! # Checkout (requires login)
//! GET  /api/checkout                 - Wizard state and cart summary
//! POST /api/checkout/address         - Set delivery address
//! POST /api/checkout/payment-method  - Choose COD or card
//! POST /api/checkout/next            - Next step
//! POST /api/checkout/back            - Previous step
//! POST /api/checkout/confirm         - Place the order
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod extract;
pub mod payments;
pub mod products;

use axum::{
    Router,
    extract::State,
    http::{Request, StatusCode},
    middleware::from_fn,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tower_sessions::SessionStore;

use crate::config::StorefrontConfig;
use crate::middleware::{
    api_rate_limiter, auth_rate_limiter, create_session_layer, request_id_middleware,
};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(auth::signup))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/session", get(auth::session_status))
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/get", post(cart::get_cart))
        .route("/add", post(cart::add))
        .route("/update", post(cart::update))
        .route("/remove", post(cart::remove))
        .route("/clear", post(cart::clear))
}

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::list))
        .route("/{id}", get(products::show))
}

/// Create the checkout routes router.
pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(checkout::show))
        .route("/address", post(checkout::set_address))
        .route("/payment-method", post(checkout::set_payment_method))
        .route("/next", post(checkout::next))
        .route("/back", post(checkout::back))
        .route("/confirm", post(checkout::confirm))
}

/// Create all API routes, rate limited when enabled in config.
pub fn routes(config: &StorefrontConfig) -> Router<AppState> {
    let mut auth = auth_routes();
    let mut api = Router::new()
        .nest("/cart", cart_routes())
        .nest("/products", product_routes())
        .nest("/checkout", checkout_routes())
        .route(
            "/create-payment-intent",
            post(payments::create_payment_intent),
        )
        .route("/payments/webhook", post(payments::webhook));

    if config.rate_limit {
        auth = auth.layer(auth_rate_limiter(config.trust_proxy_headers));
        api = api.layer(api_rate_limiter(config.trust_proxy_headers));
    }

    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/api/auth", auth)
        .nest("/api", api)
}

/// The full application: routes, sessions, request ids and tracing.
///
/// Sentry layers are added by the binary on top of this.
pub fn app<S>(state: AppState, session_store: S) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config());
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = tracing::field::Empty,
        )
    });

    routes(state.config())
        .layer(session_layer)
        .layer(from_fn(request_id_middleware))
        .layer(trace_layer)
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the cart store is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.stores().carts.ping().await {
        Ok(()) => StatusCode::OK,
        Err(err) => {
            tracing::warn!(error = %err, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
