//! Integration tests for Mercato.
//!
//! # Running Tests
//!
//! ```bash
//! # In-process tests (no database, no network)
//! cargo test -p mercato-integration-tests
//!
//! # Tests against a running storefront
//! STOREFRONT_BASE_URL=http://localhost:3000 cargo test -p mercato-integration-tests -- --ignored
//! ```
//!
//! The in-process harness drives the real router with in-memory stores,
//! `tower_sessions::MemoryStore` and a scripted payment gateway. The session
//! cookie is carried between requests by hand, like a browser would.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use secrecy::SecretString;
use serde_json::Value;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use mercato_core::{CurrencyCode, PaymentStatus, UserId};
use mercato_storefront::config::{CatalogConfig, CheckoutConfig, PaymentConfig, StorefrontConfig};
use mercato_storefront::db::{InMemoryCartStore, InMemoryPaymentStore, InMemoryUserStore, Stores};
use mercato_storefront::middleware::session::SESSION_COOKIE_NAME;
use mercato_storefront::routes;
use mercato_storefront::services::payments::webhook::{SIGNATURE_HEADER, sign};
use mercato_storefront::services::payments::{PaymentError, PaymentGateway, PaymentIntent};
use mercato_storefront::state::AppState;

/// Webhook signing secret used by [`test_config`].
pub const WEBHOOK_SECRET: &str = "whsec_integration_7Qm2xV9cL4pR8tZ1";

/// Configuration for in-process tests: no rate limiting, no COD delay.
#[must_use]
pub fn test_config() -> StorefrontConfig {
    StorefrontConfig {
        database_url: SecretString::from("postgres://unused@localhost/mercato"),
        host: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 3000,
        base_url: "http://localhost:3000".to_string(),
        rate_limit: false,
        trust_proxy_headers: false,
        payments: PaymentConfig {
            secret_key: SecretString::from("sk_test_integration_unused"),
            webhook_secret: SecretString::from(WEBHOOK_SECRET),
            api_base: "http://127.0.0.1:9/v1".to_string(),
            currency: CurrencyCode::USD,
            webhook_tolerance: Duration::from_secs(300),
        },
        catalog: CatalogConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            cache_ttl: Duration::from_secs(300),
        },
        checkout: CheckoutConfig {
            cod_delay: Duration::ZERO,
        },
        sentry_dsn: None,
        sentry_environment: None,
        sentry_sample_rate: 0.0,
        sentry_traces_sample_rate: 0.0,
    }
}

/// Payment gateway that keeps intents in memory.
///
/// New intents start at `requires_payment_method`; tests move them along
/// with [`FakeGateway::set_status`].
#[derive(Default)]
pub struct FakeGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    next_id: AtomicU32,
}

impl FakeGateway {
    /// Change what the processor reports for an intent.
    ///
    /// # Panics
    ///
    /// Panics if the intent was never created.
    pub fn set_status(&self, id: &str, status: PaymentStatus) {
        let mut intents = self.intents.lock().expect("gateway lock poisoned");
        intents.get_mut(id).expect("unknown intent").status = status;
    }

    /// The intent as the processor currently sees it.
    ///
    /// # Panics
    ///
    /// Panics if the intent was never created.
    #[must_use]
    pub fn intent(&self, id: &str) -> PaymentIntent {
        let intents = self.intents.lock().expect("gateway lock poisoned");
        intents.get(id).cloned().expect("unknown intent")
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
        user_id: UserId,
    ) -> Result<PaymentIntent, PaymentError> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("pi_test_{n}");
        let intent = PaymentIntent {
            id: id.clone(),
            client_secret: Some(format!("{id}_secret_test")),
            amount: amount_minor,
            currency: currency.code().to_lowercase(),
            status: PaymentStatus::RequiresPaymentMethod,
            metadata: HashMap::from([("user_id".to_string(), user_id.to_string())]),
        };
        self.intents
            .lock()
            .map_err(|_| PaymentError::Processor("gateway lock poisoned".to_string()))?
            .insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        self.intents
            .lock()
            .map_err(|_| PaymentError::Processor("gateway lock poisoned".to_string()))?
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::IntentNotFound(id.to_string()))
    }
}

/// Current time in unix seconds.
///
/// # Panics
///
/// Panics if the system clock is before 1970.
#[must_use]
pub fn unix_now() -> i64 {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock before epoch")
        .as_secs();
    i64::try_from(secs).expect("timestamp fits i64")
}

/// A response with its body parsed as JSON (or kept as a JSON string).
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestResponse {
    /// The `message` field of the body.
    #[must_use]
    pub fn message(&self) -> &str {
        self.body["message"].as_str().unwrap_or_default()
    }
}

/// One browser talking to one in-process storefront.
pub struct TestApp {
    router: Router,
    cookie: Option<String>,
    pub users: Arc<InMemoryUserStore>,
    pub carts: Arc<InMemoryCartStore>,
    pub gateway: Arc<FakeGateway>,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// A storefront running with `config` instead of [`test_config`].
    #[must_use]
    pub fn with_config(config: StorefrontConfig) -> Self {
        let users = Arc::new(InMemoryUserStore::default());
        let carts = Arc::new(InMemoryCartStore::default());
        let gateway = Arc::new(FakeGateway::default());
        let stores = Stores {
            users: users.clone(),
            carts: carts.clone(),
            payments: Arc::new(InMemoryPaymentStore::default()),
        };

        let state = AppState::new(config, stores, gateway.clone());
        let router = routes::app(state, MemoryStore::default());

        Self {
            router,
            cookie: None,
            users,
            carts,
            gateway,
        }
    }

    /// A second browser on the same server and stores.
    #[must_use]
    pub fn new_browser(&self) -> Self {
        Self {
            router: self.router.clone(),
            cookie: None,
            users: self.users.clone(),
            carts: self.carts.clone(),
            gateway: self.gateway.clone(),
        }
    }

    pub async fn get(&mut self, path: &str) -> TestResponse {
        self.send(Method::GET, path, Vec::new(), &[]).await
    }

    pub async fn post(&mut self, path: &str, body: &Value) -> TestResponse {
        let bytes = serde_json::to_vec(body).expect("serialize request body");
        self.send(Method::POST, path, bytes, &[]).await
    }

    /// Sign `event` like the processor does and deliver it to the webhook.
    pub async fn deliver_webhook(&mut self, event: &Value) -> TestResponse {
        self.deliver_webhook_at(event, unix_now()).await
    }

    /// Deliver `event` signed as of `timestamp` (unix seconds).
    pub async fn deliver_webhook_at(&mut self, event: &Value, timestamp: i64) -> TestResponse {
        let payload = serde_json::to_vec(event).expect("serialize event");
        let signature = sign(&payload, timestamp, &SecretString::from(WEBHOOK_SECRET));
        let header_value = format!("t={timestamp},v1={signature}");

        self.send(
            Method::POST,
            "/api/payments/webhook",
            payload,
            &[(SIGNATURE_HEADER, &header_value)],
        )
        .await
    }

    /// Sign up and stay logged in. Returns the new user's id.
    pub async fn signup(&mut self, email: &str) -> UserId {
        let response = self
            .post(
                "/api/auth/signup",
                &serde_json::json!({ "email": email, "password": "correct-horse-42" }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        serde_json::from_value(response.body["userId"].clone()).expect("userId in signup reply")
    }

    /// Add `quantity` of a product priced at `price`.
    pub async fn add_to_cart(&mut self, product_id: i32, price: f64, quantity: u32) -> TestResponse {
        self.post(
            "/api/cart/add",
            &serde_json::json!({
                "product": {
                    "productId": product_id,
                    "title": format!("Product {product_id}"),
                    "price": price,
                    "thumbnail": format!("https://cdn.example.com/{product_id}.webp"),
                    "quantity": quantity,
                }
            }),
        )
        .await
    }

    pub async fn send(
        &mut self,
        method: Method,
        path: &str,
        body: Vec<u8>,
        headers: &[(&str, &str)],
    ) -> TestResponse {
        let mut request = Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = &self.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let request = request.body(Body::from(body)).expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        self.remember_cookie(response.headers());

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse { status, body }
    }

    fn remember_cookie(&mut self, headers: &axum::http::HeaderMap) {
        let prefix = format!("{SESSION_COOKIE_NAME}=");
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(value) = value.to_str() else { continue };
            let Some(pair) = value.split(';').next() else {
                continue;
            };
            if let Some(id) = pair.strip_prefix(&prefix) {
                self.cookie = (!id.is_empty()).then(|| pair.to_string());
            }
        }
    }
}
