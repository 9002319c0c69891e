//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STRIPE_SECRET_KEY` - Payment processor secret API key
//! - `STRIPE_WEBHOOK_SECRET` - Payment processor webhook signing secret
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_BASE_URL` - Public URL (default: <http://localhost:3000>)
//! - `STOREFRONT_RATE_LIMIT` - Enable per-IP rate limiting (default: true)
//! - `STOREFRONT_TRUST_PROXY_HEADERS` - Key rate limits on `X-Forwarded-For` and
//!   similar headers (default: false). Only enable behind a proxy that sets them.
//! - `STRIPE_API_BASE` - Processor API base (default: <https://api.stripe.com/v1>)
//! - `STRIPE_CURRENCY` - ISO 4217 currency for charges (default: usd)
//! - `CATALOG_BASE_URL` - Product catalogue API (default: <https://dummyjson.com>)
//! - `CHECKOUT_COD_DELAY_MS` - Cash-on-delivery confirmation delay (default: 2000)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Transaction sample rate (default: 0.0)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use mercato_core::CurrencyCode;
use secrecy::SecretString;
use thiserror::Error;

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Webhook timestamps older than this are rejected.
const DEFAULT_WEBHOOK_TOLERANCE_SECS: u64 = 300;

/// Catalogue responses are cached this long.
const DEFAULT_CATALOG_CACHE_SECS: u64 = 300;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Whether per-IP rate limiting is applied
    pub rate_limit: bool,
    /// Whether client IP proxy headers are trusted for rate limiting
    pub trust_proxy_headers: bool,
    /// Payment processor configuration
    pub payments: PaymentConfig,
    /// Product catalogue configuration
    pub catalog: CatalogConfig,
    /// Checkout behaviour
    pub checkout: CheckoutConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// Payment processor configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Secret API key (server-side only)
    pub secret_key: SecretString,
    /// Webhook signing secret
    pub webhook_secret: SecretString,
    /// API base URL, without trailing slash
    pub api_base: String,
    /// Currency all charges are made in
    pub currency: CurrencyCode,
    /// Maximum accepted webhook timestamp skew
    pub webhook_tolerance: Duration,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .field("webhook_tolerance", &self.webhook_tolerance)
            .finish()
    }
}

/// Product catalogue configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Catalogue API base URL, without trailing slash
    pub base_url: String,
    /// How long catalogue responses are cached
    pub cache_ttl: Duration,
}

/// Checkout configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    /// Fixed wait before a cash-on-delivery order is confirmed
    pub cod_delay: Duration,
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = database_url_from_env()?;
        let host = parse_env("STOREFRONT_HOST", "127.0.0.1")?;
        let port = parse_env("STOREFRONT_PORT", "3000")?;
        let base_url = get_env_or_default("STOREFRONT_BASE_URL", "http://localhost:3000");
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string())
        })?;
        let rate_limit = parse_env("STOREFRONT_RATE_LIMIT", "true")?;
        let trust_proxy_headers = parse_env("STOREFRONT_TRUST_PROXY_HEADERS", "false")?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            rate_limit,
            trust_proxy_headers,
            payments: PaymentConfig::from_env()?,
            catalog: CatalogConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
            sentry_environment: get_optional_env("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: parse_env("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: parse_env("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` flag.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let currency = get_env_or_default("STRIPE_CURRENCY", "usd")
            .parse::<CurrencyCode>()
            .map_err(|e| ConfigError::InvalidEnvVar("STRIPE_CURRENCY".to_string(), e.to_string()))?;

        Ok(Self {
            secret_key: get_validated_secret("STRIPE_SECRET_KEY")?,
            webhook_secret: get_validated_secret("STRIPE_WEBHOOK_SECRET")?,
            api_base: trim_base(&get_env_or_default(
                "STRIPE_API_BASE",
                "https://api.stripe.com/v1",
            )),
            currency,
            webhook_tolerance: Duration::from_secs(DEFAULT_WEBHOOK_TOLERANCE_SECS),
        })
    }
}

impl CatalogConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let base_url = trim_base(&get_env_or_default(
            "CATALOG_BASE_URL",
            "https://dummyjson.com",
        ));
        url::Url::parse(&base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("CATALOG_BASE_URL".to_string(), e.to_string())
        })?;

        Ok(Self {
            base_url,
            cache_ttl: Duration::from_secs(DEFAULT_CATALOG_CACHE_SECS),
        })
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let millis: u64 = parse_env("CHECKOUT_COD_DELAY_MS", "2000")?;
        Ok(Self {
            cod_delay: Duration::from_millis(millis),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// The storefront database URL alone, for tools that need nothing else.
///
/// # Errors
///
/// Returns `ConfigError::MissingEnvVar` when neither variable is set.
pub fn database_url_from_env() -> Result<SecretString, ConfigError> {
    get_database_url("STOREFRONT_DATABASE_URL")
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable (or its default) into `T`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use the key issued by the processor."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
