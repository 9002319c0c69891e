//! REST client for a Stripe-compatible payment processor.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error, instrument};

use mercato_core::{CurrencyCode, UserId};

use super::{PaymentError, PaymentGateway, PaymentIntent};
use crate::config::PaymentConfig;

/// Requests to the processor give up after this long.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Payment intents API client.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
    api_base: String,
}

impl std::fmt::Debug for StripeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeClient")
            .field("secret_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl StripeClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Request` if the HTTP client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            api_base: config.api_base.clone(),
        })
    }

    async fn read_intent(response: reqwest::Response) -> Result<PaymentIntent, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<PaymentIntent>().await?);
        }

        let body = response.json::<ErrorEnvelope>().await.ok();
        let message = body
            .as_ref()
            .and_then(|b| b.error.message.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status == StatusCode::NOT_FOUND {
            return Err(PaymentError::IntentNotFound(message));
        }

        error!(
            status = %status,
            kind = ?body.and_then(|b| b.error.kind),
            error = %message,
            "Payment processor API error"
        );
        Err(PaymentError::Processor(message))
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self))]
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: CurrencyCode,
        user_id: UserId,
    ) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", amount_minor.to_string()),
            ("currency", currency.code().to_lowercase()),
            ("payment_method_types[]", "card".to_string()),
            ("metadata[user_id]", user_id.to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/payment_intents", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .form(&form)
            .send()
            .await?;

        let intent = Self::read_intent(response).await?;
        debug!(payment_intent_id = %intent.id, "Payment intent created");
        Ok(intent)
    }

    #[instrument(skip(self))]
    async fn retrieve_intent(&self, id: &str) -> Result<PaymentIntent, PaymentError> {
        // Ids come from clients; refuse anything that could change the path.
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PaymentError::IntentNotFound(id.to_string()));
        }

        let response = self
            .client
            .get(format!("{}/payment_intents/{id}", self.api_base))
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await?;

        Self::read_intent(response).await
    }
}
