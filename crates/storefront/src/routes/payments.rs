//! Payment route handlers.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use super::extract::OptionalJson;
use crate::error::{AppError, Result, ResultExt};
use crate::middleware::RequireUser;
use crate::services::payments::webhook::{SIGNATURE_HEADER, verify_signature};
use crate::services::payments::{PaymentError, WebhookEvent};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct CreateIntentRequest {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentResponse {
    pub client_secret: String,
    pub payment_intent_id: String,
}

/// Start a card payment for the caller's cart.
///
/// `amount` is in major units and must equal the cart subtotal.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create_payment_intent(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    OptionalJson(body): OptionalJson<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>> {
    let cart = state
        .carts()
        .get(user.id)
        .await
        .context("Error creating payment intent")?;

    let intent = state
        .payments()
        .create_intent(&cart, body.amount)
        .await
        .context("Error creating payment intent")?;

    let client_secret = intent.client_secret.ok_or_else(|| {
        AppError::Payment(PaymentError::Processor(
            "intent returned without a client secret".to_string(),
        ))
    })?;

    tracing::info!(payment_intent_id = %intent.id, "Payment intent created");
    Ok(Json(CreateIntentResponse {
        client_secret,
        payment_intent_id: intent.id,
    }))
}

/// Processor webhook. Only signed deliveries are recorded.
#[instrument(skip_all)]
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let config = &state.config().payments;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    verify_signature(
        &body,
        signature,
        &config.webhook_secret,
        config.webhook_tolerance,
    )
    .map_err(PaymentError::from)?;

    let event: WebhookEvent = serde_json::from_slice(&body).map_err(PaymentError::from)?;
    tracing::debug!(event_id = %event.id, kind = %event.kind, "Webhook received");

    state
        .payments()
        .record_event(&event)
        .await
        .context("Error processing webhook")?;

    Ok(Json(json!({ "received": true })))
}
