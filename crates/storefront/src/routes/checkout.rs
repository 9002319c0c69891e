//! Checkout wizard route handlers.
//!
//! The wizard lives in the session; each handler returns its new state.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use mercato_core::{CheckoutWizard, PaymentMethod};

use super::extract::{ApiJson, OptionalJson};
use crate::error::{Result, ResultExt, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::services::checkout::CheckoutState;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentMethodRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(default)]
    pub payment_intent_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResponse {
    pub message: &'static str,
    pub step: u8,
    pub payment_method: PaymentMethod,
}

/// Wizard state with the cart summary.
#[instrument(skip(state, user, session), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
) -> Result<Json<CheckoutState>> {
    let checkout = state
        .checkout(&session)
        .state(user.id)
        .await
        .context("Error loading checkout")?;
    Ok(Json(checkout))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn set_address(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    ApiJson(body): ApiJson<AddressRequest>,
) -> Result<Json<CheckoutWizard>> {
    let wizard = state
        .checkout(&session)
        .set_address(body.address)
        .await
        .context("Error saving address")?;
    Ok(Json(wizard))
}

#[instrument(skip(state, user, session), fields(user_id = %user.id))]
pub async fn set_payment_method(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    ApiJson(body): ApiJson<PaymentMethodRequest>,
) -> Result<Json<CheckoutWizard>> {
    let wizard = state
        .checkout(&session)
        .set_payment_method(body.method)
        .await
        .context("Error saving payment method")?;
    Ok(Json(wizard))
}

#[instrument(skip(state, user, session), fields(user_id = %user.id))]
pub async fn next(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
) -> Result<Json<CheckoutWizard>> {
    let wizard = state
        .checkout(&session)
        .next(user.id)
        .await
        .context("Error advancing checkout")?;
    Ok(Json(wizard))
}

#[instrument(skip(state, user, session), fields(user_id = %user.id))]
pub async fn back(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
) -> Result<Json<CheckoutWizard>> {
    let wizard = state
        .checkout(&session)
        .back()
        .await
        .context("Error going back in checkout")?;
    Ok(Json(wizard))
}

/// Place the order.
///
/// Card orders need the `paymentIntentId` of an intent that succeeded.
#[instrument(skip(state, user, session, body), fields(user_id = %user.id))]
pub async fn confirm(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    OptionalJson(body): OptionalJson<ConfirmRequest>,
) -> Result<Json<ConfirmResponse>> {
    let confirmation = state
        .checkout(&session)
        .confirm(user.id, body.payment_intent_id.as_deref())
        .await
        .context("Error confirming order")?;

    add_breadcrumb("checkout", "Order confirmed", None);

    Ok(Json(ConfirmResponse {
        message: "Order placed successfully",
        step: confirmation.step.number(),
        payment_method: confirmation.method,
    }))
}
