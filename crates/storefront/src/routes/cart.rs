//! Cart route handlers.
//!
//! Every handler acts on the logged-in user's cart document. Bodies may carry
//! a `userId` for older clients; it has to match the session.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;
use tracing::instrument;

use mercato_core::{AddOutcome, Cart, NewCartItem, ProductId, QuantityChange, UserId};

use super::extract::{ApiJson, OptionalJson, UserScoped, acting_user};
use crate::error::{Result, ResultExt, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::services::checkout::reset_wizard;
use crate::state::AppState;

/// Plain `{"message": ...}` reply.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

const fn message(message: &'static str) -> Json<MessageResponse> {
    Json(MessageResponse { message })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub product: NewCartItem,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
    pub change: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub product_id: ProductId,
}

/// Fetch the cart; an empty one when nothing was added yet.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn get_cart(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    OptionalJson(body): OptionalJson<UserScoped>,
) -> Result<Json<Cart>> {
    let user_id = acting_user(&user, body.user_id)?;
    let cart = state
        .carts()
        .get(user_id)
        .await
        .context("Error fetching cart")?;
    Ok(Json(cart))
}

/// Add a product, or bump its quantity when it is already in the cart.
#[instrument(skip(state, user, body), fields(user_id = %user.id, product_id = %body.product.product_id))]
pub async fn add(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(body): ApiJson<AddRequest>,
) -> Result<Json<MessageResponse>> {
    let user_id = acting_user(&user, body.user_id)?;
    let product_id = body.product.product_id.to_string();

    let outcome = state
        .carts()
        .add(user_id, body.product)
        .await
        .context("Error adding to cart")?;

    let action = match outcome {
        AddOutcome::Inserted => "inserted",
        AddOutcome::Incremented { .. } => "incremented",
    };
    add_breadcrumb(
        "cart",
        "Added to cart",
        Some(&[("product_id", &product_id), ("action", action)]),
    );

    Ok(message("Added to cart successfully"))
}

/// Change a line's quantity by `change`; lines reaching zero are dropped.
#[instrument(skip(state, user, body), fields(user_id = %user.id, product_id = %body.product_id, change = body.change))]
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(body): ApiJson<UpdateRequest>,
) -> Result<Json<MessageResponse>> {
    let user_id = acting_user(&user, body.user_id)?;

    let outcome = state
        .carts()
        .update(user_id, body.product_id, body.change)
        .await
        .context("Error updating cart")?;

    if outcome == QuantityChange::Removed {
        tracing::debug!("Line dropped at zero quantity");
    }

    Ok(message("Cart updated successfully"))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id, product_id = %body.product_id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(body): ApiJson<RemoveRequest>,
) -> Result<Json<MessageResponse>> {
    let user_id = acting_user(&user, body.user_id)?;

    state
        .carts()
        .remove(user_id, body.product_id)
        .await
        .context("Error removing from cart")?;

    Ok(message("Removed from cart"))
}

/// Empty the cart. The checkout address and payment method go with it.
#[instrument(skip(state, user, session, body), fields(user_id = %user.id))]
pub async fn clear(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    session: Session,
    OptionalJson(body): OptionalJson<UserScoped>,
) -> Result<Json<MessageResponse>> {
    let user_id = acting_user(&user, body.user_id)?;

    state
        .carts()
        .clear(user_id)
        .await
        .context("Error clearing cart")?;
    reset_wizard(&session).await.context("Error clearing cart")?;

    Ok(message("Cart cleared"))
}
