//! Product route handlers.

use axum::{
    Json,
    extract::{Path, Query, State},
};
use serde::Deserialize;
use tracing::instrument;

use mercato_core::ProductId;

use crate::catalog::{Product, ProductPage};
use crate::error::{AppError, Result, ResultExt};
use crate::state::AppState;

/// Query parameters for the product listing.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

/// One page of products. Without `skip` the catalogue picks a random offset.
#[instrument(skip(state))]
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ProductPage>> {
    let page = state
        .catalog()
        .list(query.limit, query.skip)
        .await
        .context("Error fetching products")?;
    Ok(Json(page))
}

#[instrument(skip(state))]
pub async fn show(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Product>> {
    let id: ProductId = id
        .parse()
        .map_err(|_| AppError::NotFound("Product not found".to_string()))?;

    let product = state
        .catalog()
        .get(id)
        .await
        .context("Error fetching product")?;
    Ok(Json(product))
}
