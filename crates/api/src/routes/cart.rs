//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use cart::CartView;
use common::ItemId;
use serde::{Deserialize, Serialize};
use store::OrderStore;

use crate::auth::MaybeUser;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub item_id: i64,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i64,
}

#[derive(Serialize)]
pub struct CartCountResponse {
    /// Distinct items in the cart.
    pub count: usize,
}

#[derive(Serialize)]
pub struct CartQuantityResponse {
    /// Units across all cart entries.
    pub total_quantity: u32,
}

pub(crate) fn parse_item_id(raw: &str) -> Result<ItemId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid item id: {raw}")))
}

/// GET /cart: returns the caller's cart at current prices.
pub async fn view<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
) -> Result<Json<CartView>, ApiError> {
    let user_id = user.require()?;
    Ok(Json(state.cart.view(user_id).await?))
}

/// POST /cart/items: adds units of an item to the cart.
pub async fn add<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartCountResponse>, ApiError> {
    let user_id = user.require()?;
    let count = state
        .cart
        .add(user_id, ItemId::new(req.item_id), req.quantity)
        .await?;
    Ok(Json(CartCountResponse { count }))
}

/// PUT /cart/items/{item_id}: replaces the quantity of a cart entry.
pub async fn update<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Path(item_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<CartQuantityResponse>, ApiError> {
    let user_id = user.require()?;
    let item_id = parse_item_id(&item_id)?;
    let total_quantity = state.cart.update(user_id, item_id, req.quantity).await?;
    Ok(Json(CartQuantityResponse { total_quantity }))
}

/// DELETE /cart/items/{item_id}: removes an entry from the cart.
pub async fn remove<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Path(item_id): Path<String>,
) -> Result<Json<CartQuantityResponse>, ApiError> {
    let user_id = user.require()?;
    let item_id = parse_item_id(&item_id)?;
    let total_quantity = state.cart.remove(user_id, item_id).await?;
    Ok(Json(CartQuantityResponse { total_quantity }))
}
