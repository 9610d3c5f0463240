use axum::{Json, extract::State};

use super::{
    ApiPath, JsonBody,
    dto::{AddCartItemRequest, PurchaseStatusResponse},
    error::ApiResult,
    identity::CurrentUser,
};
use crate::{
    domain::{CheckoutReceipt, ShoppingCart},
    state::AppState,
};

pub async fn get_cart(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<ShoppingCart>> {
    Ok(Json(state.cart.cart(user.id).await?))
}

pub async fn add_item(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(request): JsonBody<AddCartItemRequest>,
) -> ApiResult<Json<ShoppingCart>> {
    Ok(Json(state.cart.add_item(user.id, request.tour_id).await?))
}

pub async fn remove_item(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<ShoppingCart>> {
    Ok(Json(state.cart.remove_item(user.id, tour_id).await?))
}

pub async fn checkout(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Json<CheckoutReceipt>> {
    Ok(Json(state.cart.checkout(user.id).await?))
}

pub async fn purchase_status(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiPath(tour_id): ApiPath<u64>,
) -> ApiResult<Json<PurchaseStatusResponse>> {
    let is_purchased = state.cart.has_purchased(user.id, tour_id).await?;
    Ok(Json(PurchaseStatusResponse { is_purchased }))
}
