//! Merchant-facing abandoned-cart follow-up endpoints.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthenticatedMerchant;
use crate::entities::abandoned_cart::CartStatus;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::ApiResponse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/abandoned-carts", get(list_carts))
        .route("/abandoned-carts/:id/status", put(update_cart_status))
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CartView {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub potential_value_cents: i64,
    pub customer_name: Option<String>,
    pub customer_email: String,
    pub customer_whatsapp: Option<String>,
    pub status: CartStatus,
    pub last_interaction_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartStatusRequest {
    pub status: CartStatus,
}

/// List abandoned carts for the authenticated merchant
#[utoipa::path(
    get,
    path = "/api/v1/abandoned-carts",
    responses(
        (status = 200, description = "Carts ordered by last interaction", body = ApiResponse<Vec<CartView>>),
        (status = 401, description = "Missing or invalid bearer token")
    ),
    security(("bearer_auth" = [])),
    tag = "abandoned-carts"
)]
pub async fn list_carts(
    State(state): State<AppState>,
    merchant: AuthenticatedMerchant,
) -> Result<Json<ApiResponse<Vec<CartView>>>, ServiceError> {
    let carts = state
        .services
        .carts
        .list_for_owner(merchant.owner_id)
        .await?;
    Ok(Json(ApiResponse::ok(
        carts
            .into_iter()
            .map(|cart| CartView {
                id: cart.id,
                product_id: cart.product_id,
                product_name: cart.product_name,
                potential_value_cents: cart.potential_value_cents,
                customer_name: cart.customer_name,
                customer_email: cart.customer_email,
                customer_whatsapp: cart.customer_whatsapp,
                status: cart.status,
                last_interaction_at: cart.last_interaction_at,
            })
            .collect(),
    )))
}

/// Update a cart's follow-up status (`email_sent` or `ignored`)
#[utoipa::path(
    put,
    path = "/api/v1/abandoned-carts/{id}/status",
    params(("id" = Uuid, Path, description = "Cart id")),
    request_body = UpdateCartStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<CartView>),
        (status = 400, description = "Status not manually settable"),
        (status = 403, description = "Cart belongs to another merchant")
    ),
    security(("bearer_auth" = [])),
    tag = "abandoned-carts"
)]
pub async fn update_cart_status(
    State(state): State<AppState>,
    merchant: AuthenticatedMerchant,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCartStatusRequest>,
) -> Result<Json<ApiResponse<CartView>>, ServiceError> {
    let cart = state
        .services
        .carts
        .update_status(merchant.owner_id, id, payload.status)
        .await?;
    Ok(Json(ApiResponse::ok(CartView {
        id: cart.id,
        product_id: cart.product_id,
        product_name: cart.product_name,
        potential_value_cents: cart.potential_value_cents,
        customer_name: cart.customer_name,
        customer_email: cart.customer_email,
        customer_whatsapp: cart.customer_whatsapp,
        status: cart.status,
        last_interaction_at: cart.last_interaction_at,
    })))
}
