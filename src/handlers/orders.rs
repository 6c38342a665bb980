//! Confirmation (thank-you) view and the post-purchase upsell flow.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::upsell::{UpsellCycleView, UpsellOffer};
use crate::ApiResponse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders/confirmation/:charge_id", get(confirmation))
        .route(
            "/orders/confirmation/:charge_id/upsell/accept",
            post(accept_upsell),
        )
        .route(
            "/orders/confirmation/:charge_id/upsell/decline",
            post(decline_upsell),
        )
        .route(
            "/checkout/upsell/:cycle_id",
            get(upsell_state).delete(teardown_upsell),
        )
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmationItem {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub is_order_bump: bool,
    pub delivery_url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmationView {
    pub sale_id: Uuid,
    pub charge_id: String,
    pub status: String,
    pub total_cents: i64,
    pub discount_cents: i64,
    pub coupon_code: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub items: Vec<ConfirmationItem>,
    /// Present when the purchased product defines an upsell that was not
    /// charged yet.
    pub upsell_offer: Option<UpsellOffer>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeclineResponse {
    pub declined: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeardownResponse {
    pub closed: bool,
}

/// Confirmation payload for a completed charge
#[utoipa::path(
    get,
    path = "/api/v1/orders/confirmation/{charge_id}",
    params(("charge_id" = String, Path, description = "Gateway charge id")),
    responses(
        (status = 200, description = "Confirmation data", body = ApiResponse<ConfirmationView>),
        (status = 404, description = "No sale recorded for this charge")
    ),
    tag = "orders"
)]
pub async fn confirmation(
    State(state): State<AppState>,
    Path(charge_id): Path<String>,
) -> Result<Json<ApiResponse<ConfirmationView>>, ServiceError> {
    let sale = state
        .services
        .sales
        .find_by_charge(&charge_id)
        .await?
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no sale recorded for charge {}", charge_id))
        })?;

    let items = state.services.sales.items_of(sale.id).await?;
    let upsell_offer = state.services.upsell.offer_for_sale(&sale).await?;

    Ok(Json(ApiResponse::ok(ConfirmationView {
        sale_id: sale.id,
        charge_id: sale.charge_id,
        status: sale.status,
        total_cents: sale.total_cents,
        discount_cents: sale.discount_cents,
        coupon_code: sale.coupon_code,
        paid_at: sale.paid_at,
        items: items
            .into_iter()
            .map(|item| ConfirmationItem {
                product_id: item.product_id,
                product_name: item.product_name,
                quantity: item.quantity,
                unit_price_cents: item.unit_price_cents,
                is_order_bump: item.is_order_bump,
                delivery_url: item.delivery_url,
            })
            .collect(),
        upsell_offer,
    })))
}

/// Accept the upsell offer
///
/// Creates a charge linked to the original sale and starts an independent
/// polling cycle for it.
#[utoipa::path(
    post,
    path = "/api/v1/orders/confirmation/{charge_id}/upsell/accept",
    params(("charge_id" = String, Path, description = "Original charge id")),
    responses(
        (status = 200, description = "Upsell charge created", body = ApiResponse<UpsellCycleView>),
        (status = 400, description = "No upsell offer available"),
        (status = 502, description = "Charge creation failed")
    ),
    tag = "orders"
)]
pub async fn accept_upsell(
    State(state): State<AppState>,
    Path(charge_id): Path<String>,
) -> Result<Json<ApiResponse<UpsellCycleView>>, ServiceError> {
    let view = state.services.upsell.accept(&charge_id).await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Decline the upsell offer (idempotent)
#[utoipa::path(
    post,
    path = "/api/v1/orders/confirmation/{charge_id}/upsell/decline",
    params(("charge_id" = String, Path, description = "Original charge id")),
    responses(
        (status = 200, description = "Declined", body = ApiResponse<DeclineResponse>)
    ),
    tag = "orders"
)]
pub async fn decline_upsell(
    State(state): State<AppState>,
    Path(charge_id): Path<String>,
) -> Result<Json<ApiResponse<DeclineResponse>>, ServiceError> {
    state.services.upsell.decline(&charge_id).await?;
    Ok(Json(ApiResponse::ok(DeclineResponse { declined: true })))
}

/// Current upsell cycle state
#[utoipa::path(
    get,
    path = "/api/v1/checkout/upsell/{cycle_id}",
    params(("cycle_id" = Uuid, Path, description = "Upsell cycle id")),
    responses(
        (status = 200, description = "Upsell state", body = ApiResponse<UpsellCycleView>),
        (status = 404, description = "Cycle not found")
    ),
    tag = "orders"
)]
pub async fn upsell_state(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UpsellCycleView>>, ServiceError> {
    Ok(Json(ApiResponse::ok(state.services.upsell.view(cycle_id)?)))
}

/// Tear the upsell cycle down, cancelling its timers
#[utoipa::path(
    delete,
    path = "/api/v1/checkout/upsell/{cycle_id}",
    params(("cycle_id" = Uuid, Path, description = "Upsell cycle id")),
    responses(
        (status = 200, description = "Cycle closed", body = ApiResponse<TeardownResponse>)
    ),
    tag = "orders"
)]
pub async fn teardown_upsell(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Json<ApiResponse<TeardownResponse>> {
    state.services.upsell.teardown(cycle_id);
    Json(ApiResponse::ok(TeardownResponse { closed: true }))
}
