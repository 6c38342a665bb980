//! Buyer-facing checkout endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::checkout::{BuyerFields, CheckoutPageView, SessionView};
use crate::ApiResponse;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout/:slug", get(checkout_page))
        .route("/checkout/:slug/sessions", post(open_session))
        .route(
            "/checkout/sessions/:id",
            get(session_state).delete(teardown_session),
        )
        .route("/checkout/sessions/:id/buyer", patch(update_buyer))
        .route(
            "/checkout/sessions/:id/coupon",
            post(apply_coupon).delete(remove_coupon),
        )
        .route("/checkout/sessions/:id/bump", put(set_bump))
        .route("/checkout/sessions/:id/submit", post(submit))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBuyerRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub whatsapp_number: String,
    #[serde(default = "default_country_code")]
    pub country_code: String,
}

fn default_country_code() -> String {
    "55".to_string()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetBumpRequest {
    pub include: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TeardownResponse {
    pub closed: bool,
}

/// Checkout page payload for a product slug
#[utoipa::path(
    get,
    path = "/api/v1/checkout/{slug}",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 200, description = "Checkout page data", body = ApiResponse<CheckoutPageView>),
        (status = 404, description = "Product not found")
    ),
    tag = "checkout"
)]
pub async fn checkout_page(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ApiResponse<CheckoutPageView>>, ServiceError> {
    let page = state.services.checkout.checkout_page(&slug).await?;
    Ok(Json(ApiResponse::ok(page)))
}

/// Open a checkout session
///
/// Every query parameter is captured verbatim as a tracking parameter and
/// attached to the charge, the sale and the abandoned cart.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/{slug}/sessions",
    params(("slug" = String, Path, description = "Product slug")),
    responses(
        (status = 201, description = "Session opened", body = ApiResponse<SessionView>),
        (status = 404, description = "Product not found")
    ),
    tag = "checkout"
)]
pub async fn open_session(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(tracking_params): Query<HashMap<String, String>>,
) -> Result<(StatusCode, Json<ApiResponse<SessionView>>), ServiceError> {
    let view = state
        .services
        .checkout
        .open_session(&slug, tracking_params)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(view))))
}

/// Current session state, quote and charge QR
#[utoipa::path(
    get,
    path = "/api/v1/checkout/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session state", body = ApiResponse<SessionView>),
        (status = 404, description = "Session not found")
    ),
    tag = "checkout"
)]
pub async fn session_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionView>>, ServiceError> {
    Ok(Json(ApiResponse::ok(state.services.checkout.view(id)?)))
}

/// Update buyer fields
///
/// Persists the draft for the product slug and re-arms the abandoned-cart
/// debounce timer.
#[utoipa::path(
    patch,
    path = "/api/v1/checkout/sessions/{id}/buyer",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = UpdateBuyerRequest,
    responses(
        (status = 200, description = "Buyer updated", body = ApiResponse<SessionView>),
        (status = 400, description = "Fields locked while payment is in flight")
    ),
    tag = "checkout"
)]
pub async fn update_buyer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateBuyerRequest>,
) -> Result<Json<ApiResponse<SessionView>>, ServiceError> {
    let view = state.services.checkout.update_buyer(
        id,
        BuyerFields {
            name: payload.name,
            email: payload.email,
            whatsapp_number: payload.whatsapp_number,
            country_code: payload.country_code,
        },
    )?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Apply a coupon code
#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions/{id}/coupon",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied", body = ApiResponse<SessionView>),
        (status = 400, description = "Invalid coupon code")
    ),
    tag = "checkout"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ApplyCouponRequest>,
) -> Result<Json<ApiResponse<SessionView>>, ServiceError> {
    let view = state
        .services
        .checkout
        .apply_coupon(id, &payload.code)
        .await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Remove the applied coupon
#[utoipa::path(
    delete,
    path = "/api/v1/checkout/sessions/{id}/coupon",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Coupon removed", body = ApiResponse<SessionView>)
    ),
    tag = "checkout"
)]
pub async fn remove_coupon(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<SessionView>>, ServiceError> {
    Ok(Json(ApiResponse::ok(
        state.services.checkout.remove_coupon(id)?,
    )))
}

/// Include or exclude the order bump
#[utoipa::path(
    put,
    path = "/api/v1/checkout/sessions/{id}/bump",
    params(("id" = Uuid, Path, description = "Session id")),
    request_body = SetBumpRequest,
    responses(
        (status = 200, description = "Bump toggled", body = ApiResponse<SessionView>),
        (status = 400, description = "Product has no bump offer")
    ),
    tag = "checkout"
)]
pub async fn set_bump(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetBumpRequest>,
) -> Result<Json<ApiResponse<SessionView>>, ServiceError> {
    Ok(Json(ApiResponse::ok(
        state.services.checkout.set_bump(id, payload.include)?,
    )))
}

/// Submit the checkout form
///
/// Creates the PIX charge and starts the status-polling cycle. A gateway
/// failure returns the session to `FORM` without scheduling any polling.
#[utoipa::path(
    post,
    path = "/api/v1/checkout/sessions/{id}/submit",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Charge created, polling started", body = ApiResponse<SessionView>),
        (status = 400, description = "Missing buyer fields"),
        (status = 502, description = "Charge creation failed")
    ),
    tag = "checkout"
)]
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<ApiResponse<SessionView>>, ServiceError> {
    let customer_ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.split(',').next())
        .map(|ip| ip.trim().to_string());

    let view = state.services.checkout.submit(id, customer_ip).await?;
    Ok(Json(ApiResponse::ok(view)))
}

/// Tear the session down
///
/// Cancels the poll interval, the poll deadline and the abandoned-cart
/// debounce. Maps to the buyer navigating away from the checkout page.
#[utoipa::path(
    delete,
    path = "/api/v1/checkout/sessions/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session closed", body = ApiResponse<TeardownResponse>)
    ),
    tag = "checkout"
)]
pub async fn teardown_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Json<ApiResponse<TeardownResponse>> {
    state.services.checkout.teardown(id);
    Json(ApiResponse::ok(TeardownResponse { closed: true }))
}
