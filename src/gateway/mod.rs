//! Client boundary for the external PIX payment gateway.
//!
//! The gateway owns the charge lifecycle; this crate only creates charges
//! and observes their status by polling. The boundary is a trait so the
//! checkout orchestrator can be driven by a scripted gateway in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub mod http;
pub mod status;

pub use self::http::HttpPixGateway;
pub use status::PaymentStatus;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    /// Remote returned an unsuccessful envelope. The message is extracted
    /// from a nested `error`/`message` field when the body carries one.
    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),
}

/// Buyer contact snapshot sent with a charge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChargeBuyer {
    pub name: String,
    pub email: String,
    pub whatsapp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// One ordered line item as the gateway expects it.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChargeLineItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub is_order_bump: bool,
    pub is_upsell: bool,
}

/// Payload for the gateway's "create PIX charge" operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChargeRequest {
    pub owner_id: Uuid,
    pub amount_cents: i64,
    pub original_amount_cents: i64,
    pub buyer: ChargeBuyer,
    pub line_items: Vec<ChargeLineItem>,
    pub tracking_params: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_cents: Option<i64>,
    #[serde(default)]
    pub is_upsell: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_sale_id: Option<Uuid>,
}

/// Gateway-side handle for a created charge.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChargeHandle {
    pub id: String,
    /// Copy-and-paste PIX payload.
    pub qr_code: String,
    /// Base64-encoded QR image, when the gateway returns one.
    pub qr_code_image_base64: Option<String>,
    pub status: PaymentStatus,
}

/// Result of one status poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeStatusSnapshot {
    pub status: PaymentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PixGateway: Send + Sync {
    async fn create_charge(
        &self,
        request: &CreateChargeRequest,
    ) -> Result<ChargeHandle, GatewayError>;

    async fn get_charge_status(
        &self,
        charge_id: &str,
        owner_id: Uuid,
    ) -> Result<ChargeStatusSnapshot, GatewayError>;
}
