use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Canonical payment status derived from the gateway's vendor vocabulary.
///
/// The mapping is total: every vendor string, including an absent one,
/// resolves to exactly one variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    WaitingPayment,
    Paid,
    Cancelled,
    Expired,
    Failed,
}

impl PaymentStatus {
    /// Maps a vendor status string to the canonical status.
    ///
    /// Matching is case-insensitive. Unrecognized and absent values map to
    /// `Failed`; that collapse of genuine ambiguity into a hard failure is
    /// part of the observable contract.
    pub fn from_vendor(vendor: Option<&str>) -> Self {
        let Some(raw) = vendor else {
            return PaymentStatus::Failed;
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "created" | "waiting_payment" | "pending" => PaymentStatus::WaitingPayment,
            "paid" | "approved" | "confirmed" => PaymentStatus::Paid,
            "cancelled" | "refused" => PaymentStatus::Cancelled,
            "expired" => PaymentStatus::Expired,
            _ => PaymentStatus::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::WaitingPayment)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::WaitingPayment => "WAITING_PAYMENT",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Expired => "EXPIRED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}
