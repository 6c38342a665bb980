//! Outbound tracking-webhook delivery.
//!
//! Best-effort by contract: a delivery failure is logged and never
//! propagated into the purchase flow.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::errors::ServiceError;

/// Order payload forwarded to the merchant's tracking integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderTrackingPayload {
    pub charge_id: String,
    pub sale_id: Uuid,
    pub product_names: Vec<String>,
    pub total_cents: i64,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_whatsapp: String,
    pub tracking_params: HashMap<String, String>,
    pub paid_at: DateTime<Utc>,
}

/// HMAC-SHA256 signer for webhook payloads.
struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[derive(Clone)]
pub struct TrackingService {
    client: reqwest::Client,
    max_retries: u32,
}

impl TrackingService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            max_retries: 3,
        }
    }

    /// Sends the payload, retrying with exponential backoff.
    #[instrument(skip(self, payload, token), fields(charge_id = %payload.charge_id))]
    async fn send_event(
        &self,
        webhook_url: &str,
        token: &str,
        payload: &OrderTrackingPayload,
    ) -> Result<(), ServiceError> {
        let body = serde_json::to_string(payload)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        let timestamp = Utc::now().to_rfc3339();
        let signature = SignatureGenerator {
            secret: token.to_string(),
        }
        .sign_payload(&timestamp, &body);

        for attempt in 1..=self.max_retries {
            let request = self
                .client
                .post(webhook_url)
                .header("Content-Type", "application/json")
                .header("Timestamp", &timestamp)
                .header("Merchant-Signature", &signature)
                .body(body.clone());

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!("tracking event delivered to {}", webhook_url);
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        "tracking delivery failed with status {} (attempt {}/{})",
                        response.status(),
                        attempt,
                        self.max_retries
                    );
                }
                Err(e) => {
                    warn!(
                        "tracking delivery error: {} (attempt {}/{})",
                        e, attempt, self.max_retries
                    );
                }
            }

            if attempt < self.max_retries {
                let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(ServiceError::ExternalServiceError(format!(
            "tracking event not delivered after {} attempts",
            self.max_retries
        )))
    }

    /// Fire-and-forget dispatch. Failures are logged, never surfaced.
    pub fn dispatch(&self, webhook_url: String, token: String, payload: OrderTrackingPayload) {
        let service = self.clone();
        tokio::spawn(async move {
            if let Err(e) = service.send_event(&webhook_url, &token, &payload).await {
                error!(charge_id = %payload.charge_id, "tracking dispatch failed: {}", e);
            }
        });
    }
}

impl Default for TrackingService {
    fn default() -> Self {
        Self::new()
    }
}
