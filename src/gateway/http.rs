use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::{
    ChargeHandle, ChargeStatusSnapshot, CreateChargeRequest, GatewayError, PaymentStatus,
    PixGateway,
};
use crate::config::GatewayConfig;

/// Wire shape of the gateway's charge envelope.
#[derive(Debug, Deserialize)]
struct ChargeEnvelope {
    id: String,
    qr_code: String,
    qr_code_image: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeStatusEnvelope {
    status: Option<String>,
    paid_at: Option<DateTime<Utc>>,
}

/// reqwest-backed client for the PIX gateway REST API.
#[derive(Clone)]
pub struct HttpPixGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpPixGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn remote_error(status: reqwest::StatusCode, body: String) -> GatewayError {
        GatewayError::Remote {
            status: status.as_u16(),
            message: extract_error_message(&body)
                .unwrap_or_else(|| format!("gateway returned status {}", status)),
        }
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Accepts `{"error": "..."}`, `{"error": {"message": "..."}}` and
/// `{"message": "..."}`.
fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    if let Some(error) = value.get("error") {
        if let Some(text) = error.as_str() {
            return Some(text.to_string());
        }
        if let Some(text) = error.get("message").and_then(|m| m.as_str()) {
            return Some(text.to_string());
        }
    }
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(|text| text.to_string())
}

#[async_trait]
impl PixGateway for HttpPixGateway {
    #[instrument(skip(self, request), fields(owner_id = %request.owner_id, amount = request.amount_cents))]
    async fn create_charge(
        &self,
        request: &CreateChargeRequest,
    ) -> Result<ChargeHandle, GatewayError> {
        let url = format!("{}/v1/pix/charges", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::remote_error(status, body));
        }

        let envelope: ChargeEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        // The image is rendered verbatim by checkout pages; reject garbage
        // here rather than shipping it to the buyer.
        let qr_code_image = envelope.qr_code_image.filter(|image| {
            let valid = STANDARD.decode(image.as_bytes()).is_ok();
            if !valid {
                warn!(charge_id = %envelope.id, "discarding malformed qr image payload");
            }
            valid
        });

        debug!(charge_id = %envelope.id, "charge created");
        Ok(ChargeHandle {
            id: envelope.id,
            qr_code: envelope.qr_code,
            qr_code_image_base64: qr_code_image,
            status: PaymentStatus::from_vendor(envelope.status.as_deref()),
        })
    }

    #[instrument(skip(self, charge_id), fields(charge_id = %charge_id))]
    async fn get_charge_status(
        &self,
        charge_id: &str,
        owner_id: Uuid,
    ) -> Result<ChargeStatusSnapshot, GatewayError> {
        let url = format!("{}/v1/pix/charges/{}", self.base_url, charge_id);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .query(&[("owner_id", owner_id.to_string())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::remote_error(status, body));
        }

        let envelope: ChargeStatusEnvelope = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(ChargeStatusSnapshot {
            status: PaymentStatus::from_vendor(envelope.status.as_deref()),
            paid_at: envelope.paid_at,
        })
    }
}
