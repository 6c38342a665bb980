//! Sale recording: the durable write path for a completed purchase.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{coupon, merchant_settings, sale, sale_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::PaymentStatus;
use crate::services::tracking::{OrderTrackingPayload, TrackingService};

/// One line of an order snapshot.
#[derive(Debug, Clone)]
pub struct SaleLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price_cents: i64,
    pub original_price_cents: i64,
    pub is_order_bump: bool,
    pub is_upsell: bool,
    pub delivery_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CustomerSnapshot {
    pub name: String,
    pub email: String,
    pub whatsapp: String,
    pub ip: Option<String>,
}

/// Full order snapshot handed to the recorder on the PAID transition.
#[derive(Debug, Clone)]
pub struct OrderSnapshot {
    pub owner_id: Uuid,
    pub charge_id: String,
    pub lines: Vec<SaleLine>,
    pub customer: CustomerSnapshot,
    pub total_cents: i64,
    pub original_total_cents: i64,
    pub discount_cents: i64,
    pub coupon_id: Option<Uuid>,
    pub coupon_code: Option<String>,
    pub tracking_params: HashMap<String, String>,
    pub paid_at: DateTime<Utc>,
}

/// Commission retained by the platform out of a paid sale.
///
/// `net_base` is the charged total minus the gateway fee (currently always
/// zero); the platform takes a rounded percentage of it plus a fixed fee.
fn platform_fee_cents(net_base: i64, percent: Decimal, fixed_fee_cents: i64) -> i64 {
    let percentage_part = (Decimal::from(net_base) * percent)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0);
    percentage_part + fixed_fee_cents
}

#[derive(Clone)]
pub struct SalesService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    tracking: TrackingService,
}

impl SalesService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, tracking: TrackingService) -> Self {
        Self {
            db,
            event_sender,
            tracking,
        }
    }

    /// Persists the sale with its line items and commission breakdown, then
    /// fires the tracking webhook when the merchant's integration is on.
    ///
    /// Callers invoke this exactly once per completed charge.
    #[instrument(skip(self, snapshot, settings), fields(charge_id = %snapshot.charge_id))]
    pub async fn record_sale(
        &self,
        snapshot: OrderSnapshot,
        settings: &merchant_settings::Model,
    ) -> Result<sale::Model, ServiceError> {
        let gateway_fee_cents = 0_i64;
        let net_base = snapshot.total_cents - gateway_fee_cents;
        let platform_fee = platform_fee_cents(
            net_base,
            settings.commission_percent,
            settings.fixed_fee_cents,
        );
        let net_cents = net_base - platform_fee;

        let now = Utc::now();
        let sale_id = Uuid::new_v4();
        let tracking_json = if snapshot.tracking_params.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&snapshot.tracking_params).map_err(|e| {
                ServiceError::SerializationError(format!("tracking params: {}", e))
            })?)
        };

        let txn = self.db.begin().await?;

        let record = sale::ActiveModel {
            id: Set(sale_id),
            owner_id: Set(snapshot.owner_id),
            charge_id: Set(snapshot.charge_id.clone()),
            upsell_charge_id: Set(None),
            customer_name: Set(snapshot.customer.name.clone()),
            customer_email: Set(snapshot.customer.email.clone()),
            customer_whatsapp: Set(snapshot.customer.whatsapp.clone()),
            customer_ip: Set(snapshot.customer.ip.clone()),
            payment_method: Set("pix".to_string()),
            status: Set(PaymentStatus::Paid.as_str().to_string()),
            total_cents: Set(snapshot.total_cents),
            original_total_cents: Set(snapshot.original_total_cents),
            discount_cents: Set(snapshot.discount_cents),
            coupon_code: Set(snapshot.coupon_code.clone()),
            tracking_params: Set(tracking_json),
            gateway_fee_cents: Set(gateway_fee_cents),
            platform_fee_cents: Set(platform_fee),
            net_cents: Set(net_cents),
            created_at: Set(now),
            paid_at: Set(snapshot.paid_at),
        };
        let persisted = record.insert(&txn).await?;

        for line in &snapshot.lines {
            let item = sale_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                sale_id: Set(sale_id),
                product_id: Set(line.product_id),
                product_name: Set(line.product_name.clone()),
                quantity: Set(line.quantity),
                unit_price_cents: Set(line.unit_price_cents),
                original_price_cents: Set(line.original_price_cents),
                is_order_bump: Set(line.is_order_bump),
                is_upsell: Set(line.is_upsell),
                delivery_url: Set(line.delivery_url.clone()),
                created_at: Set(now),
            };
            item.insert(&txn).await?;
        }

        if let Some(coupon_id) = snapshot.coupon_id {
            if let Some(used) = coupon::Entity::find_by_id(coupon_id).one(&txn).await? {
                let mut active: coupon::ActiveModel = used.clone().into();
                active.used_count = Set(used.used_count + 1);
                active.updated_at = Set(now);
                active.update(&txn).await?;
            }
        }

        txn.commit().await?;

        self.event_sender.send(Event::SaleRecorded(sale_id)).await;
        info!(sale_id = %sale_id, total = snapshot.total_cents, "sale persisted");

        if settings.tracking_enabled {
            match (&settings.tracking_webhook_url, &settings.tracking_webhook_token) {
                (Some(url), Some(token)) => {
                    self.tracking.dispatch(
                        url.clone(),
                        token.clone(),
                        OrderTrackingPayload {
                            charge_id: snapshot.charge_id.clone(),
                            sale_id,
                            product_names: snapshot
                                .lines
                                .iter()
                                .map(|line| line.product_name.clone())
                                .collect(),
                            total_cents: snapshot.total_cents,
                            customer_name: snapshot.customer.name.clone(),
                            customer_email: snapshot.customer.email.clone(),
                            customer_whatsapp: snapshot.customer.whatsapp.clone(),
                            tracking_params: snapshot.tracking_params.clone(),
                            paid_at: snapshot.paid_at,
                        },
                    );
                }
                _ => warn!(
                    owner_id = %snapshot.owner_id,
                    "tracking integration enabled but url/token missing; skipping dispatch"
                ),
            }
        }

        Ok(persisted)
    }

    pub async fn find_by_charge(
        &self,
        charge_id: &str,
    ) -> Result<Option<sale::Model>, ServiceError> {
        Ok(sale::Entity::find()
            .filter(sale::Column::ChargeId.eq(charge_id))
            .one(&*self.db)
            .await?)
    }

    pub async fn items_of(&self, sale_id: Uuid) -> Result<Vec<sale_item::Model>, ServiceError> {
        Ok(sale_item::Entity::find()
            .filter(sale_item::Column::SaleId.eq(sale_id))
            .all(&*self.db)
            .await?)
    }

    /// Attaches the upsell charge id to an existing sale. This is the only
    /// mutation a sale record admits after creation.
    #[instrument(skip(self))]
    pub async fn attach_upsell_charge(
        &self,
        sale_id: Uuid,
        upsell_charge_id: &str,
    ) -> Result<sale::Model, ServiceError> {
        let existing = sale::Entity::find_by_id(sale_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("sale {} not found", sale_id)))?;

        if let Some(attached) = &existing.upsell_charge_id {
            if attached == upsell_charge_id {
                return Ok(existing);
            }
            return Err(ServiceError::Conflict(format!(
                "sale {} already carries upsell charge {}",
                sale_id, attached
            )));
        }

        let mut active: sale::ActiveModel = existing.into();
        active.upsell_charge_id = Set(Some(upsell_charge_id.to_string()));
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send(Event::UpsellChargeAttached {
                sale_id,
                charge_id: upsell_charge_id.to_string(),
            })
            .await;
        Ok(updated)
    }
}
