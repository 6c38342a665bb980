//! Post-purchase upsell orchestrator.
//!
//! Offered once on the confirmation view when the purchased product
//! defines an upsell and the sale carries no upsell charge yet. Accepting
//! runs the same single-charge payment cycle as the main checkout, scoped
//! to one line item and linked to the originating sale. A failed or
//! declined upsell never disturbs the confirmed main purchase.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::CheckoutConfig;
use crate::db::DbPool;
use crate::entities::{product, sale};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    ChargeBuyer, ChargeHandle, ChargeLineItem, CreateChargeRequest, PaymentStatus, PixGateway,
};
use crate::services::checkout::ChargeView;
use crate::services::payment_cycle::{self, CycleOutcome, CycleTimings};
use crate::services::sales::SalesService;

/// Upsell offer attached to a confirmation view.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsellOffer {
    pub product_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone)]
enum UpsellPhase {
    AwaitingPayment { charge: ChargeHandle },
    Paid { charge_id: String },
    Cancelled,
    Expired { timed_out: bool },
    Failed,
}

impl UpsellPhase {
    fn label(&self) -> &'static str {
        match self {
            UpsellPhase::AwaitingPayment { .. } => "AWAITING_PAYMENT",
            UpsellPhase::Paid { .. } => "PAID",
            UpsellPhase::Cancelled => "CANCELLED",
            UpsellPhase::Expired { .. } => "EXPIRED",
            UpsellPhase::Failed => "FAILED",
        }
    }

    fn payment_status(&self) -> PaymentStatus {
        match self {
            UpsellPhase::AwaitingPayment { charge } => charge.status,
            UpsellPhase::Paid { .. } => PaymentStatus::Paid,
            UpsellPhase::Cancelled => PaymentStatus::Cancelled,
            UpsellPhase::Expired { .. } => PaymentStatus::Expired,
            UpsellPhase::Failed => PaymentStatus::Failed,
        }
    }
}

struct UpsellState {
    phase: UpsellPhase,
    last_error: Option<String>,
}

struct UpsellCycle {
    id: Uuid,
    sale_id: Uuid,
    state: Mutex<UpsellState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpsellCycleView {
    pub cycle_id: Uuid,
    pub sale_id: Uuid,
    pub phase: String,
    pub payment_status: PaymentStatus,
    pub charge: Option<ChargeView>,
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct UpsellService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PixGateway>,
    sales: Arc<SalesService>,
    event_sender: EventSender,
    config: CheckoutConfig,
    cycles: Arc<DashMap<Uuid, Arc<UpsellCycle>>>,
}

impl UpsellService {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PixGateway>,
        sales: Arc<SalesService>,
        event_sender: EventSender,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            sales,
            event_sender,
            config,
            cycles: Arc::new(DashMap::new()),
        }
    }

    /// The upsell offer for a completed sale, if the purchased product
    /// defines one and no upsell charge was taken yet.
    #[instrument(skip(self, sale), fields(sale_id = %sale.id))]
    pub async fn offer_for_sale(
        &self,
        sale: &sale::Model,
    ) -> Result<Option<UpsellOffer>, ServiceError> {
        if sale.upsell_charge_id.is_some() {
            return Ok(None);
        }

        let items = self.sales.items_of(sale.id).await?;
        let Some(main_item) = items.iter().find(|i| !i.is_order_bump && !i.is_upsell) else {
            return Ok(None);
        };

        let Some(purchased) = product::Entity::find_by_id(main_item.product_id)
            .one(&*self.db)
            .await?
        else {
            return Ok(None);
        };
        let Some(upsell_id) = purchased.upsell_product_id else {
            return Ok(None);
        };

        let upsell_product = product::Entity::find_by_id(upsell_id)
            .one(&*self.db)
            .await?;
        let Some(price_cents) = purchased
            .upsell_price_cents
            .or_else(|| upsell_product.as_ref().map(|p| p.price_cents))
        else {
            return Ok(None);
        };

        Ok(Some(UpsellOffer {
            product_id: upsell_id,
            name: upsell_product
                .map(|p| p.name)
                .unwrap_or_else(|| "Upsell offer".to_string()),
            price_cents,
        }))
    }

    /// Accepts the upsell: creates a linked charge and starts its own
    /// polling cycle, independent of the (already finished) main one.
    #[instrument(skip(self), fields(charge_id = %original_charge_id))]
    pub async fn accept(
        &self,
        original_charge_id: &str,
    ) -> Result<UpsellCycleView, ServiceError> {
        let sale = self
            .sales
            .find_by_charge(original_charge_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("sale for charge {} not found", original_charge_id))
            })?;

        let offer = self.offer_for_sale(&sale).await?.ok_or_else(|| {
            ServiceError::InvalidOperation("no upsell offer available for this purchase".into())
        })?;

        let request = CreateChargeRequest {
            owner_id: sale.owner_id,
            amount_cents: offer.price_cents,
            original_amount_cents: offer.price_cents,
            buyer: ChargeBuyer {
                name: sale.customer_name.clone(),
                email: sale.customer_email.clone(),
                whatsapp: sale.customer_whatsapp.clone(),
                ip: sale.customer_ip.clone(),
            },
            line_items: vec![ChargeLineItem {
                product_id: offer.product_id,
                name: offer.name.clone(),
                quantity: 1,
                unit_price_cents: offer.price_cents,
                is_order_bump: false,
                is_upsell: true,
            }],
            tracking_params: tracking_of(&sale),
            coupon_code: None,
            discount_cents: None,
            is_upsell: true,
            original_sale_id: Some(sale.id),
        };

        let handle = self.gateway.create_charge(&request).await?;
        info!(upsell_charge_id = %handle.id, sale_id = %sale.id, "upsell charge created");

        self.event_sender
            .send(Event::UpsellAccepted { sale_id: sale.id })
            .await;
        self.event_sender
            .send(Event::ChargeCreated {
                session_id: sale.id,
                charge_id: handle.id.clone(),
                amount_cents: offer.price_cents,
                is_upsell: true,
            })
            .await;

        let cycle = Arc::new(UpsellCycle {
            id: Uuid::new_v4(),
            sale_id: sale.id,
            state: Mutex::new(UpsellState {
                phase: UpsellPhase::AwaitingPayment {
                    charge: handle.clone(),
                },
                last_error: None,
            }),
            task: Mutex::new(None),
        });

        let service = self.clone();
        let task_cycle = Arc::clone(&cycle);
        let charge_id = handle.id.clone();
        let owner_id = sale.owner_id;
        let timings = CycleTimings::from(&service.config);
        let task = tokio::spawn(async move {
            let outcome = payment_cycle::drive_to_terminal(
                service.gateway.as_ref(),
                &charge_id,
                owner_id,
                timings,
            )
            .await;
            service.finalize(task_cycle, charge_id, outcome).await;
        });
        *cycle.task.lock().unwrap() = Some(task);

        let view = self.assemble_view(&cycle);
        self.cycles.insert(cycle.id, cycle);
        Ok(view)
    }

    /// Declining is idempotent: no charge is attempted and repeating it has
    /// no further effect.
    #[instrument(skip(self), fields(charge_id = %original_charge_id))]
    pub async fn decline(&self, original_charge_id: &str) -> Result<(), ServiceError> {
        let sale = self
            .sales
            .find_by_charge(original_charge_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("sale for charge {} not found", original_charge_id))
            })?;

        if sale.upsell_charge_id.is_none() {
            self.event_sender
                .send(Event::UpsellDeclined { sale_id: sale.id })
                .await;
        }
        Ok(())
    }

    pub fn view(&self, cycle_id: Uuid) -> Result<UpsellCycleView, ServiceError> {
        let cycle = self
            .cycles
            .get(&cycle_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                ServiceError::NotFound(format!("upsell cycle {} not found", cycle_id))
            })?;
        Ok(self.assemble_view(&cycle))
    }

    /// Cancels the cycle's timers; maps to leaving the confirmation page.
    pub fn teardown(&self, cycle_id: Uuid) {
        if let Some((_, cycle)) = self.cycles.remove(&cycle_id) {
            if let Some(task) = cycle.task.lock().unwrap().take() {
                task.abort();
            }
            info!(%cycle_id, "upsell cycle torn down");
        }
    }

    async fn finalize(&self, cycle: Arc<UpsellCycle>, charge_id: String, outcome: CycleOutcome) {
        match outcome {
            CycleOutcome::Paid { .. } => {
                // No second sale row; the charge id is attached to the
                // existing sale instead.
                if let Err(e) = self
                    .sales
                    .attach_upsell_charge(cycle.sale_id, &charge_id)
                    .await
                {
                    error!(
                        sale_id = %cycle.sale_id,
                        %charge_id,
                        "attaching upsell charge failed after confirmed payment: {}", e
                    );
                }
                self.event_sender
                    .send(Event::PaymentConfirmed {
                        charge_id: charge_id.clone(),
                    })
                    .await;
                let mut state = cycle.state.lock().unwrap();
                state.last_error = None;
                state.phase = UpsellPhase::Paid { charge_id };
            }
            CycleOutcome::Cancelled => {
                self.finalize_not_completed(
                    &cycle,
                    charge_id,
                    UpsellPhase::Cancelled,
                    "The upsell payment was cancelled or refused.".into(),
                )
                .await;
            }
            CycleOutcome::Expired { timed_out } => {
                let message = if timed_out {
                    "Upsell payment confirmation timed out. Your original purchase is not \
                     affected."
                } else {
                    "The upsell charge expired before payment was confirmed."
                };
                self.finalize_not_completed(
                    &cycle,
                    charge_id,
                    UpsellPhase::Expired { timed_out },
                    message.into(),
                )
                .await;
            }
            CycleOutcome::Failed { message } => {
                self.finalize_not_completed(&cycle, charge_id, UpsellPhase::Failed, message)
                    .await;
            }
        }
    }

    async fn finalize_not_completed(
        &self,
        cycle: &Arc<UpsellCycle>,
        charge_id: String,
        phase: UpsellPhase,
        message: String,
    ) {
        warn!(sale_id = %cycle.sale_id, %charge_id, "upsell not completed: {}", message);
        self.event_sender
            .send(Event::PaymentNotCompleted {
                charge_id,
                status: phase.payment_status(),
            })
            .await;
        let mut state = cycle.state.lock().unwrap();
        state.last_error = Some(message);
        state.phase = phase;
    }

    fn assemble_view(&self, cycle: &Arc<UpsellCycle>) -> UpsellCycleView {
        let state = cycle.state.lock().unwrap();
        let charge = match &state.phase {
            UpsellPhase::AwaitingPayment { charge } => Some(ChargeView {
                charge_id: charge.id.clone(),
                qr_code: charge.qr_code.clone(),
                qr_code_image_base64: charge.qr_code_image_base64.clone(),
            }),
            UpsellPhase::Paid { charge_id } => Some(ChargeView {
                charge_id: charge_id.clone(),
                qr_code: String::new(),
                qr_code_image_base64: None,
            }),
            _ => None,
        };
        UpsellCycleView {
            cycle_id: cycle.id,
            sale_id: cycle.sale_id,
            phase: state.phase.label().to_string(),
            payment_status: state.phase.payment_status(),
            charge,
            error: state.last_error.clone(),
        }
    }
}

fn tracking_of(sale: &sale::Model) -> HashMap<String, String> {
    sale.tracking_params
        .as_ref()
        .and_then(|value| serde_json::from_value(value.clone()).ok())
        .unwrap_or_default()
}
