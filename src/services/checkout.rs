//! Checkout payment orchestrator.
//!
//! Each page visit owns an in-memory session holding the buyer draft, the
//! applied coupon, the computed quote and the payment phase. The phase is a
//! single tagged enum with one transition function, so states like
//! "polling while terminal" are unrepresentable. Timer-backed work (the
//! poll cycle and the abandoned-cart debounce) runs in tasks owned by the
//! session and aborted on teardown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::CheckoutConfig;
use crate::db::DbPool;
use crate::entities::{coupon, merchant_settings, product};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{
    ChargeBuyer, ChargeHandle, ChargeLineItem, CreateChargeRequest, PaymentStatus, PixGateway,
};
use crate::services::abandoned_carts::{AbandonedCartService, NewAbandonedCart};
use crate::services::drafts::{CheckoutDraft, DraftStore};
use crate::services::merchants::MerchantSettingsService;
use crate::services::payment_cycle::{self, CycleOutcome, CycleTimings};
use crate::services::pricing::{self, Quote};
use crate::services::sales::{CustomerSnapshot, OrderSnapshot, SaleLine, SalesService};

/// Buyer-entered form fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct BuyerFields {
    pub name: String,
    pub email: String,
    pub whatsapp_number: String,
    pub country_code: String,
}

impl BuyerFields {
    /// E.164-ish rendering of the whatsapp number: digits only, prefixed
    /// with the country code.
    pub fn formatted_whatsapp(&self) -> String {
        let cc = digits(&self.country_code);
        let number = digits(&self.whatsapp_number);
        let cc = if cc.is_empty() { "55".to_string() } else { cc };
        format!("+{}{}", cc, number)
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Payment phase of a checkout session.
#[derive(Debug, Clone)]
pub enum CheckoutPhase {
    Form,
    Submitting,
    AwaitingPayment { charge: ChargeHandle },
    Paid { charge_id: String, paid_at: DateTime<Utc> },
    Cancelled { charge_id: String },
    Expired { charge_id: String, timed_out: bool },
    Failed { charge_id: String },
}

impl CheckoutPhase {
    pub fn label(&self) -> &'static str {
        match self {
            CheckoutPhase::Form => "FORM",
            CheckoutPhase::Submitting => "SUBMITTING",
            CheckoutPhase::AwaitingPayment { .. } => "AWAITING_PAYMENT",
            CheckoutPhase::Paid { .. } => "PAID",
            CheckoutPhase::Cancelled { .. } => "CANCELLED",
            CheckoutPhase::Expired { .. } => "EXPIRED",
            CheckoutPhase::Failed { .. } => "FAILED",
        }
    }

    pub fn payment_status(&self) -> Option<PaymentStatus> {
        match self {
            CheckoutPhase::Form | CheckoutPhase::Submitting => None,
            CheckoutPhase::AwaitingPayment { charge } => Some(charge.status),
            CheckoutPhase::Paid { .. } => Some(PaymentStatus::Paid),
            CheckoutPhase::Cancelled { .. } => Some(PaymentStatus::Cancelled),
            CheckoutPhase::Expired { .. } => Some(PaymentStatus::Expired),
            CheckoutPhase::Failed { .. } => Some(PaymentStatus::Failed),
        }
    }

    /// Whether the buyer can edit fields and (re)submit from this phase.
    /// Non-PAID terminals are retryable; a retry starts a brand-new charge.
    pub fn accepts_changes(&self) -> bool {
        matches!(
            self,
            CheckoutPhase::Form
                | CheckoutPhase::Cancelled { .. }
                | CheckoutPhase::Expired { .. }
                | CheckoutPhase::Failed { .. }
        )
    }
}

struct SessionState {
    buyer: BuyerFields,
    coupon: Option<coupon::Model>,
    include_bump: bool,
    quote: Quote,
    phase: CheckoutPhase,
    cart_id: Option<Uuid>,
    last_error: Option<String>,
}

impl SessionState {
    /// The single place where phase changes happen.
    fn transition(&mut self, next: CheckoutPhase) -> Result<(), ServiceError> {
        let legal = matches!(
            (&self.phase, &next),
            (
                CheckoutPhase::Form
                    | CheckoutPhase::Cancelled { .. }
                    | CheckoutPhase::Expired { .. }
                    | CheckoutPhase::Failed { .. },
                CheckoutPhase::Submitting,
            ) | (
                CheckoutPhase::Submitting,
                CheckoutPhase::AwaitingPayment { .. } | CheckoutPhase::Form,
            ) | (
                CheckoutPhase::AwaitingPayment { .. },
                CheckoutPhase::Paid { .. }
                    | CheckoutPhase::Cancelled { .. }
                    | CheckoutPhase::Expired { .. }
                    | CheckoutPhase::Failed { .. },
            )
        );
        if !legal {
            return Err(ServiceError::InvalidOperation(format!(
                "illegal checkout transition {} -> {}",
                self.phase.label(),
                next.label()
            )));
        }
        self.phase = next;
        Ok(())
    }
}

#[derive(Default)]
struct SessionTasks {
    cycle: Option<JoinHandle<()>>,
    cart_debounce: Option<JoinHandle<()>>,
}

pub struct CheckoutSession {
    pub id: Uuid,
    product: product::Model,
    bump_product: Option<product::Model>,
    tracking_params: HashMap<String, String>,
    state: Mutex<SessionState>,
    tasks: Mutex<SessionTasks>,
}

/// Everything the poll-cycle finalizer needs, captured at submission time.
/// The quote is frozen here; later coupon or bump edits belong to the next
/// attempt.
struct SubmissionSnapshot {
    quote: Quote,
    customer: CustomerSnapshot,
    coupon_id: Option<Uuid>,
    coupon_code: Option<String>,
    settings: merchant_settings::Model,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChargeView {
    pub charge_id: String,
    pub qr_code: String,
    pub qr_code_image_base64: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BumpOfferView {
    pub product_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionView {
    pub session_id: Uuid,
    pub product_id: Uuid,
    pub product_slug: String,
    pub product_name: String,
    pub phase: String,
    pub payment_status: Option<PaymentStatus>,
    pub quote: Quote,
    pub buyer: BuyerFields,
    pub coupon_code: Option<String>,
    pub include_bump: bool,
    pub bump_offer: Option<BumpOfferView>,
    pub charge: Option<ChargeView>,
    pub error: Option<String>,
}

/// Payload for the public checkout page.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutPageView {
    pub product_id: Uuid,
    pub slug: String,
    pub name: String,
    pub price_cents: i64,
    pub bump_offer: Option<BumpOfferView>,
    pub automatic_coupon: Option<String>,
    pub draft: Option<CheckoutDraft>,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    gateway: Arc<dyn PixGateway>,
    sales: Arc<SalesService>,
    carts: Arc<AbandonedCartService>,
    drafts: Arc<DraftStore>,
    merchants: Arc<MerchantSettingsService>,
    event_sender: EventSender,
    config: CheckoutConfig,
    sessions: Arc<DashMap<Uuid, Arc<CheckoutSession>>>,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PixGateway>,
        sales: Arc<SalesService>,
        carts: Arc<AbandonedCartService>,
        drafts: Arc<DraftStore>,
        merchants: Arc<MerchantSettingsService>,
        event_sender: EventSender,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            db,
            gateway,
            sales,
            carts,
            drafts,
            merchants,
            event_sender,
            config,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Public checkout page payload: product, bump offer, pre-selected
    /// automatic coupon and any stored draft for the slug.
    #[instrument(skip(self))]
    pub async fn checkout_page(&self, slug: &str) -> Result<CheckoutPageView, ServiceError> {
        let (product, bump_product, auto_coupon) = self.load_context(slug).await?;
        Ok(CheckoutPageView {
            product_id: product.id,
            slug: product.slug.clone(),
            name: product.name.clone(),
            price_cents: product.price_cents,
            bump_offer: bump_offer_view(&product, bump_product.as_ref()),
            automatic_coupon: auto_coupon.map(|c| c.code),
            draft: self.drafts.load(slug),
        })
    }

    /// Opens a checkout session for a product, capturing the page's query
    /// parameters verbatim as tracking params and hydrating buyer fields
    /// from the draft store.
    #[instrument(skip(self, tracking_params))]
    pub async fn open_session(
        &self,
        slug: &str,
        tracking_params: HashMap<String, String>,
    ) -> Result<SessionView, ServiceError> {
        let (product, bump_product, auto_coupon) = self.load_context(slug).await?;

        let buyer = match self.drafts.load(slug) {
            Some(draft) => BuyerFields {
                name: draft.customer_name,
                email: draft.customer_email,
                whatsapp_number: draft.whatsapp_number,
                country_code: draft.country_code,
            },
            None => BuyerFields {
                country_code: "55".into(),
                ..Default::default()
            },
        };

        let quote = pricing::resolve_quote(&product, bump_product.as_ref(), auto_coupon.as_ref(), false)?;

        let session = Arc::new(CheckoutSession {
            id: Uuid::new_v4(),
            product,
            bump_product,
            tracking_params,
            state: Mutex::new(SessionState {
                buyer,
                coupon: auto_coupon,
                include_bump: false,
                quote,
                phase: CheckoutPhase::Form,
                cart_id: None,
                last_error: None,
            }),
            tasks: Mutex::new(SessionTasks::default()),
        });

        self.event_sender
            .send(Event::CheckoutSessionOpened {
                session_id: session.id,
                product_id: session.product.id,
            })
            .await;

        let view = self.assemble_view(&session);
        self.sessions.insert(session.id, session);
        Ok(view)
    }

    pub fn view(&self, session_id: Uuid) -> Result<SessionView, ServiceError> {
        let session = self.session(session_id)?;
        Ok(self.assemble_view(&session))
    }

    /// Updates buyer fields, persists the draft and re-arms the
    /// abandoned-cart debounce. Independent of the payment timers.
    pub fn update_buyer(
        &self,
        session_id: Uuid,
        buyer: BuyerFields,
    ) -> Result<SessionView, ServiceError> {
        let session = self.session(session_id)?;

        {
            let mut state = session.state.lock().unwrap();
            if !state.phase.accepts_changes() {
                return Err(ServiceError::InvalidOperation(
                    "buyer fields are locked while a payment is in flight".into(),
                ));
            }
            state.buyer = buyer.clone();
        }

        self.drafts.save(CheckoutDraft {
            slug: session.product.slug.clone(),
            customer_name: buyer.name.clone(),
            customer_email: buyer.email.clone(),
            whatsapp_number: buyer.whatsapp_number.clone(),
            country_code: buyer.country_code.clone(),
        });

        if !buyer.email.trim().is_empty() {
            self.arm_cart_debounce(&session);
        }

        Ok(self.assemble_view(&session))
    }

    /// Applies a coupon by code (case-insensitive) after validating it.
    pub async fn apply_coupon(
        &self,
        session_id: Uuid,
        code: &str,
    ) -> Result<SessionView, ServiceError> {
        let session = self.session(session_id)?;

        let coupons = coupon::Entity::find()
            .filter(coupon::Column::ProductId.eq(session.product.id))
            .all(&*self.db)
            .await?;
        let found = coupons
            .into_iter()
            .find(|c| c.matches_code(code) && c.is_applicable(Utc::now()))
            .ok_or_else(|| {
                ServiceError::ValidationError(format!("coupon '{}' is not valid", code.trim()))
            })?;

        let mut state = session.state.lock().unwrap();
        if !state.phase.accepts_changes() {
            return Err(ServiceError::InvalidOperation(
                "coupon cannot change while a payment is in flight".into(),
            ));
        }
        state.coupon = Some(found);
        state.quote = pricing::resolve_quote(
            &session.product,
            session.bump_product.as_ref(),
            state.coupon.as_ref(),
            state.include_bump,
        )?;
        drop(state);
        Ok(self.assemble_view(&session))
    }

    pub fn remove_coupon(&self, session_id: Uuid) -> Result<SessionView, ServiceError> {
        let session = self.session(session_id)?;
        let mut state = session.state.lock().unwrap();
        if !state.phase.accepts_changes() {
            return Err(ServiceError::InvalidOperation(
                "coupon cannot change while a payment is in flight".into(),
            ));
        }
        state.coupon = None;
        state.quote = pricing::resolve_quote(
            &session.product,
            session.bump_product.as_ref(),
            None,
            state.include_bump,
        )?;
        drop(state);
        Ok(self.assemble_view(&session))
    }

    pub fn set_bump(
        &self,
        session_id: Uuid,
        include: bool,
    ) -> Result<SessionView, ServiceError> {
        let session = self.session(session_id)?;
        if include && session.product.bump_product_id.is_none() {
            return Err(ServiceError::InvalidOperation(
                "product has no order-bump offer".into(),
            ));
        }
        let mut state = session.state.lock().unwrap();
        if !state.phase.accepts_changes() {
            return Err(ServiceError::InvalidOperation(
                "order can no longer change while a payment is in flight".into(),
            ));
        }
        state.include_bump = include;
        state.quote = pricing::resolve_quote(
            &session.product,
            session.bump_product.as_ref(),
            state.coupon.as_ref(),
            include,
        )?;
        drop(state);
        Ok(self.assemble_view(&session))
    }

    /// Runs the submission leg of the state machine: validate, create the
    /// charge, then hand over to the poll cycle. A failed creation returns
    /// the session to `FORM` and schedules nothing.
    #[instrument(skip(self, customer_ip, session_id), fields(session_id = %session_id))]
    pub async fn submit(
        &self,
        session_id: Uuid,
        customer_ip: Option<String>,
    ) -> Result<SessionView, ServiceError> {
        let session = self.session(session_id)?;

        let (quote, customer, coupon_id, coupon_code) = {
            let mut state = session.state.lock().unwrap();
            if !state.phase.accepts_changes() {
                return Err(ServiceError::InvalidOperation(
                    "a submission is already in progress or completed".into(),
                ));
            }

            let buyer = &state.buyer;
            if buyer.name.trim().is_empty()
                || buyer.email.trim().is_empty()
                || digits(&buyer.whatsapp_number).is_empty()
            {
                let message = "name, email and whatsapp are required".to_string();
                state.last_error = Some(message.clone());
                return Err(ServiceError::ValidationError(message));
            }

            let customer = CustomerSnapshot {
                name: buyer.name.trim().to_string(),
                email: buyer.email.trim().to_string(),
                whatsapp: buyer.formatted_whatsapp(),
                ip: customer_ip,
            };
            state.last_error = None;
            state.transition(CheckoutPhase::Submitting)?;
            (
                state.quote.clone(),
                customer,
                state.coupon.as_ref().map(|c| c.id),
                state.coupon.as_ref().map(|c| c.code.clone()),
            )
        };

        let settings = match self.merchants.get(session.product.owner_id).await {
            Ok(settings) => settings,
            Err(e) => {
                let mut state = session.state.lock().unwrap();
                state.last_error = Some("merchant settings unavailable".into());
                let _ = state.transition(CheckoutPhase::Form);
                return Err(e);
            }
        };

        let request = CreateChargeRequest {
            owner_id: session.product.owner_id,
            amount_cents: quote.final_price_cents,
            original_amount_cents: quote.original_price_cents,
            buyer: ChargeBuyer {
                name: customer.name.clone(),
                email: customer.email.clone(),
                whatsapp: customer.whatsapp.clone(),
                ip: customer.ip.clone(),
            },
            line_items: quote
                .line_items
                .iter()
                .map(|item| ChargeLineItem {
                    product_id: item.product_id,
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    is_order_bump: item.is_order_bump,
                    is_upsell: false,
                })
                .collect(),
            tracking_params: session.tracking_params.clone(),
            coupon_code: coupon_code.clone(),
            discount_cents: (quote.discount_cents > 0).then_some(quote.discount_cents),
            is_upsell: false,
            original_sale_id: None,
        };

        let handle = match self.gateway.create_charge(&request).await {
            Ok(handle) => handle,
            Err(e) => {
                let mut state = session.state.lock().unwrap();
                state.last_error = Some(e.to_string());
                let _ = state.transition(CheckoutPhase::Form);
                return Err(ServiceError::GatewayError(e));
            }
        };

        info!(charge_id = %handle.id, amount = quote.final_price_cents, "charge created");
        self.event_sender
            .send(Event::ChargeCreated {
                session_id,
                charge_id: handle.id.clone(),
                amount_cents: quote.final_price_cents,
                is_upsell: false,
            })
            .await;

        {
            let mut state = session.state.lock().unwrap();
            state.transition(CheckoutPhase::AwaitingPayment {
                charge: handle.clone(),
            })?;
        }

        let snapshot = SubmissionSnapshot {
            quote,
            customer,
            coupon_id,
            coupon_code,
            settings,
        };
        self.spawn_cycle(&session, handle.id, snapshot);

        Ok(self.assemble_view(&session))
    }

    /// Tears the session down, cancelling the poll cycle and the
    /// abandoned-cart debounce. Maps to the buyer navigating away.
    pub fn teardown(&self, session_id: Uuid) {
        if let Some((_, session)) = self.sessions.remove(&session_id) {
            let mut tasks = session.tasks.lock().unwrap();
            if let Some(task) = tasks.cycle.take() {
                task.abort();
            }
            if let Some(task) = tasks.cart_debounce.take() {
                task.abort();
            }
            info!(%session_id, "checkout session torn down");
        }
    }

    fn session(&self, session_id: Uuid) -> Result<Arc<CheckoutSession>, ServiceError> {
        self.sessions
            .get(&session_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                ServiceError::NotFound(format!("checkout session {} not found", session_id))
            })
    }

    async fn load_context(
        &self,
        slug: &str,
    ) -> Result<(product::Model, Option<product::Model>, Option<coupon::Model>), ServiceError>
    {
        let product = product::Entity::find()
            .filter(product::Column::Slug.eq(slug))
            .filter(product::Column::Active.eq(true))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("product '{}' not found", slug)))?;

        let bump_product = match product.bump_product_id {
            Some(bump_id) => product::Entity::find_by_id(bump_id).one(&*self.db).await?,
            None => None,
        };

        let auto_coupon = coupon::Entity::find()
            .filter(coupon::Column::ProductId.eq(product.id))
            .filter(coupon::Column::Automatic.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .find(|c| c.is_applicable(Utc::now()));

        Ok((product, bump_product, auto_coupon))
    }

    /// Re-arms the one-shot abandoned-cart timer. The timer is debounced on
    /// every buyer-field change and guarded by the stored cart id so only
    /// one record is ever created per session.
    fn arm_cart_debounce(&self, session: &Arc<CheckoutSession>) {
        {
            let state = session.state.lock().unwrap();
            if state.cart_id.is_some() || !state.phase.accepts_changes() {
                return;
            }
        }

        let delay = self.config.abandoned_cart_delay();
        let service = self.clone();
        let task_session = Arc::clone(session);

        let mut tasks = session.tasks.lock().unwrap();
        if let Some(previous) = tasks.cart_debounce.take() {
            previous.abort();
        }
        tasks.cart_debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            service.create_cart_if_absent(task_session).await;
        }));
    }

    async fn create_cart_if_absent(&self, session: Arc<CheckoutSession>) {
        let new_cart = {
            let state = session.state.lock().unwrap();
            if state.cart_id.is_some() || matches!(state.phase, CheckoutPhase::Paid { .. }) {
                return;
            }
            let Some(email) = non_empty(&state.buyer.email) else {
                return;
            };
            NewAbandonedCart {
                owner_id: session.product.owner_id,
                product_id: session.product.id,
                product_name: session.product.name.clone(),
                potential_value_cents: state.quote.final_price_cents,
                customer_name: non_empty(&state.buyer.name),
                customer_email: email,
                customer_whatsapp: non_empty(&state.buyer.whatsapp_number)
                    .map(|_| state.buyer.formatted_whatsapp()),
                tracking_params: session.tracking_params.clone(),
            }
        };

        match self.carts.create_cart(new_cart).await {
            Ok(cart) => {
                let mut state = session.state.lock().unwrap();
                if state.cart_id.is_none() {
                    state.cart_id = Some(cart.id);
                }
            }
            Err(e) => warn!(session_id = %session.id, "abandoned-cart creation failed: {}", e),
        }
    }

    fn spawn_cycle(
        &self,
        session: &Arc<CheckoutSession>,
        charge_id: String,
        snapshot: SubmissionSnapshot,
    ) {
        let service = self.clone();
        let task_session = Arc::clone(session);
        let timings = CycleTimings::from(&service.config);

        let mut tasks = session.tasks.lock().unwrap();
        if let Some(previous) = tasks.cycle.take() {
            // A retry discards the old charge's cycle entirely.
            previous.abort();
        }
        tasks.cycle = Some(tokio::spawn(async move {
            let outcome = payment_cycle::drive_to_terminal(
                service.gateway.as_ref(),
                &charge_id,
                task_session.product.owner_id,
                timings,
            )
            .await;
            service
                .finalize_cycle(task_session, charge_id, outcome, snapshot)
                .await;
        }));
    }

    async fn finalize_cycle(
        &self,
        session: Arc<CheckoutSession>,
        charge_id: String,
        outcome: CycleOutcome,
        snapshot: SubmissionSnapshot,
    ) {
        match outcome {
            CycleOutcome::Paid { paid_at } => {
                self.finalize_paid(&session, charge_id, paid_at, snapshot).await;
            }
            CycleOutcome::Cancelled => {
                self.finalize_not_completed(
                    &session,
                    CheckoutPhase::Cancelled {
                        charge_id: charge_id.clone(),
                    },
                    "The payment was cancelled or refused. Submit again to generate a new charge."
                        .into(),
                )
                .await;
            }
            CycleOutcome::Expired { timed_out } => {
                let message = if timed_out {
                    "Payment confirmation timed out. If you already completed the PIX \
                     transfer, contact support before paying again."
                } else {
                    "The PIX charge expired before payment was confirmed. Submit again to \
                     generate a new charge."
                };
                self.finalize_not_completed(
                    &session,
                    CheckoutPhase::Expired {
                        charge_id: charge_id.clone(),
                        timed_out,
                    },
                    message.into(),
                )
                .await;
            }
            CycleOutcome::Failed { message } => {
                self.finalize_not_completed(
                    &session,
                    CheckoutPhase::Failed {
                        charge_id: charge_id.clone(),
                    },
                    message,
                )
                .await;
            }
        }
    }

    async fn finalize_paid(
        &self,
        session: &Arc<CheckoutSession>,
        charge_id: String,
        paid_at: DateTime<Utc>,
        snapshot: SubmissionSnapshot,
    ) {
        let order = OrderSnapshot {
            owner_id: session.product.owner_id,
            charge_id: charge_id.clone(),
            lines: snapshot
                .quote
                .line_items
                .iter()
                .map(|item| SaleLine {
                    product_id: item.product_id,
                    product_name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price_cents: item.unit_price_cents,
                    original_price_cents: item.original_price_cents,
                    is_order_bump: item.is_order_bump,
                    is_upsell: false,
                    delivery_url: item.delivery_url.clone(),
                })
                .collect(),
            customer: snapshot.customer,
            total_cents: snapshot.quote.final_price_cents,
            original_total_cents: snapshot.quote.original_price_cents,
            discount_cents: snapshot.quote.discount_cents,
            coupon_id: snapshot.coupon_id,
            coupon_code: snapshot.coupon_code,
            tracking_params: session.tracking_params.clone(),
            paid_at,
        };

        if let Err(e) = self.sales.record_sale(order, &snapshot.settings).await {
            // The buyer already paid; losing the record is a bookkeeping
            // gap that must be visible in the logs.
            error!(
                %charge_id,
                "sale recording failed after confirmed payment: {}", e
            );
        }

        let cart_id = session.state.lock().unwrap().cart_id;
        if let Some(cart_id) = cart_id {
            if let Err(e) = self.carts.mark_recovered(cart_id).await {
                warn!(%cart_id, "failed to mark cart recovered: {}", e);
            }
        }

        self.drafts.clear(&session.product.slug);
        self.event_sender
            .send(Event::PaymentConfirmed {
                charge_id: charge_id.clone(),
            })
            .await;

        let mut state = session.state.lock().unwrap();
        state.last_error = None;
        if let Err(e) = state.transition(CheckoutPhase::Paid { charge_id, paid_at }) {
            warn!(session_id = %session.id, "late cycle result dropped: {}", e);
        }
    }

    async fn finalize_not_completed(
        &self,
        session: &Arc<CheckoutSession>,
        phase: CheckoutPhase,
        message: String,
    ) {
        let charge_id = match &phase {
            CheckoutPhase::Cancelled { charge_id }
            | CheckoutPhase::Failed { charge_id }
            | CheckoutPhase::Expired { charge_id, .. } => charge_id.clone(),
            _ => String::new(),
        };
        self.event_sender
            .send(Event::PaymentNotCompleted {
                charge_id,
                status: phase.payment_status().unwrap_or(PaymentStatus::Failed),
            })
            .await;

        let mut state = session.state.lock().unwrap();
        state.last_error = Some(message);
        if let Err(e) = state.transition(phase) {
            warn!(session_id = %session.id, "late cycle result dropped: {}", e);
        }
    }

    fn assemble_view(&self, session: &Arc<CheckoutSession>) -> SessionView {
        let state = session.state.lock().unwrap();
        let charge = match &state.phase {
            CheckoutPhase::AwaitingPayment { charge } => Some(ChargeView {
                charge_id: charge.id.clone(),
                qr_code: charge.qr_code.clone(),
                qr_code_image_base64: charge.qr_code_image_base64.clone(),
            }),
            CheckoutPhase::Paid { charge_id, .. } => Some(ChargeView {
                charge_id: charge_id.clone(),
                qr_code: String::new(),
                qr_code_image_base64: None,
            }),
            _ => None,
        };

        SessionView {
            session_id: session.id,
            product_id: session.product.id,
            product_slug: session.product.slug.clone(),
            product_name: session.product.name.clone(),
            phase: state.phase.label().to_string(),
            payment_status: state.phase.payment_status(),
            quote: state.quote.clone(),
            buyer: state.buyer.clone(),
            coupon_code: state.coupon.as_ref().map(|c| c.code.clone()),
            include_bump: state.include_bump,
            bump_offer: bump_offer_view(&session.product, session.bump_product.as_ref()),
            charge,
            error: state.last_error.clone(),
        }
    }
}

fn bump_offer_view(
    product: &product::Model,
    bump_product: Option<&product::Model>,
) -> Option<BumpOfferView> {
    let bump_id = product.bump_product_id?;
    let price_cents = product
        .bump_price_cents
        .or_else(|| bump_product.map(|p| p.price_cents))?;
    Some(BumpOfferView {
        product_id: bump_id,
        name: bump_product
            .map(|p| p.name.clone())
            .unwrap_or_else(|| "Order bump".to_string()),
        price_cents,
    })
}
