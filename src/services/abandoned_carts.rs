//! Abandoned-cart persistence and follow-up transitions.
//!
//! Creation is driven by the checkout orchestrator's debounce timer; this
//! service only guards the durable record and its status transitions.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::abandoned_cart::{self, CartStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Checkout intent captured when the inactivity timer fires.
#[derive(Debug, Clone)]
pub struct NewAbandonedCart {
    pub owner_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub potential_value_cents: i64,
    pub customer_name: Option<String>,
    pub customer_email: String,
    pub customer_whatsapp: Option<String>,
    pub tracking_params: HashMap<String, String>,
}

#[derive(Clone)]
pub struct AbandonedCartService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl AbandonedCartService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, cart), fields(owner_id = %cart.owner_id))]
    pub async fn create_cart(
        &self,
        cart: NewAbandonedCart,
    ) -> Result<abandoned_cart::Model, ServiceError> {
        let now = Utc::now();
        let tracking_json = if cart.tracking_params.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&cart.tracking_params).map_err(|e| {
                ServiceError::SerializationError(format!("tracking params: {}", e))
            })?)
        };

        let record = abandoned_cart::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(cart.owner_id),
            product_id: Set(cart.product_id),
            product_name: Set(cart.product_name),
            potential_value_cents: Set(cart.potential_value_cents),
            customer_name: Set(cart.customer_name),
            customer_email: Set(cart.customer_email),
            customer_whatsapp: Set(cart.customer_whatsapp),
            status: Set(CartStatus::NotContacted),
            tracking_params: Set(tracking_json),
            last_interaction_at: Set(now),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let persisted = record.insert(&*self.db).await?;
        self.event_sender
            .send(Event::CartAbandoned(persisted.id))
            .await;
        Ok(persisted)
    }

    /// Flips the cart to `recovered` once its matching sale finalized.
    #[instrument(skip(self))]
    pub async fn mark_recovered(
        &self,
        cart_id: Uuid,
    ) -> Result<abandoned_cart::Model, ServiceError> {
        let cart = self.find(cart_id).await?;
        let mut active: abandoned_cart::ActiveModel = cart.into();
        active.status = Set(CartStatus::Recovered);
        active.last_interaction_at = Set(Utc::now());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        self.event_sender
            .send(Event::CartRecovered(updated.id))
            .await;
        info!(cart_id = %updated.id, "cart recovered");
        Ok(updated)
    }

    /// Merchant follow-up transition (`email_sent` / `ignored`).
    ///
    /// `recovered` is reserved for the sale-completion path and cannot be
    /// set manually; a recovered cart is closed to further follow-up.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        owner_id: Uuid,
        cart_id: Uuid,
        status: CartStatus,
    ) -> Result<abandoned_cart::Model, ServiceError> {
        if !matches!(status, CartStatus::EmailSent | CartStatus::Ignored) {
            return Err(ServiceError::InvalidOperation(
                "only email_sent and ignored can be set manually".into(),
            ));
        }

        let cart = self.find(cart_id).await?;
        if cart.owner_id != owner_id {
            return Err(ServiceError::Forbidden(
                "cart belongs to another merchant".into(),
            ));
        }
        if cart.status == CartStatus::Recovered {
            return Err(ServiceError::InvalidOperation(
                "recovered carts cannot be updated".into(),
            ));
        }

        let mut active: abandoned_cart::ActiveModel = cart.into();
        active.status = Set(status);
        active.last_interaction_at = Set(Utc::now());
        active.updated_at = Set(Utc::now());
        Ok(active.update(&*self.db).await?)
    }

    pub async fn list_for_owner(
        &self,
        owner_id: Uuid,
    ) -> Result<Vec<abandoned_cart::Model>, ServiceError> {
        Ok(abandoned_cart::Entity::find()
            .filter(abandoned_cart::Column::OwnerId.eq(owner_id))
            .order_by_desc(abandoned_cart::Column::LastInteractionAt)
            .all(&*self.db)
            .await?)
    }

    async fn find(&self, cart_id: Uuid) -> Result<abandoned_cart::Model, ServiceError> {
        abandoned_cart::Entity::find_by_id(cart_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("cart {} not found", cart_id)))
    }
}
