//! Merchant settings lookup behind the TTL cache.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::SettingsCache;
use crate::config::CommissionConfig;
use crate::db::DbPool;
use crate::entities::merchant_settings;
use crate::errors::ServiceError;

#[derive(Clone)]
pub struct MerchantSettingsService {
    db: Arc<DbPool>,
    cache: Arc<SettingsCache>,
    defaults: CommissionConfig,
}

impl MerchantSettingsService {
    pub fn new(db: Arc<DbPool>, cache: Arc<SettingsCache>, defaults: CommissionConfig) -> Self {
        Self {
            db,
            cache,
            defaults,
        }
    }

    /// Resolves the settings for a merchant, falling back to the platform
    /// defaults when no row exists yet.
    #[instrument(skip(self))]
    pub async fn get(&self, owner_id: Uuid) -> Result<merchant_settings::Model, ServiceError> {
        if let Some(settings) = self.cache.get(owner_id) {
            return Ok(settings);
        }

        let settings = merchant_settings::Entity::find()
            .filter(merchant_settings::Column::OwnerId.eq(owner_id))
            .one(&*self.db)
            .await?
            .unwrap_or_else(|| self.default_settings(owner_id));

        self.cache.insert(settings.clone());
        Ok(settings)
    }

    fn default_settings(&self, owner_id: Uuid) -> merchant_settings::Model {
        let now = Utc::now();
        merchant_settings::Model {
            id: Uuid::new_v4(),
            owner_id,
            commission_percent: self.defaults.percentage(),
            fixed_fee_cents: self.defaults.fixed_fee_cents,
            tracking_webhook_url: None,
            tracking_webhook_token: None,
            tracking_enabled: false,
            created_at: now,
            updated_at: now,
        }
    }
}
