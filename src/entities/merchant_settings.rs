use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-merchant commission rates and tracking-webhook integration.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "merchant_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub owner_id: Uuid,
    /// Platform commission as a fraction (0.0499 = 4.99%).
    #[sea_orm(column_type = "Decimal(Some((10, 6)))")]
    pub commission_percent: Decimal,
    pub fixed_fee_cents: i64,
    #[sea_orm(nullable)]
    pub tracking_webhook_url: Option<String>,
    #[sea_orm(nullable)]
    pub tracking_webhook_token: Option<String>,
    pub tracking_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
