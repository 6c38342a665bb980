use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Durable record of a completed purchase.
///
/// Created exactly once per successful charge and never mutated afterward,
/// except to attach the charge id of a post-purchase upsell.
/// Invariants: `total_cents = original_total_cents - discount_cents` and
/// `net_cents = (total_cents - gateway_fee_cents) - platform_fee_cents`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sales")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    #[sea_orm(unique)]
    pub charge_id: String,
    #[sea_orm(nullable)]
    pub upsell_charge_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_whatsapp: String,
    #[sea_orm(nullable)]
    pub customer_ip: Option<String>,
    pub payment_method: String,
    /// Canonical payment status string (`PAID` for every recorded sale).
    pub status: String,
    pub total_cents: i64,
    pub original_total_cents: i64,
    pub discount_cents: i64,
    #[sea_orm(nullable)]
    pub coupon_code: Option<String>,
    #[sea_orm(column_type = "Json", nullable)]
    pub tracking_params: Option<Json>,
    pub gateway_fee_cents: i64,
    pub platform_fee_cents: i64,
    pub net_cents: i64,
    pub created_at: DateTime<Utc>,
    pub paid_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::sale_item::Entity")]
    Items,
}

impl Related<super::sale_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
