use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sellable item with optional order-bump and upsell offers.
///
/// A product carries at most one bump and one upsell; each points at
/// another product and may override its price.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    #[sea_orm(unique)]
    pub slug: String,
    pub name: String,
    pub price_cents: i64,
    #[sea_orm(nullable)]
    pub delivery_url: Option<String>,
    #[sea_orm(nullable)]
    pub bump_product_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub bump_price_cents: Option<i64>,
    #[sea_orm(nullable)]
    pub upsell_product_id: Option<Uuid>,
    #[sea_orm(nullable)]
    pub upsell_price_cents: Option<i64>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon::Entity")]
    Coupons,
}

impl Related<super::coupon::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Coupons.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
