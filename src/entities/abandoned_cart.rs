use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Provisional record of checkout intent without a completed payment.
///
/// Created at most once per checkout session, after an inactivity delay.
/// Flips to `recovered` when the matching sale finalizes; otherwise stays
/// available for merchant follow-up.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "abandoned_carts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub owner_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub potential_value_cents: i64,
    #[sea_orm(nullable)]
    pub customer_name: Option<String>,
    pub customer_email: String,
    #[sea_orm(nullable)]
    pub customer_whatsapp: Option<String>,
    pub status: CartStatus,
    #[sea_orm(column_type = "Json", nullable)]
    pub tracking_params: Option<Json>,
    pub last_interaction_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Abandoned cart follow-up status.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    #[sea_orm(string_value = "not_contacted")]
    NotContacted,
    #[sea_orm(string_value = "email_sent")]
    EmailSent,
    #[sea_orm(string_value = "recovered")]
    Recovered,
    #[sea_orm(string_value = "ignored")]
    Ignored,
}
