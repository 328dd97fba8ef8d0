use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

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
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed_amount")]
    FixedAmount,
}

/// Admin-managed coupon. `code` is stored upper-case; `discount_value` is
/// basis points for percentages and cents for fixed amounts.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_purchase_amount: i64,
    #[sea_orm(nullable)]
    pub max_discount_amount: Option<i64>,
    #[sea_orm(nullable)]
    pub usage_limit: Option<i32>,
    pub times_used: i32,
    #[sea_orm(nullable)]
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn usage_exhausted(&self) -> bool {
        self.usage_limit
            .map(|limit| self.times_used >= limit)
            .unwrap_or(false)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
