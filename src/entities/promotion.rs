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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PromotionType {
    #[sea_orm(string_value = "percentage_discount")]
    PercentageDiscount,
    #[sea_orm(string_value = "fixed_amount_discount")]
    FixedAmountDiscount,
    #[sea_orm(string_value = "free_shipping")]
    FreeShipping,
}

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
pub enum PromotionTarget {
    #[sea_orm(string_value = "all_products")]
    AllProducts,
    #[sea_orm(string_value = "category")]
    Category,
    #[sea_orm(string_value = "product")]
    Product,
}

/// Time-boxed automatic discount. Active when `is_active` and the evaluation
/// instant falls inside `[start_date, end_date]`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "promotions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    #[sea_orm(nullable)]
    pub description: Option<String>,
    pub promotion_type: PromotionType,
    pub target_type: PromotionTarget,
    #[sea_orm(nullable)]
    pub target_id: Option<Uuid>,
    pub discount_value: i64,
    pub min_purchase_amount: i64,
    #[sea_orm(nullable)]
    pub max_discount_amount: Option<i64>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && now <= self.end_date
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
