use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection,
    DatabaseTransaction, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::{Actor, Capability};
use crate::entities::coupon::{self, DiscountType, Entity as Coupon, Model as CouponModel};
use crate::errors::ServiceError;
use crate::money::{Cents, FULL_PERCENT_BPS};

const MAX_CODE_LEN: usize = 64;

/// Admin management of coupons plus the lookups and usage accounting
/// checkout relies on.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: CreateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        actor.require(Capability::ManageCoupons)?;

        let code = normalize_code(&input.code)?;
        validate_terms(
            input.discount_type,
            input.discount_value,
            input.min_purchase_amount,
            input.max_discount_amount,
            input.usage_limit,
        )?;

        if self.find_by_code(&code).await?.is_some() {
            return Err(ServiceError::BadRequest(format!(
                "Coupon code '{}' already exists",
                code
            )));
        }

        let now = Utc::now();
        let coupon = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            discount_type: Set(input.discount_type),
            discount_value: Set(input.discount_value),
            min_purchase_amount: Set(input.min_purchase_amount),
            max_discount_amount: Set(input.max_discount_amount),
            usage_limit: Set(input.usage_limit),
            times_used: Set(0),
            expires_at: Set(input.expires_at),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(coupon_id = %coupon.id, code = %coupon.code, "coupon created");
        Ok(coupon)
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.user_id))]
    pub async fn update(
        &self,
        actor: &Actor,
        coupon_id: Uuid,
        input: UpdateCouponInput,
    ) -> Result<CouponModel, ServiceError> {
        actor.require(Capability::ManageCoupons)?;

        let existing = self.get(coupon_id).await?;

        let code = match input.code.as_deref() {
            Some(raw) => {
                let code = normalize_code(raw)?;
                if code != existing.code {
                    if let Some(other) = self.find_by_code(&code).await? {
                        if other.id != coupon_id {
                            return Err(ServiceError::BadRequest(format!(
                                "Coupon code '{}' already exists",
                                code
                            )));
                        }
                    }
                }
                code
            }
            None => existing.code.clone(),
        };

        let discount_type = input.discount_type.unwrap_or(existing.discount_type);
        let discount_value = input.discount_value.unwrap_or(existing.discount_value);
        let min_purchase_amount = input
            .min_purchase_amount
            .unwrap_or(existing.min_purchase_amount);
        let max_discount_amount = input
            .max_discount_amount
            .unwrap_or(existing.max_discount_amount);
        let usage_limit = input.usage_limit.unwrap_or(existing.usage_limit);
        validate_terms(
            discount_type,
            discount_value,
            min_purchase_amount,
            max_discount_amount,
            usage_limit,
        )?;

        let mut active: coupon::ActiveModel = existing.clone().into();
        active.code = Set(code);
        active.discount_type = Set(discount_type);
        active.discount_value = Set(discount_value);
        active.min_purchase_amount = Set(min_purchase_amount);
        active.max_discount_amount = Set(max_discount_amount);
        active.usage_limit = Set(usage_limit);
        active.expires_at = Set(input.expires_at.unwrap_or(existing.expires_at));
        active.is_active = Set(input.is_active.unwrap_or(existing.is_active));
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!(coupon_id = %updated.id, "coupon updated");
        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn delete(&self, actor: &Actor, coupon_id: Uuid) -> Result<(), ServiceError> {
        actor.require(Capability::ManageCoupons)?;

        let result = Coupon::delete_by_id(coupon_id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Coupon {} not found",
                coupon_id
            )));
        }
        info!(%coupon_id, "coupon deleted");
        Ok(())
    }

    pub async fn list(
        &self,
        actor: &Actor,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CouponModel>, u64), ServiceError> {
        actor.require(Capability::ManageCoupons)?;

        let paginator = Coupon::find()
            .order_by_desc(coupon::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn get(&self, coupon_id: Uuid) -> Result<CouponModel, ServiceError> {
        Coupon::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Coupon {} not found", coupon_id)))
    }

    /// Case-insensitive lookup; codes are stored upper-case.
    pub async fn find_by_code(&self, code: &str) -> Result<Option<CouponModel>, ServiceError> {
        let code = code.trim().to_uppercase();
        if code.is_empty() {
            return Ok(None);
        }
        Ok(Coupon::find()
            .filter(coupon::Column::Code.eq(code))
            .one(&*self.db)
            .await?)
    }

    /// Records one use of a coupon inside the checkout transaction.
    ///
    /// The update only matches while the coupon is active and below its usage
    /// limit, so concurrent checkouts cannot push `times_used` past the limit.
    pub async fn redeem(
        &self,
        txn: &DatabaseTransaction,
        coupon_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        let result = Coupon::update_many()
            .col_expr(
                coupon::Column::TimesUsed,
                Expr::col(coupon::Column::TimesUsed).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(now))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::TimesUsed)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(txn)
            .await?;

        if result.rows_affected == 0 {
            warn!(%coupon_id, "coupon redemption lost a race for its last use");
            return Err(ServiceError::InvalidCoupon(
                "coupon usage limit has been reached".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trims and upper-cases a coupon code, rejecting empty or oddly formed codes.
pub fn normalize_code(raw: &str) -> Result<String, ServiceError> {
    let code = raw.trim().to_uppercase();
    if code.is_empty() || code.len() > MAX_CODE_LEN {
        return Err(ServiceError::BadRequest(format!(
            "Coupon code must be 1 to {} characters",
            MAX_CODE_LEN
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ServiceError::BadRequest(
            "Coupon code may only contain letters, digits, '-' and '_'".to_string(),
        ));
    }
    Ok(code)
}

fn validate_terms(
    discount_type: DiscountType,
    discount_value: i64,
    min_purchase_amount: Cents,
    max_discount_amount: Option<Cents>,
    usage_limit: Option<i32>,
) -> Result<(), ServiceError> {
    match discount_type {
        DiscountType::Percentage if discount_value <= 0 || discount_value > FULL_PERCENT_BPS => {
            return Err(ServiceError::BadRequest(
                "Percentage discount must be greater than 0 and at most 100".to_string(),
            ));
        }
        DiscountType::FixedAmount if discount_value <= 0 => {
            return Err(ServiceError::BadRequest(
                "Fixed discount amount must be greater than 0".to_string(),
            ));
        }
        _ => {}
    }
    if min_purchase_amount < 0 {
        return Err(ServiceError::BadRequest(
            "Minimum purchase amount cannot be negative".to_string(),
        ));
    }
    if matches!(max_discount_amount, Some(cap) if cap <= 0) {
        return Err(ServiceError::BadRequest(
            "Maximum discount amount must be greater than 0".to_string(),
        ));
    }
    if matches!(usage_limit, Some(limit) if limit < 1) {
        return Err(ServiceError::BadRequest(
            "Usage limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Coupon terms in storage units: basis points or cents.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCouponInput {
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub min_purchase_amount: Cents,
    pub max_discount_amount: Option<Cents>,
    pub usage_limit: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Partial coupon update. Nullable columns use a nested option so that
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateCouponInput {
    pub code: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<i64>,
    pub min_purchase_amount: Option<Cents>,
    pub max_discount_amount: Option<Option<Cents>>,
    pub usage_limit: Option<Option<i32>>,
    pub expires_at: Option<Option<DateTime<Utc>>>,
    pub is_active: Option<bool>,
}
