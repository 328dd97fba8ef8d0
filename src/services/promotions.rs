use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{Actor, Capability};
use crate::entities::promotion::{
    self, Entity as Promotion, Model as PromotionModel, PromotionTarget, PromotionType,
};
use crate::errors::ServiceError;
use crate::money::{Cents, FULL_PERCENT_BPS};
use crate::services::discounts::promotion_precedence;

#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
}

impl PromotionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.user_id, name = %input.name))]
    pub async fn create(
        &self,
        actor: &Actor,
        input: CreatePromotionInput,
    ) -> Result<PromotionModel, ServiceError> {
        actor.require(Capability::ManagePromotions)?;

        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(ServiceError::BadRequest(
                "Promotion name is required".to_string(),
            ));
        }
        let terms = PromotionTerms {
            promotion_type: input.promotion_type,
            target_type: input.target_type,
            target_id: input.target_id,
            discount_value: input.discount_value,
            min_purchase_amount: input.min_purchase_amount,
            max_discount_amount: input.max_discount_amount,
            start_date: input.start_date,
            end_date: input.end_date,
        };
        terms.validate()?;

        let now = Utc::now();
        let promotion = promotion::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name),
            description: Set(input.description),
            promotion_type: Set(terms.promotion_type),
            target_type: Set(terms.target_type),
            target_id: Set(terms.normalized_target()),
            discount_value: Set(terms.discount_value),
            min_purchase_amount: Set(terms.min_purchase_amount),
            max_discount_amount: Set(terms.max_discount_amount),
            start_date: Set(terms.start_date),
            end_date: Set(terms.end_date),
            is_active: Set(input.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(promotion_id = %promotion.id, "promotion created");
        Ok(promotion)
    }

    #[instrument(skip(self, actor, input), fields(actor = %actor.user_id))]
    pub async fn update(
        &self,
        actor: &Actor,
        promotion_id: Uuid,
        input: UpdatePromotionInput,
    ) -> Result<PromotionModel, ServiceError> {
        actor.require(Capability::ManagePromotions)?;

        let existing = self.get(promotion_id).await?;

        let name = match input.name {
            Some(name) if name.trim().is_empty() => {
                return Err(ServiceError::BadRequest(
                    "Promotion name is required".to_string(),
                ))
            }
            Some(name) => name.trim().to_string(),
            None => existing.name.clone(),
        };
        let terms = PromotionTerms {
            promotion_type: input.promotion_type.unwrap_or(existing.promotion_type),
            target_type: input.target_type.unwrap_or(existing.target_type),
            target_id: input.target_id.unwrap_or(existing.target_id),
            discount_value: input.discount_value.unwrap_or(existing.discount_value),
            min_purchase_amount: input
                .min_purchase_amount
                .unwrap_or(existing.min_purchase_amount),
            max_discount_amount: input
                .max_discount_amount
                .unwrap_or(existing.max_discount_amount),
            start_date: input.start_date.unwrap_or(existing.start_date),
            end_date: input.end_date.unwrap_or(existing.end_date),
        };
        terms.validate()?;

        let mut active: promotion::ActiveModel = existing.clone().into();
        active.name = Set(name);
        active.description = Set(input.description.unwrap_or(existing.description));
        active.promotion_type = Set(terms.promotion_type);
        active.target_type = Set(terms.target_type);
        active.target_id = Set(terms.normalized_target());
        active.discount_value = Set(terms.discount_value);
        active.min_purchase_amount = Set(terms.min_purchase_amount);
        active.max_discount_amount = Set(terms.max_discount_amount);
        active.start_date = Set(terms.start_date);
        active.end_date = Set(terms.end_date);
        active.is_active = Set(input.is_active.unwrap_or(existing.is_active));
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;
        info!(promotion_id = %updated.id, "promotion updated");
        Ok(updated)
    }

    #[instrument(skip(self, actor), fields(actor = %actor.user_id))]
    pub async fn delete(&self, actor: &Actor, promotion_id: Uuid) -> Result<(), ServiceError> {
        actor.require(Capability::ManagePromotions)?;

        let result = Promotion::delete_by_id(promotion_id)
            .exec(&*self.db)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Promotion {} not found",
                promotion_id
            )));
        }
        info!(%promotion_id, "promotion deleted");
        Ok(())
    }

    pub async fn list(
        &self,
        actor: &Actor,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<PromotionModel>, u64), ServiceError> {
        actor.require(Capability::ManagePromotions)?;

        let paginator = Promotion::find()
            .order_by_desc(promotion::Column::StartDate)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn get(&self, promotion_id: Uuid) -> Result<PromotionModel, ServiceError> {
        Promotion::find_by_id(promotion_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Promotion {} not found", promotion_id)))
    }

    /// Promotions active at `now`, earliest start first.
    pub async fn active_at(&self, now: DateTime<Utc>) -> Result<Vec<PromotionModel>, ServiceError> {
        let mut promotions = Promotion::find()
            .filter(promotion::Column::IsActive.eq(true))
            .filter(promotion::Column::StartDate.lte(now))
            .filter(promotion::Column::EndDate.gte(now))
            .all(&*self.db)
            .await?;
        promotions.sort_by(promotion_precedence);
        Ok(promotions)
    }
}

struct PromotionTerms {
    promotion_type: PromotionType,
    target_type: PromotionTarget,
    target_id: Option<Uuid>,
    discount_value: i64,
    min_purchase_amount: Cents,
    max_discount_amount: Option<Cents>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
}

impl PromotionTerms {
    fn validate(&self) -> Result<(), ServiceError> {
        if self.end_date < self.start_date {
            return Err(ServiceError::BadRequest(
                "Promotion end date must not be before its start date".to_string(),
            ));
        }
        if self.target_type != PromotionTarget::AllProducts && self.target_id.is_none() {
            return Err(ServiceError::BadRequest(format!(
                "A target id is required for '{}' promotions",
                self.target_type
            )));
        }
        match self.promotion_type {
            PromotionType::PercentageDiscount
                if self.discount_value <= 0 || self.discount_value > FULL_PERCENT_BPS =>
            {
                return Err(ServiceError::BadRequest(
                    "Percentage discount must be greater than 0 and at most 100".to_string(),
                ));
            }
            PromotionType::FixedAmountDiscount if self.discount_value <= 0 => {
                return Err(ServiceError::BadRequest(
                    "Fixed discount amount must be greater than 0".to_string(),
                ));
            }
            PromotionType::FreeShipping if self.discount_value < 0 => {
                return Err(ServiceError::BadRequest(
                    "Discount value cannot be negative".to_string(),
                ));
            }
            _ => {}
        }
        if self.min_purchase_amount < 0 {
            return Err(ServiceError::BadRequest(
                "Minimum purchase amount cannot be negative".to_string(),
            ));
        }
        if matches!(self.max_discount_amount, Some(cap) if cap <= 0) {
            return Err(ServiceError::BadRequest(
                "Maximum discount amount must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Site-wide promotions never carry a target.
    fn normalized_target(&self) -> Option<Uuid> {
        match self.target_type {
            PromotionTarget::AllProducts => None,
            _ => self.target_id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatePromotionInput {
    pub name: String,
    pub description: Option<String>,
    pub promotion_type: PromotionType,
    pub target_type: PromotionTarget,
    pub target_id: Option<Uuid>,
    pub discount_value: i64,
    pub min_purchase_amount: Cents,
    pub max_discount_amount: Option<Cents>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePromotionInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub promotion_type: Option<PromotionType>,
    pub target_type: Option<PromotionTarget>,
    pub target_id: Option<Option<Uuid>>,
    pub discount_value: Option<i64>,
    pub min_purchase_amount: Option<Cents>,
    pub max_discount_amount: Option<Option<Cents>>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
}
