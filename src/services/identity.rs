use async_trait::async_trait;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::user::{self, UserRole};
use crate::errors::ServiceError;

/// Resolves the role of an authenticated subject. `None` means the subject
/// is unknown to the identity store.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn role(&self, user_id: Uuid) -> Result<Option<UserRole>, ServiceError>;
}

/// Identity lookups against the shared `users` table.
#[derive(Clone)]
pub struct DbIdentityProvider {
    db: Arc<DatabaseConnection>,
}

impl DbIdentityProvider {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for DbIdentityProvider {
    async fn role(&self, user_id: Uuid) -> Result<Option<UserRole>, ServiceError> {
        let user = user::Entity::find_by_id(user_id).one(&*self.db).await?;
        Ok(user.map(|u| u.role))
    }
}
