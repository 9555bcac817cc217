use crate::{db::DbPool, entities::ml_model, errors::ServiceError};
use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// Name under which extraction models are registered.
pub const MODEL_NAME: &str = "InvoiceExtractor";

/// A model version about to be registered.
#[derive(Debug, Clone, PartialEq)]
pub struct NewModelVersion {
    pub name: String,
    pub version: String,
    pub accuracy: f64,
    pub file_path: String,
}

/// Keeps at most one `ml_models` row active at a time.
#[derive(Clone)]
pub struct ModelRegistry {
    db: Arc<DbPool>,
}

impl ModelRegistry {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Deactivates every model and inserts `new` as the active one, atomically.
    #[instrument(skip(self), fields(version = %new.version))]
    pub async fn promote(&self, new: NewModelVersion) -> Result<ml_model::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to begin model promotion");
            ServiceError::db_error(e)
        })?;

        ml_model::Entity::update_many()
            .col_expr(ml_model::Column::IsActive, Expr::value(false))
            .filter(ml_model::Column::IsActive.eq(true))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        let model = ml_model::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(new.name),
            version: Set(new.version),
            accuracy: Set(new.accuracy),
            file_path: Set(new.file_path),
            is_active: Set(true),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(ServiceError::db_error)?;

        metrics::counter!("ml_models.promoted", 1);
        info!(model_id = %model.id, accuracy = model.accuracy, "Model version promoted");
        Ok(model)
    }

    pub async fn active_model(&self) -> Result<Option<ml_model::Model>, ServiceError> {
        ml_model::Entity::find()
            .filter(ml_model::Column::IsActive.eq(true))
            .order_by_desc(ml_model::Column::CreatedAt)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }

    pub async fn count(&self) -> Result<u64, ServiceError> {
        ml_model::Entity::find()
            .count(&*self.db)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Version and artifact path of the `k+1`-th counter-registered model.
pub fn next_counter_version(existing: u64) -> NewModelVersion {
    let version = format!("0.{}", existing + 1);
    NewModelVersion {
        name: MODEL_NAME.to_string(),
        file_path: format!("models/invoice_extractor_v{version}.json"),
        accuracy: (0.75 + 0.02 * existing as f64).min(1.0),
        version,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_versions_follow_model_count() {
        let first = next_counter_version(0);
        assert_eq!(first.version, "0.1");
        assert_eq!(first.file_path, "models/invoice_extractor_v0.1.json");
        assert!((first.accuracy - 0.75).abs() < 1e-9);

        let third = next_counter_version(2);
        assert_eq!(third.version, "0.3");
        assert!((third.accuracy - 0.79).abs() < 1e-9);
        assert_eq!(third.name, MODEL_NAME);
    }

    #[tokio::test]
    async fn promotion_keeps_one_active_model() {
        let db = crate::db::establish_connection_with_config(&crate::db::DbConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
        crate::db::run_migrations(&db).await.unwrap();
        let registry = ModelRegistry::new(Arc::new(db));

        assert!(registry.active_model().await.unwrap().is_none());
        let first = registry.promote(next_counter_version(0)).await.unwrap();
        let second = registry.promote(next_counter_version(1)).await.unwrap();
        assert!(first.is_active && second.is_active);

        assert_eq!(registry.count().await.unwrap(), 2);
        let active = registry.active_model().await.unwrap().unwrap();
        assert_eq!(active.id, second.id);
        assert_eq!(active.version, "0.2");
    }
}
