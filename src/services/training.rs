use super::documents::DocumentService;
use crate::{
    db::DbPool,
    entities::{invoice, ml_model, training_data, InvoiceStatus},
    errors::ServiceError,
    ml::{
        registry::{next_counter_version, MODEL_NAME},
        InvoiceClassifier, ModelRegistry, NewModelVersion, TrainingError, TrainingExample,
    },
};
use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Outcome of a manual training run.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingOutcome {
    pub examples: usize,
    pub accuracy: f64,
    pub model: ml_model::Model,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TrainingDataStats {
    pub total: u64,
    pub used: u64,
    pub unused: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActiveModelSummary {
    pub name: String,
    pub version: String,
    pub accuracy: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModelStats {
    pub total_invoices: u64,
    pub validated_invoices: u64,
    pub training_data: TrainingDataStats,
    pub models_count: u64,
    pub active_model: Option<ActiveModelSummary>,
}

impl From<ml_model::Model> for ActiveModelSummary {
    fn from(model: ml_model::Model) -> Self {
        Self {
            name: model.name,
            version: model.version,
            accuracy: model.accuracy,
            created_at: model.created_at,
        }
    }
}

#[derive(Clone)]
pub struct TrainingService {
    db_pool: Arc<DbPool>,
    registry: ModelRegistry,
    documents: Arc<DocumentService>,
    model_dir: PathBuf,
    threshold: u64,
}

impl TrainingService {
    pub fn new(
        db_pool: Arc<DbPool>,
        registry: ModelRegistry,
        documents: Arc<DocumentService>,
        model_dir: PathBuf,
        threshold: u64,
    ) -> Self {
        Self {
            db_pool,
            registry,
            documents,
            model_dir,
            threshold,
        }
    }

    /// Fits a classifier on every correction not yet used for training.
    ///
    /// The collected rows are marked as used before the fit runs, so a failed
    /// run does not offer them again.
    #[instrument(skip(self))]
    pub async fn train_from_corrections(&self) -> Result<TrainingOutcome, ServiceError> {
        let db = &*self.db_pool;
        let rows = training_data::Entity::find()
            .filter(training_data::Column::UsedForTraining.eq(false))
            .order_by_asc(training_data::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        if rows.is_empty() {
            return Err(ServiceError::NoTrainingData);
        }

        let mut examples = Vec::with_capacity(rows.len());
        for row in &rows {
            let file_path = invoice::Entity::find_by_id(row.invoice_id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .and_then(|invoice| invoice.file_path);
            let text = self.documents.read_stored_text(file_path.as_deref()).await;
            examples.push(TrainingExample::from_correction(
                text,
                &row.corrected_extraction,
            ));
        }

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        mark_used(db, ids).await?;

        let model_dir = self.model_dir.clone();
        let fitted = tokio::task::spawn_blocking(move || {
            let (model, report) = InvoiceClassifier::fit(&examples)?;
            let staged = model.stage(&model_dir)?;
            Ok::<_, TrainingError>((report, staged))
        })
        .await
        .map_err(|e| ServiceError::TrainingFailed(e.to_string()))?;

        let (report, staged) = match fitted {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, examples = rows.len(), "Model training failed");
                metrics::counter!("training.failures", 1);
                return Err(ServiceError::TrainingFailed(e.to_string()));
            }
        };

        // The live artifact is only replaced once the new version is recorded.
        let promoted = match self.registry.count().await {
            Ok(existing) => {
                self.registry
                    .promote(NewModelVersion {
                        name: MODEL_NAME.to_string(),
                        version: next_counter_version(existing).version,
                        accuracy: report.accuracy,
                        file_path: staged.target().to_string_lossy().into_owned(),
                    })
                    .await
            }
            Err(e) => Err(e),
        };
        let model = match promoted {
            Ok(model) => model,
            Err(e) => {
                staged.discard();
                return Err(e);
            }
        };
        tokio::task::spawn_blocking(move || staged.commit())
            .await
            .map_err(|e| ServiceError::TrainingFailed(e.to_string()))?
            .map_err(|e| {
                error!(error = %e, version = %model.version, "Failed to install model artifact");
                ServiceError::TrainingFailed(e.to_string())
            })?;

        info!(
            examples = rows.len(),
            accuracy = report.accuracy,
            train_size = report.train_size,
            "Model trained"
        );
        Ok(TrainingOutcome {
            examples: rows.len(),
            accuracy: report.accuracy,
            model,
        })
    }

    /// Marks one correction as used and registers a new model version once
    /// enough corrections have accumulated.
    #[instrument(skip(self))]
    pub async fn record_correction(
        &self,
        training_data_id: Uuid,
    ) -> Result<Option<ml_model::Model>, ServiceError> {
        let db = &*self.db_pool;
        mark_used(db, vec![training_data_id]).await?;

        let used = training_data::Entity::find()
            .filter(training_data::Column::UsedForTraining.eq(true))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        if used < self.threshold {
            info!(used, threshold = self.threshold, "Correction recorded");
            return Ok(None);
        }

        let existing = self.registry.count().await?;
        let model = self.registry.promote(next_counter_version(existing)).await?;
        Ok(Some(model))
    }

    #[instrument(skip(self))]
    pub async fn model_stats(&self) -> Result<ModelStats, ServiceError> {
        let db = &*self.db_pool;
        let total_invoices = invoice::Entity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let validated_invoices = invoice::Entity::find()
            .filter(invoice::Column::Status.eq(InvoiceStatus::Validated))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let total = training_data::Entity::find()
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;
        let used = training_data::Entity::find()
            .filter(training_data::Column::UsedForTraining.eq(true))
            .count(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(ModelStats {
            total_invoices,
            validated_invoices,
            training_data: TrainingDataStats {
                total,
                used,
                unused: total.saturating_sub(used),
            },
            models_count: self.registry.count().await?,
            active_model: self.registry.active_model().await?.map(Into::into),
        })
    }
}

/// Sets `used_for_training` on the given rows. Never clears it.
async fn mark_used<C: ConnectionTrait>(conn: &C, ids: Vec<Uuid>) -> Result<(), ServiceError> {
    let result = training_data::Entity::update_many()
        .col_expr(training_data::Column::UsedForTraining, Expr::value(true))
        .col_expr(training_data::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(training_data::Column::Id.is_in(ids))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if result.rows_affected == 0 {
        warn!("No training rows matched when marking them as used");
    }
    Ok(())
}
