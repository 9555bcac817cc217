use crate::{
    db::DbPool,
    entities::{invoice, invoice_item, supplier, training_data, InvoiceStatus},
    errors::ServiceError,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct NewInvoice {
    #[validate(length(max = 50))]
    pub invoice_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub supplier_id: Option<Uuid>,
    pub total_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    /// New invoices always start out `pending`
    pub status: Option<InvoiceStatus>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_score: Option<f64>,
    pub original_filename: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct InvoiceUpdate {
    #[validate(length(max = 50))]
    pub invoice_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub supplier_id: Option<Uuid>,
    pub total_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub status: Option<InvoiceStatus>,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_score: Option<f64>,
}

/// An invoice with its supplier name and line items.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InvoiceDetail {
    #[serde(flatten)]
    pub invoice: invoice::Model,
    pub supplier_name: Option<String>,
    pub items: Vec<invoice_item::Model>,
}

#[derive(Clone)]
pub struct InvoiceService {
    db_pool: Arc<DbPool>,
}

impl InvoiceService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn create_invoice(&self, input: NewInvoice) -> Result<invoice::Model, ServiceError> {
        input.validate()?;
        if let Some(requested) = input.status.filter(|s| *s != InvoiceStatus::Pending) {
            return Err(ServiceError::InvalidStatus(format!(
                "New invoices start as pending, not {requested}"
            )));
        }
        if let Some(supplier_id) = input.supplier_id {
            ensure_supplier_exists(&*self.db_pool, supplier_id).await?;
        }

        let now = Utc::now();
        let invoice = invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_number: Set(input.invoice_number),
            issue_date: Set(input.issue_date),
            due_date: Set(input.due_date),
            supplier_id: Set(input.supplier_id),
            total_amount: Set(input.total_amount.map(|d| d.round_dp(2))),
            tax_amount: Set(input.tax_amount.map(|d| d.round_dp(2))),
            status: Set(InvoiceStatus::Pending),
            confidence_score: Set(input.confidence_score.unwrap_or(0.0)),
            file_path: Set(None),
            original_filename: Set(input.original_filename),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create invoice");
            ServiceError::db_error(e)
        })?;

        info!(invoice_id = %invoice.id, status = %invoice.status, "Invoice created");
        Ok(invoice)
    }

    #[instrument(skip(self))]
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        find_invoice(&*self.db_pool, invoice_id).await
    }

    /// Loads an invoice together with its supplier name and items.
    #[instrument(skip(self))]
    pub async fn get_invoice_detail(&self, invoice_id: Uuid) -> Result<InvoiceDetail, ServiceError> {
        let db = &*self.db_pool;
        let invoice = find_invoice(db, invoice_id).await?;

        let supplier_name = match invoice.supplier_id {
            Some(supplier_id) => supplier::Entity::find_by_id(supplier_id)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
                .map(|s| s.name),
            None => None,
        };
        let items = invoice_item::Entity::find()
            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
            .order_by_asc(invoice_item::Column::Description)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(InvoiceDetail {
            invoice,
            supplier_name,
            items,
        })
    }

    /// Newest first, optionally restricted to one status.
    #[instrument(skip(self))]
    pub async fn list_invoices(
        &self,
        status: Option<InvoiceStatus>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<invoice::Model>, u64), ServiceError> {
        let mut query = invoice::Entity::find().order_by_desc(invoice::Column::CreatedAt);
        if let Some(status) = status {
            query = query.filter(invoice::Column::Status.eq(status));
        }

        let paginator = query.paginate(&*self.db_pool, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let invoices = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((invoices, total))
    }

    /// Applies a partial update. A status change must be a legal transition;
    /// resubmitting the current status is accepted as a no-op for that field.
    #[instrument(skip(self))]
    pub async fn update_invoice(
        &self,
        invoice_id: Uuid,
        update: InvoiceUpdate,
    ) -> Result<invoice::Model, ServiceError> {
        update.validate()?;
        let db = &*self.db_pool;
        let existing = find_invoice(db, invoice_id).await?;

        if let Some(next) = update.status {
            if next != existing.status && !existing.status.can_transition_to(next) {
                warn!(invoice_id = %invoice_id, from = %existing.status, to = %next, "Rejected status transition");
                return Err(ServiceError::InvalidStatus(format!(
                    "Cannot change invoice status from {} to {}",
                    existing.status, next
                )));
            }
        }
        if let Some(supplier_id) = update.supplier_id {
            ensure_supplier_exists(db, supplier_id).await?;
        }

        let mut active: invoice::ActiveModel = existing.into();
        if let Some(number) = update.invoice_number {
            active.invoice_number = Set(Some(number));
        }
        if let Some(date) = update.issue_date {
            active.issue_date = Set(Some(date));
        }
        if let Some(date) = update.due_date {
            active.due_date = Set(Some(date));
        }
        if let Some(supplier_id) = update.supplier_id {
            active.supplier_id = Set(Some(supplier_id));
        }
        if let Some(total) = update.total_amount {
            active.total_amount = Set(Some(total.round_dp(2)));
        }
        if let Some(tax) = update.tax_amount {
            active.tax_amount = Set(Some(tax.round_dp(2)));
        }
        if let Some(status) = update.status {
            active.status = Set(status);
        }
        if let Some(score) = update.confidence_score {
            active.confidence_score = Set(score);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(db).await.map_err(|e| {
            error!(error = %e, invoice_id = %invoice_id, "Failed to update invoice");
            ServiceError::db_error(e)
        })?;
        info!(invoice_id = %invoice_id, "Invoice updated");
        Ok(updated)
    }

    /// Deletes an invoice with its items and training data in one transaction.
    #[instrument(skip(self))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        find_invoice(&txn, invoice_id).await?;

        let items = invoice_item::Entity::delete_many()
            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let examples = training_data::Entity::delete_many()
            .filter(training_data::Column::InvoiceId.eq(invoice_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        invoice::Entity::delete_by_id(invoice_id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, invoice_id = %invoice_id, "Failed to commit invoice deletion");
            ServiceError::db_error(e)
        })?;

        info!(
            invoice_id = %invoice_id,
            items = items.rows_affected,
            training_rows = examples.rows_affected,
            "Invoice deleted"
        );
        Ok(())
    }

    /// Invoice count, optionally restricted to one status.
    pub async fn count_invoices(&self, status: Option<InvoiceStatus>) -> Result<u64, ServiceError> {
        let mut query = invoice::Entity::find();
        if let Some(status) = status {
            query = query.filter(invoice::Column::Status.eq(status));
        }
        query.count(&*self.db_pool).await.map_err(ServiceError::db_error)
    }
}

pub(crate) async fn find_invoice<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
) -> Result<invoice::Model, ServiceError> {
    invoice::Entity::find_by_id(invoice_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::not_found("Invoice", invoice_id))
}

async fn ensure_supplier_exists<C: ConnectionTrait>(
    conn: &C,
    supplier_id: Uuid,
) -> Result<(), ServiceError> {
    let found = supplier::Entity::find_by_id(supplier_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;
    match found {
        Some(_) => Ok(()),
        None => Err(ServiceError::field(
            "supplier_id",
            format!("Supplier {supplier_id} does not exist."),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{establish_connection_with_config, run_migrations, DbConfig};
    use rust_decimal_macros::dec;

    async fn service() -> InvoiceService {
        let pool = establish_connection_with_config(&DbConfig {
            url: "sqlite::memory:".into(),
            ..Default::default()
        })
        .await
        .unwrap();
        run_migrations(&pool).await.unwrap();
        InvoiceService::new(Arc::new(pool))
    }

    fn status(status: InvoiceStatus) -> InvoiceUpdate {
        InvoiceUpdate {
            status: Some(status),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn status_updates_follow_transition_table() {
        let svc = service().await;
        let invoice = svc.create_invoice(NewInvoice::default()).await.unwrap();
        assert_eq!(invoice.status, InvoiceStatus::Pending);

        let err = svc
            .update_invoice(invoice.id, status(InvoiceStatus::Validated))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatus(_)));

        for next in [
            InvoiceStatus::Processing,
            InvoiceStatus::Processed,
            InvoiceStatus::Validated,
        ] {
            let updated = svc.update_invoice(invoice.id, status(next)).await.unwrap();
            assert_eq!(updated.status, next);
        }

        let err = svc
            .update_invoice(invoice.id, status(InvoiceStatus::Processed))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatus(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status() {
        let svc = service().await;
        svc.create_invoice(NewInvoice::default()).await.unwrap();
        let second = svc
            .create_invoice(NewInvoice {
                total_amount: Some(dec!(10.50)),
                ..Default::default()
            })
            .await
            .unwrap();
        for next in [InvoiceStatus::Processing, InvoiceStatus::Processed] {
            svc.update_invoice(second.id, status(next)).await.unwrap();
        }

        let (processed, total) = svc
            .list_invoices(Some(InvoiceStatus::Processed), 1, 20)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(processed[0].status, InvoiceStatus::Processed);
        assert_eq!(svc.count_invoices(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn new_invoices_must_start_pending() {
        let svc = service().await;
        let err = svc
            .create_invoice(NewInvoice {
                status: Some(InvoiceStatus::Validated),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidStatus(_)));
        assert_eq!(svc.count_invoices(None).await.unwrap(), 0);

        let explicit = svc
            .create_invoice(NewInvoice {
                status: Some(InvoiceStatus::Pending),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(explicit.status, InvoiceStatus::Pending);
    }

    #[tokio::test]
    async fn unknown_supplier_is_a_field_error() {
        let svc = service().await;
        let err = svc
            .create_invoice(NewInvoice {
                supplier_id: Some(Uuid::new_v4()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidFields(ref f) if f.contains_key("supplier_id")));
    }

    #[tokio::test]
    async fn missing_invoice_is_not_found() {
        let svc = service().await;
        let id = Uuid::new_v4();
        assert!(matches!(svc.get_invoice(id).await, Err(ServiceError::NotFound(_))));
        assert!(matches!(svc.delete_invoice(id).await, Err(ServiceError::NotFound(_))));
    }
}
