use super::{invoices::find_invoice, to_money};
use crate::{
    db::DbPool,
    entities::invoice_item,
    errors::ServiceError,
    extraction::ExtractedItem,
};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("must not be negative"));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewInvoiceItem {
    pub invoice_id: Uuid,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    #[validate(custom = "validate_non_negative")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub unit_price: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub total_price: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub tax_rate: Decimal,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct InvoiceItemUpdate {
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub quantity: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub unit_price: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub total_price: Option<Decimal>,
    #[validate(custom = "validate_non_negative")]
    pub tax_rate: Option<Decimal>,
}

/// A line item as submitted with a corrected invoice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LineItemInput {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub total_price: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
}

impl From<&ExtractedItem> for LineItemInput {
    fn from(item: &ExtractedItem) -> Self {
        Self {
            description: item.description.clone(),
            quantity: to_money(item.quantity).unwrap_or_default(),
            unit_price: to_money(item.unit_price).unwrap_or_default(),
            total_price: to_money(item.total_price).unwrap_or_default(),
            tax_rate: to_money(item.tax_rate).unwrap_or_default(),
        }
    }
}

#[derive(Clone)]
pub struct InvoiceItemService {
    db_pool: Arc<DbPool>,
}

impl InvoiceItemService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn create_item(&self, input: NewInvoiceItem) -> Result<invoice_item::Model, ServiceError> {
        input.validate()?;
        let db = &*self.db_pool;
        find_invoice(db, input.invoice_id).await.map_err(|e| match e {
            ServiceError::NotFound(_) => ServiceError::field(
                "invoice_id",
                format!("Invoice {} does not exist.", input.invoice_id),
            ),
            other => other,
        })?;

        let item = insert_item(
            db,
            input.invoice_id,
            LineItemInput {
                description: input.description,
                quantity: input.quantity,
                unit_price: input.unit_price,
                total_price: input.total_price,
                tax_rate: input.tax_rate,
            },
        )
        .await?;
        info!(item_id = %item.id, invoice_id = %item.invoice_id, "Invoice item created");
        Ok(item)
    }

    #[instrument(skip(self))]
    pub async fn get_item(&self, item_id: Uuid) -> Result<invoice_item::Model, ServiceError> {
        invoice_item::Entity::find_by_id(item_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("InvoiceItem", item_id))
    }

    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        invoice_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<invoice_item::Model>, u64), ServiceError> {
        let mut query = invoice_item::Entity::find()
            .order_by_asc(invoice_item::Column::InvoiceId)
            .order_by_asc(invoice_item::Column::Description);
        if let Some(invoice_id) = invoice_id {
            query = query.filter(invoice_item::Column::InvoiceId.eq(invoice_id));
        }

        let paginator = query.paginate(&*self.db_pool, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((items, total))
    }

    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        item_id: Uuid,
        update: InvoiceItemUpdate,
    ) -> Result<invoice_item::Model, ServiceError> {
        update.validate()?;
        let existing = self.get_item(item_id).await?;

        let mut active: invoice_item::ActiveModel = existing.into();
        if let Some(description) = update.description {
            active.description = Set(description);
        }
        if let Some(quantity) = update.quantity {
            active.quantity = Set(quantity);
        }
        if let Some(price) = update.unit_price {
            active.unit_price = Set(price);
        }
        if let Some(total) = update.total_price {
            active.total_price = Set(total);
        }
        if let Some(rate) = update.tax_rate {
            active.tax_rate = Set(rate);
        }

        active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, item_id = %item_id, "Failed to update invoice item");
            ServiceError::db_error(e)
        })
    }

    #[instrument(skip(self))]
    pub async fn delete_item(&self, item_id: Uuid) -> Result<(), ServiceError> {
        let result = invoice_item::Entity::delete_by_id(item_id)
            .exec(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("InvoiceItem", item_id));
        }
        Ok(())
    }

    /// Drops the invoice's items and inserts `items` in their place.
    pub async fn replace_for_invoice<C: ConnectionTrait>(
        conn: &C,
        invoice_id: Uuid,
        items: &[LineItemInput],
    ) -> Result<Vec<invoice_item::Model>, ServiceError> {
        invoice_item::Entity::delete_many()
            .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;
        Self::insert_all(conn, invoice_id, items).await
    }

    pub async fn insert_all<C: ConnectionTrait>(
        conn: &C,
        invoice_id: Uuid,
        items: &[LineItemInput],
    ) -> Result<Vec<invoice_item::Model>, ServiceError> {
        let mut created = Vec::with_capacity(items.len());
        for item in items {
            created.push(insert_item(conn, invoice_id, item.clone()).await?);
        }
        Ok(created)
    }
}

async fn insert_item<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
    item: LineItemInput,
) -> Result<invoice_item::Model, ServiceError> {
    invoice_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        invoice_id: Set(invoice_id),
        description: Set(item.description),
        quantity: Set(item.quantity),
        unit_price: Set(item.unit_price),
        total_price: Set(item.total_price),
        tax_rate: Set(item.tax_rate),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}
