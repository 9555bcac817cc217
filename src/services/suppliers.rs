use crate::{db::DbPool, entities::supplier, errors::ServiceError};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewSupplier {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: String,
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct SupplierUpdate {
    #[validate(length(min = 1, max = 255, message = "Name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 50))]
    pub tax_id: Option<String>,
}

/// How extracted or submitted details are merged into an existing supplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailsMerge {
    /// Only fill columns that are currently empty.
    FillMissing,
    /// Replace stored values with every provided one.
    Overwrite,
}

/// Service for managing suppliers
#[derive(Clone)]
pub struct SupplierService {
    db_pool: Arc<DbPool>,
}

impl SupplierService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self))]
    pub async fn create_supplier(&self, input: NewSupplier) -> Result<supplier::Model, ServiceError> {
        input.validate()?;
        let now = Utc::now();
        let supplier = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            address: Set(input.address),
            tax_id: Set(input.tax_id),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create supplier");
            ServiceError::db_error(e)
        })?;

        info!(supplier_id = %supplier.id, "Supplier created");
        Ok(supplier)
    }

    #[instrument(skip(self))]
    pub async fn get_supplier(&self, supplier_id: Uuid) -> Result<supplier::Model, ServiceError> {
        supplier::Entity::find_by_id(supplier_id)
            .one(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::not_found("Supplier", supplier_id))
    }

    /// Lists suppliers by name; returns the page and the total row count.
    #[instrument(skip(self))]
    pub async fn list_suppliers(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<supplier::Model>, u64), ServiceError> {
        let paginator = supplier::Entity::find()
            .order_by_asc(supplier::Column::Name)
            .paginate(&*self.db_pool, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let suppliers = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((suppliers, total))
    }

    #[instrument(skip(self))]
    pub async fn update_supplier(
        &self,
        supplier_id: Uuid,
        update: SupplierUpdate,
    ) -> Result<supplier::Model, ServiceError> {
        update.validate()?;
        let existing = self.get_supplier(supplier_id).await?;

        let mut active: supplier::ActiveModel = existing.into();
        if let Some(name) = update.name {
            active.name = Set(name.trim().to_string());
        }
        if let Some(address) = update.address {
            active.address = Set(Some(address));
        }
        if let Some(tax_id) = update.tax_id {
            active.tax_id = Set(Some(tax_id));
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, supplier_id = %supplier_id, "Failed to update supplier");
            ServiceError::db_error(e)
        })?;
        info!(supplier_id = %supplier_id, "Supplier updated");
        Ok(updated)
    }

    /// Deletes a supplier; its invoices keep existing with no supplier.
    #[instrument(skip(self))]
    pub async fn delete_supplier(&self, supplier_id: Uuid) -> Result<(), ServiceError> {
        let result = supplier::Entity::delete_by_id(supplier_id)
            .exec(&*self.db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::not_found("Supplier", supplier_id));
        }
        info!(supplier_id = %supplier_id, "Supplier deleted");
        Ok(())
    }

    /// Looks a supplier up by exact name and inserts it when absent.
    ///
    /// Two concurrent callers can both miss and both insert; nothing here
    /// locks. Pass the transaction connection when called inside one.
    pub async fn get_or_create_by_name<C: ConnectionTrait>(
        conn: &C,
        name: &str,
    ) -> Result<supplier::Model, ServiceError> {
        let name = name.trim();
        if let Some(found) = supplier::Entity::find()
            .filter(supplier::Column::Name.eq(name))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
        {
            return Ok(found);
        }

        let now = Utc::now();
        let created = supplier::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            address: Set(None),
            tax_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(ServiceError::db_error)?;

        info!(supplier_id = %created.id, name = %created.name, "Supplier created on demand");
        Ok(created)
    }

    /// Merges an address and tax id into `supplier`, writing only when
    /// something actually changes.
    pub async fn merge_details<C: ConnectionTrait>(
        conn: &C,
        supplier: supplier::Model,
        address: Option<&str>,
        tax_id: Option<&str>,
        merge: DetailsMerge,
    ) -> Result<supplier::Model, ServiceError> {
        let pick = |current: &Option<String>, incoming: Option<&str>| -> Option<String> {
            let incoming = incoming.map(str::trim).filter(|v| !v.is_empty())?;
            match merge {
                DetailsMerge::FillMissing if current.is_some() => None,
                _ if current.as_deref() == Some(incoming) => None,
                _ => Some(incoming.to_string()),
            }
        };
        let new_address = pick(&supplier.address, address);
        let new_tax_id = pick(&supplier.tax_id, tax_id);
        if new_address.is_none() && new_tax_id.is_none() {
            return Ok(supplier);
        }

        let mut active: supplier::ActiveModel = supplier.into();
        if let Some(address) = new_address {
            active.address = Set(Some(address));
        }
        if let Some(tax_id) = new_tax_id {
            active.tax_id = Set(Some(tax_id));
        }
        active.updated_at = Set(Utc::now());
        active.update(conn).await.map_err(ServiceError::db_error)
    }
}
