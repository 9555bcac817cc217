/*!
 * # Corrections
 *
 * Applies user-reviewed data to an invoice and stores it as a labeled
 * training example. Both entry points write everything in one transaction.
 */

use super::{
    invoice_items::{InvoiceItemService, LineItemInput},
    invoices::find_invoice,
    raw_message,
    suppliers::{DetailsMerge, SupplierService},
    to_money,
    training::TrainingService,
};
use crate::{
    db::DbPool,
    entities::{invoice, training_data, InvoiceStatus},
    errors::ServiceError,
    extraction::parse_invoice_date,
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{de, Deserialize, Deserializer};
use serde_json::{json, Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CorrectedInvoiceFields {
    pub invoice_number: Option<String>,
    #[serde(alias = "date")]
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    /// A number, or a string using `.` or `,` as decimal separator
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_amount: Option<Decimal>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub tax_amount: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct CorrectedSupplierFields {
    pub name: Option<String>,
    pub address: Option<String>,
    pub tax_id: Option<String>,
}

/// A complete corrected invoice as submitted from the review screen.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct SaveInvoiceRequest {
    pub invoice_id: Option<Uuid>,
    pub file_path: Option<String>,
    #[serde(default)]
    pub invoice: CorrectedInvoiceFields,
    #[serde(default)]
    pub supplier: CorrectedSupplierFields,
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    #[schema(value_type = Option<Object>)]
    pub original_extraction: Option<Value>,
}

impl SaveInvoiceRequest {
    /// Reads a submitted body. Malformed amounts are reported per field.
    pub fn from_payload(payload: &Value) -> Result<Self, ServiceError> {
        let Value::Object(body) = payload else {
            return Err(ServiceError::ValidationError(
                "Expected a JSON object.".to_string(),
            ));
        };
        if let Some(Value::Object(invoice)) = body.get("invoice") {
            amount_field(invoice, "total_amount")?;
            amount_field(invoice, "tax_amount")?;
        }
        serde_json::from_value(payload.clone())
            .map_err(|e| ServiceError::ValidationError(e.to_string()))
    }
}

#[derive(Clone)]
pub struct CorrectionService {
    db_pool: Arc<DbPool>,
    training: Arc<TrainingService>,
}

impl CorrectionService {
    pub fn new(db_pool: Arc<DbPool>, training: Arc<TrainingService>) -> Self {
        Self { db_pool, training }
    }

    /// Applies `corrected_data` to a processed invoice and marks it validated.
    ///
    /// Keys that are absent keep the stored value; the payload itself becomes
    /// the corrected side of the invoice's training example.
    #[instrument(skip(self, corrected_data))]
    pub async fn validate_invoice(
        &self,
        invoice_id: Uuid,
        corrected_data: Value,
    ) -> Result<invoice::Model, ServiceError> {
        let Value::Object(fields) = &corrected_data else {
            return Err(ServiceError::field(
                "corrected_data",
                "Expected a JSON object.",
            ));
        };
        let total_amount = amount_field(fields, "total_amount")?;
        let tax_amount = amount_field(fields, "tax_amount")?;

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;
        let existing = find_invoice(&txn, invoice_id).await?;
        ensure_accepts_corrections(&existing)?;

        let supplier_id = match text_field(fields, "supplier_name") {
            Some(name) => Some(SupplierService::get_or_create_by_name(&txn, &name).await?.id),
            None => existing.supplier_id,
        };

        let mut active: invoice::ActiveModel = existing.clone().into();
        active.supplier_id = Set(supplier_id);
        if let Some(number) = text_field(fields, "invoice_number") {
            active.invoice_number = Set(Some(number));
        }
        if let Some(date) = date_field(fields, &["invoice_date", "date"]) {
            active.issue_date = Set(Some(date));
        }
        if let Some(date) = date_field(fields, &["due_date"]) {
            active.due_date = Set(Some(date));
        }
        if let Some(total) = total_amount {
            active.total_amount = Set(Some(total));
        }
        if let Some(tax) = tax_amount {
            active.tax_amount = Set(Some(tax));
        }
        active.status = Set(InvoiceStatus::Validated);
        active.updated_at = Set(Utc::now());
        let invoice = active.update(&txn).await.map_err(ServiceError::db_error)?;

        store_correction(&txn, invoice.id, None, corrected_data).await?;
        txn.commit().await.map_err(|e| {
            error!(error = %e, invoice_id = %invoice_id, "Failed to commit validation");
            ServiceError::db_error(e)
        })?;

        metrics::counter!("invoices.validated", 1);
        info!(invoice_id = %invoice_id, "Invoice validated");
        Ok(invoice)
    }

    /// Persists a full corrected invoice, then gives the training hook a
    /// chance to register a new model version. Returns the invoice id.
    ///
    /// The submitted body is stored unchanged as the corrected side of the
    /// training example.
    #[instrument(skip(self, payload))]
    pub async fn save_invoice(&self, payload: Value) -> Result<Uuid, ServiceError> {
        let request = SaveInvoiceRequest::from_payload(&payload)?;
        let (invoice_id, example_id) = match self.save_in_transaction(request, payload).await {
            Ok(saved) => saved,
            Err(e @ (ServiceError::NotFound(_)
            | ServiceError::InvalidStatus(_)
            | ServiceError::InvalidFields(_))) => return Err(e),
            Err(e) => {
                let message = raw_message(&e);
                error!(error = %message, "Saving corrected invoice failed");
                return Err(ServiceError::ProcessingError(message));
            }
        };

        match self.training.record_correction(example_id).await {
            Ok(Some(model)) => {
                info!(invoice_id = %invoice_id, version = %model.version, "New model version registered")
            }
            Ok(None) => {}
            Err(e) => {
                warn!(invoice_id = %invoice_id, error = %e, "Training hook failed after save")
            }
        }
        Ok(invoice_id)
    }

    async fn save_in_transaction(
        &self,
        request: SaveInvoiceRequest,
        corrected: Value,
    ) -> Result<(Uuid, Uuid), ServiceError> {
        let fields = request.invoice;
        let issue_date = fields.invoice_date.as_deref().and_then(lenient_date);
        let due_date = fields.due_date.as_deref().and_then(lenient_date);

        let txn = self.db_pool.begin().await.map_err(ServiceError::db_error)?;

        let supplier_id = match request
            .supplier
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            Some(name) => {
                let supplier = SupplierService::get_or_create_by_name(&txn, name).await?;
                let supplier = SupplierService::merge_details(
                    &txn,
                    supplier,
                    request.supplier.address.as_deref(),
                    request.supplier.tax_id.as_deref(),
                    DetailsMerge::Overwrite,
                )
                .await?;
                Some(supplier.id)
            }
            None => None,
        };

        let now = Utc::now();
        let invoice = match request.invoice_id {
            Some(invoice_id) => {
                let existing = find_invoice(&txn, invoice_id).await?;
                ensure_accepts_corrections(&existing)?;

                let mut active: invoice::ActiveModel = existing.clone().into();
                if supplier_id.is_some() {
                    active.supplier_id = Set(supplier_id);
                }
                if let Some(number) = fields.invoice_number {
                    active.invoice_number = Set(Some(number));
                }
                if issue_date.is_some() {
                    active.issue_date = Set(issue_date);
                }
                if due_date.is_some() {
                    active.due_date = Set(due_date);
                }
                if let Some(total) = fields.total_amount {
                    active.total_amount = Set(Some(total.round_dp(2)));
                }
                if let Some(tax) = fields.tax_amount {
                    active.tax_amount = Set(Some(tax.round_dp(2)));
                }
                if request.file_path.is_some() && existing.file_path.is_none() {
                    active.file_path = Set(request.file_path.clone());
                }
                active.status = Set(InvoiceStatus::Validated);
                active.updated_at = Set(now);
                active.update(&txn).await.map_err(ServiceError::db_error)?
            }
            None => {
                let confidence = request
                    .original_extraction
                    .as_ref()
                    .and_then(|original| original.get("confidence_score"))
                    .and_then(Value::as_f64)
                    .unwrap_or(0.0);
                invoice::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    invoice_number: Set(fields.invoice_number),
                    issue_date: Set(issue_date),
                    due_date: Set(due_date),
                    supplier_id: Set(supplier_id),
                    total_amount: Set(fields.total_amount.map(|d| d.round_dp(2))),
                    tax_amount: Set(fields.tax_amount.map(|d| d.round_dp(2))),
                    status: Set(InvoiceStatus::Validated),
                    confidence_score: Set(confidence),
                    file_path: Set(request.file_path.clone()),
                    original_filename: Set(None),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await
                .map_err(ServiceError::db_error)?
            }
        };

        InvoiceItemService::replace_for_invoice(&txn, invoice.id, &request.items).await?;
        let example =
            store_correction(&txn, invoice.id, request.original_extraction, corrected).await?;

        txn.commit().await.map_err(ServiceError::db_error)?;
        info!(invoice_id = %invoice.id, items = request.items.len(), "Corrected invoice saved");
        Ok((invoice.id, example.id))
    }
}

fn ensure_accepts_corrections(invoice: &invoice::Model) -> Result<(), ServiceError> {
    if invoice.status.accepts_corrections() {
        return Ok(());
    }
    Err(ServiceError::InvalidStatus(format!(
        "Invoice {} is {} and cannot be validated",
        invoice.id, invoice.status
    )))
}

/// Updates the invoice's training example, or creates one when it has none.
/// An existing `original` side is only replaced when a new one is supplied.
async fn store_correction<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
    original: Option<Value>,
    corrected: Value,
) -> Result<training_data::Model, ServiceError> {
    let existing = training_data::Entity::find()
        .filter(training_data::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(training_data::Column::CreatedAt)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    let now = Utc::now();
    let saved = match existing {
        Some(row) => {
            let mut active: training_data::ActiveModel = row.into();
            active.corrected_extraction = Set(corrected);
            if let Some(original) = original {
                active.original_extraction = Set(original);
            }
            active.updated_at = Set(now);
            active.update(conn).await
        }
        None => {
            training_data::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(invoice_id),
                original_extraction: Set(original.unwrap_or_else(|| json!({}))),
                corrected_extraction: Set(corrected),
                used_for_training: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(conn)
            .await
        }
    };
    saved.map_err(ServiceError::db_error)
}

fn text_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Reads an amount given as a JSON number or a string with `.` or `,`.
/// Blank strings and `null` are absent; anything else is `Err`.
fn parse_amount_value(value: Option<&Value>) -> Result<Option<Decimal>, ()> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().and_then(to_money).map(Some).ok_or(()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Decimal::from_str(&s.trim().replace(',', "."))
            .map(|d| Some(d.round_dp(2)))
            .map_err(|_| ()),
        Some(_) => Err(()),
    }
}

fn amount_field(fields: &Map<String, Value>, key: &str) -> Result<Option<Decimal>, ServiceError> {
    parse_amount_value(fields.get(key))
        .map_err(|_| ServiceError::field(key, "A valid number is required."))
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    parse_amount_value(raw.as_ref())
        .map_err(|_| de::Error::custom("expected a number or a decimal string"))
}

/// First of `keys` holding a parseable date. Unparseable dates are ignored.
fn date_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<NaiveDate> {
    keys.iter()
        .filter_map(|key| text_field(fields, key))
        .find_map(|raw| lenient_date(&raw))
}

fn lenient_date(raw: &str) -> Option<NaiveDate> {
    let parsed = parse_invoice_date(raw);
    if parsed.is_none() {
        warn!(value = raw, "Ignoring unparseable corrected date");
    }
    parsed
}
