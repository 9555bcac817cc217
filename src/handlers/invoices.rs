use super::common::{
    created_response, no_content_response, success_response, validate_input, PaginatedResponse,
    PaginationParams, StatusMessage,
};
use crate::{
    entities::{invoice, InvoiceStatus},
    errors::ServiceError,
    handlers::AppState,
    services::invoices::{InvoiceDetail, InvoiceUpdate, NewInvoice},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::str::FromStr;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct InvoiceListParams {
    /// Only invoices in this status
    pub status: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

impl InvoiceListParams {
    fn status_filter(&self) -> Result<Option<InvoiceStatus>, ServiceError> {
        match self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(raw) => InvoiceStatus::from_str(raw)
                .map(Some)
                .map_err(|_| ServiceError::field("status", format!("Unknown status '{raw}'."))),
        }
    }

    fn pagination(&self) -> PaginationParams {
        let defaults = PaginationParams::default();
        PaginationParams {
            page: self.page.unwrap_or(defaults.page),
            per_page: self.per_page.unwrap_or(defaults.per_page),
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ValidateInvoiceRequest {
    /// Corrected values keyed by `invoice_number`, `invoice_date`, `due_date`,
    /// `total_amount`, `tax_amount` and `supplier_name`.
    #[schema(value_type = Object)]
    #[serde(default)]
    pub corrected_data: serde_json::Value,
}

#[utoipa::path(
    get,
    path = "/invoices",
    tag = "invoices",
    params(InvoiceListParams),
    responses(
        (status = 200, description = "Invoices page, newest first", body = PaginatedResponse<invoice::Model>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(params): Query<InvoiceListParams>,
) -> Result<Response, ServiceError> {
    let status = params.status_filter()?;
    let (page, per_page) = params.pagination().normalized();
    let (invoices, total) = state
        .services
        .invoices
        .list_invoices(status, page, per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        invoices, page, per_page, total,
    )))
}

#[utoipa::path(
    post,
    path = "/invoices",
    tag = "invoices",
    request_body = NewInvoice,
    responses(
        (status = 201, description = "Invoice created", body = invoice::Model),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_invoice(
    State(state): State<AppState>,
    Json(payload): Json<NewInvoice>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let invoice = state.services.invoices.create_invoice(payload).await?;
    Ok(created_response(invoice))
}

#[utoipa::path(
    get,
    path = "/invoices/{id}",
    tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 200, description = "Invoice with supplier name and items", body = InvoiceDetail),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let detail = state.services.invoices.get_invoice_detail(invoice_id).await?;
    Ok(success_response(detail))
}

/// PUT and PATCH both apply a partial update; status changes are checked.
#[utoipa::path(
    put,
    path = "/invoices/{id}",
    tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = InvoiceUpdate,
    responses(
        (status = 200, description = "Invoice updated", body = invoice::Model),
        (status = 400, description = "Invalid data or status transition", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<InvoiceUpdate>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let invoice = state
        .services
        .invoices
        .update_invoice(invoice_id, payload)
        .await?;
    Ok(success_response(invoice))
}

#[utoipa::path(
    delete,
    path = "/invoices/{id}",
    tag = "invoices",
    params(("id" = Uuid, Path, description = "Invoice id")),
    responses(
        (status = 204, description = "Invoice, items and training data deleted"),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn delete_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.invoices.delete_invoice(invoice_id).await?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/invoices/{id}/validate",
    tag = "training",
    params(("id" = Uuid, Path, description = "Invoice id")),
    request_body = ValidateInvoiceRequest,
    responses(
        (status = 200, description = "Invoice validated", body = StatusMessage),
        (status = 400, description = "Invalid data or invoice not reviewable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn validate_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<ValidateInvoiceRequest>,
) -> Result<Response, ServiceError> {
    let corrected = match payload.corrected_data {
        serde_json::Value::Null => serde_json::Value::Object(Default::default()),
        other => other,
    };
    state
        .services
        .corrections
        .validate_invoice(invoice_id, corrected)
        .await?;
    Ok(success_response(StatusMessage::success(
        "Invoice validated successfully",
    )))
}

pub fn invoice_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_invoices).post(create_invoice))
        .route(
            "/:id",
            get(get_invoice)
                .put(update_invoice)
                .patch(update_invoice)
                .delete(delete_invoice),
        )
        .route("/:id/validate", post(validate_invoice))
}
