use super::common::{
    created_response, no_content_response, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::{
    entities::invoice_item,
    errors::ServiceError,
    handlers::AppState,
    services::invoice_items::{InvoiceItemUpdate, NewInvoiceItem},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct InvoiceItemListParams {
    /// Only items of this invoice
    pub invoice: Option<Uuid>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/invoice-items",
    tag = "invoice-items",
    params(InvoiceItemListParams),
    responses(
        (status = 200, description = "Invoice items page", body = PaginatedResponse<invoice_item::Model>),
    )
)]
pub async fn list_items(
    State(state): State<AppState>,
    Query(params): Query<InvoiceItemListParams>,
) -> Result<Response, ServiceError> {
    let defaults = PaginationParams::default();
    let (page, per_page) = PaginationParams {
        page: params.page.unwrap_or(defaults.page),
        per_page: params.per_page.unwrap_or(defaults.per_page),
    }
    .normalized();

    let (items, total) = state
        .services
        .invoice_items
        .list_items(params.invoice, page, per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        items, page, per_page, total,
    )))
}

#[utoipa::path(
    post,
    path = "/invoice-items",
    tag = "invoice-items",
    request_body = NewInvoiceItem,
    responses(
        (status = 201, description = "Invoice item created", body = invoice_item::Model),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_item(
    State(state): State<AppState>,
    Json(payload): Json<NewInvoiceItem>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let item = state.services.invoice_items.create_item(payload).await?;
    Ok(created_response(item))
}

#[utoipa::path(
    get,
    path = "/invoice-items/{id}",
    tag = "invoice-items",
    params(("id" = Uuid, Path, description = "Invoice item id")),
    responses(
        (status = 200, description = "Invoice item", body = invoice_item::Model),
        (status = 404, description = "Invoice item not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let item = state.services.invoice_items.get_item(item_id).await?;
    Ok(success_response(item))
}

#[utoipa::path(
    put,
    path = "/invoice-items/{id}",
    tag = "invoice-items",
    params(("id" = Uuid, Path, description = "Invoice item id")),
    request_body = InvoiceItemUpdate,
    responses(
        (status = 200, description = "Invoice item updated", body = invoice_item::Model),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice item not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
    Json(payload): Json<InvoiceItemUpdate>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let item = state
        .services
        .invoice_items
        .update_item(item_id, payload)
        .await?;
    Ok(success_response(item))
}

#[utoipa::path(
    delete,
    path = "/invoice-items/{id}",
    tag = "invoice-items",
    params(("id" = Uuid, Path, description = "Invoice item id")),
    responses(
        (status = 204, description = "Invoice item deleted"),
        (status = 404, description = "Invoice item not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn delete_item(
    State(state): State<AppState>,
    Path(item_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.invoice_items.delete_item(item_id).await?;
    Ok(no_content_response())
}

pub fn invoice_item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route(
            "/:id",
            get(get_item)
                .put(update_item)
                .patch(update_item)
                .delete(delete_item),
        )
}
