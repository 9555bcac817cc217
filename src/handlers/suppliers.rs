use super::common::{
    created_response, no_content_response, success_response, validate_input, PaginatedResponse,
    PaginationParams,
};
use crate::{
    entities::supplier,
    errors::ServiceError,
    handlers::AppState,
    services::suppliers::{NewSupplier, SupplierUpdate},
};
use axum::{
    extract::{Json, Path, Query, State},
    response::Response,
    routing::get,
    Router,
};
use tracing::info;
use uuid::Uuid;

#[utoipa::path(
    get,
    path = "/suppliers",
    tag = "suppliers",
    params(PaginationParams),
    responses(
        (status = 200, description = "Suppliers page", body = PaginatedResponse<supplier::Model>),
    )
)]
pub async fn list_suppliers(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Response, ServiceError> {
    let (page, per_page) = params.normalized();
    let (suppliers, total) = state
        .services
        .suppliers
        .list_suppliers(page, per_page)
        .await?;
    Ok(success_response(PaginatedResponse::new(
        suppliers, page, per_page, total,
    )))
}

#[utoipa::path(
    post,
    path = "/suppliers",
    tag = "suppliers",
    request_body = NewSupplier,
    responses(
        (status = 201, description = "Supplier created", body = supplier::Model),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_supplier(
    State(state): State<AppState>,
    Json(payload): Json<NewSupplier>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let supplier = state.services.suppliers.create_supplier(payload).await?;
    info!(supplier_id = %supplier.id, "Supplier created via API");
    Ok(created_response(supplier))
}

#[utoipa::path(
    get,
    path = "/suppliers/{id}",
    tag = "suppliers",
    params(("id" = Uuid, Path, description = "Supplier id")),
    responses(
        (status = 200, description = "Supplier", body = supplier::Model),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_supplier(
    State(state): State<AppState>,
    Path(supplier_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    let supplier = state.services.suppliers.get_supplier(supplier_id).await?;
    Ok(success_response(supplier))
}

/// PUT and PATCH both apply a partial update.
#[utoipa::path(
    put,
    path = "/suppliers/{id}",
    tag = "suppliers",
    params(("id" = Uuid, Path, description = "Supplier id")),
    request_body = SupplierUpdate,
    responses(
        (status = 200, description = "Supplier updated", body = supplier::Model),
        (status = 400, description = "Invalid request data", body = crate::errors::ErrorResponse),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn update_supplier(
    State(state): State<AppState>,
    Path(supplier_id): Path<Uuid>,
    Json(payload): Json<SupplierUpdate>,
) -> Result<Response, ServiceError> {
    validate_input(&payload)?;
    let supplier = state
        .services
        .suppliers
        .update_supplier(supplier_id, payload)
        .await?;
    Ok(success_response(supplier))
}

#[utoipa::path(
    delete,
    path = "/suppliers/{id}",
    tag = "suppliers",
    params(("id" = Uuid, Path, description = "Supplier id")),
    responses(
        (status = 204, description = "Supplier deleted"),
        (status = 404, description = "Supplier not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn delete_supplier(
    State(state): State<AppState>,
    Path(supplier_id): Path<Uuid>,
) -> Result<Response, ServiceError> {
    state.services.suppliers.delete_supplier(supplier_id).await?;
    Ok(no_content_response())
}

pub fn supplier_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_suppliers).post(create_supplier))
        .route(
            "/:id",
            get(get_supplier)
                .put(update_supplier)
                .patch(update_supplier)
                .delete(delete_supplier),
        )
}
