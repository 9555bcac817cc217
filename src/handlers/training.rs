use super::common::success_response;
use crate::{
    errors::ServiceError,
    handlers::AppState,
    services::{corrections::SaveInvoiceRequest, training::ModelStats},
};
use axum::{
    extract::{Json, State},
    response::Response,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct SaveInvoiceResponse {
    pub status: &'static str,
    pub message: String,
    pub invoice_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrainModelResponse {
    pub status: &'static str,
    pub message: String,
    pub accuracy: f64,
    pub model_version: String,
}

#[utoipa::path(
    post,
    path = "/save-invoice",
    tag = "training",
    request_body = SaveInvoiceRequest,
    responses(
        (status = 200, description = "Corrected invoice stored", body = SaveInvoiceResponse),
        (status = 400, description = "Invalid data or invoice not reviewable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Invoice not found", body = crate::errors::ErrorResponse),
        (status = 500, description = "Saving failed; the message is the raw error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn save_invoice(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> Result<Response, ServiceError> {
    let invoice_id = state.services.corrections.save_invoice(payload).await?;
    Ok(success_response(SaveInvoiceResponse {
        status: "success",
        message: "Invoice saved successfully".to_string(),
        invoice_id,
    }))
}

#[utoipa::path(
    post,
    path = "/train-model",
    tag = "training",
    responses(
        (status = 200, description = "Model trained and activated", body = TrainModelResponse),
        (status = 400, description = "No unused corrections", body = crate::errors::ErrorResponse),
        (status = 500, description = "Training failed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn train_model(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let outcome = state.services.training.train_from_corrections().await?;
    Ok(success_response(TrainModelResponse {
        status: "success",
        message: format!("Model trained on {} examples", outcome.examples),
        accuracy: outcome.accuracy,
        model_version: outcome.model.version,
    }))
}

#[utoipa::path(
    get,
    path = "/model-stats",
    tag = "training",
    responses(
        (status = 200, description = "Invoice, training data and model counts", body = ModelStats),
    )
)]
pub async fn model_stats(State(state): State<AppState>) -> Result<Response, ServiceError> {
    let stats = state.services.training.model_stats().await?;
    Ok(success_response(stats))
}

pub fn training_routes() -> Router<AppState> {
    Router::new()
        .route("/save-invoice", post(save_invoice))
        .route("/train-model", post(train_model))
        .route("/model-stats", get(model_stats))
}
