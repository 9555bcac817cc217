use super::common::created_response;
use crate::{
    errors::ServiceError, handlers::AppState, services::documents::ProcessedDocument,
};
use axum::{
    extract::{Multipart, State},
    response::Response,
    routing::post,
    Router,
};
use bytes::Bytes;
use serde::Serialize;
use tracing::{info, warn};
use utoipa::ToSchema;

const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub document: ProcessedDocument,
}

/// Multipart body with a single `file` part.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct UploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
}

#[utoipa::path(
    post,
    path = "/upload",
    tag = "invoices",
    request_body(content = UploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Invoice extracted and stored", body = UploadResponse),
        (status = 400, description = "No file was submitted", body = crate::errors::ErrorResponse),
        (status = 500, description = "Processing failed; the message is the raw error", body = crate::errors::ErrorResponse),
    )
)]
pub async fn upload_invoice(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ServiceError> {
    let (file_name, bytes) = read_file_field(&mut multipart).await?;
    info!(file_name = %file_name, size = bytes.len(), "Invoice upload received");

    let document = state
        .services
        .documents
        .process_upload(&file_name, &bytes)
        .await?;
    Ok(created_response(UploadResponse {
        status: "success",
        document,
    }))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Bytes), ServiceError> {
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!(error = %e, "Malformed multipart body");
        ServiceError::BadRequest(e.body_text())
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| "upload".to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::BadRequest(e.body_text()))?;
        if bytes.is_empty() {
            return Err(ServiceError::field(FILE_FIELD, "The submitted file is empty."));
        }
        return Ok((file_name, bytes));
    }
    Err(ServiceError::field(FILE_FIELD, "No file was submitted."))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/upload", post(upload_invoice))
}
