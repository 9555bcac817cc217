use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Invoice ML Server",
        version = "0.1.0",
        description = r#"
# Invoice ML Server

Upload scanned invoices, review the extracted fields, submit corrections and
retrain the extraction model from them.

## Workflow

1. `POST /upload` with a multipart `file` part returns the stored invoice, the
   extracted fields and the raw text.
2. `POST /invoices/{id}/validate` or `POST /save-invoice` stores the reviewed
   values as a labeled training example.
3. `POST /train-model` fits a new model on corrections not used yet;
   `GET /model-stats` reports progress.

## Error Handling

Every error uses the same body:

```json
{
  "error": "Bad Request",
  "message": "Validation error: file",
  "field_errors": {"file": ["No file was submitted."]},
  "request_id": "2f1c...",
  "timestamp": "2025-01-15T10:30:00Z"
}
```

## Pagination

List endpoints accept `page` (default 1) and `per_page` (default 20, max 100).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8000", description = "Local development")),
    tags(
        (name = "health", description = "Liveness and database checks"),
        (name = "invoices", description = "Upload and invoice management"),
        (name = "invoice-items", description = "Invoice line items"),
        (name = "suppliers", description = "Supplier management"),
        (name = "training", description = "Corrections, training and model statistics")
    ),
    paths(
        crate::handlers::health::index,
        crate::handlers::health::health_check,
        crate::handlers::uploads::upload_invoice,
        crate::handlers::invoices::list_invoices,
        crate::handlers::invoices::create_invoice,
        crate::handlers::invoices::get_invoice,
        crate::handlers::invoices::update_invoice,
        crate::handlers::invoices::delete_invoice,
        crate::handlers::invoices::validate_invoice,
        crate::handlers::invoice_items::list_items,
        crate::handlers::invoice_items::create_item,
        crate::handlers::invoice_items::get_item,
        crate::handlers::invoice_items::update_item,
        crate::handlers::invoice_items::delete_item,
        crate::handlers::suppliers::list_suppliers,
        crate::handlers::suppliers::create_supplier,
        crate::handlers::suppliers::get_supplier,
        crate::handlers::suppliers::update_supplier,
        crate::handlers::suppliers::delete_supplier,
        crate::handlers::training::save_invoice,
        crate::handlers::training::train_model,
        crate::handlers::training::model_stats,
    ),
    components(
        schemas(
            crate::entities::InvoiceStatus,
            crate::entities::training_data::Model,
            crate::entities::ml_model::Model,
            crate::extraction::ExtractedInvoice,
            crate::services::corrections::CorrectedInvoiceFields,
            crate::services::corrections::CorrectedSupplierFields,
            crate::services::invoice_items::LineItemInput,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
