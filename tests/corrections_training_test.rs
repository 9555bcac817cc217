mod common;

use std::path::Path;

use axum::http::StatusCode;
use common::{assert_amount, TestApp};
use invoice_ml_server::entities::{invoice_item, ml_model, supplier, training_data, InvoiceStatus};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::json;
use uuid::Uuid;

fn save_payload(number: &str) -> serde_json::Value {
    json!({
        "invoice": {
            "invoice_number": number,
            "date": "15/01/2025",
            "due_date": "2025-02-15",
            "total_amount": "1400,58",
            "tax_amount": 200.08
        },
        "supplier": {"name": "FOURNISSEUR XYZ", "address": "123 rue des Exemples", "tax_id": "123456789"},
        "items": [
            {"description": "Produit A", "quantity": 2, "unit_price": 500.25, "total_price": 1000.5},
            {"description": "Service B", "quantity": 1, "unit_price": 200, "total_price": 200}
        ],
        "original_extraction": {"confidence_score": 0.8}
    })
}

async fn training_rows(app: &TestApp) -> Vec<training_data::Model> {
    training_data::Entity::find().all(&*app.state.db).await.unwrap()
}

#[tokio::test]
async fn validate_applies_corrections_and_records_them() {
    let app = TestApp::new().await;
    let id = app.upload_sample().await;

    let corrected = json!({
        "invoice_number": "2025-001-B",
        "invoice_date": "16/01/2025",
        "total_amount": "1500,00",
        "supplier_name": "ACME SARL"
    });
    let (status, body) = app
        .post(
            &format!("/invoices/{id}/validate"),
            json!({ "corrected_data": corrected }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Invoice validated successfully");

    let (status, detail) = app.get(&format!("/invoices/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["status"], "validated");
    assert_eq!(detail["invoice_number"], "2025-001-B");
    assert_eq!(detail["issue_date"], "2025-01-16");
    assert_eq!(detail["due_date"], "2025-02-15");
    assert_amount(&detail["total_amount"], 1500.0);
    assert_amount(&detail["tax_amount"], 200.08);
    assert_eq!(detail["supplier_name"], "ACME SARL");
    assert_eq!(detail["items"].as_array().map(Vec::len), Some(2));

    let rows = training_rows(&app).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].corrected_extraction, corrected);
    assert_ne!(rows[0].original_extraction, rows[0].corrected_extraction);
}

#[tokio::test]
async fn validate_can_be_resubmitted() {
    let app = TestApp::new().await;
    let id = app.upload_sample().await;
    let uri = format!("/invoices/{id}/validate");

    let (status, _) = app
        .post(&uri, json!({"corrected_data": {"invoice_number": "A"}}))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .post(&uri, json!({"corrected_data": {"invoice_number": "B"}}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let rows = training_rows(&app).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].corrected_extraction["invoice_number"], "B");
}

#[tokio::test]
async fn validate_rejects_bad_input() {
    let app = TestApp::new().await;
    let id = app.upload_sample().await;
    let uri = format!("/invoices/{id}/validate");

    let (status, body) = app
        .post(&uri, json!({"corrected_data": {"total_amount": "beaucoup"}}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["total_amount"].is_array());

    let (status, body) = app.post(&uri, json!({"corrected_data": [1, 2]})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["corrected_data"].is_array());

    let (status, _) = app
        .post(
            &format!("/invoices/{}/validate", Uuid::new_v4()),
            json!({"corrected_data": {}}),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn pending_invoice_cannot_be_validated() {
    let app = TestApp::new().await;
    let (status, created) = app.post("/invoices", json!({"invoice_number": "P-1"})).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");

    let (status, _) = app
        .post(
            &format!("/invoices/{}/validate", created["id"].as_str().unwrap()),
            json!({"corrected_data": {"invoice_number": "P-2"}}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn save_invoice_creates_a_validated_invoice() {
    let app = TestApp::new().await;

    let payload = save_payload("F-100");
    let (status, body) = app.post("/save-invoice", payload.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Invoice saved successfully");
    let id = body["invoice_id"].as_str().unwrap().to_string();

    let (_, detail) = app.get(&format!("/invoices/{id}")).await;
    assert_eq!(detail["status"], "validated");
    assert_eq!(detail["invoice_number"], "F-100");
    assert_eq!(detail["issue_date"], "2025-01-15");
    assert_amount(&detail["total_amount"], 1400.58);
    assert!((detail["confidence_score"].as_f64().unwrap() - 0.8).abs() < 1e-9);
    assert_eq!(detail["supplier_name"], "FOURNISSEUR XYZ");
    assert_eq!(detail["items"].as_array().map(Vec::len), Some(2));

    let stored = supplier::Entity::find().one(&*app.state.db).await.unwrap().unwrap();
    assert_eq!(stored.tax_id.as_deref(), Some("123456789"));

    let rows = training_rows(&app).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].corrected_extraction, payload);
    assert_eq!(rows[0].corrected_extraction["invoice"]["total_amount"], "1400,58");
    assert_eq!(rows[0].original_extraction["confidence_score"], 0.8);
    assert!(rows[0].used_for_training);
}

#[tokio::test]
async fn save_invoice_replaces_items_of_an_uploaded_invoice() {
    let app = TestApp::new().await;
    let id = app.upload_sample().await;

    let mut payload = save_payload("2025-001");
    payload["invoice_id"] = json!(id);
    payload["items"] = json!([
        {"description": "Forfait", "quantity": 1, "unit_price": 1200.5, "total_price": 1200.5}
    ]);
    let (status, body) = app.post("/save-invoice", payload).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice_id"], id);

    let invoice_id = Uuid::parse_str(&id).unwrap();
    let items = invoice_item::Entity::find()
        .filter(invoice_item::Column::InvoiceId.eq(invoice_id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].description, "Forfait");

    let rows = training_rows(&app).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].corrected_extraction["items"][0]["description"], "Forfait");
}

#[tokio::test]
async fn save_invoice_for_unknown_invoice_is_not_found() {
    let app = TestApp::new().await;
    let mut payload = save_payload("X");
    payload["invoice_id"] = json!(Uuid::new_v4());

    let (status, _) = app.post("/save-invoice", payload).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(training_rows(&app).await.is_empty());
}

#[tokio::test]
async fn save_invoice_without_original_stores_empty_object() {
    let app = TestApp::new().await;
    let payload = json!({
        "invoice": {"invoice_number": "F-200", "total_amount": 99.5},
        "supplier": {"name": "Beta"}
    });

    let (status, body) = app.post("/save-invoice", payload.clone()).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let rows = training_rows(&app).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].original_extraction, json!({}));
    assert_eq!(rows[0].corrected_extraction, payload);
}

#[tokio::test]
async fn save_invoice_rejects_malformed_amount() {
    let app = TestApp::new().await;
    let mut payload = save_payload("F-300");
    payload["invoice"]["total_amount"] = json!("beaucoup");

    let (status, body) = app.post("/save-invoice", payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["field_errors"]["total_amount"].is_array());

    let mut payload = save_payload("F-301");
    payload["invoice"]["tax_amount"] = json!([1]);
    let (status, body) = app.post("/save-invoice", payload).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert!(body["field_errors"]["tax_amount"].is_array());

    assert!(training_rows(&app).await.is_empty());
}

#[tokio::test]
async fn validating_a_manual_invoice_records_a_new_example() {
    let app = TestApp::new().await;
    let (status, created) = app.post("/invoices", json!({"invoice_number": "M-1"})).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let uri = format!("/invoices/{}", created["id"].as_str().unwrap());
    for next in ["processing", "processed"] {
        let (status, body) = app.put(&uri, json!({ "status": next })).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }
    assert!(training_rows(&app).await.is_empty());

    let corrected = json!({"invoice_number": "M-2", "total_amount": "12,30"});
    let (status, body) = app
        .post(&format!("{uri}/validate"), json!({ "corrected_data": corrected }))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let rows = training_rows(&app).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].original_extraction, json!({}));
    assert_eq!(rows[0].corrected_extraction, corrected);
    assert!(!rows[0].used_for_training);
}

#[tokio::test]
async fn threshold_hook_registers_a_model_version() {
    let app = TestApp::with_threshold(2).await;
    let db = &*app.state.db;

    let (status, _) = app.post("/save-invoice", save_payload("F-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ml_model::Entity::find().count(db).await.unwrap(), 0);

    let (status, _) = app.post("/save-invoice", save_payload("F-2")).await;
    assert_eq!(status, StatusCode::OK);
    let models = ml_model::Entity::find().all(db).await.unwrap();
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].version, "0.1");
    assert!(models[0].is_active);

    let (status, _) = app.post("/save-invoice", save_payload("F-3")).await;
    assert_eq!(status, StatusCode::OK);
    let active = ml_model::Entity::find()
        .filter(ml_model::Column::IsActive.eq(true))
        .all(db)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].version, "0.2");
}

#[tokio::test]
async fn training_without_corrections_is_rejected() {
    let app = TestApp::new().await;

    let (status, body) = app.post("/train-model", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("No new corrections"));
    assert_eq!(
        ml_model::Entity::find().count(&*app.state.db).await.unwrap(),
        0
    );
}

#[tokio::test]
async fn training_fits_and_activates_a_model() {
    let app = TestApp::new().await;
    let first = app.upload_sample().await;
    app.upload_sample().await;
    app.post(
        &format!("/invoices/{first}/validate"),
        json!({"corrected_data": {"invoice_number": "2025-001"}}),
    )
    .await;

    let (status, body) = app.post("/train-model", json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Model trained on 2 examples");
    assert_eq!(body["model_version"], "0.1");
    let accuracy = body["accuracy"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&accuracy));

    let db = &*app.state.db;
    let models = ml_model::Entity::find().all(db).await.unwrap();
    assert_eq!(models.len(), 1);
    assert!(models[0].is_active);
    assert!(Path::new(&models[0].file_path).exists());
    assert!(!Path::new(&format!("{}.tmp", models[0].file_path)).exists());
    assert!(models[0]
        .file_path
        .starts_with(app.workdir.path().to_string_lossy().as_ref()));

    assert!(training_rows(&app).await.iter().all(|row| row.used_for_training));

    let (status, stats) = app.get("/model-stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_invoices"], 2);
    assert_eq!(stats["validated_invoices"], 1);
    assert_eq!(stats["training_data"]["total"], 2);
    assert_eq!(stats["training_data"]["used"], 2);
    assert_eq!(stats["training_data"]["unused"], 0);
    assert_eq!(stats["models_count"], 1);
    assert_eq!(stats["active_model"]["version"], "0.1");

    // Every correction has been consumed.
    let (status, _) = app.post("/train-model", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn retraining_keeps_a_single_active_model() {
    let app = TestApp::new().await;
    let db = &*app.state.db;

    for _ in 0..2 {
        app.upload_sample().await;
        app.upload_sample().await;
        let (status, body) = app.post("/train-model", json!({})).await;
        assert_eq!(status, StatusCode::OK, "{body}");
    }

    assert_eq!(ml_model::Entity::find().count(db).await.unwrap(), 2);
    let active = ml_model::Entity::find()
        .filter(ml_model::Column::IsActive.eq(true))
        .all(db)
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].version, "0.2");
}

#[tokio::test]
async fn failed_registration_keeps_the_live_artifact() {
    let app = TestApp::new().await;
    app.upload_sample().await;
    app.upload_sample().await;
    let (status, body) = app.post("/train-model", json!({})).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let db = &*app.state.db;
    let live = ml_model::Entity::find().one(db).await.unwrap().unwrap().file_path;
    let before = std::fs::read(&live).unwrap();

    for _ in 0..3 {
        app.upload_sample().await;
    }
    db.execute_unprepared("DROP TABLE ml_models").await.unwrap();

    let (status, _) = app.post("/train-model", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(std::fs::read(&live).unwrap(), before);
    assert!(!Path::new(&format!("{live}.tmp")).exists());
}

#[tokio::test]
async fn failed_fit_consumes_rows_without_registering_a_model() {
    let app = TestApp::new().await;
    app.upload_sample().await;

    let (status, _) = app.post("/train-model", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let db = &*app.state.db;
    assert_eq!(ml_model::Entity::find().count(db).await.unwrap(), 0);
    let rows = training_rows(&app).await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].used_for_training);

    // Used rows stay used: the next attempt finds nothing new.
    let (status, _) = app.post("/train-model", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn validated_status_is_reported_in_listing() {
    let app = TestApp::new().await;
    let id = app.upload_sample().await;
    app.upload_sample().await;
    app.post(
        &format!("/invoices/{id}/validate"),
        json!({"corrected_data": {}}),
    )
    .await;

    let (status, page) = app.get("/invoices?status=validated").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 1);
    assert_eq!(page["data"][0]["id"], id);
    assert_eq!(page["data"][0]["status"], InvoiceStatus::Validated.to_string());
}
