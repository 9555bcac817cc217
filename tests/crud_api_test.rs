mod common;

use axum::http::StatusCode;
use common::{assert_amount, TestApp};
use invoice_ml_server::entities::{invoice_item, training_data};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn supplier_lifecycle() {
    let app = TestApp::new().await;

    let (status, created) = app
        .post(
            "/suppliers",
            json!({"name": "ACME SARL", "address": "1 rue Haute", "tax_id": "FR123"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let id = created["id"].as_str().unwrap().to_string();

    let (status, fetched) = app.get(&format!("/suppliers/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "ACME SARL");

    let (status, updated) = app
        .put(&format!("/suppliers/{id}"), json!({"address": "2 rue Basse"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["address"], "2 rue Basse");
    assert_eq!(updated["tax_id"], "FR123");

    app.post("/suppliers", json!({"name": "Beta"})).await;
    let (status, page) = app.get("/suppliers?per_page=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 2);
    assert_eq!(page["pagination"]["total_pages"], 2);
    assert_eq!(page["data"].as_array().map(Vec::len), Some(1));
    assert_eq!(page["data"][0]["name"], "ACME SARL");

    let (status, _) = app.delete(&format!("/suppliers/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/suppliers/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.delete(&format!("/suppliers/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn supplier_requires_a_name() {
    let app = TestApp::new().await;

    let (status, body) = app.post("/suppliers", json!({"name": ""})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["name"].is_array());
}

#[tokio::test]
async fn invoice_crud_and_status_rules() {
    let app = TestApp::new().await;

    let (status, created) = app
        .post(
            "/invoices",
            json!({"invoice_number": "F-9", "total_amount": "99.999", "issue_date": "2025-03-01"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["status"], "pending");
    assert_amount(&created["total_amount"], 100.0);
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/invoices/{id}");

    // pending -> validated skips the pipeline
    let (status, _) = app.put(&uri, json!({"status": "validated"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, updated) = app.put(&uri, json!({"status": "processing"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "processing");

    // resubmitting the current status is accepted
    let (status, updated) = app
        .put(&uri, json!({"status": "processing", "invoice_number": "F-10"}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["invoice_number"], "F-10");

    let (status, body) = app.get("/invoices?status=archived").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["status"].is_array());

    let (status, page) = app.get("/invoices?status=processing").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 1);

    let (status, page) = app.get("/invoices?status=pending").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 0);

    let (status, _) = app
        .post("/invoices", json!({"invoice_number": "F-11", "status": "validated"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, page) = app.get("/invoices").await;
    assert_eq!(page["pagination"]["total"], 1);

    let (status, body) = app
        .post("/invoices", json!({"confidence_score": 1.5}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["confidence_score"].is_array());

    let (status, _) = app
        .post("/invoices", json!({"supplier_id": Uuid::new_v4()}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.get(&format!("/invoices/{}", Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_an_invoice_removes_items_and_training_data() {
    let app = TestApp::new().await;
    let id = app.upload_sample().await;
    let db = &*app.state.db;
    assert_eq!(invoice_item::Entity::find().count(db).await.unwrap(), 2);
    assert_eq!(training_data::Entity::find().count(db).await.unwrap(), 1);

    let (status, _) = app.delete(&format!("/invoices/{id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert_eq!(invoice_item::Entity::find().count(db).await.unwrap(), 0);
    assert_eq!(training_data::Entity::find().count(db).await.unwrap(), 0);
    let (status, _) = app.get(&format!("/invoices/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invoice_item_lifecycle() {
    let app = TestApp::new().await;
    let uploaded = app.upload_sample().await;
    let (_, other) = app.post("/invoices", json!({"invoice_number": "F-2"})).await;
    let other_id = other["id"].as_str().unwrap().to_string();

    let (status, created) = app
        .post(
            "/invoice-items",
            json!({
                "invoice_id": other_id,
                "description": "Livraison",
                "quantity": "1",
                "unit_price": "15.00",
                "total_price": "15.00"
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_amount(&created["tax_rate"], 0.0);
    let item_id = created["id"].as_str().unwrap().to_string();

    let (status, page) = app.get(&format!("/invoice-items?invoice={other_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 1);

    let (status, page) = app.get(&format!("/invoice-items?invoice={uploaded}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 2);

    let (status, page) = app.get("/invoice-items").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["pagination"]["total"], 3);

    let (status, updated) = app
        .put(
            &format!("/invoice-items/{item_id}"),
            json!({"quantity": "2", "total_price": "30.00"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_amount(&updated["quantity"], 2.0);
    assert_amount(&updated["total_price"], 30.0);
    assert_eq!(updated["description"], "Livraison");

    let (status, body) = app
        .put(&format!("/invoice-items/{item_id}"), json!({"unit_price": "-1"}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["field_errors"]["unit_price"].is_array());

    let (status, _) = app
        .post(
            "/invoice-items",
            json!({
                "invoice_id": Uuid::new_v4(),
                "description": "Orphan",
                "quantity": 1,
                "unit_price": 1,
                "total_price": 1
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.delete(&format!("/invoice-items/{item_id}")).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = app.get(&format!("/invoice-items/{item_id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
