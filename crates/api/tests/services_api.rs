mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use common::{build_test_app, money};

#[tokio::test]
async fn create_and_list_identities() {
    let app = build_test_app().await;

    let (status, body) = app
        .post_json(
            "/api/v1/virtual-services",
            json!({ "user_id": 10, "name": "Mia", "account": "mia-cs" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["status"], "active");
    assert_eq!(body["data"]["account"], "mia-cs");

    let (_, list) = app.get("/api/v1/virtual-services").await;
    assert_eq!(list["data"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn duplicate_account_conflicts() {
    let app = build_test_app().await;
    let body = json!({ "user_id": 10, "name": "Mia", "account": "mia-cs" });

    app.post_json("/api/v1/virtual-services", body.clone()).await;
    let (status, json) = app.post_json("/api/v1/virtual-services", body).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn blank_name_is_rejected() {
    let app = build_test_app().await;

    let (status, _) = app
        .post_json(
            "/api/v1/virtual-services",
            json!({ "user_id": 10, "name": "", "account": "x" }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deactivated_identity_leaves_the_ranking() {
    let app = build_test_app().await;

    let (status, body) = app
        .put_json("/api/v1/virtual-services/1", json!({ "status": "inactive" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "inactive");

    let (_, stats) = app.get("/api/v1/virtual-services/stats").await;
    let ranked = stats["data"].as_array().unwrap();
    assert_eq!(ranked.len(), 2);
    assert!(ranked.iter().all(|s| s["service_id"] != 1));
}

#[tokio::test]
async fn estimate_spreads_the_whole_amount() {
    let app = build_test_app().await;

    let (status, body) = app.get("/api/v1/virtual-services/estimate?amount=100").await;

    assert_eq!(status, StatusCode::OK);
    let total: Decimal = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| money(&s["amount"]))
        .sum();
    assert_eq!(total, Decimal::from(100));
}

#[tokio::test]
async fn deleting_an_identity_moves_its_open_tasks() {
    let app = build_test_app().await;
    app.fund(1, 100).await;
    app.post_json("/api/v1/pools/1/reallocate", json!({ "mode": "full" }))
        .await;

    let (status, body) = app.delete("/api/v1/virtual-services/1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["service"]["id"], 1);
    assert_eq!(body["data"]["orphaned_tasks"], 0);

    let (_, stats) = app.get("/api/v1/virtual-services/stats").await;
    let open: i64 = stats["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["open_tasks"].as_i64().unwrap())
        .sum();
    let (_, pool) = app.get("/api/v1/pools/1").await;
    assert!(open > 0);
    assert_eq!(pool["data"]["status"], "active");

    let (status, _) = app.get("/api/v1/virtual-services/999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
