mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use common::{build_test_app, money};

#[tokio::test]
async fn batch_import_reports_each_row() {
    let app = build_test_app().await;

    let (status, body) = app
        .post_json(
            "/api/v1/pools/import",
            json!({
                "batch": "2026-03",
                "rows": [
                    { "student_id": 1, "student_name": "Ana", "amount": "100" },
                    { "student_id": 2, "student_name": "Ben", "amount": 30 },
                    { "student_id": 3, "student_name": "Cy", "amount": "-5" },
                    { "student_id": 4, "student_name": "Di", "amount": "0" },
                ],
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    let report = &body["data"];
    assert_eq!(report["import_batch"], "2026-03");
    assert_eq!(report["processed"], 4);
    assert_eq!(report["created"], 2);
    assert_eq!(report["skipped"], 1);
    assert_eq!(report["failed"].as_array().unwrap().len(), 1);
    assert_eq!(report["failed"][0]["student_id"], 3);
}

#[tokio::test]
async fn import_rejects_empty_and_nameless_rows() {
    let app = build_test_app().await;

    let (status, body) = app
        .post_json("/api/v1/pools/import", json!({ "batch": "x", "rows": [] }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, _) = app
        .post_json(
            "/api/v1/pools/import",
            json!({ "rows": [{ "student_id": 1, "student_name": "", "amount": "10" }] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn pool_view_balances() {
    let app = build_test_app().await;
    app.fund(1, 100).await;

    let (status, body) = app.get("/api/v1/pools/1").await;

    assert_eq!(status, StatusCode::OK);
    let view = &body["data"];
    assert_eq!(view["student_id"], 1);
    assert_eq!(view["status"], "active");
    assert_eq!(money(&view["total_subsidy"]), Decimal::from(100));
    assert_eq!(money(&view["settlement_gap"]), Decimal::ZERO);
    assert_eq!(
        money(&view["open_task_value"]) + money(&view["remaining_amount"]),
        Decimal::from(100)
    );
}

#[tokio::test]
async fn list_filters_by_status() {
    let app = build_test_app().await;
    app.fund(1, 50).await;
    app.fund(2, 60).await;
    app.delete("/api/v1/pools/2").await;

    let (_, active) = app.get("/api/v1/pools?status=active").await;
    let (_, deleted) = app.get("/api/v1/pools?status=deleted").await;
    let (_, all) = app.get("/api/v1/pools?limit=1").await;

    assert_eq!(active["data"].as_array().unwrap().len(), 1);
    assert_eq!(deleted["data"].as_array().unwrap().len(), 1);
    assert_eq!(all["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn full_reallocation_then_nothing_left() {
    let app = build_test_app().await;
    app.fund(1, 100).await;

    let (status, body) = app
        .post_json("/api/v1/pools/1/reallocate", json!({ "mode": "full" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["data"]["pool"]["remaining_amount"]), Decimal::ZERO);

    let (status, body) = app.post("/api/v1/pools/1/reallocate").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn reset_and_delete() {
    let app = build_test_app().await;
    app.fund(1, 80).await;

    let (status, body) = app.post("/api/v1/pools/1/reset").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(money(&body["data"]["pool"]["total_subsidy"]), Decimal::from(80));

    let (status, body) = app.delete("/api/v1/pools/1").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["cancelled_tasks"].as_u64().unwrap() > 0);

    let (status, body) = app.get("/api/v1/pools/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn stats_sum_the_pools() {
    let app = build_test_app().await;
    app.fund(1, 100).await;
    app.fund(2, 50).await;

    let (status, body) = app.get("/api/v1/stats").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["students"], 2);
    assert_eq!(money(&body["data"]["total_subsidy"]), Decimal::from(150));
    assert_eq!(money(&body["data"]["completion_rate"]), Decimal::ZERO);
}
