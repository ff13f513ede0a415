mod common;

use axum::http::StatusCode;
use chrono::{TimeZone, Utc};
use serde_json::json;

use common::{build_test_app, TestApp};

async fn complete_first_task(app: &TestApp, student_id: i64, task_id: i64) {
    for action in ["accept", "submit"] {
        let (status, _) = app
            .post_json(
                &format!("/api/v1/tasks/{task_id}/{action}"),
                json!({ "student_id": student_id }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _) = app.post(&format!("/api/v1/tasks/{task_id}/complete")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn daily_run_opens_bonus_tasks_for_achievers() {
    let app = build_test_app().await;
    let (status, _) = app
        .put_json("/api/v1/config/generation", json!({ "daily_target": "1" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids = app.fund(1, 100).await;
    app.fund(2, 100).await;
    complete_first_task(&app, 1, ids[0]).await;

    app.clock.set(Utc.with_ymd_and_hms(2026, 3, 3, 0, 30, 0).unwrap());
    let (status, body) = app.post("/api/v1/bonus-pool/daily-run").await;

    assert_eq!(status, StatusCode::OK);
    let run = &body["data"];
    assert_eq!(run["process_date"], "2026-03-02");
    assert_eq!(run["pool_date"], "2026-03-03");
    assert_eq!(run["achievements"]["achieved_students"], 1);
    assert!(run["generation"]["created_tasks"].as_u64().unwrap() > 0);

    let (_, status_body) = app.get("/api/v1/bonus-pool/status").await;
    assert_eq!(status_body["data"]["pool_date"], "2026-03-03");
    assert_eq!(status_body["data"]["qualified_students"], 1);

    let (_, achiever) = app.get("/api/v1/students/1/tasks").await;
    assert_eq!(achiever["data"]["bonus_access"], true);
    assert!(!achiever["data"]["bonus"].as_array().unwrap().is_empty());

    let (_, other) = app.get("/api/v1/students/2/tasks").await;
    assert_eq!(other["data"]["bonus_access"], false);
    assert!(other["data"]["bonus"].as_array().unwrap().is_empty());

    let (status, achievement) = app.get("/api/v1/students/1/achievement").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(achievement["data"]["is_achieved"], true);
}

#[tokio::test]
async fn generate_validates_count() {
    let app = build_test_app().await;

    let (status, body) = app.post("/api/v1/bonus-pool/generate?count=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let (status, _) = app
        .post("/api/v1/bonus-pool/generate?date=2026-03-01&count=3")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_without_pool_is_empty() {
    let app = build_test_app().await;

    let (status, body) = app.get("/api/v1/bonus-pool/status?date=2026-03-02").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["pool"].is_null());
    assert_eq!(body["data"]["qualified_students"], 0);
}

#[tokio::test]
async fn missing_achievement_is_404() {
    let app = build_test_app().await;

    let (status, _) = app.get("/api/v1/students/5/achievement?date=2026-03-01").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bonus_expiry_with_nothing_open() {
    let app = build_test_app().await;

    let (status, body) = app.post("/api/v1/bonus-pool/process-expired").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["expired_tasks"], 0);
}
