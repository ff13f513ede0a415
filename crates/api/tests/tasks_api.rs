mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serde_json::json;

use common::{build_test_app, money};

#[tokio::test]
async fn student_works_a_task_to_completion() {
    let app = build_test_app().await;
    let ids = app.fund(1, 100).await;
    let id = ids[0];

    let (status, body) = app
        .post_json(&format!("/api/v1/tasks/{id}/accept"), json!({ "student_id": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "accepted");
    assert_eq!(body["data"]["accepted_by"], 1);

    let (status, body) = app
        .post_json(&format!("/api/v1/tasks/{id}/start"), json!({ "student_id": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "in_progress");

    let (status, _) = app
        .post_json(&format!("/api/v1/tasks/{id}/submit"), json!({ "student_id": 1 }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.post(&format!("/api/v1/tasks/{id}/complete")).await;
    assert_eq!(status, StatusCode::OK);
    let report = &body["data"];
    assert_eq!(report["task"]["status"], "completed");
    let face = money(&report["payout"]["face_value"]);
    assert_eq!(money(&report["payout"]["student_income"]), face * Decimal::new(6, 1));
    assert_eq!(report["cross_day"], false);

    let (status, body) = app.post(&format!("/api/v1/tasks/{id}/complete")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INVALID_STATE");

    let (_, pool) = app.get("/api/v1/pools/1").await;
    assert_eq!(money(&pool["data"]["settlement_gap"]), Decimal::ZERO);
}

#[tokio::test]
async fn other_students_cannot_take_personal_tasks() {
    let app = build_test_app().await;
    let ids = app.fund(1, 100).await;

    let (status, body) = app
        .post_json(
            &format!("/api/v1/tasks/{}/accept", ids[0]),
            json!({ "student_id": 2 }),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
async fn second_accept_conflicts() {
    let app = build_test_app().await;
    let ids = app.fund(1, 100).await;
    let uri = format!("/api/v1/tasks/{}/accept", ids[0]);

    let (first, _) = app.post_json(&uri, json!({ "student_id": 1 })).await;
    let (second, body) = app.post_json(&uri, json!({ "student_id": 1 })).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn student_id_must_be_positive() {
    let app = build_test_app().await;
    let ids = app.fund(1, 100).await;

    let (status, _) = app
        .post_json(
            &format!("/api/v1/tasks/{}/accept", ids[0]),
            json!({ "student_id": 0 }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_task_is_404() {
    let app = build_test_app().await;

    let (status, body) = app.get("/api/v1/tasks/999999").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = app.post("/api/v1/tasks/999999/complete").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn expired_task_cannot_be_accepted() {
    let app = build_test_app().await;
    let ids = app.fund(1, 100).await;
    app.clock.advance(chrono::Duration::hours(4));

    let (status, _) = app
        .post_json(
            &format!("/api/v1/tasks/{}/accept", ids[0]),
            json!({ "student_id": 1 }),
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}
