use axum::http::Method;
use axum::Router;
use serde_json::{json, Value};

use super::http::{assert_status_ok_json, call};

pub async fn create_listing(app: &Router, token: &str, subjects: &[&str], price: f64) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/listings",
        token,
        Some(json!({
            "subjects": subjects,
            "price": price,
            "description": "Patient and structured lessons",
        })),
    )
    .await;
    assert_status_ok_json(status, &body);
    body["data"].clone()
}

/// Tutee books a 90 minute lesson at 40/h and completes payment. Returns the payment id.
pub async fn paid_lesson(app: &Router, tutee_token: &str, tutor_id: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/payments",
        tutee_token,
        Some(json!({
            "tutorId": tutor_id,
            "subject": "math",
            "date": "2026-03-02",
            "startTime": "14:00:00",
            "endTime": "15:30:00",
            "costPerHour": 40.0,
        })),
    )
    .await;
    assert_status_ok_json(status, &body);
    let payment_id = body["data"]["id"].as_str().expect("payment id").to_string();

    let (status, body) = call(
        app,
        Method::POST,
        &format!("/api/payments/{payment_id}/complete"),
        tutee_token,
        None,
    )
    .await;
    assert_status_ok_json(status, &body);
    payment_id
}

pub async fn post_review(
    app: &Router,
    tutee_token: &str,
    payment_id: &str,
    ratings: Value,
) -> (axum::http::StatusCode, Value) {
    call(
        app,
        Method::POST,
        "/api/reviews",
        tutee_token,
        Some(json!({
            "paymentId": payment_id,
            "ratings": ratings,
            "reviewText": "Clear explanations",
        })),
    )
    .await
}
