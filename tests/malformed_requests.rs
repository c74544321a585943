//! Bodies, paths and query strings the extractors refuse still get the
//! registry's JSON error shape.

use reqwest::{header::CONTENT_TYPE, Method, StatusCode};
use serde_json::{json, Value};

mod common;

use common::{DONOR_TOKEN, HOSPITAL_TOKEN};

async fn send(
    registry: &common::TestRegistry,
    method: Method,
    path: &str,
    body: Option<Value>,
) -> reqwest::Response {
    let mut request = reqwest::Client::new()
        .request(method, format!("{}{path}", registry.base_url()))
        .bearer_auth(if path.contains("donors") { DONOR_TOKEN } else { HOSPITAL_TOKEN });
    if let Some(body) = body {
        request = request.json(&body);
    }
    request.send().await.unwrap()
}

async fn assert_generic_400(response: reqwest::Response, message: &str) {
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let content_type = response.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
    assert!(content_type.starts_with("application/json"), "got {content_type}");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], message);
    assert!(!body["request_id"].as_str().unwrap().is_empty());
    assert_eq!(body.as_object().unwrap().len(), 2);
}

#[tokio::test]
async fn test_donor_body_missing_name() {
    let registry = common::start_with_hospital().await;
    let body = json!({ "age": 34, "blood_type": "O+", "organ": "kidney", "tissue_type": "A1" });
    let response = send(&registry, Method::POST, "/api/v1/donors", Some(body)).await;
    assert_generic_400(response, "Donor registration failed").await;
}

#[tokio::test]
async fn test_negative_age_is_refused() {
    let registry = common::start_with_hospital().await;
    let body = json!({
        "name": "Ada", "age": -1, "blood_type": "O+", "organ": "kidney", "tissue_type": "A1"
    });
    let response = send(&registry, Method::POST, "/api/v1/donors", Some(body)).await;
    assert_generic_400(response, "Donor registration failed").await;

    let donors = registry.client(HOSPITAL_TOKEN).donors(&[]).await.unwrap();
    assert!(donors["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_urgency_path_must_be_an_id() {
    let registry = common::start_with_hospital().await;
    let response = send(
        &registry,
        Method::PUT,
        "/api/v1/recipients/not-a-uuid/urgency",
        Some(json!({ "urgency_level": 4 })),
    )
    .await;
    assert_generic_400(response, "Urgency update failed").await;
}

#[tokio::test]
async fn test_match_body_with_bad_ids() {
    let registry = common::start_with_hospital().await;
    let response = send(
        &registry,
        Method::POST,
        "/api/v1/matches",
        Some(json!({ "donor_id": 7, "recipient_id": "x" })),
    )
    .await;
    assert_generic_400(response, "Compatibility not found").await;
}

#[tokio::test]
async fn test_unparseable_revision_query() {
    let registry = common::start_with_hospital().await;
    let response = send(&registry, Method::GET, "/api/v1/stats?min_revision=soon", None).await;
    assert_generic_400(response, "Failed to load registry data").await;
}
