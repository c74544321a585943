//! End-to-end registry flows against the memory ledger.

use reqwest::StatusCode;
use serde_json::Value;

mod common;

use common::{DONOR_TOKEN, HOSPITAL_TOKEN, RECIPIENT_TOKEN};

fn id(v: &Value) -> String {
    v["data"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_register_match_and_confirm() {
    let registry = common::start_with_hospital().await;
    let intake_d = registry.client(DONOR_TOKEN);
    let intake_r = registry.client(RECIPIENT_TOKEN);
    let hospital = registry.client(HOSPITAL_TOKEN);

    let donor = intake_d
        .register_donor("Ada", 34, "O+", "kidney", "A1,B8")
        .await
        .unwrap();
    let recipient = intake_r
        .register_recipient("Ben", 51, "A+", "kidney", "A1,B7", 7)
        .await
        .unwrap();
    let donor_id = id(&donor);
    let recipient_id = id(&recipient);
    assert!(recipient["revision"].as_u64().unwrap() > donor["revision"].as_u64().unwrap());

    // Read our own write by passing the revision back.
    let revision = recipient["revision"].as_u64().unwrap().to_string();
    let donors = hospital
        .donors(&[("min_revision", revision.clone())])
        .await
        .unwrap();
    assert_eq!(donors["items"].as_array().unwrap().len(), 1);
    assert!(donors["revision"].as_u64().unwrap() >= revision.parse::<u64>().unwrap());

    let candidates = hospital.candidates(&recipient_id).await.unwrap();
    assert_eq!(candidates["items"][0]["id"], donor_id.as_str());

    let matched = hospital.match_organ(&donor_id, &recipient_id).await.unwrap();
    assert_eq!(matched["data"]["donor_id"], donor_id.as_str());
    assert!(matched["data"]["retrieval_confirmed_at"].is_null());

    let donors = hospital.donors(&[]).await.unwrap();
    assert_eq!(donors["items"][0]["is_available"], false);
    let recipients = hospital.recipients(&[]).await.unwrap();
    assert_eq!(recipients["items"][0]["has_received"], true);

    let confirmed = hospital
        .confirm_retrieval(&donor_id, &recipient_id)
        .await
        .unwrap();
    assert!(confirmed["data"]["retrieval_confirmed_at"].is_u64());

    let again = hospital
        .confirm_retrieval(&donor_id, &recipient_id)
        .await
        .unwrap_err();
    assert_eq!(again.status(), Some(StatusCode::CONFLICT));

    let stats = hospital.stats().await.unwrap();
    assert_eq!(stats["donors"], 1);
    assert_eq!(stats["available_donors"], 0);
    assert_eq!(stats["confirmed_retrievals"], 1);

    let matches = hospital.matches().await.unwrap();
    assert_eq!(matches["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_consumed_donor_cannot_match_twice() {
    let registry = common::start_with_hospital().await;
    let hospital = registry.client(HOSPITAL_TOKEN);

    let donor = registry
        .client(DONOR_TOKEN)
        .register_donor("Ada", 34, "O-", "liver", "A2")
        .await
        .unwrap();
    let first = registry
        .client(RECIPIENT_TOKEN)
        .register_recipient("Ben", 51, "B+", "liver", "A2", 5)
        .await
        .unwrap();
    let second = registry
        .client(RECIPIENT_TOKEN)
        .register_recipient("Cy", 40, "AB+", "liver", "A2", 9)
        .await
        .unwrap();

    hospital.match_organ(&id(&donor), &id(&first)).await.unwrap();
    let err = hospital
        .match_organ(&id(&donor), &id(&second))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    assert_eq!(err.message(), Some("Compatibility not found"));
}

#[tokio::test]
async fn test_incompatible_match_is_rejected() {
    let registry = common::start_with_hospital().await;
    let hospital = registry.client(HOSPITAL_TOKEN);

    let donor = registry
        .client(DONOR_TOKEN)
        .register_donor("Ada", 34, "AB+", "heart", "B8")
        .await
        .unwrap();
    let recipient = registry
        .client(RECIPIENT_TOKEN)
        .register_recipient("Ben", 51, "O-", "heart", "B8", 3)
        .await
        .unwrap();

    let err = hospital
        .match_organ(&id(&donor), &id(&recipient))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
    assert_eq!(err.message(), Some("Compatibility not found"));

    let candidates = hospital.candidates(&id(&recipient)).await.unwrap();
    assert!(candidates["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_urgency_scale_and_sorting() {
    let registry = common::start_with_hospital().await;
    let hospital = registry.client(HOSPITAL_TOKEN);
    let intake = registry.client(RECIPIENT_TOKEN);

    let low = intake
        .register_recipient("Low", 30, "A+", "lung", "A1", 2)
        .await
        .unwrap();
    intake
        .register_recipient("High", 30, "A+", "lung", "A1", 8)
        .await
        .unwrap();

    let err = intake
        .register_recipient("Bad", 30, "A+", "lung", "A1", 11)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));
    assert_eq!(err.message(), Some("Recipient registration failed"));

    let err = hospital.update_urgency(&id(&low), 0).await.unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::UNPROCESSABLE_ENTITY));

    let updated = hospital.update_urgency(&id(&low), 10).await.unwrap();
    assert_eq!(updated["data"]["urgency_level"], 10);

    let sorted = hospital
        .recipients(&[("sort", "desc".to_string())])
        .await
        .unwrap();
    let names: Vec<&str> = sorted["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Low", "High"]);

    let filtered = hospital
        .recipients(&[("urgency_level", "8".to_string())])
        .await
        .unwrap();
    assert_eq!(filtered["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_future_revision_is_stale() {
    let registry = common::start_with_hospital().await;
    let err = registry
        .client(HOSPITAL_TOKEN)
        .donors(&[("min_revision", "999".to_string())])
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    assert_eq!(err.message(), Some("Ledger snapshot is stale"));
}

#[tokio::test]
async fn test_unknown_recipient_is_not_found() {
    let registry = common::start_with_hospital().await;
    let err = registry
        .client(HOSPITAL_TOKEN)
        .update_urgency("6b1f0c52-8d3e-4a55-9a7e-2f6f3c1d9b10", 4)
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    assert_eq!(err.message(), Some("Urgency update failed"));
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let registry = common::start_with_hospital().await;
    let err = registry
        .client(DONOR_TOKEN)
        .register_donor("  ", 34, "O+", "kidney", "A1")
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::BAD_REQUEST));
    assert_eq!(err.message(), Some("Donor registration failed"));
}

#[tokio::test]
async fn test_same_pair_cannot_match_again() {
    let registry = common::start_with_hospital().await;
    let hospital = registry.client(HOSPITAL_TOKEN);

    let donor = registry
        .client(DONOR_TOKEN)
        .register_donor("Ada", 34, "O+", "kidney", "A1")
        .await
        .unwrap();
    let recipient = registry
        .client(RECIPIENT_TOKEN)
        .register_recipient("Ben", 51, "A+", "kidney", "A1", 6)
        .await
        .unwrap();

    let matched = hospital.match_organ(&id(&donor), &id(&recipient)).await.unwrap();
    let err = hospital
        .match_organ(&id(&donor), &id(&recipient))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(StatusCode::CONFLICT));
    assert_eq!(err.message(), Some("Compatibility not found"));

    let matches = hospital.matches().await.unwrap();
    assert_eq!(matches["items"].as_array().unwrap().len(), 1);
    assert_eq!(matches["revision"], matched["revision"]);
}
