//! Session, health and registration handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Extension, Json,
};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

use crate::http::error::{
    ApiError, DONOR_REGISTRATION_FAILED, HOSPITAL_REGISTRATION_FAILED,
    RECIPIENT_REGISTRATION_FAILED,
};
use crate::http::request::RequestId;
use crate::http::server::AppState;
use crate::ledger::Committed;
use crate::registry::types::{Donor, Hospital, NewDonor, NewHospital, NewRecipient, Recipient};
use crate::security::grants::CallerContext;
use crate::security::roles::Role;

/// The caller as the service sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub address: Address,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: &'static str,
    pub backend: &'static str,
    pub revision: u64,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let inner = state.inner.load_full();
    let healthy = inner.registry.is_healthy().await;
    let status = HealthStatus {
        status: if healthy { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        backend: inner.registry.ledger().backend(),
        revision: inner.registry.revision(),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

pub async fn session(Extension(caller): Extension<CallerContext>) -> Json<SessionInfo> {
    Json(SessionInfo {
        address: caller.address,
        role: caller.role,
    })
}

pub async fn register_hospital(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    body: Result<Json<NewHospital>, JsonRejection>,
) -> Result<(StatusCode, Json<Committed<Hospital>>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::rejected(HOSPITAL_REGISTRATION_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .register_hospital(&caller, body)
        .await
        .map(|committed| (StatusCode::CREATED, Json(committed)))
        .map_err(|e| ApiError::registry(HOSPITAL_REGISTRATION_FAILED, e, &request_id))
}

pub async fn register_donor(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    body: Result<Json<NewDonor>, JsonRejection>,
) -> Result<(StatusCode, Json<Committed<Donor>>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::rejected(DONOR_REGISTRATION_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .register_donor(&caller, body)
        .await
        .map(|committed| (StatusCode::CREATED, Json(committed)))
        .map_err(|e| ApiError::registry(DONOR_REGISTRATION_FAILED, e, &request_id))
}

pub async fn register_recipient(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    body: Result<Json<NewRecipient>, JsonRejection>,
) -> Result<(StatusCode, Json<Committed<Recipient>>), ApiError> {
    let Json(body) = body.map_err(|e| ApiError::rejected(RECIPIENT_REGISTRATION_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .register_recipient(&caller, body)
        .await
        .map(|committed| (StatusCode::CREATED, Json(committed)))
        .map_err(|e| ApiError::registry(RECIPIENT_REGISTRATION_FAILED, e, &request_id))
}
