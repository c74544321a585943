//! Match, retrieval and urgency handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::http::error::{ApiError, LOAD_FAILED, MATCH_FAILED, RETRIEVAL_FAILED, URGENCY_UPDATE_FAILED};
use crate::http::listing::RevisionQuery;
use crate::http::request::RequestId;
use crate::http::server::AppState;
use crate::ledger::Committed;
use crate::registry::service::Listing;
use crate::registry::types::{Donor, DonorId, MatchRecord, Recipient, RecipientId};
use crate::security::grants::CallerContext;

/// Body of match and retrieval requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRequest {
    pub donor_id: DonorId,
    pub recipient_id: RecipientId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrgencyRequest {
    pub urgency_level: i64,
}

pub async fn match_organ(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    body: Result<Json<PairRequest>, JsonRejection>,
) -> Result<Json<Committed<MatchRecord>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::rejected(MATCH_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .match_organ(&caller, body.donor_id, body.recipient_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(MATCH_FAILED, e, &request_id))
}

pub async fn confirm_retrieval(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    body: Result<Json<PairRequest>, JsonRejection>,
) -> Result<Json<Committed<MatchRecord>>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::rejected(RETRIEVAL_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .confirm_retrieval(&caller, body.donor_id, body.recipient_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(RETRIEVAL_FAILED, e, &request_id))
}

pub async fn update_urgency(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    recipient_id: Result<Path<RecipientId>, PathRejection>,
    body: Result<Json<UrgencyRequest>, JsonRejection>,
) -> Result<Json<Committed<Recipient>>, ApiError> {
    let Path(recipient_id) =
        recipient_id.map_err(|e| ApiError::rejected(URGENCY_UPDATE_FAILED, e, &request_id))?;
    let Json(body) = body.map_err(|e| ApiError::rejected(URGENCY_UPDATE_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .update_urgency(&caller, recipient_id, body.urgency_level)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(URGENCY_UPDATE_FAILED, e, &request_id))
}

pub async fn candidates(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    recipient_id: Result<Path<RecipientId>, PathRejection>,
    query: Result<Query<RevisionQuery>, QueryRejection>,
) -> Result<Json<Listing<Donor>>, ApiError> {
    let Path(recipient_id) = recipient_id.map_err(|e| ApiError::rejected(LOAD_FAILED, e, &request_id))?;
    let Query(query) = query.map_err(|e| ApiError::rejected(LOAD_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .candidates(&caller, recipient_id, query.min_revision)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(LOAD_FAILED, e, &request_id))
}
