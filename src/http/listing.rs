//! Read-only list and dashboard handlers.
//!
//! Query strings are flat, so the filters are spelled out here rather than
//! flattened from the view types.

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::http::error::{ApiError, LOAD_FAILED};
use crate::http::request::RequestId;
use crate::http::server::AppState;
use crate::matching::{DonorFilter, RecipientFilter, RegistryStats, UrgencySort};
use crate::registry::service::Listing;
use crate::registry::types::{Donor, MatchRecord, Recipient};
use crate::security::grants::CallerContext;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RevisionQuery {
    pub min_revision: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DonorQuery {
    pub name: Option<String>,
    pub blood_type: Option<String>,
    pub organ: Option<String>,
    pub tissue_type: Option<String>,
    pub min_revision: Option<u64>,
}

impl DonorQuery {
    fn filter(&self) -> DonorFilter {
        DonorFilter {
            name: self.name.clone(),
            blood_type: self.blood_type.clone(),
            organ: self.organ.clone(),
            tissue_type: self.tissue_type.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientQuery {
    pub name: Option<String>,
    pub blood_type: Option<String>,
    pub organ: Option<String>,
    pub tissue_type: Option<String>,
    pub urgency_level: Option<String>,
    pub sort: UrgencySort,
    pub min_revision: Option<u64>,
}

impl RecipientQuery {
    fn filter(&self) -> RecipientFilter {
        RecipientFilter {
            name: self.name.clone(),
            blood_type: self.blood_type.clone(),
            organ: self.organ.clone(),
            tissue_type: self.tissue_type.clone(),
            urgency_level: self.urgency_level.clone(),
        }
    }
}

pub async fn donors(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    query: Result<Query<DonorQuery>, QueryRejection>,
) -> Result<Json<Listing<Donor>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::rejected(LOAD_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .donors(&caller, &query.filter(), query.min_revision)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(LOAD_FAILED, e, &request_id))
}

pub async fn recipients(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    query: Result<Query<RecipientQuery>, QueryRejection>,
) -> Result<Json<Listing<Recipient>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::rejected(LOAD_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .recipients(&caller, &query.filter(), query.sort, query.min_revision)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(LOAD_FAILED, e, &request_id))
}

pub async fn matches(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    query: Result<Query<RevisionQuery>, QueryRejection>,
) -> Result<Json<Listing<MatchRecord>>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::rejected(LOAD_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .matches(&caller, query.min_revision)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(LOAD_FAILED, e, &request_id))
}

pub async fn stats(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    query: Result<Query<RevisionQuery>, QueryRejection>,
) -> Result<Json<RegistryStats>, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::rejected(LOAD_FAILED, e, &request_id))?;
    let inner = state.inner.load_full();
    inner
        .registry
        .stats(&caller, query.min_revision)
        .await
        .map(Json)
        .map_err(|e| ApiError::registry(LOAD_FAILED, e, &request_id))
}
