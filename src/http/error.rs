//! Mapping registry failures to HTTP responses.
//!
//! The detailed cause is logged with the request id; the caller only ever
//! sees the generic message for the action plus a status code for the kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::blockchain::types::BlockchainError;
use crate::http::request::RequestId;
use crate::registry::error::RegistryError;

pub const HOSPITAL_REGISTRATION_FAILED: &str = "Registration failed";
pub const DONOR_REGISTRATION_FAILED: &str = "Donor registration failed";
pub const RECIPIENT_REGISTRATION_FAILED: &str = "Recipient registration failed";
pub const MATCH_FAILED: &str = "Compatibility not found";
pub const RETRIEVAL_FAILED: &str = "Retrieval confirmation failed";
pub const URGENCY_UPDATE_FAILED: &str = "Urgency update failed";
pub const LOAD_FAILED: &str = "Failed to load registry data";
pub const STALE_SNAPSHOT: &str = "Ledger snapshot is stale";
pub const UNAUTHENTICATED: &str = "Missing or unknown capability token";
pub const FORBIDDEN: &str = "Operation not permitted";

/// JSON error body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub request_id: String,
}

/// Status code for each failure kind.
pub fn status_for(err: &RegistryError) -> StatusCode {
    match err {
        RegistryError::MissingField(_) => StatusCode::BAD_REQUEST,
        RegistryError::UrgencyOutOfRange { .. } | RegistryError::Incompatible { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        RegistryError::Unauthorized { .. } => StatusCode::FORBIDDEN,
        RegistryError::HospitalExists(_)
        | RegistryError::DonorUnavailable(_)
        | RegistryError::RecipientAlreadyReceived(_)
        | RegistryError::RetrievalAlreadyConfirmed(_) => StatusCode::CONFLICT,
        RegistryError::DonorNotFound(_)
        | RegistryError::RecipientNotFound(_)
        | RegistryError::MatchNotFound { .. } => StatusCode::NOT_FOUND,
        RegistryError::StaleSnapshot { .. } => StatusCode::SERVICE_UNAVAILABLE,
        RegistryError::Ledger(ledger) => match ledger {
            BlockchainError::Timeout(_) | BlockchainError::ConfirmationTimeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            BlockchainError::NoSigner(_) => StatusCode::FORBIDDEN,
            // The contract refused the call given its current state.
            BlockchainError::Reverted(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        },
        RegistryError::Persistence(_) | RegistryError::Corrupt(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// An error response ready to be returned from a handler.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    request_id: RequestId,
}

impl ApiError {
    pub fn new(status: StatusCode, message: &'static str, request_id: RequestId) -> Self {
        Self {
            status,
            message,
            request_id,
        }
    }

    /// Log `err` in full and reduce it to `message`.
    pub fn registry(message: &'static str, err: RegistryError, request_id: &RequestId) -> Self {
        let status = status_for(&err);
        let message = match &err {
            RegistryError::StaleSnapshot { .. } => STALE_SNAPSHOT,
            _ => message,
        };
        if status.is_server_error() {
            tracing::error!(request_id = %request_id, status = status.as_u16(), error = %err, "{message}");
        } else {
            tracing::warn!(request_id = %request_id, status = status.as_u16(), error = %err, "{message}");
        }
        Self::new(status, message, request_id.clone())
    }

    /// A request the extractors refused before it reached the registry.
    /// The parser's own wording stays in the log.
    pub fn rejected(message: &'static str, rejection: impl std::fmt::Display, request_id: &RequestId) -> Self {
        tracing::warn!(request_id = %request_id, error = %rejection, "{message}: malformed request");
        Self::new(StatusCode::BAD_REQUEST, message, request_id.clone())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message.to_string(),
            request_id: self.request_id.0,
        };
        (self.status, Json(body)).into_response()
    }
}
