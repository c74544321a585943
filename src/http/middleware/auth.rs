//! Capability token authentication.
//!
//! Resolves `Authorization: Bearer <token>` against the current grant table
//! and attaches the [`CallerContext`] to the request. Role checks happen per
//! operation in the registry; this layer only answers "who is calling".

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::http::error::{ApiError, UNAUTHENTICATED};
use crate::http::request::RequestId;
use crate::http::server::AppState;
use crate::security::grants::CallerContext;

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn require_caller(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let caller: Option<CallerContext> =
        bearer_token(&request).and_then(|t| state.inner.load().grants.resolve(t));

    match caller {
        Some(caller) => {
            tracing::debug!(caller = %caller.address, role = %caller.role, "Caller authenticated");
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        None => {
            let request_id = RequestId::from_headers(request.headers());
            tracing::warn!(
                request_id = %request_id,
                path = %request.uri().path(),
                "Rejected request without a valid capability token"
            );
            ApiError::new(StatusCode::UNAUTHORIZED, UNAUTHENTICATED, request_id).into_response()
        }
    }
}
