//! In-process JSON-RPC node for tests. Its contract holds no donors or
//! recipients, and the first `fail_first` contract calls answer 503.

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

async fn rpc(State(failures): State<Arc<AtomicUsize>>, Json(req): Json<Value>) -> Result<Json<Value>, StatusCode> {
    let result = match req["method"].as_str() {
        Some("eth_chainId") => json!("0x539"),
        Some("eth_call") => {
            if failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StatusCode::SERVICE_UNAVAILABLE);
            }
            // ABI encoding of an empty dynamic array
            json!(format!("0x{:064x}{:064x}", 32, 0))
        }
        _ => json!("0x1"),
    };
    Ok(Json(json!({ "jsonrpc": "2.0", "id": req["id"], "result": result })))
}

/// Serve the node on an ephemeral port and return its URL.
pub async fn spawn(fail_first: usize) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new()
        .route("/", post(rpc))
        .with_state(Arc::new(AtomicUsize::new(fail_first)));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}
