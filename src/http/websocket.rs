//! Ledger event feed over WebSocket.
//!
//! # Data Flow
//! ```text
//! ledger commit → broadcast::Sender<LedgerEvent> → this task → client
//! ```
//!
//! # Design Decisions
//! - One JSON text frame per event, shaped exactly like `LedgerEvent`
//! - A lagging client gets a `lagged` notice and keeps streaming
//! - Inbound frames are ignored except close
//! - The feed closes when the server shuts down

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::http::error::{ApiError, FORBIDDEN};
use crate::http::request::RequestId;
use crate::http::server::AppState;
use crate::ledger::LedgerEvent;
use crate::security::grants::CallerContext;
use crate::security::roles::Operation;

pub async fn events(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    request_id: RequestId,
    ws: WebSocketUpgrade,
) -> Response {
    if !caller.may(Operation::ReadRegistry) {
        tracing::warn!(
            request_id = %request_id,
            caller = %caller.address,
            role = %caller.role,
            "Event feed refused"
        );
        return ApiError::new(StatusCode::FORBIDDEN, FORBIDDEN, request_id).into_response();
    }

    let events = state.inner.load().registry.subscribe();
    let shutdown = state.shutdown.subscribe();
    ws.on_upgrade(move |socket| stream_events(socket, events, shutdown, caller))
}

fn lagged_notice(skipped: u64) -> String {
    serde_json::json!({ "event": "lagged", "skipped": skipped }).to_string()
}

async fn stream_events(
    socket: WebSocket,
    mut events: broadcast::Receiver<LedgerEvent>,
    mut shutdown: broadcast::Receiver<()>,
    caller: CallerContext,
) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(caller = %caller.address, "Event stream opened");

    loop {
        tokio::select! {
            event = events.recv() => {
                let frame = match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::error!(error = %e, "Failed to encode ledger event");
                            continue;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(caller = %caller.address, skipped, "Event subscriber lagged");
                        lagged_notice(skipped)
                    }
                    Err(RecvError::Closed) => break,
                };
                if sender.send(Message::Text(frame.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            _ = shutdown.recv() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }

    tracing::info!(caller = %caller.address, "Event stream closed");
}
