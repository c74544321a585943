//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, tracing, limits)
//!     → middleware/auth.rs (bearer token → CallerContext)
//!     → registry.rs / matching.rs / listing.rs / websocket.rs
//!     → Registry service
//!     → error.rs (detailed cause logged, generic message returned)
//! ```

pub mod error;
pub mod listing;
pub mod matching;
pub mod middleware;
pub mod registry;
pub mod request;
pub mod server;
pub mod websocket;

pub use error::ApiError;
pub use request::{RequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
