//! Organ donation registry library.
//!
//! ```text
//!   client ──HTTP──▶ http (auth, handlers) ──▶ registry (roles, validation,
//!                                              retries, read-your-writes)
//!                                                   │
//!                                  matching ◀───────┤
//!                                                   ▼
//!                                     ledger: memory │ contract (blockchain)
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod ledger;
pub mod matching;
pub mod registry;

// Ledger backends
pub mod blockchain;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::RegistryConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use registry::{Registry, RegistryError};
