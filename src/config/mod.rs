//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! registry.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → RegistryConfig (validated, immutable)
//!     → shared via ArcSwap with the HTTP layer
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → atomic swap of grants, urgency scale and matching policy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - The ledger backend is fixed at startup and never hot-swapped

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    BlockchainConfig, ConsistencyConfig, LedgerBackend, LedgerConfig, MatchingConfig,
    ObservabilityConfig, RegistryConfig, RetryConfig, UrgencyScale,
};
