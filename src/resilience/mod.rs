//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Ledger read:
//!     → retries.rs (transient failure? back off and retry)
//!     → backoff.rs (exponential delay + jitter)
//! ```
//!
//! # Design Decisions
//! - Every remote call already carries a deadline (blockchain client timeout)
//! - Retries only for idempotent reads

pub mod backoff;
pub mod retries;

pub use retries::retry_read;
