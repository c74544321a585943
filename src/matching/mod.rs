//! Matching subsystem.
//!
//! # Data Flow
//! ```text
//! (donor, recipient) from a ledger snapshot
//!     → engine.rs (availability + received checks)
//!     → policy.rs (organ / blood / tissue predicate)
//!     → Ok(()) or RegistryError::Incompatible
//!
//! list requests
//!     → view.rs (substring filters, urgency sort, dashboard stats)
//! ```
//!
//! # Design Decisions
//! - Policy is a pure trait object; swapping the medical rule never touches ledgers
//! - Every failing rule is reported, not just the first
//! - Sorting is stable so equal urgency keeps registration order

pub mod engine;
pub mod policy;
pub mod view;

pub use engine::MatchEngine;
pub use policy::{CompatibilityPolicy, StandardPolicy};
pub use view::{DonorFilter, RecipientFilter, RegistryStats, UrgencySort};
