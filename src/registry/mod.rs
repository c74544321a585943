//! Registry domain.
//!
//! # Data Flow
//! ```text
//! HTTP handler (CallerContext, payload)
//!     → service.rs (role gate, intake validation, read retries, min_revision wait)
//!     → ledger (address check, atomic commit, event)
//!     → Committed<T> / Listing<T> back to the handler
//! ```
//!
//! # Design Decisions
//! - Ids are issued once and never reused; positions never leak out
//! - Intake validation happens before any ledger call
//! - Mutations are never retried

pub mod error;
pub mod service;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use service::{Listing, Registry};
pub use types::{
    Donor, DonorId, Hospital, MatchId, MatchRecord, NewDonor, NewHospital, NewRecipient,
    Recipient, RecipientId, UrgencyLevel,
};
