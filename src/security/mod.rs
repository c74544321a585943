//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Authorization: Bearer <token>
//!     → grants.rs (token → CallerContext { address, role })
//!     → roles.rs (Role::permits(Operation), checked by the registry)
//!     → ledger (second check by address)
//! ```
//!
//! # Design Decisions
//! - Fail closed: unknown tokens get 401, unpermitted roles get 403
//! - One gating table; handlers never inspect roles themselves

pub mod grants;
pub mod roles;

pub use grants::{CallerContext, GrantTable};
pub use roles::{Operation, Role};
