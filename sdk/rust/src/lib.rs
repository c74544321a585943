//! Rust client for the organ donation registry API.

mod client;

pub use client::{ClientError, RegistryClient};
