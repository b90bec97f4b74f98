//! SocialSeed storage abstractions.
//!
//! Three record families live behind these traits:
//! - accounts (phase, health score, soft-delete flag)
//! - append-only phase history
//! - the action ledger (action, risk assessment, decision, execution)
//!
//! The in-memory adapter is the reference implementation. The PostgreSQL
//! adapter (feature `postgres`) is the transactional source of truth.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use traits::{AccountStore, LedgerStore, PhaseStore, QueryWindow, SeedStorage};
