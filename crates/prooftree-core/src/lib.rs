//! Core of the prooftree system: an append-only event ledger, a pure state
//! folder, a filesystem-atomic claim/lock subsystem, and the service layer
//! that turns validated commands into journaled transitions.
//!
//! The command-line surface, export formatters, and metrics reporting are
//! external collaborators built on top of this crate; they are not part of
//! it.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod ledger;
pub mod locks;
pub mod paths;
pub mod service;
pub mod state;
pub mod taint;

#[cfg(test)]
pub mod proptest_generators;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use events::{Event, EventPayload};
pub use ids::{NodeId, now_utc};
pub use ledger::Ledger;
pub use locks::{LockRecord, LockRegistry};
pub use service::{ClaimOutcome, Service, default_proof_dir, service_for};
pub use state::State;
pub use taint::Taint;
