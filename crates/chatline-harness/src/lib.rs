//! Deterministic simulation harness for chatline.
//!
//! Virtual-time implementations of the Environment and Driver traits for
//! deterministic, reproducible testing of the runtime and the store.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the store
//! invariants; attach it to a [`SimDriver`] to check every published
//! snapshot.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod scenario;
pub mod sim_driver;
pub mod sim_env;

pub use invariants::{
    ActiveConversationListed, ActiveUnreadZero, ConversationSnapshot, Invariant, InvariantKind,
    InvariantRegistry, InvariantResult, LogOrdered, PendingWellFormed, SystemSnapshot,
    UniqueMessageIds, Violation,
};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
