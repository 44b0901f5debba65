//! Deterministic simulation harness for the Parley synchronization engine.
//!
//! In-memory implementations of the environment, the server and the driver
//! for reproducible testing: time only moves when the test says so, the RNG
//! is seeded, and frames are delivered in an order the test controls.
//!
//! # Components
//!
//! - [`SimEnv`]: virtual clock and seeded RNG
//! - [`SimServer`]: the server side of the wire contract, plus history
//! - [`SimDriver`]: [`parley_app::Driver`] over a [`SharedSimServer`], so the
//!   production [`parley_app::Runtime`] runs unchanged
//! - [`SimCluster`]: several clients driven synchronously, for tests that
//!   pick the interleaving
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] for the client
//! invariants.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cluster;
pub mod invariants;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_server;

pub use cluster::SimCluster;
pub use invariants::{
    ClientSnapshot, Invariant, InvariantRegistry, InvariantResult, MessageSnapshot,
    NoSelfTyping, ReadersMonotonic, SelfOnline, SnapshotHistory, SystemSnapshot,
    TombstonesPersist, TypingRequiresRoom, UniqueMessageIds, Violation,
};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv, SimInstant};
pub use sim_server::{DELETED_CONTENT, SessionId, SharedSimServer, SimServer, SimUser};
