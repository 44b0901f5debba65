//! Parley core.
//!
//! Sans-IO building blocks shared by the synchronization engine:
//!
//! - [`env::Environment`]: time and randomness, injectable for simulation
//! - [`connection::ConnectionManager`]: the single authenticated connection
//!   and exclusive owner of the transport handle
//! - [`listeners::Listeners`]: owner-scoped subscriptions to wire events
//!
//! Nothing in this crate performs I/O. State machines take the current time
//! as input and return actions for a driver to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod connection;
pub mod env;
pub mod error;
pub mod listeners;

pub use connection::{
    ConnectionAction, ConnectionConfig, ConnectionManager, ConnectionStatus, Identity,
    TransportEvent, TransportId,
};
pub use env::Environment;
pub use error::ConnectionError;
pub use listeners::{ListenerId, ListenerOwner, Listeners};
