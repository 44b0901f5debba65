//! Client
//!
//! Action-based chat synchronization engine for the Parley protocol. Keeps a
//! single authenticated connection, the active room's message sequence,
//! presence and typing state consistent under concurrent server pushes,
//! optimistic local sends and rapid room switches.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and Action-Based patterns as
//! [`parley_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`])
//! for the caller to execute.
//!
//! # Components
//!
//! - [`Client`]: Top-level state machine
//! - [`RoomController`]: The single active room and its epochs
//! - [`MessageStore`]: Ordered messages with optimistic send reconciliation
//! - [`PresenceTracker`]: Global online set
//! - [`TypingCoordinator`]: Debounced local typing and remote indicators
//! - [`grouping`]: Day and author grouping for display
//!
//! # Transport (optional)
//!
//! With the `transport` feature enabled, this crate also provides:
//! - [`transport::ConnectedClient`]: Frame channels over a WebSocket
//! - [`transport::connect`]: Connect to a server

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod client;
mod error;
mod event;
pub mod grouping;
mod presence;
mod room;
mod store;
mod typing;

#[cfg(feature = "transport")]
pub mod transport;

pub use client::{Client, ClientConfig, DEFAULT_ECHO_TIMEOUT};
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use parley_core::{ConnectionStatus, Environment, Identity, TransportEvent, TransportId};
pub use parley_proto::{MessageId, RoomId, Timestamp, UserId};
pub use presence::PresenceTracker;
pub use room::{RoomChange, RoomController, RoomSession};
pub use store::{
    CreateOutcome, DeliveryStatus, LocalId, Message, MessageKey, MessageStore, PatchOutcome,
};
pub use typing::{
    DEFAULT_DEBOUNCE, DEFAULT_REMOTE_TTL, TypingCoordinator, TypingSignal, TypingTimer,
};
