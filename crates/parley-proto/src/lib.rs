//! Parley wire protocol.
//!
//! Every event exchanged with the chat server travels as a [`Frame`]: a small
//! fixed binary header naming the [`EventKind`] and the room it belongs to,
//! followed by a CBOR-encoded body. The header is enough to route and filter
//! a frame; only the synchronization engine deserializes bodies into a
//! [`Payload`].
//!
//! # Components
//!
//! - [`EventKind`]: every named wire event, with its stable code and name
//! - [`FrameHeader`] / [`Frame`]: transport framing
//! - [`Payload`]: typed event bodies (see [`payloads`])

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod event;
mod frame;
mod header;
pub mod payloads;

pub use errors::ProtocolError;
pub use event::EventKind;
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::Payload;

/// Opaque room identifier assigned by the server.
pub type RoomId = u64;

/// Opaque user identifier assigned by the server.
pub type UserId = u64;

/// Server-assigned message identifier, unique within a room.
pub type MessageId = u64;

/// Milliseconds since the Unix epoch (UTC).
pub type Timestamp = u64;
