//! Driver trait for abstracting I/O operations.
//!
//! The [`Driver`] trait decouples the runtime from specific I/O
//! implementations. Each frontend implements the trait to provide
//! platform-specific I/O, while the generic [`crate::Runtime`] handles all
//! orchestration.

use std::{future::Future, ops::Sub, time::Duration};

use parley_core::{TransportEvent, TransportId};
use parley_proto::{Frame, RoomId, payloads::message::MessageRecord};

use crate::{ChatView, Intent};

/// Abstracts I/O operations for the runtime.
///
/// # Implementations
///
/// - **CLI**: stdin lines for intents, WebSocket transport
/// - **Simulation**: scripted intents against an in-memory server
///
/// # Transports
///
/// The client names every transport it wants with a [`TransportId`]. The
/// driver reports what happens to it (opened, frames, closed, failed) through
/// [`recv_transport`](Driver::recv_transport), tagged with that id. Events
/// for disposed transports may still be reported; the client ignores them.
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Time instant type. Enables virtual time in simulation.
    type Instant: Copy + Ord + Send + Sync + Sub<Output = Duration>;

    /// Poll for the next user intent.
    ///
    /// Returns `None` if no intent is ready.
    fn poll_intent(&mut self) -> impl Future<Output = Result<Option<Intent>, Self::Error>> + Send;

    /// Start opening a transport to the server.
    ///
    /// Success or failure is reported later through `recv_transport`.
    fn open_transport(&mut self, transport: TransportId) -> impl Future<Output = ()> + Send;

    /// Close and release a transport.
    fn dispose_transport(&mut self, transport: TransportId);

    /// Send a frame on the current transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport is gone. The runtime logs it; the
    /// loss itself is expected to surface as a transport event.
    fn send_frame(&mut self, frame: Frame) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Next transport event, or `None` if nothing is pending.
    fn recv_transport(&mut self) -> impl Future<Output = Option<TransportEvent>> + Send;

    /// Fetch message history for a room from the HTTP collaborator.
    fn fetch_history(
        &mut self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, Self::Error>> + Send;

    /// Current time instant.
    fn now(&self) -> Self::Instant;

    /// Render the current view.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    fn render(&mut self, view: &ChatView) -> Result<(), Self::Error>;

    /// Stop all I/O and clean up resources.
    fn stop(&mut self);
}
