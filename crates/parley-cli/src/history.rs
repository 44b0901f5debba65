//! History collaborator.
//!
//! Room history is served over HTTP next to the WebSocket endpoint. The CLI
//! does not speak that API yet, so every room starts empty and fills from
//! live events.

use parley_proto::{RoomId, payloads::message::MessageRecord};

/// History source that always returns an empty history.
#[derive(Debug, Clone, Default)]
pub struct HistoryStub {
    fetches: u64,
}

impl HistoryStub {
    /// New stub.
    pub fn new() -> Self {
        Self::default()
    }

    /// History of `room_id`: always empty.
    pub fn fetch(&mut self, room_id: RoomId) -> Vec<MessageRecord> {
        self.fetches += 1;
        tracing::debug!(room_id, fetches = self.fetches, "history not available, starting empty");
        Vec::new()
    }

    /// Number of fetches served.
    pub fn fetches(&self) -> u64 {
        self.fetches
    }
}
