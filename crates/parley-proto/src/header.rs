//! Fixed-size binary frame header.
//!
//! ```text
//! 0       4   5   6       8               12                      20
//! ┌───────┬───┬───┬───────┬───────────────┬───────────────────────┐
//! │ magic │ver│flg│ event │ payload_size  │        room_id        │
//! └───────┴───┴───┴───────┴───────────────┴───────────────────────┘
//! ```
//!
//! All multi-byte fields are big endian. `room_id == 0` marks a frame that is
//! not scoped to a room (session and presence events).

use bytes::BufMut;

use crate::{
    EventKind, RoomId,
    errors::{ProtocolError, Result},
};

/// Frame header (20 bytes on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    magic: [u8; 4],
    version: u8,
    flags: u8,
    pub(crate) event: [u8; 2],
    pub(crate) payload_size: [u8; 4],
    room_id: [u8; 8],
}

impl FrameHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 20;

    /// Magic number: "PRLY" in ASCII.
    pub const MAGIC: u32 = 0x5052_4C59;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB). Chat events are small; anything larger
    /// is garbage or abuse.
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Create a header for the given event, not scoped to any room.
    #[must_use]
    pub fn new(event: EventKind) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            flags: 0,
            event: event.to_u16().to_be_bytes(),
            payload_size: [0; 4],
            room_id: [0; 8],
        }
    }

    /// Parse and validate a header from the start of `bytes`.
    ///
    /// Trailing bytes (the payload) are ignored.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::FrameTooShort` if fewer than [`Self::SIZE`] bytes
    /// - `ProtocolError::InvalidMagic` on magic mismatch
    /// - `ProtocolError::UnsupportedVersion` on version mismatch
    /// - `ProtocolError::PayloadTooLarge` if the claimed size exceeds the max
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(raw) = bytes.get(..Self::SIZE) else {
            return Err(ProtocolError::FrameTooShort { expected: Self::SIZE, actual: bytes.len() });
        };

        let mut header = Self {
            magic: [0; 4],
            version: raw[4],
            flags: raw[5],
            event: [0; 2],
            payload_size: [0; 4],
            room_id: [0; 8],
        };
        header.magic.copy_from_slice(&raw[0..4]);
        header.event.copy_from_slice(&raw[6..8]);
        header.payload_size.copy_from_slice(&raw[8..12]);
        header.room_id.copy_from_slice(&raw[12..20]);

        let magic = u32::from_be_bytes(header.magic);
        if magic != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if header.payload_size() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: header.payload_size() as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize into a buffer.
    pub fn write_to(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.magic);
        dst.put_u8(self.version);
        dst.put_u8(self.flags);
        dst.put_slice(&self.event);
        dst.put_slice(&self.payload_size);
        dst.put_slice(&self.room_id);
    }

    /// Serialize into a fixed array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        let mut cursor = &mut out[..];
        self.write_to(&mut cursor);
        out
    }

    /// Raw event code.
    #[must_use]
    pub fn event_code(&self) -> u16 {
        u16::from_be_bytes(self.event)
    }

    /// Event kind. `None` if the code is unknown.
    #[must_use]
    pub fn event(&self) -> Option<EventKind> {
        EventKind::from_u16(self.event_code())
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }

    /// Room this frame is scoped to. `None` for global frames.
    #[must_use]
    pub fn room_id(&self) -> Option<RoomId> {
        match u64::from_be_bytes(self.room_id) {
            0 => None,
            id => Some(id),
        }
    }

    /// Scope this frame to a room.
    pub fn set_room_id(&mut self, room_id: RoomId) {
        self.room_id = room_id.to_be_bytes();
    }

    /// Reserved flag bits.
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trip() {
        let mut header = FrameHeader::new(EventKind::ReceiveMessage);
        header.set_room_id(42);

        let bytes = header.to_bytes();
        let parsed = FrameHeader::from_bytes(&bytes).unwrap();

        assert_eq!(parsed, header);
        assert_eq!(parsed.event(), Some(EventKind::ReceiveMessage));
        assert_eq!(parsed.room_id(), Some(42));
    }

    #[test]
    fn zero_room_is_global() {
        let header = FrameHeader::new(EventKind::OnlineUsers);
        assert_eq!(header.room_id(), None);
    }

    #[test]
    fn rejects_short_buffer() {
        let result = FrameHeader::from_bytes(&[0u8; 10]);
        assert!(matches!(result, Err(ProtocolError::FrameTooShort { expected: 20, actual: 10 })));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = FrameHeader::new(EventKind::Typing).to_bytes();
        bytes[0] = b'X';
        assert!(matches!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic(_))));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = FrameHeader::new(EventKind::Typing).to_bytes();
        bytes[4] = 9;
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::UnsupportedVersion(9)));
    }

    #[test]
    fn rejects_oversized_claim() {
        let mut bytes = FrameHeader::new(EventKind::Typing).to_bytes();
        bytes[8..12].copy_from_slice(&(FrameHeader::MAX_PAYLOAD_SIZE + 1).to_be_bytes());
        assert!(matches!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
