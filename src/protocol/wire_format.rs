//! Wire format encoding and decoding.
//!
//! Implements the 8-byte package header:
//! ```text
//! ┌──────────┬──────────┬──────┬───────┐
//! │ Length   │ Id       │ Type │ Check │
//! │ 4 bytes  │ 2 bytes  │ 1    │ 1     │
//! │ uint32 LE│ uint16 LE│      │       │
//! └──────────┴──────────┴──────┴───────┘
//! ```
//!
//! All multi-byte integers are Little Endian. `check` is always `tp ^ 0xFF`.

use crate::error::{ClientError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size (200 MiB), the limit the server enforces.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 209_715_200;

/// Compute the check byte for a type tag.
#[inline]
pub fn type_check(tp: u8) -> u8 {
    tp ^ 0xFF
}

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length in bytes.
    pub payload_length: u32,
    /// Correlation id (0 for push events).
    pub id: u16,
    /// Package type tag (see [`proto`](super::proto)).
    pub tp: u8,
    /// Check byte, must equal `tp ^ 0xFF`.
    pub check: u8,
}

impl Header {
    /// Create a new header with a valid check byte.
    pub fn new(tp: u8, id: u16, payload_length: u32) -> Self {
        Self {
            payload_length,
            id,
            tp,
            check: type_check(tp),
        }
    }

    /// Encode header to bytes (Little Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use thingsdb_client::protocol::{proto, Header};
    ///
    /// let header = Header::new(proto::REQ_QUERY, 42, 100);
    /// let bytes = header.encode();
    /// assert_eq!(bytes.len(), 8);
    /// assert_eq!(bytes[7], proto::REQ_QUERY ^ 0xFF);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..4].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[4..6].copy_from_slice(&self.id.to_le_bytes());
        buf[6] = self.tp;
        buf[7] = self.check;
    }

    /// Decode header from bytes (Little Endian).
    ///
    /// Returns `None` if buffer is too short. The check byte is not verified
    /// here; use [`Header::validate`].
    ///
    /// # Example
    ///
    /// ```
    /// use thingsdb_client::protocol::Header;
    ///
    /// let bytes = [100, 0, 0, 0, 42, 0, 34, 34 ^ 0xFF];
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.payload_length, 100);
    /// assert_eq!(header.id, 42);
    /// assert_eq!(header.tp, 34);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            payload_length: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            id: u16::from_le_bytes([buf[4], buf[5]]),
            tp: buf[6],
            check: buf[7],
        })
    }

    /// Validate the header.
    ///
    /// Checks:
    /// - Check byte equals `tp ^ 0xFF`
    /// - Payload length doesn't exceed max
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.check != type_check(self.tp) {
            return Err(ClientError::Framing(format!(
                "invalid check byte {:#04x} for type {}",
                self.check, self.tp
            )));
        }

        if self.payload_length > max_payload_size {
            return Err(ClientError::Framing(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }

        Ok(())
    }
}
