//! Package struct with typed accessors.
//!
//! Represents a complete protocol package with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use thingsdb_client::protocol::{proto, Header, Package};
//! use bytes::Bytes;
//!
//! let header = Header::new(proto::RES_QUERY, 42, 5);
//! let pkg = Package::new(header, Bytes::from_static(b"hello"));
//!
//! assert_eq!(pkg.id(), 42);
//! assert_eq!(pkg.payload(), b"hello");
//! ```

use bytes::Bytes;

use super::proto;
use super::wire_format::{Header, HEADER_SIZE};

/// A complete protocol package.
#[derive(Debug, Clone)]
pub struct Package {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub payload: Bytes,
}

impl Package {
    /// Create a new package from header and payload.
    pub fn new(header: Header, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get the correlation id.
    #[inline]
    pub fn id(&self) -> u16 {
        self.header.id
    }

    /// Get the type tag.
    #[inline]
    pub fn tp(&self) -> u8 {
        self.header.tp
    }

    /// Check if this is a success response.
    #[inline]
    pub fn is_response(&self) -> bool {
        proto::is_response(self.header.tp)
    }

    /// Check if this is an error response.
    #[inline]
    pub fn is_error(&self) -> bool {
        proto::is_error(self.header.tp)
    }

    /// Check if this is an unsolicited push event.
    #[inline]
    pub fn is_push(&self) -> bool {
        proto::PushKind::from_tag(self.header.tp).is_some()
    }
}

/// Build a complete package as a single byte vector.
///
/// # Example
///
/// ```
/// use thingsdb_client::protocol::{build_package, proto, HEADER_SIZE};
///
/// let bytes = build_package(proto::REQ_PING, 7, b"");
/// assert_eq!(bytes.len(), HEADER_SIZE);
/// ```
pub fn build_package(tp: u8, id: u16, payload: &[u8]) -> Vec<u8> {
    let header = Header::new(tp, id, payload.len() as u32);
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(payload);
    buf
}
