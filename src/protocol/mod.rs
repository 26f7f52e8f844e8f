//! Protocol module - wire format, framing, and type tags.
//!
//! This module implements the binary package format:
//! - 8-byte header encoding/decoding with type check byte
//! - Package buffer for accumulating partial reads
//! - Package struct with typed accessors
//! - Type tag table ([`proto`])

mod package;
mod package_buffer;
pub mod proto;
mod wire_format;

pub use package::{build_package, Package};
pub use package_buffer::PackageBuffer;
pub use proto::PushKind;
pub use wire_format::{type_check, Header, DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE};
