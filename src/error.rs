//! Error types for thingsdb-client.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use crate::codec::MsgPackCodec;
use crate::protocol::proto;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error during socket operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Malformed package header (bad check byte, oversize length).
    /// Fatal to the connection that produced it.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Unexpected package type or other protocol violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// No active transport.
    #[error("No connection")]
    NoConnection,

    /// The transport carrying the request went away before a response arrived.
    #[error("Connection lost")]
    ConnectionLost,

    /// The client was closed explicitly.
    #[error("Client closed")]
    Closed,

    /// The request exceeded its deadline.
    #[error("Request timed out on package id {0}")]
    Timeout(u16),

    /// The server rejected the request.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Writer queue is full.
    #[error("Backpressure: writer queue is full")]
    Backpressure,

    /// Every correlation id is held by a pending request.
    #[error("All {0} correlation ids are pending")]
    IdsExhausted(usize),

    /// Endpoint string could not be parsed.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Error category, derived from the error package type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Overflow,
    ZeroDivision,
    MaxQuota,
    Auth,
    Forbidden,
    Lookup,
    BadRequest,
    Query,
    Node,
    Internal,
    /// An error tag this client does not know.
    Other(u8),
}

impl ErrorKind {
    /// Map an error package type to its kind.
    pub fn from_tag(tp: u8) -> Self {
        match tp {
            proto::ERR_OVERFLOW => Self::Overflow,
            proto::ERR_ZERO_DIV => Self::ZeroDivision,
            proto::ERR_MAX_QUOTA => Self::MaxQuota,
            proto::ERR_AUTH => Self::Auth,
            proto::ERR_FORBIDDEN => Self::Forbidden,
            proto::ERR_INDEX => Self::Lookup,
            proto::ERR_BAD_REQUEST => Self::BadRequest,
            proto::ERR_QUERY => Self::Query,
            proto::ERR_NODE => Self::Node,
            proto::ERR_INTERNAL => Self::Internal,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overflow => f.write_str("overflow"),
            Self::ZeroDivision => f.write_str("zero division"),
            Self::MaxQuota => f.write_str("max quota"),
            Self::Auth => f.write_str("auth"),
            Self::Forbidden => f.write_str("forbidden"),
            Self::Lookup => f.write_str("lookup"),
            Self::BadRequest => f.write_str("bad request"),
            Self::Query => f.write_str("query"),
            Self::Node => f.write_str("node"),
            Self::Internal => f.write_str("internal"),
            Self::Other(tp) => write!(f, "error type {}", tp),
        }
    }
}

/// An error response decoded from the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error ({code}): {message}")]
pub struct ServerError {
    pub kind: ErrorKind,
    pub code: i64,
    pub message: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

impl ServerError {
    /// Decode an error package payload.
    ///
    /// A payload that does not decode still yields an error of the right kind,
    /// with a placeholder message.
    pub fn decode(tp: u8, payload: &[u8]) -> Self {
        let kind = ErrorKind::from_tag(tp);
        match MsgPackCodec::decode::<ErrorPayload>(payload) {
            Ok(p) => Self {
                kind,
                code: p.error_code,
                message: p.error_msg,
            },
            Err(_) => Self {
                kind,
                code: 0,
                message: "undecodable error payload".to_string(),
            },
        }
    }
}
