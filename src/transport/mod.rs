//! Transport module - how the client reaches a server.
//!
//! The client never opens sockets itself; it asks a [`Connector`] for a
//! [`Connection`] to an endpoint. [`TcpConnector`] is the default. Tests
//! plug in connectors backed by in-memory pipes.

mod tcp;

pub use tcp::TcpConnector;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Result;
use crate::events::BoxFuture;
use crate::pool::Endpoint;

/// Read half of a connection.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

/// Write half of a connection.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// An established byte stream, already split into halves.
pub struct Connection {
    pub reader: BoxReader,
    pub writer: BoxWriter,
    /// Printable peer address, reported by `Client::connection_info`.
    pub peer: String,
}

impl Connection {
    pub fn new<R, W>(reader: R, writer: W, peer: impl Into<String>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
            peer: peer.into(),
        }
    }
}

/// Opens connections to endpoints.
///
/// The caller bounds every attempt with its own timeout.
pub trait Connector: Send + Sync + 'static {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Connection>>;
}
