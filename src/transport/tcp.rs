//! TCP connector.

use tokio::net::TcpStream;

use super::{Connection, Connector};
use crate::error::Result;
use crate::events::BoxFuture;
use crate::pool::Endpoint;

/// Connects over plain TCP with `TCP_NODELAY` set.
#[derive(Debug, Clone, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for TcpConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Connection>> {
        Box::pin(async move {
            let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
            stream.set_nodelay(true)?;

            let peer = endpoint.to_string();
            let (reader, writer) = stream.into_split();
            Ok(Connection::new(reader, writer, peer))
        })
    }
}
