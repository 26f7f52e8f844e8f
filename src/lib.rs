//! # thingsdb-client
//!
//! Async client core for the ThingsDB binary protocol.
//!
//! One [`Client`] keeps a single connection to a node from a [`Pool`] of
//! endpoints. Requests are multiplexed over that connection by 16-bit
//! correlation id; push packages (node status, warnings, watch events) are
//! routed to an [`EventHandler`] and to registered [`Watcher`]s.
//!
//! ## Architecture
//!
//! - **Framing** ([`protocol`]): 8-byte header plus MessagePack payload
//! - **Multiplexer**: pending request table with per-request timeouts
//! - **Connection manager** ([`Client`]): reconnect loop with backoff,
//!   authentication replay and watch restoration
//! - **Events**: push dispatch that never blocks request processing
//!
//! ## Example
//!
//! ```no_run
//! use thingsdb_client::{Auth, Client, Endpoint, QueryOptions};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new();
//!     client.connect(Endpoint::new("localhost", 9200)).await?;
//!     client.authenticate(Auth::token("my-secret-token")).await?;
//!
//!     let options = QueryOptions::new()
//!         .scope("stuff")
//!         .timeout(Duration::from_secs(2));
//!     let n: i64 = client.query_with(".greetings.len()", options).await?;
//!     println!("{} greetings", n);
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;
pub mod watch;

mod client;
mod multiplexer;
mod pool;
mod reconnect;
mod request;
mod writer;

pub use client::{Client, ClientBuilder, ConnectionState};
pub use config::{ClientConfig, Scope};
pub use error::{ClientError, ErrorKind, Result, ServerError};
pub use events::{BoxFuture, EventHandler, NodeStatus, Warning};
pub use multiplexer::ResponseFuture;
pub use pool::{Endpoint, Pool, DEFAULT_PORT};
pub use request::{Auth, QueryOptions};
pub use transport::{Connection, Connector, TcpConnector};
pub use watch::Watcher;
