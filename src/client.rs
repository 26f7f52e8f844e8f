//! Client builder and connection manager.
//!
//! The [`ClientBuilder`] collects configuration, an optional
//! [`EventHandler`] and an optional [`Connector`]. The [`Client`] owns the
//! connection lifecycle:
//! 1. Connect to an endpoint (or run the reconnect loop over a pool)
//! 2. Spawn the writer task and the read loop for the new transport
//! 3. Authenticate and restore watches
//! 4. On transport loss fail every pending request and reconnect
//!
//! # Example
//!
//! ```no_run
//! use thingsdb_client::{Auth, Client, Pool};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder().default_scope("stuff").build();
//!
//!     let pool = Pool::parse(["node01.local", "node02.local:9201"])?;
//!     client.connect_pool(pool, Auth::credentials("admin", "pass")).await?;
//!
//!     let greeting: String = client.query_as("'Hello World!'").await?;
//!     println!("{}", greeting);
//!
//!     client.close();
//!     client.wait_closed().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::codec::MsgPackCodec;
use crate::config::{ClientConfig, Scope};
use crate::error::{ClientError, Result};
use crate::events::{EventDispatcher, EventHandler, NoopHandler, Routed};
use crate::multiplexer::{Multiplexer, ResponseFuture};
use crate::pool::{Endpoint, Pool};
use crate::protocol::{proto, PackageBuffer};
use crate::reconnect::ReconnectSchedule;
use crate::request::{auth_payload, query_payload, run_payload, watch_payload, Auth, QueryOptions};
use crate::transport::{BoxReader, Connection, Connector, TcpConnector};
use crate::watch::{WatchRegistry, Watcher};
use crate::writer::{spawn_writer_task, WriterHandle};

/// Size of the socket read buffer.
const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Connected, credentials not (yet) accepted.
    Authenticating,
    Ready,
    /// Transport lost, reconnect loop about to run.
    Reconnecting,
}

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    handler: Option<Arc<dyn EventHandler>>,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            handler: None,
            connector: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Scope for requests that do not name one.
    ///
    /// Default: `@thingsdb`
    pub fn default_scope(mut self, scope: &str) -> Self {
        self.config.default_scope = Scope::new(scope);
        self
    }

    /// Reconnect on transport loss and issue the default watch after
    /// authentication.
    ///
    /// Default: true
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Backoff between reconnect attempts; doubles from `initial` to `max`.
    ///
    /// Default: 1 second to 120 seconds
    pub fn reconnect_wait(mut self, initial: Duration, max: Duration) -> Self {
        self.config.initial_reconnect_wait = initial;
        self.config.max_reconnect_wait = max;
        self
    }

    /// Per-attempt connect timeout of the reconnect loop; grows by `step`
    /// from `initial` to `max`.
    ///
    /// Default: 2 seconds to 10 seconds, step 1 second
    pub fn reconnect_timeout(mut self, initial: Duration, max: Duration, step: Duration) -> Self {
        self.config.initial_connect_timeout = initial;
        self.config.max_connect_timeout = max;
        self.config.connect_timeout_step = step;
        self
    }

    /// Timeout for an explicit [`Client::connect`].
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Default: 5 seconds
    pub fn auth_timeout(mut self, timeout: Duration) -> Self {
        self.config.auth_timeout = timeout;
        self
    }

    /// How long a replaced transport stays open.
    ///
    /// Default: 10 seconds
    pub fn close_grace_period(mut self, period: Duration) -> Self {
        self.config.close_grace_period = period;
        self
    }

    /// Default: 200 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Capacity of the writer queue; requests beyond it fail with
    /// [`ClientError::Backpressure`].
    ///
    /// Default: 1024
    pub fn writer_capacity(mut self, capacity: usize) -> Self {
        self.config.writer_capacity = capacity;
        self
    }

    pub fn event_handler<H: EventHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Use a custom connector instead of plain TCP.
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Build the client. Nothing is connected yet.
    pub fn build(self) -> Client {
        let handler: Arc<dyn EventHandler> = match self.handler {
            Some(handler) => handler,
            None => Arc::new(NoopHandler),
        };
        let connector: Arc<dyn Connector> = match self.connector {
            Some(connector) => connector,
            None => Arc::new(TcpConnector::new()),
        };
        let mux = Multiplexer::new();
        let watches = Arc::new(Mutex::new(WatchRegistry::new()));
        let dispatcher = EventDispatcher::new(handler.clone(), watches.clone(), mux.clone());

        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (closed, _) = watch::channel(false);

        let shared = Shared {
            auto_reconnect: AtomicBool::new(self.config.auto_reconnect),
            conn: Mutex::new(ConnState {
                transport: None,
                pool: None,
                auth: None,
                scope: self.config.default_scope.clone(),
                closing: None,
            }),
            config: self.config,
            connector,
            handler,
            dispatcher,
            mux,
            watches,
            reconnecting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            state,
            closed,
        };

        Client {
            shared: Arc::new(shared),
        }
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The transport currently carrying requests.
struct ActiveTransport {
    generation: u64,
    writer: WriterHandle,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<Result<()>>,
    peer: String,
}

impl ActiveTransport {
    /// Stop reading and let the writer flush and shut the socket down.
    fn shutdown(self) -> JoinHandle<Result<()>> {
        self.reader_task.abort();
        drop(self.writer);
        self.writer_task
    }
}

struct ConnState {
    transport: Option<ActiveTransport>,
    pool: Option<Pool>,
    auth: Option<Auth>,
    scope: Scope,
    /// Writer task of the transport closed by `close()`.
    closing: Option<JoinHandle<Result<()>>>,
}

struct Shared {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn EventHandler>,
    dispatcher: EventDispatcher,
    mux: Multiplexer,
    watches: Arc<Mutex<WatchRegistry>>,
    conn: Mutex<ConnState>,
    auto_reconnect: AtomicBool,
    /// Set while a reconnect loop runs; later requests coalesce into it.
    reconnecting: AtomicBool,
    /// Bumped for every installed transport.
    generation: AtomicU64,
    state: watch::Sender<ConnectionState>,
    closed: watch::Sender<bool>,
}

impl Shared {
    fn lock_conn(&self) -> MutexGuard<'_, ConnState> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_watches(&self) -> MutexGuard<'_, WatchRegistry> {
        self.watches.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(ClientError::Closed)
        } else {
            Ok(())
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!("connection state {:?} -> {:?}", previous, state);
        }
    }

    fn has_transport(&self) -> bool {
        self.lock_conn().transport.is_some()
    }

    fn current_scope(&self) -> Scope {
        self.lock_conn().scope.clone()
    }

    /// Queue a request on the active transport.
    ///
    /// The connection lock is held while queueing, so the request is
    /// registered against the transport that carries it.
    fn request(&self, tp: u8, payload: Vec<u8>, timeout: Option<Duration>) -> Result<ResponseFuture> {
        self.ensure_open()?;
        let conn = self.lock_conn();
        let transport = conn.transport.as_ref().ok_or(ClientError::NoConnection)?;
        self.mux
            .send(&transport.writer, tp, Bytes::from(payload), timeout)
    }

    /// Make `connection` the active transport.
    ///
    /// Requests in flight on the previous transport fail with
    /// [`ClientError::ConnectionLost`]; the previous transport itself is
    /// closed after the grace period.
    fn install(self: &Arc<Self>, connection: Connection) -> u64 {
        let Connection {
            reader,
            writer,
            peer,
        } = connection;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let old = {
            let mut conn = self.lock_conn();
            let (writer, writer_task) = spawn_writer_task(writer, self.config.writer_capacity);
            let reader_task = tokio::spawn(read_loop(self.clone(), generation, reader));

            let old = conn.transport.replace(ActiveTransport {
                generation,
                writer,
                reader_task,
                writer_task,
                peer,
            });
            if old.is_some() {
                self.mux.fail_all(|| ClientError::ConnectionLost);
            }
            old
        };

        if let Some(old) = old {
            let grace = self.config.close_grace_period;
            tracing::debug!("closing replaced connection to {} in {:?}", old.peer, grace);
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                let _ = old.shutdown();
            });
        }
        generation
    }

    /// Drop the active transport if it is still `generation`.
    fn take_transport(&self, generation: u64) -> Option<ActiveTransport> {
        let mut conn = self.lock_conn();
        if conn
            .transport
            .as_ref()
            .is_some_and(|t| t.generation == generation)
        {
            let transport = conn.transport.take();
            self.mux.fail_all(|| ClientError::ConnectionLost);
            transport
        } else {
            None
        }
    }

    /// Called by the read loop of `generation` when its stream ends.
    fn on_transport_lost(self: &Arc<Self>, generation: u64) {
        let transport = match self.take_transport(generation) {
            Some(transport) => transport,
            // A newer transport already replaced this one.
            None => return,
        };
        tracing::warn!("connection to {} lost", transport.peer);
        drop(transport.writer);

        if self.auto_reconnect.load(Ordering::Acquire) && !self.is_closed() {
            self.spawn_reconnect();
        } else {
            self.set_state(ConnectionState::Disconnected);
        }
    }

    /// Start the reconnect loop unless one is running already.
    fn spawn_reconnect(self: &Arc<Self>) {
        if self.is_closed() || self.reconnecting.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_state(ConnectionState::Reconnecting);
        let shared = self.clone();
        tokio::spawn(async move {
            shared.reconnect_loop().await;
        });
    }

    async fn reconnect_loop(self: Arc<Self>) {
        loop {
            self.reconnect_until_ready().await;
            self.reconnecting.store(false, Ordering::Release);

            // A loss after success was coalesced into this run; pick it up.
            let retry = !self.is_closed()
                && self.auto_reconnect.load(Ordering::Acquire)
                && !self.has_transport();
            if !retry || self.reconnecting.swap(true, Ordering::AcqRel) {
                return;
            }
        }
    }

    /// Try endpoints from the pool until one connects and authenticates, or
    /// the client is closed.
    async fn reconnect_until_ready(self: &Arc<Self>) {
        let mut schedule = ReconnectSchedule::new(&self.config);

        loop {
            if self.is_closed() {
                return;
            }
            let endpoint = self.lock_conn().pool.as_mut().map(Pool::next_endpoint);
            let endpoint = match endpoint {
                Some(endpoint) => endpoint,
                None => {
                    tracing::warn!("cannot reconnect without an endpoint pool");
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            };

            self.set_state(ConnectionState::Connecting);
            let timeout = schedule.connect_timeout();
            tracing::debug!("connecting to {} (timeout {:?})", endpoint, timeout);

            let attempt = tokio::select! {
                _ = closed_signal(self.closed.subscribe()) => return,
                attempt = tokio::time::timeout(timeout, self.connector.connect(&endpoint)) => attempt,
            };

            match attempt {
                Ok(Ok(connection)) => {
                    let generation = self.install(connection);
                    if self.finish_handshake(&endpoint, generation).await {
                        tokio::spawn(self.handler.clone().on_reconnect());
                        return;
                    }
                }
                Ok(Err(e)) => tracing::warn!("connecting to {} failed: {}", endpoint, e),
                Err(_) => tracing::warn!("connecting to {} timed out after {:?}", endpoint, timeout),
            }

            let wait = schedule.wait();
            tracing::debug!(
                "next connect attempt in {:?} after {} failed cycles",
                wait,
                schedule.failures() + 1
            );
            tokio::select! {
                _ = closed_signal(self.closed.subscribe()) => return,
                _ = tokio::time::sleep(wait) => {}
            }
            schedule.advance();
        }
    }

    /// Authenticate and restore watches on a fresh transport.
    ///
    /// On failure the transport is dropped and `false` returned.
    async fn finish_handshake(self: &Arc<Self>, endpoint: &Endpoint, generation: u64) -> bool {
        self.set_state(ConnectionState::Authenticating);

        if let Err(e) = self.replay_auth().await {
            tracing::warn!("authentication with {} failed: {}", endpoint, e);
            if let Some(transport) = self.take_transport(generation) {
                let _ = transport.shutdown();
            }
            return false;
        }

        self.resubscribe().await;
        if !self.publish_ready(generation) {
            tracing::debug!("connection to {} closed or replaced during handshake", endpoint);
            return false;
        }
        tracing::info!("connected to {}", endpoint);
        true
    }

    /// Set `Ready` if the client is open and `generation` is still the
    /// active transport.
    ///
    /// Checked under the connection lock so a concurrent `close()` or
    /// transport loss always wins over the handshake.
    fn publish_ready(&self, generation: u64) -> bool {
        let conn = self.lock_conn();
        let current = !self.is_closed()
            && conn
                .transport
                .as_ref()
                .is_some_and(|t| t.generation == generation);
        if current {
            self.set_state(ConnectionState::Ready);
        }
        current
    }

    fn active_generation(&self) -> Option<u64> {
        self.lock_conn().transport.as_ref().map(|t| t.generation)
    }

    async fn replay_auth(&self) -> Result<()> {
        let auth = self.lock_conn().auth.clone();
        match auth {
            Some(auth) => {
                let payload = auth_payload(&auth)?;
                self.request(proto::REQ_AUTH, payload, Some(self.config.auth_timeout))?
                    .await?;
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// One watch request per scope with every live watched id in it; the
    /// default watch if nothing is watched.
    async fn resubscribe(&self) {
        let groups = self.lock_watches().rebuild_subscriptions();

        if groups.is_empty() {
            if self.auto_reconnect.load(Ordering::Acquire) {
                if let Err(e) = self.default_watch().await {
                    tracing::warn!("default watch failed: {}", e);
                }
            }
            return;
        }

        let mut requests = Vec::with_capacity(groups.len());
        for (scope, ids) in groups {
            let sent = watch_payload(&scope, &ids)
                .and_then(|payload| self.request(proto::REQ_WATCH, payload, None));
            match sent {
                Ok(response) => requests.push((scope, response)),
                Err(e) => tracing::warn!("re-watching {} things in {} failed: {}", ids.len(), scope, e),
            }
        }
        for (scope, response) in requests {
            if let Err(e) = response.await {
                tracing::warn!("re-watching things in {} failed: {}", scope, e);
            }
        }
    }

    async fn default_watch(&self) -> Result<()> {
        let scope = self.current_scope();
        self.request(proto::REQ_WATCH, watch_payload(&scope, &[])?, None)?
            .await?;
        Ok(())
    }

    fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        self.auto_reconnect.store(false, Ordering::Release);

        {
            let mut conn = self.lock_conn();
            let transport = conn.transport.take();
            self.mux.fail_all(|| ClientError::Closed);
            if let Some(transport) = transport {
                tracing::debug!("closing connection to {}", transport.peer);
                conn.closing = Some(transport.shutdown());
            }
        }
        self.set_state(ConnectionState::Disconnected);
    }
}

/// Resolves once the client is closed.
async fn closed_signal(mut closed: watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

/// Read packages from one transport until it ends.
async fn read_loop(shared: Arc<Shared>, generation: u64, mut reader: BoxReader) {
    let mut buffer = PackageBuffer::with_max_payload(shared.config.max_payload_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("connection closed by peer");
                break;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("read error: {}", e);
                break;
            }
        };

        let packages = match buffer.push(&buf[..n]) {
            Ok(packages) => packages,
            Err(e) => {
                tracing::error!("dropping connection: {}", e);
                break;
            }
        };

        for package in packages {
            if shared.generation.load(Ordering::Acquire) != generation {
                tracing::debug!("dropping package id {} from replaced connection", package.id());
                continue;
            }
            if shared.dispatcher.dispatch(package) == Routed::Reconnect {
                tracing::info!("node is shutting down, reconnecting");
                shared.spawn_reconnect();
            }
        }
    }

    shared.on_transport_lost(generation);
}

/// A connection to a ThingsDB node, or a pool of them.
///
/// Dropping the client closes it.
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// A client with the default configuration.
    pub fn new() -> Self {
        ClientBuilder::new().build()
    }

    /// Connect to a single endpoint without authenticating.
    ///
    /// The endpoint also becomes the pool used for reconnecting.
    pub async fn connect(&self, endpoint: Endpoint) -> Result<()> {
        let shared = &self.shared;
        shared.ensure_open()?;
        shared.lock_conn().pool = Some(Pool::from(endpoint.clone()));
        shared.set_state(ConnectionState::Connecting);

        let timeout = shared.config.connect_timeout;
        let connection = match tokio::time::timeout(timeout, shared.connector.connect(&endpoint)).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
            Err(_) => {
                shared.set_state(ConnectionState::Disconnected);
                return Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connecting to {} timed out", endpoint),
                )));
            }
        };

        shared.install(connection);
        shared.set_state(ConnectionState::Authenticating);
        tracing::debug!("connected to {}", endpoint);
        Ok(())
    }

    /// Connect to the first reachable endpoint of `pool` and authenticate.
    ///
    /// Retries with backoff until it succeeds or the client is closed.
    pub async fn connect_pool(&self, pool: Pool, auth: Auth) -> Result<()> {
        self.shared.ensure_open()?;
        {
            let mut conn = self.shared.lock_conn();
            conn.pool = Some(pool);
            conn.auth = Some(auth);
        }
        self.shared.spawn_reconnect();
        self.wait_ready().await
    }

    /// Authenticate the current connection.
    ///
    /// The credentials are kept and replayed after every reconnect. With
    /// auto-reconnect enabled the default watch is issued as well.
    pub async fn authenticate(&self, auth: Auth) -> Result<()> {
        let payload = auth_payload(&auth)?;
        self.shared.lock_conn().auth = Some(auth);
        let generation = self.shared.active_generation();

        self.shared
            .request(proto::REQ_AUTH, payload, Some(self.shared.config.auth_timeout))?
            .await?;
        if !generation.is_some_and(|g| self.shared.publish_ready(g)) {
            self.shared.ensure_open()?;
            return Err(ClientError::ConnectionLost);
        }

        if self.shared.auto_reconnect.load(Ordering::Acquire) {
            self.shared.default_watch().await?;
        }
        Ok(())
    }

    /// Run code in the current scope.
    pub async fn query(&self, code: &str) -> Result<Value> {
        self.query_with(code, QueryOptions::default()).await
    }

    /// Run code in the current scope and decode the result into `T`.
    pub async fn query_as<T: DeserializeOwned>(&self, code: &str) -> Result<T> {
        self.query_with(code, QueryOptions::default()).await
    }

    /// Run code with an explicit scope, blobs or timeout.
    pub async fn query_with<T: DeserializeOwned>(&self, code: &str, options: QueryOptions) -> Result<T> {
        let scope = options
            .scope
            .unwrap_or_else(|| self.shared.current_scope());
        let payload = query_payload(&scope, code, &options.blobs)?;
        let response = self
            .shared
            .request(proto::REQ_QUERY, payload, options.timeout)?
            .await?;
        MsgPackCodec::decode(&response)
    }

    /// Run a stored procedure in the current scope.
    pub async fn run<A: Serialize>(&self, procedure: &str, args: &[A]) -> Result<Value> {
        let scope = self.shared.current_scope();
        self.run_in(&scope, procedure, args).await
    }

    /// Run a stored procedure in `scope` and decode the result into `T`.
    pub async fn run_with<T, A>(&self, scope: &str, procedure: &str, args: &[A]) -> Result<T>
    where
        T: DeserializeOwned,
        A: Serialize,
    {
        self.run_in(&Scope::new(scope), procedure, args).await
    }

    async fn run_in<T, A>(&self, scope: &Scope, procedure: &str, args: &[A]) -> Result<T>
    where
        T: DeserializeOwned,
        A: Serialize,
    {
        let payload = run_payload(scope, procedure, args)?;
        let response = self
            .shared
            .request(proto::REQ_RUN, payload, None)?
            .await?;
        MsgPackCodec::decode(&response)
    }

    /// Subscribe to changes of `ids`. `None` uses the current scope.
    ///
    /// Prefer [`Client::watch_entity`]: plain watches are not restored after
    /// a reconnect.
    pub async fn watch(&self, scope: Option<&str>, ids: &[u64]) -> Result<()> {
        self.watch_request(proto::REQ_WATCH, scope, ids).await
    }

    /// Unsubscribe from `ids`. `None` uses the current scope.
    pub async fn unwatch(&self, scope: Option<&str>, ids: &[u64]) -> Result<()> {
        self.watch_request(proto::REQ_UNWATCH, scope, ids).await
    }

    async fn watch_request(&self, tp: u8, scope: Option<&str>, ids: &[u64]) -> Result<()> {
        let scope = match scope {
            Some(scope) => Scope::new(scope),
            None => self.shared.current_scope(),
        };
        self.shared
            .request(tp, watch_payload(&scope, ids)?, None)?
            .await?;
        Ok(())
    }

    /// Track `entity` and subscribe to its changes.
    ///
    /// Only a weak reference is kept: once the application drops the entity
    /// its events are ignored and it is not re-watched after a reconnect.
    pub async fn watch_entity<W: Watcher>(&self, entity: &Arc<W>) -> Result<()> {
        let scope = entity.scope();
        let id = entity.id();
        let tracked: Arc<dyn Watcher> = entity.clone();
        self.shared.lock_watches().register(&tracked);

        self.shared
            .request(proto::REQ_WATCH, watch_payload(&scope, &[id])?, None)?
            .await?;
        Ok(())
    }

    /// Stop tracking `entity` and unsubscribe from its changes.
    pub async fn unwatch_entity<W: Watcher>(&self, entity: &Arc<W>) -> Result<()> {
        let scope = entity.scope();
        let id = entity.id();
        self.shared.lock_watches().remove(id);

        self.shared
            .request(proto::REQ_UNWATCH, watch_payload(&scope, &[id])?, None)?
            .await?;
        Ok(())
    }

    pub async fn ping(&self, timeout: Duration) -> Result<()> {
        self.shared
            .request(proto::REQ_PING, Vec::new(), Some(timeout))?
            .await?;
        Ok(())
    }

    /// Change the current scope. `"name"` and `":name"` both mean `"@:name"`.
    pub fn use_scope(&self, scope: &str) {
        self.shared.lock_conn().scope = Scope::new(scope);
    }

    pub fn scope(&self) -> Scope {
        self.shared.current_scope()
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.has_transport()
    }

    /// `host:port` of the active connection, or `"disconnected"`.
    pub fn connection_info(&self) -> String {
        match &self.shared.lock_conn().transport {
            Some(transport) => transport.peer.clone(),
            None => "disconnected".to_string(),
        }
    }

    /// Number of live watched entities.
    pub fn num_watched(&self) -> usize {
        self.shared.lock_watches().len()
    }

    /// Number of requests waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.shared.mux.pending_count()
    }

    /// Replace the connection with one to the next endpoint of the pool.
    ///
    /// Joins a reconnect that is already running.
    pub async fn reconnect(&self) -> Result<()> {
        self.shared.ensure_open()?;
        if self.shared.lock_conn().pool.is_none() {
            return Err(ClientError::NoConnection);
        }
        self.shared.spawn_reconnect();
        self.wait_ready().await
    }

    async fn wait_ready(&self) -> Result<()> {
        let mut state = self.shared.state.subscribe();
        tokio::select! {
            ready = reached(&mut state, ConnectionState::Ready) => {
                if ready { Ok(()) } else { Err(ClientError::Closed) }
            }
            _ = closed_signal(self.shared.closed.subscribe()) => Err(ClientError::Closed),
        }
    }

    /// Close the connection and stop reconnecting.
    ///
    /// Pending requests fail with [`ClientError::Closed`]. A closed client
    /// cannot be reconnected.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Wait until the client is closed and its socket shut down.
    pub async fn wait_closed(&self) {
        closed_signal(self.shared.closed.subscribe()).await;
        let writer_task = self.shared.lock_conn().closing.take();
        if let Some(writer_task) = writer_task {
            let _ = writer_task.await;
        }
    }
}

async fn reached(state: &mut watch::Receiver<ConnectionState>, target: ConnectionState) -> bool {
    state.wait_for(|state| *state == target).await.is_ok()
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shared.close();
    }
}
