//! Client tests against an in-memory fake server.
//!
//! The fake connector hands out `tokio::io::duplex` pipes; the test drives
//! the server end package by package.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

use thingsdb_client::codec::MsgPackCodec;
use thingsdb_client::error::ErrorKind;
use thingsdb_client::protocol::{build_package, proto, Package, PackageBuffer};
use thingsdb_client::{
    Auth, BoxFuture, Client, ClientError, Connection, ConnectionState, Connector, Endpoint,
    EventHandler, NodeStatus, Pool, QueryOptions, Scope, Watcher,
};

// ============================================================================
// Fake server
// ============================================================================

struct ServerConn {
    host: String,
    reader: ReadHalf<DuplexStream>,
    writer: WriteHalf<DuplexStream>,
    buffer: PackageBuffer,
    queued: Vec<Package>,
}

impl ServerConn {
    /// Next package from the client, `None` once the client hung up.
    async fn next(&mut self) -> Option<Package> {
        let mut buf = [0u8; 4096];
        while self.queued.is_empty() {
            let n = self.reader.read(&mut buf).await.ok()?;
            if n == 0 {
                return None;
            }
            self.queued = self.buffer.push(&buf[..n]).unwrap();
        }
        Some(self.queued.remove(0))
    }

    async fn expect(&mut self, tp: u8) -> Package {
        let package = self.next().await.expect("client hung up");
        assert_eq!(package.tp(), tp, "unexpected package type");
        package
    }

    async fn send<T: Serialize + ?Sized>(&mut self, tp: u8, id: u16, value: &T) {
        let payload = MsgPackCodec::encode(value).unwrap();
        self.writer
            .write_all(&build_package(tp, id, &payload))
            .await
            .unwrap();
    }

    /// Answer the next request, which must be of type `tp`, with `value`.
    async fn answer<T: Serialize + ?Sized>(&mut self, tp: u8, value: &T) -> Package {
        let package = self.expect(tp).await;
        self.send(response_type(tp), package.id(), value).await;
        package
    }

    /// Accept authentication and the default watch that follows it.
    async fn handshake(&mut self) {
        self.answer(proto::REQ_AUTH, &()).await;
        let watch = self.answer(proto::REQ_WATCH, &()).await;
        assert_eq!(decode(&watch), json!(["@thingsdb"]));
    }

    async fn push<T: Serialize + ?Sized>(&mut self, tp: u8, value: &T) {
        self.send(tp, 0, value).await;
    }
}

fn response_type(tp: u8) -> u8 {
    match tp {
        proto::REQ_PING => proto::RES_PING,
        proto::REQ_AUTH => proto::RES_AUTH,
        proto::REQ_QUERY => proto::RES_QUERY,
        proto::REQ_RUN => proto::RES_RUN,
        proto::REQ_WATCH => proto::RES_WATCH,
        proto::REQ_UNWATCH => proto::RES_UNWATCH,
        other => panic!("not a request type: {}", other),
    }
}

fn decode(package: &Package) -> Value {
    MsgPackCodec::decode(package.payload()).unwrap()
}

#[derive(Clone)]
struct FakeConnector {
    reachable: Arc<HashSet<String>>,
    attempts: Arc<Mutex<Vec<String>>>,
    servers: mpsc::UnboundedSender<ServerConn>,
}

impl FakeConnector {
    fn new(reachable: &[&str]) -> (Self, mpsc::UnboundedReceiver<ServerConn>) {
        let (servers, rx) = mpsc::unbounded_channel();
        let connector = Self {
            reachable: Arc::new(reachable.iter().map(|h| h.to_string()).collect()),
            attempts: Arc::new(Mutex::new(Vec::new())),
            servers,
        };
        (connector, rx)
    }

    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Connector for FakeConnector {
    fn connect<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, thingsdb_client::Result<Connection>> {
        Box::pin(async move {
            self.attempts.lock().unwrap().push(endpoint.host.clone());
            if !self.reachable.contains(&endpoint.host) {
                return Err(ClientError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )));
            }

            let (client_side, server_side) = tokio::io::duplex(64 * 1024);
            let (reader, writer) = tokio::io::split(server_side);
            let _ = self.servers.send(ServerConn {
                host: endpoint.host.clone(),
                reader,
                writer,
                buffer: PackageBuffer::new(),
                queued: Vec::new(),
            });

            let (reader, writer) = tokio::io::split(client_side);
            Ok(Connection::new(reader, writer, endpoint.to_string()))
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

#[derive(Debug, PartialEq)]
enum Event {
    Reconnect,
    Status(NodeStatus),
    Init(u64, Map<String, Value>),
    Update(u64, Vec<Value>),
    Delete(u64),
}

struct Recorder {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventHandler for Recorder {
    fn on_reconnect(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = self.tx.send(Event::Reconnect);
        })
    }

    fn on_node_status(self: Arc<Self>, status: NodeStatus) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = self.tx.send(Event::Status(status));
        })
    }
}

struct Thing {
    id: u64,
    scope: &'static str,
    tx: mpsc::UnboundedSender<Event>,
}

impl Watcher for Thing {
    fn id(&self) -> u64 {
        self.id
    }

    fn scope(&self) -> Scope {
        Scope::new(self.scope)
    }

    fn on_init(self: Arc<Self>, _event_id: u64, thing: Map<String, Value>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = self.tx.send(Event::Init(self.id, thing));
        })
    }

    fn on_update(self: Arc<Self>, _event_id: u64, jobs: Vec<Value>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = self.tx.send(Event::Update(self.id, jobs));
        })
    }

    fn on_delete(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            let _ = self.tx.send(Event::Delete(self.id));
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

struct Setup {
    client: Arc<Client>,
    connector: FakeConnector,
    servers: mpsc::UnboundedReceiver<ServerConn>,
    events: mpsc::UnboundedReceiver<Event>,
    events_tx: mpsc::UnboundedSender<Event>,
}

fn setup(reachable: &[&str]) -> Setup {
    let (connector, servers) = FakeConnector::new(reachable);
    let (events_tx, events) = mpsc::unbounded_channel();
    let client = Client::builder()
        .connector(connector.clone())
        .event_handler(Recorder {
            tx: events_tx.clone(),
        })
        .build();

    Setup {
        client: Arc::new(client),
        connector,
        servers,
        events,
        events_tx,
    }
}

impl Setup {
    /// `connect_pool` over `hosts`, with the first server doing the handshake.
    async fn connect_pool(&mut self, hosts: &[&str]) -> ServerConn {
        let pool = Pool::parse(hosts).unwrap();
        let client = self.client.clone();
        let connect = tokio::spawn(async move {
            client
                .connect_pool(pool, Auth::credentials("admin", "pass"))
                .await
        });

        let mut server = self.servers.recv().await.unwrap();
        let auth = server.answer(proto::REQ_AUTH, &()).await;
        assert_eq!(decode(&auth), json!(["admin", "pass"]));
        let watch = server.answer(proto::REQ_WATCH, &()).await;
        assert_eq!(decode(&watch), json!(["@thingsdb"]));

        connect.await.unwrap().unwrap();
        assert_eq!(self.client.state(), ConnectionState::Ready);
        assert_eq!(self.next_event().await, Event::Reconnect);
        server
    }

    fn thing(&self, id: u64, scope: &'static str) -> Arc<Thing> {
        Arc::new(Thing {
            id,
            scope,
            tx: self.events_tx.clone(),
        })
    }

    async fn next_event(&mut self) -> Event {
        tokio::time::timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("no event")
            .unwrap()
    }

    async fn no_event(&mut self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(self.events.try_recv().is_err());
    }
}

async fn wait_for_state(client: &Client, state: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while client.state() != state {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("state not reached");
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_authenticate_query() {
    let mut s = setup(&["node01"]);
    s.client
        .connect("node01:9200".parse().unwrap())
        .await
        .unwrap();
    let mut server = s.servers.recv().await.unwrap();

    assert_eq!(s.client.state(), ConnectionState::Authenticating);
    assert_eq!(s.client.connection_info(), "node01:9200");

    let (result, ()) = tokio::join!(s.client.authenticate(Auth::token("secret")), server.handshake());
    result.unwrap();
    assert_eq!(s.client.state(), ConnectionState::Ready);

    let (result, request) = tokio::join!(
        s.client.query_as::<i64>("1 + 1"),
        server.answer(proto::REQ_QUERY, &2)
    );
    assert_eq!(result.unwrap(), 2);
    assert_eq!(decode(&request), json!(["@thingsdb", "1 + 1"]));
    assert_eq!(request.id(), 3);
    assert_eq!(s.client.pending_requests(), 0);
}

#[tokio::test]
async fn test_query_scope_and_blobs() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;
    s.client.use_scope("stuff");

    let (result, request) = tokio::join!(
        s.client.query("'hi'"),
        server.answer(proto::REQ_QUERY, "hi")
    );
    assert_eq!(result.unwrap(), json!("hi"));
    assert_eq!(decode(&request), json!(["@:stuff", "'hi'"]));

    let options = QueryOptions::new().scope("@node").blob(b"raw".to_vec());
    let (result, request) = tokio::join!(
        s.client.query_with::<Value>("blob(0)", options),
        server.answer(proto::REQ_QUERY, &())
    );
    assert_eq!(result.unwrap(), Value::Null);
    let (scope, code, blob): (String, String, serde_bytes::ByteBuf) =
        MsgPackCodec::decode(request.payload()).unwrap();
    assert_eq!((scope.as_str(), code.as_str()), ("@node", "blob(0)"));
    assert_eq!(blob.into_vec(), b"raw".to_vec());
}

#[tokio::test]
async fn test_run_procedure() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let args = [json!(1), json!(2)];
    let (result, request) = tokio::join!(
        s.client.run("add", &args),
        server.answer(proto::REQ_RUN, &3)
    );
    assert_eq!(result.unwrap(), json!(3));
    assert_eq!(decode(&request), json!(["@thingsdb", "add", 1, 2]));

    let (result, request) = tokio::join!(
        s.client.run_with::<i64, _>("stuff", "count", &[] as &[Value]),
        server.answer(proto::REQ_RUN, &0)
    );
    assert_eq!(result.unwrap(), 0);
    assert_eq!(decode(&request), json!(["@:stuff", "count"]));
}

#[tokio::test]
async fn test_server_error_is_surfaced() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let request = async {
        let package = server.expect(proto::REQ_QUERY).await;
        server
            .send(
                proto::ERR_ZERO_DIV,
                package.id(),
                &json!({"error_code": -58, "error_msg": "division or modulo by zero"}),
            )
            .await;
    };
    let (result, ()) = tokio::join!(s.client.query("1 / 0"), request);

    match result {
        Err(ClientError::Server(err)) => {
            assert_eq!(err.kind, ErrorKind::ZeroDivision);
            assert_eq!(err.code, -58);
            assert_eq!(err.message, "division or modulo by zero");
        }
        other => panic!("expected server error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_query_timeout_drops_late_response() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let started = tokio::time::Instant::now();
    let options = QueryOptions::new().timeout(Duration::from_secs(2));
    let (result, request) = tokio::join!(
        s.client.query_with::<Value>("wait()", options),
        server.expect(proto::REQ_QUERY)
    );

    assert!(matches!(result, Err(ClientError::Timeout(id)) if id == request.id()));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2100));
    assert_eq!(s.client.pending_requests(), 0);

    // The late answer must not reach the next request.
    let next = async {
        let package = server.expect(proto::REQ_QUERY).await;
        assert_ne!(package.id(), request.id());
        server.send(proto::RES_QUERY, request.id(), "late").await;
        server.send(proto::RES_QUERY, package.id(), "fresh").await;
    };
    let (result, ()) = tokio::join!(s.client.query_as::<String>("now()"), next);
    assert_eq!(result.unwrap(), "fresh");
}

#[tokio::test]
async fn test_ping() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let request = async {
        let package = server.expect(proto::REQ_PING).await;
        assert!(package.payload().is_empty());
        server
            .writer
            .write_all(&build_package(proto::RES_PING, package.id(), &[]))
            .await
            .unwrap();
    };
    let (result, ()) = tokio::join!(s.client.ping(Duration::from_secs(1)), request);
    result.unwrap();
}

#[tokio::test]
async fn test_transport_loss_fails_pending_and_rewatches() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let a = s.thing(1, "stuff");
    let b = s.thing(2, "@:stuff");
    let c = s.thing(3, "other");
    let gone = s.thing(4, "gone");
    for thing in [&a, &b, &c, &gone] {
        let (result, request) = tokio::join!(
            s.client.watch_entity(thing),
            server.answer(proto::REQ_WATCH, &())
        );
        result.unwrap();
        assert_eq!(decode(&request)[1], json!(thing.id));
    }
    drop(gone);
    assert_eq!(s.client.num_watched(), 3);

    let mut pending = Vec::new();
    for i in 0..3 {
        let client = s.client.clone();
        pending.push(tokio::spawn(async move {
            client.query(&format!("wait({})", i)).await
        }));
    }
    for _ in 0..3 {
        server.expect(proto::REQ_QUERY).await;
    }
    assert_eq!(s.client.pending_requests(), 3);

    drop(server);
    for task in pending {
        assert!(matches!(task.await.unwrap(), Err(ClientError::ConnectionLost)));
    }
    assert_eq!(s.client.pending_requests(), 0);

    let mut server = s.servers.recv().await.unwrap();
    server.answer(proto::REQ_AUTH, &()).await;
    let first = server.answer(proto::REQ_WATCH, &()).await;
    let second = server.answer(proto::REQ_WATCH, &()).await;
    assert_eq!(decode(&first), json!(["@:other", 3]));
    assert_eq!(decode(&second), json!(["@:stuff", 1, 2]));

    assert_eq!(s.next_event().await, Event::Reconnect);
    wait_for_state(&s.client, ConnectionState::Ready).await;
}

#[tokio::test(start_paused = true)]
async fn test_pool_round_robin_while_unreachable() {
    let s = setup(&[]);
    let client = s.client.clone();
    let pool = Pool::parse(["a", "b"]).unwrap();
    let connect = tokio::spawn(async move { client.connect_pool(pool, Auth::token("t")).await });

    // Attempts at 0 s (a), 1 s (b) and 3 s (a); the next one is due at 7 s.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(s.connector.attempts(), vec!["a", "b", "a"]);

    s.client.close();
    assert!(matches!(connect.await.unwrap(), Err(ClientError::Closed)));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(s.connector.attempts().len(), 3);
}

#[tokio::test]
async fn test_watch_events_reach_live_entities() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let thing = s.thing(42, "stuff");
    let (result, _) = tokio::join!(
        s.client.watch_entity(&thing),
        server.answer(proto::REQ_WATCH, &())
    );
    result.unwrap();

    server
        .push(proto::ON_WATCH_INI, &json!({"event": 1, "thing": {"#": 42, "name": "iris"}}))
        .await;
    let mut expected = Map::new();
    expected.insert("name".to_string(), json!("iris"));
    assert_eq!(s.next_event().await, Event::Init(42, expected));

    server
        .push(proto::ON_WATCH_UPD, &json!({"event": 2, "#": 42, "jobs": [{"set": {"age": 6}}]}))
        .await;
    assert_eq!(
        s.next_event().await,
        Event::Update(42, vec![json!({"set": {"age": 6}})])
    );

    // Unknown id: nothing happens, the connection stays healthy.
    server.push(proto::ON_WATCH_DEL, &json!({"#": 99})).await;
    s.no_event().await;
    let (result, _) = tokio::join!(
        s.client.query_as::<bool>("true"),
        server.answer(proto::REQ_QUERY, &true)
    );
    assert!(result.unwrap());

    server.push(proto::ON_WATCH_DEL, &json!({"#": 42})).await;
    assert_eq!(s.next_event().await, Event::Delete(42));
    assert_eq!(s.client.num_watched(), 0);
}

#[tokio::test]
async fn test_unwatch_entity() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let thing = s.thing(7, "stuff");
    let (result, _) = tokio::join!(
        s.client.watch_entity(&thing),
        server.answer(proto::REQ_WATCH, &())
    );
    result.unwrap();
    assert_eq!(s.client.num_watched(), 1);

    let (result, request) = tokio::join!(
        s.client.unwatch_entity(&thing),
        server.answer(proto::REQ_UNWATCH, &())
    );
    result.unwrap();
    assert_eq!(decode(&request), json!(["@:stuff", 7]));
    assert_eq!(s.client.num_watched(), 0);
}

#[tokio::test]
async fn test_shutting_down_node_triggers_reconnect() {
    let mut s = setup(&["a", "b"]);
    let mut first = s.connect_pool(&["a", "b"]).await;
    assert_eq!(first.host, "a");

    first.push(proto::ON_NODE_STATUS, "SHUTTING_DOWN").await;
    assert_eq!(s.next_event().await, Event::Status(NodeStatus::ShuttingDown));

    let mut second = s.servers.recv().await.unwrap();
    assert_eq!(second.host, "b");
    second.handshake().await;

    assert_eq!(s.next_event().await, Event::Reconnect);
    wait_for_state(&s.client, ConnectionState::Ready).await;
    assert_eq!(s.client.connection_info(), "b:9200");

    // Requests now go to the new node.
    let (result, _) = tokio::join!(
        s.client.query_as::<String>("node_info()"),
        second.answer(proto::REQ_QUERY, "b")
    );
    assert_eq!(result.unwrap(), "b");
}

#[tokio::test]
async fn test_close_fails_pending_and_stops() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let client = s.client.clone();
    let pending = tokio::spawn(async move { client.query("wait()").await });
    server.expect(proto::REQ_QUERY).await;

    s.client.close();
    assert!(matches!(pending.await.unwrap(), Err(ClientError::Closed)));
    s.client.wait_closed().await;

    assert_eq!(s.client.state(), ConnectionState::Disconnected);
    assert!(!s.client.is_connected());
    assert!(server.next().await.is_none());

    // No reconnect after an explicit close.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(s.connector.attempts().len(), 1);
    assert!(matches!(s.client.query("1").await, Err(ClientError::Closed)));
}

/// Start `connect_pool` with a token in the background.
fn spawn_connect_pool(
    client: &Arc<Client>,
    hosts: &[&str],
) -> tokio::task::JoinHandle<thingsdb_client::Result<()>> {
    let client = client.clone();
    let pool = Pool::parse(hosts).unwrap();
    tokio::spawn(async move { client.connect_pool(pool, Auth::token("secret")).await })
}

#[tokio::test]
async fn test_close_during_watch_replay() {
    let mut s = setup(&["node01"]);
    let connect = spawn_connect_pool(&s.client, &["node01"]);

    let mut server = s.servers.recv().await.unwrap();
    server.answer(proto::REQ_AUTH, &()).await;
    server.expect(proto::REQ_WATCH).await;

    s.client.close();
    assert!(matches!(connect.await.unwrap(), Err(ClientError::Closed)));
    s.client.wait_closed().await;

    // The failed watch must not resurrect the connection.
    s.no_event().await;
    assert_eq!(s.client.state(), ConnectionState::Disconnected);
    assert!(!s.client.is_connected());
    assert_eq!(s.connector.attempts().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_loss_during_watch_replay() {
    let mut s = setup(&["node01"]);
    let connect = spawn_connect_pool(&s.client, &["node01"]);

    let mut first = s.servers.recv().await.unwrap();
    first.answer(proto::REQ_AUTH, &()).await;
    first.expect(proto::REQ_WATCH).await;
    drop(first);

    let mut second = s.servers.recv().await.unwrap();
    assert!(!connect.is_finished());
    assert_ne!(s.client.state(), ConnectionState::Ready);

    second.handshake().await;
    connect.await.unwrap().unwrap();
    assert_eq!(s.client.state(), ConnectionState::Ready);
    assert!(s.client.is_connected());
    assert_eq!(s.next_event().await, Event::Reconnect);
    assert_eq!(s.connector.attempts(), vec!["node01", "node01"]);
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_is_retried() {
    let mut s = setup(&["node01"]);
    let connect = spawn_connect_pool(&s.client, &["node01"]);

    let mut first = s.servers.recv().await.unwrap();
    let auth = first.expect(proto::REQ_AUTH).await;
    first
        .send(
            proto::ERR_AUTH,
            auth.id(),
            &json!({"error_code": -56, "error_msg": "invalid token"}),
        )
        .await;

    // The rejected connection is dropped, the next cycle tries again.
    assert!(first.next().await.is_none());
    let started = tokio::time::Instant::now();
    let mut second = s.servers.recv().await.unwrap();
    assert!(started.elapsed() >= Duration::from_millis(900));

    let auth = second.answer(proto::REQ_AUTH, &()).await;
    assert_eq!(decode(&auth), json!("secret"));
    let watch = second.answer(proto::REQ_WATCH, &()).await;
    assert_eq!(decode(&watch), json!(["@thingsdb"]));

    connect.await.unwrap().unwrap();
    assert_eq!(s.next_event().await, Event::Reconnect);
    assert_eq!(s.connector.attempts(), vec!["node01", "node01"]);
}

#[tokio::test]
async fn test_framing_error_reconnects() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let client = s.client.clone();
    let pending = tokio::spawn(async move { client.query("1").await });
    let request = server.expect(proto::REQ_QUERY).await;

    let mut corrupt = build_package(proto::RES_QUERY, request.id(), &[]);
    corrupt[7] ^= 0x01;
    server.writer.write_all(&corrupt).await.unwrap();

    assert!(matches!(pending.await.unwrap(), Err(ClientError::ConnectionLost)));
    assert!(server.next().await.is_none());

    let mut second = s.servers.recv().await.unwrap();
    second.answer(proto::REQ_AUTH, &()).await;
    second.answer(proto::REQ_WATCH, &()).await;
    assert_eq!(s.next_event().await, Event::Reconnect);
    wait_for_state(&s.client, ConnectionState::Ready).await;
    assert_eq!(s.connector.attempts().len(), 2);
}

#[tokio::test]
async fn test_request_while_disconnected_fails_fast() {
    let s = setup(&[]);
    let result = s.client.query("1").await;
    assert!(matches!(result, Err(ClientError::NoConnection)));

    let endpoint = Endpoint::new("nowhere", 9200);
    assert!(s.client.connect(endpoint).await.is_err());
    assert_eq!(s.client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_unrelated_push_does_not_disturb_requests() {
    let mut s = setup(&["node01"]);
    let mut server = s.connect_pool(&["node01"]).await;

    let request = async {
        let package = server.expect(proto::REQ_QUERY).await;
        server.push(proto::ON_NODE_STATUS, "AWAY_SOON").await;
        server
            .push(proto::ON_WARN, &json!({"warn_msg": "slow", "warn_code": 1}))
            .await;
        server.send(proto::RES_QUERY, package.id(), &1).await;
    };
    let (result, ()) = tokio::join!(s.client.query_as::<i64>("1"), request);
    assert_eq!(result.unwrap(), 1);
    assert_eq!(s.next_event().await, Event::Status(NodeStatus::AwaySoon));
    assert_eq!(s.client.state(), ConnectionState::Ready);
}
