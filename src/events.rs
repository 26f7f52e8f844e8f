//! Push event dispatch.
//!
//! Every decoded package passes through [`EventDispatcher::dispatch`]. Push
//! packages (node status, warnings, watch events) are decoded and handed to
//! their handler on a spawned task; everything else goes to the
//! [`Multiplexer`] to be matched by correlation id.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::codec::MsgPackCodec;
use crate::multiplexer::Multiplexer;
use crate::protocol::{Package, PushKind};
use crate::watch::{WatchRegistry, Watcher};

/// Boxed future returned by event callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Status a server node reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Offline,
    Connecting,
    Building,
    ShuttingDown,
    Synchronizing,
    Away,
    AwaySoon,
    Ready,
    Unknown,
}

impl NodeStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "OFFLINE" => Self::Offline,
            "CONNECTING" => Self::Connecting,
            "BUILDING" => Self::Building,
            "SHUTTING_DOWN" => Self::ShuttingDown,
            "SYNCHRONIZING" => Self::Synchronizing,
            "AWAY" => Self::Away,
            "AWAY_SOON" => Self::AwaySoon,
            "READY" => Self::Ready,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Connecting => "CONNECTING",
            Self::Building => "BUILDING",
            Self::ShuttingDown => "SHUTTING_DOWN",
            Self::Synchronizing => "SYNCHRONIZING",
            Self::Away => "AWAY",
            Self::AwaySoon => "AWAY_SOON",
            Self::Ready => "READY",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A warning pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Warning {
    #[serde(rename = "warn_msg")]
    pub message: String,
    #[serde(rename = "warn_code")]
    pub code: i64,
}

/// Application hooks for connection level events.
///
/// Every method defaults to a no-op.
pub trait EventHandler: Send + Sync + 'static {
    /// Called after a reconnect completed, authentication and watches
    /// included.
    fn on_reconnect(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    fn on_node_status(self: Arc<Self>, _status: NodeStatus) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    fn on_warning(self: Arc<Self>, _warning: Warning) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

/// Handler that ignores every event.
pub struct NoopHandler;

impl EventHandler for NoopHandler {}

#[derive(Deserialize)]
struct WatchInit {
    event: u64,
    thing: Map<String, Value>,
}

#[derive(Deserialize)]
struct WatchUpdate {
    event: u64,
    #[serde(rename = "#")]
    id: u64,
    #[serde(default)]
    jobs: Vec<Value>,
}

#[derive(Deserialize)]
struct WatchDelete {
    #[serde(rename = "#")]
    id: u64,
}

/// Where a package went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Handled as a push event.
    Push(PushKind),
    /// The node is shutting down; the connection should be replaced.
    Reconnect,
    /// Forwarded to the multiplexer; `false` if no request was waiting.
    Response(bool),
}

/// Routes packages to push handlers or the multiplexer.
#[derive(Clone)]
pub struct EventDispatcher {
    handler: Arc<dyn EventHandler>,
    watches: Arc<Mutex<WatchRegistry>>,
    mux: Multiplexer,
}

impl EventDispatcher {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        watches: Arc<Mutex<WatchRegistry>>,
        mux: Multiplexer,
    ) -> Self {
        Self {
            handler,
            watches,
            mux,
        }
    }

    /// Route one package. Never blocks on a handler.
    pub fn dispatch(&self, package: Package) -> Routed {
        let kind = match PushKind::from_tag(package.tp()) {
            Some(kind) => kind,
            None => return Routed::Response(self.mux.resolve(package)),
        };

        let payload = package.payload();
        let reconnect = match kind {
            PushKind::NodeStatus => self.on_node_status(payload),
            PushKind::Warning => {
                self.on_warning(payload);
                false
            }
            PushKind::WatchInit => {
                self.on_watch_init(payload);
                false
            }
            PushKind::WatchUpdate => {
                self.on_watch_update(payload);
                false
            }
            PushKind::WatchDelete => {
                self.on_watch_delete(payload);
                false
            }
        };

        if reconnect {
            Routed::Reconnect
        } else {
            Routed::Push(kind)
        }
    }

    fn on_node_status(&self, payload: &[u8]) -> bool {
        let status = match MsgPackCodec::decode::<String>(payload) {
            Ok(status) => NodeStatus::parse(&status),
            Err(e) => {
                tracing::warn!("failed to decode node status: {}", e);
                return false;
            }
        };

        tracing::debug!("node status: {}", status);
        tokio::spawn(self.handler.clone().on_node_status(status));
        status == NodeStatus::ShuttingDown
    }

    fn on_warning(&self, payload: &[u8]) {
        match MsgPackCodec::decode::<Warning>(payload) {
            Ok(warning) => {
                tracing::warn!("server warning ({}): {}", warning.code, warning.message);
                tokio::spawn(self.handler.clone().on_warning(warning));
            }
            Err(e) => tracing::warn!("failed to decode warning: {}", e),
        }
    }

    fn on_watch_init(&self, payload: &[u8]) {
        let WatchInit { event, mut thing } = match MsgPackCodec::decode(payload) {
            Ok(init) => init,
            Err(e) => {
                tracing::warn!("failed to decode watch init: {}", e);
                return;
            }
        };
        let id = match thing.remove("#").and_then(|id| id.as_u64()) {
            Some(id) => id,
            None => {
                tracing::warn!("watch init without thing id");
                return;
            }
        };

        if let Some(entity) = self.lookup(id) {
            tokio::spawn(entity.on_init(event, thing));
        }
    }

    fn on_watch_update(&self, payload: &[u8]) {
        let update: WatchUpdate = match MsgPackCodec::decode(payload) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!("failed to decode watch update: {}", e);
                return;
            }
        };
        if update.jobs.is_empty() {
            return;
        }

        if let Some(entity) = self.lookup(update.id) {
            tokio::spawn(entity.on_update(update.event, update.jobs));
        }
    }

    fn on_watch_delete(&self, payload: &[u8]) {
        let id = match MsgPackCodec::decode::<WatchDelete>(payload) {
            Ok(delete) => delete.id,
            Err(e) => {
                tracing::warn!("failed to decode watch delete: {}", e);
                return;
            }
        };

        let entity = {
            let mut watches = self.watches.lock().unwrap_or_else(|e| e.into_inner());
            let entity = watches.get(id);
            watches.remove(id);
            entity
        };
        if let Some(entity) = entity {
            tokio::spawn(entity.on_delete());
        }
    }

    fn lookup(&self, id: u64) -> Option<Arc<dyn Watcher>> {
        let entity = self
            .watches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(id);
        if entity.is_none() {
            tracing::debug!("no watcher for thing {}", id);
        }
        entity
    }
}
