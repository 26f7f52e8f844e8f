//! Watch registry.
//!
//! Tracks the entities the application watches for push updates. Entries
//! hold `Weak` references only: the registry never keeps an entity alive, and
//! an entity the application dropped simply stops receiving events and is
//! left out of the subscriptions rebuilt after a reconnect.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};

use serde_json::{Map, Value};

use crate::config::Scope;
use crate::events::BoxFuture;

/// An entity that receives watch events.
///
/// All callbacks default to no-ops. Each one runs as its own task, so a
/// slow callback never holds up request processing.
pub trait Watcher: Send + Sync + 'static {
    /// Server side id of the watched thing.
    fn id(&self) -> u64;

    /// Scope the thing lives in.
    fn scope(&self) -> Scope;

    /// Full state of the thing, sent right after a watch request.
    fn on_init(self: Arc<Self>, _event_id: u64, _thing: Map<String, Value>) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    /// One or more changes on the thing. Never called with an empty job list.
    fn on_update(self: Arc<Self>, _event_id: u64, _jobs: Vec<Value>) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }

    /// The thing was removed on the server.
    fn on_delete(self: Arc<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async {})
    }
}

struct WatchEntry {
    scope: Scope,
    entity: Weak<dyn Watcher>,
}

/// Id to weak entity map, grouped by scope on demand.
#[derive(Default)]
pub struct WatchRegistry {
    entries: HashMap<u64, WatchEntry>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an entity. A previous entry with the same id is replaced.
    pub fn register(&mut self, entity: &Arc<dyn Watcher>) {
        self.entries.insert(
            entity.id(),
            WatchEntry {
                scope: entity.scope(),
                entity: Arc::downgrade(entity),
            },
        );
    }

    /// Resolve a live entity by id.
    ///
    /// An expired entry is removed and reported as absent.
    pub fn get(&mut self, id: u64) -> Option<Arc<dyn Watcher>> {
        let entity = self.entries.get(&id)?.entity.upgrade();
        if entity.is_none() {
            self.entries.remove(&id);
        }
        entity
    }

    /// Stop tracking an id. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: u64) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Drop entries whose entity is gone.
    pub fn purge(&mut self) {
        self.entries.retain(|_, entry| entry.entity.strong_count() > 0);
    }

    /// Number of live entities.
    pub fn len(&mut self) -> usize {
        self.purge();
        self.entries.len()
    }

    pub fn is_empty(&mut self) -> bool {
        self.len() == 0
    }

    /// Ids of every live entity, grouped by scope, for re-issuing watches.
    pub fn rebuild_subscriptions(&mut self) -> BTreeMap<Scope, Vec<u64>> {
        self.purge();

        let mut groups: BTreeMap<Scope, Vec<u64>> = BTreeMap::new();
        for (id, entry) in &self.entries {
            groups.entry(entry.scope.clone()).or_default().push(*id);
        }
        for ids in groups.values_mut() {
            ids.sort_unstable();
        }
        groups
    }
}
