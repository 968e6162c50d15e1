//! Signal routing between the host and filter instances.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use serde::{Deserialize, Serialize};

use crate::host::{ObjectId, SceneItemRef, SceneRef, SourceRef};

/// Frontend lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrontendEvent {
    FinishedLoading,
    SceneCollectionChanging,
    SceneCollectionChanged,
}

impl FrontendEvent {
    /// Whether the scene collection is fully materialized after this event.
    pub fn completes_loading(self) -> bool {
        matches!(self, Self::FinishedLoading | Self::SceneCollectionChanged)
    }
}

/// Address of a host signal. Per-object signals carry the emitting object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignalKey {
    /// Global: any source or scene was created.
    SourceCreate,
    /// Global: frontend lifecycle events.
    Frontend,
    /// A filter was enabled or disabled.
    Enable(ObjectId),
    ItemAdd(ObjectId),
    SceneDestroy(ObjectId),
    SceneRename(ObjectId),
}

impl SignalKey {
    /// The object a per-object signal is emitted by; `None` for globals.
    pub fn emitter(self) -> Option<ObjectId> {
        match self {
            Self::SourceCreate | Self::Frontend => None,
            Self::Enable(id) | Self::ItemAdd(id) | Self::SceneDestroy(id) | Self::SceneRename(id) => {
                Some(id)
            }
        }
    }
}

/// Payload delivered to subscribers.
#[derive(Clone)]
pub enum Signal {
    SourceCreated(SourceRef),
    SceneCreated(SceneRef),
    ItemAdded {
        scene: SceneRef,
        item: SceneItemRef,
    },
    Enable {
        enabled: bool,
    },
    SceneDestroyed {
        scene: ObjectId,
    },
    SceneRenamed {
        scene: ObjectId,
        new_name: String,
        prev_name: String,
    },
    Frontend(FrontendEvent),
}

impl Signal {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SourceCreated(_) => "source_create",
            Self::SceneCreated(_) => "scene_create",
            Self::ItemAdded { .. } => "item_add",
            Self::Enable { .. } => "enable",
            Self::SceneDestroyed { .. } => "destroy",
            Self::SceneRenamed { .. } => "rename",
            Self::Frontend(_) => "frontend_event",
        }
    }
}

/// Host-side connection point for signals.
pub trait SignalHub {
    fn connect(&self, key: SignalKey, subscriber: ObjectId);
    fn disconnect(&self, key: SignalKey, subscriber: ObjectId);
    /// Subscribers of `key`, in ascending id order.
    fn subscribers(&self, key: SignalKey) -> Vec<ObjectId>;
}

/// Table mapping each signal to the instances connected to it. Connecting
/// twice is a no-op, as is disconnecting something that is not connected.
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    inner: Mutex<HashMap<SignalKey, BTreeSet<ObjectId>>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of live connections.
    pub fn len(&self) -> usize {
        self.lock().values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every connection to the per-object signals of `object`. Called
    /// once the object is gone and its final signal has been delivered.
    pub fn forget_emitter(&self, object: ObjectId) {
        self.lock().retain(|key, _| key.emitter() != Some(object));
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SignalKey, BTreeSet<ObjectId>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SignalHub for SubscriptionTable {
    fn connect(&self, key: SignalKey, subscriber: ObjectId) {
        self.lock().entry(key).or_default().insert(subscriber);
    }

    fn disconnect(&self, key: SignalKey, subscriber: ObjectId) {
        let mut table = self.lock();
        if let Some(set) = table.get_mut(&key) {
            set.remove(&subscriber);
            if set.is_empty() {
                table.remove(&key);
            }
        }
    }

    fn subscribers(&self, key: SignalKey) -> Vec<ObjectId> {
        self.lock()
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

/// One instance's own record of what it is connected to, so every attach has
/// a matching detach when the instance goes away.
#[derive(Debug)]
pub struct Subscriptions {
    owner: ObjectId,
    attached: HashSet<SignalKey>,
}

impl Subscriptions {
    pub fn new(owner: ObjectId) -> Self {
        Self {
            owner,
            attached: HashSet::new(),
        }
    }

    pub fn attach(&mut self, hub: &dyn SignalHub, key: SignalKey) {
        if self.attached.insert(key) {
            hub.connect(key, self.owner);
        }
    }

    pub fn detach(&mut self, hub: &dyn SignalHub, key: SignalKey) {
        if self.attached.remove(&key) {
            hub.disconnect(key, self.owner);
        }
    }

    /// Detaches every key matching `predicate`.
    pub fn detach_where(&mut self, hub: &dyn SignalHub, predicate: impl Fn(&SignalKey) -> bool) {
        let keys: Vec<SignalKey> = self.attached.iter().copied().filter(|key| predicate(key)).collect();
        for key in keys {
            self.detach(hub, key);
        }
    }

    pub fn detach_all(&mut self, hub: &dyn SignalHub) {
        for key in self.attached.drain() {
            hub.disconnect(key, self.owner);
        }
    }

    pub fn is_attached(&self, key: SignalKey) -> bool {
        self.attached.contains(&key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.attached.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.attached.is_empty()
    }
}

/// Process-wide "the host has finished loading" flag. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct LoadGate {
    loaded: Arc<AtomicBool>,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn set_loaded(&self, loaded: bool) {
        self.loaded.store(loaded, Ordering::Release);
    }

    pub fn observe(&self, event: FrontendEvent) {
        match event {
            FrontendEvent::FinishedLoading | FrontendEvent::SceneCollectionChanged => {
                self.set_loaded(true)
            }
            FrontendEvent::SceneCollectionChanging => self.set_loaded(false),
        }
    }
}
