//! Change bus: publish/subscribe of cache changes
//!
//! Each session owns one bus. Publishers hand it [`ChangeEvent`]s after the
//! cache has been written; subscribers receive the events matching their
//! [`ChangeFilter`] on their own queue, so a slow subscriber never blocks a
//! publisher or another subscriber.
//!
//! Ordering is per key only. Publishing admits and enqueues under one lock,
//! so concurrent publishers cannot interleave a key's events out of order.
//! Two gates keep a subscriber from ever moving backwards: the bus drops an
//! `Updated` that is not newer than the last revision it published for that
//! key, and every [`Listener`] drops events older than what it already
//! delivered for that key.
//!
//! Both gates remember one revision per key. Keys whose last event was a
//! removal are forgotten by [`ChangeBus::prune_removed`] once the session
//! has caught up past that removal; anything published later for such a
//! key at or below the pruned revision is dropped as history.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::core::config::DEFAULT_SESSION_EVENT_CAPACITY;
use crate::core::identity::{ClassKind, IdentityKey};
use crate::core::thing::Thing;

/// What happened to a thing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created,
    Updated,
    Removed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Created => write!(f, "created"),
            EventKind::Updated => write!(f, "updated"),
            EventKind::Removed => write!(f, "removed"),
        }
    }
}

/// A change to one cached thing
///
/// For `Removed` the thing is the last known state.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: EventKind,
    pub key: IdentityKey,
    pub thing: Arc<Thing>,
}

impl ChangeEvent {
    pub fn new(kind: EventKind, thing: Arc<Thing>) -> Self {
        Self {
            kind,
            key: thing.key(),
            thing,
        }
    }

    pub fn created(thing: Arc<Thing>) -> Self {
        Self::new(EventKind::Created, thing)
    }

    pub fn updated(thing: Arc<Thing>) -> Self {
        Self::new(EventKind::Updated, thing)
    }

    pub fn removed(thing: Arc<Thing>) -> Self {
        Self::new(EventKind::Removed, thing)
    }

    pub fn revision(&self) -> u64 {
        self.thing.revision()
    }

    pub fn class_kind(&self) -> ClassKind {
        self.thing.class_kind()
    }
}

/// Which events a subscriber wants
///
/// An empty filter matches everything; otherwise an event matches when its
/// key or its class kind is listed.
#[derive(Debug, Clone, Default)]
pub struct ChangeFilter {
    keys: HashSet<IdentityKey>,
    kinds: HashSet<ClassKind>,
}

impl ChangeFilter {
    /// Match every event
    pub fn all() -> Self {
        Self::default()
    }

    pub fn keys(keys: impl IntoIterator<Item = IdentityKey>) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            kinds: HashSet::new(),
        }
    }

    pub fn kinds(kinds: impl IntoIterator<Item = ClassKind>) -> Self {
        Self {
            keys: HashSet::new(),
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn with_key(mut self, key: IdentityKey) -> Self {
        self.keys.insert(key);
        self
    }

    pub fn with_kind(mut self, kind: ClassKind) -> Self {
        self.kinds.insert(kind);
        self
    }

    pub fn is_wildcard(&self) -> bool {
        self.keys.is_empty() && self.kinds.is_empty()
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.is_wildcard()
            || self.keys.contains(&event.key)
            || self.kinds.contains(&event.class_kind())
    }
}

/// Handle identifying one subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Session lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Opened { revision: u64 },
    Refreshed { revision: u64 },
    Closed,
}

struct Subscriber {
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<Vec<ChangeEvent>>,
}

/// Subscribers and the indexes used to route events to them
#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    subscribers: DashMap<SubscriptionId, Subscriber>,
    by_key: DashMap<IdentityKey, BTreeSet<SubscriptionId>>,
    by_kind: DashMap<ClassKind, BTreeSet<SubscriptionId>>,
    wildcard: DashMap<SubscriptionId, ()>,
    /// Revision up to which removed keys have been forgotten
    floor: AtomicU64,
}

impl Registry {
    fn register(&self, filter: ChangeFilter) -> (SubscriptionId, mpsc::UnboundedReceiver<Vec<ChangeEvent>>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();

        if filter.is_wildcard() {
            self.wildcard.insert(id, ());
        }
        for key in &filter.keys {
            self.by_key.entry(*key).or_default().insert(id);
        }
        for kind in &filter.kinds {
            self.by_kind.entry(*kind).or_default().insert(id);
        }
        self.subscribers.insert(id, Subscriber { filter, tx });
        (id, rx)
    }

    fn unregister(&self, id: SubscriptionId) -> bool {
        let Some((_, subscriber)) = self.subscribers.remove(&id) else {
            return false;
        };
        self.wildcard.remove(&id);
        for key in &subscriber.filter.keys {
            self.by_key.remove_if_mut(key, |_, ids| {
                ids.remove(&id);
                ids.is_empty()
            });
        }
        for kind in &subscriber.filter.kinds {
            self.by_kind.remove_if_mut(kind, |_, ids| {
                ids.remove(&id);
                ids.is_empty()
            });
        }
        true
    }

    /// Subscribers interested in `event`, via the key and kind indexes
    fn targets(&self, event: &ChangeEvent) -> BTreeSet<SubscriptionId> {
        let mut ids: BTreeSet<SubscriptionId> =
            self.wildcard.iter().map(|entry| *entry.key()).collect();
        if let Some(by_key) = self.by_key.get(&event.key) {
            ids.extend(by_key.iter().copied());
        }
        if let Some(by_kind) = self.by_kind.get(&event.class_kind()) {
            ids.extend(by_kind.iter().copied());
        }
        ids
    }

    fn deliver(&self, id: SubscriptionId, events: Vec<ChangeEvent>) {
        let closed = match self.subscribers.get(&id) {
            Some(subscriber) => subscriber.tx.send(events).is_err(),
            None => false,
        };
        if closed {
            self.unregister(id);
        }
    }

    fn clear(&self) {
        self.subscribers.clear();
        self.by_key.clear();
        self.by_kind.clear();
        self.wildcard.clear();
    }
}

/// Last revision published for a key
#[derive(Debug, Clone, Copy)]
struct Published {
    revision: u64,
    removed: bool,
}

/// Per-session publish/subscribe hub for cache changes
pub struct ChangeBus {
    registry: Arc<Registry>,
    last_published: DashMap<IdentityKey, Published>,
    /// Held from admission until every share is enqueued
    publish_lock: Mutex<()>,
    session_tx: broadcast::Sender<SessionEvent>,
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::with_session_capacity(DEFAULT_SESSION_EVENT_CAPACITY)
    }

    /// Bus whose session event channel holds `capacity` undelivered events
    pub fn with_session_capacity(capacity: usize) -> Self {
        let (session_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            registry: Arc::new(Registry::default()),
            last_published: DashMap::new(),
            publish_lock: Mutex::new(()),
            session_tx,
        }
    }

    /// Bus-level gate: record the event and report whether it may go out
    fn admit(&self, event: &ChangeEvent) -> bool {
        let revision = event.revision();
        let removed = event.kind == EventKind::Removed;
        match self.last_published.entry(event.key) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                let last = entry.get_mut();
                if event.kind == EventKind::Updated && last.revision >= revision {
                    tracing::trace!(
                        key = %event.key,
                        revision,
                        last = last.revision,
                        "dropping stale update event"
                    );
                    return false;
                }
                if revision >= last.revision {
                    *last = Published { revision, removed };
                }
                true
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                let floor = self.registry.floor.load(Ordering::SeqCst);
                if floor > 0 && revision <= floor {
                    tracing::trace!(key = %event.key, revision, floor, "dropping pruned event");
                    return false;
                }
                entry.insert(Published { revision, removed });
                true
            }
        }
    }

    /// Publish one event (fire-and-forget)
    pub fn publish(&self, event: ChangeEvent) {
        let _publishing = self.publish_lock.lock();
        if !self.admit(&event) {
            return;
        }
        for id in self.registry.targets(&event) {
            self.registry.deliver(id, vec![event.clone()]);
        }
    }

    /// Publish a batch, enqueuing each subscriber's share as one message
    ///
    /// Nothing published concurrently can land between two events of the
    /// same batch in any subscriber's queue.
    pub fn publish_batch(&self, events: Vec<ChangeEvent>) {
        let _publishing = self.publish_lock.lock();
        let mut shares: BTreeMap<SubscriptionId, Vec<ChangeEvent>> = BTreeMap::new();
        for event in events {
            if !self.admit(&event) {
                continue;
            }
            for id in self.registry.targets(&event) {
                shares.entry(id).or_default().push(event.clone());
            }
        }
        for (id, share) in shares {
            self.registry.deliver(id, share);
        }
    }

    /// Register a pull-based subscriber
    pub fn listen(&self, filter: ChangeFilter) -> Listener {
        let (id, rx) = self.registry.register(filter);
        tracing::debug!(subscription = %id, "subscriber registered");
        Listener {
            id,
            rx,
            buffer: VecDeque::new(),
            seen: HashMap::new(),
            pruned_at: 0,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Register a handler run on a dedicated task for this subscriber
    ///
    /// Events for the subscriber are handled one at a time, in arrival order.
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// [`Subscription`] unsubscribes and stops the task.
    pub fn subscribe<F>(&self, filter: ChangeFilter, mut handler: F) -> Subscription
    where
        F: FnMut(ChangeEvent) + Send + 'static,
    {
        let mut listener = self.listen(filter);
        let id = listener.id();
        let task = tokio::spawn(async move {
            while let Some(event) = listener.recv().await {
                handler(event);
            }
        });
        Subscription {
            id,
            task,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Remove a subscriber; its pending events are still drained by its listener
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.unregister(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.subscribers.len()
    }

    /// Forget keys whose last event was a removal at or below `revision`
    ///
    /// Listeners drop their own records for those keys the next time they
    /// receive. Returns the number of keys forgotten by the bus.
    pub fn prune_removed(&self, revision: u64) -> usize {
        let _publishing = self.publish_lock.lock();
        let before = self.last_published.len();
        self.last_published
            .retain(|_, last| !(last.removed && last.revision <= revision));
        self.registry.floor.fetch_max(revision, Ordering::SeqCst);
        let pruned = before - self.last_published.len();
        if pruned > 0 {
            tracing::trace!(revision, pruned, "pruned removed keys");
        }
        pruned
    }

    /// Number of keys the bus-level gate remembers
    pub fn tracked_keys(&self) -> usize {
        self.last_published.len()
    }

    /// Session teardown: drop every subscriber and forget published revisions
    pub fn clear_subscriptions(&self) {
        let _publishing = self.publish_lock.lock();
        self.registry.clear();
        self.last_published.clear();
        self.registry.floor.store(0, Ordering::SeqCst);
    }

    pub fn subscribe_session(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }

    pub fn publish_session(&self, event: SessionEvent) {
        // no receivers is fine
        let _ = self.session_tx.send(event);
    }
}

impl fmt::Debug for ChangeBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Pull-based subscriber
///
/// Dropping the listener unsubscribes it.
pub struct Listener {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<Vec<ChangeEvent>>,
    buffer: VecDeque<ChangeEvent>,
    /// Last delivered event per key
    seen: HashMap<IdentityKey, Published>,
    /// Bus floor applied to `seen` so far
    pruned_at: u64,
    registry: Weak<Registry>,
}

impl Listener {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Consumer-side gate: `Updated` must be strictly newer than the last
    /// delivered revision, `Created`/`Removed` must not be older
    fn accept(&mut self, event: &ChangeEvent) -> bool {
        let revision = event.revision();
        let fresh = match self.seen.get(&event.key) {
            None => true,
            Some(last) => match event.kind {
                EventKind::Updated => revision > last.revision,
                EventKind::Created | EventKind::Removed => revision >= last.revision,
            },
        };
        if fresh {
            let removed = event.kind == EventKind::Removed;
            self.seen.insert(event.key, Published { revision, removed });
        } else {
            tracing::trace!(subscription = %self.id, key = %event.key, revision, "dropping stale event");
        }
        fresh
    }

    /// Drop records of removed keys the bus has pruned since the last call
    fn prune(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let floor = registry.floor.load(Ordering::SeqCst);
        if floor > self.pruned_at {
            self.seen
                .retain(|_, last| !(last.removed && last.revision <= floor));
            self.pruned_at = floor;
        }
    }

    /// Number of keys this listener remembers
    pub fn tracked_keys(&self) -> usize {
        self.seen.len()
    }

    /// Wait for the next event; `None` once unsubscribed and drained
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            while let Some(event) = self.buffer.pop_front() {
                if self.accept(&event) {
                    return Some(event);
                }
            }
            let batch = self.rx.recv().await?;
            self.prune();
            self.buffer.extend(batch);
        }
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            while let Some(event) = self.buffer.pop_front() {
                if self.accept(&event) {
                    return Some(event);
                }
            }
            let batch = self.rx.try_recv().ok()?;
            self.prune();
            self.buffer.extend(batch);
        }
    }

    /// Every event already queued, in delivery order
    pub fn drain(&mut self) -> Vec<ChangeEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
    }
}

/// Push-based subscription handle
///
/// Dropping it unsubscribes and aborts the handler task.
pub struct Subscription {
    id: SubscriptionId,
    task: JoinHandle<()>,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unregister(self.id);
        }
        self.task.abort();
    }
}
