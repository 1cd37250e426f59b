//! Entity cache: the session-wide mirror of the remote store
//!
//! The cache maps an [`IdentityKey`] to a shared, immutable `Arc<Thing>`.
//! Lookups never take a global lock: the map is sharded (`dashmap`), each
//! key owns a slot whose value is read lock-free (`arc-swap`), and writers
//! to one slot serialize on that slot's own mutex. Lazy construction through
//! [`EntityCache::get_or_create`] runs the factory at most once per key
//! among concurrent callers.
//!
//! Stored things only ever move forward: a write whose revision is not
//! strictly greater than the stored one is ignored.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::core::identity::{ClassKind, IdentityKey, ThingId};
use crate::core::thing::Thing;

/// One cache entry: the current value plus the lock its writers share
#[derive(Default)]
struct Slot {
    value: ArcSwapOption<Thing>,
    write: Mutex<()>,
}

/// Outcome of [`EntityCache::put_or_update`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    /// No entry existed for the key
    Inserted,
    /// The stored thing was replaced by a newer revision
    Updated,
    /// The incoming thing was not newer; nothing changed
    Ignored,
}

impl CacheWrite {
    pub fn applied(&self) -> bool {
        !matches!(self, CacheWrite::Ignored)
    }
}

/// Concurrent identity-keyed cache of things
#[derive(Default)]
pub struct EntityCache {
    slots: DashMap<IdentityKey, Arc<Slot>>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for `key`, created empty if missing; the shard guard is released on return
    fn slot(&self, key: IdentityKey) -> Arc<Slot> {
        Arc::clone(&*self.slots.entry(key).or_default())
    }

    /// Whether `slot` is still the one the map holds for `key`
    fn is_attached(&self, key: &IdentityKey, slot: &Arc<Slot>) -> bool {
        self.slots
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), slot))
    }

    /// Return the cached thing, constructing it with `factory` on a miss
    ///
    /// Concurrent callers for the same key wait for the first construction
    /// and share its result. A failing factory leaves no entry behind, so a
    /// later call retries.
    pub fn get_or_create<E, F>(&self, key: IdentityKey, factory: F) -> Result<Arc<Thing>, E>
    where
        F: FnOnce() -> Result<Thing, E>,
    {
        loop {
            let slot = self.slot(key);
            if let Some(thing) = slot.value.load_full() {
                return Ok(thing);
            }

            let _guard = slot.write.lock();
            if let Some(thing) = slot.value.load_full() {
                return Ok(thing);
            }
            if !self.is_attached(&key, &slot) {
                // removed while we waited for the lock
                continue;
            }

            return match factory() {
                Ok(thing) => {
                    let thing = Arc::new(thing);
                    slot.value.store(Some(Arc::clone(&thing)));
                    tracing::trace!(%key, "cache entry constructed");
                    Ok(thing)
                }
                Err(e) => {
                    self.slots.remove_if(&key, |_, current| {
                        Arc::ptr_eq(current, &slot) && current.value.load().is_none()
                    });
                    Err(e)
                }
            };
        }
    }

    /// Non-blocking lookup; never constructs
    pub fn try_get(&self, key: &IdentityKey) -> Option<Arc<Thing>> {
        self.slots.get(key).and_then(|slot| slot.value.load_full())
    }

    pub fn contains_key(&self, key: &IdentityKey) -> bool {
        self.try_get(key).is_some()
    }

    /// Resolve a reference field: the scoped key first, then the unscoped one
    ///
    /// `None` means "not loaded", which is a valid state for a reference.
    pub fn resolve(&self, id: ThingId, scope: Option<ThingId>) -> Option<Arc<Thing>> {
        scope
            .and_then(|scope| self.try_get(&IdentityKey::scoped(id, scope)))
            .or_else(|| self.try_get(&IdentityKey::new(id)))
    }

    /// Insert `thing`, or replace the stored one if `thing` is strictly newer
    pub fn put_or_update(&self, key: IdentityKey, thing: Arc<Thing>) -> CacheWrite {
        loop {
            let slot = self.slot(key);
            let _guard = slot.write.lock();
            if !self.is_attached(&key, &slot) {
                continue;
            }

            let outcome = match slot.value.load_full() {
                None => CacheWrite::Inserted,
                Some(current) if thing.revision() > current.revision() => CacheWrite::Updated,
                Some(current) => {
                    tracing::trace!(
                        %key,
                        stored = current.revision(),
                        incoming = thing.revision(),
                        "ignoring stale cache write"
                    );
                    CacheWrite::Ignored
                }
            };
            if outcome.applied() {
                slot.value.store(Some(thing));
            }
            return outcome;
        }
    }

    /// Drop the entry for `key`, returning what was stored
    pub fn remove(&self, key: &IdentityKey) -> Option<Arc<Thing>> {
        self.slots
            .remove(key)
            .and_then(|(_, slot)| slot.value.load_full())
    }

    /// Drop the entry only if it is not newer than `revision`
    ///
    /// A late removal notice must not delete a thing that was re-created at
    /// a higher revision.
    pub fn remove_if_not_newer(&self, key: &IdentityKey, revision: u64) -> Option<Arc<Thing>> {
        let removed = self.slots.remove_if(key, |_, slot| {
            slot.value
                .load_full()
                .map_or(true, |current| current.revision() <= revision)
        });
        match removed {
            Some((_, slot)) => slot.value.load_full(),
            None => {
                if self.contains_key(key) {
                    tracing::trace!(%key, revision, "ignoring stale cache removal");
                }
                None
            }
        }
    }

    /// All cached things of one kind, ordered by id
    pub fn of_kind(&self, kind: ClassKind) -> Vec<Arc<Thing>> {
        let mut things: Vec<Arc<Thing>> = self
            .slots
            .iter()
            .filter_map(|entry| entry.value().value.load_full())
            .filter(|thing| thing.class_kind() == kind)
            .collect();
        things.sort_by_key(|thing| thing.key());
        things
    }

    /// Number of populated entries
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|entry| entry.value().value.load().is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.clear();
    }

    /// Sorted copy of every populated entry
    pub fn snapshot(&self) -> Vec<(IdentityKey, Arc<Thing>)> {
        let mut entries: Vec<(IdentityKey, Arc<Thing>)> = self
            .slots
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .value
                    .load_full()
                    .map(|thing| (*entry.key(), thing))
            })
            .collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    /// SHA-256 over the canonical JSON of the sorted snapshot
    ///
    /// Two caches with equal fingerprints hold byte-identical state.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        let mut hasher = Sha256::new();
        for (key, thing) in self.snapshot() {
            hasher.update(serde_json::to_vec(&(key, thing.as_ref()))?);
            hasher.update(b"\n");
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

impl std::fmt::Debug for EntityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCache")
            .field("entries", &self.len())
            .finish()
    }
}
