//! Session: cache, bus, and remote store wired together
//!
//! A session mirrors the remote store in its [`EntityCache`] and is the only
//! place where transactions are submitted. Writes run through a small state
//! machine (`Idle -> Submitting -> Reconciling | Rejected -> Idle`) and are
//! serialized, so at most one write is in flight per session. After a
//! successful commit every cache write is staged first and the resulting
//! events are published as one batch, so observers never see a partially
//! reconciled write. A rejected write leaves the cache untouched.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bus::{ChangeBus, ChangeEvent, SessionEvent};
use crate::core::cache::{CacheWrite, EntityCache};
use crate::core::identity::{IdentityKey, ThingId};
use crate::core::operation::{OperationKind, OperationSet};
use crate::core::permission::{PermissionService, PermissionTarget};
use crate::core::remote::{CommitReceipt, Remote, RemoteError};
use crate::core::thing::Thing;
use crate::core::transaction::{Transaction, TransactionError};

/// Write path state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Submitting = 1,
    Reconciling = 2,
    Rejected = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::Submitting,
            2 => SessionState::Reconciling,
            3 => SessionState::Rejected,
            _ => SessionState::Idle,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Submitting => write!(f, "submitting"),
            SessionState::Reconciling => write!(f, "reconciling"),
            SessionState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Moves the session state and puts it back to `Idle` when dropped
struct StateGuard<'a> {
    state: &'a AtomicU8,
}

impl<'a> StateGuard<'a> {
    fn enter(state: &'a AtomicU8, initial: SessionState) -> Self {
        state.store(initial as u8, Ordering::SeqCst);
        Self { state }
    }

    fn set(&self, next: SessionState) {
        self.state.store(next as u8, Ordering::SeqCst);
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        self.state.store(SessionState::Idle as u8, Ordering::SeqCst);
    }
}

/// One client's view of the remote store
pub struct Session {
    cache: Arc<EntityCache>,
    bus: Arc<ChangeBus>,
    remote: Arc<dyn Remote>,
    permissions: Arc<dyn PermissionService>,
    state: AtomicU8,
    write_lock: tokio::sync::Mutex<()>,
    /// Store revision up to which the cache is known to be complete
    revision: AtomicU64,
    closed: AtomicBool,
}

impl Session {
    pub fn new(remote: Arc<dyn Remote>, permissions: Arc<dyn PermissionService>) -> Self {
        Self::with_bus(remote, permissions, Arc::new(ChangeBus::new()))
    }

    /// Session publishing on an existing bus
    pub fn with_bus(
        remote: Arc<dyn Remote>,
        permissions: Arc<dyn PermissionService>,
        bus: Arc<ChangeBus>,
    ) -> Self {
        Self {
            cache: Arc::new(EntityCache::new()),
            bus,
            remote,
            permissions,
            state: AtomicU8::new(SessionState::Idle as u8),
            write_lock: tokio::sync::Mutex::new(()),
            revision: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Last store revision the cache has caught up with
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.is_closed() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    /// Load the whole store into the cache
    pub async fn open(&self) -> Result<(), SessionError> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().await;

        let snapshot = self.remote.fetch().await?;
        let count = snapshot.things.len();
        for thing in snapshot.things {
            self.cache.put_or_update(thing.key(), Arc::new(thing));
        }
        self.revision.fetch_max(snapshot.revision, Ordering::SeqCst);

        tracing::debug!(revision = snapshot.revision, things = count, "session opened");
        self.bus.publish_session(SessionEvent::Opened {
            revision: snapshot.revision,
        });
        Ok(())
    }

    /// Cached thing for `key`, if loaded
    pub fn retrieve(&self, key: &IdentityKey) -> Option<Arc<Thing>> {
        self.cache.try_get(key)
    }

    /// Resolve a reference field through the cache
    pub fn resolve(&self, id: ThingId, scope: Option<ThingId>) -> Option<Arc<Thing>> {
        self.cache.resolve(id, scope)
    }

    /// Cached thing for `key`, loading it from the store on a miss
    ///
    /// `Ok(None)` when the store has no such thing under that key.
    pub async fn get_or_load(&self, key: IdentityKey) -> Result<Option<Arc<Thing>>, SessionError> {
        self.ensure_open()?;
        if let Some(thing) = self.cache.try_get(&key) {
            return Ok(Some(thing));
        }

        let Some(thing) = self.remote.fetch_thing(key).await? else {
            return Ok(None);
        };
        let thing = self
            .cache
            .get_or_create(key, || Ok::<_, SessionError>(thing))?;
        Ok(Some(thing))
    }

    /// Open a transaction on `root` if the actor may write it
    pub fn open_transaction(&self, root: &Thing) -> Result<Transaction, SessionError> {
        self.ensure_open()?;
        if !self
            .permissions
            .can_write(root.class_kind(), PermissionTarget::Thing(root))
        {
            return Err(SessionError::forbidden(root));
        }
        Ok(Transaction::open(root))
    }

    /// Submit a transaction and reconcile the cache with the result
    pub async fn write(&self, tx: Transaction) -> Result<CommitReceipt, SessionError> {
        self.write_cancellable(tx, CancellationToken::new()).await
    }

    /// [`Session::write`] that gives up when `token` is cancelled
    ///
    /// Cancellation before the store answers leaves the cache untouched. If
    /// the store had already committed, the change arrives with the next
    /// [`Session::refresh`].
    pub async fn write_cancellable(
        &self,
        tx: Transaction,
        token: CancellationToken,
    ) -> Result<CommitReceipt, SessionError> {
        self.ensure_open()?;
        let set = tx.finalize()?;

        let _write = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(SessionError::Cancelled),
            guard = self.write_lock.lock() => guard,
        };
        self.ensure_open()?;

        let state = StateGuard::enter(&self.state, SessionState::Submitting);
        if set.is_empty() {
            return Ok(CommitReceipt {
                revision: self.revision(),
                outcomes: Vec::new(),
            });
        }

        if let Err(e) = self.authorize(&set) {
            state.set(SessionState::Rejected);
            tracing::warn!(set = %set.id, error = %e, "write rejected");
            return Err(e);
        }

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                state.set(SessionState::Rejected);
                tracing::debug!(set = %set.id, "write cancelled");
                return Err(SessionError::Cancelled);
            }
            result = self.remote.commit(&set) => result,
        };

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(e) => {
                state.set(SessionState::Rejected);
                tracing::warn!(set = %set.id, error = %e, "write rejected by store");
                return Err(e.into());
            }
        };

        state.set(SessionState::Reconciling);
        let events = self.reconcile(
            receipt
                .outcomes
                .iter()
                .map(|outcome| (outcome.kind, outcome.thing.clone())),
        );
        // only advance when no other commit landed in between
        let _ = self.revision.compare_exchange(
            receipt.revision.saturating_sub(1),
            receipt.revision,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        self.bus.prune_removed(self.revision());

        tracing::debug!(
            set = %set.id,
            revision = receipt.revision,
            operations = set.len(),
            events,
            "write reconciled"
        );
        Ok(receipt)
    }

    /// Check every operation with the permission service before submitting
    fn authorize(&self, set: &OperationSet) -> Result<(), SessionError> {
        for op in set.iter() {
            let container = op.container();
            let target = match (op.kind, container.as_ref()) {
                (OperationKind::Create, Some(container)) => PermissionTarget::Container(container),
                _ => PermissionTarget::Thing(&op.thing),
            };
            if !self.permissions.can_write(op.class_kind(), target) {
                return Err(SessionError::forbidden(&op.thing));
            }
        }
        Ok(())
    }

    /// Apply canonical store states to the cache, then publish one batch
    ///
    /// Only writes that changed the cache produce events. Returns the
    /// number of events published.
    fn reconcile(&self, changes: impl IntoIterator<Item = (OperationKind, Thing)>) -> usize {
        let mut events = Vec::new();
        for (kind, thing) in changes {
            let key = thing.key();
            let event = match kind {
                OperationKind::Delete => self
                    .cache
                    .remove_if_not_newer(&key, thing.revision())
                    .map(|_| ChangeEvent::removed(Arc::new(thing))),
                OperationKind::Create | OperationKind::Update => {
                    let thing = Arc::new(thing);
                    match self.cache.put_or_update(key, Arc::clone(&thing)) {
                        CacheWrite::Ignored => None,
                        CacheWrite::Inserted => Some(ChangeEvent::created(thing)),
                        CacheWrite::Updated => Some(ChangeEvent::updated(thing)),
                    }
                }
            };
            events.extend(event);
        }

        let count = events.len();
        self.bus.publish_batch(events);
        count
    }

    /// Pull changes committed by others and reconcile them
    ///
    /// Returns the number of events published.
    pub async fn refresh(&self) -> Result<usize, SessionError> {
        self.ensure_open()?;
        let _write = self.write_lock.lock().await;
        self.ensure_open()?;

        let since = self.revision();
        let changes = self.remote.changes_since(since).await?;
        if changes.is_empty() {
            return Ok(0);
        }

        let _state = StateGuard::enter(&self.state, SessionState::Reconciling);
        let revision = changes
            .iter()
            .map(|change| change.revision)
            .max()
            .unwrap_or(since);
        let events = self.reconcile(
            changes
                .into_iter()
                .map(|change| (change.kind, change.thing)),
        );
        self.revision.fetch_max(revision, Ordering::SeqCst);
        self.bus.prune_removed(self.revision());

        tracing::debug!(since, revision, events, "session refreshed");
        self.bus.publish_session(SessionEvent::Refreshed { revision });
        Ok(events)
    }

    /// Refresh every `period` on a background task
    ///
    /// The task stops when the session is closed or dropped; failures are
    /// logged and retried on the next tick.
    pub fn spawn_sync(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let session: Weak<Session> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                if session.is_closed() {
                    break;
                }
                if let Err(e) = session.refresh().await {
                    tracing::warn!(error = %e, "background sync failed");
                }
            }
            tracing::debug!("background sync stopped");
        })
    }

    /// Tear the session down: empty the cache and drop all subscribers
    ///
    /// Waits for an in-flight write to finish; later calls fail with
    /// [`SessionError::Closed`].
    pub async fn close(&self) {
        let _write = self.write_lock.lock().await;
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cache.clear();
        self.bus.clear_subscriptions();
        self.bus.publish_session(SessionEvent::Closed);
        tracing::debug!("session closed");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("revision", &self.revision())
            .field("cache", &self.cache)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Errors surfaced by session operations
#[derive(Debug, Error, Diagnostic)]
pub enum SessionError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Transaction(#[from] TransactionError),

    #[error("not permitted: {reason}")]
    #[diagnostic(
        code(tts::session::forbidden),
        help("check the actor (TTS_ACTOR) and .tts/permissions.yaml")
    )]
    Forbidden { reason: String },

    #[error("conflict on {id}: {reason}")]
    #[diagnostic(
        code(tts::session::conflict),
        help("the thing changed since it was loaded; open a fresh transaction and re-apply the edit")
    )]
    Conflict { id: ThingId, reason: String },

    #[error("store unavailable: {0}")]
    #[diagnostic(code(tts::session::transport))]
    Transport(String),

    #[error("store rejected the write: {0}")]
    #[diagnostic(code(tts::session::validation))]
    Validation(String),

    #[error("write cancelled")]
    #[diagnostic(code(tts::session::cancelled))]
    Cancelled,

    #[error("session is closed")]
    #[diagnostic(code(tts::session::closed))]
    Closed,
}

impl SessionError {
    fn forbidden(thing: &Thing) -> Self {
        SessionError::Forbidden {
            reason: format!("may not write {} {}", thing.class_kind(), thing.key()),
        }
    }
}

impl From<RemoteError> for SessionError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Conflict { id, reason } => SessionError::Conflict { id, reason },
            RemoteError::Forbidden(reason) => SessionError::Forbidden { reason },
            RemoteError::Transport(message) => SessionError::Transport(message),
            RemoteError::Validation(message) => SessionError::Validation(message),
        }
    }
}
