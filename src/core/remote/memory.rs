//! In-process remote store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::identity::IdentityKey;
use crate::core::operation::{Operation, OperationKind, OperationSet, TransactionContext};
use crate::core::remote::{
    plan_commit, CommitReceipt, Remote, RemoteChange, RemoteError, Snapshot,
};
use crate::core::thing::Thing;

#[derive(Debug, Default)]
struct MemoryState {
    head: u64,
    things: BTreeMap<IdentityKey, Thing>,
    log: Vec<RemoteChange>,
}

/// Authoritative store kept in memory
///
/// Supports fault injection ([`MemoryRemote::fail_next`]) and artificial
/// latency so sessions can be exercised against slow or failing stores.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
    fail_next: Mutex<Option<RemoteError>>,
    latency: Option<Duration>,
    commits: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Create `things` in one commit, bypassing sessions
    ///
    /// The things must form a consistent graph, ids assigned.
    pub fn seed(&self, things: Vec<Thing>) -> Result<u64, RemoteError> {
        let Some(first) = things.first() else {
            return Ok(self.state.lock().head);
        };
        let context = TransactionContext {
            root: first.key(),
            class_kind: first.class_kind(),
        };
        let operations = things
            .into_iter()
            .map(|thing| Operation {
                kind: OperationKind::Create,
                key: thing.key(),
                thing,
                original_revision: None,
            })
            .collect();
        let receipt = self.apply(&OperationSet::new(context, operations))?;
        Ok(receipt.revision)
    }

    /// Make the next commit fail with `error` without touching the store
    pub fn fail_next(&self, error: RemoteError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Number of commit calls received, failed ones included
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    pub fn get(&self, key: &IdentityKey) -> Option<Thing> {
        self.state.lock().things.get(key).cloned()
    }

    fn apply(&self, set: &OperationSet) -> Result<CommitReceipt, RemoteError> {
        let mut state = self.state.lock();
        let plan = {
            let things = &state.things;
            plan_commit(state.head, set, |key| Ok(things.get(&key).cloned()))?
        };

        for outcome in &plan.outcomes {
            let key = outcome.thing.key();
            match outcome.kind {
                OperationKind::Delete => {
                    state.things.remove(&key);
                }
                OperationKind::Create | OperationKind::Update => {
                    state.things.insert(key, outcome.thing.clone());
                }
            }
            state.log.push(RemoteChange {
                revision: plan.revision,
                kind: outcome.kind,
                thing: outcome.thing.clone(),
            });
        }
        state.head = plan.revision;

        Ok(CommitReceipt {
            revision: plan.revision,
            outcomes: plan.outcomes,
        })
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl Remote for MemoryRemote {
    async fn fetch(&self) -> Result<Snapshot, RemoteError> {
        self.delay().await;
        let state = self.state.lock();
        Ok(Snapshot {
            revision: state.head,
            things: state.things.values().cloned().collect(),
        })
    }

    async fn fetch_thing(&self, key: IdentityKey) -> Result<Option<Thing>, RemoteError> {
        self.delay().await;
        Ok(self.get(&key))
    }

    async fn commit(&self, set: &OperationSet) -> Result<CommitReceipt, RemoteError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        self.apply(set)
    }

    async fn changes_since(&self, revision: u64) -> Result<Vec<RemoteChange>, RemoteError> {
        self.delay().await;
        let state = self.state.lock();
        Ok(state
            .log
            .iter()
            .filter(|change| change.revision > revision)
            .cloned()
            .collect())
    }
}
