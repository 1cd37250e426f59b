//! Remote store collaborator
//!
//! The [`Remote`] trait is the session's only view of the authoritative
//! store. Two implementations live here: [`MemoryRemote`] for tests and
//! embedding, and [`SqliteRemote`] for the on-disk project store used by the
//! CLI. Both validate and apply commits through [`plan_commit`], so they
//! agree on conflict and validation rules.

mod memory;
mod sqlite;

pub use memory::MemoryRemote;
pub use sqlite::SqliteRemote;

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identity::{IdentityKey, ThingId};
use crate::core::operation::{OperationKind, OperationSet};
use crate::core::thing::Thing;

/// Full store contents at one head revision
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub revision: u64,
    pub things: Vec<Thing>,
}

/// Canonical post-commit state of one operation's target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitOutcome {
    pub kind: OperationKind,
    pub thing: Thing,
}

/// Result of a successful commit, outcomes in operation order
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    pub revision: u64,
    pub outcomes: Vec<CommitOutcome>,
}

/// One entry of the store's change log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChange {
    pub revision: u64,
    pub kind: OperationKind,
    pub thing: Thing,
}

/// The authoritative store, as seen by a session
#[async_trait]
pub trait Remote: Send + Sync {
    /// Everything in the store, with the current head revision
    async fn fetch(&self) -> Result<Snapshot, RemoteError>;

    /// One thing by cache key; `None` when it does not exist
    async fn fetch_thing(&self, key: IdentityKey) -> Result<Option<Thing>, RemoteError>;

    /// Durably apply an operation set, all or nothing
    async fn commit(&self, set: &OperationSet) -> Result<CommitReceipt, RemoteError>;

    /// Changes committed after `revision`, oldest first
    async fn changes_since(&self, revision: u64) -> Result<Vec<RemoteChange>, RemoteError>;
}

/// Errors reported by the remote store
#[derive(Debug, Error, Diagnostic)]
pub enum RemoteError {
    #[error("conflict on {id}: {reason}")]
    #[diagnostic(
        code(tts::remote::conflict),
        help("the thing changed since it was loaded; refresh and edit it in a new transaction")
    )]
    Conflict { id: ThingId, reason: String },

    #[error("forbidden: {0}")]
    #[diagnostic(code(tts::remote::forbidden))]
    Forbidden(String),

    #[error("transport error: {0}")]
    #[diagnostic(code(tts::remote::transport))]
    Transport(String),

    #[error("validation failed: {0}")]
    #[diagnostic(code(tts::remote::validation))]
    Validation(String),
}

impl From<rusqlite::Error> for RemoteError {
    fn from(e: rusqlite::Error) -> Self {
        RemoteError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(e: serde_json::Error) -> Self {
        RemoteError::Transport(format!("malformed stored thing: {}", e))
    }
}

/// Validated writes of one commit
#[derive(Debug)]
pub(crate) struct CommitPlan {
    pub revision: u64,
    pub outcomes: Vec<CommitOutcome>,
}

/// Store state seen through the pending writes of a commit
struct View<F> {
    overlay: HashMap<IdentityKey, Option<Thing>>,
    lookup: F,
}

impl<F> View<F>
where
    F: FnMut(IdentityKey) -> Result<Option<Thing>, RemoteError>,
{
    fn get(&mut self, key: IdentityKey) -> Result<Option<Thing>, RemoteError> {
        match self.overlay.get(&key) {
            Some(pending) => Ok(pending.clone()),
            None => (self.lookup)(key),
        }
    }

    /// A written thing must sit in an allowed, existing container that lists
    /// it, and every child it lists must point back at it
    fn check_write(&mut self, thing: &Thing) -> Result<(), RemoteError> {
        let id = thing.id();
        let kind = thing.class_kind();
        match thing.container() {
            None if kind.is_top_level() => {}
            None => {
                return Err(RemoteError::Validation(format!(
                    "{} {} has no container",
                    kind, id
                )))
            }
            Some(container_ref) => {
                if !kind.allows_container(container_ref.class_kind) {
                    return Err(RemoteError::Validation(format!(
                        "{} cannot be contained by {}",
                        kind, container_ref.class_kind
                    )));
                }
                let container = self.get(container_ref.key(thing.scope()))?.ok_or_else(|| {
                    RemoteError::Validation(format!(
                        "container {} of {} {} does not exist",
                        container_ref.id, kind, id
                    ))
                })?;
                if container.class_kind() != container_ref.class_kind {
                    return Err(RemoteError::Validation(format!(
                        "container {} is a {}, not a {}",
                        container_ref.id,
                        container.class_kind(),
                        container_ref.class_kind
                    )));
                }
                if !container.data.child_ids().contains(&id) {
                    return Err(RemoteError::Validation(format!(
                        "container {} does not list {} {}",
                        container_ref.id, kind, id
                    )));
                }
                if thing.scope() != container.child_scope() {
                    return Err(RemoteError::Validation(format!(
                        "{} {} is not in its container's iteration",
                        kind, id
                    )));
                }
            }
        }

        for child in thing.data.child_ids() {
            let contained = self
                .get(thing.child_key(child))?
                .and_then(|child| child.container())
                .is_some_and(|container| container.id == id);
            if !contained {
                return Err(RemoteError::Validation(format!(
                    "{} {} lists {} which it does not contain",
                    kind, id, child
                )));
            }
        }
        Ok(())
    }

    /// A deleted thing may leave neither children nor a listing behind
    fn check_delete(&mut self, stored: &Thing) -> Result<(), RemoteError> {
        let id = stored.id();
        for child in stored.data.child_ids() {
            if self.get(stored.child_key(child))?.is_some() {
                return Err(RemoteError::Validation(format!(
                    "deleting {} {} would orphan {}",
                    stored.class_kind(),
                    id,
                    child
                )));
            }
        }
        if let Some(container_ref) = stored.container() {
            if let Some(container) = self.get(container_ref.key(stored.scope()))? {
                if container.data.child_ids().contains(&id) {
                    return Err(RemoteError::Validation(format!(
                        "container {} still lists deleted {}",
                        container_ref.id, id
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Validate `set` against the store and compute its writes
///
/// `head` is the current store revision and `lookup` reads the stored state
/// of one thing by cache key, so an id may exist once per iteration. Every
/// written thing gets revision `head + 1`. Revision mismatches and creates
/// of existing keys are conflicts; anything that would leave the graph
/// inconsistent is a validation error.
pub(crate) fn plan_commit<F>(
    head: u64,
    set: &OperationSet,
    lookup: F,
) -> Result<CommitPlan, RemoteError>
where
    F: FnMut(IdentityKey) -> Result<Option<Thing>, RemoteError>,
{
    let revision = head + 1;
    let mut view = View {
        overlay: HashMap::new(),
        lookup,
    };
    let mut seen = HashSet::new();
    let mut outcomes = Vec::with_capacity(set.len());
    let mut deleted = Vec::new();

    for op in set.iter() {
        let id = op.thing.id();
        if id.is_unassigned() {
            return Err(RemoteError::Validation(format!(
                "{} of a {} without an id",
                op.kind,
                op.class_kind()
            )));
        }
        let key = op.thing.key();
        if op.key != key {
            return Err(RemoteError::Validation(format!(
                "operation on {} carries a thing keyed {}",
                op.key, key
            )));
        }
        if !seen.insert(key) {
            return Err(RemoteError::Validation(format!(
                "{} appears more than once in one commit",
                key
            )));
        }

        let stored = view.get(key)?;
        match (op.kind, stored) {
            (OperationKind::Create, Some(_)) => {
                return Err(RemoteError::Conflict {
                    id,
                    reason: "it already exists".to_string(),
                })
            }
            (OperationKind::Create, None) => {}
            (OperationKind::Update | OperationKind::Delete, None) => {
                return Err(RemoteError::Conflict {
                    id,
                    reason: "it no longer exists".to_string(),
                })
            }
            (OperationKind::Update | OperationKind::Delete, Some(current)) => {
                if op.original_revision != Some(current.revision()) {
                    return Err(RemoteError::Conflict {
                        id,
                        reason: format!(
                            "edited from revision {} but the store has revision {}",
                            op.original_revision.unwrap_or_default(),
                            current.revision()
                        ),
                    });
                }
                if current.class_kind() != op.class_kind() {
                    return Err(RemoteError::Validation(format!(
                        "{} cannot change kind from {} to {}",
                        id,
                        current.class_kind(),
                        op.class_kind()
                    )));
                }
                if op.kind == OperationKind::Delete {
                    deleted.push(current);
                }
            }
        }

        let mut written = op.thing.clone();
        written.set_revision(revision);
        let pending = (op.kind != OperationKind::Delete).then(|| written.clone());
        view.overlay.insert(key, pending);
        outcomes.push(CommitOutcome {
            kind: op.kind,
            thing: written,
        });
    }

    for outcome in &outcomes {
        if outcome.kind != OperationKind::Delete {
            view.check_write(&outcome.thing)?;
        }
    }
    for stored in &deleted {
        view.check_delete(stored)?;
    }

    Ok(CommitPlan { revision, outcomes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{ClassKind, IdentityKey};
    use crate::core::operation::{Operation, TransactionContext};
    use crate::core::thing::ThingData;
    use std::collections::BTreeMap;

    fn set_of(ops: Vec<(OperationKind, Thing, Option<u64>)>) -> OperationSet {
        let context = TransactionContext {
            root: IdentityKey::new(ops[0].1.id()),
            class_kind: ops[0].1.class_kind(),
        };
        OperationSet::new(
            context,
            ops.into_iter()
                .map(|(kind, thing, original_revision)| Operation {
                    kind,
                    key: thing.key(),
                    thing,
                    original_revision,
                })
                .collect(),
        )
    }

    fn glossary_with_term() -> (Thing, Thing, Thing) {
        let mut rdl = Thing::with_id(
            ThingId::new(),
            ThingData::empty(ClassKind::SiteReferenceDataLibrary),
        );
        let mut glossary =
            Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Glossary)).contained_by(&rdl);
        let term = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Term))
            .contained_by(&glossary);
        rdl.data
            .insert_child(ClassKind::Glossary, glossary.id())
            .unwrap();
        glossary.data.insert_child(ClassKind::Term, term.id()).unwrap();
        (rdl, glossary, term)
    }

    fn store(things: &[Thing]) -> BTreeMap<IdentityKey, Thing> {
        things
            .iter()
            .map(|t| (t.key(), t.clone().with_revision(1)))
            .collect()
    }

    #[test]
    fn test_creates_in_any_order_validate_against_final_state() {
        let (rdl, glossary, term) = glossary_with_term();
        let set = set_of(vec![
            (OperationKind::Create, term, None),
            (OperationKind::Create, glossary, None),
            (OperationKind::Create, rdl, None),
        ]);

        let plan = plan_commit(0, &set, |_| Ok(None)).unwrap();
        assert_eq!(plan.revision, 1);
        assert!(plan.outcomes.iter().all(|o| o.thing.revision() == 1));
    }

    #[test]
    fn test_missing_container_is_validation_error() {
        let (_, glossary, _) = glossary_with_term();
        let set = set_of(vec![(OperationKind::Create, glossary, None)]);
        let err = plan_commit(0, &set, |_| Ok(None)).unwrap_err();
        assert!(matches!(err, RemoteError::Validation(_)));
    }

    #[test]
    fn test_revision_mismatch_is_conflict() {
        let (rdl, glossary, term) = glossary_with_term();
        let stored = store(&[rdl, glossary.clone(), term]);

        let set = set_of(vec![(OperationKind::Update, glossary, Some(0))]);
        let err = plan_commit(1, &set, |key| Ok(stored.get(&key).cloned())).unwrap_err();
        assert!(matches!(err, RemoteError::Conflict { .. }));
    }

    #[test]
    fn test_create_existing_is_conflict() {
        let (rdl, glossary, term) = glossary_with_term();
        let stored = store(&[rdl.clone(), glossary, term]);

        let set = set_of(vec![(OperationKind::Create, rdl, None)]);
        let err = plan_commit(1, &set, |key| Ok(stored.get(&key).cloned())).unwrap_err();
        assert!(matches!(err, RemoteError::Conflict { .. }));
    }

    #[test]
    fn test_delete_that_orphans_is_rejected() {
        let (rdl, glossary, term) = glossary_with_term();
        let stored = store(&[rdl.clone(), glossary.clone(), term]);

        let mut rdl_without = rdl.clone().with_revision(1);
        rdl_without.data.remove_child(glossary.id());
        let set = set_of(vec![
            (OperationKind::Update, rdl_without, Some(1)),
            (OperationKind::Delete, glossary, Some(1)),
        ]);
        let err = plan_commit(1, &set, |key| Ok(stored.get(&key).cloned())).unwrap_err();
        assert!(err.to_string().contains("orphan"));
    }

    #[test]
    fn test_delete_with_children_and_unlinked_container() {
        let (rdl, glossary, term) = glossary_with_term();
        let stored = store(&[rdl.clone(), glossary.clone(), term.clone()]);

        let mut rdl_without = rdl.clone().with_revision(1);
        rdl_without.data.remove_child(glossary.id());
        let set = set_of(vec![
            (OperationKind::Update, rdl_without, Some(1)),
            (OperationKind::Delete, term, Some(1)),
            (OperationKind::Delete, glossary, Some(1)),
        ]);
        let plan = plan_commit(1, &set, |key| Ok(stored.get(&key).cloned())).unwrap();
        assert_eq!(plan.revision, 2);
        assert_eq!(plan.outcomes.len(), 3);
    }

    #[test]
    fn test_same_id_in_two_iterations() {
        let mut model =
            Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::EngineeringModel));
        let mut first = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Iteration))
            .contained_by(&model);
        let mut second = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Iteration))
            .contained_by(&model);
        model.data.insert_child(ClassKind::Iteration, first.id()).unwrap();
        model.data.insert_child(ClassKind::Iteration, second.id()).unwrap();

        let shared = ThingId::new();
        let in_first = Thing::with_id(shared, ThingData::empty(ClassKind::ElementDefinition))
            .contained_by(&first);
        let in_second = Thing::with_id(shared, ThingData::empty(ClassKind::ElementDefinition))
            .contained_by(&second);
        first.data.insert_child(ClassKind::ElementDefinition, shared).unwrap();
        second.data.insert_child(ClassKind::ElementDefinition, shared).unwrap();
        assert_ne!(in_first.key(), in_second.key());

        let set = set_of(vec![
            (OperationKind::Create, model, None),
            (OperationKind::Create, first, None),
            (OperationKind::Create, second, None),
            (OperationKind::Create, in_first, None),
            (OperationKind::Create, in_second.clone(), None),
        ]);
        let plan = plan_commit(0, &set, |_| Ok(None)).unwrap();
        assert_eq!(plan.outcomes.len(), 5);

        // the same key twice is still rejected
        let twice = set_of(vec![
            (OperationKind::Create, in_second.clone(), None),
            (OperationKind::Create, in_second, None),
        ]);
        let err = plan_commit(0, &twice, |_| Ok(None)).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }
}
