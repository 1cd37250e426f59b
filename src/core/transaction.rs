//! Transaction: clone-based optimistic edit scope
//!
//! A transaction is opened on a root thing. Things are edited as private
//! clones held in the transaction's clone table; the cached originals are
//! never touched. `create_or_update` and `delete` stage operations, and
//! [`Transaction::finalize`] turns them into an ordered [`OperationSet`]
//! ready for submission. A transaction is consumed by `finalize`, so it
//! cannot be submitted twice.

use std::collections::{BTreeSet, HashMap, HashSet};

use miette::Diagnostic;
use thiserror::Error;

use crate::core::identity::{IdentityKey, ThingId};
use crate::core::operation::{Operation, OperationKind, OperationSet, TransactionContext};
use crate::core::thing::{Thing, ThingError};

#[derive(Debug, Clone)]
struct CloneEntry {
    thing: Thing,
    /// State when the clone was taken; `None` for things created here
    original: Option<Thing>,
}

impl CloneEntry {
    fn unchanged(&self) -> bool {
        self.original.as_ref() == Some(&self.thing)
    }
}

/// Clone table plus staged operations for one edit scope
#[derive(Debug)]
pub struct Transaction {
    context: TransactionContext,
    clones: HashMap<IdentityKey, CloneEntry>,
    /// Keys in the order they were first staged
    order: Vec<IdentityKey>,
    staged: HashMap<IdentityKey, OperationKind>,
}

impl Transaction {
    /// Open a transaction rooted at `root`, snapshotting it
    pub fn open(root: &Thing) -> Self {
        let mut tx = Self {
            context: TransactionContext {
                root: root.key(),
                class_kind: root.class_kind(),
            },
            clones: HashMap::new(),
            order: Vec::new(),
            staged: HashMap::new(),
        };
        tx.snapshot(root);
        tx
    }

    pub fn context(&self) -> TransactionContext {
        self.context
    }

    /// Editable copy of the root
    pub fn root(&self) -> Option<Thing> {
        self.get_clone(&self.context.root).cloned()
    }

    /// Take an editable copy of `thing`
    ///
    /// The first snapshot of a key records its revision as the pre-edit
    /// revision; later snapshots return the transaction's current clone,
    /// including edits already staged.
    pub fn snapshot(&mut self, thing: &Thing) -> Thing {
        self.clones
            .entry(thing.key())
            .or_insert_with(|| CloneEntry {
                thing: thing.clone(),
                original: Some(thing.clone()),
            })
            .thing
            .clone()
    }

    pub fn get_clone(&self, key: &IdentityKey) -> Option<&Thing> {
        self.clones.get(key).map(|entry| &entry.thing)
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    fn stage(&mut self, key: IdentityKey, kind: OperationKind) {
        if self.staged.insert(key, kind).is_none() {
            self.order.push(key);
        }
    }

    fn unstage(&mut self, key: &IdentityKey) {
        self.staged.remove(key);
        self.order.retain(|k| k != key);
    }

    fn staged_as(&self, key: &IdentityKey, kind: OperationKind) -> bool {
        self.staged.get(key) == Some(&kind)
    }

    /// Drop a staged update whose clone is back to its snapshot
    fn unstage_if_unchanged(&mut self, key: &IdentityKey) {
        let unchanged = self.clones.get(key).is_some_and(CloneEntry::unchanged);
        if unchanged && self.staged_as(key, OperationKind::Update) {
            self.unstage(key);
            tracing::trace!(%key, "update no longer changes anything");
        }
    }

    /// Undo a staged create: unlink it from its container and forget it
    ///
    /// A container update that only existed to list the created thing is
    /// unstaged with it.
    fn cancel_create(&mut self, key: &IdentityKey) -> Result<(), TransactionError> {
        let Some(created) = self.get_clone(key).cloned() else {
            return Ok(());
        };
        let id = created.id();
        self.edit_container(&created, |container| Ok(container.data.remove_child(id)))?;
        self.unstage(key);
        self.clones.remove(key);
        if let Some(container_key) = created.container_key() {
            self.unstage_if_unchanged(&container_key);
        }
        tracing::trace!(%key, "create cancelled");
        Ok(())
    }

    /// Apply `edit` to the container clone of `child`, staging an update of
    /// the container when `edit` reports a change
    ///
    /// Nothing happens for top-level things or when the container is itself
    /// being deleted.
    fn edit_container<F>(&mut self, child: &Thing, edit: F) -> Result<(), TransactionError>
    where
        F: FnOnce(&mut Thing) -> Result<bool, ThingError>,
    {
        let Some(container_key) = child.container_key() else {
            return Ok(());
        };
        if self.staged_as(&container_key, OperationKind::Delete) {
            return Ok(());
        }
        let entry = self
            .clones
            .get_mut(&container_key)
            .ok_or(TransactionError::UnknownEntity { key: container_key })?;

        if edit(&mut entry.thing)? && !self.staged.contains_key(&container_key) {
            self.stage(container_key, OperationKind::Update);
        }
        Ok(())
    }

    /// Stage a create or an update of `thing`
    ///
    /// A thing with an unassigned id is staged as a create and gets its id
    /// here; it is also linked into its container's clone, which must be
    /// part of the transaction. Any other thing must already be in the clone
    /// table and is staged as an update.
    pub fn create_or_update(&mut self, mut thing: Thing) -> Result<IdentityKey, TransactionError> {
        if thing.id().is_unassigned() {
            thing.assign_id(ThingId::new());
            let key = thing.key();
            let (kind, id) = (thing.class_kind(), thing.id());
            self.edit_container(&thing, |container| {
                container.data.insert_child(kind, id)?;
                Ok(true)
            })?;
            self.clones.insert(
                key,
                CloneEntry {
                    thing,
                    original: None,
                },
            );
            self.stage(key, OperationKind::Create);
            tracing::trace!(%key, %kind, "staged create");
            return Ok(key);
        }

        let key = thing.key();
        match self.staged.get(&key).copied() {
            Some(OperationKind::Delete) => Err(TransactionError::AlreadyDeleted { key }),
            Some(OperationKind::Create) | Some(OperationKind::Update) => {
                if let Some(entry) = self.clones.get_mut(&key) {
                    entry.thing = thing;
                }
                Ok(key)
            }
            None => {
                let entry = self
                    .clones
                    .get_mut(&key)
                    .ok_or(TransactionError::UnknownEntity { key })?;
                entry.thing = thing;
                self.stage(key, OperationKind::Update);
                tracing::trace!(%key, "staged update");
                Ok(key)
            }
        }
    }

    /// Stage the deletion of `thing`
    ///
    /// Deleting a thing created in this transaction cancels its create, so
    /// the pair leaves nothing to submit. Otherwise the thing is unlinked
    /// from its container's clone, which must be part of the transaction
    /// unless it is being deleted as well.
    pub fn delete(&mut self, thing: &Thing) -> Result<(), TransactionError> {
        let key = thing.key();
        if thing.id().is_unassigned() {
            return Err(TransactionError::UnknownEntity { key });
        }

        match self.staged.get(&key).copied() {
            Some(OperationKind::Delete) => Err(TransactionError::AlreadyDeleted { key }),
            Some(OperationKind::Create) => self.cancel_create(&key),
            Some(OperationKind::Update) | None => {
                let id = thing.id();
                self.edit_container(thing, |container| Ok(container.data.remove_child(id)))?;
                self.snapshot(thing);
                self.stage(key, OperationKind::Delete);
                tracing::trace!(%key, "staged delete");
                Ok(())
            }
        }
    }

    fn keys_staged_as(&self, kind: OperationKind) -> Vec<IdentityKey> {
        self.order
            .iter()
            .filter(|key| self.staged_as(key, kind))
            .copied()
            .collect()
    }

    /// Keys staged for creation, in staging order
    pub fn added(&self) -> Vec<IdentityKey> {
        self.keys_staged_as(OperationKind::Create)
    }

    /// Keys staged for update, in staging order
    pub fn updated(&self) -> Vec<IdentityKey> {
        self.keys_staged_as(OperationKind::Update)
    }

    /// Keys staged for deletion, in staging order
    pub fn deleted(&self) -> Vec<IdentityKey> {
        self.keys_staged_as(OperationKind::Delete)
    }

    /// Child transaction for a sub-dialog
    ///
    /// It sees the current clones but stages nothing until absorbed with
    /// [`Transaction::absorb`]; dropping it discards its edits.
    pub fn nested(&self) -> Transaction {
        Transaction {
            context: self.context,
            clones: self.clones.clone(),
            order: Vec::new(),
            staged: HashMap::new(),
        }
    }

    /// Merge a child transaction's clones and staged operations
    ///
    /// Fails without changing anything when the child edits a thing this
    /// transaction has staged for deletion.
    pub fn absorb(&mut self, child: Transaction) -> Result<(), TransactionError> {
        for key in &child.order {
            if child.staged.get(key) != Some(&OperationKind::Delete)
                && self.staged_as(key, OperationKind::Delete)
            {
                return Err(TransactionError::AlreadyDeleted { key: *key });
            }
        }

        let Transaction {
            clones: mut child_clones,
            order: child_order,
            staged: child_staged,
            ..
        } = child;

        for key in child_order {
            let Some(kind) = child_staged.get(&key).copied() else {
                continue;
            };
            let Some(entry) = child_clones.remove(&key) else {
                continue;
            };
            match (self.staged.get(&key).copied(), kind) {
                (Some(OperationKind::Create), OperationKind::Delete) => {
                    self.cancel_create(&key)?;
                }
                (Some(OperationKind::Delete), OperationKind::Delete) => {}
                (Some(OperationKind::Create), _) => {
                    self.clones.insert(key, entry);
                }
                (_, kind) => {
                    self.clones.insert(key, entry);
                    self.staged.insert(key, kind);
                    if !self.order.contains(&key) {
                        self.order.push(key);
                    }
                }
            }
        }

        // snapshots taken by the child become visible here too
        for (key, entry) in child_clones {
            self.clones.entry(key).or_insert(entry);
        }
        Ok(())
    }

    /// Consume the transaction into an ordered operation set
    ///
    /// Creates and updates come first, ordered so that a staged create
    /// precedes every create or update that lists it as a child or
    /// references it; ties keep staging order. Deletes follow, deepest
    /// containment first.
    pub fn finalize(self) -> Result<OperationSet, TransactionError> {
        let writes: Vec<IdentityKey> = self
            .order
            .iter()
            .filter(|key| !self.staged_as(key, OperationKind::Delete))
            .copied()
            .collect();
        let position: HashMap<IdentityKey, usize> =
            writes.iter().enumerate().map(|(i, key)| (*key, i)).collect();
        let created: HashMap<ThingId, usize> = writes
            .iter()
            .filter(|key| self.staged_as(key, OperationKind::Create))
            .map(|key| (key.id, position[key]))
            .collect();

        // edge dependency -> dependent: the dependency must be written first
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); writes.len()];
        let mut in_degree = vec![0usize; writes.len()];
        for (i, key) in writes.iter().enumerate() {
            let Some(entry) = self.clones.get(key) else {
                continue;
            };
            let mut seen = HashSet::new();
            for dep in entry.thing.dependencies() {
                if let Some(&j) = created.get(&dep) {
                    if j != i && seen.insert(j) {
                        dependents[j].push(i);
                        in_degree[i] += 1;
                    }
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..writes.len()).filter(|i| in_degree[*i] == 0).collect();
        let mut sorted = Vec::with_capacity(writes.len());
        while let Some(i) = ready.pop_first() {
            sorted.push(i);
            for &d in &dependents[i] {
                in_degree[d] -= 1;
                if in_degree[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if sorted.len() < writes.len() {
            // writes left over either sit on a cycle or only wait on one
            let remaining: HashSet<usize> =
                (0..writes.len()).filter(|i| in_degree[*i] > 0).collect();
            let mut cyclic: Vec<usize> = remaining
                .iter()
                .copied()
                .filter(|i| on_cycle(&dependents, &remaining, *i))
                .collect();
            cyclic.sort_unstable();
            let ids = cyclic.into_iter().map(|i| writes[i].id).collect();
            return Err(TransactionError::CyclicDependency { ids });
        }

        let mut deletes = self.deleted();
        deletes.sort_by_key(|key| std::cmp::Reverse(self.containment_depth(key)));

        let mut operations = Vec::with_capacity(self.order.len());
        for i in sorted {
            let key = writes[i];
            if let Some(operation) = self.operation(key) {
                operations.push(operation);
            }
        }
        for key in deletes {
            if let Some(operation) = self.operation(key) {
                operations.push(operation);
            }
        }

        tracing::debug!(
            root = %self.context.root,
            operations = operations.len(),
            "transaction finalized"
        );
        Ok(OperationSet::new(self.context, operations))
    }

    fn operation(&self, key: IdentityKey) -> Option<Operation> {
        let kind = *self.staged.get(&key)?;
        let entry = self.clones.get(&key)?;
        Some(Operation {
            kind,
            key,
            thing: entry.thing.clone(),
            original_revision: match kind {
                OperationKind::Create => None,
                OperationKind::Update | OperationKind::Delete => {
                    entry.original.as_ref().map(Thing::revision)
                }
            },
        })
    }

    /// Number of container hops from `key` to a thing outside the clone table
    fn containment_depth(&self, key: &IdentityKey) -> usize {
        let mut depth = 0;
        let mut current = self.clones.get(key);
        while let Some(entry) = current {
            let Some(container_key) = entry.thing.container_key() else {
                break;
            };
            depth += 1;
            if depth > self.clones.len() {
                break;
            }
            current = self.clones.get(&container_key);
        }
        depth
    }
}

/// Whether `start` can reach itself through writes still waiting
fn on_cycle(dependents: &[Vec<usize>], remaining: &HashSet<usize>, start: usize) -> bool {
    let next = |node: usize| {
        dependents[node]
            .iter()
            .copied()
            .filter(|d| remaining.contains(d))
            .collect::<Vec<_>>()
    };
    let mut stack = next(start);
    let mut visited = HashSet::new();
    while let Some(node) = stack.pop() {
        if node == start {
            return true;
        }
        if visited.insert(node) {
            stack.extend(next(node));
        }
    }
    false
}

fn join_ids(ids: &[ThingId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

/// Errors raised while staging or finalizing a transaction
#[derive(Debug, Error, Diagnostic)]
pub enum TransactionError {
    #[error("thing {key} is not part of this transaction")]
    #[diagnostic(
        code(tts::transaction::unknown_entity),
        help("snapshot the thing (or its container) into the transaction before editing it")
    )]
    UnknownEntity { key: IdentityKey },

    #[error("cyclic dependency among staged creates: {}", join_ids(.ids))]
    #[diagnostic(code(tts::transaction::cyclic_dependency))]
    CyclicDependency { ids: Vec<ThingId> },

    #[error("thing {key} is already staged for deletion")]
    #[diagnostic(code(tts::transaction::already_deleted))]
    AlreadyDeleted { key: IdentityKey },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Content(#[from] ThingError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::ClassKind;
    use crate::core::thing::ThingData;
    use crate::entities::requirement::Requirement;

    fn spec_with_iteration() -> (Thing, Thing) {
        let iteration = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Iteration))
            .with_revision(1);
        let spec = Thing::with_id(
            ThingId::new(),
            ThingData::empty(ClassKind::RequirementsSpecification),
        )
        .contained_by(&iteration)
        .with_revision(1);
        (iteration, spec)
    }

    fn new_requirement(spec: &Thing, name: &str) -> Thing {
        Thing::new(ThingData::Requirement(Requirement {
            name: name.to_string(),
            ..Default::default()
        }))
        .contained_by(spec)
    }

    #[test]
    fn test_create_assigns_id_and_links_container() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);

        let key = tx.create_or_update(new_requirement(&spec, "R1")).unwrap();
        assert!(!key.id.is_unassigned());
        assert_eq!(tx.added(), vec![key]);
        assert_eq!(tx.updated(), vec![spec.key()]);
        assert_eq!(tx.root().unwrap().data.child_ids(), vec![key.id]);
    }

    #[test]
    fn test_update_unknown_entity_fails() {
        let (iteration, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&iteration);

        let err = tx.create_or_update(spec.clone()).unwrap_err();
        assert!(matches!(err, TransactionError::UnknownEntity { key } if key == spec.key()));
    }

    #[test]
    fn test_create_without_container_clone_fails() {
        let (iteration, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&iteration);

        let err = tx.create_or_update(new_requirement(&spec, "R1")).unwrap_err();
        assert!(matches!(err, TransactionError::UnknownEntity { .. }));
        assert!(tx.is_empty());
    }

    #[test]
    fn test_update_carries_original_revision() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);
        let mut clone = tx.root().unwrap();
        clone.data.set_attribute("name", "Top level").unwrap();
        tx.create_or_update(clone).unwrap();

        let set = tx.finalize().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.operations[0].kind, OperationKind::Update);
        assert_eq!(set.operations[0].original_revision, Some(1));
    }

    #[test]
    fn test_create_then_delete_cancels() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);
        let key = tx.create_or_update(new_requirement(&spec, "R1")).unwrap();
        let created = tx.get_clone(&key).unwrap().clone();

        tx.delete(&created).unwrap();
        assert!(tx.added().is_empty());
        assert!(tx.deleted().is_empty());
        assert!(tx.updated().is_empty());
        assert!(tx.get_clone(&key).is_none());
        assert_eq!(tx.root().unwrap(), spec);

        let set = tx.finalize().unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_create_then_delete_keeps_own_container_edit() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);
        let mut root = tx.root().unwrap();
        root.data.set_attribute("name", "Top level").unwrap();
        tx.create_or_update(root).unwrap();

        let key = tx.create_or_update(new_requirement(&spec, "R1")).unwrap();
        let created = tx.get_clone(&key).unwrap().clone();
        tx.delete(&created).unwrap();

        let set = tx.finalize().unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.operations[0].key, spec.key());
        assert_eq!(set.operations[0].kind, OperationKind::Update);
        assert!(set.operations[0].thing.data.child_ids().is_empty());
    }

    #[test]
    fn test_create_then_delete_across_nested_transaction() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);
        let key = tx.create_or_update(new_requirement(&spec, "R1")).unwrap();

        let mut child = tx.nested();
        let created = child.get_clone(&key).unwrap().clone();
        child.delete(&created).unwrap();
        tx.absorb(child).unwrap();

        assert!(tx.is_empty());
        assert!(tx.finalize().unwrap().is_empty());
    }

    #[test]
    fn test_delete_twice_fails() {
        let (iteration, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&iteration);
        tx.snapshot(&spec);
        tx.delete(&spec).unwrap();

        let err = tx.delete(&spec).unwrap_err();
        assert!(matches!(err, TransactionError::AlreadyDeleted { .. }));
        let err = tx.create_or_update(spec.clone()).unwrap_err();
        assert!(matches!(err, TransactionError::AlreadyDeleted { .. }));
    }

    #[test]
    fn test_finalize_orders_referenced_create_first() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);

        // parent staged before its referenced child
        let parent_key = tx.create_or_update(new_requirement(&spec, "P")).unwrap();
        let child_key = tx.create_or_update(new_requirement(&spec, "C")).unwrap();
        let mut parent = tx.get_clone(&parent_key).unwrap().clone();
        parent.data.set_reference("categories", child_key.id).unwrap();
        tx.create_or_update(parent).unwrap();

        let set = tx.finalize().unwrap();
        let order: Vec<IdentityKey> = set.iter().map(|op| op.key).collect();
        let pos = |key| order.iter().position(|k| *k == key).unwrap();
        assert!(pos(child_key) < pos(parent_key));
        // the container lists both, so it comes after both
        assert!(pos(parent_key) < pos(spec.key()));
    }

    #[test]
    fn test_finalize_reports_cycle() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);

        let a = tx.create_or_update(new_requirement(&spec, "A")).unwrap();
        let b = tx.create_or_update(new_requirement(&spec, "B")).unwrap();
        let mut thing_a = tx.get_clone(&a).unwrap().clone();
        thing_a.data.set_reference("categories", b.id).unwrap();
        tx.create_or_update(thing_a).unwrap();
        let mut thing_b = tx.get_clone(&b).unwrap().clone();
        thing_b.data.set_reference("categories", a.id).unwrap();
        tx.create_or_update(thing_b).unwrap();

        match tx.finalize().unwrap_err() {
            TransactionError::CyclicDependency { ids } => {
                assert!(ids.contains(&a.id));
                assert!(ids.contains(&b.id));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_report_leaves_out_waiting_creates() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);

        let a = tx.create_or_update(new_requirement(&spec, "A")).unwrap();
        let b = tx.create_or_update(new_requirement(&spec, "B")).unwrap();
        let c = tx.create_or_update(new_requirement(&spec, "C")).unwrap();
        for (from, to) in [(a, b), (b, a), (c, a)] {
            let mut thing = tx.get_clone(&from).unwrap().clone();
            thing.data.set_reference("categories", to.id).unwrap();
            tx.create_or_update(thing).unwrap();
        }

        match tx.finalize().unwrap_err() {
            TransactionError::CyclicDependency { ids } => {
                assert_eq!(ids.len(), 2);
                assert!(ids.contains(&a.id));
                assert!(ids.contains(&b.id));
                assert!(!ids.contains(&c.id));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deletes_last_children_first() {
        let (iteration, spec) = spec_with_iteration();
        let requirement = Thing::with_id(ThingId::new(), ThingData::empty(ClassKind::Requirement))
            .contained_by(&spec)
            .with_revision(1);
        let mut iteration_data = iteration.clone();
        iteration_data
            .data
            .insert_child(ClassKind::RequirementsSpecification, spec.id())
            .unwrap();

        let mut tx = Transaction::open(&iteration_data);
        tx.snapshot(&spec);
        tx.snapshot(&requirement);
        tx.delete(&spec).unwrap();
        tx.delete(&requirement).unwrap();

        let set = tx.finalize().unwrap();
        let kinds: Vec<(OperationKind, ClassKind)> =
            set.iter().map(|op| (op.kind, op.class_kind())).collect();
        assert_eq!(
            kinds,
            vec![
                (OperationKind::Update, ClassKind::Iteration),
                (OperationKind::Delete, ClassKind::Requirement),
                (OperationKind::Delete, ClassKind::RequirementsSpecification),
            ]
        );
    }

    #[test]
    fn test_nested_transaction_absorb() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);

        let mut child = tx.nested();
        let key = child.create_or_update(new_requirement(&spec, "R1")).unwrap();
        assert!(tx.is_empty());

        tx.absorb(child).unwrap();
        assert_eq!(tx.added(), vec![key]);
        assert_eq!(tx.updated(), vec![spec.key()]);

        let mut discarded = tx.nested();
        let created = discarded.get_clone(&key).unwrap().clone();
        discarded.delete(&created).unwrap();
        drop(discarded);
        assert_eq!(tx.added(), vec![key]);
    }

    #[test]
    fn test_clone_isolation() {
        let (_, spec) = spec_with_iteration();
        let mut tx = Transaction::open(&spec);
        let mut clone = tx.snapshot(&spec);
        clone.data.set_attribute("name", "edited").unwrap();
        tx.create_or_update(clone).unwrap();
        drop(tx);

        assert_eq!(spec.label(), "requirements specification");
    }
}
