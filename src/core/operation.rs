//! Operations and operation sets: the submission unit sent to the remote store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

use crate::core::identity::{ClassKind, IdentityKey};
use crate::core::thing::{ContainerRef, Thing};

/// Kind of a staged operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "create"),
            OperationKind::Update => write!(f, "update"),
            OperationKind::Delete => write!(f, "delete"),
        }
    }
}

/// One create, update, or delete of a thing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OperationKind,
    pub key: IdentityKey,
    /// State to write (for deletes, the last known state)
    pub thing: Thing,
    /// Revision the edit was based on; absent for creates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_revision: Option<u64>,
}

impl Operation {
    pub fn class_kind(&self) -> ClassKind {
        self.thing.class_kind()
    }

    pub fn container(&self) -> Option<ContainerRef> {
        self.thing.container()
    }
}

/// Root a transaction was opened on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    pub root: IdentityKey,
    pub class_kind: ClassKind,
}

/// Ordered operations produced by finalizing one transaction
///
/// Creates and updates come first, in dependency order; deletes follow,
/// children before their containers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationSet {
    pub id: Ulid,
    pub context: TransactionContext,
    pub created: DateTime<Utc>,
    pub operations: Vec<Operation>,
}

impl OperationSet {
    pub fn new(context: TransactionContext, operations: Vec<Operation>) -> Self {
        Self {
            id: Ulid::new(),
            context,
            created: Utc::now(),
            operations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }

    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }
}
