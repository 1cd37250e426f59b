//! Thing - the graph node stored in the cache
//!
//! A thing has a stable id, a revision, a non-owning reference to its
//! container, and kind-specific content. Child collections and reference
//! fields hold ids only; they are resolved through the cache, so a node never
//! owns another node in memory and reference cycles cannot form.

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::identity::{ClassKind, IdentityKey, ThingId};
use crate::entities::model::{
    ElementDefinition, ElementUsage, EngineeringModel, Iteration, Parameter,
};
use crate::entities::rdl::{
    Category, Glossary, MeasurementScale, ParameterType, SiteReferenceDataLibrary, Term,
};
use crate::entities::requirement::{Requirement, RequirementsSpecification};

/// Behaviour shared by every kind-specific content struct
pub trait Content {
    /// The kind this content belongs to
    const KIND: ClassKind;

    /// Human-readable label (usually the name)
    fn label(&self) -> String;

    /// Ids of owned children, in collection order
    fn child_ids(&self) -> Vec<ThingId> {
        Vec::new()
    }

    /// Ids held by reference fields
    fn reference_ids(&self) -> Vec<ThingId> {
        Vec::new()
    }

    /// Add a child of the given kind to the matching collection
    fn insert_child(&mut self, kind: ClassKind, _id: ThingId) -> Result<(), ThingError> {
        Err(ThingError::NotAContainer {
            kind: Self::KIND,
            child: kind,
        })
    }

    /// Remove a child from whichever collection holds it
    fn remove_child(&mut self, _id: ThingId) -> bool {
        false
    }

    /// Set a scalar attribute by field name
    fn set_attribute(&mut self, field: &str, _value: &str) -> Result<(), ThingError> {
        Err(ThingError::UnknownField {
            kind: Self::KIND,
            field: field.to_string(),
        })
    }

    /// Point a reference field at `target`
    ///
    /// Single-valued fields are replaced, multi-valued fields gain the target.
    fn set_reference(&mut self, field: &str, _target: ThingId) -> Result<(), ThingError> {
        Err(ThingError::UnknownField {
            kind: Self::KIND,
            field: field.to_string(),
        })
    }
}

/// Kind-specific content of a thing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class_kind", rename_all = "kebab-case")]
pub enum ThingData {
    SiteReferenceDataLibrary(SiteReferenceDataLibrary),
    Category(Category),
    ParameterType(ParameterType),
    MeasurementScale(MeasurementScale),
    Glossary(Glossary),
    Term(Term),
    EngineeringModel(EngineeringModel),
    Iteration(Iteration),
    ElementDefinition(ElementDefinition),
    ElementUsage(ElementUsage),
    Parameter(Parameter),
    RequirementsSpecification(RequirementsSpecification),
    Requirement(Requirement),
}

macro_rules! dispatch {
    ($data:expr, $inner:ident => $body:expr) => {
        match $data {
            ThingData::SiteReferenceDataLibrary($inner) => $body,
            ThingData::Category($inner) => $body,
            ThingData::ParameterType($inner) => $body,
            ThingData::MeasurementScale($inner) => $body,
            ThingData::Glossary($inner) => $body,
            ThingData::Term($inner) => $body,
            ThingData::EngineeringModel($inner) => $body,
            ThingData::Iteration($inner) => $body,
            ThingData::ElementDefinition($inner) => $body,
            ThingData::ElementUsage($inner) => $body,
            ThingData::Parameter($inner) => $body,
            ThingData::RequirementsSpecification($inner) => $body,
            ThingData::Requirement($inner) => $body,
        }
    };
}

impl ThingData {
    pub fn class_kind(&self) -> ClassKind {
        match self {
            ThingData::SiteReferenceDataLibrary(_) => ClassKind::SiteReferenceDataLibrary,
            ThingData::Category(_) => ClassKind::Category,
            ThingData::ParameterType(_) => ClassKind::ParameterType,
            ThingData::MeasurementScale(_) => ClassKind::MeasurementScale,
            ThingData::Glossary(_) => ClassKind::Glossary,
            ThingData::Term(_) => ClassKind::Term,
            ThingData::EngineeringModel(_) => ClassKind::EngineeringModel,
            ThingData::Iteration(_) => ClassKind::Iteration,
            ThingData::ElementDefinition(_) => ClassKind::ElementDefinition,
            ThingData::ElementUsage(_) => ClassKind::ElementUsage,
            ThingData::Parameter(_) => ClassKind::Parameter,
            ThingData::RequirementsSpecification(_) => ClassKind::RequirementsSpecification,
            ThingData::Requirement(_) => ClassKind::Requirement,
        }
    }

    pub fn label(&self) -> String {
        dispatch!(self, inner => inner.label())
    }

    pub fn child_ids(&self) -> Vec<ThingId> {
        dispatch!(self, inner => inner.child_ids())
    }

    pub fn reference_ids(&self) -> Vec<ThingId> {
        dispatch!(self, inner => inner.reference_ids())
    }

    pub fn insert_child(&mut self, kind: ClassKind, id: ThingId) -> Result<(), ThingError> {
        dispatch!(self, inner => inner.insert_child(kind, id))
    }

    pub fn remove_child(&mut self, id: ThingId) -> bool {
        dispatch!(self, inner => inner.remove_child(id))
    }

    pub fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        dispatch!(self, inner => inner.set_attribute(field, value))
    }

    pub fn set_reference(&mut self, field: &str, target: ThingId) -> Result<(), ThingError> {
        dispatch!(self, inner => inner.set_reference(field, target))
    }

    /// Empty content of the given kind
    pub fn empty(kind: ClassKind) -> Self {
        match kind {
            ClassKind::SiteReferenceDataLibrary => {
                ThingData::SiteReferenceDataLibrary(Default::default())
            }
            ClassKind::Category => ThingData::Category(Default::default()),
            ClassKind::ParameterType => ThingData::ParameterType(Default::default()),
            ClassKind::MeasurementScale => ThingData::MeasurementScale(Default::default()),
            ClassKind::Glossary => ThingData::Glossary(Default::default()),
            ClassKind::Term => ThingData::Term(Default::default()),
            ClassKind::EngineeringModel => ThingData::EngineeringModel(Default::default()),
            ClassKind::Iteration => ThingData::Iteration(Default::default()),
            ClassKind::ElementDefinition => ThingData::ElementDefinition(Default::default()),
            ClassKind::ElementUsage => ThingData::ElementUsage(Default::default()),
            ClassKind::Parameter => ThingData::Parameter(Default::default()),
            ClassKind::RequirementsSpecification => {
                ThingData::RequirementsSpecification(Default::default())
            }
            ClassKind::Requirement => ThingData::Requirement(Default::default()),
        }
    }
}

/// Non-owning back-reference from a thing to its container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerRef {
    pub id: ThingId,
    pub class_kind: ClassKind,
}

impl ContainerRef {
    /// Cache key of the container, seen from a child in `scope`
    pub fn key(&self, scope: Option<ThingId>) -> IdentityKey {
        match scope {
            Some(scope) if self.class_kind.is_scoped() => IdentityKey::scoped(self.id, scope),
            _ => IdentityKey::new(self.id),
        }
    }
}

/// A node of the domain graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thing {
    id: ThingId,
    #[serde(default)]
    revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    container: Option<ContainerRef>,
    /// Iteration the thing belongs to, for iteration-scoped kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<ThingId>,
    pub data: ThingData,
}

impl Thing {
    /// A new thing with an unassigned id, ready to be staged for creation
    pub fn new(data: ThingData) -> Self {
        Self {
            id: ThingId::UNASSIGNED,
            revision: 0,
            container: None,
            scope: None,
            data,
        }
    }

    /// A thing with a known id (fixtures and remote payloads)
    pub fn with_id(id: ThingId, data: ThingData) -> Self {
        Self {
            id,
            ..Self::new(data)
        }
    }

    /// Set the revision; used by remote stores when they canonicalize a write
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Place this thing inside `parent`, inheriting the parent's scope
    pub fn contained_by(mut self, parent: &Thing) -> Self {
        self.container = Some(ContainerRef {
            id: parent.id,
            class_kind: parent.class_kind(),
        });
        self.scope = parent.child_scope();
        self
    }

    pub fn id(&self) -> ThingId {
        self.id
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn class_kind(&self) -> ClassKind {
        self.data.class_kind()
    }

    pub fn container(&self) -> Option<ContainerRef> {
        self.container
    }

    pub fn scope(&self) -> Option<ThingId> {
        self.scope
    }

    /// Cache key of this thing
    pub fn key(&self) -> IdentityKey {
        if self.class_kind().is_scoped() {
            if let Some(scope) = self.scope {
                return IdentityKey::scoped(self.id, scope);
            }
        }
        IdentityKey::new(self.id)
    }

    /// Cache key of the container, if any
    pub fn container_key(&self) -> Option<IdentityKey> {
        self.container.map(|c| c.key(self.scope))
    }

    /// Scope that children of this thing carry
    pub fn child_scope(&self) -> Option<ThingId> {
        match self.class_kind() {
            ClassKind::Iteration => Some(self.id),
            kind if kind.is_scoped() => self.scope,
            _ => None,
        }
    }

    /// Cache key of a child of this thing
    pub fn child_key(&self, child: ThingId) -> IdentityKey {
        match self.child_scope() {
            Some(scope) => IdentityKey::scoped(child, scope),
            None => IdentityKey::new(child),
        }
    }

    pub fn label(&self) -> String {
        self.data.label()
    }

    /// Ids this thing depends on: owned children and reference targets
    ///
    /// The container back-reference is deliberately absent.
    pub fn dependencies(&self) -> Vec<ThingId> {
        let mut ids = self.data.child_ids();
        ids.extend(self.data.reference_ids());
        ids
    }

    pub(crate) fn assign_id(&mut self, id: ThingId) {
        self.id = id;
    }

    pub(crate) fn set_revision(&mut self, revision: u64) {
        self.revision = revision;
    }
}

/// Errors raised when editing thing content
#[derive(Debug, Error, Diagnostic)]
pub enum ThingError {
    #[error("{kind} has no field '{field}'")]
    #[diagnostic(code(tts::thing::unknown_field))]
    UnknownField { kind: ClassKind, field: String },

    #[error("invalid value '{value}' for field '{field}': {reason}")]
    #[diagnostic(code(tts::thing::invalid_value))]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("{kind} cannot contain {child}")]
    #[diagnostic(code(tts::thing::not_a_container))]
    NotAContainer { kind: ClassKind, child: ClassKind },
}
