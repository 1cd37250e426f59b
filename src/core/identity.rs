//! Thing identity: UUID-based ids, class kinds, and cache identity keys

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Closed set of entity kinds known to the store
///
/// Every place that needs per-kind behaviour matches on this enum
/// exhaustively, so adding a kind is a compile error until it is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassKind {
    /// Site-wide reference data library (top level)
    SiteReferenceDataLibrary,
    /// Category used to classify other things
    Category,
    /// Parameter type (quantity kind, boolean, text)
    ParameterType,
    /// Measurement scale
    MeasurementScale,
    /// Glossary of terms
    Glossary,
    /// Glossary term
    Term,
    /// Engineering model (top level)
    EngineeringModel,
    /// Iteration of an engineering model
    Iteration,
    /// Element definition (product tree node)
    ElementDefinition,
    /// Usage of an element definition inside another one
    ElementUsage,
    /// Parameter of an element definition
    Parameter,
    /// Requirements specification
    RequirementsSpecification,
    /// Requirement
    Requirement,
}

impl ClassKind {
    /// Get the string representation of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassKind::SiteReferenceDataLibrary => "site-reference-data-library",
            ClassKind::Category => "category",
            ClassKind::ParameterType => "parameter-type",
            ClassKind::MeasurementScale => "measurement-scale",
            ClassKind::Glossary => "glossary",
            ClassKind::Term => "term",
            ClassKind::EngineeringModel => "engineering-model",
            ClassKind::Iteration => "iteration",
            ClassKind::ElementDefinition => "element-definition",
            ClassKind::ElementUsage => "element-usage",
            ClassKind::Parameter => "parameter",
            ClassKind::RequirementsSpecification => "requirements-specification",
            ClassKind::Requirement => "requirement",
        }
    }

    /// Short alias accepted on the command line
    pub fn short_name(&self) -> &'static str {
        match self {
            ClassKind::SiteReferenceDataLibrary => "rdl",
            ClassKind::Category => "cat",
            ClassKind::ParameterType => "pt",
            ClassKind::MeasurementScale => "scale",
            ClassKind::Glossary => "glossary",
            ClassKind::Term => "term",
            ClassKind::EngineeringModel => "model",
            ClassKind::Iteration => "iter",
            ClassKind::ElementDefinition => "ed",
            ClassKind::ElementUsage => "eu",
            ClassKind::Parameter => "param",
            ClassKind::RequirementsSpecification => "spec",
            ClassKind::Requirement => "req",
        }
    }

    /// Get all kinds
    pub fn all() -> &'static [ClassKind] {
        &[
            ClassKind::SiteReferenceDataLibrary,
            ClassKind::Category,
            ClassKind::ParameterType,
            ClassKind::MeasurementScale,
            ClassKind::Glossary,
            ClassKind::Term,
            ClassKind::EngineeringModel,
            ClassKind::Iteration,
            ClassKind::ElementDefinition,
            ClassKind::ElementUsage,
            ClassKind::Parameter,
            ClassKind::RequirementsSpecification,
            ClassKind::Requirement,
        ]
    }

    /// Kinds allowed to contain this kind (empty for top-level kinds)
    pub fn container_kinds(&self) -> &'static [ClassKind] {
        match self {
            ClassKind::SiteReferenceDataLibrary | ClassKind::EngineeringModel => &[],
            ClassKind::Category
            | ClassKind::ParameterType
            | ClassKind::MeasurementScale
            | ClassKind::Glossary => &[ClassKind::SiteReferenceDataLibrary],
            ClassKind::Term => &[ClassKind::Glossary],
            ClassKind::Iteration => &[ClassKind::EngineeringModel],
            ClassKind::ElementDefinition | ClassKind::RequirementsSpecification => {
                &[ClassKind::Iteration]
            }
            ClassKind::ElementUsage | ClassKind::Parameter => &[ClassKind::ElementDefinition],
            ClassKind::Requirement => &[ClassKind::RequirementsSpecification],
        }
    }

    /// Whether this kind lives without a container
    pub fn is_top_level(&self) -> bool {
        self.container_kinds().is_empty()
    }

    /// Whether this kind may be contained by `container`
    pub fn allows_container(&self, container: ClassKind) -> bool {
        self.container_kinds().contains(&container)
    }

    /// Whether things of this kind are only unique within an iteration
    ///
    /// Scoped things carry the iteration id as the container component of
    /// their [`IdentityKey`].
    pub fn is_scoped(&self) -> bool {
        match self {
            ClassKind::ElementDefinition
            | ClassKind::ElementUsage
            | ClassKind::Parameter
            | ClassKind::RequirementsSpecification
            | ClassKind::Requirement => true,
            ClassKind::SiteReferenceDataLibrary
            | ClassKind::Category
            | ClassKind::ParameterType
            | ClassKind::MeasurementScale
            | ClassKind::Glossary
            | ClassKind::Term
            | ClassKind::EngineeringModel
            | ClassKind::Iteration => false,
        }
    }
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ClassKind {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('_', "-");
        ClassKind::all()
            .iter()
            .find(|kind| kind.as_str() == wanted || kind.short_name() == wanted)
            .copied()
            .ok_or_else(|| IdParseError::InvalidKind(s.to_string()))
    }
}

/// Stable identifier of a thing
///
/// The nil UUID is reserved as the "unassigned" sentinel: a thing carrying it
/// has not been staged for creation yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThingId(Uuid);

impl ThingId {
    /// The unassigned sentinel
    pub const UNASSIGNED: ThingId = ThingId(Uuid::nil());

    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the UUID
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Whether this is the unassigned sentinel
    pub fn is_unassigned(&self) -> bool {
        self.0.is_nil()
    }

    /// First eight hex digits, for compact display
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }

    /// Parse a ThingId from a string
    pub fn parse(s: &str) -> Result<Self, IdParseError> {
        s.parse()
    }
}

impl Default for ThingId {
    fn default() -> Self {
        Self::UNASSIGNED
    }
}

impl fmt::Display for ThingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ThingId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(ThingId)
            .map_err(|e| IdParseError::InvalidUuid(s.to_string(), e.to_string()))
    }
}

/// Address of one cache slot: the thing id plus its optional scope
///
/// Two keys are equal only when both components match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityKey {
    pub id: ThingId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<ThingId>,
}

impl IdentityKey {
    /// Key of an unscoped thing
    pub fn new(id: ThingId) -> Self {
        Self {
            id,
            container: None,
        }
    }

    /// Key of a thing scoped to a containing aggregate
    pub fn scoped(id: ThingId, container: ThingId) -> Self {
        Self {
            id,
            container: Some(container),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.container {
            Some(container) => write!(f, "{}@{}", self.id, container.short()),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Errors that can occur when parsing ids and kinds
#[derive(Debug, Error)]
pub enum IdParseError {
    #[error("invalid class kind: '{0}' (run `tts list --kinds` for the valid names)")]
    InvalidKind(String),

    #[error("invalid thing id '{0}': {1}")]
    InvalidUuid(String, String),
}
