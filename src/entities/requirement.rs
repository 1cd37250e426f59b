//! Requirement content types

use serde::{Deserialize, Serialize};

use crate::core::identity::{ClassKind, ThingId};
use crate::core::thing::{Content, ThingError};
use crate::entities::{label_or, parse_bool, push_unique, remove_id, set_name_field};

/// Requirements specification - an ordered set of requirements
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequirementsSpecification {
    pub name: String,
    pub short_name: String,
    pub owner: String,
    pub is_deprecated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<ThingId>,
}

impl Content for RequirementsSpecification {
    const KIND: ClassKind = ClassKind::RequirementsSpecification;

    fn label(&self) -> String {
        label_or(&self.name, "requirements specification")
    }

    fn child_ids(&self) -> Vec<ThingId> {
        self.requirements.clone()
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.categories.clone()
    }

    fn insert_child(&mut self, kind: ClassKind, id: ThingId) -> Result<(), ThingError> {
        if kind != ClassKind::Requirement {
            return Err(ThingError::NotAContainer {
                kind: Self::KIND,
                child: kind,
            });
        }
        push_unique(&mut self.requirements, id);
        Ok(())
    }

    fn remove_child(&mut self, id: ThingId) -> bool {
        remove_id(&mut self.requirements, id)
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        match field {
            "owner" => self.owner = value.to_string(),
            "is_deprecated" => self.is_deprecated = parse_bool(field, value)?,
            _ => {
                return Err(ThingError::UnknownField {
                    kind: Self::KIND,
                    field: field.to_string(),
                })
            }
        }
        Ok(())
    }

    fn set_reference(&mut self, field: &str, target: ThingId) -> Result<(), ThingError> {
        match field {
            "categories" | "category" => {
                push_unique(&mut self.categories, target);
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }
}

/// A requirement inside a specification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requirement {
    pub name: String,
    pub short_name: String,
    pub owner: String,
    /// Full requirement text
    pub text: String,
    pub is_deprecated: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<ThingId>,
}

impl Content for Requirement {
    const KIND: ClassKind = ClassKind::Requirement;

    fn label(&self) -> String {
        if self.short_name.is_empty() {
            label_or(&self.name, "requirement")
        } else {
            format!("{} {}", self.short_name, self.name)
        }
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.categories.clone()
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        match field {
            "owner" => self.owner = value.to_string(),
            "text" => self.text = value.to_string(),
            "is_deprecated" => self.is_deprecated = parse_bool(field, value)?,
            _ => {
                return Err(ThingError::UnknownField {
                    kind: Self::KIND,
                    field: field.to_string(),
                })
            }
        }
        Ok(())
    }

    fn set_reference(&mut self, field: &str, target: ThingId) -> Result<(), ThingError> {
        match field {
            "categories" | "category" => {
                push_unique(&mut self.categories, target);
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }
}
