//! Reference data library content: categories, parameter types, scales, glossaries

use serde::{Deserialize, Serialize};

use crate::core::identity::{ClassKind, ThingId};
use crate::core::thing::{Content, ThingError};
use crate::entities::{label_or, parse_bool, push_unique, remove_id, set_name_field};

/// Site-wide reference data library
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteReferenceDataLibrary {
    pub name: String,
    pub short_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameter_types: Vec<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scales: Vec<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub glossaries: Vec<ThingId>,
}

impl Content for SiteReferenceDataLibrary {
    const KIND: ClassKind = ClassKind::SiteReferenceDataLibrary;

    fn label(&self) -> String {
        label_or(&self.name, "reference data library")
    }

    fn child_ids(&self) -> Vec<ThingId> {
        self.categories
            .iter()
            .chain(&self.parameter_types)
            .chain(&self.scales)
            .chain(&self.glossaries)
            .copied()
            .collect()
    }

    fn insert_child(&mut self, kind: ClassKind, id: ThingId) -> Result<(), ThingError> {
        let collection = match kind {
            ClassKind::Category => &mut self.categories,
            ClassKind::ParameterType => &mut self.parameter_types,
            ClassKind::MeasurementScale => &mut self.scales,
            ClassKind::Glossary => &mut self.glossaries,
            _ => {
                return Err(ThingError::NotAContainer {
                    kind: Self::KIND,
                    child: kind,
                })
            }
        };
        push_unique(collection, id);
        Ok(())
    }

    fn remove_child(&mut self, id: ThingId) -> bool {
        remove_id(&mut self.categories, id)
            || remove_id(&mut self.parameter_types, id)
            || remove_id(&mut self.scales, id)
            || remove_id(&mut self.glossaries, id)
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        Err(ThingError::UnknownField {
            kind: Self::KIND,
            field: field.to_string(),
        })
    }
}

/// Category used to classify things of the permitted kinds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Category {
    pub name: String,
    pub short_name: String,
    pub is_abstract: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub permissible_classes: Vec<ClassKind>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub super_categories: Vec<ThingId>,
}

impl Content for Category {
    const KIND: ClassKind = ClassKind::Category;

    fn label(&self) -> String {
        label_or(&self.name, "category")
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.super_categories.clone()
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        match field {
            "is_abstract" => self.is_abstract = parse_bool(field, value)?,
            "permissible_classes" => {
                self.permissible_classes = value
                    .split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| {
                        s.parse::<ClassKind>()
                            .map_err(|e| ThingError::InvalidValue {
                                field: field.to_string(),
                                value: s.to_string(),
                                reason: e.to_string(),
                            })
                    })
                    .collect::<Result<_, _>>()?;
            }
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
            "super_categories" | "super_category" => {
                push_unique(&mut self.super_categories, target);
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }
}

/// What kind of value a parameter type describes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Boolean,
    Text,
    #[default]
    Quantity,
}

impl std::str::FromStr for ValueKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "boolean" => Ok(ValueKind::Boolean),
            "text" => Ok(ValueKind::Text),
            "quantity" => Ok(ValueKind::Quantity),
            _ => Err(format!("Unknown value kind: {}", s)),
        }
    }
}

/// Parameter type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterType {
    pub name: String,
    pub short_name: String,
    pub symbol: String,
    pub value_kind: ValueKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_scale: Option<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<ThingId>,
}

impl Content for ParameterType {
    const KIND: ClassKind = ClassKind::ParameterType;

    fn label(&self) -> String {
        label_or(&self.name, "parameter type")
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.default_scale
            .iter()
            .chain(&self.categories)
            .copied()
            .collect()
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        match field {
            "symbol" => self.symbol = value.to_string(),
            "value_kind" => {
                self.value_kind = value.parse().map_err(|reason| ThingError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason,
                })?
            }
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
            "default_scale" => self.default_scale = Some(target),
            "categories" | "category" => push_unique(&mut self.categories, target),
            _ => {
                return Err(ThingError::UnknownField {
                    kind: Self::KIND,
                    field: field.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Number set a measurement scale is defined over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberSet {
    Natural,
    Integer,
    Rational,
    #[default]
    Real,
}

impl std::str::FromStr for NumberSet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "natural" => Ok(NumberSet::Natural),
            "integer" => Ok(NumberSet::Integer),
            "rational" => Ok(NumberSet::Rational),
            "real" => Ok(NumberSet::Real),
            _ => Err(format!("Unknown number set: {}", s)),
        }
    }
}

/// Measurement scale
///
/// Limits are kept as text; interpreting them is the business of the dialogs
/// that edit scales, not of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasurementScale {
    pub name: String,
    pub short_name: String,
    pub unit: String,
    pub number_set: NumberSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<String>,
}

impl Content for MeasurementScale {
    const KIND: ClassKind = ClassKind::MeasurementScale;

    fn label(&self) -> String {
        label_or(&self.name, "measurement scale")
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());
        match field {
            "unit" => self.unit = value.to_string(),
            "number_set" => {
                self.number_set = value.parse().map_err(|reason| ThingError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                    reason,
                })?
            }
            "minimum" => self.minimum = optional(value),
            "maximum" => self.maximum = optional(value),
            _ => {
                return Err(ThingError::UnknownField {
                    kind: Self::KIND,
                    field: field.to_string(),
                })
            }
        }
        Ok(())
    }
}

/// Glossary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Glossary {
    pub name: String,
    pub short_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<ThingId>,
}

impl Content for Glossary {
    const KIND: ClassKind = ClassKind::Glossary;

    fn label(&self) -> String {
        label_or(&self.name, "glossary")
    }

    fn child_ids(&self) -> Vec<ThingId> {
        self.terms.clone()
    }

    fn insert_child(&mut self, kind: ClassKind, id: ThingId) -> Result<(), ThingError> {
        if kind != ClassKind::Term {
            return Err(ThingError::NotAContainer {
                kind: Self::KIND,
                child: kind,
            });
        }
        push_unique(&mut self.terms, id);
        Ok(())
    }

    fn remove_child(&mut self, id: ThingId) -> bool {
        remove_id(&mut self.terms, id)
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        Err(ThingError::UnknownField {
            kind: Self::KIND,
            field: field.to_string(),
        })
    }
}

/// Glossary term
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Term {
    pub name: String,
    pub short_name: String,
    pub definition: String,
}

impl Content for Term {
    const KIND: ClassKind = ClassKind::Term;

    fn label(&self) -> String {
        label_or(&self.name, "term")
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        match field {
            "definition" => {
                self.definition = value.to_string();
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }
}
