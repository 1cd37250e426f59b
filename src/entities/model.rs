//! Engineering model content: models, iterations, and the product tree

use serde::{Deserialize, Serialize};

use crate::core::identity::{ClassKind, ThingId};
use crate::core::thing::{Content, ThingError};
use crate::entities::{label_or, push_unique, remove_id, set_name_field};

/// Engineering model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineeringModel {
    pub name: String,
    pub short_name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub iterations: Vec<ThingId>,
    /// Libraries the model draws reference data from (may live in another session)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required_rdls: Vec<ThingId>,
}

impl Content for EngineeringModel {
    const KIND: ClassKind = ClassKind::EngineeringModel;

    fn label(&self) -> String {
        label_or(&self.name, "engineering model")
    }

    fn child_ids(&self) -> Vec<ThingId> {
        self.iterations.clone()
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.required_rdls.clone()
    }

    fn insert_child(&mut self, kind: ClassKind, id: ThingId) -> Result<(), ThingError> {
        if kind != ClassKind::Iteration {
            return Err(ThingError::NotAContainer {
                kind: Self::KIND,
                child: kind,
            });
        }
        push_unique(&mut self.iterations, id);
        Ok(())
    }

    fn remove_child(&mut self, id: ThingId) -> bool {
        remove_id(&mut self.iterations, id)
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

    fn set_reference(&mut self, field: &str, target: ThingId) -> Result<(), ThingError> {
        match field {
            "required_rdls" | "required_rdl" => {
                push_unique(&mut self.required_rdls, target);
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }
}

/// Iteration of an engineering model; the scope of everything it contains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Iteration {
    pub iteration_number: u32,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub elements: Vec<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requirements_specifications: Vec<ThingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_element: Option<ThingId>,
}

impl Content for Iteration {
    const KIND: ClassKind = ClassKind::Iteration;

    fn label(&self) -> String {
        format!("iteration {}", self.iteration_number)
    }

    fn child_ids(&self) -> Vec<ThingId> {
        self.elements
            .iter()
            .chain(&self.requirements_specifications)
            .copied()
            .collect()
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.top_element.into_iter().collect()
    }

    fn insert_child(&mut self, kind: ClassKind, id: ThingId) -> Result<(), ThingError> {
        let collection = match kind {
            ClassKind::ElementDefinition => &mut self.elements,
            ClassKind::RequirementsSpecification => &mut self.requirements_specifications,
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
        let removed = remove_id(&mut self.elements, id)
            || remove_id(&mut self.requirements_specifications, id);
        if removed && self.top_element == Some(id) {
            self.top_element = None;
        }
        removed
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        match field {
            "iteration_number" => {
                self.iteration_number =
                    value.trim().parse().map_err(|_| ThingError::InvalidValue {
                        field: field.to_string(),
                        value: value.to_string(),
                        reason: "expected a non-negative integer".to_string(),
                    })?
            }
            "description" => self.description = value.to_string(),
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
            "top_element" => {
                self.top_element = Some(target);
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }
}

/// Element definition - a node of the product tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementDefinition {
    pub name: String,
    pub short_name: String,
    /// Owning domain of expertise
    pub owner: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub contained_elements: Vec<ThingId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<ThingId>,
}

impl Content for ElementDefinition {
    const KIND: ClassKind = ClassKind::ElementDefinition;

    fn label(&self) -> String {
        label_or(&self.name, "element definition")
    }

    fn child_ids(&self) -> Vec<ThingId> {
        self.parameters
            .iter()
            .chain(&self.contained_elements)
            .copied()
            .collect()
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.categories.clone()
    }

    fn insert_child(&mut self, kind: ClassKind, id: ThingId) -> Result<(), ThingError> {
        let collection = match kind {
            ClassKind::Parameter => &mut self.parameters,
            ClassKind::ElementUsage => &mut self.contained_elements,
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
        remove_id(&mut self.parameters, id) || remove_id(&mut self.contained_elements, id)
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        match field {
            "owner" => {
                self.owner = value.to_string();
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
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

/// Usage of an element definition inside another element definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementUsage {
    pub name: String,
    pub short_name: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_definition: Option<ThingId>,
}

impl Content for ElementUsage {
    const KIND: ClassKind = ClassKind::ElementUsage;

    fn label(&self) -> String {
        label_or(&self.name, "element usage")
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.element_definition.into_iter().collect()
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        if set_name_field(&mut self.name, &mut self.short_name, field, value) {
            return Ok(());
        }
        match field {
            "owner" => {
                self.owner = value.to_string();
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }

    fn set_reference(&mut self, field: &str, target: ThingId) -> Result<(), ThingError> {
        match field {
            "element_definition" => {
                self.element_definition = Some(target);
                Ok(())
            }
            _ => Err(ThingError::UnknownField {
                kind: Self::KIND,
                field: field.to_string(),
            }),
        }
    }
}

/// Parameter of an element definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Parameter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_type: Option<ThingId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<ThingId>,
    pub owner: String,
    /// Manual value, one entry per array component
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub value: Vec<String>,
}

impl Content for Parameter {
    const KIND: ClassKind = ClassKind::Parameter;

    fn label(&self) -> String {
        if self.value.is_empty() {
            "parameter".to_string()
        } else {
            format!("parameter = {}", self.value.join(", "))
        }
    }

    fn reference_ids(&self) -> Vec<ThingId> {
        self.parameter_type
            .iter()
            .chain(self.scale.iter())
            .copied()
            .collect()
    }

    fn set_attribute(&mut self, field: &str, value: &str) -> Result<(), ThingError> {
        match field {
            "owner" => self.owner = value.to_string(),
            "value" => {
                self.value = value
                    .split(',')
                    .map(|component| component.trim().to_string())
                    .filter(|component| !component.is_empty())
                    .collect()
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
            "parameter_type" => self.parameter_type = Some(target),
            "scale" => self.scale = Some(target),
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_clears_top_element_on_removal() {
        let mut iteration = Iteration::default();
        let element = ThingId::new();
        iteration
            .insert_child(ClassKind::ElementDefinition, element)
            .unwrap();
        iteration.set_reference("top_element", element).unwrap();

        assert!(iteration.remove_child(element));
        assert!(iteration.top_element.is_none());
    }

    #[test]
    fn test_element_definition_children() {
        let mut element = ElementDefinition::default();
        let parameter = ThingId::new();
        let usage = ThingId::new();
        element.insert_child(ClassKind::Parameter, parameter).unwrap();
        element.insert_child(ClassKind::ElementUsage, usage).unwrap();
        assert_eq!(element.child_ids(), vec![parameter, usage]);

        let err = element
            .insert_child(ClassKind::Requirement, ThingId::new())
            .unwrap_err();
        assert!(matches!(err, ThingError::NotAContainer { .. }));
    }

    #[test]
    fn test_parameter_value_parsing() {
        let mut parameter = Parameter::default();
        parameter.set_attribute("value", "1.5, 2.0,,3").unwrap();
        assert_eq!(parameter.value, vec!["1.5", "2.0", "3"]);
        assert_eq!(parameter.label(), "parameter = 1.5, 2.0, 3");
    }

    #[test]
    fn test_iteration_number_validation() {
        let mut iteration = Iteration::default();
        let err = iteration
            .set_attribute("iteration_number", "-1")
            .unwrap_err();
        assert!(matches!(err, ThingError::InvalidValue { .. }));
    }
}
