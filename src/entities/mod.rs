//! Entity content types, one module per domain area

pub mod model;
pub mod rdl;
pub mod requirement;

use crate::core::identity::ThingId;
use crate::core::thing::ThingError;

/// Handle the `name` / `short_name` fields every named kind has
///
/// Returns `false` when `field` is not one of them.
pub(crate) fn set_name_field(
    name: &mut String,
    short_name: &mut String,
    field: &str,
    value: &str,
) -> bool {
    match field {
        "name" => *name = value.to_string(),
        "short_name" | "short-name" | "shortname" => *short_name = value.to_string(),
        _ => return false,
    }
    true
}

pub(crate) fn parse_bool(field: &str, value: &str) -> Result<bool, ThingError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(ThingError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

pub(crate) fn push_unique(ids: &mut Vec<ThingId>, id: ThingId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

pub(crate) fn remove_id(ids: &mut Vec<ThingId>, id: ThingId) -> bool {
    let len_before = ids.len();
    ids.retain(|existing| *existing != id);
    ids.len() < len_before
}

/// Label for things whose name is not set yet
pub(crate) fn label_or(name: &str, fallback: &str) -> String {
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}
