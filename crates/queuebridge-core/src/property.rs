//! Build request parameters.

use std::collections::HashMap;

/// Name of the parameter carrying the changeset/update spec of the build
/// request. Every dispatched job must accept it.
pub const UPDATE_SPEC_PARAM: &str = "queuebridge.update.spec";

/// A single `name=value` build parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildProperty {
    pub name: String,
    pub value: String,
}

impl BuildProperty {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Assembles the parameter list for a build request: the fixed update-spec
/// parameter first, then the caller-supplied properties.
///
/// Extra properties are sorted by name so the request (and any parameter
/// reconciliation it triggers) is deterministic for a given input map.
pub fn request_properties(
    update_spec: &str,
    extra_properties: &HashMap<String, String>,
) -> Vec<BuildProperty> {
    let mut properties = vec![BuildProperty::new(UPDATE_SPEC_PARAM, update_spec)];

    let mut extras: Vec<_> = extra_properties.iter().collect();
    extras.sort_by(|a, b| a.0.cmp(b.0));

    for (name, value) in extras {
        properties.push(BuildProperty::new(name.clone(), value.clone()));
    }

    properties
}
