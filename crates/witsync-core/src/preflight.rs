//! Best-effort existence probes run before a replication.
//!
//! Warnings never gate a run; they are logged and shown by `witsync check`.

use std::fmt;

use serde::Serialize;

use crate::client::WorkItemService;
use crate::mapping::TypeMapper;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum PreflightWarning {
    MissingType(String),
    MissingField(String),
}

impl fmt::Display for PreflightWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingType(name) => {
                write!(f, "work item type '{name}' not found in the target project")
            }
            Self::MissingField(name) => {
                write!(f, "field '{name}' not found in the target organization")
            }
        }
    }
}

/// Probe every target type the mapper can produce and the correlation field.
#[must_use]
pub fn preflight(
    target: &dyn WorkItemService,
    types: &TypeMapper,
    correlation_field: &str,
) -> Vec<PreflightWarning> {
    let mut warnings: Vec<PreflightWarning> = types
        .target_types()
        .into_iter()
        .filter(|type_name| !target.type_exists(type_name))
        .map(|type_name| PreflightWarning::MissingType(type_name.to_string()))
        .collect();

    if !target.field_exists(correlation_field) {
        warnings.push(PreflightWarning::MissingField(correlation_field.to_string()));
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryService;

    #[test]
    fn reports_each_missing_type_and_field() {
        let target = InMemoryService::new("T");
        target.register_type("Work Bundle");

        let warnings = preflight(&target, &TypeMapper::default(), "Custom.ReflectedWorkItemId");
        assert_eq!(
            warnings,
            vec![
                PreflightWarning::MissingType("User Story".to_string()),
                PreflightWarning::MissingField("Custom.ReflectedWorkItemId".to_string()),
            ]
        );
        assert_eq!(
            warnings[0].to_string(),
            "work item type 'User Story' not found in the target project"
        );
    }

    #[test]
    fn clean_target_has_no_warnings() {
        let target = InMemoryService::new("T");
        target.register_type("work bundle");
        target.register_type("User Story");
        target.register_field("Custom.ReflectedWorkItemId");
        assert!(preflight(&target, &TypeMapper::default(), "Custom.ReflectedWorkItemId").is_empty());
    }
}
