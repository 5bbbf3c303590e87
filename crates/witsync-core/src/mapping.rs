//! Immutable lookup tables: work item types and user identities.
//!
//! Both are built once from configuration and passed to the engine. Lookups
//! are case-insensitive on trimmed keys.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::Identity;

pub const DEFAULT_ROOT_TYPES: &[&str] = &["Work Bundle", "Workbundle", "WorkBundle"];
pub const DEFAULT_TARGET_ROOT_TYPE: &str = "Work Bundle";
pub const DEFAULT_LINKED_TYPES: &[(&str, &str)] =
    &[("User Story", "User Story"), ("Issue", "User Story")];

fn key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Source-to-target work item type translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMapper {
    root_types: Vec<String>,
    target_root_type: String,
    linked: HashMap<String, String>,
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new(
            DEFAULT_ROOT_TYPES.iter().map(ToString::to_string).collect(),
            DEFAULT_TARGET_ROOT_TYPE,
            DEFAULT_LINKED_TYPES
                .iter()
                .map(|(from, to)| ((*from).to_string(), (*to).to_string()))
                .collect(),
        )
    }
}

impl TypeMapper {
    #[must_use]
    pub fn new(
        root_types: Vec<String>,
        target_root_type: &str,
        linked: BTreeMap<String, String>,
    ) -> Self {
        Self {
            root_types,
            target_root_type: target_root_type.to_string(),
            linked: linked
                .into_iter()
                .map(|(from, to)| (key(&from), to.trim().to_string()))
                .collect(),
        }
    }

    /// Source type names that identify root (bundle) items.
    #[must_use]
    pub fn root_types(&self) -> &[String] {
        &self.root_types
    }

    #[must_use]
    pub fn target_root_type(&self) -> &str {
        &self.target_root_type
    }

    /// Target type for a child or related item; `None` means filter it out.
    #[must_use]
    pub fn map_linked(&self, source_type: &str) -> Option<&str> {
        self.linked.get(&key(source_type)).map(String::as_str)
    }

    /// Every distinct target type this mapper can produce, root first.
    #[must_use]
    pub fn target_types(&self) -> Vec<&str> {
        let linked: BTreeSet<&str> = self.linked.values().map(String::as_str).collect();
        let mut types = vec![self.target_root_type.as_str()];
        types.extend(linked.into_iter().filter(|t| *t != self.target_root_type));
        types
    }
}

/// Source identity to target identity translation for assignees.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityMapper {
    users: HashMap<String, String>,
}

impl IdentityMapper {
    #[must_use]
    pub fn new(users: BTreeMap<String, String>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|(from, to)| (key(&from), to.trim().to_string()))
                .collect(),
        }
    }

    /// Normalize the identity and apply the user map; unmapped identities
    /// pass through normalized.
    #[must_use]
    pub fn map(&self, identity: &Identity) -> Option<String> {
        let normalized = identity.normalize()?;
        Some(
            self.users
                .get(&key(&normalized))
                .cloned()
                .unwrap_or(normalized),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_table_maps_issue_and_story() {
        let mapper = TypeMapper::default();
        assert_eq!(mapper.map_linked("Issue"), Some("User Story"));
        assert_eq!(mapper.map_linked("  user STORY "), Some("User Story"));
        assert_eq!(mapper.map_linked("Bug"), None);
        assert_eq!(mapper.map_linked(""), None);
    }

    #[test]
    fn root_type_spellings_all_land_on_one_target_type() {
        let mapper = TypeMapper::default();
        assert_eq!(mapper.root_types(), ["Work Bundle", "Workbundle", "WorkBundle"]);
        assert_eq!(mapper.target_root_type(), "Work Bundle");
    }

    #[test]
    fn target_types_are_distinct() {
        let mapper = TypeMapper::default();
        assert_eq!(mapper.target_types(), vec!["Work Bundle", "User Story"]);
    }

    #[test]
    fn identity_map_is_case_insensitive() {
        let mut users = BTreeMap::new();
        users.insert("Alice@Src.Example".to_string(), "alice@tgt.example".to_string());
        let mapper = IdentityMapper::new(users);

        let mapped = Identity::from_value(&json!({ "uniqueName": "alice@src.example" }))
            .and_then(|identity| mapper.map(&identity));
        assert_eq!(mapped.as_deref(), Some("alice@tgt.example"));

        let passthrough = Identity::from_value(&json!("bob@src.example"))
            .and_then(|identity| mapper.map(&identity));
        assert_eq!(passthrough.as_deref(), Some("bob@src.example"));
    }
}
