use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::identity::Identity;
use super::relation::Relation;

/// Reference names of the fields the engine reads or writes.
pub mod fields {
    pub const ID: &str = "System.Id";
    pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
    pub const TITLE: &str = "System.Title";
    pub const DESCRIPTION: &str = "System.Description";
    pub const TAGS: &str = "System.Tags";
    pub const AREA_PATH: &str = "System.AreaPath";
    pub const ITERATION_PATH: &str = "System.IterationPath";
    pub const ASSIGNED_TO: &str = "System.AssignedTo";
    pub const HISTORY: &str = "System.History";
    pub const TEAM_PROJECT: &str = "System.TeamProject";
    pub const CREATED_DATE: &str = "System.CreatedDate";

    /// Default correlation field holding the source id on every replicated item.
    pub const REFLECTED_WORK_ITEM_ID: &str = "Custom.ReflectedWorkItemId";

    /// Fields fetched for root (bundle) items.
    pub const ROOT_FIELDS: &[&str] = &[
        ID,
        WORK_ITEM_TYPE,
        TITLE,
        DESCRIPTION,
        TAGS,
        AREA_PATH,
        ITERATION_PATH,
        ASSIGNED_TO,
    ];

    /// Fields fetched for children and related items.
    pub const LINKED_FIELDS: &[&str] = ROOT_FIELDS;
}

/// A work item record: a system-assigned id plus its open-ended field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkEntity {
    pub id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Map<String, Value>,
}

impl WorkEntity {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    /// Builder-style field setter, mostly for fixtures.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// A string field, or `None` when absent, non-string, or blank.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[must_use]
    pub fn work_item_type(&self) -> Option<&str> {
        self.text(fields::WORK_ITEM_TYPE).map(str::trim)
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.text(fields::TITLE)
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.text(fields::DESCRIPTION)
    }

    #[must_use]
    pub fn tags(&self) -> Option<&str> {
        self.text(fields::TAGS)
    }

    #[must_use]
    pub fn area_path(&self) -> Option<&str> {
        self.text(fields::AREA_PATH)
    }

    #[must_use]
    pub fn iteration_path(&self) -> Option<&str> {
        self.text(fields::ITERATION_PATH)
    }

    #[must_use]
    pub fn assigned_to(&self) -> Option<Identity> {
        self.fields.get(fields::ASSIGNED_TO).and_then(Identity::from_value)
    }

    /// Read a field holding a work item id, stored either as a number or a
    /// numeric string (the correlation field is a string on the service side).
    #[must_use]
    pub fn id_field(&self, name: &str) -> Option<u64> {
        match self.fields.get(name)? {
            Value::Number(number) => number.as_u64(),
            Value::String(raw) => raw.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A work entity together with its link set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
    #[serde(flatten)]
    pub entity: WorkEntity,
    #[serde(default, deserialize_with = "null_as_default")]
    pub relations: Vec<Relation>,
}

/// The target-side counterpart of a source entity.
///
/// `DryRun` stands in for an entity that a dry run would have created. It
/// must never be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum TargetId {
    Real(u64),
    DryRun,
}

impl TargetId {
    /// The id to write against, or `None` for the dry-run sentinel.
    #[must_use]
    pub const fn writable(self) -> Option<u64> {
        match self {
            Self::Real(id) => Some(id),
            Self::DryRun => None,
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Real(id) => write!(f, "#{id}"),
            Self::DryRun => f.write_str("#(dry-run)"),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn blank_text_fields_read_as_absent() {
        let entity = WorkEntity::new(1)
            .with_field(fields::TITLE, "   ")
            .with_field(fields::TAGS, "a; b");
        assert_eq!(entity.title(), None);
        assert_eq!(entity.tags(), Some("a; b"));
        assert_eq!(entity.description(), None);
    }

    #[test]
    fn id_field_accepts_strings_and_numbers() {
        let entity = WorkEntity::new(1)
            .with_field("Custom.A", "42")
            .with_field("Custom.B", 43)
            .with_field("Custom.C", "not-a-number");
        assert_eq!(entity.id_field("Custom.A"), Some(42));
        assert_eq!(entity.id_field("Custom.B"), Some(43));
        assert_eq!(entity.id_field("Custom.C"), None);
        assert_eq!(entity.id_field("Custom.Missing"), None);
    }

    #[test]
    fn linked_entity_decodes_service_payload() {
        let payload = json!({
            "id": 100,
            "rev": 3,
            "fields": { "System.Title": "Bundle" },
            "relations": [
                { "rel": "System.LinkTypes.Hierarchy-Forward",
                  "url": "https://dev.azure.com/org/_apis/wit/workItems/101" }
            ]
        });
        let linked: LinkedEntity = serde_json::from_value(payload).expect("decodes");
        assert_eq!(linked.entity.id, 100);
        assert_eq!(linked.entity.title(), Some("Bundle"));
        assert_eq!(linked.relations.len(), 1);
    }

    #[test]
    fn null_relations_decode_as_empty() {
        let payload = json!({ "id": 5, "fields": null, "relations": null });
        let linked: LinkedEntity = serde_json::from_value(payload).expect("decodes");
        assert!(linked.relations.is_empty());
        assert!(linked.entity.fields.is_empty());
    }

    #[test]
    fn dry_run_target_is_not_writable() {
        assert_eq!(TargetId::Real(9).writable(), Some(9));
        assert_eq!(TargetId::DryRun.writable(), None);
        assert_eq!(TargetId::DryRun.to_string(), "#(dry-run)");
    }
}
