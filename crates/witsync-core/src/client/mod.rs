//! The work-item service seam.
//!
//! Everything the engine needs from either side of a replication goes
//! through [`WorkItemService`]. Two implementations ship:
//!
//! - [`ado::AdoClient`]: the blocking HTTP client for the Azure DevOps REST API.
//! - [`memory::InMemoryService`]: a complete in-process service for tests
//!   and rehearsals.
//!
//! Queries are typed ([`WorkItemQuery`]) and rendered to WIQL text by the HTTP
//! client ([`wiql`]); writes are lists of [`PatchOp`] rendered to JSON-patch.

pub mod ado;
pub mod memory;
pub mod wiql;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ServiceError;
use crate::model::{LinkedEntity, WorkEntity, fields};

/// An exclusion predicate `[field] <> 'value'`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exclusion {
    pub field: String,
    pub value: String,
}

/// Queries the engine issues. Every query is scoped to the service's project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItemQuery {
    /// Items of the given types with id strictly above `after_id`, ascending by id.
    Roots {
        types: Vec<String>,
        after_id: u64,
        exclude: Option<Exclusion>,
    },
    /// Items whose `field` equals `value`.
    FieldEquals { field: String, value: String },
    /// Every item with id strictly above `after_id`, ascending by id.
    All { after_id: u64 },
    /// Items of the given types, newest first by creation date.
    RecentlyCreated { types: Vec<String> },
}

/// The other end of a relation being added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationTarget {
    WorkItem(u64),
    Url(String),
}

/// One "add" operation of a work item patch.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOp {
    AddField {
        name: String,
        value: Value,
    },
    AddRelation {
        rel: String,
        target: RelationTarget,
        attributes: Map<String, Value>,
    },
}

impl PatchOp {
    #[must_use]
    pub fn field(name: &str, value: impl Into<Value>) -> Self {
        Self::AddField {
            name: name.to_string(),
            value: value.into(),
        }
    }

    #[must_use]
    pub fn relation(rel: &str, target: RelationTarget) -> Self {
        Self::AddRelation {
            rel: rel.to_string(),
            target,
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn history(text: &str) -> Self {
        Self::field(fields::HISTORY, text)
    }
}

/// One discussion entry, from the comments thread or reconstructed from a revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentEntry {
    pub text: String,
    pub created: Option<DateTime<Utc>>,
}

/// One historical revision of a work item.
#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
pub struct Revision {
    #[serde(default)]
    pub rev: u64,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Revision {
    /// The changelog note recorded with this revision, if any.
    #[must_use]
    pub fn history(&self) -> Option<&str> {
        self.fields
            .get(fields::HISTORY)
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
    }

    #[must_use]
    pub fn changed_date(&self) -> Option<DateTime<Utc>> {
        self.fields
            .get("System.ChangedDate")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    }
}

/// Operations consumed from a work-item tracking service.
///
/// Calls block until the service answers. Implementations never retry.
pub trait WorkItemService {
    /// The project every query and write is scoped to.
    fn project(&self) -> &str;

    /// Run a query; `top` bounds the number of ids returned.
    fn query(&self, query: &WorkItemQuery, top: Option<usize>) -> Result<Vec<u64>, ServiceError>;

    /// Fetch the named fields of several items. Missing ids are omitted.
    fn batch_get(&self, ids: &[u64], fields: &[&str]) -> Result<Vec<WorkEntity>, ServiceError>;

    fn get_with_relations(&self, id: u64) -> Result<LinkedEntity, ServiceError>;

    /// Create one item from `ops`, plus a reverse-hierarchy link to `parent`.
    fn create(
        &self,
        type_name: &str,
        ops: &[PatchOp],
        parent: Option<u64>,
    ) -> Result<u64, ServiceError>;

    fn patch(&self, id: u64, ops: &[PatchOp]) -> Result<(), ServiceError>;

    /// The discussion thread, oldest entry first.
    fn comments(&self, id: u64) -> Result<Vec<CommentEntry>, ServiceError>;

    /// All revisions in revision order.
    fn revisions(&self, id: u64) -> Result<Vec<Revision>, ServiceError>;

    /// Best-effort probe; any failure reads as "does not exist".
    fn field_exists(&self, name: &str) -> bool;

    /// Best-effort probe; any failure reads as "does not exist".
    fn type_exists(&self, type_name: &str) -> bool;

    fn download(&self, url: &str) -> Result<Vec<u8>, ServiceError>;

    /// Upload a file and return the attachment url to link it with.
    fn upload_attachment(&self, file_name: &str, bytes: &[u8]) -> Result<String, ServiceError>;

    /// Fetch one item's fields, `None` when it does not exist.
    fn get(&self, id: u64, fields: &[&str]) -> Result<Option<WorkEntity>, ServiceError> {
        Ok(self.batch_get(&[id], fields)?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn revision_history_skips_blank_notes() {
        let revision: Revision = serde_json::from_value(json!({
            "rev": 2,
            "fields": { "System.History": "  ", "System.ChangedDate": "2025-03-01T10:00:00Z" }
        }))
        .expect("decodes");
        assert_eq!(revision.history(), None);
        assert!(revision.changed_date().is_some());
    }

    #[test]
    fn history_op_targets_history_field() {
        assert_eq!(
            PatchOp::history("note"),
            PatchOp::AddField {
                name: "System.History".to_string(),
                value: json!("note"),
            }
        );
    }
}
