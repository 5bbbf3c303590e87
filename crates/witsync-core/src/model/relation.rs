//! Typed links between work items.
//!
//! # Classification
//!
//! A relation whose type contains `hierarchy-forward` points at a child. A
//! relation whose type ends in `related` is a cross-reference. An id that is
//! a child is never also treated as related: hierarchy wins.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Relation type names written to the target.
pub mod rel {
    pub const HIERARCHY_FORWARD: &str = "System.LinkTypes.Hierarchy-Forward";
    pub const HIERARCHY_REVERSE: &str = "System.LinkTypes.Hierarchy-Reverse";
    pub const RELATED: &str = "System.LinkTypes.Related";
    pub const ATTACHED_FILE: &str = "AttachedFile";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Child,
    Parent,
    Related,
    Attachment,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    #[serde(default)]
    pub rel: String,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Relation {
    #[must_use]
    pub fn new(rel: &str, url: impl Into<String>) -> Self {
        Self {
            rel: rel.to_string(),
            url: url.into(),
            attributes: Map::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> LinkKind {
        let rel = self.rel.to_ascii_lowercase();
        if rel.contains("hierarchy-forward") {
            LinkKind::Child
        } else if rel.contains("hierarchy-reverse") {
            LinkKind::Parent
        } else if rel.ends_with("related") {
            LinkKind::Related
        } else if rel.contains("attachedfile") || rel.contains("attachedimage") {
            LinkKind::Attachment
        } else {
            LinkKind::Other
        }
    }

    /// The linked work item id: the last path segment of the url.
    #[must_use]
    pub fn linked_id(&self) -> Option<u64> {
        self.url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse().ok())
    }

    /// The `name` attribute, set by the service on attachment links.
    #[must_use]
    pub fn attribute_name(&self) -> Option<&str> {
        self.attributes
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// Children and related ids of one entity, partitioned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkSet {
    pub children: BTreeSet<u64>,
    pub related: BTreeSet<u64>,
}

impl LinkSet {
    #[must_use]
    pub fn classify(relations: &[Relation]) -> Self {
        let mut links = Self::default();
        for relation in relations {
            let Some(id) = relation.linked_id() else {
                continue;
            };
            match relation.kind() {
                LinkKind::Child => {
                    links.children.insert(id);
                }
                LinkKind::Related => {
                    links.related.insert(id);
                }
                LinkKind::Parent | LinkKind::Attachment | LinkKind::Other => {}
            }
        }
        let children = &links.children;
        links.related.retain(|id| !children.contains(id));
        links
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.children.is_empty() && self.related.is_empty()
    }
}
