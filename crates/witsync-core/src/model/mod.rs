//! Work-item records as both services expose them.
//!
//! - [`entity`]: field-map backed work entities and the well-known field names.
//! - [`identity`]: assignee values (plain strings or identity objects).
//! - [`relation`]: typed links between work items, and link classification.

pub mod entity;
pub mod identity;
pub mod relation;

pub use entity::{LinkedEntity, TargetId, WorkEntity, fields};
pub use identity::{Identity, StructuredIdentity};
pub use relation::{LinkKind, LinkSet, Relation, rel};
