//! Creation of target items from source items.

use tracing::{debug, info};

use crate::client::{PatchOp, WorkItemService};
use crate::error::ServiceError;
use crate::mapping::IdentityMapper;
use crate::model::{TargetId, WorkEntity, fields};
use crate::path::PathRemapper;

/// Builds the field subset of a replicated item and creates it in the target.
pub struct EntityUpsert<'a> {
    target: &'a dyn WorkItemService,
    correlation_field: String,
    paths: PathRemapper,
    /// `Some` when assignees are copied.
    identities: Option<IdentityMapper>,
    dry_run: bool,
}

impl<'a> EntityUpsert<'a> {
    #[must_use]
    pub fn new(target: &'a dyn WorkItemService, correlation_field: &str, paths: PathRemapper) -> Self {
        Self {
            target,
            correlation_field: correlation_field.to_string(),
            paths,
            identities: None,
            dry_run: false,
        }
    }

    #[must_use]
    pub fn with_assignees(mut self, identities: Option<IdentityMapper>) -> Self {
        self.identities = identities;
        self
    }

    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Field operations for the counterpart of `source`. Empty values are omitted.
    #[must_use]
    pub fn field_ops(&self, source: &WorkEntity) -> Vec<PatchOp> {
        let title = source
            .title()
            .map_or_else(|| format!("Migrated {}", source.id), ToString::to_string);

        let mut ops = vec![PatchOp::field(fields::TITLE, title)];
        if let Some(description) = source.description() {
            ops.push(PatchOp::field(fields::DESCRIPTION, description));
        }
        if let Some(tags) = source.tags() {
            ops.push(PatchOp::field(fields::TAGS, tags));
        }
        ops.push(PatchOp::field(&self.correlation_field, source.id.to_string()));
        ops.push(PatchOp::field(
            fields::AREA_PATH,
            self.paths.area(source.area_path()),
        ));
        ops.push(PatchOp::field(
            fields::ITERATION_PATH,
            self.paths.iteration(source.iteration_path()),
        ));
        if let Some(identities) = &self.identities {
            if let Some(assignee) = source.assigned_to().and_then(|who| identities.map(&who)) {
                ops.push(PatchOp::field(fields::ASSIGNED_TO, assignee));
            }
        }
        ops
    }

    /// Create the counterpart of `source` as a `type_name`, under `parent` when given.
    ///
    /// In dry-run mode nothing is sent and [`TargetId::DryRun`] comes back.
    ///
    /// # Errors
    ///
    /// Propagates the create failure.
    pub fn create(
        &self,
        type_name: &str,
        source: &WorkEntity,
        parent: Option<TargetId>,
    ) -> Result<TargetId, ServiceError> {
        let ops = self.field_ops(source);
        if self.dry_run {
            debug!(
                source_id = source.id,
                type_name,
                parent = ?parent,
                "dry run: would create"
            );
            return Ok(TargetId::DryRun);
        }

        let parent_id = parent.and_then(TargetId::writable);
        let id = self.target.create(type_name, &ops, parent_id)?;
        info!(source_id = source.id, target_id = id, type_name, parent = ?parent_id, "created");
        Ok(TargetId::Real(id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::client::memory::InMemoryService;
    use crate::model::LinkKind;

    const FIELD: &str = "Custom.ReflectedWorkItemId";

    fn remapper() -> PathRemapper {
        PathRemapper::new("SrcProj", "TgtProj", "TgtProj")
    }

    fn op_value<'o>(ops: &'o [PatchOp], field: &str) -> Option<&'o serde_json::Value> {
        ops.iter().find_map(|op| match op {
            PatchOp::AddField { name, value } if name == field => Some(value),
            _ => None,
        })
    }

    #[test]
    fn blank_title_falls_back_and_empty_fields_are_omitted() {
        let target = InMemoryService::new("TgtProj");
        let upsert = EntityUpsert::new(&target, FIELD, remapper());
        let source = WorkEntity::new(42)
            .with_field(fields::TITLE, " ")
            .with_field(fields::DESCRIPTION, "")
            .with_field(fields::AREA_PATH, r"SrcProj\TeamA");

        let ops = upsert.field_ops(&source);
        assert_eq!(op_value(&ops, fields::TITLE), Some(&json!("Migrated 42")));
        assert_eq!(op_value(&ops, fields::DESCRIPTION), None);
        assert_eq!(op_value(&ops, fields::TAGS), None);
        assert_eq!(op_value(&ops, FIELD), Some(&json!("42")));
        assert_eq!(op_value(&ops, fields::AREA_PATH), Some(&json!(r"TgtProj\TeamA")));
        assert_eq!(op_value(&ops, fields::ITERATION_PATH), Some(&json!("TgtProj")));
    }

    #[test]
    fn assignee_is_mapped_only_when_enabled() {
        let target = InMemoryService::new("TgtProj");
        let source = WorkEntity::new(1).with_field(
            fields::ASSIGNED_TO,
            json!({ "displayName": "Alice", "uniqueName": "alice@src.example" }),
        );

        let plain = EntityUpsert::new(&target, FIELD, remapper());
        assert_eq!(op_value(&plain.field_ops(&source), fields::ASSIGNED_TO), None);

        let users = BTreeMap::from([(
            "alice@src.example".to_string(),
            "alice@tgt.example".to_string(),
        )]);
        let mapped = EntityUpsert::new(&target, FIELD, remapper())
            .with_assignees(Some(IdentityMapper::new(users)));
        assert_eq!(
            op_value(&mapped.field_ops(&source), fields::ASSIGNED_TO),
            Some(&json!("alice@tgt.example"))
        );
    }

    #[test]
    fn create_links_parent_in_the_same_call() {
        let target = InMemoryService::new("TgtProj").with_next_id(900);
        let upsert = EntityUpsert::new(&target, FIELD, remapper());

        let parent = upsert
            .create("Work Bundle", &WorkEntity::new(100), None)
            .expect("parent");
        let child = upsert
            .create("User Story", &WorkEntity::new(101), Some(parent))
            .expect("child");

        assert_eq!(parent, TargetId::Real(900));
        assert_eq!(child, TargetId::Real(901));
        assert_eq!(target.linked(901, LinkKind::Parent), vec![900]);
        assert_eq!(target.mutation_count(), 2);
    }

    #[test]
    fn dry_run_returns_sentinel_without_writing() {
        let target = InMemoryService::new("TgtProj");
        let upsert = EntityUpsert::new(&target, FIELD, remapper()).with_dry_run(true);
        let created = upsert
            .create("Work Bundle", &WorkEntity::new(100), None)
            .expect("dry run");
        assert_eq!(created, TargetId::DryRun);
        assert_eq!(target.mutation_count(), 0);
        assert!(target.is_empty());
    }
}
