//! Reconciliation of a root's children and related items.

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::client::{PatchOp, RelationTarget};
use crate::engine::ReplicationEngine;
use crate::error::ServiceError;
use crate::model::{LinkKind, LinkSet, Relation, TargetId, WorkEntity, fields, rel};

/// Target ids already linked as related from the current target parent.
/// Loaded on first use, once per root.
#[derive(Default)]
struct ExistingEdges(Option<BTreeSet<u64>>);

impl ReplicationEngine<'_> {
    /// Bring the children and related items of `source_parent` over to the target.
    ///
    /// Children are created under `target_parent` in the same call. Related
    /// items are created unparented and then linked to `target_parent` with one
    /// related edge, unless that edge already exists. Items whose type has no
    /// mapping are skipped.
    pub(crate) fn reconcile(
        &mut self,
        source_parent: u64,
        target_parent: TargetId,
    ) -> Result<(), ServiceError> {
        let linked = self.source.get_with_relations(source_parent)?;
        let mut links = LinkSet::classify(&linked.relations);
        links.related.remove(&source_parent);
        if links.is_empty() {
            debug!(source_parent, "no linked items");
            return Ok(());
        }

        for child in self.fetch_linked(&links.children)? {
            if let Some(counterpart) = self.counterpart(&child, Some(target_parent))? {
                if self.options.with_comments {
                    self.summary.comments_migrated += self.comments.migrate(child.id, counterpart)?;
                }
            }
        }

        let mut edges = ExistingEdges::default();
        for related in self.fetch_linked(&links.related)? {
            if let Some(counterpart) = self.counterpart(&related, None)? {
                self.link_related(target_parent, counterpart, &mut edges)?;
            }
        }
        Ok(())
    }

    fn fetch_linked(&self, ids: &BTreeSet<u64>) -> Result<Vec<WorkEntity>, ServiceError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<u64> = ids.iter().copied().collect();
        let found = self.source.batch_get(&ids, fields::LINKED_FIELDS)?;
        if found.len() < ids.len() {
            debug!(
                requested = ids.len(),
                returned = found.len(),
                "some linked items were not returned by the source"
            );
        }
        Ok(found)
    }

    /// Resolve or create the target counterpart of a linked item.
    /// `None` when its type is filtered out.
    fn counterpart(
        &mut self,
        source: &WorkEntity,
        parent: Option<TargetId>,
    ) -> Result<Option<TargetId>, ServiceError> {
        let source_type = source.work_item_type().unwrap_or_default();
        let Some(target_type) = self.types.map_linked(source_type) else {
            debug!(source_id = source.id, source_type, "unmapped type, skipping");
            return Ok(None);
        };

        if let Some(existing) = self.resolver.resolve(source.id)? {
            self.summary.skipped += 1;
            debug!(source_id = source.id, target = %existing, "already replicated");
            return Ok(Some(existing));
        }

        let created = self.upsert.create(target_type, source, parent)?;
        self.resolver.record(source.id, created);
        self.summary.created_others += 1;
        Ok(Some(created))
    }

    fn link_related(
        &mut self,
        parent: TargetId,
        counterpart: TargetId,
        edges: &mut ExistingEdges,
    ) -> Result<(), ServiceError> {
        let (Some(parent_id), Some(other_id)) = (parent.writable(), counterpart.writable()) else {
            if self.options.dry_run {
                self.summary.related_links_added += 1;
            }
            return Ok(());
        };

        if edges.load(self, parent_id)?.contains(&other_id) {
            self.summary.related_links_existing += 1;
            debug!(parent_id, other_id, "related edge already present");
            return Ok(());
        }

        if !self.options.dry_run {
            self.target.patch(
                parent_id,
                &[PatchOp::relation(rel::RELATED, RelationTarget::WorkItem(other_id))],
            )?;
            info!(parent_id, other_id, "linked related item");
        }
        edges.insert(other_id);
        self.summary.related_links_added += 1;
        Ok(())
    }
}

impl ExistingEdges {
    fn load(
        &mut self,
        engine: &ReplicationEngine<'_>,
        parent_id: u64,
    ) -> Result<&BTreeSet<u64>, ServiceError> {
        if self.0.is_none() {
            let parent = engine.target.get_with_relations(parent_id)?;
            self.0 = Some(
                parent
                    .relations
                    .iter()
                    .filter(|relation| relation.kind() == LinkKind::Related)
                    .filter_map(Relation::linked_id)
                    .collect(),
            );
        }
        Ok(self.0.get_or_insert_with(BTreeSet::new))
    }

    fn insert(&mut self, id: u64) {
        self.0.get_or_insert_with(BTreeSet::new).insert(id);
    }
}
