//! Correlation lookups: which target item was replicated from a source id.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::client::{WorkItemQuery, WorkItemService};
use crate::error::ServiceError;
use crate::model::TargetId;

/// Resolves source ids to their target counterparts through the correlation field.
///
/// The per-run cache only ever holds positive facts: counterparts found on
/// the target, created this run, or planned by a dry run. A miss is always
/// re-queried, so an item created earlier in the run is never created twice.
pub struct CorrelationResolver<'a> {
    target: &'a dyn WorkItemService,
    field: String,
    found: HashMap<u64, TargetId>,
}

impl<'a> CorrelationResolver<'a> {
    #[must_use]
    pub fn new(target: &'a dyn WorkItemService, field: &str) -> Self {
        Self {
            target,
            field: field.to_string(),
            found: HashMap::new(),
        }
    }

    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The counterpart of `source_id`, if any. A dry run that already planned
    /// the item answers [`TargetId::DryRun`].
    ///
    /// # Errors
    ///
    /// Propagates the query failure; nothing is cached in that case.
    pub fn resolve(&mut self, source_id: u64) -> Result<Option<TargetId>, ServiceError> {
        if let Some(target) = self.found.get(&source_id) {
            return Ok(Some(*target));
        }

        let query = WorkItemQuery::FieldEquals {
            field: self.field.clone(),
            value: source_id.to_string(),
        };
        let matches = self.target.query(&query, None)?;

        let Some(first) = matches.first().copied() else {
            debug!(source_id, "no correlated target item");
            return Ok(None);
        };
        if matches.len() > 1 {
            warn!(
                source_id,
                canonical = first,
                duplicates = ?&matches[1..],
                "several target items carry the same correlation id"
            );
        }

        let target = TargetId::Real(first);
        self.found.insert(source_id, target);
        Ok(Some(target))
    }

    /// Remember a counterpart created, or planned by a dry run, during this run.
    pub fn record(&mut self, source_id: u64, target: TargetId) {
        self.found.insert(source_id, target);
    }
}
