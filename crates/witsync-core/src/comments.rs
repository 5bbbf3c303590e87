//! Discussion history migration.

use serde::Serialize;
use tracing::{debug, warn};

use crate::client::{CommentEntry, PatchOp, WorkItemService};
use crate::error::ServiceError;
use crate::model::TargetId;

/// Where a set of comment entries was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentSource {
    Thread,
    Revisions,
}

/// Copies discussion entries from a source item onto its target counterpart
/// as history notes, one write per non-empty entry.
pub struct CommentMigrator<'a> {
    source: &'a dyn WorkItemService,
    target: &'a dyn WorkItemService,
    dry_run: bool,
}

impl<'a> CommentMigrator<'a> {
    #[must_use]
    pub fn new(source: &'a dyn WorkItemService, target: &'a dyn WorkItemService) -> Self {
        Self {
            source,
            target,
            dry_run: false,
        }
    }

    #[must_use]
    pub const fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Read the entries of `source_id`, oldest first.
    ///
    /// Falls back to the revision history when the discussion thread cannot
    /// be read for any reason.
    ///
    /// # Errors
    ///
    /// Fails only when the revision fallback fails too.
    pub fn fetch(&self, source_id: u64) -> Result<(Vec<CommentEntry>, CommentSource), ServiceError> {
        match self.source.comments(source_id) {
            Ok(entries) => Ok((entries, CommentSource::Thread)),
            Err(err) => {
                debug!(source_id, error = %err, "comment thread unavailable, using revisions");
                let entries = self
                    .source
                    .revisions(source_id)?
                    .iter()
                    .filter_map(|revision| {
                        revision.history().map(|text| CommentEntry {
                            text: text.to_string(),
                            created: revision.changed_date(),
                        })
                    })
                    .collect();
                Ok((entries, CommentSource::Revisions))
            }
        }
    }

    /// Append every non-empty entry of `source_id` to `target` as a history note.
    ///
    /// Returns the number of entries written, or that would be written in a
    /// dry run or against the dry-run sentinel.
    ///
    /// # Errors
    ///
    /// Propagates read failures and the first failed write.
    pub fn migrate(&self, source_id: u64, target: TargetId) -> Result<usize, ServiceError> {
        let (entries, from) = self.fetch(source_id)?;
        let texts: Vec<&str> = entries
            .iter()
            .map(|entry| entry.text.as_str())
            .filter(|text| !text.trim().is_empty())
            .collect();

        let writable = if self.dry_run { None } else { target.writable() };
        let Some(target_id) = writable else {
            debug!(source_id, count = texts.len(), ?from, "dry run: would migrate comments");
            return Ok(texts.len());
        };

        for text in &texts {
            self.target.patch(target_id, &[PatchOp::history(text)])?;
        }
        if !texts.is_empty() {
            debug!(source_id, target_id, count = texts.len(), ?from, "migrated comments");
        }
        if from == CommentSource::Revisions && texts.is_empty() {
            warn!(source_id, "no comment thread and no history notes found");
        }
        Ok(texts.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryService;
    use crate::model::{WorkEntity, fields};

    fn pair() -> (InMemoryService, InMemoryService) {
        let source = InMemoryService::new("S");
        source.insert(WorkEntity::new(100).with_field(fields::TITLE, "root"));
        let target = InMemoryService::new("T");
        target.insert(WorkEntity::new(5000));
        (source, target)
    }

    #[test]
    fn thread_entries_become_history_notes_in_order() {
        let (source, target) = pair();
        source.add_comment(100, "first");
        source.add_comment(100, "  ");
        source.add_comment(100, "second");

        let migrator = CommentMigrator::new(&source, &target);
        let written = migrator.migrate(100, TargetId::Real(5000)).expect("migrates");
        assert_eq!(written, 2);
        assert_eq!(target.history(5000), vec!["first", "second"]);
    }

    #[test]
    fn unavailable_thread_falls_back_to_revisions() {
        let (source, target) = pair();
        source.set_comments_supported(false);
        source.add_revision(100, Some("created"));
        source.add_revision(100, None);
        source.add_revision(100, Some("moved to active"));

        let migrator = CommentMigrator::new(&source, &target);
        let (entries, from) = migrator.fetch(100).expect("fetch");
        assert_eq!(from, CommentSource::Revisions);
        let texts: Vec<&str> = entries.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["created", "moved to active"]);

        migrator.migrate(100, TargetId::Real(5000)).expect("migrates");
        assert_eq!(target.history(5000), vec!["created", "moved to active"]);
    }

    #[test]
    fn dry_run_counts_without_writing() {
        let (source, target) = pair();
        source.add_comment(100, "only");

        let migrator = CommentMigrator::new(&source, &target).with_dry_run(true);
        assert_eq!(migrator.migrate(100, TargetId::Real(5000)).expect("counts"), 1);
        assert_eq!(target.mutation_count(), 0);
    }

    #[test]
    fn rerun_appends_again() {
        let (source, target) = pair();
        source.add_comment(100, "note");
        let migrator = CommentMigrator::new(&source, &target);
        migrator.migrate(100, TargetId::Real(5000)).expect("first");
        migrator.migrate(100, TargetId::Real(5000)).expect("second");
        assert_eq!(target.history(5000), vec!["note", "note"]);
    }
}
