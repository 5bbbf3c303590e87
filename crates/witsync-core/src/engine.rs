//! The replication engine.
//!
//! Drives one root at a time through
//! `RESOLVE_PARENT -> CREATE | SKIP -> COMMENTS? -> RECONCILE_CHILDREN -> RECONCILE_RELATED`.
//! All state is in memory; re-running is safe because every create is
//! preceded by a correlation lookup. Only one engine may write to a given
//! target project at a time.

use serde::Serialize;
use tracing::{info, warn};

use crate::client::{WorkItemQuery, WorkItemService};
use crate::comments::CommentMigrator;
use crate::correlation::CorrelationResolver;
use crate::enumerate::{ParentEnumerator, RootSelection};
use crate::error::{ServiceError, SyncError};
use crate::mapping::{IdentityMapper, TypeMapper};
use crate::model::{TargetId, WorkEntity, fields};
use crate::path::PathRemapper;
use crate::preflight::{PreflightWarning, preflight};
use crate::upsert::EntityUpsert;

/// What to do when one root fails mid-run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the run and return the error.
    #[default]
    Abort,
    /// Record the failure and move on to the next root.
    Continue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationOptions {
    pub dry_run: bool,
    pub with_comments: bool,
    pub copy_assignee: bool,
    pub failure_policy: FailurePolicy,
}

/// Everything the engine needs besides the two services.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub correlation_field: String,
    pub types: TypeMapper,
    pub paths: PathRemapper,
    pub identities: IdentityMapper,
    pub options: ReplicationOptions,
}

/// A root that failed under [`FailurePolicy::Continue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootFailure {
    pub source_id: u64,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub dry_run: bool,
    pub roots_processed: usize,
    pub created_parents: usize,
    pub created_others: usize,
    pub related_links_added: usize,
    pub related_links_existing: usize,
    pub skipped: usize,
    pub comments_migrated: usize,
    /// Highest root id reached; pass it as `--after-id` to resume.
    pub last_root_id: Option<u64>,
    pub failed_roots: Vec<RootFailure>,
}

impl RunSummary {
    #[must_use]
    pub const fn created(&self) -> usize {
        self.created_parents + self.created_others
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RootOutcome {
    Created { target: TargetId },
    /// Already on the target, or already planned earlier in a dry run.
    Existing { target: TargetId },
    /// The source returned nothing for the id.
    Missing,
    Failed { code: &'static str, message: String },
}

/// Progress for one root, handed to the run observer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootReport {
    pub source_id: u64,
    #[serde(flatten)]
    pub outcome: RootOutcome,
    pub created_others: usize,
    pub related_links_added: usize,
    pub comments_migrated: usize,
}

pub struct ReplicationEngine<'a> {
    pub(crate) source: &'a dyn WorkItemService,
    pub(crate) target: &'a dyn WorkItemService,
    pub(crate) types: TypeMapper,
    pub(crate) options: ReplicationOptions,
    pub(crate) resolver: CorrelationResolver<'a>,
    pub(crate) upsert: EntityUpsert<'a>,
    pub(crate) comments: CommentMigrator<'a>,
    pub(crate) summary: RunSummary,
}

impl<'a> ReplicationEngine<'a> {
    #[must_use]
    pub fn new(
        source: &'a dyn WorkItemService,
        target: &'a dyn WorkItemService,
        settings: EngineSettings,
    ) -> Self {
        let EngineSettings {
            correlation_field,
            types,
            paths,
            identities,
            options,
        } = settings;

        let upsert = EntityUpsert::new(target, &correlation_field, paths)
            .with_assignees(options.copy_assignee.then_some(identities))
            .with_dry_run(options.dry_run);

        Self {
            source,
            target,
            types,
            options,
            resolver: CorrelationResolver::new(target, &correlation_field),
            upsert,
            comments: CommentMigrator::new(source, target).with_dry_run(options.dry_run),
            summary: RunSummary {
                dry_run: options.dry_run,
                ..RunSummary::default()
            },
        }
    }

    /// The root selection matching this engine's root types.
    #[must_use]
    pub fn root_selection(&self) -> RootSelection {
        RootSelection::new(self.types.root_types().to_vec())
    }

    /// Probe the target and log each warning.
    pub fn preflight(&self) -> Vec<PreflightWarning> {
        let warnings = preflight(self.target, &self.types, self.resolver.field());
        for warning in &warnings {
            warn!(%warning, "preflight");
        }
        warnings
    }

    /// Replicate every root in `selection`.
    ///
    /// # Errors
    ///
    /// Enumeration failures always abort. A failure while processing a root
    /// aborts under [`FailurePolicy::Abort`] and is recorded otherwise.
    pub fn run(self, selection: RootSelection) -> Result<RunSummary, SyncError> {
        self.run_with(selection, |_| {})
    }

    /// Like [`run`](Self::run), reporting each root to `observer` as it finishes.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub fn run_with(
        mut self,
        selection: RootSelection,
        mut observer: impl FnMut(&RootReport),
    ) -> Result<RunSummary, SyncError> {
        self.preflight();
        info!(
            source = self.source.project(),
            target = self.target.project(),
            dry_run = self.options.dry_run,
            after_id = selection.after_id,
            max = ?selection.max,
            "starting replication"
        );

        for next in ParentEnumerator::new(self.source, selection) {
            let root_id = next?;
            self.summary.last_root_id = Some(root_id);
            let outcome = self.process_root(root_id);
            self.settle(root_id, outcome, &mut observer)?;
        }

        info!(
            processed = self.summary.roots_processed,
            created = self.summary.created(),
            skipped = self.summary.skipped,
            failed = self.summary.failed_roots.len(),
            "replication finished"
        );
        Ok(self.summary)
    }

    /// Copy the `top` most recently created roots without traversing their links.
    ///
    /// # Errors
    ///
    /// Query failures always abort; per-root failures follow the failure policy.
    pub fn copy_recent(
        mut self,
        top: usize,
        mut observer: impl FnMut(&RootReport),
    ) -> Result<RunSummary, SyncError> {
        self.preflight();
        let query = WorkItemQuery::RecentlyCreated {
            types: self.types.root_types().to_vec(),
        };
        let ids = self.source.query(&query, Some(top))?;
        info!(count = ids.len(), top, "copying most recent roots");

        for root_id in ids {
            self.summary.last_root_id = Some(root_id);
            let outcome = self.process_flat(root_id);
            self.settle(root_id, outcome, &mut observer)?;
        }
        Ok(self.summary)
    }

    fn settle(
        &mut self,
        source_id: u64,
        outcome: Result<(RootOutcome, RunSummary), ServiceError>,
        observer: &mut impl FnMut(&RootReport),
    ) -> Result<(), SyncError> {
        let report = match outcome {
            Ok((outcome, before)) => {
                self.summary.roots_processed += 1;
                RootReport {
                    source_id,
                    outcome,
                    created_others: self.summary.created_others - before.created_others,
                    related_links_added: self.summary.related_links_added
                        - before.related_links_added,
                    comments_migrated: self.summary.comments_migrated - before.comments_migrated,
                }
            }
            Err(err) => {
                if self.options.failure_policy == FailurePolicy::Abort {
                    warn!(
                        source_id,
                        created = self.summary.created(),
                        "aborting run"
                    );
                    return Err(err.into());
                }
                warn!(source_id, error = %err, "root failed, continuing");
                let failure = RootFailure {
                    source_id,
                    code: err.code().code(),
                    message: err.to_string(),
                };
                self.summary.failed_roots.push(failure.clone());
                RootReport {
                    source_id,
                    outcome: RootOutcome::Failed {
                        code: failure.code,
                        message: failure.message,
                    },
                    created_others: 0,
                    related_links_added: 0,
                    comments_migrated: 0,
                }
            }
        };
        observer(&report);
        Ok(())
    }

    fn fetch_root(&self, root_id: u64) -> Result<Option<WorkEntity>, ServiceError> {
        let root = self.source.get(root_id, fields::ROOT_FIELDS)?;
        if root.is_none() {
            warn!(root_id, "root not returned by the source, skipping");
        }
        Ok(root)
    }

    /// Resolve or create the counterpart of a root and migrate its comments.
    fn upsert_root(&mut self, root: &WorkEntity) -> Result<(TargetId, RootOutcome), ServiceError> {
        let (target, outcome) = if let Some(existing) = self.resolver.resolve(root.id)? {
            self.summary.skipped += 1;
            (existing, RootOutcome::Existing { target: existing })
        } else {
            let created = self
                .upsert
                .create(self.types.target_root_type(), root, None)?;
            self.resolver.record(root.id, created);
            self.summary.created_parents += 1;
            (created, RootOutcome::Created { target: created })
        };

        if self.options.with_comments {
            self.summary.comments_migrated += self.comments.migrate(root.id, target)?;
        }
        Ok((target, outcome))
    }

    fn process_root(&mut self, root_id: u64) -> Result<(RootOutcome, RunSummary), ServiceError> {
        let before = self.summary.clone();
        let Some(root) = self.fetch_root(root_id)? else {
            return Ok((RootOutcome::Missing, before));
        };

        let (target, outcome) = self.upsert_root(&root)?;
        self.reconcile(root_id, target)?;
        Ok((outcome, before))
    }

    fn process_flat(&mut self, root_id: u64) -> Result<(RootOutcome, RunSummary), ServiceError> {
        let before = self.summary.clone();
        let Some(root) = self.fetch_root(root_id)? else {
            return Ok((RootOutcome::Missing, before));
        };
        let (_, outcome) = self.upsert_root(&root)?;
        Ok((outcome, before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::InMemoryService;

    fn settings(options: ReplicationOptions) -> EngineSettings {
        EngineSettings {
            correlation_field: fields::REFLECTED_WORK_ITEM_ID.to_string(),
            types: TypeMapper::default(),
            paths: PathRemapper::new("SrcProj", "TgtProj", "TgtProj"),
            identities: IdentityMapper::default(),
            options,
        }
    }

    fn bundle(id: u64, created: &str) -> WorkEntity {
        WorkEntity::new(id)
            .with_field(fields::WORK_ITEM_TYPE, "Work Bundle")
            .with_field(fields::TITLE, format!("Bundle {id}"))
            .with_field(fields::CREATED_DATE, created)
    }

    #[test]
    fn copy_recent_takes_newest_roots_only() {
        let source = InMemoryService::new("SrcProj");
        source.insert(bundle(1, "2025-01-01T00:00:00Z"));
        source.insert(bundle(2, "2025-03-01T00:00:00Z"));
        source.insert(bundle(3, "2025-02-01T00:00:00Z"));
        let target = InMemoryService::new("TgtProj").with_next_id(700);

        let engine = ReplicationEngine::new(&source, &target, settings(ReplicationOptions::default()));
        let mut seen = Vec::new();
        let summary = engine
            .copy_recent(2, |report| seen.push(report.source_id))
            .expect("copies");

        assert_eq!(seen, vec![2, 3]);
        assert_eq!(summary.created_parents, 2);
        assert_eq!(target.find_by_field(fields::REFLECTED_WORK_ITEM_ID, "1"), Vec::<u64>::new());
    }

    #[test]
    fn missing_root_is_skipped_with_a_report() {
        let source = InMemoryService::new("SrcProj");
        let target = InMemoryService::new("TgtProj");
        let mut engine =
            ReplicationEngine::new(&source, &target, settings(ReplicationOptions::default()));
        let (outcome, _) = engine.process_root(404).expect("tolerated");
        assert_eq!(outcome, RootOutcome::Missing);
        assert_eq!(engine.summary.created(), 0);
    }

    #[test]
    fn report_serializes_flat() {
        let report = RootReport {
            source_id: 100,
            outcome: RootOutcome::Created {
                target: TargetId::Real(5001),
            },
            created_others: 2,
            related_links_added: 1,
            comments_migrated: 0,
        };
        let value = serde_json::to_value(&report).expect("serializes");
        assert_eq!(value["status"], "created");
        assert_eq!(value["target"], 5001);
        assert_eq!(value["source_id"], 100);
    }
}
