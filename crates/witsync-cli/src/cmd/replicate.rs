use std::path::Path;

use anyhow::Result;
use clap::Args;
use tracing::info;
use witsync_core::{ReplicationEngine, RootReport};

use super::{PathArgs, SourceArgs, TargetArgs, WriteArgs};
use crate::output::{self, OutputMode};

/// Arguments for `witsync replicate`.
#[derive(Args, Debug, Clone, Default)]
pub struct ReplicateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub paths: PathArgs,

    #[command(flatten)]
    pub writes: WriteArgs,

    /// Stop after this many roots.
    #[arg(long, value_name = "N")]
    pub max: Option<usize>,

    /// Only roots with an id above this one; use the last id of a previous run to resume.
    #[arg(long, value_name = "ID", default_value_t = 0)]
    pub after_id: u64,

    /// Skip roots whose FIELD equals the exclude value.
    #[arg(long, env = "ADO_EXCLUDE_OWNERORG_FIELD", value_name = "FIELD")]
    pub exclude_ownerorg_field: Option<String>,

    /// Value of the exclude field that marks a root as skipped.
    #[arg(long, env = "ADO_EXCLUDE_OWNERORG_VALUE", value_name = "VALUE")]
    pub exclude_ownerorg_value: Option<String>,

    /// Ids fetched per enumeration page [default: from config, 200].
    #[arg(long, value_name = "N")]
    pub page_size: Option<usize>,
}

/// Replicate every root bundle with its children and related items.
///
/// # Errors
///
/// Fails on missing settings before any request, and on the first remote
/// error unless `--continue-on-error` is set.
pub fn run_replicate(args: &ReplicateArgs, config_path: Option<&Path>, mode: OutputMode) -> Result<()> {
    let mut config = super::load_config(config_path)?;
    let source_conn = args.source.resolve(&config)?;
    let target_conn = args.target.resolve(&config)?;

    if args.exclude_ownerorg_field.is_some() {
        config.filter.exclude_field.clone_from(&args.exclude_ownerorg_field);
    }
    if args.exclude_ownerorg_value.is_some() {
        config.filter.exclude_value.clone_from(&args.exclude_ownerorg_value);
    }

    let source = super::client(&source_conn, &config);
    let target = super::client(&target_conn, &config);
    let settings =
        super::engine_settings(&source_conn, &target_conn, &args.paths, &args.writes, &config);
    let engine = ReplicationEngine::new(&source, &target, settings);

    let selection = engine
        .root_selection()
        .with_max(args.max)
        .with_after_id(args.after_id)
        .with_exclusion(config.filter.exclusion())
        .with_page_size(args.page_size.unwrap_or(config.page_size));

    let mut reports: Vec<RootReport> = Vec::new();
    let summary = engine.run_with(selection, |report| {
        output::progress(mode, report);
        reports.push(report.clone());
    })?;

    info!(
        source_requests = source.request_count(),
        target_requests = target.request_count(),
        "replicate finished"
    );
    output::render_run(mode, &summary, &reports)
}
