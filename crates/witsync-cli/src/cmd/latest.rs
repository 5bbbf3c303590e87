use std::path::Path;

use anyhow::Result;
use clap::Args;
use witsync_core::{ReplicationEngine, RootReport};

use super::{PathArgs, SourceArgs, TargetArgs, WriteArgs};
use crate::output::{self, OutputMode};

/// Arguments for `witsync latest`.
#[derive(Args, Debug, Clone)]
pub struct LatestArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub paths: PathArgs,

    #[command(flatten)]
    pub writes: WriteArgs,

    /// How many of the most recently created bundles to copy.
    #[arg(long, value_name = "N", default_value_t = 10)]
    pub top: usize,

    /// Mirror source area and iteration paths instead of placing copies at the roots.
    #[arg(long, conflicts_with = "force_root")]
    pub mirror_paths: bool,
}

impl LatestArgs {
    /// Copies land at the area and iteration roots unless `--mirror-paths` is set.
    pub fn placement(&self) -> PathArgs {
        PathArgs {
            force_root: !self.mirror_paths,
            ..self.paths.clone()
        }
    }
}

/// Copy the most recently created bundles, without their links.
///
/// # Errors
///
/// Fails on missing settings before any request, and on remote errors.
pub fn run_latest(args: &LatestArgs, config_path: Option<&Path>, mode: OutputMode) -> Result<()> {
    let config = super::load_config(config_path)?;
    let source_conn = args.source.resolve(&config)?;
    let target_conn = args.target.resolve(&config)?;

    let source = super::client(&source_conn, &config);
    let target = super::client(&target_conn, &config);
    let settings = super::engine_settings(
        &source_conn,
        &target_conn,
        &args.placement(),
        &args.writes,
        &config,
    );

    let mut reports: Vec<RootReport> = Vec::new();
    let summary = ReplicationEngine::new(&source, &target, settings).copy_recent(args.top, |report| {
        output::progress(mode, report);
        reports.push(report.clone());
    })?;

    output::render_run(mode, &summary, &reports)
}
