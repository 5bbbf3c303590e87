use std::path::Path;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use witsync_core::preflight::{PreflightWarning, preflight};

use super::TargetArgs;
use crate::output::{self, OutputMode};

/// Arguments for `witsync check`.
#[derive(Args, Debug, Clone, Default)]
pub struct CheckArgs {
    #[command(flatten)]
    pub target: TargetArgs,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    project: String,
    correlation_field: String,
    target_types: Vec<String>,
    warnings: Vec<PreflightWarning>,
}

/// Probe the target for the types and field a run will write.
///
/// Warnings are reported but never fail the command.
///
/// # Errors
///
/// Fails only on missing settings or an unreadable config file.
pub fn run_check(args: &CheckArgs, config_path: Option<&Path>, mode: OutputMode) -> Result<()> {
    let config = super::load_config(config_path)?;
    let target_conn = args.target.resolve(&config)?;
    let target = super::client(&target_conn, &config);
    let types = config.types.mapper();

    let report = CheckReport {
        project: target_conn.project.clone(),
        correlation_field: config.correlation_field.clone(),
        target_types: types.target_types().into_iter().map(ToString::to_string).collect(),
        warnings: preflight(&target, &types, &config.correlation_field),
    };

    output::render(mode, &report, |report, w| {
        output::pretty_section(w, &format!("Preflight: {}", report.project))?;
        output::pretty_kv(w, "Correlation field", &report.correlation_field)?;
        output::pretty_kv(w, "Target types", report.target_types.join(", "))?;
        writeln!(w)?;
        if report.warnings.is_empty() {
            writeln!(w, "No problems found.")?;
        }
        for warning in &report.warnings {
            writeln!(w, "warning: {warning}")?;
        }
        Ok(())
    })
}
