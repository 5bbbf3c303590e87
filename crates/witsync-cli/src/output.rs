//! Shared output layer: human text on stdout, or stable JSON with `--json`.
//!
//! Logs go to stderr through `tracing`; nothing here writes logs.

use serde::Serialize;
use std::io::{self, Write};
use witsync_core::RunSummary;
use witsync_core::engine::{RootOutcome, RootReport};

/// Shared width for human separators.
pub const PRETTY_RULE_WIDTH: usize = 60;

/// Write a horizontal separator used by human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<24} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Render a value as JSON or through `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => {
            human_fn(value, &mut out)?;
        }
    }
    Ok(())
}

/// One progress line per root, e.g. `+ parent #100 -> #5001 (2 linked items created)`.
pub fn root_line(report: &RootReport) -> String {
    let id = report.source_id;
    let mut line = match &report.outcome {
        RootOutcome::Created { target } => format!("+ parent #{id} -> {target}"),
        RootOutcome::Existing { target } => format!("= parent #{id} already exists -> {target}"),
        RootOutcome::Missing => format!("? parent #{id} not returned by source, skipped"),
        RootOutcome::Failed { code, message } => format!("! parent #{id} failed [{code}]: {message}"),
    };

    let mut extras = Vec::new();
    if report.created_others > 0 {
        extras.push(format!("{} linked items created", report.created_others));
    }
    if report.related_links_added > 0 {
        extras.push(format!("{} related links", report.related_links_added));
    }
    if report.comments_migrated > 0 {
        extras.push(format!("{} comments", report.comments_migrated));
    }
    if !extras.is_empty() {
        line.push_str(&format!(" ({})", extras.join(", ")));
    }
    line
}

/// Print a progress line in human mode. JSON mode prints everything at the end.
pub fn progress(mode: OutputMode, report: &RootReport) {
    if !mode.is_json() {
        println!("{}", root_line(report));
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput<'a> {
    pub summary: &'a RunSummary,
    pub roots: &'a [RootReport],
}

/// The closing summary block of a run.
pub fn write_summary(w: &mut dyn Write, summary: &RunSummary) -> io::Result<()> {
    writeln!(w)?;
    let heading = if summary.dry_run {
        "Summary (dry run, nothing written)"
    } else {
        "Summary"
    };
    pretty_section(w, heading)?;
    pretty_kv(w, "Roots processed", summary.roots_processed.to_string())?;
    pretty_kv(w, "Parents created", summary.created_parents.to_string())?;
    pretty_kv(w, "Linked items created", summary.created_others.to_string())?;
    pretty_kv(w, "Related links added", summary.related_links_added.to_string())?;
    if summary.related_links_existing > 0 {
        pretty_kv(
            w,
            "Related links existing",
            summary.related_links_existing.to_string(),
        )?;
    }
    pretty_kv(w, "Skipped (already there)", summary.skipped.to_string())?;
    if summary.comments_migrated > 0 {
        pretty_kv(w, "Comments migrated", summary.comments_migrated.to_string())?;
    }
    if let Some(last) = summary.last_root_id {
        pretty_kv(w, "Last root id", last.to_string())?;
    }
    if !summary.failed_roots.is_empty() {
        writeln!(w)?;
        pretty_section(w, "Failed roots")?;
        for failure in &summary.failed_roots {
            writeln!(w, "#{} [{}] {}", failure.source_id, failure.code, failure.message)?;
        }
    }
    Ok(())
}

/// Render the end of a run: the summary in human mode, summary plus roots in JSON.
pub fn render_run(mode: OutputMode, summary: &RunSummary, roots: &[RootReport]) -> anyhow::Result<()> {
    render(mode, &RunOutput { summary, roots }, |run, w| {
        write_summary(w, run.summary)
    })
}
