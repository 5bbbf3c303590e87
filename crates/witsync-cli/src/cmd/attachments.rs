use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use witsync_core::attachments::{download_attachments, upload_attachments};

use super::{SourceArgs, TargetArgs};
use crate::output::{self, OutputMode};

#[derive(Subcommand, Debug, Clone)]
pub enum AttachmentsCommand {
    #[command(
        about = "Download source attachments of replicated items",
        after_help = "EXAMPLES:\n    # Stage files under ./att/<target>_from_<source>/\n    witsync attachments download --dir ./att"
    )]
    Download(DownloadArgs),

    #[command(
        about = "Attach staged files to their target items",
        after_help = "EXAMPLES:\n    # Upload everything staged by a previous download\n    witsync attachments upload --dir ./att"
    )]
    Upload(UploadArgs),
}

/// Staging directory and item bound shared by both directions.
#[derive(Args, Debug, Clone)]
pub struct StagingArgs {
    /// Staging directory holding one `<target>_from_<source>` folder per item.
    #[arg(long, env = "ADO_ATTACHMENTS_DIR", value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Examine at most this many target items (download) or folders (upload).
    #[arg(long, value_name = "N")]
    pub max: Option<usize>,
}

impl StagingArgs {
    fn dir(&self) -> Result<&Path> {
        self.dir
            .as_deref()
            .context("missing required setting `dir` (use --dir or set ADO_ATTACHMENTS_DIR)")
    }
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub staging: StagingArgs,
}

#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    #[command(flatten)]
    pub staging: StagingArgs,
}

/// Dispatch `witsync attachments <direction>`.
///
/// # Errors
///
/// Fails on missing settings before any request, and on the first remote or
/// filesystem error.
pub fn run_attachments(
    command: &AttachmentsCommand,
    config_path: Option<&Path>,
    mode: OutputMode,
) -> Result<()> {
    let config = super::load_config(config_path)?;
    match command {
        AttachmentsCommand::Download(args) => {
            let source_conn = args.source.resolve(&config)?;
            let target_conn = args.target.resolve(&config)?;
            let dir = args.staging.dir()?;
            let source = super::client(&source_conn, &config);
            let target = super::client(&target_conn, &config);

            let report = download_attachments(
                &source,
                &target,
                dir,
                &config.correlation_field,
                args.staging.max,
                config.page_size,
            )
            .with_context(|| format!("Failed to download attachments into {}", dir.display()))?;

            output::render(mode, &report, |report, w| {
                output::pretty_section(w, "Attachment download")?;
                output::pretty_kv(w, "Items with files", report.items.to_string())?;
                output::pretty_kv(w, "Downloaded", report.downloaded.to_string())?;
                output::pretty_kv(w, "Already on disk", report.already_present.to_string())?;
                output::pretty_kv(w, "Missing sources", report.missing_sources.to_string())?;
                output::pretty_kv(w, "Directory", dir.display().to_string())
            })
        }
        AttachmentsCommand::Upload(args) => {
            let target_conn = args.target.resolve(&config)?;
            let dir = args.staging.dir()?;
            let target = super::client(&target_conn, &config);

            let report =
                upload_attachments(&target, dir, &config.correlation_field, args.staging.max)
                    .with_context(|| format!("Failed to upload attachments from {}", dir.display()))?;

            output::render(mode, &report, |report, w| {
                output::pretty_section(w, "Attachment upload")?;
                output::pretty_kv(w, "Items", report.items.to_string())?;
                output::pretty_kv(w, "Uploaded", report.uploaded.to_string())?;
                output::pretty_kv(w, "Already attached", report.already_attached.to_string())?;
                output::pretty_kv(w, "Missing targets", report.missing_targets.to_string())?;
                output::pretty_kv(w, "Mismatched folders", report.mismatched.to_string())
            })
        }
    }
}
