pub mod attachments;
pub mod check;
pub mod completions;
pub mod latest;
pub mod replicate;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use witsync_core::EngineSettings;
use witsync_core::ReplicationOptions;
use witsync_core::client::ado::AdoClient;
use witsync_core::config::{Connection, FileConfig, PartialConnection, Side, resolve_connection};
use witsync_core::path::PathRemapper;

/// Source connection flags. Each falls back to its environment variable,
/// then to `[source]` in the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Source organization URL, e.g. <https://dev.azure.com/contoso>.
    #[arg(long, env = "ADO_SOURCE_ORG_URL", value_name = "URL")]
    pub source_org: Option<String>,

    /// Source project name.
    #[arg(long, env = "ADO_SOURCE_PROJECT", value_name = "NAME")]
    pub source_project: Option<String>,

    /// Source personal access token.
    #[arg(long, env = "ADO_SOURCE_PAT", hide_env_values = true, value_name = "PAT")]
    pub source_pat: Option<String>,
}

/// Target connection flags. Each falls back to its environment variable,
/// then to `[target]` in the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target organization URL.
    #[arg(long, env = "ADO_TARGET_ORG_URL", value_name = "URL")]
    pub target_org: Option<String>,

    /// Target project name.
    #[arg(long, env = "ADO_TARGET_PROJECT", value_name = "NAME")]
    pub target_project: Option<String>,

    /// Target personal access token.
    #[arg(long, env = "ADO_TARGET_PAT", hide_env_values = true, value_name = "PAT")]
    pub target_pat: Option<String>,
}

/// Where created items land in the target.
#[derive(Args, Debug, Clone, Default)]
pub struct PathArgs {
    /// Area path root for created items [default: target project].
    #[arg(long, env = "ADO_TARGET_AREA_ROOT", value_name = "PATH")]
    pub target_area_root: Option<String>,

    /// Iteration path root for created items [default: target project].
    #[arg(long, env = "ADO_TARGET_ITERATION_ROOT", value_name = "PATH")]
    pub target_iteration_root: Option<String>,

    /// Place every created item directly at the roots instead of mirroring source paths.
    #[arg(long)]
    pub force_root: bool,
}

/// Switches shared by every command that writes work items.
#[derive(Args, Debug, Clone, Default)]
pub struct WriteArgs {
    /// Read everything and report what would be written, without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Copy discussion comments as history notes (root and children).
    #[arg(long)]
    pub with_comments: bool,

    /// Copy the assignee, mapped through `[users]` in the config file.
    #[arg(long)]
    pub with_assignee: bool,

    /// Record failing roots and keep going instead of stopping.
    #[arg(long)]
    pub continue_on_error: bool,
}

impl WriteArgs {
    pub const fn options(&self) -> ReplicationOptions {
        ReplicationOptions {
            dry_run: self.dry_run,
            with_comments: self.with_comments,
            copy_assignee: self.with_assignee,
            failure_policy: if self.continue_on_error {
                witsync_core::FailurePolicy::Continue
            } else {
                witsync_core::FailurePolicy::Abort
            },
        }
    }
}

impl SourceArgs {
    fn partial(&self) -> PartialConnection {
        PartialConnection {
            org_url: self.source_org.clone(),
            project: self.source_project.clone(),
            pat: self.source_pat.clone(),
        }
    }

    /// Resolve against the config file.
    ///
    /// # Errors
    ///
    /// Names the first missing setting.
    pub fn resolve(&self, config: &FileConfig) -> Result<Connection> {
        Ok(resolve_connection(Side::Source, &self.partial(), &config.source)?)
    }
}

impl TargetArgs {
    fn partial(&self) -> PartialConnection {
        PartialConnection {
            org_url: self.target_org.clone(),
            project: self.target_project.clone(),
            pat: self.target_pat.clone(),
        }
    }

    /// Resolve against the config file.
    ///
    /// # Errors
    ///
    /// Names the first missing setting.
    pub fn resolve(&self, config: &FileConfig) -> Result<Connection> {
        Ok(resolve_connection(Side::Target, &self.partial(), &config.target)?)
    }
}

/// Load the config file named by `--config`, or the default one.
///
/// # Errors
///
/// Fails when the file cannot be read or parsed.
pub fn load_config(path: Option<&Path>) -> Result<FileConfig> {
    witsync_core::config::load_config(path).context("Failed to load witsync configuration")
}

pub fn client(connection: &Connection, config: &FileConfig) -> AdoClient {
    AdoClient::new(connection, config.timeout())
}

fn first_present(candidates: [Option<&String>; 2]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Path placement from flags, then the config file, then the target project.
pub fn path_remapper(
    source: &Connection,
    target: &Connection,
    args: &PathArgs,
    config: &FileConfig,
) -> PathRemapper {
    let area = first_present([args.target_area_root.as_ref(), config.paths.area_root.as_ref()])
        .unwrap_or_else(|| target.project.clone());
    let iteration = first_present([
        args.target_iteration_root.as_ref(),
        config.paths.iteration_root.as_ref(),
    ])
    .unwrap_or_else(|| target.project.clone());

    PathRemapper::new(&source.project, &area, &iteration)
        .with_force_root(args.force_root || config.paths.force_root)
}

pub fn engine_settings(
    source: &Connection,
    target: &Connection,
    paths: &PathArgs,
    writes: &WriteArgs,
    config: &FileConfig,
) -> EngineSettings {
    EngineSettings {
        correlation_field: config.correlation_field.clone(),
        types: config.types.mapper(),
        paths: path_remapper(source, target, paths, config),
        identities: config.identity_mapper(),
        options: writes.options(),
    }
}
