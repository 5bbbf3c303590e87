#![forbid(unsafe_code)]

mod cmd;
mod output;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "witsync: replicate work bundles between Azure DevOps projects",
    long_about = None
)]
struct Cli {
    /// Enable verbose (debug) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Config file [default: <config dir>/witsync/config.toml].
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Replication",
        about = "Replicate bundles with their children and related items",
        long_about = "Replicate every root bundle in the source project, then its \
                      hierarchical children and related items. Items already carrying \
                      the source id in the correlation field are skipped, so re-running \
                      is safe. Run one replication per target project at a time.",
        after_help = "EXAMPLES:\n    # Rehearse without writing anything\n    witsync replicate --dry-run\n\n    # Resume after the last root id of a previous run\n    witsync replicate --after-id 1234 --max 50\n\n    # Keep going past failing roots\n    witsync replicate --continue-on-error --with-comments"
    )]
    Replicate(cmd::replicate::ReplicateArgs),

    #[command(
        next_help_heading = "Replication",
        about = "Copy the most recently created bundles, without links",
        after_help = "EXAMPLES:\n    # Copy the five newest bundles to the area and iteration roots\n    witsync latest --top 5\n\n    # Keep the source area and iteration layout\n    witsync latest --mirror-paths"
    )]
    Latest(cmd::latest::LatestArgs),

    #[command(
        next_help_heading = "Attachments",
        about = "Download or upload attachments of replicated items",
        subcommand
    )]
    Attachments(cmd::attachments::AttachmentsCommand),

    #[command(
        next_help_heading = "Diagnostics",
        about = "Check that the target has the types and field a run writes",
        after_help = "EXAMPLES:\n    # Probe the target project\n    witsync check --target-project TgtProj"
    )]
    Check(cmd::check::CheckArgs),

    #[command(
        next_help_heading = "Diagnostics",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    # Bash\n    witsync completions bash > /etc/bash_completion.d/witsync"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("WITSYNC_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "witsync=debug,info"
        } else {
            "witsync=info,warn"
        })
    });

    let format = env::var("WITSYNC_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = cli.output_mode();
    let config = cli.config.as_deref();
    debug!(?config, json = cli.json, "starting");

    match cli.command {
        Commands::Replicate(ref args) => cmd::replicate::run_replicate(args, config, output),
        Commands::Latest(ref args) => cmd::latest::run_latest(args, config, output),
        Commands::Attachments(ref command) => {
            cmd::attachments::run_attachments(command, config, output)
        }
        Commands::Check(ref args) => cmd::check::run_check(args, config, output),
        Commands::Completions(ref args) => {
            cmd::completions::run_completions(args.shell, &mut Cli::command())
        }
    }
}
