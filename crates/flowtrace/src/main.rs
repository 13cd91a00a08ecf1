//! flowtrace - n8n workflow execution forensics
//!
//! Main entry point for the flowtrace CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;

mod commands;

use commands::{analyze, exec_delete, exec_errors, exec_node, follow_chain, inspect_code, status, trace_error};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// flowtrace - n8n workflow execution forensics
#[derive(Parser)]
#[command(name = "flowtrace")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// n8n server URL (overrides [remote] base_url)
    #[arg(long, global = true, env = "N8N_BASE_URL")]
    pub server: Option<String>,

    /// Config directory (default: $FLOWTRACE_CONFIG_DIR or ~/.config/flowtrace)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Explain why an execution failed
    TraceError(trace_error::TraceErrorArgs),

    /// Show script nodes of a workflow and their issues
    InspectCode(inspect_code::InspectCodeArgs),

    /// Show the sub-workflow dependency tree of a workflow
    FollowChain(follow_chain::FollowChainArgs),

    /// Run structural integrity checks on a workflow
    Analyze(analyze::AnalyzeArgs),

    /// Show one node's input and output in an execution
    ExecNode(exec_node::ExecNodeArgs),

    /// List failed executions
    ExecErrors(exec_errors::ExecErrorsArgs),

    /// Delete an execution
    ExecDelete(exec_delete::ExecDeleteArgs),

    /// Test the connection to the server
    Status(status::StatusArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = flowtrace_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    let _guard = init_tracing(cli.verbose, &loaded);

    for warning in &loaded.warnings {
        warn!("{}", warning);
    }

    let ctx = commands::Context::new(cli.json, cli.verbose, cli.server, loaded);

    match cli.command {
        Commands::TraceError(args) => trace_error::run(args, &ctx).await,
        Commands::InspectCode(args) => inspect_code::run(args, &ctx).await,
        Commands::FollowChain(args) => follow_chain::run(args, &ctx).await,
        Commands::Analyze(args) => analyze::run(args, &ctx).await,
        Commands::ExecNode(args) => exec_node::run(args, &ctx).await,
        Commands::ExecErrors(args) => exec_errors::run(args, &ctx).await,
        Commands::ExecDelete(args) => exec_delete::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
    }
}

/// Console (human-readable, stderr) + rotating JSON file.
///
/// Stdout is reserved for command output so `--json` stays one document.
fn init_tracing(verbose: bool, loaded: &flowtrace_config::LoadedConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "flowtrace=debug,flowtrace_forensics=debug,flowtrace_client=debug,flowtrace_config=debug,info"
    } else {
        "flowtrace=info,flowtrace_forensics=info,flowtrace_client=info,flowtrace_config=info,warn"
    };

    let log_dir = loaded
        .config
        .logging()
        .file
        .then(|| loaded.config_dir.as_ref().map(|d| d.join("logs")))
        .flatten();

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "flowtrace.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "flowtrace=trace,flowtrace_forensics=trace,flowtrace_client=trace,flowtrace_config=trace,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(verbose)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    guard
}
