//! CLI command handlers.

use std::sync::Arc;

use anyhow::Result;
use console::{Style, style};
use serde::Serialize;
use tracing::debug;

use flowtrace_client::N8nClient;
use flowtrace_config::{ConfigError, FlowtraceConfig, LoadedConfig, resolve_api_key};
use flowtrace_forensics::{ForensicsError, NameCache, NotFoundKind, WorkflowSource};

pub mod analyze;
pub mod exec_delete;
pub mod exec_errors;
pub mod exec_node;
pub mod follow_chain;
pub mod inspect_code;
pub mod status;
pub mod trace_error;

/// Shared context for all commands.
#[derive(Debug)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Server URL from the command line or environment.
    server: Option<String>,
    /// Merged configuration.
    pub config: FlowtraceConfig,
}

impl Context {
    pub fn new(json_output: bool, verbose: bool, server: Option<String>, loaded: LoadedConfig) -> Self {
        Self {
            json_output,
            verbose,
            server,
            config: loaded.config,
        }
    }

    /// Server root URL; the command line wins over config files.
    pub fn server_url(&self) -> Option<String> {
        self.server.clone().or_else(|| self.config.remote().base_url)
    }

    /// Build an authenticated API client.
    pub fn client(&self) -> Result<N8nClient> {
        let remote = self.config.remote();
        let base_url = self.server_url().ok_or(ConfigError::MissingBaseUrl)?;
        let secret = resolve_api_key(&remote)?;
        debug!(source = %secret.source, "resolved API key");

        let client = N8nClient::builder()
            .base_url(base_url)
            .api_key(secret.value)
            .timeout(remote.timeout())
            .build()?;
        Ok(client)
    }

    /// The client as the engine's data source, plus a name cache over it.
    pub fn engine(&self, client: &N8nClient) -> (Arc<dyn WorkflowSource>, Arc<NameCache>) {
        let source: Arc<dyn WorkflowSource> = Arc::new(client.clone());
        let names = Arc::new(NameCache::new(source.clone(), self.config.cache().ttl()));
        (source, names)
    }
}

/// Print a value as a single pretty JSON document.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a section heading with a rule underneath.
pub fn heading(title: &str) {
    let dim = Style::new().dim();
    println!();
    println!("{}", style(title).bold());
    println!("{}", dim.apply_to("─".repeat(60)));
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Recovered {
    SetupRequired {
        endpoint: String,
        remediation: Vec<String>,
    },
    NotFound {
        kind: NotFoundKind,
        id: String,
        available: Vec<String>,
    },
}

/// Render errors that end a command normally.
///
/// A missing server capability and a missing node or run inside a fetched
/// execution are reported and exit 0. Everything else, including a missing
/// root workflow or execution, is returned to fail the command.
pub fn recover(err: ForensicsError, ctx: &Context) -> Result<()> {
    let recovered = match err {
        ForensicsError::MissingCapability {
            endpoint,
            remediation,
        } => Recovered::SetupRequired {
            endpoint,
            remediation,
        },
        ForensicsError::NotFound {
            kind: kind @ (NotFoundKind::Node | NotFoundKind::Run),
            id,
            available,
        } => Recovered::NotFound { kind, id, available },
        other => return Err(other.into()),
    };

    if ctx.json_output {
        return print_json(&recovered);
    }

    let yellow = Style::new().yellow();
    let dim = Style::new().dim();
    match recovered {
        Recovered::SetupRequired {
            endpoint,
            remediation,
        } => {
            println!();
            println!(
                "{} the server does not provide '{}'",
                yellow.apply_to("Setup required:"),
                endpoint
            );
            println!();
            for (i, step) in remediation.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
            println!();
        }
        Recovered::NotFound { kind, id, available } => {
            println!();
            println!("{} {} '{}'", yellow.apply_to("Not found:"), kind, id);
            if !available.is_empty() {
                println!();
                println!("  {}", dim.apply_to(format!("Available {}s:", kind)));
                for name in &available {
                    println!("    - {}", name);
                }
            }
            println!();
        }
    }
    Ok(())
}
