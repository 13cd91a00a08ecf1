//! Status command - tests the connection to the server.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use flowtrace_forensics::{ForensicsError, NotFoundKind};

use super::{Context, print_json, recover};

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// List the workflows as well
    #[arg(short, long)]
    pub detailed: bool,
}

/// Status response for JSON output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusOutput {
    connected: bool,
    server_url: String,
    workflow_count: usize,
    active_count: usize,
}

/// Run the status command.
pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let server_url = client.base_url().to_string();

    let workflows = match client.workflows().list_all().await {
        Ok(list) => list,
        Err(e) => return recover(ForensicsError::from_client(e, NotFoundKind::Workflow, "*"), ctx),
    };
    let active_count = workflows.iter().filter(|w| w.active).count();

    if ctx.json_output {
        return print_json(&StatusOutput {
            connected: true,
            server_url,
            workflow_count: workflows.len(),
            active_count,
        });
    }

    let green = Style::new().green();
    let dim = Style::new().dim();

    println!();
    println!("{}", style("n8n Connection").bold());
    println!("{}", dim.apply_to("─".repeat(40)));
    println!();
    println!("  {} {}", dim.apply_to("Status:"), green.apply_to("● connected"));
    println!("  {} {}", dim.apply_to("Server:"), server_url);
    println!(
        "  {} {} ({} active)",
        dim.apply_to("Workflows:"),
        workflows.len(),
        active_count
    );

    if args.detailed {
        println!();
        for wf in &workflows {
            let marker = if wf.active {
                green.apply_to("●")
            } else {
                dim.apply_to("○")
            };
            println!("  {} {} {}", marker, wf.name, dim.apply_to(format!("({})", wf.id)));
        }
    }
    println!();
    Ok(())
}
