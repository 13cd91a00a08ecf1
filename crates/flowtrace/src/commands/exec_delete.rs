//! Exec-delete command - deletes one execution.

use anyhow::Result;
use clap::Args;
use console::Style;
use serde::Serialize;
use tracing::info;

use flowtrace_forensics::{ForensicsError, NotFoundKind};

use super::{Context, print_json, recover};

/// Arguments for the exec-delete command.
#[derive(Args, Debug)]
pub struct ExecDeleteArgs {
    /// Execution ID
    pub execution_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteOutput<'a> {
    execution_id: &'a str,
    deleted: bool,
}

/// Run the exec-delete command.
pub async fn run(args: ExecDeleteArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;

    if let Err(e) = client.executions().delete(&args.execution_id).await {
        return recover(
            ForensicsError::from_client(e, NotFoundKind::Execution, &args.execution_id),
            ctx,
        );
    }
    info!(execution = %args.execution_id, "execution deleted");

    if ctx.json_output {
        return print_json(&DeleteOutput {
            execution_id: &args.execution_id,
            deleted: true,
        });
    }

    println!(
        "{} execution {}",
        Style::new().green().apply_to("Deleted"),
        args.execution_id
    );
    Ok(())
}
