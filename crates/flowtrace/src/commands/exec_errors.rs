//! Exec-errors command - failed executions across pages.

use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use flowtrace_client::{ExecutionFilter, N8nClient};
use flowtrace_forensics::trace::{ParentLink, classify_origin, find_failure};
use flowtrace_forensics::{ForensicsError, NameCache, NotFoundKind};
use flowtrace_types::{ExecutionMode, ExecutionRecord, ExecutionStatus};

use super::{Context, heading, print_json, recover};

/// Arguments for the exec-errors command.
#[derive(Args, Debug)]
pub struct ExecErrorsArgs {
    /// Only executions of this workflow
    pub workflow_id: Option<String>,

    /// Include manual (editor) runs
    #[arg(long)]
    pub include_manual: bool,

    /// Maximum executions fetched
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Only executions started in the last N hours
    #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
    pub hours: Option<i64>,
}

/// One failed execution for output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorRow {
    execution_id: String,
    workflow_id: String,
    workflow_name: String,
    started_at: Option<DateTime<Utc>>,
    mode: ExecutionMode,
    failed_node: Option<String>,
    error: Option<String>,
    parent: Option<ParentLink>,
    url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorListing {
    fetched: usize,
    excluded_manual: usize,
    executions: Vec<ErrorRow>,
}

/// Run the exec-errors command.
pub async fn run(args: ExecErrorsArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let (_, names) = ctx.engine(&client);

    let cutoff = match args.hours {
        Some(hours) => {
            let window = chrono::Duration::try_hours(hours)
                .ok_or_else(|| anyhow!("--hours {} is out of range", hours))?;
            Some(Utc::now() - window)
        }
        None => None,
    };

    let filter = ExecutionFilter {
        workflow_id: args.workflow_id.clone(),
        status: Some(ExecutionStatus::Error),
        include_data: true,
        limit: Some(args.limit),
    };

    let executions = match client.executions().list_all(&filter).await {
        Ok(list) => list,
        Err(e) => {
            let target = args.workflow_id.as_deref().unwrap_or("executions");
            return recover(ForensicsError::from_client(e, NotFoundKind::Workflow, target), ctx);
        }
    };

    let fetched = executions.len();
    let recent: Vec<ExecutionRecord> = executions
        .into_iter()
        .filter(|e| match (cutoff, e.started_at) {
            (Some(cutoff), Some(started)) => started >= cutoff,
            (Some(_), None) => false,
            (None, _) => true,
        })
        .collect();
    let before_manual = recent.len();
    let kept: Vec<ExecutionRecord> = recent
        .into_iter()
        .filter(|e| args.include_manual || e.mode != ExecutionMode::Manual)
        .collect();
    let excluded_manual = before_manual - kept.len();

    let mut rows = Vec::with_capacity(kept.len());
    for execution in &kept {
        rows.push(row(execution, &names, &client).await);
    }

    let listing = ErrorListing {
        fetched,
        excluded_manual,
        executions: rows,
    };

    if ctx.json_output {
        return print_json(&listing);
    }

    print_listing(&listing, &args);
    Ok(())
}

async fn row(execution: &ExecutionRecord, names: &NameCache, client: &N8nClient) -> ErrorRow {
    let workflow_name = match &execution.workflow {
        Some(wf) if !wf.name.is_empty() => wf.name.clone(),
        _ => names.resolve(&execution.workflow_id).await.name,
    };

    let failure = find_failure(execution);
    let error = failure
        .as_ref()
        .map(|(_, e)| e.message.clone())
        .or_else(|| execution.error.as_ref().map(|e| e.message.clone()));

    let parent = match classify_origin(execution).1 {
        Some((execution_id, workflow_id)) => Some(ParentLink {
            workflow_name: names.resolve(&workflow_id).await.name,
            execution_id,
            workflow_id,
        }),
        None => None,
    };

    ErrorRow {
        execution_id: execution.id.clone(),
        workflow_id: execution.workflow_id.clone(),
        workflow_name,
        started_at: execution.started_at,
        mode: execution.mode,
        failed_node: failure.map(|(node, _)| node),
        error,
        parent,
        url: client.execution_url(&execution.workflow_id, &execution.id),
    }
}

fn print_listing(listing: &ErrorListing, args: &ExecErrorsArgs) {
    let dim = Style::new().dim();
    let red = Style::new().red();

    heading("Failed executions");
    if let Some(id) = &args.workflow_id {
        println!("  {} {}", dim.apply_to("Workflow:"), id);
    }
    if let Some(hours) = args.hours {
        println!("  {} last {} hours", dim.apply_to("Window:"), hours);
    }
    if listing.excluded_manual > 0 {
        println!(
            "  {}",
            dim.apply_to(format!(
                "{} manual run(s) hidden; use --include-manual to show them",
                listing.excluded_manual
            ))
        );
    }

    if listing.executions.is_empty() {
        println!();
        println!("  {}", Style::new().green().apply_to("No failed executions."));
        println!();
        return;
    }

    for row in &listing.executions {
        println!();
        let started = row
            .started_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "  {} {} {}",
            style(&row.execution_id).bold(),
            row.workflow_name,
            dim.apply_to(started)
        );
        if let Some(node) = &row.failed_node {
            println!("    {} {}", dim.apply_to("Node:"), red.apply_to(node));
        }
        if let Some(error) = &row.error {
            println!("    {} {}", dim.apply_to("Error:"), error);
        }
        if let Some(parent) = &row.parent {
            println!(
                "    {} {} ({})",
                dim.apply_to("Called by:"),
                parent.workflow_name,
                parent.execution_id
            );
        }
        println!("    {}", dim.apply_to(&row.url));
    }
    println!();
}
