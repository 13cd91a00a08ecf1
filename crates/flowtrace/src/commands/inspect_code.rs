//! Inspect-code command - script nodes of a workflow and their issues.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde::Serialize;

use flowtrace_forensics::{
    CodeContext, CodeIssue, ForensicsError, NotFoundKind, find_issues, locate_error_context,
};
use flowtrace_types::{NodeKind, Severity, WorkflowDefinition};

use super::trace_error::print_code_context;
use super::{Context, heading, print_json, recover};

/// Arguments for the inspect-code command.
#[derive(Args, Debug)]
pub struct InspectCodeArgs {
    /// Workflow ID
    pub workflow_id: String,

    /// Only script nodes whose name contains this text (case-insensitive)
    pub node_filter: Option<String>,

    /// Locate this error message in each script
    #[arg(long)]
    pub error: Option<String>,

    /// Print issues only, without the code
    #[arg(long)]
    pub no_code: bool,
}

/// One script node for output.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScriptReport {
    node: String,
    node_type: String,
    disabled: bool,
    line_count: usize,
    issues: Vec<CodeIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<CodeContext>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

/// Run the inspect-code command.
pub async fn run(args: InspectCodeArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let (source, _) = ctx.engine(&client);

    let workflow = match source.get_workflow(&args.workflow_id).await {
        Ok(wf) => wf,
        Err(e) => {
            return recover(
                ForensicsError::from_client(e, NotFoundKind::Workflow, &args.workflow_id),
                ctx,
            );
        }
    };

    let reports = match collect(&workflow, &args, ctx) {
        Ok(reports) => reports,
        Err(e) => return recover(e, ctx),
    };

    if ctx.json_output {
        return print_json(&reports);
    }

    heading(&format!("Scripts in {} ({})", workflow.name, workflow.id));
    if reports.is_empty() {
        println!("  {}", Style::new().dim().apply_to("This workflow has no script nodes."));
        println!();
        return Ok(());
    }
    for (idx, report) in reports.iter().enumerate() {
        print_report(idx + 1, report);
    }
    println!();
    Ok(())
}

fn collect(
    workflow: &WorkflowDefinition,
    args: &InspectCodeArgs,
    ctx: &Context,
) -> flowtrace_forensics::Result<Vec<ScriptReport>> {
    let context_lines = ctx.config.analysis().context_lines;
    let filter = args.node_filter.as_deref();
    let error = args.error.as_deref();
    let needle = filter.map(str::to_lowercase);

    let scripts: Vec<_> = workflow
        .nodes_of_kind(NodeKind::Script)
        .filter_map(|node| node.script_text().map(|code| (node, code)))
        .collect();

    let selected: Vec<_> = scripts
        .iter()
        .filter(|(node, _)| {
            needle
                .as_deref()
                .is_none_or(|n| node.name.to_lowercase().contains(n))
        })
        .collect();

    if let Some(filter) = filter
        && selected.is_empty()
    {
        return Err(ForensicsError::node_not_found(
            filter,
            scripts.iter().map(|(node, _)| node.name.clone()).collect(),
        ));
    }

    Ok(selected
        .into_iter()
        .map(|(node, code)| ScriptReport {
            node: node.name.clone(),
            node_type: node.type_tag.clone(),
            disabled: node.disabled,
            line_count: code.lines().count(),
            issues: find_issues(code),
            context: error.map(|message| locate_error_context(code, message, context_lines)),
            code: (!args.no_code).then(|| code.to_string()),
        })
        .collect())
}

fn print_report(index: usize, report: &ScriptReport) {
    let dim = Style::new().dim();
    let red = Style::new().red();
    let yellow = Style::new().yellow();

    println!();
    println!(
        "{}. {} {}",
        index,
        style(&report.node).bold(),
        dim.apply_to(format!("({} lines)", report.line_count))
    );
    if report.disabled {
        println!("   {}", yellow.apply_to("disabled"));
    }

    for issue in &report.issues {
        let tag = match issue.severity {
            Severity::Warning => yellow.apply_to(issue.severity.as_str()),
            Severity::Critical | Severity::Error => red.apply_to(issue.severity.as_str()),
        };
        println!("   {} L{}: {} - {}", tag, issue.line, issue.kind.as_str(), issue.variable);
        if let Some(suggestion) = &issue.suggestion {
            println!("      {}", dim.apply_to(suggestion));
        }
    }

    if let Some(context) = &report.context {
        println!();
        print_code_context(context);
    } else if let Some(code) = &report.code {
        println!("{}", dim.apply_to("─".repeat(60)));
        for (i, line) in code.lines().enumerate() {
            println!("{} {}", dim.apply_to(format!("{:>4}", i + 1)), line);
        }
        println!("{}", dim.apply_to("─".repeat(60)));
    }
}
