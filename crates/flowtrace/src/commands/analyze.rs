//! Analyze command - structural integrity checks.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use flowtrace_forensics::integrity::Finding;
use flowtrace_forensics::{ForensicsError, NotFoundKind, analyze};
use flowtrace_types::Severity;

use super::{Context, heading, print_json, recover};

/// Arguments for the analyze command.
#[derive(Args, Debug)]
pub struct AnalyzeArgs {
    /// Workflow ID
    pub workflow_id: String,
}

/// Run the analyze command.
pub async fn run(args: AnalyzeArgs, ctx: &Context) -> Result<()> {
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

    let report = analyze(&workflow);

    if ctx.json_output {
        return print_json(&report);
    }

    let dim = Style::new().dim();
    let score_style = match report.integrity_score {
        90..=100 => Style::new().green().bold(),
        60..=89 => Style::new().yellow().bold(),
        _ => Style::new().red().bold(),
    };

    heading(&format!("Integrity of {} ({})", report.workflow_name, report.workflow_id));
    println!(
        "  {} {}/100",
        dim.apply_to("Score:"),
        score_style.apply_to(report.integrity_score)
    );
    println!("  {} {}", dim.apply_to("Nodes:"), report.node_count);
    if report.fragment_status.is_fragment {
        println!(
            "  {} fragment (missing {})",
            Style::new().yellow().apply_to("Shape:"),
            report.fragment_status.missing.join(", ")
        );
    }

    print_findings("Dead ends", &report.dead_ends);
    print_findings("Loops", &report.loop_issues);
    print_findings("Orphaned nodes", &report.orphaned_nodes);
    print_findings("Branches", &report.branch_issues);

    if !report.code_issues.is_empty() {
        heading("Code issues");
        for node in &report.code_issues {
            println!("  {}", style(&node.node).bold());
            for issue in &node.issues {
                println!(
                    "    {} L{}: {} - {}",
                    severity_tag(issue.severity),
                    issue.line,
                    issue.kind.as_str(),
                    issue.variable
                );
            }
        }
    }

    if !report.sub_workflow_references.is_empty() {
        heading("Sub-workflow calls");
        for reference in &report.sub_workflow_references {
            let name = reference.cached_name.as_deref().unwrap_or("");
            println!(
                "  {} → {} {}{}",
                reference.node,
                reference.workflow_id,
                dim.apply_to(name),
                if reference.disabled { " (disabled)" } else { "" }
            );
        }
    }

    if !report.issues.is_empty() {
        heading("Incomplete data");
        for issue in &report.issues {
            println!("  {} {}", Style::new().yellow().apply_to("!"), issue);
        }
    }

    if report.is_clean() {
        println!();
        println!("  {}", Style::new().green().apply_to("No issues found."));
    }
    println!();
    Ok(())
}

fn print_findings(title: &str, findings: &[Finding]) {
    if findings.is_empty() {
        return;
    }
    heading(title);
    for finding in findings {
        println!(
            "  {} {} {}",
            severity_tag(finding.severity),
            style(&finding.node).bold(),
            Style::new().dim().apply_to(&finding.message)
        );
    }
}

fn severity_tag(severity: Severity) -> String {
    let style = match severity {
        Severity::Critical => Style::new().red().bold(),
        Severity::Error => Style::new().red(),
        Severity::Warning => Style::new().yellow(),
    };
    style.apply_to(format!("{:<8}", severity.as_str())).to_string()
}
