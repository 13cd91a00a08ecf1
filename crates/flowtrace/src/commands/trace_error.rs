//! Trace-error command - explains why an execution failed.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use flowtrace_forensics::trace::{ErrorTrace, Origin, TriggerEvidence};
use flowtrace_forensics::{CodeContext, ErrorTracer, TraceOptions};

use super::{Context, heading, print_json, recover};

/// Arguments for the trace-error command.
#[derive(Args, Debug)]
pub struct TraceErrorArgs {
    /// Execution ID
    pub execution_id: String,

    /// Lines of code context around a located error line
    #[arg(long)]
    pub context: Option<usize>,
}

/// Run the trace-error command.
pub async fn run(args: TraceErrorArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let (source, names) = ctx.engine(&client);

    let options = TraceOptions {
        context_lines: args
            .context
            .unwrap_or(ctx.config.analysis().context_lines),
    };
    let tracer = ErrorTracer::new(source, names, options);

    let trace = match tracer.trace(&args.execution_id).await {
        Ok(trace) => trace,
        Err(e) => return recover(e, ctx),
    };

    if ctx.json_output {
        return print_json(&trace);
    }

    print_trace(&trace, ctx);
    println!(
        "  {} {}",
        Style::new().dim().apply_to("Open:"),
        client.execution_url(&trace.workflow_id, &trace.execution_id)
    );
    println!();
    Ok(())
}

fn print_trace(trace: &ErrorTrace, ctx: &Context) {
    let dim = Style::new().dim();
    let red = Style::new().red();
    let green = Style::new().green();
    let yellow = Style::new().yellow();

    heading(&format!("Execution {}", trace.execution_id));
    println!(
        "  {} {} ({})",
        dim.apply_to("Workflow:"),
        trace.workflow_name.as_deref().unwrap_or("?"),
        trace.workflow_id
    );
    println!(
        "  {} {} / {}",
        dim.apply_to("Status:"),
        trace.status.as_str(),
        trace.mode.as_str()
    );

    match (&trace.failed_node, &trace.error) {
        (Some(node), Some(error)) => {
            println!(
                "  {} {} {}",
                dim.apply_to("Failed:"),
                red.apply_to(node),
                dim.apply_to(trace.failed_node_type.as_deref().unwrap_or(""))
            );
            println!("  {} {}", dim.apply_to("Error:"), error.message);
            if let Some(description) = &error.description {
                println!("  {} {}", dim.apply_to("Detail:"), description);
            }
            if ctx.verbose
                && let Some(stack) = &error.stack
            {
                println!();
                for line in stack.lines().take(12) {
                    println!("    {}", dim.apply_to(line));
                }
            }
        }
        _ => {
            println!();
            println!("  {}", green.apply_to("No failing node; nothing to trace."));
        }
    }

    heading("Origin");
    match (&trace.origin, &trace.parent) {
        (Origin::Integrated, Some(parent)) => {
            println!("  Called by workflow {} ({})", style(&parent.workflow_name).bold(), parent.workflow_id);
            println!("  {} {}", dim.apply_to("Parent execution:"), parent.execution_id);
            println!(
                "  {}",
                dim.apply_to(format!("Re-run: flowtrace trace-error {}", parent.execution_id))
            );
        }
        (Origin::OriginUnknown, _) => {
            println!("  {}", yellow.apply_to("Sub-workflow run, but the parent execution was not recorded"));
        }
        _ => println!("  Root execution (not called by another workflow)"),
    }

    if let Some(trigger) = trigger_with_blanks(trace) {
        heading("Possibly missing input");
        println!(
            "  {} {} ({} item(s))",
            dim.apply_to("Trigger:"),
            trigger.node,
            trigger.item_count
        );
        for path in &trigger.missing_parameters {
            println!("    {} {}", yellow.apply_to("∅"), path);
        }
    }

    if !trace.node_chain.is_empty() {
        heading("Node chain");
        for entry in &trace.node_chain {
            let marker = if entry.failed { red.apply_to("✗") } else { green.apply_to("✓") };
            let timing = entry
                .execution_time_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_default();
            let runs = if entry.run_count > 1 {
                format!(" ×{}", entry.run_count)
            } else {
                String::new()
            };
            println!("  {} {}{} {}", marker, entry.name, runs, dim.apply_to(timing));
            if let Some(error) = &entry.error {
                println!("      {}", red.apply_to(error));
            }
        }
    }

    if let Some(code) = &trace.local_code {
        heading("Code context");
        print_code_context(code);
    }

    if let Some(nested) = &trace.nested {
        heading(&format!(
            "Sub-workflow {} ({}) via {}",
            nested.workflow_name, nested.workflow_id, nested.invoked_via
        ));
        for script in &nested.scripts {
            println!("  {} {} issue(s)", style(&script.node).bold(), script.issues.len());
            for issue in &script.issues {
                println!(
                    "    L{} {} {} {}",
                    issue.line,
                    issue.severity,
                    issue.kind.as_str(),
                    issue.variable
                );
            }
        }
        match &nested.best_match {
            Some(best) => {
                println!();
                println!(
                    "  {} {} line {} ({:.0}% confidence)",
                    dim.apply_to("Most likely:"),
                    best.node,
                    best.line,
                    best.confidence * 100.0
                );
                if let Some(script) = nested.scripts.iter().find(|s| s.node == best.node) {
                    print_code_context(&script.context);
                }
            }
            None => println!("  {}", dim.apply_to("No script line matches the error message.")),
        }
    }

    if !trace.issues.is_empty() {
        heading("Incomplete data");
        for issue in &trace.issues {
            println!("  {} {}", yellow.apply_to("!"), issue);
        }
    }
    println!();
}

fn trigger_with_blanks(trace: &ErrorTrace) -> Option<&TriggerEvidence> {
    trace
        .trigger
        .as_ref()
        .filter(|t| !t.missing_parameters.is_empty())
}

/// Numbered code lines with the error line highlighted.
pub fn print_code_context(code: &CodeContext) {
    let dim = Style::new().dim();
    let red = Style::new().red().bold();

    if !code.found {
        println!("  {}", dim.apply_to("Could not match the error to a line."));
        return;
    }
    for line in &code.lines {
        if line.is_error {
            println!("  {} {}", red.apply_to(format!("{:>4} →", line.number)), line.text);
        } else {
            println!("  {} {}", dim.apply_to(format!("{:>4}  ", line.number)), line.text);
        }
    }
}
