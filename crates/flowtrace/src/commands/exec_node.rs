//! Exec-node command - one node's input and output in an execution.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use serde_json::Value;

use flowtrace_forensics::dataflow::PRIMARY_SLOT_LABEL;
use flowtrace_forensics::{ForensicsError, NodeDataFlow, NodeInput, NodeOutput, NotFoundKind, reconstruct};

use super::{Context, heading, print_json, recover};

/// Arguments for the exec-node command.
#[derive(Args, Debug)]
pub struct ExecNodeArgs {
    /// Execution ID
    pub execution_id: String,

    /// Node name (exact, case-insensitive, or a unique part of it)
    pub node: String,

    /// Run index for nodes that ran more than once
    #[arg(long, default_value = "0")]
    pub run: usize,

    /// Items shown per list in text output
    #[arg(long, default_value = "3")]
    pub items: usize,
}

/// Run the exec-node command.
pub async fn run(args: ExecNodeArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let (source, _) = ctx.engine(&client);

    let execution = match source.get_execution(&args.execution_id).await {
        Ok(execution) => execution,
        Err(e) => {
            return recover(
                ForensicsError::from_client(e, NotFoundKind::Execution, &args.execution_id),
                ctx,
            );
        }
    };

    let flow = match reconstruct(&execution, &args.node, args.run) {
        Ok(flow) => flow,
        Err(e) => return recover(e, ctx),
    };

    if ctx.json_output {
        return print_json(&flow);
    }

    print_flow(&flow, args.items);
    Ok(())
}

fn print_flow(flow: &NodeDataFlow, shown: usize) {
    let dim = Style::new().dim();

    heading(&format!(
        "{} in execution {} (run {} of {})",
        flow.node_name,
        flow.execution_id,
        flow.run_index + 1,
        flow.run_count
    ));
    if let Some(ms) = flow.execution_time_ms {
        println!("  {} {}ms", dim.apply_to("Time:"), ms);
    }
    if let Some(error) = &flow.error {
        println!("  {} {}", Style::new().red().apply_to("Error:"), error.message);
    }

    heading(&format!("Input ({} items)", flow.input.item_count()));
    match &flow.input {
        NodeInput::Single(items) => {
            if let Some(source) = flow.sources.first() {
                println!(
                    "  {}",
                    dim.apply_to(format!("from {} [{}]", source.previous_node, source.previous_output_slot))
                );
            }
            print_items(items, shown);
        }
        NodeInput::Multi(groups) => {
            for group in groups {
                let marker = if group.available { "" } else { " (unavailable)" };
                println!(
                    "  {} [{}]{}",
                    style(&group.source_node).bold(),
                    group.source_slot,
                    marker
                );
                print_items(&group.items, shown);
            }
        }
    }

    heading(&format!("Output ({} items)", flow.output.item_count()));
    match &flow.output {
        NodeOutput::Single(items) => print_items(items, shown),
        NodeOutput::Slots(slots) => {
            for slot in slots {
                let label = if slot.slot_label == PRIMARY_SLOT_LABEL {
                    style(&slot.slot_label).bold().to_string()
                } else {
                    slot.slot_label.clone()
                };
                println!("  {} ({} items)", label, slot.items.len());
                print_items(&slot.items, shown);
            }
        }
    }

    if !flow.unresolved_sources.is_empty() {
        heading("Incomplete data");
        for issue in &flow.unresolved_sources {
            println!("  {} {}", Style::new().yellow().apply_to("!"), issue);
        }
    }
    println!();
}

fn print_items(items: &[Value], shown: usize) {
    let dim = Style::new().dim();
    if items.is_empty() {
        println!("    {}", dim.apply_to("(none)"));
        return;
    }
    for item in items.iter().take(shown) {
        let rendered = serde_json::to_string_pretty(item).unwrap_or_else(|_| item.to_string());
        for line in rendered.lines() {
            println!("    {}", line);
        }
    }
    if items.len() > shown {
        println!("    {}", dim.apply_to(format!("… {} more", items.len() - shown)));
    }
}
