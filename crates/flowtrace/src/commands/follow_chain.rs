//! Follow-chain command - sub-workflow dependency tree.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use flowtrace_forensics::{DependencyTreeNode, TreeBuilder, TreeOptions};

use super::{Context, heading, print_json, recover};

/// Arguments for the follow-chain command.
#[derive(Args, Debug)]
pub struct FollowChainArgs {
    /// Root workflow ID
    pub workflow_id: String,

    /// Maximum depth below the root
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Sibling workflows fetched in parallel (1-8)
    #[arg(long)]
    pub concurrency: Option<usize>,
}

/// Run the follow-chain command.
pub async fn run(args: FollowChainArgs, ctx: &Context) -> Result<()> {
    let client = ctx.client()?;
    let (source, names) = ctx.engine(&client);

    let mut analysis = ctx.config.analysis();
    if let Some(depth) = args.max_depth {
        analysis.max_tree_depth = depth;
    }
    if let Some(concurrency) = args.concurrency {
        analysis.tree_concurrency = concurrency;
    }
    let options = TreeOptions {
        max_depth: analysis.max_tree_depth,
        concurrency: analysis.effective_concurrency(),
    };

    let tree = match TreeBuilder::new(source, names, options).build(&args.workflow_id).await {
        Ok(tree) => tree,
        Err(e) => return recover(e, ctx),
    };

    if ctx.json_output {
        return print_json(&tree);
    }

    heading(&format!("Dependency tree of {}", tree.name));
    print_root(&tree);
    println!();
    println!(
        "  {}",
        Style::new()
            .dim()
            .apply_to(format!("{} workflow(s) in tree", tree.size()))
    );
    println!();
    Ok(())
}

fn print_root(tree: &DependencyTreeNode) {
    println!("  {}", describe(tree));
    let count = tree.children.len();
    for (i, child) in tree.children.iter().enumerate() {
        print_node(child, "  ", i + 1 == count);
    }
}

fn print_node(node: &DependencyTreeNode, prefix: &str, last: bool) {
    let branch = if last { "└── " } else { "├── " };
    println!("{}{}{}", prefix, branch, describe(node));

    let child_prefix = format!("{}{}", prefix, if last { "    " } else { "│   " });
    let count = node.children.len();
    for (i, child) in node.children.iter().enumerate() {
        print_node(child, &child_prefix, i + 1 == count);
    }
}

fn describe(node: &DependencyTreeNode) -> String {
    let dim = Style::new().dim();
    let mut line = format!("{} {}", style(&node.name).bold(), dim.apply_to(format!("({})", node.workflow_id)));

    match node.active {
        Some(true) => line.push_str(&format!(" {}", Style::new().green().apply_to("●"))),
        Some(false) => line.push_str(&format!(" {}", dim.apply_to("○"))),
        None => {}
    }
    if node.fetch_error.is_none() && !node.cycle {
        line.push_str(&format!(" {}", dim.apply_to(format!("{} nodes", node.node_count))));
    }
    if let Some(via) = &node.called_via_node_name {
        line.push_str(&format!(" {}", dim.apply_to(format!("via \"{}\"", via))));
    }
    if node.cycle {
        line.push_str(&format!(" {}", Style::new().yellow().apply_to("↺ cycle")));
    }
    if node.depth_limited {
        line.push_str(&format!(" {}", Style::new().yellow().apply_to("… depth limit")));
    }
    if let Some(error) = &node.fetch_error {
        line.push_str(&format!(" {}", Style::new().red().apply_to(format!("fetch failed: {}", error))));
    }
    for invoker in &node.unresolved_invokers {
        line.push_str(&format!(
            " {}",
            Style::new().yellow().apply_to(format!("[\"{}\" has no target]", invoker))
        ));
    }
    line
}
