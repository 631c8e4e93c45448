use colored::Colorize;
use stackweave_config::StackConfig;

/// Print each resource in apply order with the resources it waits on
pub fn handle(config: &StackConfig) -> anyhow::Result<()> {
    let graph = super::build_graph(config)?;
    let order = graph.topological_order()?;

    println!("{} {}", "Stack:".bold(), graph.name().cyan());
    for (position, decl) in order.iter().enumerate() {
        println!(
            "{:>3}. {} {}",
            position + 1,
            decl.key.to_string().cyan(),
            format!("[{}]", decl.replace_policy).dimmed()
        );
        for dep in &decl.depends_on {
            let marker = if decl.explicit_depends_on.contains(dep) {
                " (explicit)"
            } else {
                ""
            };
            println!("       ← {}{}", dep, marker);
        }
    }
    println!();
    println!("{} edges", graph.edges().len());

    Ok(())
}
