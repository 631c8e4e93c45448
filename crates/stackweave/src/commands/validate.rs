use colored::Colorize;
use stackweave_cloud::Manifest;
use stackweave_config::StackConfig;

pub fn handle(config: &StackConfig) -> anyhow::Result<()> {
    println!("{}", "Validating stack...".blue());
    println!("Stack: {} ({})", config.name.cyan(), config.location);
    println!("Assets: {}", config.asset_dir.display().to_string().cyan());

    let graph = match super::build_graph(config) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Stack error".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };

    // Ordering also catches cycles
    let manifest = match Manifest::from_graph(&graph) {
        Ok(manifest) => manifest,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Dependency error".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Stack is valid!".green().bold());
    println!();
    println!("Summary: {}", manifest.summary());
    for (kind, count) in graph.count_by_kind() {
        println!("  {}: {}", kind.to_string().cyan(), count);
    }
    println!("Outputs:");
    for (name, _) in graph.outputs() {
        println!("  - {}", name.cyan());
    }

    Ok(())
}
