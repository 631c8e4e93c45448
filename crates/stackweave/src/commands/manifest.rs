use anyhow::Context;
use colored::Colorize;
use stackweave_cloud::Manifest;
use stackweave_config::StackConfig;
use std::path::Path;

pub fn handle(config: &StackConfig, output: Option<&Path>) -> anyhow::Result<()> {
    let graph = super::build_graph(config)?;
    let manifest = Manifest::from_graph(&graph)?;
    let json = manifest.to_json_pretty()?;

    match output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!(
                "{} {} ({})",
                "✓ Wrote manifest to".green(),
                path.display().to_string().cyan(),
                manifest.summary()
            );
        }
        None => println!("{json}"),
    }

    Ok(())
}
