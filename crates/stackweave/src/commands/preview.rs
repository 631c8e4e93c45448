use colored::Colorize;
use stackweave_cloud::{PreviewEngine, StateManager, submit};
use stackweave_config::StackConfig;

/// Run the stack through the dry-run engine and record the resulting state
pub async fn handle(config: &StackConfig, host_suffix: &str) -> anyhow::Result<()> {
    let graph = super::build_graph(config)?;
    let engine = PreviewEngine::new().with_host_suffix(host_suffix);

    let manager = StateManager::new(&config.root);
    let lock = manager.acquire_lock().await?;
    let previous = manager.load().await?;

    println!(
        "{} {} with {}",
        "Previewing".blue(),
        graph.name().cyan(),
        "preview engine".bold()
    );

    let report = submit(&graph, &engine, &previous).await?;

    for result in &report.succeeded {
        println!("  {} {}", "✓".green(), result.resource);
    }
    for result in &report.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            result.resource,
            result.error.as_deref().unwrap_or("failed")
        );
    }

    manager.save(&report.state).await?;
    lock.release().await?;

    println!();
    println!(
        "{} succeeded, {} failed in {}ms",
        report.succeeded.len(),
        report.failed.len(),
        report.duration_ms
    );
    super::outputs::print_outputs(&report.state.resolve_outputs(&graph)?);

    if !report.is_success() {
        anyhow::bail!("{} resource(s) failed", report.failed.len());
    }
    Ok(())
}
