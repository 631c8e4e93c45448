use colored::Colorize;
use stackweave_cloud::{Resolution, StateManager};
use stackweave_config::StackConfig;

const PENDING: &str = "<pending>";

pub async fn handle(config: &StackConfig, json: bool) -> anyhow::Result<()> {
    let graph = super::build_graph(config)?;
    let state = StateManager::new(&config.root).load().await?;
    let outputs = state.resolve_outputs(&graph)?;

    if json {
        let map: serde_json::Map<String, serde_json::Value> = outputs
            .into_iter()
            .map(|(name, value)| {
                let value = match value {
                    Resolution::Resolved(v) => serde_json::Value::String(v),
                    Resolution::Pending => serde_json::Value::Null,
                };
                (name, value)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        print_outputs(&outputs);
    }
    Ok(())
}

pub fn print_outputs(outputs: &[(String, Resolution<String>)]) {
    println!("{}", "Outputs:".bold());
    let width = outputs.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
    for (name, value) in outputs {
        let value = match value {
            Resolution::Resolved(v) => v.normal(),
            Resolution::Pending => PENDING.dimmed(),
        };
        println!("  {}  {}", format!("{name:width$}").cyan(), value);
    }
}
