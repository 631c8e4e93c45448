pub mod graph;
pub mod manifest;
pub mod outputs;
pub mod preview;
pub mod validate;

use anyhow::Context;
use stackweave_cloud::ResourceGraph;
use stackweave_config::StackConfig;
use std::path::Path;

/// Load the stack file given on the command line, or discover one
pub fn load_config(path: Option<&Path>) -> anyhow::Result<StackConfig> {
    let config = match path {
        Some(path) => StackConfig::load(path)
            .with_context(|| format!("failed to load stack file {}", path.display()))?,
        None => StackConfig::discover()
            .context("no stack file found (run where stackweave.yaml lives, or pass --config)")?,
    };
    tracing::debug!(stack = %config.name, root = %config.root.display(), "Using stack");
    Ok(config)
}

/// Declare every resource of the stack
pub fn build_graph(config: &StackConfig) -> anyhow::Result<ResourceGraph> {
    crate::stack::define(config).with_context(|| format!("stack '{}' is invalid", config.name))
}
