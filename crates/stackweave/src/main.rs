mod commands;
mod stack;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "weave")]
#[command(about = "Declarative cloud stacks with deferred value wiring", long_about = None)]
struct Cli {
    /// Stack file (skips discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the resource graph and report what it contains
    Validate,
    /// Show dependency edges between resources
    Graph,
    /// Print the manifest handed to the apply engine
    Manifest {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Dry-run apply with synthesized outputs and keys
    Preview {
        /// Domain appended to web app names for their host names
        #[arg(long, default_value = "azurewebsites.net")]
        host_suffix: String,
    },
    /// Show stack outputs from the last recorded state
    Outputs {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries manifests and JSON, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Version needs no stack file
    if matches!(cli.command, Commands::Version) {
        println!("stackweave {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Validate => commands::validate::handle(&config)?,
        Commands::Graph => commands::graph::handle(&config)?,
        Commands::Manifest { output } => commands::manifest::handle(&config, output.as_deref())?,
        Commands::Preview { host_suffix } => {
            commands::preview::handle(&config, &host_suffix).await?
        }
        Commands::Outputs { json } => commands::outputs::handle(&config, json).await?,
        Commands::Version => {
            unreachable!("Version is handled before config loading");
        }
    }

    Ok(())
}
