use std::path::PathBuf;

use clap::{Parser, Subcommand};
use source_defaults_core::{catalog, Capabilities, Scenario};
use tracing_subscriber::EnvFilter;

fn main() -> source_defaults_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            scenario,
            config_only,
        } => run_replay(&scenario, config_only),
        Commands::Options { config_only } => print_options(config_only),
    }
}

fn run_replay(path: &PathBuf, config_only: bool) -> source_defaults_core::Result<()> {
    tracing::info!(?path, config_only, "replaying scenario");

    let mut scenario = Scenario::load(path)?;
    scenario.config_only |= config_only;
    let snapshot = scenario.run()?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn print_options(config_only: bool) -> source_defaults_core::Result<()> {
    let capabilities = if config_only {
        Capabilities::config_only()
    } else {
        Capabilities::full()
    };
    println!("{}", serde_json::to_string_pretty(&catalog(capabilities))?);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Copy a template source's setup onto new sources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON scenario against the in-memory host and print the result.
    Replay {
        /// Path to the scenario file.
        scenario: PathBuf,
        /// Run without scene item syncing.
        #[arg(long)]
        config_only: bool,
    },
    /// Print every persisted option with its label and default.
    Options {
        /// Leave out the scene item options.
        #[arg(long)]
        config_only: bool,
    },
}
