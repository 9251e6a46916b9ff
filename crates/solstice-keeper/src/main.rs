//! Solstice keeper
//!
//! Replays a JSON scenario of lock, vote, emission and bribe events against
//! the ledgers and prints the resulting state as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solstice_keeper::{create_example_config, KeeperConfig, Scenario, Simulator};

#[derive(Parser)]
#[command(name = "solstice-keeper")]
#[command(about = "Replay vote-escrow, emission and bribe events")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a scenario and print the final ledger state
    Replay {
        /// Configuration file path
        #[arg(short, long, default_value = "keeper.toml")]
        config: PathBuf,

        /// Scenario file (JSON)
        #[arg(short, long)]
        scenario: PathBuf,

        /// Override log level
        #[arg(long)]
        log_level: Option<String>,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a default configuration file
    InitConfig {
        #[arg(default_value = "keeper.toml")]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            config,
            scenario,
            log_level,
            output,
        } => {
            let mut config = if config.exists() {
                KeeperConfig::load(&config)
                    .with_context(|| format!("loading config {}", config.display()))?
            } else {
                KeeperConfig::default()
            };
            if let Some(log_level) = log_level {
                config.log_level = log_level;
            }
            init_logging(&config);

            let scenario = Scenario::load(&scenario)
                .with_context(|| format!("loading scenario {}", scenario.display()))?;
            info!("Replaying {} ({} events)", scenario.name, scenario.events.len());

            let mut simulator = Simulator::new(config, &scenario)?;
            simulator.replay(&scenario.events)?;

            let report = serde_json::to_string_pretty(&simulator.report())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, report).with_context(|| format!("writing {}", path.display()))?;
                    info!("Report written to {}", path.display());
                }
                None => println!("{}", report),
            }
        }
        Command::InitConfig { path } => {
            create_example_config(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }

    Ok(())
}

fn init_logging(config: &KeeperConfig) {
    let log_level = config.log_level.parse().unwrap_or(tracing::Level::INFO);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("solstice_keeper={},solstice_core={}", log_level, log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
