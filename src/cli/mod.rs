pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use config::Settings;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a configuration file (defaults to the per-user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn config_path(&self) -> Option<&std::path::Path> {
        self.config.as_deref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    /// Log file stem for this invocation. Workers run as separate
    /// processes and each gets its own file.
    pub fn log_file_stem(&self) -> String {
        match &self.command {
            Commands::Worker { role, id } => format!("worker-{role}-{id}"),
            _ => "crawler".to_string(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the discovery queue and run all worker pools
    Run {
        /// Publish seeds only, without spawning workers
        #[arg(long)]
        seed_only: bool,

        /// Override the number of discovery workers
        #[arg(long)]
        discovery_workers: Option<usize>,

        /// Override the number of extraction workers
        #[arg(long)]
        extraction_workers: Option<usize>,

        /// Override the number of repair workers
        #[arg(long)]
        repair_workers: Option<usize>,
    },

    /// Run one worker process (spawned by `run`, rarely used directly)
    #[command(hide = true)]
    Worker {
        /// Worker role: discovery, extraction or repair
        #[arg(long)]
        role: String,

        /// Worker index within its pool
        #[arg(long, default_value_t = 0)]
        id: usize,
    },

    /// Publish the configured seed URLs and exit
    Seed,

    /// Show the current configuration
    Config,
}

/// Parse command line arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Process the command
pub async fn process_command(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Run { seed_only, discovery_workers, extraction_workers, repair_workers } => {
            let mut settings = settings;
            if let Some(n) = discovery_workers {
                settings.workers.discovery_workers = n;
            }
            if let Some(n) = extraction_workers {
                settings.workers.extraction_workers = n;
            }
            if let Some(n) = repair_workers {
                settings.workers.repair_workers = n;
            }

            if seed_only {
                commands::seed(settings).await
            } else {
                commands::run(settings, cli.config).await
            }
        }
        Commands::Worker { role, id } => {
            info!("Starting {} worker {}", role, id);
            commands::worker(settings, role, id).await
        }
        Commands::Seed => commands::seed(settings).await,
        Commands::Config => commands::show_config(settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn worker_subcommand_parses_role_and_id() {
        let cli = Cli::parse_from([
            "transfer-crawler",
            "worker",
            "--role",
            "extraction",
            "--id",
            "3",
        ]);
        match cli.command {
            Commands::Worker { role, id } => {
                assert_eq!(role, "extraction");
                assert_eq!(id, 3);
            }
            _ => panic!("expected worker subcommand"),
        }
    }

    #[test]
    fn worker_invocations_get_their_own_log_stem() {
        let cli = Cli::parse_from(["transfer-crawler", "worker", "--role", "repair", "--id", "2"]);
        assert_eq!(cli.log_file_stem(), "worker-repair-2");

        let cli = Cli::parse_from(["transfer-crawler", "seed", "--verbose"]);
        assert!(cli.verbose());
        assert_eq!(cli.log_file_stem(), "crawler");
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["transfer-crawler", "seed", "--config", "/tmp/custom.yaml"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/custom.yaml")));
    }
}
