use anyhow::Result;
use tracing::{error, info};

use transfer_crawler::cli;
use transfer_crawler::cli::config::Settings;
use transfer_crawler::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::parse_args();
    let settings = Settings::load(args.config_path())?;

    let log_file = settings.storage.logs_dir.join(format!("{}.log", args.log_file_stem()));
    utils::init_logging(args.verbose(), Some(log_file))?;

    info!("Starting Transfer Crawler v{}", env!("CARGO_PKG_VERSION"));

    match cli::process_command(args, settings).await {
        Ok(_) => {
            info!("Command completed successfully");
            Ok(())
        }
        Err(e) => {
            error!("Command failed: {}", e);
            Err(e)
        }
    }
}
