mod app;
mod args;
mod config;

use std::path::PathBuf;

use genqueue_logging::LogDestination;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = args::parse(std::env::args().skip(1))?;
    if args.help || args.is_empty() {
        print!("{}", args::USAGE);
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::CONFIG_FILENAME));
    let config = config::load(&config_path)?;

    let destination = if args.verbose {
        LogDestination::Both
    } else {
        LogDestination::File
    };
    genqueue_logging::initialize(destination, config.log_level);

    app::run(args, config).await
}
