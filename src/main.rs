use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use friend_circle::{pipeline, Config};

/// Friend circle feed aggregator.
#[derive(Parser, Debug)]
#[command(name = "friend-circle", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Configuration problems are fatal
    let config = match Config::load_with_env(&cli.config).and_then(|c| c.validate().map(|()| c)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = friend_circle::logging::init(&config.logging, cli.log_level.as_deref()) {
        eprintln!("Failed to initialize logging: {e}");
        friend_circle::logging::init_console_only(
            cli.log_level.as_deref().unwrap_or(&config.logging.level),
        );
    }

    info!(config = %cli.config.display(), "friend-circle starting");

    if config.spider.enabled {
        match pipeline::run_spider(&config).await {
            Ok(aggregation) => info!(
                articles = aggregation.result.article_count,
                friends = aggregation.result.friend_count,
                lost = aggregation.lost.len(),
                "Spider finished"
            ),
            Err(e) => {
                error!(error = %e, "Spider failed");
                return ExitCode::FAILURE;
            }
        }
    }

    if config.subscribe.enabled {
        if let Err(e) = pipeline::run_subscribe(&config).await {
            error!(error = %e, "Subscriber notifications failed");
            return ExitCode::FAILURE;
        }
    }

    ExitCode::SUCCESS
}
