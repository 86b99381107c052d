use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stream_conductor::{
    config::Config,
    database::{
        Database,
        repositories::{StreamHistorySeaOrmRepository, StreamJobSeaOrmRepository},
    },
    services::{FfmpegCommandBuilder, StreamLifecycleManager},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "stream-conductor")]
#[command(version)]
#[command(about = "Starts, supervises and terminates scheduled RTMP streams")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Streaming executable (overrides config file)
    #[arg(long, value_name = "PATH")]
    ffmpeg_command: Option<String>,
}

fn init_tracing(cli: &Cli) {
    let log_filter = format!("stream_conductor={}", cli.log_level);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    match cli.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT"),
                    _ = sigterm.recv() => info!("Received SIGTERM"),
                }
                return;
            }
            Err(e) => warn!("Cannot listen for SIGTERM: {}", e),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for shutdown signal: {}", e);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    info!("Starting stream-conductor v{}", env!("CARGO_PKG_VERSION"));

    let mut config = Config::load_from_file(&cli.config)?;
    info!("Configuration loaded from: {}", cli.config);

    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    if let Some(ffmpeg_command) = cli.ffmpeg_command {
        config.ffmpeg.command = ffmpeg_command;
    }

    info!("Using database: {}", config.database.url);
    let database = Database::new(&config.database).await?;
    database.migrate().await?;
    info!("Database connection established and migrations applied");

    tokio::fs::create_dir_all(&config.ffmpeg.temp_path).await?;

    let connection = database.connection().clone();
    let store = Arc::new(StreamJobSeaOrmRepository::new(connection.clone()));
    let history = Arc::new(StreamHistorySeaOrmRepository::new(connection));
    let command_builder = Arc::new(FfmpegCommandBuilder::new(&config.ffmpeg));

    let manager = StreamLifecycleManager::new(&config, store, history, command_builder);
    let background = manager.start_background();
    info!(
        "Stream lifecycle manager running (poll interval {}, streaming with '{}')",
        humantime::format_duration(config.scheduler.poll_interval),
        config.ffmpeg.command
    );

    wait_for_shutdown_signal().await;

    manager.shutdown().await;
    for handle in background {
        if let Err(e) = handle.await {
            warn!("Background task ended abnormally: {}", e);
        }
    }

    info!("stream-conductor stopped");
    Ok(())
}
