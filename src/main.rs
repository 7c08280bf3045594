use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use samarth::chat::run_chat;
use samarth::config::AppConfig;
use samarth::fetcher::DatasetDownloader;
use samarth::server::run_server;
use samarth::storage::StorageManager;

/// Samarth rainfall and crop insight assistant.
#[derive(Parser)]
#[command(name = "samarth", version, about = "Rainfall and crop insight assistant over data.gov.in")]
struct Cli {
    /// Path to the TOML configuration file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = "samarth.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the custom-action server the NLU server calls.
    Serve {
        /// Override `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Chat with the assistant in the terminal.
    Chat {
        /// Override `chat.webhook_url`.
        #[arg(long)]
        url: Option<String>,
    },

    /// Download the rice and jowar snapshots into the data directory.
    Download {
        #[arg(long)]
        rice_url: String,

        #[arg(long)]
        jowar_url: String,

        /// Override `data.dir`.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::load(&cli.config)?;

    let result = match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            config.validate()?;
            info!("🚀 Starting Samarth action server");
            run_server(&config).await
        }
        Commands::Chat { url } => {
            if let Some(url) = url {
                config.chat.webhook_url = url;
            }
            run_chat(&config).await
        }
        Commands::Download {
            rice_url,
            jowar_url,
            out,
        } => {
            if let Some(out) = out {
                config.data.dir = out;
            }
            download(&config, &rice_url, &jowar_url).await
        }
    };

    if let Err(e) = &result {
        error!("❌ {:#}", e);
    }
    result
}

async fn download(config: &AppConfig, rice_url: &str, jowar_url: &str) -> Result<()> {
    std::fs::create_dir_all(&config.data.dir)
        .with_context(|| format!("Failed to create {}", config.data.dir.display()))?;

    let storage = StorageManager::new(config.data.dir.clone());
    let downloader = DatasetDownloader::new(storage, &config.api.user_agent)?;

    let saved = downloader
        .download_all(&[
            (rice_url, config.data.rice_file.as_str()),
            (jowar_url, config.data.jowar_file.as_str()),
        ])
        .await?;

    for path in saved {
        info!("✅ {} downloaded successfully", path.display());
    }
    Ok(())
}
