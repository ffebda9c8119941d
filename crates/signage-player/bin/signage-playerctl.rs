use clap::{Parser, Subcommand};
use signage_core::DisplaySettings;
use signage_download::{DownloadConfig, DownloadManager, ReqwestFetcher};
use signage_player::{CollectionLoop, DisplayIdentity, StatusReporter};
use signage_store::FsStore;
use signage_transport::{CmsClient, TransportConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::Level;

#[derive(Parser)]
#[command(
    name = "signage-playerctl",
    about = "Operate and debug a display's collection core outside of a full player shell",
    version
)]
struct Cli {
    /// Set the logging level
    #[arg(short, long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// CMS base URL
    #[arg(long, global = true)]
    cms_url: Option<String>,

    /// Hardware key identifying this display
    #[arg(long, global = true)]
    hardware_key: Option<String>,

    /// Server key issued by the CMS
    #[arg(long, global = true)]
    server_key: Option<String>,

    /// Directory holding the content store and persisted identity
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the collection loop until interrupted
    Run,
    /// Run a single collection cycle and exit
    Collect,
    /// Print the persisted display identity
    Identity,
    /// List entries currently held in the content store
    Store,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(Level::from(cli.log_level))
        .with_target(false)
        .init();

    let data_dir = cli
        .data_dir
        .or_else(|| dirs::data_dir().map(|d| d.join("signage-player")))
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&data_dir)?;
    let identity_path = data_dir.join("identity.json");

    match cli.command {
        Commands::Identity => {
            match DisplayIdentity::load(&identity_path).await? {
                Some(identity) => println!("{}", serde_json::to_string_pretty(&identity)?),
                None => println!("no persisted identity at {}", identity_path.display()),
            }
            return Ok(());
        }
        Commands::Store => {
            let store = FsStore::new(data_dir.join("store")).await?;
            for entry in store.list(None).await? {
                println!("{}\t{}\t{}", entry.key, entry.size, entry.mtime_unix);
            }
            return Ok(());
        }
        Commands::Run | Commands::Collect => {}
    }

    let cms_url = cli.cms_url.ok_or("--cms-url is required for this command")?;
    let hardware_key = cli.hardware_key.ok_or("--hardware-key is required for this command")?;
    let server_key = cli.server_key.ok_or("--server-key is required for this command")?;

    let identity = match DisplayIdentity::load(&identity_path).await? {
        Some(identity) => identity,
        None => DisplayIdentity::new(&hardware_key, &cms_url, &server_key)?,
    };

    let store = Arc::new(FsStore::new(data_dir.join("store")).await?);
    let fetcher = Arc::new(ReqwestFetcher::default());
    let download_manager = DownloadManager::new(fetcher, store.clone(), DownloadConfig::default());

    let transport_config = TransportConfig::new(cms_url, server_key, hardware_key);
    let client = Arc::new(CmsClient::new(transport_config)?);
    let reporter = Arc::new(StatusReporter::new(client.clone()));

    let collection_loop = Arc::new(CollectionLoop::new(
        client,
        download_manager,
        store,
        reporter,
        identity_path,
        identity,
    ));

    match cli.command {
        Commands::Collect => {
            let settings: DisplaySettings = collection_loop.run_once().await?;
            println!("collection cycle complete, next interval {}s", settings.clamped_collect_interval());
        }
        Commands::Run => {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            collection_loop.run(rx).await?;
        }
        Commands::Identity | Commands::Store => unreachable!("handled above"),
    }

    Ok(())
}
