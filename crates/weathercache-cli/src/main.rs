//! weathercache - weather forecasts that keep working offline.
//!
//! Installs the weather application's shell into a local cache and fetches
//! forecasts through the request interceptor: network first, with the last
//! stored forecast as the fallback when the network is unavailable.

mod config;
mod output;

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weathercache_core::{
    ApiKeyStore, CacheStorage, FileStorage, HttpNetwork, Interceptor, InterceptorConfig,
    LifecycleError, Network, Registration, WeatherClient,
};

use config::Config;

/// Log file name in the cache directory
const LOG_FILE: &str = "weathercache.log";

/// Subdirectory of the cache directory holding cache storage
const STORAGE_DIR: &str = "caches";

#[derive(Parser)]
#[command(name = "weathercache", version, about)]
struct Cli {
    /// Print forecasts as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Write logs to a file in the cache directory instead of stderr
    #[arg(long, global = true)]
    log_file: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Cache the application shell and prune old cache versions
    Install,
    /// Show the 24-hour forecast for a city
    Forecast {
        /// City query such as "Tokyo,JP" (defaults to DEFAULT_CITY)
        city: Option<String>,
    },
    /// List caches and their entries
    Caches,
    /// Store the OpenWeatherMap API key in the OS keychain
    SetKey { key: String },
    /// Remove the stored API key
    ForgetKey,
}

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the log file on drop.
fn init_tracing(log_dir: Option<&std::path::Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    let cache_dir = config.cache_dir()?;
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("Failed to create cache directory: {}", cache_dir.display()))?;

    let _log_guard = init_tracing(cli.log_file.then_some(cache_dir.as_path()));
    info!("weathercache starting");

    let storage: Arc<dyn CacheStorage> = Arc::new(
        FileStorage::new(cache_dir.join(STORAGE_DIR)).context("Failed to open cache storage")?,
    );

    match cli.command {
        Command::Install => {
            let network = http_network()?;
            let registration = Registration::new(network.clone());
            let interceptor = interceptor(&config, storage, network);
            let origin = interceptor.config().origin.clone();
            let worker = registration
                .register(interceptor)
                .await
                .with_context(|| format!("Failed to install application shell from {}", origin))?;
            println!(
                "Installed {} from {} ({})",
                worker.interceptor().cache_name(),
                origin,
                worker.state()
            );
        }
        Command::Forecast { city } => {
            let city = city.unwrap_or_else(|| config.default_city());
            let network = http_network()?;
            let registration = Arc::new(Registration::new(network.clone()));
            start_worker(&registration, interceptor(&config, storage, network)).await;

            let client = WeatherClient::new(Arc::clone(&registration), ApiKeyStore::resolve());
            let result = client.forecast(&city).await;
            // The cache write runs behind the response; let it land before exit
            registration.settle().await;
            let result = result.with_context(|| format!("Failed to get forecast for {}", city))?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result.forecast)?);
            } else {
                println!("{}", output::format_forecast(&result));
            }

            config.last_city = Some(city);
            if let Err(e) = config.save() {
                warn!(error = %e, "Failed to save config");
            }
        }
        Command::Caches => {
            let names = storage.keys().await?;
            if names.is_empty() {
                println!("No caches");
            }
            for name in names {
                println!("{}", name);
                for entry in storage.entries(&name).await? {
                    println!("  {}  ({})", entry.data, entry.age_display());
                }
            }
        }
        Command::SetKey { key } => {
            ApiKeyStore::store(&key)?;
            println!("API key stored");
        }
        Command::ForgetKey => {
            ApiKeyStore::delete()?;
            println!("API key removed");
        }
    }

    info!("weathercache done");
    Ok(())
}

fn http_network() -> Result<Arc<dyn Network>> {
    let network = HttpNetwork::new().context("Failed to build HTTP client")?;
    Ok(Arc::new(network))
}

fn interceptor(
    config: &Config,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
) -> Interceptor {
    let config = InterceptorConfig::default().with_origin(config.origin());
    Interceptor::new(config, storage, network)
}

/// Bring up a worker for forecast requests: reuse the installed cache when
/// there is one, otherwise try a fresh install. Without a worker, requests
/// pass straight through to the network.
async fn start_worker(registration: &Registration, interceptor: Interceptor) {
    let result = match registration.restore(interceptor.clone()).await {
        Err(LifecycleError::NotInstalled(_)) => registration.register(interceptor).await,
        other => other,
    };
    if let Err(e) = result {
        warn!(error = %e, "No active worker, forecasts will not be cached");
        eprintln!("Warning: offline cache unavailable ({})", e);
    }
}
