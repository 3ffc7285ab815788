//! pgeo-service - property address geocoder
//!
//! Two entry points:
//! - `serve`: HTTP API over the saved address list (default port 5780)
//! - `process`: one-shot run over a CSV file, writing the enriched CSV

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pgeo_common::config::{self as common_config, TomlConfig};
use pgeo_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pgeo_service::services::address_ingest;
use pgeo_service::workflow::pipeline::{Pipeline, RunStatus};
use pgeo_service::workflow::storage;
use pgeo_service::{config, AppState};

/// Command-line arguments for pgeo-service
#[derive(Parser, Debug)]
#[command(name = "pgeo-service")]
#[command(about = "Geocode property addresses and label their spatial density")]
#[command(version)]
struct Cli {
    /// TOML config file (defaults to the platform config location)
    #[arg(short, long, global = true, env = "PGEO_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service
    Serve {
        /// Data directory for saved addresses and results
        #[arg(short, long)]
        root_folder: Option<PathBuf>,

        /// Port to listen on (overrides [server] port)
        #[arg(short, long, env = "PGEO_PORT")]
        port: Option<u16>,
    },
    /// Geocode, cluster and label the addresses of one CSV file
    Process {
        /// Input CSV with an address column (or street/city/state/zip columns)
        input: PathBuf,

        /// Enriched CSV to write
        #[arg(short, long, default_value = common_config::ENRICHED_FILE)]
        output: PathBuf,

        /// Cluster neighbor radius in kilometers
        #[arg(long)]
        epsilon_km: Option<f64>,

        /// Minimum neighbors (itself included) for a core point
        #[arg(long)]
        min_samples: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let toml_config = common_config::load_toml_config(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over [logging] level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&toml_config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Serve { root_folder, port } => {
            let config_path = cli.config.clone().or_else(common_config::user_config_path);
            serve(toml_config, config_path, root_folder, port).await
        }
        Command::Process {
            input,
            output,
            epsilon_km,
            min_samples,
        } => process(toml_config, &input, &output, epsilon_km, min_samples).await,
    }
}

async fn serve(
    mut toml_config: TomlConfig,
    config_path: Option<PathBuf>,
    root_folder: Option<PathBuf>,
    port: Option<u16>,
) -> Result<()> {
    info!("Starting pgeo-service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = common_config::resolve_root_folder(root_folder.as_deref(), &toml_config);
    common_config::ensure_root_folder(&root_folder)
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", root_folder.display());
    if let Some(path) = &config_path {
        config::persist_root_folder(&root_folder, path);
    }

    toml_config.geocoder = config::resolve_geocoder_config(&toml_config);
    let lookup = config::build_lookup(&toml_config.geocoder)?;
    let limiter = config::build_limiter(&toml_config.geocoder);

    let event_bus = EventBus::new(100);
    info!("Event bus initialized");

    let host = toml_config.server.host.clone();
    let port = port.unwrap_or(toml_config.server.port);

    let state = AppState::new(root_folder, toml_config, event_bus, lookup, limiter);
    let app = pgeo_service::build_router(state);

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn process(
    toml_config: TomlConfig,
    input: &Path,
    output: &Path,
    epsilon_km: Option<f64>,
    min_samples: Option<usize>,
) -> Result<()> {
    let file = std::fs::File::open(input)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    let addresses = address_ingest::load_addresses(std::io::BufReader::new(file))
        .with_context(|| format!("Failed to read addresses from {}", input.display()))?;

    let params = config::cluster_params(&toml_config, epsilon_km, min_samples)?;
    let geocoder = config::resolve_geocoder_config(&toml_config);
    let client = pgeo_service::services::GeocodingClient::new(
        config::build_lookup(&geocoder)?,
        config::build_limiter(&geocoder),
        config::backoff(&geocoder),
    );

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Received Ctrl+C, stopping after the current address");
            ctrl_c_token.cancel();
        }
    });

    let pipeline = Pipeline::new(config::pipeline_config(&geocoder, params), client)
        .with_cancellation(cancel);
    let result = pipeline.run(&addresses).await;

    storage::save_records(output, &result.records)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(
        clusters = result.summary.clusters,
        noise = result.summary.noise,
        clustered = result.summary.clustered_points,
        "Found {} clusters, {} noise points",
        result.summary.clusters,
        result.summary.noise
    );
    info!(
        "Saved {} records ({} geocoded, {} unresolved) to {}",
        result.records.len(),
        result.resolved(),
        result.unresolved(),
        output.display()
    );
    if result.status == RunStatus::Cancelled {
        warn!(
            "Run cancelled: {} of {} addresses processed",
            result.records.len(),
            addresses.len()
        );
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
