//! pgeo-service library interface
//!
//! Exposes the geocoding pipeline and the HTTP API for the binary and for
//! integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pgeo_common::config::{TomlConfig, ENRICHED_FILE};
use pgeo_common::events::EventBus;
use services::geocoding_client::GeocodingClient;
use services::lookup::GeocodeLookup;
use services::rate_limiter::RateLimiter;
use services::spatial_clusterer::ClusterParams;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use workflow::pipeline::PipelineConfig;
use workflow::storage::AddressBook;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Data directory holding the saved list and the enriched output
    pub root_folder: PathBuf,
    /// Loaded configuration (geocoder section already env-resolved)
    pub config: Arc<TomlConfig>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// External lookup used by every run
    pub lookup: Arc<dyn GeocodeLookup>,
    /// Rate limiter shared by every run in this process
    pub limiter: Arc<dyn RateLimiter>,
    /// Cancellation token of the run in progress, if any
    pub active_run: Arc<Mutex<Option<CancellationToken>>>,
    /// Held across every read-modify-write of the saved address list
    pub address_lock: Arc<Mutex<()>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        root_folder: PathBuf,
        config: TomlConfig,
        event_bus: EventBus,
        lookup: Arc<dyn GeocodeLookup>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        Self {
            root_folder,
            config: Arc::new(config),
            event_bus,
            lookup,
            limiter,
            active_run: Arc::new(Mutex::new(None)),
            address_lock: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Saved address list in the root folder
    pub fn address_book(&self) -> AddressBook {
        AddressBook::in_root(&self.root_folder)
    }

    /// Location of the latest enriched output
    pub fn enriched_path(&self) -> PathBuf {
        self.root_folder.join(ENRICHED_FILE)
    }

    /// Geocoding client over the shared lookup and limiter
    pub fn geocoding_client(&self) -> GeocodingClient {
        GeocodingClient::new(
            Arc::clone(&self.lookup),
            Arc::clone(&self.limiter),
            config::backoff(&self.config.geocoder),
        )
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        config::pipeline_config(
            &self.config.geocoder,
            ClusterParams::from(&self.config.clustering),
        )
    }

    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::address_routes())
        .merge(api::processing_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
