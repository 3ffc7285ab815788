//! Test Helper Utilities
//!
//! Shared utilities for testing pgeo-service

#![allow(dead_code)]

pub mod recording_limiter;
pub mod scripted_lookup;

pub use recording_limiter::RecordingLimiter;
pub use scripted_lookup::ScriptedLookup;

use pgeo_common::config::TomlConfig;
use pgeo_common::events::EventBus;
use pgeo_service::services::{GeocodingClient, NoDelay};
use pgeo_service::AppState;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Geocoding client over `lookup` with no rate limit and no backoff
pub fn instant_client(lookup: Arc<ScriptedLookup>) -> GeocodingClient {
    GeocodingClient::new(lookup, Arc::new(NoDelay), Duration::ZERO)
}

/// App state rooted at `root` using `lookup` and no rate limit
pub fn test_app_state(root: &Path, lookup: Arc<ScriptedLookup>) -> AppState {
    let mut config = TomlConfig::default();
    config.geocoder.backoff_ms = 0;
    config.geocoder.min_interval_ms = 0;

    AppState::new(
        root.to_path_buf(),
        config,
        EventBus::new(100),
        lookup,
        Arc::new(NoDelay),
    )
}

/// Addresses and coordinates from the Springfield scenario:
/// three neighbors within 0.1 km, one point ~500 km east
pub fn springfield_lookup() -> ScriptedLookup {
    ScriptedLookup::new()
        .with_place("1 Main St, Springfield, IL", 39.78170, -89.65010, Some("Springfield"), Some("62701"))
        .with_place("2 Main St, Springfield, IL", 39.78195, -89.65010, Some("Springfield"), Some("62701"))
        .with_place("3 Main St, Springfield, IL", 39.78170, -89.64980, Some("Springfield"), Some("62701"))
        .with_place("999 Far Ave, Nowhere, ZZ", 39.78170, -83.80000, None, None)
}

pub fn springfield_addresses() -> Vec<String> {
    vec![
        "1 Main St, Springfield, IL".to_string(),
        "2 Main St, Springfield, IL".to_string(),
        "3 Main St, Springfield, IL".to_string(),
        "999 Far Ave, Nowhere, ZZ".to_string(),
    ]
}
