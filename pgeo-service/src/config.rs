//! Configuration resolution for pgeo-service
//!
//! Turns the loaded `TomlConfig` (plus CLI overrides) into the runtime
//! collaborators: the lookup client, the shared rate limiter and the
//! pipeline settings. Also records the resolved root folder back into the
//! config file on first start.

use crate::services::lookup::GeocodeLookup;
use crate::services::nominatim_client::NominatimLookup;
use crate::services::rate_limiter::{IntervalLimiter, RateLimiter};
use crate::services::spatial_clusterer::ClusterParams;
use crate::workflow::pipeline::PipelineConfig;
use pgeo_common::config::{
    load_toml_config, write_toml_config, ClusteringConfig, GeocoderConfig, TomlConfig,
};
use pgeo_common::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Geocoder settings: TOML values, then `PGEO_GEOCODER_*` environment overrides
pub fn resolve_geocoder_config(toml_config: &TomlConfig) -> GeocoderConfig {
    let resolved = toml_config.geocoder.clone().with_env_overrides();
    if resolved.endpoint != toml_config.geocoder.endpoint {
        info!("Geocoder endpoint overridden from environment: {}", resolved.endpoint);
    }
    if resolved.user_agent != toml_config.geocoder.user_agent {
        info!("Geocoder User-Agent overridden from environment");
    }
    resolved
}

/// Build the Nominatim lookup client
pub fn build_lookup(config: &GeocoderConfig) -> Result<Arc<dyn GeocodeLookup>> {
    let lookup = NominatimLookup::new(config)
        .map_err(|e| Error::Config(format!("Geocoder client setup failed: {}", e)))?;
    info!(
        endpoint = %config.endpoint,
        timeout_secs = config.timeout_secs,
        "Geocoder client ready"
    );
    Ok(Arc::new(lookup))
}

/// Build the limiter shared by every run in this process
pub fn build_limiter(config: &GeocoderConfig) -> Arc<dyn RateLimiter> {
    let limiter = IntervalLimiter::from_millis(config.min_interval_ms);
    info!(
        min_interval_ms = limiter.min_interval().as_millis() as u64,
        "Lookup rate limit: at most one call per interval"
    );
    Arc::new(limiter)
}

/// Save `root_folder` into the config file at `config_path` if it has none
///
/// Existing settings in the file are kept. A missing file is created. Write
/// failures are logged and ignored since the service runs with the resolved
/// folder either way. Returns whether the file was written.
pub fn persist_root_folder(root_folder: &Path, config_path: &Path) -> bool {
    let mut config = match load_toml_config(Some(config_path)) {
        Ok(config) => config,
        Err(e) => {
            warn!("Not saving root folder, config unreadable: {}", e);
            return false;
        }
    };

    if config.root_folder.is_some() {
        return false;
    }
    config.root_folder = Some(root_folder.to_path_buf());

    match write_toml_config(&config, config_path) {
        Ok(()) => {
            info!("Root folder saved to {}", config_path.display());
            true
        }
        Err(e) => {
            warn!("Root folder not saved to {}: {}", config_path.display(), e);
            false
        }
    }
}

/// Backoff after a failed query attempt
pub fn backoff(config: &GeocoderConfig) -> Duration {
    Duration::from_millis(config.backoff_ms)
}

/// Clustering parameters with optional CLI overrides, validated
pub fn cluster_params(
    toml_config: &TomlConfig,
    epsilon_km: Option<f64>,
    min_samples: Option<usize>,
) -> Result<ClusterParams> {
    let merged = ClusteringConfig {
        epsilon_km: epsilon_km.unwrap_or(toml_config.clustering.epsilon_km),
        min_samples: min_samples.unwrap_or(toml_config.clustering.min_samples),
    };
    merged.validate()?;
    Ok(ClusterParams::from(&merged))
}

/// Pipeline settings from config
pub fn pipeline_config(
    geocoder: &GeocoderConfig,
    clustering: ClusterParams,
) -> PipelineConfig {
    PipelineConfig {
        clustering,
        country_suffix: geocoder.country_suffix.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_params_overrides() {
        let config = TomlConfig::default();

        let params = cluster_params(&config, None, None).unwrap();
        assert_eq!(params, ClusterParams::default());

        let params = cluster_params(&config, Some(1.5), Some(4)).unwrap();
        assert_eq!(params.epsilon_km, 1.5);
        assert_eq!(params.min_samples, 4);
    }

    #[test]
    fn test_cluster_params_rejects_invalid() {
        let config = TomlConfig::default();
        assert!(cluster_params(&config, Some(0.0), None).is_err());
        assert!(cluster_params(&config, Some(-1.0), None).is_err());
        assert!(cluster_params(&config, None, Some(0)).is_err());
    }

    #[test]
    fn test_pipeline_config_uses_country_suffix() {
        let mut geocoder = GeocoderConfig::default();
        geocoder.country_suffix = "Canada".to_string();
        let pipeline = pipeline_config(&geocoder, ClusterParams::default());
        assert_eq!(pipeline.country_suffix, "Canada");
    }

    #[test]
    fn test_persist_root_folder_first_start_only() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("pgeo").join("config.toml");

        // First start: file created with the folder
        assert!(persist_root_folder(Path::new("/data/pgeo"), &config_path));
        let saved = load_toml_config(Some(&config_path)).unwrap();
        assert_eq!(saved.root_folder.as_deref(), Some(Path::new("/data/pgeo")));

        // Later starts leave it alone
        assert!(!persist_root_folder(Path::new("/elsewhere"), &config_path));
        let saved = load_toml_config(Some(&config_path)).unwrap();
        assert_eq!(saved.root_folder.as_deref(), Some(Path::new("/data/pgeo")));
    }

    #[test]
    fn test_persist_root_folder_keeps_other_settings() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "[clustering]\nepsilon_km = 1.25\nmin_samples = 5\n").unwrap();

        assert!(persist_root_folder(Path::new("/data/pgeo"), &config_path));

        let saved = load_toml_config(Some(&config_path)).unwrap();
        assert_eq!(saved.clustering.epsilon_km, 1.25);
        assert_eq!(saved.clustering.min_samples, 5);
        assert!(saved.root_folder.is_some());
    }

    #[test]
    fn test_persist_root_folder_skips_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, "not = [valid").unwrap();

        assert!(!persist_root_folder(Path::new("/data/pgeo"), &config_path));
        assert_eq!(std::fs::read_to_string(&config_path).unwrap(), "not = [valid");
    }

    #[test]
    fn test_backoff_from_millis() {
        let mut geocoder = GeocoderConfig::default();
        geocoder.backoff_ms = 250;
        assert_eq!(backoff(&geocoder), Duration::from_millis(250));
    }
}
