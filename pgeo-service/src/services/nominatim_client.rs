//! Nominatim (OpenStreetMap) search client
//!
//! # API Reference
//! - Endpoint: https://nominatim.openstreetmap.org/search
//! - Documentation: https://nominatim.org/release-docs/latest/api/Search/
//! - Usage policy: at most 1 request/second and an identifying User-Agent
//!
//! Rate limiting is not done here; callers pass every request through the
//! shared `RateLimiter` first.

use super::lookup::{AddressDetails, GeocodeError, GeocodeLookup, QueryOutcome};
use async_trait::async_trait;
use pgeo_common::config::GeocoderConfig;
use pgeo_common::Coordinate;
use reqwest::{header, Client};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// One search hit (`format=jsonv2`)
///
/// Nominatim returns coordinates as decimal strings.
#[derive(Debug, Clone, Deserialize)]
pub struct NominatimPlace {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: AddressDetails,
}

/// Nominatim search client
pub struct NominatimLookup {
    http_client: Client,
    endpoint: String,
}

impl NominatimLookup {
    /// Create a client from geocoder settings
    pub fn new(config: &GeocoderConfig) -> Result<Self, GeocodeError> {
        let user_agent = header::HeaderValue::from_str(&config.user_agent)
            .map_err(|e| GeocodeError::Network(format!("Invalid User-Agent: {}", e)))?;
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, user_agent);

        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .default_headers(headers)
            .build()
            .map_err(|e| GeocodeError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
        })
    }

    async fn search(&self, query: &str, address_details: bool) -> Result<Vec<NominatimPlace>, GeocodeError> {
        let details_flag = if address_details { "1" } else { "0" };

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "jsonv2"),
                ("addressdetails", details_flag),
                ("limit", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GeocodeError::Timeout
                } else {
                    GeocodeError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeocodeError::Api(status.as_u16(), body));
        }

        response
            .json::<Vec<NominatimPlace>>()
            .await
            .map_err(|e| GeocodeError::Parse(e.to_string()))
    }
}

/// Turn a search response into a query outcome
///
/// Only the first hit is used. An empty list is `NoResult`.
pub fn outcome_from_places(places: Vec<NominatimPlace>) -> QueryOutcome {
    let Some(place) = places.into_iter().next() else {
        return QueryOutcome::Failure(GeocodeError::NoResult);
    };

    let latitude = match place.lat.trim().parse::<f64>() {
        Ok(v) => v,
        Err(e) => {
            return QueryOutcome::Failure(GeocodeError::Parse(format!(
                "latitude {:?}: {}",
                place.lat, e
            )))
        }
    };
    let longitude = match place.lon.trim().parse::<f64>() {
        Ok(v) => v,
        Err(e) => {
            return QueryOutcome::Failure(GeocodeError::Parse(format!(
                "longitude {:?}: {}",
                place.lon, e
            )))
        }
    };

    match Coordinate::new(latitude, longitude) {
        Ok(coordinate) => QueryOutcome::Success {
            coordinate,
            details: place.address,
        },
        Err(e) => QueryOutcome::Failure(GeocodeError::InvalidCoordinate(e.to_string())),
    }
}

#[async_trait]
impl GeocodeLookup for NominatimLookup {
    fn name(&self) -> &'static str {
        "nominatim"
    }

    async fn lookup(&self, query: &str, address_details: bool) -> QueryOutcome {
        debug!(query = %query, "Querying Nominatim");
        match self.search(query, address_details).await {
            Ok(places) => {
                if let Some(name) = places.first().and_then(|p| p.display_name.as_deref()) {
                    debug!(query = %query, matched = %name, "Nominatim match");
                }
                outcome_from_places(places)
            }
            Err(e) => QueryOutcome::Failure(e),
        }
    }
}
