//! Geocoding lookup boundary
//!
//! A single query attempt against the external service yields a typed
//! `QueryOutcome`; nothing is thrown past the fallback loop.

use async_trait::async_trait;
use pgeo_common::Coordinate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why one query attempt failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeocodeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No result for query")]
    NoResult,

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}

/// Structured address details returned with a match
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddressDetails {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub town: Option<String>,
    #[serde(default)]
    pub village: Option<String>,
    #[serde(default)]
    pub postcode: Option<String>,
}

impl AddressDetails {
    /// City, else town, else village (empty values skipped)
    pub fn locality(&self) -> Option<&str> {
        [&self.city, &self.town, &self.village]
            .into_iter()
            .filter_map(|v| v.as_deref())
            .map(str::trim)
            .find(|v| !v.is_empty())
    }

    /// Postal code, if present and non-empty
    pub fn postal_code(&self) -> Option<&str> {
        self.postcode
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }
}

/// Result of one query attempt
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Success {
        coordinate: Coordinate,
        details: AddressDetails,
    },
    Failure(GeocodeError),
}

/// External geocoding service
///
/// Implementations must not panic; every failure is reported as
/// `QueryOutcome::Failure`.
#[async_trait]
pub trait GeocodeLookup: Send + Sync {
    /// Service name for logging
    fn name(&self) -> &'static str;

    /// Look up one query string
    ///
    /// `address_details` requests the structured city/town/village/postcode map.
    async fn lookup(&self, query: &str, address_details: bool) -> QueryOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locality_preference_order() {
        let details = AddressDetails {
            city: Some("Springfield".into()),
            town: Some("Shelbyville".into()),
            village: Some("Ogdenville".into()),
            postcode: None,
        };
        assert_eq!(details.locality(), Some("Springfield"));

        let details = AddressDetails {
            city: None,
            town: Some("Shelbyville".into()),
            village: Some("Ogdenville".into()),
            postcode: None,
        };
        assert_eq!(details.locality(), Some("Shelbyville"));

        let details = AddressDetails {
            city: Some("".into()),
            town: None,
            village: Some("Ogdenville".into()),
            postcode: None,
        };
        assert_eq!(details.locality(), Some("Ogdenville"));

        assert_eq!(AddressDetails::default().locality(), None);
    }

    #[test]
    fn test_postal_code_empty_is_absent() {
        let mut details = AddressDetails::default();
        assert_eq!(details.postal_code(), None);
        details.postcode = Some(" ".into());
        assert_eq!(details.postal_code(), None);
        details.postcode = Some("62701".into());
        assert_eq!(details.postal_code(), Some("62701"));
    }
}
