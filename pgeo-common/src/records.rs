//! Address record model
//!
//! One `AddressRecord` per input address, created fresh for every pipeline run.
//! Each stage (resolution, clustering, classification) consumes a record
//! collection and produces a new one with more fields filled in.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cluster id assigned to points not density-reachable from any core point
pub const NOISE_CLUSTER: i64 = -1;

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude, -90.0 to 90.0
    pub latitude: f64,
    /// Longitude, -180.0 to 180.0
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting out-of-range or non-finite components
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidInput(format!(
                "latitude out of range: {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidInput(format!(
                "longitude out of range: {}",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// (latitude, longitude) in radians
    pub fn to_radians(&self) -> (f64, f64) {
        (self.latitude.to_radians(), self.longitude.to_radians())
    }
}

/// User-facing density classification of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DensityLabel {
    /// Cluster of 10 or more addresses
    High,
    /// Cluster of 5 to 9 addresses
    Medium,
    /// Cluster smaller than 5 addresses
    Low,
    /// Resolved, but not part of any cluster
    Isolated,
    /// Never resolved to a coordinate
    #[default]
    NotProcessed,
}

impl DensityLabel {
    /// Stable identifier used in CSV and JSON
    pub fn as_str(&self) -> &'static str {
        match self {
            DensityLabel::High => "High",
            DensityLabel::Medium => "Medium",
            DensityLabel::Low => "Low",
            DensityLabel::Isolated => "Isolated",
            DensityLabel::NotProcessed => "NotProcessed",
        }
    }

    /// CSS badge class suffix for UI display
    pub fn badge(&self) -> &'static str {
        match self {
            DensityLabel::High => "danger",
            DensityLabel::Medium => "warning",
            DensityLabel::Low => "info",
            DensityLabel::Isolated | DensityLabel::NotProcessed => "muted",
        }
    }
}

impl fmt::Display for DensityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DensityLabel::NotProcessed => write!(f, "Not processed"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

impl FromStr for DensityLabel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "High" => Ok(DensityLabel::High),
            "Medium" => Ok(DensityLabel::Medium),
            "Low" => Ok(DensityLabel::Low),
            "Isolated" => Ok(DensityLabel::Isolated),
            "NotProcessed" | "Not processed" => Ok(DensityLabel::NotProcessed),
            other => Err(Error::InvalidInput(format!(
                "unknown density label: {}",
                other
            ))),
        }
    }
}

/// One address flowing through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Address text exactly as ingested
    pub raw_address: String,
    /// Resolved coordinate (absent when unresolved)
    pub coordinate: Option<Coordinate>,
    /// City, town or village reported by the lookup service
    pub locality: Option<String>,
    /// Postal code reported by the lookup service
    pub postal_code: Option<String>,
    /// Cluster id; `NOISE_CLUSTER` for noise, absent until clustering runs
    pub cluster_id: Option<i64>,
    /// Derived density label
    pub density_label: DensityLabel,
}

impl AddressRecord {
    /// Fresh, unresolved record
    pub fn new(raw_address: impl Into<String>) -> Self {
        Self {
            raw_address: raw_address.into(),
            coordinate: None,
            locality: None,
            postal_code: None,
            cluster_id: None,
            density_label: DensityLabel::NotProcessed,
        }
    }

    /// Whether the record carries a coordinate
    pub fn is_resolved(&self) -> bool {
        self.coordinate.is_some()
    }

    /// Whether the record belongs to a real (non-noise) cluster
    pub fn in_cluster(&self) -> bool {
        matches!(self.cluster_id, Some(id) if id >= 0)
    }

    /// Check the record invariants
    ///
    /// - `raw_address` is non-empty
    /// - `cluster_id` is only set when a coordinate is present
    pub fn validate(&self) -> Result<()> {
        if self.raw_address.trim().is_empty() {
            return Err(Error::InvalidInput("empty address".to_string()));
        }
        if self.cluster_id.is_some() && self.coordinate.is_none() {
            return Err(Error::InvalidInput(format!(
                "cluster id set on unresolved address: {}",
                self.raw_address
            )));
        }
        Ok(())
    }
}
