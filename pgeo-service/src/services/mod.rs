//! Service modules for the geocoding pipeline
//!
//! Leaves first: query construction, rate limiting and the lookup boundary,
//! then address resolution, clustering and density labels. Address intake
//! from CSV lives here too.

pub mod address_ingest;
pub mod density_classifier;
pub mod geocoding_client;
pub mod lookup;
pub mod nominatim_client;
pub mod query_builder;
pub mod rate_limiter;
pub mod spatial_clusterer;

pub use geocoding_client::{GeocodingClient, Resolution};
pub use lookup::{AddressDetails, GeocodeError, GeocodeLookup, QueryOutcome};
pub use nominatim_client::NominatimLookup;
pub use query_builder::FallbackQueryBuilder;
pub use rate_limiter::{IntervalLimiter, NoDelay, RateLimiter};
pub use spatial_clusterer::{ClusterParams, ClusterSummary, SpatialClusterer};
