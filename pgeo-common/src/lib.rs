//! # pgeo Common Library
//!
//! Shared code for the property geocoder crates:
//! - Address record model and density labels
//! - Pipeline event types and the broadcast EventBus
//! - Configuration loading and root folder resolution
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod records;
pub mod sse;

pub use error::{Error, Result};
pub use records::{AddressRecord, Coordinate, DensityLabel};
