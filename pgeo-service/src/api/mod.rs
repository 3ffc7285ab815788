//! HTTP API handlers for pgeo-service
//!
//! JSON over REST plus an SSE progress stream.

pub mod addresses;
pub mod events;
pub mod health;
pub mod processing;

pub use addresses::address_routes;
pub use events::event_stream;
pub use health::health_routes;
pub use processing::processing_routes;
