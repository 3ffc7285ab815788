//! In-memory `GeocodeLookup` answering from a fixed query table

use async_trait::async_trait;
use pgeo_common::Coordinate;
use pgeo_service::services::{AddressDetails, GeocodeError, GeocodeLookup, QueryOutcome};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Lookup that resolves only the queries it was given
///
/// Unknown queries fail with `NoResult`. Every query received is recorded
/// in call order.
#[derive(Default)]
pub struct ScriptedLookup {
    places: HashMap<String, (Coordinate, AddressDetails)>,
    failures: HashMap<String, GeocodeError>,
    cancel_on: Option<(String, CancellationToken)>,
    hold_on: Option<(String, Arc<Notify>)>,
    panic_on: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `query` to the given point
    pub fn with_place(
        mut self,
        query: &str,
        latitude: f64,
        longitude: f64,
        city: Option<&str>,
        postcode: Option<&str>,
    ) -> Self {
        let details = AddressDetails {
            city: city.map(str::to_string),
            postcode: postcode.map(str::to_string),
            ..Default::default()
        };
        let coordinate = Coordinate::new(latitude, longitude).unwrap();
        self.places.insert(query.to_string(), (coordinate, details));
        self
    }

    /// Resolve `query` with explicit address details
    pub fn with_details(
        mut self,
        query: &str,
        latitude: f64,
        longitude: f64,
        details: AddressDetails,
    ) -> Self {
        let coordinate = Coordinate::new(latitude, longitude).unwrap();
        self.places.insert(query.to_string(), (coordinate, details));
        self
    }

    /// Fail `query` with a specific reason
    pub fn with_failure(mut self, query: &str, reason: GeocodeError) -> Self {
        self.failures.insert(query.to_string(), reason);
        self
    }

    /// Cancel `token` when `query` is looked up
    pub fn cancel_on(mut self, query: &str, token: CancellationToken) -> Self {
        self.cancel_on = Some((query.to_string(), token));
        self
    }

    /// Block the lookup of `query` until `gate` is notified
    pub fn hold_on(mut self, query: &str, gate: Arc<Notify>) -> Self {
        self.hold_on = Some((query.to_string(), gate));
        self
    }

    /// Panic when `query` is looked up
    pub fn panic_on(mut self, query: &str) -> Self {
        self.panic_on = Some(query.to_string());
        self
    }

    /// Queries received so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GeocodeLookup for ScriptedLookup {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn lookup(&self, query: &str, _address_details: bool) -> QueryOutcome {
        self.calls.lock().unwrap().push(query.to_string());

        if let Some((trigger, token)) = &self.cancel_on {
            if trigger == query {
                token.cancel();
            }
        }

        if let Some((trigger, gate)) = &self.hold_on {
            if trigger == query {
                gate.notified().await;
            }
        }

        if self.panic_on.as_deref() == Some(query) {
            panic!("scripted lookup panicked on {}", query);
        }

        if let Some(reason) = self.failures.get(query) {
            return QueryOutcome::Failure(reason.clone());
        }

        match self.places.get(query) {
            Some((coordinate, details)) => QueryOutcome::Success {
                coordinate: *coordinate,
                details: details.clone(),
            },
            None => QueryOutcome::Failure(GeocodeError::NoResult),
        }
    }
}
