//! Address resolution through the fallback query list
//!
//! Drives the queries of one address through the external lookup, gated by
//! the shared rate limiter. Per-query failures are logged and followed by a
//! fixed backoff before the next query. No backoff follows the last query:
//! the next lookup call, for this or any other address, is already spaced
//! by the rate limiter. When every query fails the record stays unresolved.
//! No error leaves this module.

use super::lookup::{GeocodeLookup, QueryOutcome};
use super::rate_limiter::RateLimiter;
use pgeo_common::AddressRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Resolution of one address
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Record with coordinate/locality/postal code filled when resolved
    pub record: AddressRecord,
    /// Queries attempted, including the successful one
    pub queries_tried: usize,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.record.is_resolved()
    }
}

/// Geocoding client with fallback and shared rate limit
#[derive(Clone)]
pub struct GeocodingClient {
    lookup: Arc<dyn GeocodeLookup>,
    limiter: Arc<dyn RateLimiter>,
    backoff: Duration,
}

impl GeocodingClient {
    /// # Arguments
    /// * `lookup` - External lookup service
    /// * `limiter` - Rate limiter shared by every call this client makes
    /// * `backoff` - Extra wait after a failed query before the next one
    pub fn new(
        lookup: Arc<dyn GeocodeLookup>,
        limiter: Arc<dyn RateLimiter>,
        backoff: Duration,
    ) -> Self {
        Self {
            lookup,
            limiter,
            backoff,
        }
    }

    /// Resolve `address` by trying `queries` in order
    ///
    /// Stops at the first successful query. The backoff is skipped after the
    /// last query since nothing follows it.
    pub async fn resolve(&self, address: &str, queries: &[String]) -> Resolution {
        let mut record = AddressRecord::new(address);

        for (attempt, query) in queries.iter().enumerate() {
            self.limiter.acquire().await;

            debug!(
                attempt = attempt + 1,
                of = queries.len(),
                query = %query,
                service = self.lookup.name(),
                "Geocoding query"
            );

            match self.lookup.lookup(query, true).await {
                QueryOutcome::Success { coordinate, details } => {
                    record.coordinate = Some(coordinate);
                    record.locality = details.locality().map(str::to_string);
                    record.postal_code = details.postal_code().map(str::to_string);

                    debug!(
                        address = %address,
                        latitude = coordinate.latitude,
                        longitude = coordinate.longitude,
                        "Resolved"
                    );

                    return Resolution {
                        record,
                        queries_tried: attempt + 1,
                    };
                }
                QueryOutcome::Failure(reason) => {
                    warn!(query = %query, reason = %reason, "Geocoding query failed");
                    let more_queries = attempt + 1 < queries.len();
                    if more_queries && !self.backoff.is_zero() {
                        tokio::time::sleep(self.backoff).await;
                    }
                }
            }
        }

        warn!(address = %address, queries = queries.len(), "Address could not be resolved");

        Resolution {
            record,
            queries_tried: queries.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::lookup::{AddressDetails, GeocodeError};
    use crate::services::rate_limiter::NoDelay;
    use async_trait::async_trait;
    use pgeo_common::Coordinate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers from a fixed table; unknown queries fail
    struct TableLookup {
        answers: HashMap<String, (f64, f64)>,
        calls: Mutex<Vec<String>>,
    }

    impl TableLookup {
        fn new(answers: &[(&str, (f64, f64))]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(q, c)| (q.to_string(), *c))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GeocodeLookup for TableLookup {
        fn name(&self) -> &'static str {
            "table"
        }

        async fn lookup(&self, query: &str, _address_details: bool) -> QueryOutcome {
            self.calls.lock().unwrap().push(query.to_string());
            match self.answers.get(query) {
                Some((lat, lon)) => QueryOutcome::Success {
                    coordinate: Coordinate::new(*lat, *lon).unwrap(),
                    details: AddressDetails {
                        city: None,
                        town: Some("Smallville".to_string()),
                        village: None,
                        postcode: Some("66002".to_string()),
                    },
                },
                None => QueryOutcome::Failure(GeocodeError::Network("connection reset".into())),
            }
        }
    }

    struct CountingLimiter(AtomicUsize);

    #[async_trait]
    impl RateLimiter for CountingLimiter {
        async fn acquire(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn queries(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_first_success_stops_iteration() {
        let lookup = Arc::new(TableLookup::new(&[("a, USA", (39.0, -95.0))]));
        let client = GeocodingClient::new(lookup.clone(), Arc::new(NoDelay), Duration::ZERO);

        let res = client.resolve("a", &queries(&["a", "a, USA", "a, b, USA"])).await;

        assert!(res.is_resolved());
        assert_eq!(res.queries_tried, 2);
        assert_eq!(res.record.raw_address, "a");
        assert_eq!(res.record.locality.as_deref(), Some("Smallville"));
        assert_eq!(res.record.postal_code.as_deref(), Some("66002"));
        assert_eq!(*lookup.calls.lock().unwrap(), vec!["a", "a, USA"]);
    }

    #[tokio::test]
    async fn test_all_failures_leave_record_unresolved() {
        let lookup = Arc::new(TableLookup::new(&[]));
        let limiter = Arc::new(CountingLimiter(AtomicUsize::new(0)));
        let client = GeocodingClient::new(lookup.clone(), limiter.clone(), Duration::ZERO);

        let res = client.resolve("x", &queries(&["x", "x, USA", "x, y, USA"])).await;

        assert!(!res.is_resolved());
        assert_eq!(res.queries_tried, 3);
        assert!(res.record.locality.is_none());
        assert!(res.record.cluster_id.is_none());
        // every attempt passed through the limiter
        assert_eq!(limiter.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_backoff_applied_between_failed_queries() {
        let lookup = Arc::new(TableLookup::new(&[]));
        let client = GeocodingClient::new(lookup, Arc::new(NoDelay), Duration::from_millis(50));

        let start = std::time::Instant::now();
        client.resolve("x", &queries(&["x", "x, USA", "x, y, USA"])).await;

        // two backoffs: after the first and second failures, none after the last
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(150) + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_empty_query_list_is_unresolved() {
        let lookup = Arc::new(TableLookup::new(&[]));
        let client = GeocodingClient::new(lookup, Arc::new(NoDelay), Duration::ZERO);
        let res = client.resolve("x", &[]).await;
        assert!(!res.is_resolved());
        assert_eq!(res.queries_tried, 0);
    }
}
