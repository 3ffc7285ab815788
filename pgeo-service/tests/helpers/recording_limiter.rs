//! `RateLimiter` wrapper that timestamps every acquire

use async_trait::async_trait;
use pgeo_service::services::RateLimiter;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Passes through to `inner` and records when each acquire returned
pub struct RecordingLimiter {
    inner: Arc<dyn RateLimiter>,
    grants: Mutex<Vec<Instant>>,
}

impl RecordingLimiter {
    pub fn new(inner: Arc<dyn RateLimiter>) -> Self {
        Self {
            inner,
            grants: Mutex::new(Vec::new()),
        }
    }

    /// Grant times in order
    pub fn grants(&self) -> Vec<Instant> {
        self.grants.lock().unwrap().clone()
    }
}

#[async_trait]
impl RateLimiter for RecordingLimiter {
    async fn acquire(&self) {
        self.inner.acquire().await;
        self.grants.lock().unwrap().push(Instant::now());
    }
}
