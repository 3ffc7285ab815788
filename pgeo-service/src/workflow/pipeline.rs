//! Pipeline driver
//!
//! Sequences the stages over one address list:
//! - **Resolve**: fallback queries through the geocoding client, one address
//!   at a time, every call gated by the shared rate limiter
//! - **Cluster**: DBSCAN over the resolved subset
//! - **Classify**: density label per record
//!
//! Each stage consumes a record collection and returns a new one. Output
//! order always equals input order.
//!
//! # Error Handling
//! Nothing here fails the run. Unresolved addresses stay in the output with
//! no coordinate and label `NotProcessed`.
//!
//! # Cancellation
//! The token is checked between records. A cancelled run still clusters and
//! labels the records attempted so far and returns them with
//! `RunStatus::Cancelled`.
//!
//! # Example
//! ```rust,ignore
//! let pipeline = Pipeline::new(PipelineConfig::default(), client);
//! let output = pipeline.run(&addresses).await;
//! ```

use crate::services::density_classifier;
use crate::services::geocoding_client::GeocodingClient;
use crate::services::query_builder::FallbackQueryBuilder;
use crate::services::spatial_clusterer::{ClusterParams, ClusterSummary, SpatialClusterer};
use pgeo_common::events::{EventBus, PipelineEvent};
use pgeo_common::AddressRecord;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Clustering parameters
    pub clustering: ClusterParams,
    /// Country token used by the fallback queries
    pub country_suffix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            clustering: ClusterParams::default(),
            country_suffix: "USA".to_string(),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Completed,
    Cancelled,
}

/// Result of one run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Enriched records in input order (a prefix of the input when cancelled)
    pub records: Vec<AddressRecord>,
    pub summary: ClusterSummary,
}

impl PipelineOutput {
    pub fn resolved(&self) -> usize {
        self.records.iter().filter(|r| r.is_resolved()).count()
    }

    pub fn unresolved(&self) -> usize {
        self.records.len() - self.resolved()
    }
}

/// Pipeline driver
pub struct Pipeline {
    run_id: Uuid,
    config: PipelineConfig,
    client: GeocodingClient,
    query_builder: FallbackQueryBuilder,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    event_bus: Option<EventBus>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Create new pipeline with a fresh run id
    pub fn new(config: PipelineConfig, client: GeocodingClient) -> Self {
        let query_builder = FallbackQueryBuilder::new(config.country_suffix.clone());
        Self {
            run_id: Uuid::new_v4(),
            config,
            client,
            query_builder,
            event_tx: None,
            event_bus: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Report progress on a channel
    pub fn with_events(mut self, event_tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Broadcast progress on the shared event bus
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Stop between records once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Run all stages over `addresses`
    pub async fn run(&self, addresses: &[String]) -> PipelineOutput {
        info!(run_id = %self.run_id, total = addresses.len(), "Pipeline run started");

        self.emit(PipelineEvent::RunStarted {
            run_id: self.run_id,
            total: addresses.len(),
            timestamp: chrono::Utc::now(),
        })
        .await;

        let (resolved, status) = self.resolve_all(addresses).await;
        let (clustered, summary) = cluster_stage(resolved, self.config.clustering);

        self.emit(PipelineEvent::ClusteringCompleted {
            run_id: self.run_id,
            clusters: summary.clusters,
            noise: summary.noise,
        })
        .await;

        let records = classify_stage(clustered);
        let output = PipelineOutput {
            run_id: self.run_id,
            status,
            records,
            summary,
        };

        match status {
            RunStatus::Completed => {
                info!(
                    run_id = %self.run_id,
                    resolved = output.resolved(),
                    total = addresses.len(),
                    "Geocoded {}/{} addresses successfully",
                    output.resolved(),
                    addresses.len()
                );
                self.emit(PipelineEvent::RunCompleted {
                    run_id: self.run_id,
                    resolved: output.resolved(),
                    unresolved: output.unresolved(),
                    timestamp: chrono::Utc::now(),
                })
                .await;
            }
            RunStatus::Cancelled => {
                warn!(
                    run_id = %self.run_id,
                    processed = output.records.len(),
                    total = addresses.len(),
                    "Pipeline run cancelled"
                );
                self.emit(PipelineEvent::RunCancelled {
                    run_id: self.run_id,
                    processed: output.records.len(),
                    timestamp: chrono::Utc::now(),
                })
                .await;
            }
        }

        output
    }

    /// Resolution stage: one record per attempted address, input order kept
    pub async fn resolve_all(&self, addresses: &[String]) -> (Vec<AddressRecord>, RunStatus) {
        let mut records = Vec::with_capacity(addresses.len());
        let total = addresses.len();

        for (index, address) in addresses.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return (records, RunStatus::Cancelled);
            }

            info!("Geocoding {}/{}: {}", index + 1, total, address);

            let queries = self.query_builder.build(address);
            let resolution = self.client.resolve(address, &queries).await;

            if resolution.is_resolved() {
                self.emit(PipelineEvent::RecordResolved {
                    run_id: self.run_id,
                    index,
                    record: resolution.record.clone(),
                    queries_tried: resolution.queries_tried,
                })
                .await;
            } else {
                self.emit(PipelineEvent::RecordUnresolved {
                    run_id: self.run_id,
                    index,
                    address: address.clone(),
                    queries_tried: resolution.queries_tried,
                })
                .await;
            }

            records.push(resolution.record);
        }

        (records, RunStatus::Completed)
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(event.clone());
        }
        if let Some(tx) = &self.event_tx {
            if tx.send(event).await.is_err() {
                warn!("Pipeline event receiver dropped");
            }
        }
    }
}

/// Clustering stage over the resolved subset
pub fn cluster_stage(
    records: Vec<AddressRecord>,
    params: ClusterParams,
) -> (Vec<AddressRecord>, ClusterSummary) {
    SpatialClusterer::new(params).assign(records)
}

/// Classification stage
pub fn classify_stage(records: Vec<AddressRecord>) -> Vec<AddressRecord> {
    density_classifier::label_records(records)
}
