//! Pipeline event types and EventBus
//!
//! Events are broadcast via EventBus and serialized for SSE transmission.

use crate::records::AddressRecord;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Progress events emitted by one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Run accepted and resolution phase starting
    RunStarted {
        run_id: Uuid,
        /// Number of input addresses
        total: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// One address resolved to a coordinate
    ///
    /// Carries the record so callers can checkpoint per record.
    RecordResolved {
        run_id: Uuid,
        /// Input position (0-based)
        index: usize,
        record: AddressRecord,
        /// Number of fallback queries tried, including the successful one
        queries_tried: usize,
    },

    /// Every fallback query for one address failed
    RecordUnresolved {
        run_id: Uuid,
        index: usize,
        address: String,
        queries_tried: usize,
    },

    /// Clustering finished over the resolved subset
    ClusteringCompleted {
        run_id: Uuid,
        clusters: usize,
        noise: usize,
    },

    /// Run finished normally
    RunCompleted {
        run_id: Uuid,
        resolved: usize,
        unresolved: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Run stopped between records
    RunCancelled {
        run_id: Uuid,
        /// Records attempted before cancellation
        processed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PipelineEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::RunStarted { .. } => "RunStarted",
            PipelineEvent::RecordResolved { .. } => "RecordResolved",
            PipelineEvent::RecordUnresolved { .. } => "RecordUnresolved",
            PipelineEvent::ClusteringCompleted { .. } => "ClusteringCompleted",
            PipelineEvent::RunCompleted { .. } => "RunCompleted",
            PipelineEvent::RunCancelled { .. } => "RunCancelled",
        }
    }

    /// Run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            PipelineEvent::RunStarted { run_id, .. }
            | PipelineEvent::RecordResolved { run_id, .. }
            | PipelineEvent::RecordUnresolved { run_id, .. }
            | PipelineEvent::ClusteringCompleted { run_id, .. }
            | PipelineEvent::RunCompleted { run_id, .. }
            | PipelineEvent::RunCancelled { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast channel for pipeline events
///
/// Cloning shares the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Arguments
    ///
    /// * `capacity` - Number of events to buffer before dropping old events
    ///
    /// # Examples
    ///
    /// ```
    /// use pgeo_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
