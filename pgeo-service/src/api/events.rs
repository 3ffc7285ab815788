//! GET /events - SSE stream of pipeline progress

use crate::AppState;
use axum::{extract::State, response::sse::{Event, Sse}};
use futures::stream::Stream;
use std::convert::Infallible;
use tracing::info;

/// Streams every `PipelineEvent` published on the shared bus
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.event_bus.subscribe();
    info!(subscribers = state.event_bus.subscriber_count(), "SSE client connected");
    pgeo_common::sse::pipeline_event_stream(rx)
}
