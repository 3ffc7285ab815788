//! Pipeline run handlers
//!
//! POST /process, POST /process/cancel, POST /upload, GET /download,
//! GET /heatmap/points

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use pgeo_common::AddressRecord;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::services::address_ingest;
use crate::workflow::pipeline::{Pipeline, RunStatus};
use crate::workflow::storage;
use crate::AppState;

/// Response for a run started in the background
#[derive(Debug, Serialize)]
pub struct RunStartedResponse {
    pub run_id: Uuid,
    pub total: usize,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// POST /process/cancel response
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// GET /heatmap/points response
#[derive(Debug, Serialize)]
pub struct HeatmapPoints {
    /// Mean of all resolved coordinates, [lat, lon]
    pub center: [f64; 2],
    /// Every resolved coordinate, [lat, lon]
    pub points: Vec<[f64; 2]>,
}

impl HeatmapPoints {
    /// Points over the resolved records; `None` when there are none
    pub fn from_records(records: &[AddressRecord]) -> Option<Self> {
        let points: Vec<[f64; 2]> = records
            .iter()
            .filter_map(|r| r.coordinate)
            .map(|c| [c.latitude, c.longitude])
            .collect();
        if points.is_empty() {
            return None;
        }

        let n = points.len() as f64;
        let lat = points.iter().map(|p| p[0]).sum::<f64>() / n;
        let lon = points.iter().map(|p| p[1]).sum::<f64>() / n;
        Some(Self {
            center: [lat, lon],
            points,
        })
    }
}

/// POST /process
///
/// Runs the pipeline over the saved list in a background task.
pub async fn process_saved(
    State(state): State<AppState>,
) -> ApiResult<(StatusCode, Json<RunStartedResponse>)> {
    let addresses: Vec<String> = state
        .address_book()
        .load()?
        .into_iter()
        .map(|r| r.raw_address)
        .collect();

    if addresses.is_empty() {
        return Err(ApiError::BadRequest(
            "No saved addresses to process".to_string(),
        ));
    }

    let token = claim_run_slot(&state).await?;
    let response = spawn_run(&state, token, addresses);
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /upload
///
/// CSV body; replaces the saved list with the ingested addresses and starts a run.
pub async fn upload(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<RunStartedResponse>)> {
    let addresses = address_ingest::load_addresses(&body[..])?;
    if addresses.is_empty() {
        return Err(ApiError::BadRequest(
            "Upload contains no usable addresses".to_string(),
        ));
    }

    // Slot first: a 409 must leave the saved list untouched
    let token = claim_run_slot(&state).await?;

    let fresh: Vec<AddressRecord> = addresses.iter().map(AddressRecord::new).collect();
    let replaced = {
        let _guard = state.address_lock.lock().await;
        state.address_book().replace(&fresh)
    };
    if let Err(e) = replaced {
        release_run_slot(&state).await;
        return Err(e.into());
    }

    let response = spawn_run(&state, token, addresses);
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// POST /process/cancel
pub async fn cancel_run(State(state): State<AppState>) -> ApiResult<Json<CancelResponse>> {
    match state.active_run.lock().await.as_ref() {
        Some(token) => {
            token.cancel();
            tracing::info!("Cancellation requested for active run");
            Ok(Json(CancelResponse { cancelled: true }))
        }
        None => Err(ApiError::NotFound("No run in progress".to_string())),
    }
}

/// GET /download
pub async fn download(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let path = state.enriched_path();
    if !path.exists() {
        return Err(ApiError::NotFound(
            "No data available. Process addresses first.".to_string(),
        ));
    }

    let body = tokio::fs::read(&path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"enriched_data.csv\"",
            ),
        ],
        body,
    ))
}

/// GET /heatmap/points
pub async fn heatmap_points(State(state): State<AppState>) -> ApiResult<Json<HeatmapPoints>> {
    let records = storage::load_records(&state.enriched_path())?;
    HeatmapPoints::from_records(&records)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("No geocoded addresses available".to_string()))
}

/// Take the run slot; 409 when a run is active
async fn claim_run_slot(state: &AppState) -> ApiResult<CancellationToken> {
    let mut active = state.active_run.lock().await;
    if active.is_some() {
        return Err(ApiError::Conflict("A run is already in progress".to_string()));
    }
    let token = CancellationToken::new();
    *active = Some(token.clone());
    Ok(token)
}

async fn release_run_slot(state: &AppState) {
    *state.active_run.lock().await = None;
}

/// Spawn the pipeline on a claimed slot
///
/// The run executes in its own task. A supervising task awaits it and
/// releases the slot however it ends, panics included.
fn spawn_run(state: &AppState, token: CancellationToken, addresses: Vec<String>) -> RunStartedResponse {
    let pipeline = Pipeline::new(state.pipeline_config(), state.geocoding_client())
        .with_event_bus(state.event_bus.clone())
        .with_cancellation(token);

    let response = RunStartedResponse {
        run_id: pipeline.run_id(),
        total: addresses.len(),
        started_at: chrono::Utc::now(),
    };

    tracing::info!(
        run_id = %response.run_id,
        total = response.total,
        "Pipeline run accepted"
    );

    let state = state.clone();
    let run_id = response.run_id;
    tokio::spawn(async move {
        let run = tokio::spawn(execute_run(state.clone(), pipeline, addresses));
        let failure = match run.await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("Pipeline task aborted: {}", e)),
        };
        if let Some(message) = failure {
            tracing::error!(run_id = %run_id, error = %message, "Pipeline run failed");
            state.record_error(message).await;
        }
        release_run_slot(&state).await;
    });

    response
}

/// Run the pipeline, then persist the enriched output and merge it into the saved list
async fn execute_run(
    state: AppState,
    pipeline: Pipeline,
    addresses: Vec<String>,
) -> pgeo_common::Result<()> {
    let output = pipeline.run(&addresses).await;

    storage::save_records(&state.enriched_path(), &output.records)?;

    // Merged by address so edits made during the run survive. Rows a
    // cancelled run never reached stay as they were.
    let updated = {
        let _guard = state.address_lock.lock().await;
        state.address_book().merge_results(&output.records)?
    };

    tracing::info!(
        run_id = %output.run_id,
        processed = output.records.len(),
        updated,
        cancelled = output.status == RunStatus::Cancelled,
        "Run results saved"
    );
    Ok(())
}

/// Build pipeline run routes
pub fn processing_routes() -> Router<AppState> {
    Router::new()
        .route("/process", post(process_saved))
        .route("/process/cancel", post(cancel_run))
        .route("/upload", post(upload))
        .route("/download", get(download))
        .route("/heatmap/points", get(heatmap_points))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgeo_common::Coordinate;

    #[test]
    fn test_heatmap_center_is_mean() {
        let mut a = AddressRecord::new("a");
        a.coordinate = Some(Coordinate::new(40.0, -75.0).unwrap());
        let mut b = AddressRecord::new("b");
        b.coordinate = Some(Coordinate::new(42.0, -77.0).unwrap());
        let c = AddressRecord::new("unresolved");

        let heatmap = HeatmapPoints::from_records(&[a, b, c]).unwrap();
        assert_eq!(heatmap.points, vec![[40.0, -75.0], [42.0, -77.0]]);
        assert_eq!(heatmap.center, [41.0, -76.0]);
    }

    #[test]
    fn test_heatmap_empty_when_nothing_resolved() {
        assert!(HeatmapPoints::from_records(&[AddressRecord::new("x")]).is_none());
        assert!(HeatmapPoints::from_records(&[]).is_none());
    }
}
