//! Saved address list handlers
//!
//! GET /addresses, POST /addresses, DELETE /addresses, GET /addresses/:idx

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use pgeo_common::records::NOISE_CLUSTER;
use pgeo_common::{AddressRecord, DensityLabel};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::services::address_ingest;
use crate::services::density_classifier;
use crate::workflow::storage::AddOutcome;
use crate::AppState;

/// One saved address as shown in the list view
#[derive(Debug, Serialize)]
pub struct AddressEntry {
    pub index: usize,
    pub address: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub cluster: Option<i64>,
    pub density: DensityLabel,
    /// CSS badge class suffix
    pub badge: &'static str,
    pub geocoded: bool,
}

impl AddressEntry {
    fn from_record(index: usize, record: &AddressRecord) -> Self {
        Self {
            index,
            address: record.raw_address.clone(),
            latitude: record.coordinate.map(|c| c.latitude),
            longitude: record.coordinate.map(|c| c.longitude),
            city: record.locality.clone(),
            zip_code: record.postal_code.clone(),
            cluster: record.cluster_id,
            density: record.density_label,
            badge: record.density_label.badge(),
            geocoded: record.is_resolved(),
        }
    }
}

/// GET /addresses response
#[derive(Debug, Serialize)]
pub struct AddressListResponse {
    pub count: usize,
    pub addresses: Vec<AddressEntry>,
}

/// POST /addresses request (newline separated)
#[derive(Debug, Deserialize)]
pub struct AddAddressesRequest {
    pub addresses: String,
}

/// DELETE /addresses request
#[derive(Debug, Deserialize)]
pub struct DeleteAddressRequest {
    pub address: String,
}

/// DELETE /addresses response
#[derive(Debug, Serialize)]
pub struct DeleteAddressResponse {
    pub removed: usize,
}

/// GET /addresses/:idx response
#[derive(Debug, Serialize)]
pub struct AddressDetailResponse {
    #[serde(flatten)]
    pub entry: AddressEntry,
    /// Addresses in this record's cluster, itself included (0 for noise)
    pub cluster_size: usize,
    /// Other geocoded addresses sharing the cluster
    pub cluster_mates: Vec<String>,
}

/// GET /addresses
pub async fn list_addresses(State(state): State<AppState>) -> ApiResult<Json<AddressListResponse>> {
    let records = state.address_book().load()?;
    let addresses: Vec<AddressEntry> = records
        .iter()
        .enumerate()
        .map(|(i, r)| AddressEntry::from_record(i, r))
        .collect();

    Ok(Json(AddressListResponse {
        count: addresses.len(),
        addresses,
    }))
}

/// POST /addresses
pub async fn add_addresses(
    State(state): State<AppState>,
    Json(request): Json<AddAddressesRequest>,
) -> ApiResult<Json<AddOutcome>> {
    let lines = address_ingest::parse_lines(&request.addresses);
    if lines.is_empty() {
        return Err(ApiError::BadRequest("No valid addresses entered".to_string()));
    }

    let outcome = {
        let _guard = state.address_lock.lock().await;
        state.address_book().add(&lines)?
    };
    Ok(Json(outcome))
}

/// DELETE /addresses
pub async fn delete_address(
    State(state): State<AppState>,
    Json(request): Json<DeleteAddressRequest>,
) -> ApiResult<Json<DeleteAddressResponse>> {
    if request.address.is_empty() {
        return Err(ApiError::BadRequest("address is required".to_string()));
    }

    let removed = {
        let _guard = state.address_lock.lock().await;
        state.address_book().remove(&request.address)?
    };
    if removed == 0 {
        return Err(ApiError::NotFound(format!(
            "Address not saved: {}",
            request.address
        )));
    }

    info!(removed, "Removed address");
    Ok(Json(DeleteAddressResponse { removed }))
}

/// GET /addresses/:idx
pub async fn view_address(
    State(state): State<AppState>,
    Path(idx): Path<usize>,
) -> ApiResult<Json<AddressDetailResponse>> {
    let records = state.address_book().load()?;
    let record = records
        .get(idx)
        .ok_or_else(|| ApiError::NotFound(format!("Address not found: index {}", idx)))?;

    if !record.is_resolved() {
        return Err(ApiError::Conflict(format!(
            "Address \"{}\" has not been geocoded yet. Process addresses first.",
            record.raw_address
        )));
    }

    let cluster = record.cluster_id.unwrap_or(NOISE_CLUSTER);
    let (cluster_size, cluster_mates) = if record.in_cluster() {
        let populations = density_classifier::cluster_populations(&records);
        let mates = records
            .iter()
            .enumerate()
            .filter(|(i, r)| *i != idx && r.is_resolved() && r.cluster_id == Some(cluster))
            .map(|(_, r)| r.raw_address.clone())
            .collect();
        (density_classifier::population_of(record, &populations), mates)
    } else {
        (0, Vec::new())
    };

    Ok(Json(AddressDetailResponse {
        entry: AddressEntry::from_record(idx, record),
        cluster_size,
        cluster_mates,
    }))
}

/// Build saved address routes
pub fn address_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/addresses",
            get(list_addresses).post(add_addresses).delete(delete_address),
        )
        .route("/addresses/:idx", get(view_address))
}
