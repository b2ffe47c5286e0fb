//! Admin device handlers

use axum::{extract::{State, Path, Query}, Json};
use fingerprint_core::logic::identity::SimilarityScorer;
use fingerprint_core::logic::signals::SignalSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::Envelope;
use crate::{AppState, AppResult, AppError};
use crate::models::{AccessLog, DeviceFilter, DevicePage, DeviceRecord, RecordStatus};

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Similar devices returned per review
const SIMILAR_LIMIT: usize = 10;

/// Access log entries shown with a device
const RECENT_ACCESS_LIMIT: i64 = 20;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub merchant_id: Option<Uuid>,
    pub status: Option<i16>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: i16,
}

#[derive(Debug, Serialize)]
pub struct DeviceDetail {
    pub device: DeviceRecord,
    pub recent_access: Vec<AccessLog>,
}

#[derive(Debug, Serialize)]
pub struct SimilarDevice {
    pub id: Uuid,
    pub fingerprint_key: String,
    pub device_code: String,
    pub status: RecordStatus,
    /// Percentage, two decimals
    pub similarity: f64,
}

fn parse_status(value: i16) -> AppResult<RecordStatus> {
    RecordStatus::try_from(value).map_err(|e| AppError::ValidationError(e.to_string()))
}

async fn find_device(state: &AppState, id: Uuid) -> AppResult<DeviceRecord> {
    state.store
        .get_device(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))
}

/// List devices with optional search, merchant and status filters
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Envelope<DevicePage>>> {
    let filter = DeviceFilter {
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        merchant_id: query.merchant_id,
        status: query.status.map(parse_status).transpose()?,
        page: query.page.unwrap_or(1).max(1),
        limit: query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
    };

    let (items, total) = state.store.list_devices(&filter).await?;
    Ok(Envelope::ok("ok", DevicePage {
        items,
        total,
        page: filter.page,
        limit: filter.limit,
    }))
}

/// Get single device with its recent access history
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<DeviceDetail>>> {
    let device = find_device(&state, id).await?;
    let recent_access = state.store.device_access_logs(id, RECENT_ACCESS_LIMIT).await?;
    Ok(Envelope::ok("ok", DeviceDetail { device, recent_access }))
}

/// Set review status (0 disabled, 1 active, 2 suspicious)
pub async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> AppResult<Json<Envelope<DeviceRecord>>> {
    let status = parse_status(request.status)?;
    let device = state.store
        .update_device_status(id, status)
        .await?
        .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

    tracing::info!("Device {} status set to {:?}", device.device_code, status);
    Ok(Envelope::ok("status updated", device))
}

/// Delete device
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<serde_json::Value>>> {
    if !state.store.delete_device(id).await? {
        return Err(AppError::NotFound("Device not found".to_string()));
    }

    tracing::info!("Device {} deleted", id);
    Ok(Envelope::ok("device deleted", json!({ "deleted": true })))
}

/// Devices of the same merchant whose signals resemble this one, best first
pub async fn similar(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Envelope<Vec<SimilarDevice>>>> {
    let device = find_device(&state, id).await?;
    let reference = SignalSet::from_json(&device.components)
        .map_err(|e| AppError::InternalError(format!("stored components unreadable: {}", e)))?;

    let candidates: Vec<(DeviceRecord, SignalSet)> = state.store
        .merchant_devices(device.merchant_id)
        .await?
        .into_iter()
        .filter(|candidate| candidate.id != device.id)
        .filter_map(|candidate| {
            let signals = SignalSet::from_json(&candidate.components).ok()?;
            Some((candidate, signals))
        })
        .collect();

    let scorer = SimilarityScorer::with_threshold(state.config.similarity_threshold);
    let similar = scorer
        .rank(&reference, candidates.iter().map(|(record, signals)| (record, signals)))
        .into_iter()
        .take(SIMILAR_LIMIT)
        .map(|result| SimilarDevice {
            id: result.candidate.id,
            fingerprint_key: result.candidate.fingerprint_key.clone(),
            device_code: result.candidate.device_code.clone(),
            status: result.candidate.status,
            similarity: (result.score * 10_000.0).round() / 100.0,
        })
        .collect();

    Ok(Envelope::ok("ok", similar))
}
