//! Device code handlers
//!
//! `report` issues (or refreshes) the device record for a fingerprint and
//! returns its durable device code. `verify` checks a fingerprint against the
//! merchant's active devices.

use axum::{
    extract::{ConnectInfo, State},
    http::{header::USER_AGENT, HeaderMap},
    Json,
};
use chrono::{DateTime, Utc};
use fingerprint_core::logic::device_code::SIGNATURE_FIELD;
use fingerprint_core::logic::identity::Fingerprint;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use uuid::Uuid;

use super::{client_ip, Envelope};
use crate::middleware::signature::{merchant_key, resolve_merchant, MerchantContext};
use crate::models::{AccessAction, NewAccessLog, NewDeviceReport, RecordStatus};
use crate::store::DeviceStore;
use crate::{AppError, AppResult, AppState};

/// Fresh codes tried before giving up on a collision streak
const DEVICE_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub fingerprint_key: Option<String>,
    #[serde(default)]
    pub components: Value,
    pub device_status: Option<Value>,
    pub user_agent: Option<String>,
    pub url: Option<String>,
    pub referrer: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReportData {
    pub fingerprint_key: String,
    pub device_code: String,
    pub is_new: bool,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct VerifyData {
    pub valid: bool,
    pub fingerprint_key: String,
    pub device_code: String,
    pub created_at: DateTime<Utc>,
}

/// `DEV_<merchant prefix>_<unix seconds>_<4 digits>`
pub fn device_code_candidate(merchant_id: Uuid, now: DateTime<Utc>) -> String {
    let merchant = merchant_id.simple().to_string();
    let suffix: u16 = rand::thread_rng().gen_range(1000..=9999);
    format!("DEV_{}_{}_{}", &merchant[..8], now.timestamp(), suffix)
}

async fn unique_device_code(store: &dyn DeviceStore, merchant_id: Uuid) -> AppResult<String> {
    for _ in 0..DEVICE_CODE_ATTEMPTS {
        let code = device_code_candidate(merchant_id, Utc::now());
        if !store.device_code_exists(&code).await? {
            return Ok(code);
        }
        tracing::debug!("Device code {} taken, retrying", code);
    }
    Err(AppError::InternalError("could not allocate a unique device code".to_string()))
}

fn required_fingerprint(value: Option<&str>) -> AppResult<String> {
    let key = value
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::ValidationError("missing fingerprint_key".to_string()))?;
    Fingerprint::parse(key)
        .map(|fp| fp.as_str().to_string())
        .ok_or_else(|| AppError::ValidationError("fingerprint_key must be 32 lowercase hex chars".to_string()))
}

fn short(key: &str) -> &str {
    key.get(..8).unwrap_or(key)
}

/// Access logs are best effort: a failed write never fails the request
async fn record_access(store: &dyn DeviceStore, entry: NewAccessLog) {
    let action = entry.action.as_str();
    if let Err(e) = store.insert_access_log(entry).await {
        tracing::warn!("Failed to write {} access log: {}", action, e);
    }
}

/// POST /device-code/report
pub async fn report(
    State(state): State<AppState>,
    MerchantContext { merchant }: MerchantContext,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(mut body): Json<Value>,
) -> AppResult<Json<Envelope<ReportData>>> {
    if let Some(fields) = body.as_object_mut() {
        fields.remove(SIGNATURE_FIELD);
    }
    let request: ReportRequest = serde_json::from_value(body.clone())
        .map_err(|e| AppError::ValidationError(format!("invalid report body: {}", e)))?;

    let fingerprint_key = required_fingerprint(request.fingerprint_key.as_deref())?;
    let components = match request.components {
        Value::Null => Value::Object(Default::default()),
        value @ Value::Object(_) => value,
        _ => return Err(AppError::ValidationError("components must be an object".to_string())),
    };

    let ip_address = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let user_agent = request.user_agent.or_else(|| {
        headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });

    let store = state.store.as_ref();
    let device_code = match store.find_device(merchant.id, &fingerprint_key).await? {
        Some(existing) => existing.device_code,
        None => unique_device_code(store, merchant.id).await?,
    };

    let outcome = store
        .upsert_device(
            NewDeviceReport {
                merchant_id: merchant.id,
                fingerprint_key: fingerprint_key.clone(),
                components,
                device_status: request.device_status,
                user_agent: user_agent.clone(),
                ip_address: ip_address.clone(),
            },
            &device_code,
        )
        .await?;

    let record = outcome.record;
    let (action, message) = if outcome.inserted {
        (AccessAction::CreateDevice, "device created")
    } else {
        (AccessAction::UpdateDevice, "device info updated")
    };
    tracing::info!(
        "{} {} for {} (fingerprint {}...)",
        message,
        record.device_code,
        merchant.merchant_key,
        short(&fingerprint_key)
    );

    let data = ReportData {
        fingerprint_key,
        device_code: record.device_code,
        is_new: outcome.inserted,
        updated_at: record.updated_at,
    };

    record_access(
        store,
        NewAccessLog {
            merchant_id: merchant.id,
            device_id: Some(record.id),
            fingerprint_key: data.fingerprint_key.clone(),
            action,
            ip_address,
            user_agent,
            request_data: Some(body),
            response_data: serde_json::to_value(&data).ok(),
        },
    )
    .await;

    Ok(Envelope::ok(message, data))
}

/// POST /device-code/verify
pub async fn verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Json(body): Json<Value>,
) -> AppResult<Json<Envelope<VerifyData>>> {
    let store = state.store.as_ref();
    let merchant = resolve_merchant(store, merchant_key(&headers, &body)?).await?;
    let fingerprint_key =
        required_fingerprint(body.get("fingerprint_key").and_then(Value::as_str))?;

    let device = store
        .find_device(merchant.id, &fingerprint_key)
        .await?
        .filter(|d| d.status == RecordStatus::Active)
        .ok_or_else(|| AppError::NotFound("device not found or disabled".to_string()))?;

    tracing::debug!(
        "Verified {} for {} (fingerprint {}...)",
        device.device_code,
        merchant.merchant_key,
        short(&fingerprint_key)
    );

    let data = VerifyData {
        valid: true,
        fingerprint_key,
        device_code: device.device_code,
        created_at: device.created_at,
    };

    record_access(
        store,
        NewAccessLog {
            merchant_id: merchant.id,
            device_id: Some(device.id),
            fingerprint_key: data.fingerprint_key.clone(),
            action: AccessAction::VerifyFingerprint,
            ip_address: client_ip(&headers, peer.map(|ConnectInfo(addr)| addr)),
            user_agent: headers
                .get(USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            request_data: Some(body),
            response_data: serde_json::to_value(&data).ok(),
        },
    )
    .await;

    Ok(Envelope::ok("device verified", data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FP_A, FP_B};
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_device_code_format() {
        let merchant_id = Uuid::new_v4();
        let now = Utc::now();
        let code = device_code_candidate(merchant_id, now);

        let parts: Vec<&str> = code.split('_').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "DEV");
        assert_eq!(parts[1], &merchant_id.simple().to_string()[..8]);
        assert_eq!(parts[2], now.timestamp().to_string());
        let suffix: u16 = parts[3].parse().unwrap();
        assert!((1000..=9999).contains(&suffix));
    }

    #[test]
    fn test_required_fingerprint() {
        assert!(required_fingerprint(Some(FP_A)).is_ok());
        assert!(matches!(required_fingerprint(None), Err(AppError::ValidationError(_))));
        assert!(matches!(required_fingerprint(Some("")), Err(AppError::ValidationError(_))));
        assert!(matches!(
            required_fingerprint(Some("NOT-A-FINGERPRINT")),
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_report_creates_then_updates() {
        let app = testing::app().await;

        let (status, first) = app.report(FP_A, json!({"platform": "Win32"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["code"], 200);
        assert_eq!(first["message"], "device created");
        assert_eq!(first["data"]["is_new"], true);
        let code = first["data"]["device_code"].as_str().unwrap().to_string();
        assert!(code.starts_with("DEV_"));

        let (status, second) = app.report(FP_A, json!({"platform": "Win32", "fonts": "x"})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["message"], "device info updated");
        assert_eq!(second["data"]["is_new"], false);
        assert_eq!(second["data"]["device_code"], code.as_str());

        assert_eq!(app.store.access_log_count(), 2);
    }

    #[tokio::test]
    async fn test_report_rejects_bad_signature() {
        let app = testing::app().await;
        let mut body = app.signed_body(FP_A, json!({}));
        body["signature"] = json!("00".repeat(32));

        let (status, response) = app.post("/device-code/report", body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["code"], 401);
        assert_eq!(response["message"], "invalid signature");
    }

    #[tokio::test]
    async fn test_report_rejects_replayed_nonce() {
        let app = testing::app().await;
        let body = app.signed_body(FP_A, json!({}));

        let (status, _) = app.post("/device-code/report", body.clone()).await;
        assert_eq!(status, StatusCode::OK);
        let (status, response) = app.post("/device-code/report", body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["message"], "nonce already used");
    }

    #[tokio::test]
    async fn test_report_rejects_stale_timestamp() {
        let app = testing::app().await;
        let stale = Utc::now().timestamp() - 3600;
        let body = app.signed_body_at(FP_A, json!({}), stale, "stale-nonce");

        let (status, response) = app.post("/device-code/report", body).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["message"], "timestamp outside tolerance");
    }

    #[tokio::test]
    async fn test_report_tolerance_boundary() {
        let app = testing::app().await;
        let tolerance = crate::Config::default().signature_tolerance_secs;
        let now = Utc::now().timestamp();

        // Skew only shrinks for a future timestamp, so the exact edge is stable
        let edge = app.signed_body_at(FP_A, json!({}), now + tolerance, "edge-nonce");
        let (status, _) = app.post("/device-code/report", edge).await;
        assert_eq!(status, StatusCode::OK);

        let past = app.signed_body_at(FP_A, json!({}), now - tolerance - 1, "past-nonce");
        let (status, _) = app.post("/device-code/report", past).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_report_rejects_extreme_timestamp() {
        let app = testing::app().await;

        for (timestamp, nonce) in [(i64::MIN, "min-nonce"), (i64::MAX, "max-nonce"), (-1, "neg-nonce")] {
            let body = app.signed_body_at(FP_A, json!({}), timestamp, nonce);
            let (status, response) = app.post("/device-code/report", body).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(response["message"], "timestamp outside tolerance");
        }
        assert_eq!(app.store.access_log_count(), 0);
    }

    #[tokio::test]
    async fn test_report_merchant_checks() {
        let app = testing::app().await;

        let mut unknown = app.signed_body(FP_A, json!({}));
        unknown["merchantKey"] = json!("mk_unknown");
        let (status, _) = app.post("/device-code/report", unknown).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let mut missing = app.signed_body(FP_A, json!({}));
        missing.as_object_mut().unwrap().remove("merchantKey");
        let (status, _) = app.post("/device-code/report", missing).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        app.store.set_merchant_active(testing::MERCHANT_KEY, false);
        let (status, response) = app.report(FP_A, json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(response["message"], "merchant disabled");
    }

    #[tokio::test]
    async fn test_report_requires_fingerprint() {
        let app = testing::app().await;
        let mut body = app.signed_body(FP_A, json!({}));
        body.as_object_mut().unwrap().remove("fingerprint_key");
        let body = app.resign(body);

        let (status, response) = app.post("/device-code/report", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(response["message"], "missing fingerprint_key");
    }

    #[tokio::test]
    async fn test_unsigned_report_when_not_required() {
        let app = testing::app_with(|config| config.require_signature = false).await;
        let body = json!({
            "merchantKey": testing::MERCHANT_KEY,
            "fingerprint_key": FP_A,
            "components": {"platform": "Linux"},
        });
        let (status, response) = app.post("/device-code/report", body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["data"]["is_new"], true);
    }

    #[tokio::test]
    async fn test_verify_after_report() {
        let app = testing::app().await;
        let (_, reported) = app.report(FP_A, json!({})).await;

        let (status, verified) = app.verify(FP_A).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(verified["data"]["valid"], true);
        assert_eq!(verified["data"]["device_code"], reported["data"]["device_code"]);
        assert_eq!(verified["data"]["fingerprint_key"], FP_A);

        let (status, missing) = app.verify(FP_B).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(missing["code"], 404);
    }

    #[tokio::test]
    async fn test_verify_rejects_inactive_device() {
        let app = testing::app().await;
        app.report(FP_A, json!({})).await;

        let device = app
            .store
            .find_device(app.merchant.id, FP_A)
            .await
            .unwrap()
            .unwrap();
        app.store
            .update_device_status(device.id, RecordStatus::Suspicious)
            .await
            .unwrap();

        let (status, _) = app.verify(FP_A).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_verify_unknown_merchant_is_forbidden() {
        let app = testing::app().await;
        let body = json!({"merchantKey": "mk_unknown", "fingerprint_key": FP_A});
        let (status, _) = app.post("/device-code/verify", body).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
