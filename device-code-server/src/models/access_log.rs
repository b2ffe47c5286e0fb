//! Access log model

use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessAction {
    CreateDevice,
    UpdateDevice,
    VerifyFingerprint,
}

impl AccessAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessAction::CreateDevice => "create_device",
            AccessAction::UpdateDevice => "update_device",
            AccessAction::VerifyFingerprint => "verify_fingerprint",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct AccessLog {
    pub id: i64,
    pub merchant_id: Uuid,
    pub device_id: Option<Uuid>,
    pub fingerprint_key: String,
    pub action: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_data: Option<Value>,
    pub response_data: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAccessLog {
    pub merchant_id: Uuid,
    pub device_id: Option<Uuid>,
    pub fingerprint_key: String,
    pub action: AccessAction,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub request_data: Option<Value>,
    pub response_data: Option<Value>,
}
