//! Device record model

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;
use chrono::{DateTime, Utc};

/// Review status of a device record, stored and serialized as an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "i16", try_from = "i16")]
pub enum RecordStatus {
    Disabled,
    Active,
    Suspicious,
}

#[derive(Debug, thiserror::Error)]
#[error("invalid device status {0} (expected 0, 1 or 2)")]
pub struct InvalidStatus(pub i16);

impl RecordStatus {
    pub fn as_i16(self) -> i16 {
        match self {
            RecordStatus::Disabled => 0,
            RecordStatus::Active => 1,
            RecordStatus::Suspicious => 2,
        }
    }
}

impl From<RecordStatus> for i16 {
    fn from(status: RecordStatus) -> Self {
        status.as_i16()
    }
}

impl TryFrom<i16> for RecordStatus {
    type Error = InvalidStatus;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RecordStatus::Disabled),
            1 => Ok(RecordStatus::Active),
            2 => Ok(RecordStatus::Suspicious),
            other => Err(InvalidStatus(other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeviceRecord {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub fingerprint_key: String,
    pub device_code: String,
    /// Latest reported signal snapshot
    pub components: Value,
    pub device_status: Option<Value>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    #[sqlx(try_from = "i16")]
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data written by a report
#[derive(Debug, Clone)]
pub struct NewDeviceReport {
    pub merchant_id: Uuid,
    pub fingerprint_key: String,
    pub components: Value,
    pub device_status: Option<Value>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub record: DeviceRecord,
    pub inserted: bool,
}

/// Admin listing filter
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    /// Substring of fingerprint key, device code or user agent
    pub search: Option<String>,
    pub merchant_id: Option<Uuid>,
    pub status: Option<RecordStatus>,
    pub page: i64,
    pub limit: i64,
}

impl DeviceFilter {
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DevicePage {
    pub items: Vec<DeviceRecord>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}
