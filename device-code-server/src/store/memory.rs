//! In-memory store
//!
//! All state behind one `RwLock`, so an upsert is a single write critical
//! section and cannot race with another report for the same device.

use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::DeviceStore;
use crate::models::{
    AccessLog, CreateMerchant, DeviceFilter, DeviceRecord, Merchant, NewAccessLog,
    NewDeviceReport, RecordStatus, UpsertOutcome,
};
use crate::{AppError, AppResult};

#[derive(Default)]
struct Tables {
    merchants: Vec<Merchant>,
    devices: Vec<DeviceRecord>,
    access_logs: Vec<AccessLog>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable a merchant (admin tooling and tests)
    pub fn set_merchant_active(&self, merchant_key: &str, active: bool) -> bool {
        let mut tables = self.tables.write();
        match tables.merchants.iter_mut().find(|m| m.merchant_key == merchant_key) {
            Some(merchant) => {
                merchant.is_active = active;
                merchant.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    pub fn access_log_count(&self) -> usize {
        self.tables.read().access_logs.len()
    }
}

fn matches_filter(record: &DeviceRecord, filter: &DeviceFilter) -> bool {
    if filter.merchant_id.is_some_and(|id| id != record.merchant_id) {
        return false;
    }
    if filter.status.is_some_and(|status| status != record.status) {
        return false;
    }
    match filter.search.as_deref().filter(|s| !s.is_empty()) {
        Some(search) => {
            let needle = search.to_lowercase();
            record.fingerprint_key.to_lowercase().contains(&needle)
                || record.device_code.to_lowercase().contains(&needle)
                || record
                    .user_agent
                    .as_deref()
                    .is_some_and(|ua| ua.to_lowercase().contains(&needle))
        }
        None => true,
    }
}

#[axum::async_trait]
impl DeviceStore for MemoryStore {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn find_merchant_by_key(&self, merchant_key: &str) -> AppResult<Option<Merchant>> {
        Ok(self
            .tables
            .read()
            .merchants
            .iter()
            .find(|m| m.merchant_key == merchant_key)
            .cloned())
    }

    async fn list_merchants(&self) -> AppResult<Vec<Merchant>> {
        let mut merchants = self.tables.read().merchants.clone();
        merchants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(merchants)
    }

    async fn create_merchant(&self, data: CreateMerchant) -> AppResult<Merchant> {
        let mut tables = self.tables.write();
        if tables.merchants.iter().any(|m| m.merchant_key == data.merchant_key) {
            return Err(AppError::AlreadyExists(format!(
                "merchant key {} already exists",
                data.merchant_key
            )));
        }

        let now = Utc::now();
        let merchant = Merchant {
            id: Uuid::new_v4(),
            merchant_key: data.merchant_key,
            name: data.name,
            api_secret: data.api_secret,
            is_active: true,
            expires_at: data.expires_at,
            created_at: now,
            updated_at: now,
        };
        tables.merchants.push(merchant.clone());
        Ok(merchant)
    }

    async fn find_device(
        &self,
        merchant_id: Uuid,
        fingerprint_key: &str,
    ) -> AppResult<Option<DeviceRecord>> {
        Ok(self
            .tables
            .read()
            .devices
            .iter()
            .find(|d| d.merchant_id == merchant_id && d.fingerprint_key == fingerprint_key)
            .cloned())
    }

    async fn device_code_exists(&self, device_code: &str) -> AppResult<bool> {
        Ok(self
            .tables
            .read()
            .devices
            .iter()
            .any(|d| d.device_code == device_code))
    }

    async fn upsert_device(
        &self,
        report: NewDeviceReport,
        device_code: &str,
    ) -> AppResult<UpsertOutcome> {
        let mut tables = self.tables.write();
        let now = Utc::now();

        if let Some(existing) = tables.devices.iter_mut().find(|d| {
            d.merchant_id == report.merchant_id && d.fingerprint_key == report.fingerprint_key
        }) {
            existing.components = report.components;
            existing.device_status = report.device_status;
            existing.user_agent = report.user_agent;
            existing.ip_address = report.ip_address;
            existing.updated_at = now;
            return Ok(UpsertOutcome {
                record: existing.clone(),
                inserted: false,
            });
        }

        if tables.devices.iter().any(|d| d.device_code == device_code) {
            return Err(AppError::AlreadyExists(format!(
                "device code {} already exists",
                device_code
            )));
        }

        let record = DeviceRecord {
            id: Uuid::new_v4(),
            merchant_id: report.merchant_id,
            fingerprint_key: report.fingerprint_key,
            device_code: device_code.to_string(),
            components: report.components,
            device_status: report.device_status,
            user_agent: report.user_agent,
            ip_address: report.ip_address,
            status: RecordStatus::Active,
            created_at: now,
            updated_at: now,
        };
        tables.devices.push(record.clone());
        Ok(UpsertOutcome {
            record,
            inserted: true,
        })
    }

    async fn get_device(&self, id: Uuid) -> AppResult<Option<DeviceRecord>> {
        Ok(self.tables.read().devices.iter().find(|d| d.id == id).cloned())
    }

    async fn list_devices(&self, filter: &DeviceFilter) -> AppResult<(Vec<DeviceRecord>, i64)> {
        let tables = self.tables.read();
        let mut matching: Vec<&DeviceRecord> = tables
            .devices
            .iter()
            .filter(|d| matches_filter(d, filter))
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(filter.offset().max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn merchant_devices(&self, merchant_id: Uuid) -> AppResult<Vec<DeviceRecord>> {
        Ok(self
            .tables
            .read()
            .devices
            .iter()
            .filter(|d| d.merchant_id == merchant_id)
            .cloned()
            .collect())
    }

    async fn update_device_status(
        &self,
        id: Uuid,
        status: RecordStatus,
    ) -> AppResult<Option<DeviceRecord>> {
        let mut tables = self.tables.write();
        Ok(tables.devices.iter_mut().find(|d| d.id == id).map(|device| {
            device.status = status;
            device.updated_at = Utc::now();
            device.clone()
        }))
    }

    async fn delete_device(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.write();
        let before = tables.devices.len();
        tables.devices.retain(|d| d.id != id);
        let deleted = tables.devices.len() != before;
        if deleted {
            for log in tables.access_logs.iter_mut().filter(|l| l.device_id == Some(id)) {
                log.device_id = None;
            }
        }
        Ok(deleted)
    }

    async fn insert_access_log(&self, entry: NewAccessLog) -> AppResult<()> {
        let mut tables = self.tables.write();
        let id = tables.access_logs.len() as i64 + 1;
        tables.access_logs.push(AccessLog {
            id,
            merchant_id: entry.merchant_id,
            device_id: entry.device_id,
            fingerprint_key: entry.fingerprint_key,
            action: entry.action.as_str().to_string(),
            ip_address: entry.ip_address,
            user_agent: entry.user_agent,
            request_data: entry.request_data,
            response_data: entry.response_data,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn device_access_logs(&self, device_id: Uuid, limit: i64) -> AppResult<Vec<AccessLog>> {
        Ok(self
            .tables
            .read()
            .access_logs
            .iter()
            .rev()
            .filter(|l| l.device_id == Some(device_id))
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
