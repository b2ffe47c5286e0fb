//! Device store
//!
//! Persistence seam for merchants, device records and access logs. Postgres
//! in deployment, an in-process store when no `DATABASE_URL` is configured
//! and in tests.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use uuid::Uuid;

use crate::models::{
    AccessLog, CreateMerchant, DeviceFilter, DeviceRecord, Merchant, NewAccessLog,
    NewDeviceReport, RecordStatus, UpsertOutcome,
};
use crate::AppResult;

#[axum::async_trait]
pub trait DeviceStore: Send + Sync {
    /// Short backend name for health output
    fn kind(&self) -> &'static str;

    async fn find_merchant_by_key(&self, merchant_key: &str) -> AppResult<Option<Merchant>>;

    async fn list_merchants(&self) -> AppResult<Vec<Merchant>>;

    /// Fails with `AlreadyExists` on a duplicate merchant key
    async fn create_merchant(&self, data: CreateMerchant) -> AppResult<Merchant>;

    async fn find_device(
        &self,
        merchant_id: Uuid,
        fingerprint_key: &str,
    ) -> AppResult<Option<DeviceRecord>>;

    async fn device_code_exists(&self, device_code: &str) -> AppResult<bool>;

    /// Insert a record, or refresh the snapshot of the existing one for the
    /// same (merchant, fingerprint). `device_code` is only used on insert;
    /// an existing record keeps its code and review status.
    async fn upsert_device(
        &self,
        report: NewDeviceReport,
        device_code: &str,
    ) -> AppResult<UpsertOutcome>;

    async fn get_device(&self, id: Uuid) -> AppResult<Option<DeviceRecord>>;

    /// Page of records plus the total count matching the filter
    async fn list_devices(&self, filter: &DeviceFilter) -> AppResult<(Vec<DeviceRecord>, i64)>;

    async fn merchant_devices(&self, merchant_id: Uuid) -> AppResult<Vec<DeviceRecord>>;

    async fn update_device_status(
        &self,
        id: Uuid,
        status: RecordStatus,
    ) -> AppResult<Option<DeviceRecord>>;

    async fn delete_device(&self, id: Uuid) -> AppResult<bool>;

    async fn insert_access_log(&self, entry: NewAccessLog) -> AppResult<()>;

    async fn device_access_logs(&self, device_id: Uuid, limit: i64) -> AppResult<Vec<AccessLog>>;
}
