//! PostgreSQL store

use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::DeviceStore;
use crate::models::{
    AccessLog, CreateMerchant, DeviceFilter, DeviceRecord, Merchant, NewAccessLog,
    NewDeviceReport, RecordStatus, UpsertOutcome,
};
use crate::AppResult;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Upsert result: `xmax = 0` only holds for a freshly inserted tuple
#[derive(FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    record: DeviceRecord,
    inserted: bool,
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &DeviceFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(merchant_id) = filter.merchant_id {
        builder.push(" AND merchant_id = ").push_bind(merchant_id);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_i16());
    }
    if let Some(search) = filter.search.as_deref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        builder
            .push(" AND (fingerprint_key ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR device_code ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR user_agent ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[axum::async_trait]
impl DeviceStore for PgStore {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    async fn find_merchant_by_key(&self, merchant_key: &str) -> AppResult<Option<Merchant>> {
        let merchant = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants WHERE merchant_key = $1")
            .bind(merchant_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(merchant)
    }

    async fn list_merchants(&self) -> AppResult<Vec<Merchant>> {
        let merchants = sqlx::query_as::<_, Merchant>("SELECT * FROM merchants ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(merchants)
    }

    async fn create_merchant(&self, data: CreateMerchant) -> AppResult<Merchant> {
        let merchant = sqlx::query_as::<_, Merchant>(
            r#"
            INSERT INTO merchants (merchant_key, name, api_secret, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#
        )
        .bind(&data.merchant_key)
        .bind(&data.name)
        .bind(&data.api_secret)
        .bind(data.expires_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(merchant)
    }

    async fn find_device(
        &self,
        merchant_id: Uuid,
        fingerprint_key: &str,
    ) -> AppResult<Option<DeviceRecord>> {
        let device = sqlx::query_as::<_, DeviceRecord>(
            "SELECT * FROM device_fingerprints WHERE merchant_id = $1 AND fingerprint_key = $2"
        )
        .bind(merchant_id)
        .bind(fingerprint_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(device)
    }

    async fn device_code_exists(&self, device_code: &str) -> AppResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM device_fingerprints WHERE device_code = $1)"
        )
        .bind(device_code)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn upsert_device(
        &self,
        report: NewDeviceReport,
        device_code: &str,
    ) -> AppResult<UpsertOutcome> {
        let row = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO device_fingerprints
                (merchant_id, fingerprint_key, device_code, components, device_status, user_agent, ip_address)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (merchant_id, fingerprint_key) DO UPDATE SET
                components = EXCLUDED.components,
                device_status = EXCLUDED.device_status,
                user_agent = EXCLUDED.user_agent,
                ip_address = EXCLUDED.ip_address,
                updated_at = NOW()
            RETURNING *, (xmax = 0) AS inserted
            "#
        )
        .bind(report.merchant_id)
        .bind(&report.fingerprint_key)
        .bind(device_code)
        .bind(&report.components)
        .bind(&report.device_status)
        .bind(&report.user_agent)
        .bind(&report.ip_address)
        .fetch_one(&self.pool)
        .await?;

        Ok(UpsertOutcome {
            record: row.record,
            inserted: row.inserted,
        })
    }

    async fn get_device(&self, id: Uuid) -> AppResult<Option<DeviceRecord>> {
        let device = sqlx::query_as::<_, DeviceRecord>("SELECT * FROM device_fingerprints WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    async fn list_devices(&self, filter: &DeviceFilter) -> AppResult<(Vec<DeviceRecord>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM device_fingerprints");
        push_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM device_fingerprints");
        push_filters(&mut select, filter);
        select
            .push(" ORDER BY updated_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset());
        let items = select
            .build_query_as::<DeviceRecord>()
            .fetch_all(&self.pool)
            .await?;

        Ok((items, total))
    }

    async fn merchant_devices(&self, merchant_id: Uuid) -> AppResult<Vec<DeviceRecord>> {
        let devices = sqlx::query_as::<_, DeviceRecord>(
            "SELECT * FROM device_fingerprints WHERE merchant_id = $1"
        )
        .bind(merchant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(devices)
    }

    async fn update_device_status(
        &self,
        id: Uuid,
        status: RecordStatus,
    ) -> AppResult<Option<DeviceRecord>> {
        let device = sqlx::query_as::<_, DeviceRecord>(
            r#"
            UPDATE device_fingerprints
            SET status = $2, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#
        )
        .bind(id)
        .bind(status.as_i16())
        .fetch_optional(&self.pool)
        .await?;
        Ok(device)
    }

    async fn delete_device(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM device_fingerprints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_access_log(&self, entry: NewAccessLog) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO device_access_logs
                (merchant_id, device_id, fingerprint_key, action, ip_address, user_agent, request_data, response_data)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        )
        .bind(entry.merchant_id)
        .bind(entry.device_id)
        .bind(&entry.fingerprint_key)
        .bind(entry.action.as_str())
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(&entry.request_data)
        .bind(&entry.response_data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn device_access_logs(&self, device_id: Uuid, limit: i64) -> AppResult<Vec<AccessLog>> {
        let logs = sqlx::query_as::<_, AccessLog>(
            r#"
            SELECT * FROM device_access_logs
            WHERE device_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(logs)
    }
}
