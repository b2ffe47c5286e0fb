//! Database module - PostgreSQL connection and schema

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Apply the schema (idempotent)
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA_SQL).execute(pool).await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

const SCHEMA_SQL: &str = r#"
-- Merchants (tenants on whose behalf fingerprints are collected)
CREATE TABLE IF NOT EXISTS merchants (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    merchant_key VARCHAR(64) NOT NULL UNIQUE,
    name VARCHAR(255) NOT NULL,
    api_secret VARCHAR(255),
    is_active BOOLEAN NOT NULL DEFAULT true,
    expires_at TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Device records, one per (merchant, fingerprint)
CREATE TABLE IF NOT EXISTS device_fingerprints (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    merchant_id UUID NOT NULL REFERENCES merchants(id) ON DELETE CASCADE,
    fingerprint_key VARCHAR(64) NOT NULL,
    device_code VARCHAR(64) NOT NULL UNIQUE,
    components JSONB NOT NULL DEFAULT '{}'::jsonb,
    device_status JSONB,
    user_agent TEXT,
    ip_address VARCHAR(45),
    status SMALLINT NOT NULL DEFAULT 1,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    UNIQUE (merchant_id, fingerprint_key)
);

-- Report/verify audit trail
CREATE TABLE IF NOT EXISTS device_access_logs (
    id BIGSERIAL PRIMARY KEY,
    merchant_id UUID NOT NULL REFERENCES merchants(id) ON DELETE CASCADE,
    device_id UUID REFERENCES device_fingerprints(id) ON DELETE SET NULL,
    fingerprint_key VARCHAR(64) NOT NULL,
    action VARCHAR(32) NOT NULL,
    ip_address VARCHAR(45),
    user_agent TEXT,
    request_data JSONB,
    response_data JSONB,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_devices_merchant ON device_fingerprints(merchant_id);
CREATE INDEX IF NOT EXISTS idx_devices_status ON device_fingerprints(status);
CREATE INDEX IF NOT EXISTS idx_devices_updated ON device_fingerprints(updated_at);
CREATE INDEX IF NOT EXISTS idx_access_logs_device ON device_access_logs(device_id, created_at);
CREATE INDEX IF NOT EXISTS idx_access_logs_merchant ON device_access_logs(merchant_id, created_at);
"#;
