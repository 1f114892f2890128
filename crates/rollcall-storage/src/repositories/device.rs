#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::DeviceRecord;
use crate::models::device::DeviceRow;
use chrono::{DateTime, Utc};
use rollcall_core::DeviceId;
use sqlx::SqlitePool;

/// Repository for the device registry.
pub trait DeviceRepository: Send + Sync {
    /// Insert a device or replace its connection data and metadata.
    async fn upsert(&self, device: &DeviceRecord) -> StorageResult<()>;

    async fn find(&self, id: &DeviceId) -> StorageResult<Option<DeviceRecord>>;

    /// All enabled devices, ordered by id.
    async fn list_enabled(&self) -> StorageResult<Vec<DeviceRecord>>;

    /// Returns `false` if the device does not exist.
    async fn set_enabled(&self, id: &DeviceId, enabled: bool, now: DateTime<Utc>) -> StorageResult<bool>;

    /// Returns `false` if the device does not exist.
    async fn delete(&self, id: &DeviceId) -> StorageResult<bool>;
}

/// SQLite implementation of DeviceRepository
#[derive(Debug, Clone)]
pub struct SqliteDeviceRepository {
    pool: SqlitePool,
}

impl SqliteDeviceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const DEVICE_COLUMNS: &str =
    "id, name, address, username, password, auth_mode, enabled, created_at, updated_at";

impl DeviceRepository for SqliteDeviceRepository {
    async fn upsert(&self, device: &DeviceRecord) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO devices (
                id, name, address, username, password,
                auth_mode, enabled, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                name = excluded.name,
                address = excluded.address,
                username = excluded.username,
                password = excluded.password,
                auth_mode = excluded.auth_mode,
                enabled = excluded.enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(device.id.as_str())
        .bind(&device.name)
        .bind(&device.address)
        .bind(&device.credentials.username)
        .bind(&device.credentials.password)
        .bind(device.auth_mode.as_str())
        .bind(device.enabled)
        .bind(device.created_at)
        .bind(device.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: &DeviceId) -> StorageResult<Option<DeviceRecord>> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?"
        ))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DeviceRecord::try_from).transpose()
    }

    async fn list_enabled(&self) -> StorageResult<Vec<DeviceRecord>> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE enabled = 1 ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(DeviceRecord::try_from).collect()
    }

    async fn set_enabled(&self, id: &DeviceId, enabled: bool, now: DateTime<Utc>) -> StorageResult<bool> {
        let result = sqlx::query("UPDATE devices SET enabled = ?, updated_at = ? WHERE id = ?")
            .bind(enabled)
            .bind(now)
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &DeviceId) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
