//! SQLite backed store for devices and their deployment history.

use anyhow::{Context, Result};
use chrono::Utc;
use models::deployment::DeploymentStatus;
use models::device::Device;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::types::Json;
use sqlx::{Pool, Sqlite};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

mod rows;

use rows::{DeploymentRow, DeviceRow};

const DEVICE_COLUMNS: &str = "device_id, identity, private_key, public_key, profile, status, \
     auth_token, inventory, created_at, updated_at, last_poll";

const DEPLOYMENT_COLUMNS: &str = "device_id, deployment_id, artifact_name, status, progress, \
     started_at, completed_at, error_message";

/// Shared handle to the device database. Clones share one pool.
#[derive(Clone, Debug)]
pub struct DeviceStore {
    pool: Pool<Sqlite>,
}

impl DeviceStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // Every device unit writes through this pool; one connection keeps
        // SQLite from reporting "database is locked" under load.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", path.display()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to apply database migrations")?;

        info!("Device store opened at {}", path.display());
        Ok(Self { pool })
    }

    /// Inserts or fully replaces a device row.
    pub async fn save_device(&self, device: &Device) -> Result<()> {
        sqlx::query(
            "INSERT INTO devices (device_id, identity, private_key, public_key, profile, status, \
                                  auth_token, inventory, created_at, updated_at, last_poll)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (device_id) DO UPDATE SET
                 identity = excluded.identity,
                 private_key = excluded.private_key,
                 public_key = excluded.public_key,
                 profile = excluded.profile,
                 status = excluded.status,
                 auth_token = excluded.auth_token,
                 inventory = excluded.inventory,
                 updated_at = excluded.updated_at,
                 last_poll = excluded.last_poll",
        )
        .bind(&device.device_id)
        .bind(Json(&device.identity))
        .bind(&device.keys.private_key)
        .bind(&device.keys.public_key)
        .bind(&device.profile)
        .bind(device.status)
        .bind(&device.auth_token)
        .bind(Json(&device.inventory))
        .bind(device.created_at)
        .bind(Utc::now())
        .bind(device.last_poll)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to save device {}", device.device_id))?;

        debug!("Saved device {}", device.device_id);
        Ok(())
    }

    pub async fn get_device(&self, device_id: &str) -> Result<Option<Device>> {
        let row = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE device_id = ?"
        ))
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load device {device_id}"))?;

        Ok(row.map(Device::from))
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY device_id"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list devices")?;

        Ok(rows.into_iter().map(Device::from).collect())
    }

    pub async fn list_devices_by_profile(&self, profile: &str) -> Result<Vec<Device>> {
        let rows = sqlx::query_as::<_, DeviceRow>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE profile = ? ORDER BY device_id"
        ))
        .bind(profile)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to list devices for profile {profile}"))?;

        Ok(rows.into_iter().map(Device::from).collect())
    }

    pub async fn count_devices(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM devices")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count devices")?;
        Ok(count)
    }

    pub async fn count_by_profile(&self) -> Result<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT profile, COUNT(*) FROM devices GROUP BY profile")
                .fetch_all(&self.pool)
                .await
                .context("Failed to count devices by profile")?;
        Ok(rows.into_iter().collect())
    }

    /// Operator action. Removes the device and its deployment history.
    pub async fn delete_device(&self, device_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = ?")
            .bind(device_id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete device {device_id}"))?;
        Ok(result.rows_affected() > 0)
    }

    /// Inserts or fully replaces a deployment record.
    pub async fn save_deployment_status(&self, status: &DeploymentStatus) -> Result<()> {
        sqlx::query(
            "INSERT INTO deployment_status (device_id, deployment_id, artifact_name, status, progress, \
                                            started_at, completed_at, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (device_id, deployment_id) DO UPDATE SET
                 artifact_name = excluded.artifact_name,
                 status = excluded.status,
                 progress = excluded.progress,
                 started_at = excluded.started_at,
                 completed_at = excluded.completed_at,
                 error_message = excluded.error_message",
        )
        .bind(&status.device_id)
        .bind(&status.deployment_id)
        .bind(&status.artifact_name)
        .bind(status.status)
        .bind(i64::from(status.progress))
        .bind(status.started_at)
        .bind(status.completed_at)
        .bind(&status.error_message)
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to save deployment {} for {}",
                status.deployment_id, status.device_id
            )
        })?;
        Ok(())
    }

    pub async fn get_deployment_status(
        &self,
        device_id: &str,
        deployment_id: &str,
    ) -> Result<Option<DeploymentStatus>> {
        let row = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployment_status
             WHERE device_id = ? AND deployment_id = ?"
        ))
        .bind(device_id)
        .bind(deployment_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load deployment status")?;

        Ok(row.map(DeploymentStatus::from))
    }

    /// All deployments recorded for one device, oldest first.
    pub async fn deployment_history(&self, device_id: &str) -> Result<Vec<DeploymentStatus>> {
        let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployment_status
             WHERE device_id = ? ORDER BY started_at"
        ))
        .bind(device_id)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to load deployment history for {device_id}"))?;

        Ok(rows.into_iter().map(DeploymentStatus::from).collect())
    }

    /// Deployments that have not reached success or failure.
    pub async fn active_deployments(&self) -> Result<Vec<DeploymentStatus>> {
        let rows = sqlx::query_as::<_, DeploymentRow>(&format!(
            "SELECT {DEPLOYMENT_COLUMNS} FROM deployment_status
             WHERE status NOT IN ('success', 'failure') ORDER BY started_at"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active deployments")?;

        Ok(rows.into_iter().map(DeploymentStatus::from).collect())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Device store closed");
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
