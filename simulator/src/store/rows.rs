use chrono::{DateTime, Utc};
use models::deployment::{DeploymentState, DeploymentStatus};
use models::device::{Device, DeviceStatus, Identity, Inventory, KeyMaterial};
use sqlx::types::Json;

#[derive(sqlx::FromRow)]
pub(super) struct DeviceRow {
    pub device_id: String,
    pub identity: Json<Identity>,
    pub private_key: String,
    pub public_key: String,
    pub profile: String,
    pub status: DeviceStatus,
    pub auth_token: Option<String>,
    pub inventory: Json<Inventory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_poll: Option<DateTime<Utc>>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            device_id: row.device_id,
            identity: row.identity.0,
            keys: KeyMaterial {
                private_key: row.private_key,
                public_key: row.public_key,
            },
            profile: row.profile,
            status: row.status,
            auth_token: row.auth_token,
            inventory: row.inventory.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_poll: row.last_poll,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct DeploymentRow {
    pub device_id: String,
    pub deployment_id: String,
    pub artifact_name: String,
    pub status: DeploymentState,
    pub progress: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl From<DeploymentRow> for DeploymentStatus {
    fn from(row: DeploymentRow) -> Self {
        DeploymentStatus {
            device_id: row.device_id,
            deployment_id: row.deployment_id,
            artifact_name: row.artifact_name,
            status: row.status,
            progress: row.progress.clamp(0, 100) as u8,
            started_at: row.started_at,
            completed_at: row.completed_at,
            error_message: row.error_message,
        }
    }
}
