use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

/// Identity attributes sent to the backend when a device authenticates.
pub type Identity = BTreeMap<String, String>;

/// Inventory snapshot. Static profile fields and telemetry share one map.
pub type Inventory = serde_json::Map<String, serde_json::Value>;

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Idle,
    Updating,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Idle => write!(f, "idle"),
            DeviceStatus::Updating => write!(f, "updating"),
        }
    }
}

/// PEM encoded key pair. Opaque to everything but the signing code.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    pub private_key: String,
    pub public_key: String,
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Device {
    pub device_id: String,
    pub identity: Identity,
    pub keys: KeyMaterial,
    pub profile: String,
    pub status: DeviceStatus,
    /// Bearer token handed out by the backend. `None` means the next poll
    /// has to authenticate before anything else.
    pub auth_token: Option<String>,
    pub inventory: Inventory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_poll: Option<DateTime<Utc>>,
}

impl Device {
    pub fn new(
        device_id: String,
        profile: String,
        identity: Identity,
        keys: KeyMaterial,
        inventory: Inventory,
    ) -> Self {
        let now = Utc::now();
        Self {
            device_id,
            identity,
            keys,
            profile,
            status: DeviceStatus::Idle,
            auth_token: None,
            inventory,
            created_at: now,
            updated_at: now,
            last_poll: None,
        }
    }

    /// Reads a string attribute out of the inventory.
    pub fn inventory_str(&self, name: &str) -> Option<&str> {
        self.inventory.get(name).and_then(|value| value.as_str())
    }

    pub fn device_type(&self) -> &str {
        self.inventory_str("device_type").unwrap_or("unknown")
    }

    pub fn artifact_name(&self) -> &str {
        self.inventory_str("artifact_name").unwrap_or("unknown")
    }
}
