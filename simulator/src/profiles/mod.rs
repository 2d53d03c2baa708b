//! Industry profiles. Each variant decides the shape of a device's identity
//! and inventory and how fast its simulated link is.

use chrono::Utc;
use models::device::{Identity, Inventory};
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::{Value, json};
use std::time::Duration;

use crate::config::ProfileConfig;

mod identity;
mod inventory;

pub const SIMULATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProfileKind {
    Automotive,
    SmartBuildings,
    Medical,
    IndustrialIot,
    Retail,
    Generic,
}

impl ProfileKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "automotive" => ProfileKind::Automotive,
            "smart_buildings" => ProfileKind::SmartBuildings,
            "medical" => ProfileKind::Medical,
            "industrial_iot" => ProfileKind::IndustrialIot,
            "retail" => ProfileKind::Retail,
            _ => ProfileKind::Generic,
        }
    }

    pub fn default_device_type(&self) -> &'static str {
        match self {
            ProfileKind::Automotive => "automotive-gateway",
            ProfileKind::SmartBuildings => "building-controller",
            ProfileKind::Medical => "medical-device",
            ProfileKind::IndustrialIot => "industrial-gateway",
            ProfileKind::Retail => "pos-terminal",
            ProfileKind::Generic => "generic-device",
        }
    }

    fn default_success_probability(&self) -> f64 {
        match self {
            ProfileKind::Medical => 0.95,
            ProfileKind::IndustrialIot => 0.75,
            _ => 0.80,
        }
    }
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProfileKind::Automotive => write!(f, "Automotive"),
            ProfileKind::SmartBuildings => write!(f, "SmartBuildings"),
            ProfileKind::Medical => write!(f, "Medical"),
            ProfileKind::IndustrialIot => write!(f, "IndustrialIoT"),
            ProfileKind::Retail => write!(f, "Retail"),
            ProfileKind::Generic => write!(f, "Generic"),
        }
    }
}

/// A configured profile: the variant plus its settings from the config file.
#[derive(Clone, Debug)]
pub struct Profile {
    name: String,
    kind: ProfileKind,
    config: ProfileConfig,
}

impl Profile {
    pub fn new(name: &str, config: ProfileConfig) -> Self {
        Self {
            name: name.to_string(),
            kind: ProfileKind::from_name(name),
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ProfileKind {
        self.kind
    }

    pub fn target_count(&self) -> usize {
        self.config.count
    }

    pub fn device_type(&self) -> &str {
        self.config
            .device_type
            .as_deref()
            .unwrap_or(self.kind.default_device_type())
    }

    /// `<device_type>-<version>`, the artifact every new device starts on.
    pub fn initial_artifact(&self) -> String {
        format!("{}-{}", self.device_type(), self.config.version)
    }

    pub fn device_id(&self, index: usize) -> String {
        format!("{}-{}-{:06}", self.config.id_prefix, self.name, index)
    }

    /// Advisory. The deployment outcome draw uses the global success rate.
    pub fn success_probability(&self) -> f64 {
        self.config
            .success_probability
            .unwrap_or(self.kind.default_success_probability())
    }

    pub fn identity(&self, index: usize, rng: &mut impl Rng) -> Identity {
        let (config, device_type) = (&self.config, self.device_type());
        match self.kind {
            ProfileKind::Automotive => identity::automotive(config, device_type, index, rng),
            ProfileKind::SmartBuildings => identity::smart_buildings(config, device_type, rng),
            ProfileKind::Medical => identity::medical(config, device_type, index, rng),
            ProfileKind::IndustrialIot => identity::industrial(config, device_type, index, rng),
            ProfileKind::Retail => identity::retail(config, device_type, index, rng),
            ProfileKind::Generic => identity::generic(device_type, index, rng),
        }
    }

    pub fn static_inventory(&self, device_id: &str, rng: &mut impl Rng) -> Inventory {
        let mut snapshot = self.config.inventory.clone();
        let artifact = self.initial_artifact();

        snapshot.insert("device_id".into(), json!(device_id));
        snapshot.insert("industry".into(), json!(self.name));
        snapshot.insert("simulator_version".into(), json!(SIMULATOR_VERSION));
        snapshot.insert("device_type".into(), json!(self.device_type()));
        snapshot.insert("artifact_name".into(), json!(artifact));
        snapshot.insert("rootfs-image.version".into(), json!(artifact));
        snapshot.insert("last_boot".into(), json!(Utc::now().to_rfc3339()));

        match self.kind {
            ProfileKind::Automotive => inventory::automotive(&mut snapshot, rng),
            ProfileKind::SmartBuildings => inventory::smart_buildings(&mut snapshot, rng),
            ProfileKind::Medical => inventory::medical(&mut snapshot, rng),
            ProfileKind::IndustrialIot => inventory::industrial(&mut snapshot, rng),
            ProfileKind::Retail => inventory::retail(&mut snapshot, rng),
            ProfileKind::Generic => {}
        }
        snapshot
    }

    /// Returns a copy of `snapshot` with the dynamic fields recomputed.
    pub fn update_telemetry(&self, snapshot: &Inventory, rng: &mut impl Rng) -> Inventory {
        let mut snapshot = snapshot.clone();
        match self.kind {
            ProfileKind::Automotive => inventory::automotive_telemetry(&mut snapshot, rng),
            ProfileKind::SmartBuildings => inventory::smart_buildings_telemetry(&mut snapshot, rng),
            ProfileKind::Medical => inventory::medical_telemetry(&mut snapshot, rng),
            ProfileKind::IndustrialIot => inventory::industrial_telemetry(&mut snapshot, rng),
            ProfileKind::Retail => inventory::retail_telemetry(&mut snapshot, rng),
            ProfileKind::Generic => {}
        }
        snapshot.insert("last_seen".into(), json!(Utc::now().to_rfc3339()));
        snapshot
    }

    /// Simulated time to move `bytes` over this profile's virtual link.
    pub fn transfer_duration(&self, bytes: u64, rng: &mut impl Rng) -> Duration {
        let bytes_per_sec = self.config.bandwidth_kbps.saturating_mul(1024);
        if bytes_per_sec == 0 {
            return Duration::from_secs(1);
        }
        let base = bytes as f64 / bytes_per_sec as f64;
        let jitter = rng.gen_range(0.9..=1.1);
        Duration::from_secs_f64(base * jitter)
    }
}

/// Random locally administered MAC address.
pub(crate) fn random_mac(rng: &mut impl Rng) -> String {
    let mut octets: [u8; 6] = rng.r#gen();
    octets[0] = (octets[0] | 0x02) & 0xFE;
    octets
        .iter()
        .map(|octet| format!("{octet:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// Picks from `pool`, or from `fallback` when the pool is empty.
pub(crate) fn pick(pool: &[String], fallback: &[&str], rng: &mut impl Rng) -> String {
    match pool.choose(rng) {
        Some(choice) => choice.clone(),
        None => fallback.choose(rng).copied().unwrap_or_default().to_string(),
    }
}

/// Picks one element of a list-valued template entry, or `fallback`.
pub(crate) fn pick_value(template: Option<&Value>, fallback: &str, rng: &mut impl Rng) -> Value {
    match template {
        Some(Value::Array(values)) if !values.is_empty() => {
            values.choose(rng).cloned().unwrap_or_else(|| json!(fallback))
        }
        Some(value @ Value::String(_)) => value.clone(),
        _ => json!(fallback),
    }
}
