#![allow(dead_code)]

pub mod assertions;
pub mod backend;

pub use assertions::*;
pub use backend::*;

use fleetsim::config::{Config, ProfileConfig};
use fleetsim::device::{DeviceSimulator, Settings, StageTiming};
use fleetsim::observe::FleetMetrics;
use fleetsim::profiles::Profile;
use fleetsim::shutdown::{ShutdownHandler, ShutdownSignals};
use fleetsim::store::DeviceStore;
use models::device::Device;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const ERRORS: [&str; 3] = ["Disk full", "Checksum mismatch", "Power loss during write"];

/// Store backed by a database file in a fresh temporary directory. Keep the
/// directory alive for as long as the store is used.
pub async fn temp_store() -> (TempDir, DeviceStore) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let store = DeviceStore::open(dir.path().join("devices.db"))
        .await
        .expect("Failed to open store");
    (dir, store)
}

/// Settings with millisecond stages so a whole deployment runs in well under
/// a second.
pub fn fast_settings(success_rate: f64) -> Settings {
    Settings {
        tenant_token: "tenant-token".to_string(),
        poll_interval: Duration::from_millis(50),
        success_rate,
        error_messages: ERRORS.iter().map(|message| message.to_string()).collect(),
        timing: StageTiming {
            min_download: Duration::from_millis(20),
            install: Duration::from_millis(5)..=Duration::from_millis(10),
            reboot: Duration::from_millis(5)..=Duration::from_millis(10),
        },
    }
}

pub fn automotive_profile() -> Arc<Profile> {
    let config = ProfileConfig {
        enabled: true,
        count: 1,
        id_prefix: "VIN".to_string(),
        device_type: Some("tcu-4g-lte".to_string()),
        ..ProfileConfig::default()
    };
    Arc::new(Profile::new("automotive", config))
}

/// A stored automotive device with real keys, as the fleet would create it.
pub async fn provisioned_device(store: &DeviceStore, profile: &Profile) -> Device {
    let mut rng = StdRng::seed_from_u64(7);
    let device_id = profile.device_id(0);
    let device = Device::new(
        device_id.clone(),
        profile.name().to_string(),
        profile.identity(0, &mut rng),
        fleetsim::identity::generate_keypair().expect("Failed to generate keys"),
        profile.static_inventory(&device_id, &mut rng),
    );
    store.save_device(&device).await.expect("Failed to save device");
    device
}

pub struct Harness {
    pub _dir: TempDir,
    pub store: DeviceStore,
    pub backend: Arc<FakeBackend>,
    pub metrics: FleetMetrics,
    pub shutdown: ShutdownSignals,
    pub simulator: DeviceSimulator,
}

impl Harness {
    pub async fn new(success_rate: f64, backend: FakeBackend) -> Self {
        Self::with_settings(fast_settings(success_rate), backend).await
    }

    pub async fn with_settings(settings: Settings, backend: FakeBackend) -> Self {
        let (dir, store) = temp_store().await;
        let backend = Arc::new(backend.with_store(store.clone()));
        let profile = automotive_profile();
        let device = provisioned_device(&store, &profile).await;
        let metrics = FleetMetrics::new();
        let shutdown = ShutdownHandler::new().signals();

        let simulator = DeviceSimulator::new(
            device,
            profile,
            Arc::new(settings),
            store.clone(),
            backend.clone(),
            shutdown.clone(),
            metrics.clone(),
        );

        Self {
            _dir: dir,
            store,
            backend,
            metrics,
            shutdown,
            simulator,
        }
    }

    pub fn device_id(&self) -> String {
        self.simulator.device().device_id.clone()
    }
}

/// A config with only the given profile section enabled. The server is never
/// contacted by the tests that use it.
pub fn fleet_config(database: &std::path::Path, profiles: &str) -> Config {
    let content = format!(
        r#"
error_messages = ["Disk full"]

[server]
url = "http://127.0.0.1:9"
tenant_token = "tenant-token"
poll_interval = 5

[simulator]
database_path = "{}"
shutdown_grace_secs = 1

{profiles}
"#,
        database.display()
    );
    Config::from_toml_str(&content).expect("Invalid test config")
}
