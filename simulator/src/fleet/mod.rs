//! Reconciles the configured fleet against the store and runs one device
//! unit per device until shutdown.

use anyhow::{Context, Result};
use models::device::Device;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::backend::Backend;
use crate::config::Config;
use crate::device::{DeviceSimulator, Settings};
use crate::identity;
use crate::observe::{FleetMetrics, MetricsSnapshot};
use crate::profiles::Profile;
use crate::shutdown::ShutdownSignals;
use crate::store::DeviceStore;

pub struct Fleet {
    config: Config,
    settings: Arc<Settings>,
    store: DeviceStore,
    backend: Arc<dyn Backend>,
    shutdown: ShutdownSignals,
    metrics: FleetMetrics,
    devices: Vec<(Device, Arc<Profile>)>,
    units: JoinSet<()>,
    stopped: bool,
}

impl Fleet {
    pub fn new(
        config: Config,
        store: DeviceStore,
        backend: Arc<dyn Backend>,
        shutdown: ShutdownSignals,
    ) -> Self {
        let settings = Arc::new(Settings::from_config(&config));
        Self {
            config,
            settings,
            store,
            backend,
            shutdown,
            metrics: FleetMetrics::new(),
            devices: Vec::new(),
            units: JoinSet::new(),
            stopped: false,
        }
    }

    /// Devices that will be started by [`Fleet::start`].
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().map(|(device, _)| device)
    }

    pub fn running_units(&self) -> usize {
        self.units.len()
    }

    /// Creates whatever each enabled profile is short of its target count.
    /// Returns the number of devices created. Any store failure aborts.
    pub async fn initialize(&mut self) -> Result<usize> {
        self.devices.clear();
        let mut rng = StdRng::from_entropy();
        let mut created_total = 0;

        let profiles: Vec<Profile> = self
            .config
            .enabled_profiles()
            .map(|(name, config)| Profile::new(name, config.clone()))
            .collect();

        for profile in profiles {
            let profile = Arc::new(profile);
            let existing = self
                .store
                .list_devices_by_profile(profile.name())
                .await
                .with_context(|| format!("Failed to load devices for {}", profile.name()))?;

            let target = profile.target_count();
            let shortfall = target.saturating_sub(existing.len());
            info!(
                "Profile {} ({}): {} existing, target {}, creating {}",
                profile.name(),
                profile.kind(),
                existing.len(),
                target,
                shortfall
            );
            let advisory = profile.success_probability();
            if advisory != self.config.simulator.success_rate {
                debug!(
                    "Profile {} suggests success probability {:.2}, global rate {:.2} applies",
                    profile.name(),
                    advisory,
                    self.config.simulator.success_rate
                );
            }

            let taken: HashSet<String> = existing.iter().map(|d| d.device_id.clone()).collect();
            let mut created = Vec::with_capacity(shortfall);
            let mut index = 0;
            while created.len() < shortfall {
                let device_id = profile.device_id(index);
                if !taken.contains(&device_id) {
                    let device = create_device(&profile, index, device_id, &mut rng)?;
                    self.store.save_device(&device).await?;
                    created.push(device);
                }
                index += 1;
            }

            created_total += created.len();
            self.devices.extend(
                existing
                    .into_iter()
                    .chain(created)
                    .map(|device| (device, profile.clone())),
            );
        }

        info!(
            "Fleet initialized: {} devices, {} new",
            self.devices.len(),
            created_total
        );
        Ok(created_total)
    }

    /// Spawns one unit per device, then waits for shutdown.
    pub async fn start(&mut self) {
        for (device, profile) in self.devices.drain(..) {
            let span = info_span!(
                "device",
                device_id = %device.device_id,
                profile = %profile.name()
            );
            let simulator = DeviceSimulator::new(
                device,
                profile,
                self.settings.clone(),
                self.store.clone(),
                self.backend.clone(),
                self.shutdown.child(),
                self.metrics.clone(),
            );
            self.units.spawn(simulator.run().instrument(span));
        }
        info!("Started {} device simulators", self.units.len());

        let mut report = time::interval(self.config.report_interval());
        report.tick().await;
        loop {
            tokio::select! {
                _ = self.shutdown.token.cancelled() => break,
                _ = report.tick() => info!("Fleet status: {}", self.metrics.snapshot()),
            }
        }
    }

    /// Cancels every unit, waits for them within the grace period, aborts
    /// the rest and closes the store. Safe to call more than once.
    pub async fn stop(&mut self) -> MetricsSnapshot {
        if self.stopped {
            return self.metrics.snapshot();
        }
        self.stopped = true;

        info!("Stopping {} device simulators", self.units.len());
        self.shutdown.token.cancel();

        let grace = self.config.shutdown_grace();
        if !drain(&mut self.units, grace).await {
            warn!(
                "{} device simulators still running after {:?}, aborting them",
                self.units.len(),
                grace
            );
            self.units.shutdown().await;
        }

        self.store.close().await;

        let snapshot = self.metrics.snapshot();
        info!("Fleet stopped: {snapshot}");
        snapshot
    }
}

fn create_device(
    profile: &Profile,
    index: usize,
    device_id: String,
    rng: &mut StdRng,
) -> Result<Device> {
    let identity = profile.identity(index, rng);
    let keys = identity::generate_keypair()
        .with_context(|| format!("Failed to generate keys for {device_id}"))?;
    let inventory = profile.static_inventory(&device_id, rng);
    Ok(Device::new(
        device_id,
        profile.name().to_string(),
        identity,
        keys,
        inventory,
    ))
}

/// Returns true when every unit finished within `grace`.
async fn drain(units: &mut JoinSet<()>, grace: Duration) -> bool {
    let joined = time::timeout(grace, async {
        while let Some(result) = units.join_next().await {
            if let Err(err) = result {
                if err.is_panic() {
                    error!("Device simulator panicked: {err}");
                }
            }
        }
    })
    .await;
    joined.is_ok()
}
