//! One simulated device: authenticate, report inventory, poll for
//! deployments and play them out.

use anyhow::Context;
use chrono::Utc;
use models::deployment::{Deployment, DeploymentStatus};
use models::device::Device;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{debug, info, warn};

use crate::backend::{AuthOutcome, AuthRequest, Backend, BackendError};
use crate::config::Config;
use crate::identity;
use crate::observe::{Event, FleetMetrics};
use crate::profiles::Profile;
use crate::shutdown::ShutdownSignals;
use crate::store::DeviceStore;

mod deployment;
pub mod timing;

pub use deployment::{Outcome, decide_outcome, failure_log, substate};
pub use timing::{DownloadPlan, StageTiming};

/// Fleet-wide knobs every device reads but never changes.
#[derive(Debug, Clone)]
pub struct Settings {
    pub tenant_token: String,
    pub poll_interval: Duration,
    pub success_rate: f64,
    pub error_messages: Vec<String>,
    pub timing: StageTiming,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tenant_token: config.server.tenant_token.clone(),
            poll_interval: config.poll_interval(),
            success_rate: config.simulator.success_rate,
            error_messages: config.error_messages.clone(),
            timing: StageTiming::from(&config.simulator.timing),
        }
    }
}

pub struct DeviceSimulator {
    device: Device,
    profile: Arc<Profile>,
    settings: Arc<Settings>,
    store: DeviceStore,
    backend: Arc<dyn Backend>,
    shutdown: ShutdownSignals,
    metrics: FleetMetrics,
    rng: StdRng,
    current_deployment: Option<Deployment>,
}

impl DeviceSimulator {
    pub fn new(
        device: Device,
        profile: Arc<Profile>,
        settings: Arc<Settings>,
        store: DeviceStore,
        backend: Arc<dyn Backend>,
        shutdown: ShutdownSignals,
        metrics: FleetMetrics,
    ) -> Self {
        Self {
            device,
            profile,
            settings,
            store,
            backend,
            shutdown,
            metrics,
            rng: StdRng::from_entropy(),
            current_deployment: None,
        }
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn current_deployment(&self) -> Option<&Deployment> {
        self.current_deployment.as_ref()
    }

    /// Polls until the shutdown token is cancelled.
    pub async fn run(mut self) {
        info!("Device simulator starting");

        while !self.shutdown.is_shutting_down() {
            self.poll_cycle().await;
            if !self.pause(self.settings.poll_interval).await {
                break;
            }
        }

        info!("Device simulator stopped");
    }

    /// One pass of authenticate, last-poll stamp, inventory and deployment check.
    pub async fn poll_cycle(&mut self) {
        self.metrics.record(Event::Poll);

        if self.device.auth_token.is_none() && !self.authenticate().await {
            return;
        }

        self.device.last_poll = Some(Utc::now());
        self.persist().await;

        if let Err(err) = self.check_in().await {
            match err {
                BackendError::Unauthorized => self.invalidate_token().await,
                err => warn!("Poll failed, retrying next cycle: {err}"),
            }
        }
    }

    async fn check_in(&mut self) -> Result<(), BackendError> {
        self.device.inventory = self
            .profile
            .update_telemetry(&self.device.inventory, &mut self.rng);
        self.send_inventory().await?;

        let Some(token) = self.device.auth_token.clone() else {
            return Ok(());
        };
        if self.shutdown.is_shutting_down() {
            return Ok(());
        }
        let next = self
            .backend
            .next_deployment(&token, self.device.device_type(), self.device.artifact_name())
            .await?;

        match next {
            // Left for the server to offer again after a restart.
            Some(deployment) if self.shutdown.is_shutting_down() => {
                info!("Shutting down, not starting deployment {}", deployment.id)
            }
            Some(deployment) => self.process_deployment(deployment).await,
            None => debug!("No deployment pending"),
        }
        Ok(())
    }

    /// Only `Unauthorized` is returned; other failures are logged here and
    /// retried with the next cycle.
    async fn send_inventory(&self) -> Result<(), BackendError> {
        let Some(token) = self.device.auth_token.as_deref() else {
            return Ok(());
        };

        match self.backend.report_inventory(token, &self.device.inventory).await {
            Ok(()) => {
                debug!("Inventory reported");
                self.persist().await;
                Ok(())
            }
            Err(BackendError::Unauthorized) => Err(BackendError::Unauthorized),
            Err(err) => {
                warn!("Inventory update failed: {err}");
                Ok(())
            }
        }
    }

    fn signed_auth_request(&self) -> anyhow::Result<(AuthRequest, String)> {
        let request = AuthRequest::new(
            &self.device.identity,
            &self.device.keys.public_key,
            &self.settings.tenant_token,
        )
        .context("Failed to encode identity")?;
        let body = request.body().context("Failed to encode auth request")?;
        let signature = identity::sign(&self.device.keys, body.as_bytes())?;
        Ok((request, signature))
    }

    async fn authenticate(&mut self) -> bool {
        let (request, signature) = match self.signed_auth_request() {
            Ok(signed) => signed,
            Err(err) => {
                warn!("Cannot build auth request: {err:#}");
                return false;
            }
        };

        match self.backend.authenticate(&request, &signature).await {
            Ok(AuthOutcome::Granted(token)) => {
                info!("Authenticated");
                self.metrics.record(Event::AuthGranted);
                self.device.auth_token = Some(token);
                self.persist().await;
                true
            }
            Ok(AuthOutcome::Pending) => {
                info!("Authentication pending, device not accepted yet");
                self.metrics.record(Event::AuthPending);
                false
            }
            Ok(AuthOutcome::Rejected(reason)) => {
                warn!("Authentication rejected: {reason}");
                self.metrics.record(Event::AuthRejected);
                false
            }
            Err(err) => {
                warn!("Authentication request failed: {err}");
                false
            }
        }
    }

    async fn invalidate_token(&mut self) {
        warn!("Auth token no longer valid, re-authenticating next poll");
        self.metrics.record(Event::TokenInvalidated);
        self.device.auth_token = None;
        self.persist().await;
    }

    async fn persist(&self) {
        if let Err(err) = self.store.save_device(&self.device).await {
            self.metrics.record(Event::PersistenceFailure);
            warn!("Failed to persist device: {err:#}");
        }
    }

    async fn persist_record(&self, record: &DeploymentStatus) {
        if let Err(err) = self.store.save_deployment_status(record).await {
            self.metrics.record(Event::PersistenceFailure);
            warn!("Failed to persist deployment status: {err:#}");
        }
    }

    /// Sleeps unless shutdown arrives first. Returns false on shutdown.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.token.cancelled() => false,
            _ = time::sleep(duration) => true,
        }
    }
}
