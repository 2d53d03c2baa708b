//! Tracing setup and the fleet-wide counters shared by every device unit.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::OpenOptions;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::SimulatorConfig;

pub fn init_tracing(config: &SimulatorConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.to_lowercase()))
        .context("Invalid log level")?;

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(())
}

#[derive(Default)]
struct Counters {
    polls: AtomicU64,
    auth_granted: AtomicU64,
    auth_pending: AtomicU64,
    auth_rejected: AtomicU64,
    token_invalidations: AtomicU64,
    deployments_started: AtomicU64,
    deployments_succeeded: AtomicU64,
    deployments_failed: AtomicU64,
    deployments_interrupted: AtomicU64,
    persistence_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub polls: u64,
    pub auth_granted: u64,
    pub auth_pending: u64,
    pub auth_rejected: u64,
    pub token_invalidations: u64,
    pub deployments_started: u64,
    pub deployments_succeeded: u64,
    pub deployments_failed: u64,
    pub deployments_interrupted: u64,
    pub persistence_failures: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "polls={} auth(granted={} pending={} rejected={} invalidated={}) \
             deployments(started={} succeeded={} failed={} interrupted={}) persistence_failures={}",
            self.polls,
            self.auth_granted,
            self.auth_pending,
            self.auth_rejected,
            self.token_invalidations,
            self.deployments_started,
            self.deployments_succeeded,
            self.deployments_failed,
            self.deployments_interrupted,
            self.persistence_failures,
        )
    }
}

/// Cheap to clone; all clones update the same counters.
#[derive(Clone, Default)]
pub struct FleetMetrics {
    counters: Arc<Counters>,
}

#[derive(Debug, Clone, Copy)]
pub enum Event {
    Poll,
    AuthGranted,
    AuthPending,
    AuthRejected,
    TokenInvalidated,
    DeploymentStarted,
    DeploymentSucceeded,
    DeploymentFailed,
    DeploymentInterrupted,
    PersistenceFailure,
}

impl FleetMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        let counter = match event {
            Event::Poll => &self.counters.polls,
            Event::AuthGranted => &self.counters.auth_granted,
            Event::AuthPending => &self.counters.auth_pending,
            Event::AuthRejected => &self.counters.auth_rejected,
            Event::TokenInvalidated => &self.counters.token_invalidations,
            Event::DeploymentStarted => &self.counters.deployments_started,
            Event::DeploymentSucceeded => &self.counters.deployments_succeeded,
            Event::DeploymentFailed => &self.counters.deployments_failed,
            Event::DeploymentInterrupted => &self.counters.deployments_interrupted,
            Event::PersistenceFailure => &self.counters.persistence_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            polls: c.polls.load(Ordering::Relaxed),
            auth_granted: c.auth_granted.load(Ordering::Relaxed),
            auth_pending: c.auth_pending.load(Ordering::Relaxed),
            auth_rejected: c.auth_rejected.load(Ordering::Relaxed),
            token_invalidations: c.token_invalidations.load(Ordering::Relaxed),
            deployments_started: c.deployments_started.load(Ordering::Relaxed),
            deployments_succeeded: c.deployments_succeeded.load(Ordering::Relaxed),
            deployments_failed: c.deployments_failed.load(Ordering::Relaxed),
            deployments_interrupted: c.deployments_interrupted.load(Ordering::Relaxed),
            persistence_failures: c.persistence_failures.load(Ordering::Relaxed),
        }
    }
}
