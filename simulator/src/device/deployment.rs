use anyhow::anyhow;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use models::deployment::{
    Deployment, DeploymentLogEntry, DeploymentState, DeploymentStatus, LogLevel,
};
use models::device::DeviceStatus;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::DeviceSimulator;
use super::timing::DownloadPlan;
use crate::backend::BackendError;
use crate::observe::Event;

/// Longest substate the server accepts alongside a failure report.
pub const MAX_SUBSTATE_LEN: usize = 128;

const FALLBACK_ERROR: &str = "Unknown error during update";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure(String),
}

enum StageError {
    Cancelled,
    Failed(anyhow::Error),
}

/// Single weighted draw, made once when a deployment starts.
pub fn decide_outcome(rng: &mut impl Rng, success_rate: f64, errors: &[String]) -> Outcome {
    if rng.gen_bool(success_rate.clamp(0.0, 1.0)) {
        return Outcome::Success;
    }
    let message = errors
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| FALLBACK_ERROR.to_string());
    Outcome::Failure(message)
}

pub fn substate(message: &str) -> String {
    message.chars().take(MAX_SUBSTATE_LEN).collect()
}

/// The log uploaded after a failed deployment, oldest entry first.
pub fn failure_log(artifact: &str, error: &str, at: DateTime<Utc>) -> Vec<DeploymentLogEntry> {
    let entry = |level, message: String| DeploymentLogEntry {
        timestamp: at,
        level,
        message,
    };
    vec![
        entry(LogLevel::Info, format!("Starting update to {artifact}")),
        entry(LogLevel::Info, "Artifact downloaded".to_string()),
        entry(
            LogLevel::Warning,
            "Potential issue detected during installation".to_string(),
        ),
        entry(LogLevel::Error, format!("Update failed: {error}")),
        entry(LogLevel::Info, "Initiating rollback to previous version".to_string()),
        entry(LogLevel::Info, "Rollback completed, system stable".to_string()),
    ]
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "deployment stage panicked".to_string()
    }
}

impl DeviceSimulator {
    #[tracing::instrument(
        skip_all,
        fields(deployment = %deployment.id, artifact = %deployment.artifact_name)
    )]
    pub(super) async fn process_deployment(&mut self, deployment: Deployment) {
        match self
            .store
            .get_deployment_status(&self.device.device_id, &deployment.id)
            .await
        {
            Ok(Some(finished)) if finished.status.is_terminal() => {
                self.resend_result(&finished).await;
                return;
            }
            Ok(_) => {}
            Err(err) => {
                self.metrics.record(Event::PersistenceFailure);
                warn!("Cannot read deployment history, skipping until next poll: {err:#}");
                return;
            }
        }

        info!("Deployment started");
        self.metrics.record(Event::DeploymentStarted);

        let outcome = decide_outcome(
            &mut self.rng,
            self.settings.success_rate,
            &self.settings.error_messages,
        );
        debug!("Outcome decided: {outcome:?}");

        let mut record = DeploymentStatus::new(&self.device.device_id, &deployment);
        self.current_deployment = Some(deployment.clone());
        self.device.status = DeviceStatus::Updating;
        self.persist().await;

        let stages = AssertUnwindSafe(self.run_stages(&deployment, &mut record))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(StageError::Failed(anyhow!(panic_message(panic)))));

        match (stages, outcome) {
            (Ok(()), Outcome::Success) => self.complete_success(&deployment, &mut record).await,
            (Ok(()), Outcome::Failure(message)) => {
                self.complete_failure(&deployment, &mut record, &message).await
            }
            (Err(StageError::Failed(err)), _) => {
                let message = format!("{err:#}");
                self.complete_failure(&deployment, &mut record, &message).await
            }
            (Err(StageError::Cancelled), _) => {
                self.metrics.record(Event::DeploymentInterrupted);
                info!("Deployment interrupted while {}", record.status);
            }
        }

        self.current_deployment = None;
        self.device.status = DeviceStatus::Idle;
        self.persist().await;
    }

    /// The server offered a deployment this device already finished, so the
    /// earlier terminal report never reached it. The recorded result is sent
    /// again unchanged.
    async fn resend_result(&mut self, finished: &DeploymentStatus) {
        info!("Deployment already finished as {}, reporting it again", finished.status);
        let substate = match finished.status {
            DeploymentState::Failure => Some(substate(
                finished.error_message.as_deref().unwrap_or(FALLBACK_ERROR),
            )),
            _ => None,
        };
        self.report_state(&finished.deployment_id, finished.status, substate.as_deref())
            .await;
    }

    async fn run_stages(
        &mut self,
        deployment: &Deployment,
        record: &mut DeploymentStatus,
    ) -> Result<(), StageError> {
        self.enter_stage(&deployment.id, record, DeploymentState::Downloading)
            .await;
        let transfer = self
            .profile
            .transfer_duration(deployment.artifact_size, &mut self.rng);
        let plan = DownloadPlan::new(transfer, self.settings.timing.min_download);
        info!(
            "Downloading {} bytes in {:.1}s",
            deployment.artifact_size,
            plan.total.as_secs_f64()
        );
        for (progress, wait) in plan.steps() {
            self.stage_wait(wait).await?;
            record.set_progress(progress);
            self.persist_record(record).await;
        }

        self.enter_stage(&deployment.id, record, DeploymentState::Installing)
            .await;
        let install = self.settings.timing.install_duration(&mut self.rng);
        self.stage_wait(install).await?;

        self.enter_stage(&deployment.id, record, DeploymentState::Rebooting)
            .await;
        let reboot = self.settings.timing.reboot_duration(&mut self.rng);
        self.stage_wait(reboot).await?;

        Ok(())
    }

    /// Reports the stage first, then records it locally.
    async fn enter_stage(
        &mut self,
        deployment_id: &str,
        record: &mut DeploymentStatus,
        state: DeploymentState,
    ) {
        info!("Entering {state}");
        self.report_state(deployment_id, state, None).await;
        record.enter(state);
        self.persist_record(record).await;
    }

    async fn stage_wait(&self, duration: Duration) -> Result<(), StageError> {
        if self.pause(duration).await {
            Ok(())
        } else {
            Err(StageError::Cancelled)
        }
    }

    async fn report_state(
        &mut self,
        deployment_id: &str,
        state: DeploymentState,
        substate: Option<&str>,
    ) {
        let Some(token) = self.device.auth_token.clone() else {
            debug!("No auth token, {state} not reported");
            return;
        };

        match self
            .backend
            .report_deployment_state(&token, deployment_id, state, substate)
            .await
        {
            Ok(()) => {}
            Err(BackendError::Unauthorized) => self.invalidate_token().await,
            Err(err) => warn!("Failed to report {state}: {err}"),
        }
    }

    async fn complete_success(&mut self, deployment: &Deployment, record: &mut DeploymentStatus) {
        self.report_state(&deployment.id, DeploymentState::Success, None)
            .await;
        record.succeed();
        self.persist_record(record).await;

        let artifact = json!(deployment.artifact_name);
        self.device
            .inventory
            .insert("artifact_name".into(), artifact.clone());
        self.device
            .inventory
            .insert("rootfs-image.version".into(), artifact);
        self.persist().await;

        if self.send_inventory().await.is_err() {
            self.invalidate_token().await;
        }

        self.metrics.record(Event::DeploymentSucceeded);
        info!("Deployment succeeded, running {}", deployment.artifact_name);
    }

    async fn complete_failure(
        &mut self,
        deployment: &Deployment,
        record: &mut DeploymentStatus,
        message: &str,
    ) {
        let message = if message.trim().is_empty() {
            FALLBACK_ERROR
        } else {
            message
        };
        let substate = substate(message);
        self.report_state(&deployment.id, DeploymentState::Failure, Some(&substate))
            .await;
        record.fail(message);
        self.persist_record(record).await;

        if let Some(token) = self.device.auth_token.clone() {
            let entries = failure_log(&deployment.artifact_name, message, Utc::now());
            match self
                .backend
                .upload_deployment_logs(&token, &deployment.id, &entries)
                .await
            {
                Ok(()) => debug!("Uploaded {} log entries", entries.len()),
                Err(BackendError::Unauthorized) => self.invalidate_token().await,
                Err(err) => warn!("Failed to upload deployment log: {err}"),
            }
        }

        self.metrics.record(Event::DeploymentFailed);
        warn!("Deployment failed: {message}");
    }
}
