use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};

#[derive(sqlx::Type, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    Downloading,
    Installing,
    Rebooting,
    Success,
    Failure,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Success | DeploymentState::Failure)
    }

    /// Name used on the wire and in the store.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentState::Downloading => "downloading",
            DeploymentState::Installing => "installing",
            DeploymentState::Rebooting => "rebooting",
            DeploymentState::Success => "success",
            DeploymentState::Failure => "failure",
        }
    }
}

impl std::fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An update job offered by the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub id: String,
    pub artifact_name: String,
    pub artifact_uri: String,
    pub artifact_size: u64,
}

/// Local record of one deployment on one device.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeploymentStatus {
    pub device_id: String,
    pub deployment_id: String,
    pub artifact_name: String,
    pub status: DeploymentState,
    pub progress: u8,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl DeploymentStatus {
    pub fn new(device_id: &str, deployment: &Deployment) -> Self {
        Self {
            device_id: device_id.to_string(),
            deployment_id: deployment.id.clone(),
            artifact_name: deployment.artifact_name.clone(),
            status: DeploymentState::Downloading,
            progress: 0,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    /// Progress never moves backwards and is capped at 100.
    pub fn set_progress(&mut self, progress: u8) {
        self.progress = self.progress.max(progress.min(100));
    }

    /// Moves to a non-terminal stage. Ignored once the record is terminal.
    pub fn enter(&mut self, state: DeploymentState) {
        if self.status.is_terminal() || state.is_terminal() {
            return;
        }
        self.status = state;
    }

    pub fn succeed(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DeploymentState::Success;
        self.progress = 100;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, message: &str) {
        if self.status.is_terminal() {
            return;
        }
        self.status = DeploymentState::Failure;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.to_string());
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DeploymentLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}
