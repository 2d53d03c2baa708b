//! Device-facing side of the management server.

use async_trait::async_trait;
use models::deployment::{Deployment, DeploymentLogEntry, DeploymentState};
use models::device::Inventory;
use reqwest::StatusCode;
use thiserror::Error;

mod http;
pub mod schema;

pub use http::HttpBackend;
pub use schema::AuthRequest;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("credential rejected by the server")]
    Unauthorized,
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response ({0}): {1}")]
    Status(StatusCode, String),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("failed to encode request: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted(String),
    /// The server has not accepted the device yet.
    Pending,
    Rejected(String),
}

#[async_trait]
pub trait Backend: Send + Sync {
    /// `signature` must be computed over [`AuthRequest::body`].
    async fn authenticate(
        &self,
        request: &AuthRequest,
        signature: &str,
    ) -> Result<AuthOutcome, BackendError>;

    async fn report_inventory(&self, token: &str, inventory: &Inventory)
    -> Result<(), BackendError>;

    async fn next_deployment(
        &self,
        token: &str,
        device_type: &str,
        artifact_name: &str,
    ) -> Result<Option<Deployment>, BackendError>;

    async fn report_deployment_state(
        &self,
        token: &str,
        deployment_id: &str,
        state: DeploymentState,
        substate: Option<&str>,
    ) -> Result<(), BackendError>;

    async fn upload_deployment_logs(
        &self,
        token: &str,
        deployment_id: &str,
        entries: &[DeploymentLogEntry],
    ) -> Result<(), BackendError>;
}
