use async_trait::async_trait;
use models::deployment::{Deployment, DeploymentLogEntry, DeploymentState};
use models::device::Inventory;
use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::schema::{
    AuthRequest, LogUpload, NextDeploymentResponse, StatusReport, inventory_attributes,
};
use super::{AuthOutcome, Backend, BackendError};
use crate::config::ServerConfig;

const SIGNATURE_HEADER: &str = "X-MEN-Signature";
const API_PREFIX: &str = "api/devices/v1/";

/// Device API client. One instance, and one connection pool, is shared by
/// every simulated device.
#[derive(Clone, Debug)]
pub struct HttpBackend {
    base: Url,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: &ServerConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let mut base = Url::parse(&config.url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        Ok(self.base.join(API_PREFIX)?.join(path)?)
    }

    async fn expect_success(response: Response) -> Result<(), BackendError> {
        match response.status() {
            StatusCode::OK | StatusCode::NO_CONTENT => Ok(()),
            StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized),
            status => Err(BackendError::Status(status, body_text(response).await)),
        }
    }
}

async fn body_text(response: Response) -> String {
    response.text().await.unwrap_or_default()
}

#[async_trait]
impl Backend for HttpBackend {
    async fn authenticate(
        &self,
        request: &AuthRequest,
        signature: &str,
    ) -> Result<AuthOutcome, BackendError> {
        let url = self.endpoint("authentication/auth_requests")?;
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .body(request.body()?)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(AuthOutcome::Granted(
                body_text(response).await.trim().to_string(),
            )),
            StatusCode::UNAUTHORIZED => Ok(AuthOutcome::Pending),
            status => Ok(AuthOutcome::Rejected(format!(
                "{status}: {}",
                body_text(response).await
            ))),
        }
    }

    async fn report_inventory(
        &self,
        token: &str,
        inventory: &Inventory,
    ) -> Result<(), BackendError> {
        let url = self.endpoint("inventory/device/attributes")?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(token)
            .json(&inventory_attributes(inventory))
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn next_deployment(
        &self,
        token: &str,
        device_type: &str,
        artifact_name: &str,
    ) -> Result<Option<Deployment>, BackendError> {
        let url = self.endpoint("deployments/device/deployments/next")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(&[("device_type", device_type), ("artifact_name", artifact_name)])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let next: NextDeploymentResponse = response.json().await?;
                debug!("Deployment {} offered", next.id);
                Ok(Some(next.into()))
            }
            StatusCode::NO_CONTENT => Ok(None),
            StatusCode::UNAUTHORIZED => Err(BackendError::Unauthorized),
            status => Err(BackendError::Status(status, body_text(response).await)),
        }
    }

    async fn report_deployment_state(
        &self,
        token: &str,
        deployment_id: &str,
        state: DeploymentState,
        substate: Option<&str>,
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("deployments/device/deployments/{deployment_id}/status"))?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&StatusReport {
                status: state.as_str(),
                substate,
            })
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn upload_deployment_logs(
        &self,
        token: &str,
        deployment_id: &str,
        entries: &[DeploymentLogEntry],
    ) -> Result<(), BackendError> {
        let url = self.endpoint(&format!("deployments/device/deployments/{deployment_id}/log"))?;
        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .json(&LogUpload { messages: entries })
            .send()
            .await?;

        Self::expect_success(response).await
    }
}
