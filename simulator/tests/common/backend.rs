use async_trait::async_trait;
use fleetsim::backend::{AuthOutcome, AuthRequest, Backend, BackendError};
use fleetsim::store::DeviceStore;
use models::deployment::{Deployment, DeploymentLogEntry, DeploymentState, DeploymentStatus};
use models::device::Inventory;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;

/// One request as seen by [`FakeBackend`], in arrival order.
#[derive(Debug, Clone)]
pub enum Call {
    Authenticate {
        id_data: String,
    },
    ReportInventory {
        token: String,
        inventory: Inventory,
    },
    NextDeployment {
        device_type: String,
        artifact_name: String,
    },
    ReportState {
        deployment_id: String,
        state: DeploymentState,
        substate: Option<String>,
        /// What the store held for this deployment when the report arrived.
        persisted: Option<DeploymentStatus>,
    },
    UploadLogs {
        deployment_id: String,
        entries: Vec<DeploymentLogEntry>,
    },
}

/// A request the fake can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Inventory,
    NextDeployment,
    ReportState(DeploymentState),
}

/// What happens to a scripted request instead of the normal answer.
#[derive(Debug, Clone)]
pub enum Fault {
    /// 401, the token is no longer valid.
    Unauthorized,
    /// The request never reached the server.
    Unreachable,
    Panic(&'static str),
    /// Shutdown arrives while the request is in flight. The request itself
    /// succeeds.
    Cancel(CancellationToken),
}

/// Scripted in-memory server. Every device is granted a fresh token unless
/// auth outcomes are queued, and no deployment is offered unless one is
/// queued.
#[derive(Default)]
pub struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    auth_outcomes: Mutex<VecDeque<AuthOutcome>>,
    deployments: Mutex<VecDeque<Deployment>>,
    faults: Mutex<Vec<(Endpoint, Fault)>>,
    tokens_issued: AtomicUsize,
    stall_auth: bool,
    store: Option<DeviceStore>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authentication never completes, simulating a hung connection.
    pub fn stalled() -> Self {
        Self {
            stall_auth: true,
            ..Self::default()
        }
    }

    pub fn with_store(mut self, store: DeviceStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_deployment(self, deployment: Deployment) -> Self {
        self.deployments.lock().unwrap().push_back(deployment);
        self
    }

    pub fn with_auth_outcome(self, outcome: AuthOutcome) -> Self {
        self.auth_outcomes.lock().unwrap().push_back(outcome);
        self
    }

    /// The next `times` inventory reports are answered with 401.
    pub fn reject_inventory(&self, times: usize) {
        for _ in 0..times {
            self.fail(Endpoint::Inventory, Fault::Unauthorized);
        }
    }

    /// The next request to `endpoint` hits `fault`. Faults for the same
    /// endpoint are used up in the order they were added.
    pub fn fail(&self, endpoint: Endpoint, fault: Fault) {
        self.faults.lock().unwrap().push((endpoint, fault));
    }

    fn inject(&self, endpoint: Endpoint) -> Result<(), BackendError> {
        let fault = {
            let mut faults = self.faults.lock().unwrap();
            match faults.iter().position(|(scripted, _)| *scripted == endpoint) {
                Some(index) => faults.remove(index).1,
                None => return Ok(()),
            }
        };
        match fault {
            Fault::Unauthorized => Err(BackendError::Unauthorized),
            Fault::Unreachable => Err(unreachable_error()),
            Fault::Panic(message) => panic!("{message}"),
            Fault::Cancel(token) => {
                token.cancel();
                Ok(())
            }
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn reported_states(&self) -> Vec<DeploymentState> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::ReportState { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }

    pub fn uploaded_logs(&self) -> Vec<Vec<DeploymentLogEntry>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadLogs { entries, .. } => Some(entries),
                _ => None,
            })
            .collect()
    }

    pub fn authentications(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Authenticate { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

/// A real transport error, built without touching the network.
fn unreachable_error() -> BackendError {
    let err = reqwest::Client::new()
        .get("not a url")
        .build()
        .expect_err("request with an invalid url was built");
    BackendError::Transport(err)
}

pub fn deployment(id: &str, artifact: &str) -> Deployment {
    Deployment {
        id: id.to_string(),
        artifact_name: artifact.to_string(),
        artifact_uri: format!("https://artifacts.example.com/{artifact}.mender"),
        artifact_size: 0,
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn authenticate(
        &self,
        request: &AuthRequest,
        _signature: &str,
    ) -> Result<AuthOutcome, BackendError> {
        self.record(Call::Authenticate {
            id_data: request.id_data.clone(),
        });
        if self.stall_auth {
            std::future::pending::<()>().await;
        }

        let scripted = self.auth_outcomes.lock().unwrap().pop_front();
        Ok(scripted.unwrap_or_else(|| {
            let issued = self.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
            AuthOutcome::Granted(format!("token-{issued}"))
        }))
    }

    async fn report_inventory(
        &self,
        token: &str,
        inventory: &Inventory,
    ) -> Result<(), BackendError> {
        self.record(Call::ReportInventory {
            token: token.to_string(),
            inventory: inventory.clone(),
        });
        self.inject(Endpoint::Inventory)
    }

    async fn next_deployment(
        &self,
        _token: &str,
        device_type: &str,
        artifact_name: &str,
    ) -> Result<Option<Deployment>, BackendError> {
        self.record(Call::NextDeployment {
            device_type: device_type.to_string(),
            artifact_name: artifact_name.to_string(),
        });
        self.inject(Endpoint::NextDeployment)?;
        Ok(self.deployments.lock().unwrap().pop_front())
    }

    async fn report_deployment_state(
        &self,
        _token: &str,
        deployment_id: &str,
        state: DeploymentState,
        substate: Option<&str>,
    ) -> Result<(), BackendError> {
        let persisted = match &self.store {
            Some(store) => store
                .active_deployments()
                .await
                .unwrap_or_default()
                .into_iter()
                .find(|record| record.deployment_id == deployment_id),
            None => None,
        };
        self.record(Call::ReportState {
            deployment_id: deployment_id.to_string(),
            state,
            substate: substate.map(str::to_string),
            persisted,
        });
        self.inject(Endpoint::ReportState(state))
    }

    async fn upload_deployment_logs(
        &self,
        _token: &str,
        deployment_id: &str,
        entries: &[DeploymentLogEntry],
    ) -> Result<(), BackendError> {
        self.record(Call::UploadLogs {
            deployment_id: deployment_id.to_string(),
            entries: entries.to_vec(),
        });
        Ok(())
    }
}
