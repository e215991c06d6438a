//! One commissioning attempt, end to end.
//!
//! [`Commissioner::commission`] walks a device through the states of
//! [`CommissioningStateMachine`]. Every network round trip is a suspension
//! point; the pairing flow's callbacks arrive on a channel registered before
//! pairing starts, so the CSR is never polled for.
//!
//! Failure handling depends on how far the attempt got:
//!
//! - before the NOC is handed back, the pairing session is stopped;
//! - once a NOC was issued, the credential service is told the request failed;
//! - once the device joined the fabric, the fabric is removed from it again
//!   (when rollback is enabled).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use credential_service::{
    ConfirmationMetadata, ConfirmationRequest, CredentialService, STATUS_FAILURE, STATUS_SUCCESS,
};
use fabric_crypto::SecureKeyStore;
use serde_json::json;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::config::CommissionerConfig;
use crate::app::events::CommissioningEventHandler;
use crate::app::state_machine::{CommissioningState, CommissioningStateMachine};
use crate::core::clusters::{basic_information, ROOT_ENDPOINT};
use crate::core::operational_credentials;
use crate::core::{
    has_bridge, AccessControlReconciler, AclOutcome, AttributePath, ClusterClient,
    CommissioningError, DeviceController, DeviceMatterInfo, DeviceSessionHandle, FabricIdentity,
    IssuedNoc, NodeId, OperationalCredentialIssuer, PairingEvent, PairingRequest,
    SessionRegistry, SubscriptionHandle, SubscriptionManager, TlvValue, TopologyDiscoverer,
};

/// Name reported when neither the request nor the device provides one.
pub const DEFAULT_DEVICE_NAME: &str = "Matter device";

/// Where to find the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceTarget {
    Address(SocketAddr),
    /// Resolve the address through commissionable-node discovery.
    Discriminator(u16),
}

#[derive(Clone, Debug)]
pub struct CommissioningRequest {
    pub target: DeviceTarget,
    pub passcode: u32,
    /// User supplied name; read from the device when absent.
    pub device_name: Option<String>,
    pub fabric: Arc<FabricIdentity>,
}

/// Success metadata of a completed attempt.
#[derive(Clone, Debug)]
pub struct CommissioningReport {
    pub attempt_id: Uuid,
    pub node_id: NodeId,
    pub device_name: String,
    pub has_bridge: bool,
    pub endpoints: Vec<DeviceMatterInfo>,
    pub acl: AclOutcome,
    pub request_id: String,
    pub is_rainmaker_node: bool,
    pub completed_at: DateTime<Utc>,
}

struct Attempt {
    id: Uuid,
    machine: CommissioningStateMachine,
}

pub struct Commissioner<C, S, K, H>
where
    C: DeviceController,
    S: CredentialService,
    K: SecureKeyStore,
    H: CommissioningEventHandler,
{
    controller: Arc<C>,
    credentials: Arc<S>,
    keystore: Arc<K>,
    handler: Arc<H>,
    sessions: Arc<SessionRegistry<C>>,
    issuer: OperationalCredentialIssuer<S>,
    client: ClusterClient<C>,
    config: CommissionerConfig,
}

impl<C, S, K, H> Commissioner<C, S, K, H>
where
    C: DeviceController,
    S: CredentialService,
    K: SecureKeyStore,
    H: CommissioningEventHandler,
{
    pub fn new(
        controller: Arc<C>,
        credentials: Arc<S>,
        keystore: Arc<K>,
        handler: Arc<H>,
        config: CommissionerConfig,
    ) -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new(controller.clone())),
            issuer: OperationalCredentialIssuer::new(credentials.clone()),
            client: ClusterClient::new(controller.clone(), config.command_timeout),
            controller,
            credentials,
            keystore,
            handler,
            config,
        }
    }

    /// Session registry shared by every attempt of this commissioner.
    pub fn sessions(&self) -> &Arc<SessionRegistry<C>> {
        &self.sessions
    }

    pub fn cluster_client(&self) -> &ClusterClient<C> {
        &self.client
    }

    pub fn config(&self) -> &CommissionerConfig {
        &self.config
    }

    /// Run one attempt. `cancel` is honoured until fabric join starts; after
    /// that the attempt runs to completion.
    pub async fn commission(
        &self,
        request: CommissioningRequest,
        cancel: CancellationToken,
    ) -> Result<CommissioningReport, CommissioningError> {
        let mut attempt = Attempt {
            id: Uuid::new_v4(),
            machine: CommissioningStateMachine::new(),
        };
        info!(
            "[commission]: Attempt {} started for {:?}",
            attempt.id, request.target
        );

        match self.run(&mut attempt, &request, &cancel).await {
            Ok(report) => {
                self.handler.on_complete(&report).await;
                Ok(report)
            }
            Err(e) => {
                error!(
                    "[commission]: Attempt {} failed in {}: {e}",
                    attempt.id,
                    attempt.machine.current_state()
                );
                if attempt.machine.fail() {
                    self.handler
                        .on_state_changed(attempt.id, CommissioningState::Failed)
                        .await;
                }
                self.handler.on_failed(attempt.id, &e).await;
                Err(e)
            }
        }
    }

    /// Subscribe to attributes of a commissioned node with the configured
    /// report intervals.
    pub async fn subscribe(
        &self,
        node_id: NodeId,
        paths: Vec<AttributePath>,
    ) -> Result<SubscriptionHandle, CommissioningError> {
        let handle = self.sessions.resolve(node_id).await?;
        SubscriptionManager::new(self.controller.clone())
            .subscribe(
                &handle,
                paths,
                self.config.subscription_min_interval,
                self.config.subscription_max_interval,
            )
            .await
    }

    /// Release every session this commissioner holds.
    pub async fn shutdown(&self) {
        self.sessions.invalidate_all().await;
    }

    async fn enter(
        &self,
        attempt: &mut Attempt,
        state: CommissioningState,
    ) -> Result<(), CommissioningError> {
        attempt.machine.transition(state)?;
        self.handler.on_state_changed(attempt.id, state).await;
        Ok(())
    }

    async fn run(
        &self,
        attempt: &mut Attempt,
        request: &CommissioningRequest,
        cancel: &CancellationToken,
    ) -> Result<CommissioningReport, CommissioningError> {
        self.enter(attempt, CommissioningState::Discovering).await?;
        let address = match request.target {
            DeviceTarget::Address(address) => address,
            DeviceTarget::Discriminator(discriminator) => {
                cancellable(cancel, self.controller.discover(discriminator))
                    .await?
                    .map_err(CommissioningError::DiscoveryFailed)?
            }
        };
        debug!("[commission]: Device at {address}");

        if cancel.is_cancelled() {
            return Err(CommissioningError::Cancelled);
        }
        self.enter(attempt, CommissioningState::SecurePairing).await?;
        let keypair = self.keystore.signer(request.fabric.fabric_id())?;
        let (events_tx, mut events) = mpsc::unbounded_channel();
        self.controller
            .start_pairing(
                PairingRequest {
                    address,
                    passcode: request.passcode,
                    fabric: request.fabric.clone(),
                    keypair,
                },
                events_tx,
            )
            .await
            .map_err(CommissioningError::Controller)?;

        let issued = match self
            .pair_and_issue(attempt, &request.fabric, &mut events, cancel)
            .await
        {
            Ok(issued) => issued,
            Err(e) => {
                self.stop_pairing().await;
                return Err(e);
            }
        };

        self.enter(attempt, CommissioningState::FabricJoinPending)
            .await?;
        let node_id = match self.await_fabric_join(&issued, &mut events, cancel).await {
            Ok(node_id) => node_id,
            Err(e) => {
                self.stop_pairing().await;
                self.confirm_failure(&issued.request_id, &e).await;
                return Err(e);
            }
        };

        match self.finish_joined(attempt, request, &issued, node_id).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if self.config.rollback_on_failure {
                    self.rollback(node_id).await;
                }
                self.confirm_failure(&issued.request_id, &e).await;
                Err(e)
            }
        }
    }

    async fn pair_and_issue(
        &self,
        attempt: &mut Attempt,
        fabric: &FabricIdentity,
        events: &mut UnboundedReceiver<PairingEvent>,
        cancel: &CancellationToken,
    ) -> Result<IssuedNoc, CommissioningError> {
        match next_pairing_event(events, cancel).await? {
            PairingEvent::PairingComplete { code: 0 } => {
                info!("[commission]: Secure pairing established");
            }
            PairingEvent::PairingComplete { code } => {
                return Err(CommissioningError::PairingFailed { code });
            }
            other => {
                return Err(CommissioningError::ProtocolViolation(format!(
                    "{other:?} before pairing completed"
                )));
            }
        }

        let (csr, attestation) = match next_pairing_event(events, cancel).await? {
            PairingEvent::CsrReceived { csr, attestation } => (csr, attestation),
            PairingEvent::CommissioningComplete { code, .. } if code != 0 => {
                return Err(CommissioningError::CommissioningFailed { code });
            }
            other => {
                return Err(CommissioningError::ProtocolViolation(format!(
                    "{other:?} while waiting for the CSR"
                )));
            }
        };

        self.enter(attempt, CommissioningState::CredentialIssuance)
            .await?;
        self.issuer
            .on_csr_received(self.controller.as_ref(), fabric, &csr, &attestation, cancel)
            .await
    }

    /// Wait for the fabric join result. Cancellation is noted, not honoured.
    async fn await_fabric_join(
        &self,
        issued: &IssuedNoc,
        events: &mut UnboundedReceiver<PairingEvent>,
        cancel: &CancellationToken,
    ) -> Result<NodeId, CommissioningError> {
        let mut cancel_noticed = false;
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled(), if !cancel_noticed => {
                    cancel_noticed = true;
                    warn!("[commission]: Cancellation requested during fabric join, running to completion");
                    continue;
                }
                event = events.recv() => event,
            };
            match event {
                None => return Err(CommissioningError::ChannelClosed),
                Some(PairingEvent::CommissioningComplete { node_id, code: 0 }) => {
                    if node_id != issued.node_id {
                        warn!(
                            "[commission]: Device reported node {node_id}, credential service assigned {}",
                            issued.node_id
                        );
                    }
                    info!("[commission]: Node {} joined the fabric", issued.node_id);
                    return Ok(issued.node_id);
                }
                Some(PairingEvent::CommissioningComplete { code, .. }) => {
                    return Err(CommissioningError::CommissioningFailed { code });
                }
                Some(PairingEvent::CsrReceived { .. }) => {
                    return Err(CommissioningError::ProtocolViolation(format!(
                        "second CSR after request {} was issued",
                        issued.request_id
                    )));
                }
                Some(other) => {
                    return Err(CommissioningError::ProtocolViolation(format!(
                        "{other:?} during fabric join"
                    )));
                }
            }
        }
    }

    async fn finish_joined(
        &self,
        attempt: &mut Attempt,
        request: &CommissioningRequest,
        issued: &IssuedNoc,
        node_id: NodeId,
    ) -> Result<CommissioningReport, CommissioningError> {
        self.enter(attempt, CommissioningState::TopologyDiscovery)
            .await?;
        // A handle cached from an earlier attempt predates the join.
        self.sessions.invalidate(node_id).await;
        let handle = self.sessions.resolve(node_id).await?;
        let endpoints = TopologyDiscoverer::new(self.client.clone(), self.config.topology_max_depth)
            .discover(&handle)
            .await?;
        let has_bridge = has_bridge(&endpoints);
        let device_name = self.device_name(request, &handle).await;

        self.enter(attempt, CommissioningState::AclReconciliation)
            .await?;
        let acl = AccessControlReconciler::new(self.client.clone(), self.config.require_admin_entry)
            .reconcile(&handle, ROOT_ENDPOINT, request.fabric.operate_category())
            .await?;

        let confirmation = self
            .credentials
            .confirm(ConfirmationRequest {
                request_id: issued.request_id.clone(),
                status: STATUS_SUCCESS.to_string(),
                metadata: ConfirmationMetadata {
                    matter: json!({
                        "nodeId": node_id.to_string(),
                        "fabricId": format!("{:016X}", request.fabric.fabric_id()),
                        "deviceName": &device_name,
                        "hasBridge": has_bridge,
                        "endpoints": &endpoints,
                    }),
                },
            })
            .await?
            .ensure_success()?;

        self.enter(attempt, CommissioningState::Complete).await?;
        info!(
            "[commission]: Node {node_id} ({device_name}) commissioned with {} endpoint(s), bridge: {has_bridge}",
            endpoints.len()
        );
        Ok(CommissioningReport {
            attempt_id: attempt.id,
            node_id,
            device_name,
            has_bridge,
            endpoints,
            acl,
            request_id: issued.request_id.clone(),
            is_rainmaker_node: confirmation.is_rainmaker_node,
            completed_at: Utc::now(),
        })
    }

    async fn device_name(
        &self,
        request: &CommissioningRequest,
        handle: &DeviceSessionHandle,
    ) -> String {
        if let Some(name) = request
            .device_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            return name.to_string();
        }
        let path = AttributePath::new(
            ROOT_ENDPOINT,
            basic_information::CLUSTER_ID,
            basic_information::ATTR_PRODUCT_NAME,
        );
        match self
            .client
            .read_as(handle, path, |value| TlvValue::as_str(value).map(str::to_string))
            .await
        {
            Ok(name) if !name.trim().is_empty() => name,
            Ok(_) => {
                warn!("[device_name]: Node {} has an empty product name", handle.node_id());
                DEFAULT_DEVICE_NAME.to_string()
            }
            Err(e) => {
                warn!("[device_name]: Could not read product name: {e}");
                DEFAULT_DEVICE_NAME.to_string()
            }
        }
    }

    async fn stop_pairing(&self) {
        if let Err(e) = self.controller.stop_pairing().await {
            warn!("[commission]: Could not stop pairing: {e}");
        }
    }

    /// Leave the fabric on the device. Failures are logged only.
    async fn rollback(&self, node_id: NodeId) {
        let removed = async {
            let handle = self.sessions.resolve(node_id).await?;
            let index = operational_credentials::current_fabric_index(&self.client, &handle).await?;
            operational_credentials::remove_fabric(&self.client, &handle, index).await?;
            Ok::<_, CommissioningError>(index)
        }
        .await;
        match removed {
            Ok(index) => {
                info!("[rollback]: Removed fabric index {index} from node {node_id}");
                self.sessions.invalidate(node_id).await;
            }
            Err(e) => warn!("[rollback]: Node {node_id} may still be on the fabric: {e}"),
        }
    }

    async fn confirm_failure(&self, request_id: &str, error: &CommissioningError) {
        let request = ConfirmationRequest {
            request_id: request_id.to_string(),
            status: STATUS_FAILURE.to_string(),
            metadata: ConfirmationMetadata {
                matter: json!({ "error": error.to_string() }),
            },
        };
        match self.credentials.confirm(request).await {
            Ok(response) => debug!(
                "[confirm_failure]: Request {request_id} reported as failed ({})",
                response.status
            ),
            Err(e) => warn!("[confirm_failure]: Could not report request {request_id}: {e}"),
        }
    }
}

async fn next_pairing_event(
    events: &mut UnboundedReceiver<PairingEvent>,
    cancel: &CancellationToken,
) -> Result<PairingEvent, CommissioningError> {
    cancellable(cancel, events.recv())
        .await?
        .ok_or(CommissioningError::ChannelClosed)
}

/// Stop waiting for `fut` once `cancel` fires. The work behind `fut` is not
/// guaranteed to stop.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, CommissioningError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(CommissioningError::Cancelled),
        output = fut => Ok(output),
    }
}
