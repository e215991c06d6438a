//! Contract with the native Matter device controller.
//!
//! The controller owns the transport and runs every native callback on its
//! own execution context. Request/response operations are async calls that
//! resolve once the matching callback fires; the commissioning flow and
//! subscriptions push their callbacks into channels the caller owns.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_crypto::KeypairSigner;
use tokio::sync::mpsc::UnboundedSender;

use crate::core::error::ControllerError;
use crate::core::tlv::TlvValue;
use crate::core::types::{
    AttestationInfo, AttributePath, CommandPath, CsrInfo, EventPath, FabricIdentity, NocChain,
    NodeId,
};

/// Controller-side id of a live CASE session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RawSession(pub u64);

/// Parameters of one PASE + commissioning run.
pub struct PairingRequest {
    pub address: SocketAddr,
    pub passcode: u32,
    pub fabric: Arc<FabricIdentity>,
    /// Controller operational key for the fabric. Signing goes through it;
    /// the private key stays in the key store.
    pub keypair: Arc<dyn KeypairSigner>,
}

/// Callbacks of the native commissioning flow, in the order they fire.
#[derive(Clone, Debug, PartialEq)]
pub enum PairingEvent {
    /// PASE finished. Non-zero `code` is a failure.
    PairingComplete { code: u32 },
    /// The device produced its operational CSR.
    CsrReceived {
        csr: CsrInfo,
        attestation: AttestationInfo,
    },
    /// Fabric join finished. Non-zero `code` is a failure even though no
    /// transport error occurred.
    CommissioningComplete { node_id: NodeId, code: u32 },
}

/// Result of NOC generation, handed back to the pairing session once.
#[derive(Clone, Debug, PartialEq)]
pub enum NocChainOutcome {
    Issued { chain: NocChain, node_id: NodeId },
    Failed { code: u32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SubscribeRequest {
    pub attributes: Vec<AttributePath>,
    pub events: Vec<EventPath>,
    pub min_interval: Duration,
    pub max_interval: Duration,
}

/// Callbacks of a live subscription.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionEvent {
    Established { subscription_id: u32 },
    Report { path: AttributePath, value: TlvValue },
    Event { path: EventPath, value: TlvValue },
    /// The transport lost the subscription and is retrying. `next_attempt`
    /// is the transport's own backoff suggestion.
    Resubscribing { cause: String, next_attempt: Duration },
}

#[async_trait]
pub trait DeviceController: Send + Sync + 'static {
    /// Resolve a commissionable device's address from its discriminator.
    async fn discover(&self, discriminator: u16) -> Result<SocketAddr, ControllerError>;

    /// Start PASE and the commissioning flow. Progress is reported on `events`.
    async fn start_pairing(
        &self,
        request: PairingRequest,
        events: UnboundedSender<PairingEvent>,
    ) -> Result<(), ControllerError>;

    /// Complete the pending NOC generation of the active pairing session.
    async fn complete_noc_chain(&self, outcome: NocChainOutcome) -> Result<(), ControllerError>;

    /// Stop the active pairing session. Not acknowledged by the device.
    async fn stop_pairing(&self) -> Result<(), ControllerError>;

    /// Establish a CASE session to an operational node.
    async fn connect(&self, node_id: NodeId) -> Result<RawSession, ControllerError>;

    /// Drop a session previously returned by `connect`.
    async fn release(&self, session: RawSession);

    async fn read_attribute(
        &self,
        session: RawSession,
        path: AttributePath,
    ) -> Result<TlvValue, ControllerError>;

    async fn write_attribute(
        &self,
        session: RawSession,
        path: AttributePath,
        value: TlvValue,
    ) -> Result<(), ControllerError>;

    async fn invoke_command(
        &self,
        session: RawSession,
        path: CommandPath,
        fields: TlvValue,
        timeout: Option<Duration>,
    ) -> Result<TlvValue, ControllerError>;

    /// Subscribe to the given paths. Reports flow into `sink` until the
    /// session goes away.
    async fn subscribe(
        &self,
        session: RawSession,
        request: SubscribeRequest,
        sink: UnboundedSender<SubscriptionEvent>,
    ) -> Result<u32, ControllerError>;
}
