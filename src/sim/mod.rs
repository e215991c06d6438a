//! Simulated device controller.
//!
//! Stands in for the native Matter stack. Like the native stack it runs every
//! operation and callback on one dedicated thread (`device-controller`); the
//! async API sends a command there and awaits the reply on a oneshot channel.
//! Pairing and subscription callbacks are pushed into the caller's channels
//! from that thread.
//!
//! One simulated device is attached per controller. Test knobs and
//! inspectors work on the shared device state directly.

mod device;

pub use device::{SimDevice, SimEndpoint, DEFAULT_DISCRIMINATOR, DEFAULT_PASSCODE, MATTER_PORT};

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use fabric_crypto::verify_signature;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::clusters::{
    self, access_control, basic_information, controller, descriptor, operational_credentials,
};
use crate::core::{
    AccessControlEntry, AttestationInfo, AttributePath, AuthMode, CommandPath, ControllerError,
    CsrInfo, DeviceController, EndpointId, FabricIdentity, NocChainOutcome, NodeId,
    PairingEvent, PairingRequest, Privilege, RawSession, SubscribeRequest, SubscriptionEvent,
    TlvValue,
};

/// PASE result for a wrong setup passcode.
pub const PAIRING_ERROR_INVALID_PASSCODE: u32 = 0x38;
/// PASE result when nothing answers at the given address.
pub const PAIRING_ERROR_UNREACHABLE: u32 = 0x32;
/// PASE result when the controller key fails to sign.
pub const PAIRING_ERROR_SIGNING: u32 = 0xAC;

// Interaction model status codes
const IM_UNSUPPORTED_ENDPOINT: u8 = 0x7F;
const IM_UNSUPPORTED_COMMAND: u8 = 0x81;
const IM_UNSUPPORTED_ATTRIBUTE: u8 = 0x86;
const IM_CONSTRAINT_ERROR: u8 = 0x87;
const IM_UNSUPPORTED_WRITE: u8 = 0x88;
// NodeOperationalCertStatusEnum
const NOC_STATUS_OK: u64 = 0;
const NOC_STATUS_INVALID_FABRIC_INDEX: u64 = 11;

type Reply<T> = oneshot::Sender<Result<T, ControllerError>>;

enum Command {
    Discover {
        discriminator: u16,
        reply: Reply<SocketAddr>,
    },
    StartPairing {
        request: PairingRequest,
        events: UnboundedSender<PairingEvent>,
        reply: Reply<()>,
    },
    CompleteNocChain {
        outcome: NocChainOutcome,
        reply: Reply<()>,
    },
    StopPairing {
        reply: Reply<()>,
    },
    Connect {
        node_id: NodeId,
        reply: Reply<RawSession>,
    },
    Release {
        session: RawSession,
    },
    Read {
        session: RawSession,
        path: AttributePath,
        reply: Reply<TlvValue>,
    },
    Write {
        session: RawSession,
        path: AttributePath,
        value: TlvValue,
        reply: Reply<()>,
    },
    Invoke {
        session: RawSession,
        path: CommandPath,
        fields: TlvValue,
        reply: Reply<TlvValue>,
    },
    Subscribe {
        session: RawSession,
        request: SubscribeRequest,
        sink: UnboundedSender<SubscriptionEvent>,
        reply: Reply<u32>,
    },
}

struct Pairing {
    fabric: Arc<FabricIdentity>,
    events: UnboundedSender<PairingEvent>,
    csrs_remaining: usize,
}

struct Joined {
    node_id: NodeId,
    fabric_index: u8,
}

struct Subscription {
    id: u32,
    session: RawSession,
    request: SubscribeRequest,
    sink: UnboundedSender<SubscriptionEvent>,
}

struct SimState {
    device: SimDevice,
    pairing: Option<Pairing>,
    joined: Option<Joined>,
    acl: Vec<AccessControlEntry>,
    acl_writes: Vec<Vec<AccessControlEntry>>,
    sessions: HashMap<RawSession, NodeId>,
    next_session: u64,
    connects: usize,
    connect_failures: usize,
    connect_delay: Duration,
    failing_endpoints: HashSet<EndpointId>,
    invoked: Vec<(CommandPath, TlvValue)>,
    noc_outcomes: Vec<NocChainOutcome>,
    signatures: Vec<(Vec<u8>, Vec<u8>)>,
    pairing_stops: usize,
    subscriptions: Vec<Subscription>,
    next_subscription: u32,
    resubscribe_hint: Option<Duration>,
    next_fabric_index: u8,
}

impl SimState {
    fn new(device: SimDevice) -> Self {
        Self {
            acl: device.acl.clone(),
            device,
            pairing: None,
            joined: None,
            acl_writes: Vec::new(),
            sessions: HashMap::new(),
            next_session: 1,
            connects: 0,
            connect_failures: 0,
            connect_delay: Duration::ZERO,
            failing_endpoints: HashSet::new(),
            invoked: Vec::new(),
            noc_outcomes: Vec::new(),
            signatures: Vec::new(),
            pairing_stops: 0,
            subscriptions: Vec::new(),
            next_subscription: 1,
            resubscribe_hint: None,
            next_fabric_index: 1,
        }
    }

    fn check_session(&self, session: RawSession) -> Result<NodeId, ControllerError> {
        self.sessions
            .get(&session)
            .copied()
            .ok_or(ControllerError::StaleSession(session.0))
    }

    fn drop_sessions_of(&mut self, node_id: NodeId) {
        self.sessions.retain(|_, node| *node != node_id);
        let sessions = &self.sessions;
        // Dropping the sink ends the subscriber's stream.
        self.subscriptions
            .retain(|sub| sessions.contains_key(&sub.session));
    }

    fn csr(&self) -> CsrInfo {
        let mut csr = vec![0x30, 0x0A];
        csr.extend_from_slice(b"SIMCSR");
        csr.extend_from_slice(&self.device.discriminator.to_be_bytes());
        CsrInfo {
            csr,
            csr_nonce: vec![0x5A; 32],
        }
    }

    fn attestation(&self) -> AttestationInfo {
        AttestationInfo {
            elements: b"sim-attestation".to_vec(),
            signature: vec![0; 64],
        }
    }
}

fn run_device_context(state: Arc<Mutex<SimState>>, commands: std_mpsc::Receiver<Command>) {
    info!("[device-controller]: started");
    while let Ok(command) = commands.recv() {
        handle_command(&state, command);
    }
    info!("[device-controller]: stopped");
}

fn lock(state: &Mutex<SimState>) -> MutexGuard<'_, SimState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn handle_command(state: &Mutex<SimState>, command: Command) {
    // Reply send errors mean the caller stopped waiting.
    match command {
        Command::Discover {
            discriminator,
            reply,
        } => {
            let state = lock(state);
            let result = if state.device.discriminator == discriminator {
                Ok(state.device.address)
            } else {
                Err(ControllerError::Unreachable(format!(
                    "no commissionable node with discriminator {discriminator}"
                )))
            };
            let _ = reply.send(result);
        }
        Command::StartPairing {
            request,
            events,
            reply,
        } => {
            let _ = reply.send(start_pairing(&mut lock(state), request, events));
        }
        Command::CompleteNocChain { outcome, reply } => {
            let _ = reply.send(complete_noc_chain(&mut lock(state), outcome));
        }
        Command::StopPairing { reply } => {
            let mut state = lock(state);
            state.pairing_stops += 1;
            state.pairing = None;
            let _ = reply.send(Ok(()));
        }
        Command::Connect { node_id, reply } => {
            let delay = {
                let mut state = lock(state);
                if state.connect_failures > 0 {
                    state.connect_failures -= 1;
                    let _ = reply.send(Err(ControllerError::Unreachable(
                        "CASE establishment timed out".to_string(),
                    )));
                    return;
                }
                state.connect_delay
            };
            // Blocks the whole context, as a slow CASE handshake would.
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
            let _ = reply.send(connect(&mut lock(state), node_id));
        }
        Command::Release { session } => {
            let mut state = lock(state);
            state.sessions.remove(&session);
            state.subscriptions.retain(|sub| sub.session != session);
        }
        Command::Read {
            session,
            path,
            reply,
        } => {
            let state = lock(state);
            let result = state
                .check_session(session)
                .and_then(|_| read_attribute(&state, path));
            let _ = reply.send(result);
        }
        Command::Write {
            session,
            path,
            value,
            reply,
        } => {
            let mut state = lock(state);
            let result = state
                .check_session(session)
                .and_then(|_| write_attribute(&mut state, path, value));
            let _ = reply.send(result);
        }
        Command::Invoke {
            session,
            path,
            fields,
            reply,
        } => {
            let mut state = lock(state);
            let result = state
                .check_session(session)
                .and_then(|_| invoke_command(&mut state, path, fields));
            let _ = reply.send(result);
        }
        Command::Subscribe {
            session,
            request,
            sink,
            reply,
        } => {
            let mut state = lock(state);
            let result = state
                .check_session(session)
                .map(|_| subscribe(&mut state, session, request, sink));
            let _ = reply.send(result);
        }
    }
}

fn start_pairing(
    state: &mut SimState,
    request: PairingRequest,
    events: UnboundedSender<PairingEvent>,
) -> Result<(), ControllerError> {
    if state.pairing.is_some() {
        return Err(ControllerError::Other("pairing already in progress".to_string()));
    }

    let code = if request.address != state.device.address {
        PAIRING_ERROR_UNREACHABLE
    } else if state.device.pairing_code != 0 {
        state.device.pairing_code
    } else if request.passcode != state.device.passcode {
        PAIRING_ERROR_INVALID_PASSCODE
    } else {
        sign_challenge(state, &request)
    };
    let _ = events.send(PairingEvent::PairingComplete { code });
    if code != 0 {
        info!("[start_pairing]: PASE failed with {code:#x}");
        return Ok(());
    }

    let _ = events.send(PairingEvent::CsrReceived {
        csr: state.csr(),
        attestation: state.attestation(),
    });
    state.pairing = Some(Pairing {
        fabric: request.fabric,
        events,
        csrs_remaining: state.device.csr_count.saturating_sub(1),
    });
    Ok(())
}

/// Have the controller key sign a challenge and check it against its public key.
fn sign_challenge(state: &mut SimState, request: &PairingRequest) -> u32 {
    let mut challenge = b"sim-pase-challenge".to_vec();
    challenge.extend_from_slice(&request.fabric.fabric_id().to_be_bytes());
    let public_key = request.keypair.public_key();
    let verified = request
        .keypair
        .sign(&challenge)
        .and_then(|signature| {
            verify_signature(&public_key, &challenge, &signature)?;
            Ok(signature)
        });
    match verified {
        Ok(signature) => {
            state.signatures.push((public_key, signature));
            0
        }
        Err(e) => {
            warn!("[start_pairing]: Controller signature rejected: {e}");
            PAIRING_ERROR_SIGNING
        }
    }
}

fn complete_noc_chain(state: &mut SimState, outcome: NocChainOutcome) -> Result<(), ControllerError> {
    let Some(mut pairing) = state.pairing.take() else {
        return Err(ControllerError::Other("no pairing in progress".to_string()));
    };
    state.noc_outcomes.push(outcome.clone());

    let node_id = match outcome {
        NocChainOutcome::Failed { code } => {
            let _ = pairing.events.send(PairingEvent::CommissioningComplete {
                node_id: NodeId(0),
                code,
            });
            return Ok(());
        }
        NocChainOutcome::Issued { node_id, .. } => node_id,
    };

    if pairing.csrs_remaining > 0 {
        pairing.csrs_remaining -= 1;
        let _ = pairing.events.send(PairingEvent::CsrReceived {
            csr: state.csr(),
            attestation: state.attestation(),
        });
        state.pairing = Some(pairing);
        return Ok(());
    }

    let code = state.device.commissioning_code;
    if code == 0 {
        let fabric_index = state.next_fabric_index;
        state.next_fabric_index = state.next_fabric_index.wrapping_add(1).max(1);
        if state.device.grant_admin_entry {
            state.acl.push(AccessControlEntry {
                privilege: Privilege::ADMINISTER,
                auth_mode: AuthMode::CASE,
                subjects: Some(vec![pairing.fabric.admin_category().subject()]),
                targets: None,
                fabric_index,
            });
        }
        state.joined = Some(Joined {
            node_id,
            fabric_index,
        });
        info!("[complete_noc_chain]: Joined as node {node_id} (fabric index {fabric_index})");
    }
    let _ = pairing
        .events
        .send(PairingEvent::CommissioningComplete { node_id, code });
    Ok(())
}

fn connect(state: &mut SimState, node_id: NodeId) -> Result<RawSession, ControllerError> {
    match &state.joined {
        Some(joined) if joined.node_id == node_id => {}
        _ => {
            return Err(ControllerError::Unreachable(format!(
                "node {node_id} is not operational"
            )))
        }
    }
    let session = RawSession(state.next_session);
    state.next_session += 1;
    state.connects += 1;
    state.sessions.insert(session, node_id);
    debug!("[connect]: Session {} to node {node_id}", session.0);
    Ok(session)
}

fn read_attribute(state: &SimState, path: AttributePath) -> Result<TlvValue, ControllerError> {
    if state.failing_endpoints.contains(&path.endpoint) {
        return Err(ControllerError::Timeout);
    }
    let unsupported = Err(ControllerError::Status(IM_UNSUPPORTED_ATTRIBUTE));
    match path.cluster {
        descriptor::CLUSTER_ID => {
            let endpoint = state
                .device
                .endpoints
                .get(&path.endpoint)
                .ok_or(ControllerError::Status(IM_UNSUPPORTED_ENDPOINT))?;
            let uints = |values: &[u64]| TlvValue::List(values.iter().copied().map(TlvValue::UInt).collect());
            match path.attribute {
                descriptor::ATTR_DEVICE_TYPE_LIST => Ok(TlvValue::List(
                    endpoint
                        .device_types
                        .iter()
                        .map(|device_type| {
                            TlvValue::Struct(vec![
                                (0, TlvValue::UInt((*device_type).into())),
                                (1, TlvValue::UInt(1)),
                            ])
                        })
                        .collect(),
                )),
                descriptor::ATTR_SERVER_LIST => Ok(uints(&endpoint.server_clusters)),
                descriptor::ATTR_CLIENT_LIST => Ok(uints(&endpoint.client_clusters)),
                descriptor::ATTR_PARTS_LIST => Ok(TlvValue::List(
                    endpoint
                        .parts
                        .iter()
                        .map(|part| TlvValue::UInt((*part).into()))
                        .collect(),
                )),
                _ => unsupported,
            }
        }
        access_control::CLUSTER_ID if path.attribute == access_control::ATTR_ACL => {
            Ok(clusters::encode_acl(&state.acl))
        }
        basic_information::CLUSTER_ID
            if path.attribute == basic_information::ATTR_PRODUCT_NAME =>
        {
            match &state.device.product_name {
                Some(name) => Ok(TlvValue::Utf8(name.clone())),
                None => unsupported,
            }
        }
        operational_credentials::CLUSTER_ID
            if path.attribute == operational_credentials::ATTR_CURRENT_FABRIC_INDEX =>
        {
            let index = state.joined.as_ref().map_or(0, |joined| joined.fabric_index);
            Ok(TlvValue::UInt(index.into()))
        }
        _ => unsupported,
    }
}

fn write_attribute(
    state: &mut SimState,
    path: AttributePath,
    value: TlvValue,
) -> Result<(), ControllerError> {
    if path.cluster != access_control::CLUSTER_ID || path.attribute != access_control::ATTR_ACL {
        return Err(ControllerError::Status(IM_UNSUPPORTED_WRITE));
    }
    let entries =
        clusters::decode_acl(&value).map_err(|_| ControllerError::Status(IM_CONSTRAINT_ERROR))?;
    state.acl_writes.push(entries.clone());
    state.acl = entries;
    Ok(())
}

fn invoke_command(
    state: &mut SimState,
    path: CommandPath,
    fields: TlvValue,
) -> Result<TlvValue, ControllerError> {
    state.invoked.push((path, fields.clone()));
    match (path.cluster, path.command) {
        (operational_credentials::CLUSTER_ID, operational_credentials::CMD_REMOVE_FABRIC) => {
            let index = fields
                .required(0)
                .and_then(TlvValue::as_u8)
                .map_err(|_| ControllerError::Status(IM_CONSTRAINT_ERROR))?;
            match state.joined.take() {
                Some(joined) if joined.fabric_index == index => {
                    state.acl.retain(|entry| entry.fabric_index != index);
                    info!("[invoke]: Node {} left fabric index {index}", joined.node_id);
                    state.drop_sessions_of(joined.node_id);
                    Ok(TlvValue::Struct(vec![
                        (0, TlvValue::UInt(NOC_STATUS_OK)),
                        (1, TlvValue::UInt(index.into())),
                    ]))
                }
                other => {
                    state.joined = other;
                    Ok(TlvValue::Struct(vec![(
                        0,
                        TlvValue::UInt(NOC_STATUS_INVALID_FABRIC_INDEX),
                    )]))
                }
            }
        }
        (controller::CLUSTER_ID, command) if command <= controller::CMD_UPDATE_DEVICE_LIST => {
            Ok(TlvValue::empty_struct())
        }
        _ => Err(ControllerError::Status(IM_UNSUPPORTED_COMMAND)),
    }
}

fn subscribe(
    state: &mut SimState,
    session: RawSession,
    request: SubscribeRequest,
    sink: UnboundedSender<SubscriptionEvent>,
) -> u32 {
    let id = state.next_subscription;
    state.next_subscription += 1;

    let _ = sink.send(SubscriptionEvent::Established {
        subscription_id: id,
    });
    // Priming reports
    for path in &request.attributes {
        if let Ok(value) = read_attribute(state, *path) {
            let _ = sink.send(SubscriptionEvent::Report { path: *path, value });
        }
    }
    if let Some(next_attempt) = state.resubscribe_hint {
        let _ = sink.send(SubscriptionEvent::Resubscribing {
            cause: "session idle timeout".to_string(),
            next_attempt,
        });
    }
    state.subscriptions.push(Subscription {
        id,
        session,
        request,
        sink,
    });
    id
}

/// Device controller backed by one simulated device.
pub struct SimulatedController {
    commands: Mutex<std_mpsc::Sender<Command>>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedController {
    /// Start the controller thread with `device` attached.
    pub fn new(device: SimDevice) -> Result<Self, ControllerError> {
        let state = Arc::new(Mutex::new(SimState::new(device)));
        let (tx, rx) = std_mpsc::channel();
        let thread_state = state.clone();
        // Exits when the controller, and with it the sender, is dropped.
        std::thread::Builder::new()
            .name("device-controller".into())
            .spawn(move || run_device_context(thread_state, rx))
            .map_err(|e| ControllerError::Other(e.to_string()))?;
        Ok(Self {
            commands: Mutex::new(tx),
            state,
        })
    }

    async fn call<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, ControllerError> {
        let (tx, rx) = oneshot::channel();
        self.send(command(tx))?;
        rx.await.map_err(|_| ControllerError::Closed)?
    }

    fn send(&self, command: Command) -> Result<(), ControllerError> {
        self.commands
            .lock()
            .map_err(|_| ControllerError::Closed)?
            .send(command)
            .map_err(|_| ControllerError::Closed)
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        lock(&self.state)
    }

    // ───────────────────────────── knobs ─────────────────────────────

    /// Fail the next `count` connects with `Unreachable`.
    pub fn fail_next_connects(&self, count: usize) {
        self.state().connect_failures = count;
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        self.state().connect_delay = delay;
    }

    /// Time out every read on `endpoint`.
    pub fn fail_reads_on(&self, endpoint: EndpointId) {
        self.state().failing_endpoints.insert(endpoint);
    }

    /// Make new subscriptions report a resubscription with this backoff.
    pub fn set_resubscribe_hint(&self, next_attempt: Duration) {
        self.state().resubscribe_hint = Some(next_attempt);
    }

    /// Drop every session to `node_id`, as a link loss would.
    pub fn disconnect(&self, node_id: NodeId) {
        self.state().drop_sessions_of(node_id);
    }

    /// Deliver a report to every subscription that covers `path`.
    pub fn push_report(&self, path: AttributePath, value: TlvValue) -> usize {
        let state = self.state();
        let mut delivered = 0;
        for sub in state
            .subscriptions
            .iter()
            .filter(|sub| sub.request.attributes.contains(&path))
        {
            if sub
                .sink
                .send(SubscriptionEvent::Report {
                    path,
                    value: value.clone(),
                })
                .is_ok()
            {
                debug!("[push_report]: {path} to subscription {}", sub.id);
                delivered += 1;
            }
        }
        delivered
    }

    // ─────────────────────────── inspectors ──────────────────────────

    pub fn acl(&self) -> Vec<AccessControlEntry> {
        self.state().acl.clone()
    }

    /// Every ACL list written, in order.
    pub fn acl_writes(&self) -> Vec<Vec<AccessControlEntry>> {
        self.state().acl_writes.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    pub fn invoked_commands(&self) -> Vec<(CommandPath, TlvValue)> {
        self.state().invoked.clone()
    }

    pub fn noc_outcomes(&self) -> Vec<NocChainOutcome> {
        self.state().noc_outcomes.clone()
    }

    /// `(public key, signature)` of every controller challenge signed.
    pub fn signatures(&self) -> Vec<(Vec<u8>, Vec<u8>)> {
        self.state().signatures.clone()
    }

    pub fn joined_node(&self) -> Option<NodeId> {
        self.state().joined.as_ref().map(|joined| joined.node_id)
    }

    pub fn pairing_stops(&self) -> usize {
        self.state().pairing_stops
    }

    pub fn live_sessions(&self) -> usize {
        self.state().sessions.len()
    }
}

#[async_trait]
impl DeviceController for SimulatedController {
    async fn discover(&self, discriminator: u16) -> Result<SocketAddr, ControllerError> {
        self.call(|reply| Command::Discover {
            discriminator,
            reply,
        })
        .await
    }

    async fn start_pairing(
        &self,
        request: PairingRequest,
        events: UnboundedSender<PairingEvent>,
    ) -> Result<(), ControllerError> {
        self.call(|reply| Command::StartPairing {
            request,
            events,
            reply,
        })
        .await
    }

    async fn complete_noc_chain(&self, outcome: NocChainOutcome) -> Result<(), ControllerError> {
        self.call(|reply| Command::CompleteNocChain { outcome, reply })
            .await
    }

    async fn stop_pairing(&self) -> Result<(), ControllerError> {
        self.call(|reply| Command::StopPairing { reply }).await
    }

    async fn connect(&self, node_id: NodeId) -> Result<RawSession, ControllerError> {
        self.call(|reply| Command::Connect { node_id, reply }).await
    }

    async fn release(&self, session: RawSession) {
        if self.send(Command::Release { session }).is_err() {
            warn!("[release]: Device controller is gone");
        }
    }

    async fn read_attribute(
        &self,
        session: RawSession,
        path: AttributePath,
    ) -> Result<TlvValue, ControllerError> {
        self.call(|reply| Command::Read {
            session,
            path,
            reply,
        })
        .await
    }

    async fn write_attribute(
        &self,
        session: RawSession,
        path: AttributePath,
        value: TlvValue,
    ) -> Result<(), ControllerError> {
        self.call(|reply| Command::Write {
            session,
            path,
            value,
            reply,
        })
        .await
    }

    async fn invoke_command(
        &self,
        session: RawSession,
        path: CommandPath,
        fields: TlvValue,
        timeout: Option<Duration>,
    ) -> Result<TlvValue, ControllerError> {
        let call = self.call(|reply| Command::Invoke {
            session,
            path,
            fields,
            reply,
        });
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, call)
                .await
                .map_err(|_| ControllerError::Timeout)?,
            None => call.await,
        }
    }

    async fn subscribe(
        &self,
        session: RawSession,
        request: SubscribeRequest,
        sink: UnboundedSender<SubscriptionEvent>,
    ) -> Result<u32, ControllerError> {
        self.call(|reply| Command::Subscribe {
            session,
            request,
            sink,
            reply,
        })
        .await
    }
}
