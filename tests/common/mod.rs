#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use credential_service::MemoryCredentialService;
use fabric_crypto::{CategoryId, MemoryKeyStore, SecureKeyStore};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use matter_onboard::app::{
    Commissioner, CommissionerConfig, CommissioningEventHandler, CommissioningReport,
    CommissioningRequest, CommissioningState, DeviceTarget,
};
use matter_onboard::core::{
    ClusterClient, CommissioningError, DeviceController, FabricIdentity, NocChain,
    NocChainOutcome, NodeId, PairingEvent, PairingRequest, SessionRegistry,
};
use matter_onboard::sim::{SimDevice, SimulatedController, DEFAULT_PASSCODE};

pub const FABRIC_ID: u64 = 0x0000_0000_0000_00F1;
pub const GROUP_ID: &str = "test-group";
pub const FIRST_NODE_ID: u64 = 0x0000_0000_0000_1001;
/// Node id used when a test joins the device without the commissioner.
pub const JOINED_NODE_ID: NodeId = NodeId(0x42);

pub type TestCommissioner =
    Commissioner<SimulatedController, MemoryCredentialService, MemoryKeyStore, RecordingHandler>;

#[derive(Clone, Debug, PartialEq)]
pub enum Recorded {
    State(CommissioningState),
    Complete(NodeId),
    Failed(String),
}

/// Records every callback; optionally cancels a token when a state is entered.
#[derive(Default)]
pub struct RecordingHandler {
    events: Mutex<Vec<Recorded>>,
    cancel_on: Mutex<Option<(CommissioningState, CancellationToken)>>,
}

impl RecordingHandler {
    pub fn cancel_on(&self, state: CommissioningState, token: CancellationToken) {
        *self.cancel_on.lock().unwrap() = Some((state, token));
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().unwrap().clone()
    }

    pub fn states(&self) -> Vec<CommissioningState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                Recorded::State(state) => Some(state),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl CommissioningEventHandler for RecordingHandler {
    async fn on_state_changed(&self, _attempt_id: Uuid, state: CommissioningState) {
        self.events.lock().unwrap().push(Recorded::State(state));
        if let Some((trigger, token)) = self.cancel_on.lock().unwrap().as_ref() {
            if *trigger == state {
                token.cancel();
            }
        }
    }

    async fn on_complete(&self, report: &CommissioningReport) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Complete(report.node_id));
    }

    async fn on_failed(&self, _attempt_id: Uuid, error: &CommissioningError) {
        self.events
            .lock()
            .unwrap()
            .push(Recorded::Failed(error.to_string()));
    }
}

pub struct Fixture {
    pub controller: Arc<SimulatedController>,
    pub credentials: Arc<MemoryCredentialService>,
    pub keystore: Arc<MemoryKeyStore>,
    pub handler: Arc<RecordingHandler>,
    pub fabric: Arc<FabricIdentity>,
    pub address: SocketAddr,
}

impl Fixture {
    pub fn new(device: SimDevice) -> Self {
        let address = device.address;
        let keystore = Arc::new(MemoryKeyStore::new());
        let public_key = keystore
            .generate_keypair(FABRIC_ID)
            .expect("Failed to generate fabric key");
        let fabric = Arc::new(FabricIdentity::new(
            FABRIC_ID,
            GROUP_ID,
            public_key,
            vec![0x11; 16],
            CategoryId::from_code("00010001").unwrap(),
            CategoryId::from_code("00030001").unwrap(),
        ));
        Self {
            controller: Arc::new(
                SimulatedController::new(device).expect("Failed to start simulated controller"),
            ),
            credentials: Arc::new(
                MemoryCredentialService::new(FIRST_NODE_ID).expect("Failed to create CA"),
            ),
            keystore,
            handler: Arc::new(RecordingHandler::default()),
            fabric,
            address,
        }
    }

    pub fn commissioner(&self, config: CommissionerConfig) -> TestCommissioner {
        Commissioner::new(
            self.controller.clone(),
            self.credentials.clone(),
            self.keystore.clone(),
            self.handler.clone(),
            config,
        )
    }

    pub fn request(&self) -> CommissioningRequest {
        CommissioningRequest {
            target: DeviceTarget::Address(self.address),
            passcode: DEFAULT_PASSCODE,
            device_name: None,
            fabric: self.fabric.clone(),
        }
    }

    pub fn client(&self) -> ClusterClient<SimulatedController> {
        ClusterClient::new(self.controller.clone(), Duration::from_secs(1))
    }

    pub fn registry(&self) -> SessionRegistry<SimulatedController> {
        SessionRegistry::new(self.controller.clone())
    }

    /// Drive the device onto the fabric directly through the controller,
    /// bypassing the commissioner.
    pub async fn join(&self) -> NodeId {
        let (tx, mut rx) = mpsc::unbounded_channel();
        self.controller
            .start_pairing(
                PairingRequest {
                    address: self.address,
                    passcode: DEFAULT_PASSCODE,
                    fabric: self.fabric.clone(),
                    keypair: self.keystore.signer(FABRIC_ID).unwrap(),
                },
                tx,
            )
            .await
            .expect("Failed to start pairing");
        assert_eq!(
            rx.recv().await,
            Some(PairingEvent::PairingComplete { code: 0 })
        );
        assert!(matches!(
            rx.recv().await,
            Some(PairingEvent::CsrReceived { .. })
        ));
        self.controller
            .complete_noc_chain(NocChainOutcome::Issued {
                chain: NocChain {
                    operational_certificate: vec![0x30],
                    root_certificate: self.fabric.root_certificate().to_vec(),
                    ipk: self.fabric.ipk().to_vec(),
                },
                node_id: JOINED_NODE_ID,
            })
            .await
            .expect("Failed to complete NOC chain");
        match rx.recv().await {
            Some(PairingEvent::CommissioningComplete { node_id, code: 0 }) => node_id,
            other => panic!("Unexpected pairing event: {other:?}"),
        }
    }
}
