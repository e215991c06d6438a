//! In-memory certificate authority for development and testing.
//!
//! Issued certificates are opaque DER-armored blobs
//! (`csr || node_id || ca_signature`), not X.509. They are enough to drive
//! the commissioning pipeline against a simulated device.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use fabric_crypto::{pem, KeypairSigner, MemoryKeyStore, SecureKeyStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    ConfirmationRequest, ConfirmationResponse, CredentialService, CredentialServiceError,
    NocRequest, NocResponse, CSR_TYPE_NODE, OPERATION_ADD, STATUS_SUCCESS,
};

/// Fabric id under which the development CA keeps its own signing key.
pub const DEV_CA_FABRIC_ID: u64 = 0xCA;

#[derive(Default)]
struct State {
    next_node_id: u64,
    issued: HashMap<String, u64>,
    issue_requests: Vec<NocRequest>,
    confirmations: Vec<ConfirmationRequest>,
    issue_failures: VecDeque<CredentialServiceError>,
    confirm_status: Option<String>,
    fixed_request_id: Option<String>,
    fixed_node_id: Option<u64>,
}

pub struct MemoryCredentialService {
    signer: Arc<dyn KeypairSigner>,
    is_rainmaker_node: bool,
    state: Mutex<State>,
}

impl MemoryCredentialService {
    /// Create a CA that hands out node ids starting at `first_node_id`.
    pub fn new(first_node_id: u64) -> Result<Self, CredentialServiceError> {
        let keys = MemoryKeyStore::new();
        keys.generate_keypair(DEV_CA_FABRIC_ID)?;
        Ok(Self {
            signer: keys.signer(DEV_CA_FABRIC_ID)?,
            is_rainmaker_node: true,
            state: Mutex::new(State {
                next_node_id: first_node_id,
                ..Default::default()
            }),
        })
    }

    /// Value reported as `isRainmakerNode` on confirmation.
    pub fn with_rainmaker_node(mut self, is_rainmaker_node: bool) -> Self {
        self.is_rainmaker_node = is_rainmaker_node;
        self
    }

    /// Public key of the CA, for verifying issued certificates.
    pub fn ca_public_key(&self) -> Vec<u8> {
        self.signer.public_key()
    }

    /// Make the next `issue_noc` call fail with `err`.
    pub async fn fail_next_issue(&self, err: CredentialServiceError) {
        self.state.lock().await.issue_failures.push_back(err);
    }

    /// Answer every confirmation with this status instead of `success`.
    pub async fn set_confirmation_status(&self, status: &str) {
        self.state.lock().await.confirm_status = Some(status.to_string());
    }

    /// Reuse one request id for every issuance.
    pub async fn set_fixed_request_id(&self, request_id: &str) {
        self.state.lock().await.fixed_request_id = Some(request_id.to_string());
    }

    /// Hand out the same node id for every issuance, as a CA that keys node
    /// ids on the device does.
    pub async fn set_fixed_node_id(&self, node_id: u64) {
        self.state.lock().await.fixed_node_id = Some(node_id);
    }

    pub async fn issue_requests(&self) -> Vec<NocRequest> {
        self.state.lock().await.issue_requests.clone()
    }

    pub async fn confirmations(&self) -> Vec<ConfirmationRequest> {
        self.state.lock().await.confirmations.clone()
    }

    fn sign_certificate(&self, csr_der: &[u8], node_id: u64) -> Result<Vec<u8>, CredentialServiceError> {
        let mut tbs = csr_der.to_vec();
        tbs.extend_from_slice(&node_id.to_be_bytes());
        let signature = self.signer.sign(&tbs)?;
        tbs.extend_from_slice(&signature);
        Ok(tbs)
    }
}

#[async_trait]
impl CredentialService for MemoryCredentialService {
    async fn issue_noc(&self, request: NocRequest) -> Result<NocResponse, CredentialServiceError> {
        let mut state = self.state.lock().await;
        state.issue_requests.push(request.clone());
        if let Some(err) = state.issue_failures.pop_front() {
            return Err(err);
        }
        if request.operation != OPERATION_ADD || request.csr_type != CSR_TYPE_NODE {
            return Err(CredentialServiceError::Rejected(format!(
                "unsupported operation {}/{}",
                request.operation, request.csr_type
            )));
        }

        let csr_der = pem::decode_expecting(&request.csr_pem, pem::CSR_LABEL)?;
        let node_id = state.fixed_node_id.unwrap_or(state.next_node_id);
        if state.fixed_node_id.is_none() {
            state.next_node_id += 1;
        }

        let certificate = self.sign_certificate(&csr_der, node_id)?;
        let request_id = state
            .fixed_request_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        state.issued.insert(request_id.clone(), node_id);
        info!(
            "[issue_noc]: Issued node {node_id:#018x} for group {} (request {request_id})",
            request.group_id
        );

        Ok(NocResponse {
            node_noc: pem::encode(pem::CERTIFICATE_LABEL, &certificate),
            request_id,
            matter_node_id: format!("{node_id:016X}"),
        })
    }

    async fn confirm(
        &self,
        request: ConfirmationRequest,
    ) -> Result<ConfirmationResponse, CredentialServiceError> {
        let mut state = self.state.lock().await;
        state.confirmations.push(request.clone());
        if !state.issued.contains_key(&request.request_id) {
            return Err(CredentialServiceError::UnknownRequest(request.request_id));
        }
        let status = state
            .confirm_status
            .clone()
            .unwrap_or_else(|| STATUS_SUCCESS.to_string());
        debug!(
            "[confirm]: Request {} confirmed with {} -> {status}",
            request.request_id, request.status
        );
        Ok(ConfirmationResponse {
            is_rainmaker_node: self.is_rainmaker_node,
            description: format!("request {} {status}", request.request_id),
            status,
        })
    }
}
