//! Operational credential issuance.
//!
//! Runs when the device hands over its CSR. The CSR is PEM armored, sent to
//! the credential service, and the returned certificate is unwrapped back to
//! DER and completed into the pairing session together with the fabric root
//! and IPK. Every outcome, including failures, is reported back into the
//! pairing session so the native flow can abort instead of waiting.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use credential_service::{CredentialService, NocRequest};
use fabric_crypto::pem;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::controller::{DeviceController, NocChainOutcome};
use crate::core::error::CommissioningError;
use crate::core::types::{AttestationInfo, CsrInfo, FabricIdentity, NocChain, NodeId};

/// Certificate chain issued for one CSR.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedNoc {
    pub chain: NocChain,
    pub node_id: NodeId,
    pub request_id: String,
}

/// Request ids remembered for duplicate detection.
pub const ISSUED_ID_HISTORY: usize = 1024;

/// The most recent issued request ids, oldest evicted first.
struct IssuedIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
    capacity: usize,
}

impl IssuedIds {
    /// False if the id is already remembered.
    fn insert(&mut self, request_id: &str) -> bool {
        if self.ids.contains(request_id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.ids.insert(request_id.to_string());
        self.order.push_back(request_id.to_string());
        true
    }
}

pub struct OperationalCredentialIssuer<S: CredentialService> {
    service: Arc<S>,
    issued: Mutex<IssuedIds>,
}

impl<S: CredentialService> OperationalCredentialIssuer<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self::with_history(service, ISSUED_ID_HISTORY)
    }

    /// Remember at most `capacity` request ids (at least one).
    pub fn with_history(service: Arc<S>, capacity: usize) -> Self {
        Self {
            service,
            issued: Mutex::new(IssuedIds {
                ids: HashSet::new(),
                order: VecDeque::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Exchange the CSR for a NOC chain. Does not touch the pairing session.
    pub async fn issue(
        &self,
        fabric: &FabricIdentity,
        csr: &CsrInfo,
    ) -> Result<IssuedNoc, CommissioningError> {
        let csr_pem = pem::encode(pem::CSR_LABEL, &csr.csr);
        let response = self
            .service
            .issue_noc(NocRequest::node(fabric.group_id(), csr_pem))
            .await?;

        let node_id = NodeId(response.node_id()?);
        let noc = pem::decode_expecting(&response.node_noc, pem::CERTIFICATE_LABEL)?;

        {
            let mut issued = self.issued.lock().await;
            if !issued.insert(&response.request_id) {
                return Err(CommissioningError::ProtocolViolation(format!(
                    "request id {} was already issued",
                    response.request_id
                )));
            }
        }

        info!(
            "[issue_noc]: Issued NOC for node {node_id} (request {}, sha256 {})",
            response.request_id,
            hex::encode(&Sha256::digest(&noc)[..8])
        );

        Ok(IssuedNoc {
            chain: NocChain {
                operational_certificate: noc,
                root_certificate: fabric.root_certificate().to_vec(),
                ipk: fabric.ipk().to_vec(),
            },
            node_id,
            request_id: response.request_id,
        })
    }

    /// CSR callback: issue and complete the pairing session exactly once.
    ///
    /// Runs on the caller's task, never on the controller's callback context,
    /// so the network round trip does not stall the transport. `cancel` only
    /// races the credential service call. Once a NOC is issued it is always
    /// handed to the device; a cancellation that loses that race is left to
    /// the caller's fabric join handling.
    pub async fn on_csr_received<C: DeviceController>(
        &self,
        controller: &C,
        fabric: &FabricIdentity,
        csr: &CsrInfo,
        attestation: &AttestationInfo,
        cancel: &CancellationToken,
    ) -> Result<IssuedNoc, CommissioningError> {
        if attestation.elements.is_empty() {
            warn!("[on_csr_received]: Device sent no attestation elements");
        }

        let issued = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CommissioningError::Cancelled),
            issued = self.issue(fabric, csr) => issued,
        };
        self.complete(controller, issued).await
    }

    /// Hand the issuance result to the pairing session. Failures are
    /// reported as a NOC error code so the native flow aborts.
    async fn complete<C: DeviceController>(
        &self,
        controller: &C,
        issued: Result<IssuedNoc, CommissioningError>,
    ) -> Result<IssuedNoc, CommissioningError> {
        match issued {
            Ok(issued) => {
                controller
                    .complete_noc_chain(NocChainOutcome::Issued {
                        chain: issued.chain.clone(),
                        node_id: issued.node_id,
                    })
                    .await
                    .map_err(CommissioningError::Controller)?;
                Ok(issued)
            }
            Err(e) => {
                let code = e.noc_error_code();
                error!("[on_csr_received]: NOC generation failed ({e}), reporting code {code:#x}");
                if let Err(report_err) = controller
                    .complete_noc_chain(NocChainOutcome::Failed { code })
                    .await
                {
                    error!("[on_csr_received]: Could not report NOC failure: {report_err}");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use credential_service::MemoryCredentialService;
    use fabric_crypto::CategoryId;

    use super::*;

    fn fabric() -> FabricIdentity {
        FabricIdentity::new(
            0xF1,
            "group",
            vec![0x30],
            vec![0x11; 16],
            CategoryId::from_code("00010001").unwrap(),
            CategoryId::from_code("00030001").unwrap(),
        )
    }

    fn csr() -> CsrInfo {
        CsrInfo {
            csr: vec![0x30, 0x03, 0x01, 0x02, 0x03],
            csr_nonce: vec![0; 32],
        }
    }

    #[tokio::test]
    async fn test_duplicate_request_id_rejected() {
        let service = Arc::new(MemoryCredentialService::new(1).unwrap());
        service.set_fixed_request_id("req-1").await;
        let issuer = OperationalCredentialIssuer::new(service);

        let issued = issuer.issue(&fabric(), &csr()).await.unwrap();
        assert_eq!(issued.request_id, "req-1");
        assert_eq!(issued.node_id, NodeId(1));
        let err = issuer.issue(&fabric(), &csr()).await.unwrap_err();
        assert!(matches!(err, CommissioningError::ProtocolViolation(_)));
    }

    #[tokio::test]
    async fn test_request_id_history_is_bounded() {
        let service = Arc::new(MemoryCredentialService::new(1).unwrap());
        let issuer = OperationalCredentialIssuer::with_history(service, 2);

        let first = issuer.issue(&fabric(), &csr()).await.unwrap();
        issuer.issue(&fabric(), &csr()).await.unwrap();
        issuer.issue(&fabric(), &csr()).await.unwrap();

        let issued = issuer.issued.lock().await;
        assert_eq!(issued.order.len(), 2);
        assert!(!issued.ids.contains(&first.request_id));
    }
}
