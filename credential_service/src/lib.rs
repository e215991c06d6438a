//! Credential Service contract.
//!
//! The Credential Service is the remote certificate authority that turns a
//! device's certificate signing request into a node operational certificate,
//! and that accepts a confirmation once the device has been reconciled.
//! Transport details (REST endpoints, auth headers) live with the caller's
//! HTTP stack; this crate only fixes the request/response shapes and the
//! service interface.

mod error;
mod memory;
mod types;

pub use error::CredentialServiceError;
pub use memory::{MemoryCredentialService, DEV_CA_FABRIC_ID};
pub use types::{
    ConfirmationMetadata, ConfirmationRequest, ConfirmationResponse, NocRequest, NocResponse,
    CSR_TYPE_NODE, OPERATION_ADD, STATUS_FAILURE, STATUS_SUCCESS,
};

use async_trait::async_trait;

#[async_trait]
pub trait CredentialService: Send + Sync + 'static {
    /// Exchange a PEM encoded CSR for a signed node operational certificate.
    async fn issue_noc(&self, request: NocRequest) -> Result<NocResponse, CredentialServiceError>;

    /// Report the outcome of commissioning for a previously issued request id.
    async fn confirm(
        &self,
        request: ConfirmationRequest,
    ) -> Result<ConfirmationResponse, CredentialServiceError>;
}
