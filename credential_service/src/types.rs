//! Wire shapes exchanged with the credential service.

use serde::{Deserialize, Serialize};

use crate::CredentialServiceError;

pub const OPERATION_ADD: &str = "add";
pub const CSR_TYPE_NODE: &str = "node";
pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_FAILURE: &str = "failure";

/// `{operation: "add", csrType: "node", groupId, csrPem}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NocRequest {
    pub operation: String,
    pub csr_type: String,
    pub group_id: String,
    pub csr_pem: String,
}

impl NocRequest {
    /// Request for a node certificate in the given fabric group.
    pub fn node(group_id: &str, csr_pem: String) -> Self {
        Self {
            operation: OPERATION_ADD.to_string(),
            csr_type: CSR_TYPE_NODE.to_string(),
            group_id: group_id.to_string(),
            csr_pem,
        }
    }
}

/// `{nodeNoc: pem, requestId, matterNodeId}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NocResponse {
    pub node_noc: String,
    pub request_id: String,
    /// Hex encoded 64-bit Matter node id.
    pub matter_node_id: String,
}

impl NocResponse {
    /// Parse the hex node id (with or without `0x`).
    pub fn node_id(&self) -> Result<u64, CredentialServiceError> {
        let raw = self.matter_node_id.trim();
        let hex_part = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .unwrap_or(raw);
        if hex_part.is_empty() || hex_part.len() > 16 {
            return Err(CredentialServiceError::MalformedResponse(format!(
                "matterNodeId {raw:?}"
            )));
        }
        u64::from_str_radix(hex_part, 16).map_err(|_| {
            CredentialServiceError::MalformedResponse(format!("matterNodeId {raw:?}"))
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationMetadata {
    pub matter: serde_json::Value,
}

/// `{requestId, status, metadata: {matter: {...}}}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub request_id: String,
    pub status: String,
    pub metadata: ConfirmationMetadata,
}

/// `{isRainmakerNode, status, description}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationResponse {
    #[serde(default)]
    pub is_rainmaker_node: bool,
    pub status: String,
    #[serde(default)]
    pub description: String,
}

impl ConfirmationResponse {
    /// The status field is the failure channel; a decoded response is not
    /// a success until it says so.
    pub fn ensure_success(self) -> Result<Self, CredentialServiceError> {
        if self.status.eq_ignore_ascii_case(STATUS_SUCCESS) {
            Ok(self)
        } else {
            Err(CredentialServiceError::Rejected(format!(
                "{}: {}",
                self.status, self.description
            )))
        }
    }
}
