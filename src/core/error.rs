//! Commissioning pipeline errors.

use credential_service::CredentialServiceError;
use fabric_crypto::CryptoError;
use thiserror::Error;

use crate::core::tlv::TlvError;
use crate::core::types::{EndpointId, NodeId};

/// Errors reported by the device controller (the native Matter stack).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("Device unreachable: {0}")]
    Unreachable(String),
    #[error("Session {0} is no longer valid")]
    StaleSession(u64),
    #[error("Interaction model status {0:#04x}")]
    Status(u8),
    #[error("Operation timed out")]
    Timeout,
    #[error("Device controller is shut down")]
    Closed,
    #[error("Device controller error: {0}")]
    Other(String),
}

/// Why a topology walk stopped.
#[derive(Debug, Error)]
pub enum WalkAbort {
    #[error("endpoint lists its ancestor {ancestor} as a part (path {path:?})")]
    Cycle {
        ancestor: EndpointId,
        path: Vec<EndpointId>,
    },
    #[error("maximum depth {max_depth} exceeded")]
    DepthExceeded { max_depth: usize },
    #[error("descriptor read failed: {0}")]
    Read(#[source] Box<CommissioningError>),
}

/// Errors that can occur while commissioning or reconciling a device.
#[derive(Debug, Error)]
pub enum CommissioningError {
    /// Session resolution failed.
    #[error("Connection to node {node_id} unavailable: {source}")]
    ConnectionUnavailable {
        node_id: NodeId,
        #[source]
        source: ControllerError,
    },

    /// Operation attempted on a handle whose transport session is gone.
    #[error("Session handle for node {node_id} is stale")]
    StaleHandle { node_id: NodeId },

    #[error("Device discovery failed: {0}")]
    DiscoveryFailed(#[source] ControllerError),

    /// Non-zero PASE result.
    #[error("Secure pairing failed with code {code:#x}")]
    PairingFailed { code: u32 },

    /// Non-zero fabric join result.
    #[error("Commissioning failed with code {code:#x}")]
    CommissioningFailed { code: u32 },

    #[error("Credential service error: {0}")]
    CredentialServiceError(#[from] CredentialServiceError),

    /// Read, write or invoke failure.
    #[error("Attribute I/O on {path} failed: {source}")]
    AttributeIOError {
        path: String,
        #[source]
        source: ControllerError,
    },

    #[error("Failed to decode {path}: {source}")]
    DecodeError {
        path: String,
        #[source]
        source: TlvError,
    },

    /// A command answered with a non-zero status field.
    #[error("Command {path} returned status {status:#x}")]
    CommandFailed { path: String, status: u64 },

    #[error("Topology walk aborted at endpoint {endpoint}: {reason}")]
    TopologyWalkAborted {
        endpoint: EndpointId,
        reason: WalkAbort,
    },

    #[error("No admin entry found in the device ACL")]
    AdminEntryMissing,

    #[error("Invalid subscription request: {0}")]
    InvalidSubscription(String),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Commissioning cancelled")]
    Cancelled,

    #[error("Pairing event channel closed")]
    ChannelClosed,

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("Controller error: {0}")]
    Controller(#[source] ControllerError),
}

impl CommissioningError {
    /// Code fed back into the pairing session when NOC generation fails.
    pub fn noc_error_code(&self) -> u32 {
        match self {
            CommissioningError::CredentialServiceError(_) => NOC_ERROR_CREDENTIAL_SERVICE,
            CommissioningError::ProtocolViolation(_) => NOC_ERROR_INVALID_STATE,
            _ => NOC_ERROR_INTERNAL,
        }
    }
}

/// CHIP_ERROR_INTERNAL
pub const NOC_ERROR_INTERNAL: u32 = 0xAC;
/// CHIP_ERROR_INCORRECT_STATE
pub const NOC_ERROR_INVALID_STATE: u32 = 0x03;
/// CHIP_ERROR_CERT_NOT_FOUND: no certificate came back from the CA.
pub const NOC_ERROR_CREDENTIAL_SERVICE: u32 = 0x4A;
