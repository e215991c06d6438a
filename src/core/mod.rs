//! Commissioning building blocks.
//!
//! Everything here is independent of how an attempt is orchestrated: the
//! device controller contract, session handles, credential issuance, topology
//! discovery, ACL reconciliation and subscriptions. [`crate::app`] wires them
//! into the commissioning state machine.

mod acl;
mod cluster_client;
pub mod clusters;
mod controller;
mod controller_cluster;
mod error;
mod issuer;
pub mod operational_credentials;
mod session;
mod subscription;
pub mod tlv;
mod topology;
mod types;

pub use acl::{AccessControlReconciler, AclOutcome};
pub use cluster_client::ClusterClient;
pub use controller::{
    DeviceController, NocChainOutcome, PairingEvent, PairingRequest, RawSession,
    SubscribeRequest, SubscriptionEvent,
};
pub use controller_cluster::ControllerClusterClient;
pub use error::{
    CommissioningError, ControllerError, WalkAbort, NOC_ERROR_CREDENTIAL_SERVICE,
    NOC_ERROR_INTERNAL, NOC_ERROR_INVALID_STATE,
};
pub use issuer::{IssuedNoc, OperationalCredentialIssuer, ISSUED_ID_HISTORY};
pub use session::{DeviceSessionHandle, SessionRegistry};
pub use subscription::{SubscriptionHandle, SubscriptionManager};
pub use tlv::{TlvError, TlvValue};
pub use topology::{has_bridge, TopologyDiscoverer, DEFAULT_MAX_DEPTH};
pub use types::{
    AccessControlEntry, AccessControlTarget, AttestationInfo, AttributeId, AttributePath,
    AuthMode, ClusterId, CommandId, CommandPath, CsrInfo, DeviceMatterInfo, EndpointId, EventId,
    EventPath, FabricIdentity, NocChain, NodeId, Privilege,
};
