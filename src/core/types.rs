//! Data model of the commissioning pipeline.

use std::fmt::Display;

use fabric_crypto::CategoryId;
use serde::Serialize;

pub type EndpointId = u16;
pub type ClusterId = u32;
pub type AttributeId = u32;
pub type CommandId = u32;
pub type EventId = u32;

/// 64-bit Matter operational node id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub u64);

impl Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Fabric the app commissions devices into.
///
/// Built once when the user selects a fabric and shared read-only with the
/// attempt that uses it.
#[derive(Clone, Debug)]
pub struct FabricIdentity {
    fabric_id: u64,
    group_id: String,
    root_certificate: Vec<u8>,
    ipk: Vec<u8>,
    admin_category: CategoryId,
    operate_category: CategoryId,
}

impl FabricIdentity {
    pub fn new(
        fabric_id: u64,
        group_id: &str,
        root_certificate: Vec<u8>,
        ipk: Vec<u8>,
        admin_category: CategoryId,
        operate_category: CategoryId,
    ) -> Self {
        Self {
            fabric_id,
            group_id: group_id.to_string(),
            root_certificate,
            ipk,
            admin_category,
            operate_category,
        }
    }

    pub fn fabric_id(&self) -> u64 {
        self.fabric_id
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// DER root certificate of the fabric.
    pub fn root_certificate(&self) -> &[u8] {
        &self.root_certificate
    }

    /// Identity protection key (epoch key 0 of the fabric group key set).
    pub fn ipk(&self) -> &[u8] {
        &self.ipk
    }

    /// Subject installed as CASE admin when the device joins.
    pub fn admin_category(&self) -> CategoryId {
        self.admin_category
    }

    /// Subject granted operate privilege by ACL reconciliation.
    pub fn operate_category(&self) -> CategoryId {
        self.operate_category
    }
}

/// Certificate signing request emitted by the device during commissioning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrInfo {
    /// DER encoded PKCS#10 request.
    pub csr: Vec<u8>,
    pub csr_nonce: Vec<u8>,
}

/// Device attestation material that accompanies the CSR.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttestationInfo {
    pub elements: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Certificates and key handed back to the pairing session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NocChain {
    pub operational_certificate: Vec<u8>,
    pub root_certificate: Vec<u8>,
    pub ipk: Vec<u8>,
}

/// Capabilities of one endpoint, as reported by its Descriptor cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMatterInfo {
    pub endpoint_id: EndpointId,
    pub device_types: Vec<u32>,
    pub server_clusters: Vec<u64>,
    pub client_clusters: Vec<u64>,
    pub parts: Vec<EndpointId>,
}

/// ACL privilege level. Unknown values are carried through untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Privilege(pub u8);

impl Privilege {
    pub const VIEW: Privilege = Privilege(1);
    pub const PROXY_VIEW: Privilege = Privilege(2);
    pub const OPERATE: Privilege = Privilege(3);
    pub const MANAGE: Privilege = Privilege(4);
    pub const ADMINISTER: Privilege = Privilege(5);
}

/// ACL authentication mode. `AuthMode(0)` only appears in degraded entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AuthMode(pub u8);

impl AuthMode {
    pub const PASE: AuthMode = AuthMode(1);
    pub const CASE: AuthMode = AuthMode(2);
    pub const GROUP: AuthMode = AuthMode(3);
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AccessControlTarget {
    pub cluster: Option<ClusterId>,
    pub endpoint: Option<EndpointId>,
    pub device_type: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AccessControlEntry {
    pub privilege: Privilege,
    pub auth_mode: AuthMode,
    /// `None` encodes a null subject list (wildcard).
    pub subjects: Option<Vec<u64>>,
    pub targets: Option<Vec<AccessControlTarget>>,
    pub fabric_index: u8,
}

impl AccessControlEntry {
    pub fn has_subject(&self, subject: u64) -> bool {
        self.subjects
            .as_ref()
            .is_some_and(|subjects| subjects.contains(&subject))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct AttributePath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
    pub attribute: AttributeId,
}

impl AttributePath {
    pub fn new(endpoint: EndpointId, cluster: ClusterId, attribute: AttributeId) -> Self {
        Self {
            endpoint,
            cluster,
            attribute,
        }
    }
}

impl Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{:#06x}/{:#06x}",
            self.endpoint, self.cluster, self.attribute
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CommandPath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
    pub command: CommandId,
}

impl CommandPath {
    pub fn new(endpoint: EndpointId, cluster: ClusterId, command: CommandId) -> Self {
        Self {
            endpoint,
            cluster,
            command,
        }
    }
}

impl Display for CommandPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{:#06x}/cmd {:#04x}",
            self.endpoint, self.cluster, self.command
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventPath {
    pub endpoint: EndpointId,
    pub cluster: ClusterId,
    pub event: EventId,
}

impl EventPath {
    pub fn new(endpoint: EndpointId, cluster: ClusterId, event: EventId) -> Self {
        Self {
            endpoint,
            cluster,
            event,
        }
    }
}
