//! Description of a simulated device: identity, pairing behaviour and the
//! endpoint graph its Descriptor clusters report.

use std::collections::BTreeMap;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

use crate::core::clusters::{
    access_control, basic_information, descriptor, device_types, operational_credentials,
};
use crate::core::{AccessControlEntry, EndpointId};

pub const DEFAULT_PASSCODE: u32 = 20202021;
pub const DEFAULT_DISCRIMINATOR: u16 = 3840;
pub const MATTER_PORT: u16 = 5540;

const ON_OFF_LIGHT: u32 = 0x0100;
const ON_OFF_CLUSTER: u64 = 0x0006;
const BRIDGED_DEVICE_BASIC_INFORMATION: u64 = 0x0039;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SimEndpoint {
    pub device_types: Vec<u32>,
    pub server_clusters: Vec<u64>,
    pub client_clusters: Vec<u64>,
    pub parts: Vec<EndpointId>,
}

impl SimEndpoint {
    pub fn new(device_types: Vec<u32>, server_clusters: Vec<u64>) -> Self {
        Self {
            device_types,
            server_clusters,
            ..Default::default()
        }
    }

    pub fn with_parts(mut self, parts: Vec<EndpointId>) -> Self {
        self.parts = parts;
        self
    }

    fn root() -> Self {
        Self::new(
            vec![device_types::ROOT_NODE],
            vec![
                descriptor::CLUSTER_ID.into(),
                access_control::CLUSTER_ID.into(),
                basic_information::CLUSTER_ID.into(),
                operational_credentials::CLUSTER_ID.into(),
            ],
        )
    }

    fn light() -> Self {
        Self::new(
            vec![ON_OFF_LIGHT],
            vec![descriptor::CLUSTER_ID.into(), ON_OFF_CLUSTER],
        )
    }
}

#[derive(Clone, Debug)]
pub struct SimDevice {
    pub address: SocketAddr,
    pub discriminator: u16,
    pub passcode: u32,
    /// Forced PASE result; zero lets the passcode decide.
    pub pairing_code: u32,
    /// Forced fabric join result.
    pub commissioning_code: u32,
    /// How many CSRs the device emits. More than one is misbehaviour.
    pub csr_count: usize,
    pub product_name: Option<String>,
    pub endpoints: BTreeMap<EndpointId, SimEndpoint>,
    /// ACL present before commissioning.
    pub acl: Vec<AccessControlEntry>,
    /// Install the admin entry for the commissioner's fabric on join.
    pub grant_admin_entry: bool,
}

impl Default for SimDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SimDevice {
    /// A plain node with only its root endpoint.
    pub fn new() -> Self {
        Self {
            address: SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 0x10),
                MATTER_PORT,
                0,
                0,
            )),
            discriminator: DEFAULT_DISCRIMINATOR,
            passcode: DEFAULT_PASSCODE,
            pairing_code: 0,
            commissioning_code: 0,
            csr_count: 1,
            product_name: Some("Sim Node".to_string()),
            endpoints: BTreeMap::from([(0, SimEndpoint::root())]),
            acl: Vec::new(),
            grant_admin_entry: true,
        }
    }

    /// A light: root endpoint plus one on/off endpoint.
    pub fn light() -> Self {
        let mut device = Self::new().with_product_name(Some("Sim Light"));
        device.endpoints = BTreeMap::from([
            (0, SimEndpoint::root().with_parts(vec![1])),
            (1, SimEndpoint::light()),
        ]);
        device
    }

    /// A bridge: endpoint 1 is an aggregator over two bridged lights.
    ///
    /// Like real bridges, endpoint 0 lists every endpoint, so the lights are
    /// reachable through two parents.
    pub fn bridge() -> Self {
        let bridged = || {
            let mut light = SimEndpoint::light();
            light.server_clusters.push(BRIDGED_DEVICE_BASIC_INFORMATION);
            light
        };
        let mut device = Self::new().with_product_name(Some("Sim Bridge"));
        device.endpoints = BTreeMap::from([
            (0, SimEndpoint::root().with_parts(vec![1, 2, 3])),
            (
                1,
                SimEndpoint::new(
                    vec![device_types::AGGREGATOR],
                    vec![descriptor::CLUSTER_ID.into()],
                )
                .with_parts(vec![2, 3]),
            ),
            (2, bridged()),
            (3, bridged()),
        ]);
        device
    }

    pub fn with_endpoint(mut self, id: EndpointId, endpoint: SimEndpoint) -> Self {
        self.endpoints.insert(id, endpoint);
        self
    }

    /// Replace the PartsList of an existing endpoint (or add a bare one).
    pub fn with_parts(mut self, id: EndpointId, parts: Vec<EndpointId>) -> Self {
        self.endpoints.entry(id).or_default().parts = parts;
        self
    }

    pub fn with_passcode(mut self, passcode: u32) -> Self {
        self.passcode = passcode;
        self
    }

    pub fn with_pairing_code(mut self, code: u32) -> Self {
        self.pairing_code = code;
        self
    }

    pub fn with_commissioning_code(mut self, code: u32) -> Self {
        self.commissioning_code = code;
        self
    }

    pub fn with_csr_count(mut self, count: usize) -> Self {
        self.csr_count = count;
        self
    }

    pub fn with_product_name(mut self, name: Option<&str>) -> Self {
        self.product_name = name.map(str::to_string);
        self
    }

    pub fn with_acl(mut self, acl: Vec<AccessControlEntry>) -> Self {
        self.acl = acl;
        self
    }

    pub fn without_admin_grant(mut self) -> Self {
        self.grant_admin_entry = false;
        self
    }
}
