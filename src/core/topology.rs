//! Endpoint/cluster topology discovery.
//!
//! Starting at the root endpoint, the Descriptor cluster of every endpoint is
//! read and the walk descends into its PartsList, depth first in PartsList
//! order. One [`DeviceMatterInfo`] is produced per endpoint.
//!
//! Endpoint 0 usually lists every endpoint of the node, and aggregators list
//! their bridged children again, so an endpoint reached a second time through
//! a different parent is skipped. An endpoint that lists one of its own
//! ancestors is a cycle and aborts the walk, as does exceeding the configured
//! depth. Any read failure also aborts the whole walk; no partial map is
//! returned.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::core::cluster_client::ClusterClient;
use crate::core::clusters::{self, descriptor, device_types, ROOT_ENDPOINT};
use crate::core::controller::DeviceController;
use crate::core::error::{CommissioningError, WalkAbort};
use crate::core::session::DeviceSessionHandle;
use crate::core::tlv::TlvValue;
use crate::core::types::{AttributePath, DeviceMatterInfo, EndpointId};

pub const DEFAULT_MAX_DEPTH: usize = 8;

pub struct TopologyDiscoverer<C: DeviceController> {
    client: ClusterClient<C>,
    max_depth: usize,
}

impl<C: DeviceController> TopologyDiscoverer<C> {
    pub fn new(client: ClusterClient<C>, max_depth: usize) -> Self {
        Self { client, max_depth }
    }

    /// Walk the node's endpoint graph and return its capability map.
    pub async fn discover(
        &self,
        handle: &DeviceSessionHandle,
    ) -> Result<Vec<DeviceMatterInfo>, CommissioningError> {
        let mut infos = Vec::new();
        let mut visited: HashSet<EndpointId> = HashSet::new();
        // (endpoint, ancestors from the root down to its parent)
        let mut stack: Vec<(EndpointId, Vec<EndpointId>)> = vec![(ROOT_ENDPOINT, Vec::new())];

        while let Some((endpoint, ancestors)) = stack.pop() {
            if ancestors.len() > self.max_depth {
                return Err(CommissioningError::TopologyWalkAborted {
                    endpoint,
                    reason: WalkAbort::DepthExceeded {
                        max_depth: self.max_depth,
                    },
                });
            }
            if !visited.insert(endpoint) {
                debug!("[discover]: Endpoint {endpoint} already described, skipping");
                continue;
            }

            let info = self.describe(handle, endpoint).await.map_err(|e| {
                CommissioningError::TopologyWalkAborted {
                    endpoint,
                    reason: WalkAbort::Read(Box::new(e)),
                }
            })?;

            let mut path = ancestors;
            path.push(endpoint);
            if let Some(ancestor) = info.parts.iter().find(|part| path.contains(part)) {
                return Err(CommissioningError::TopologyWalkAborted {
                    endpoint,
                    reason: WalkAbort::Cycle {
                        ancestor: *ancestor,
                        path,
                    },
                });
            }

            // Reversed so the first part is popped first.
            for part in info.parts.iter().rev() {
                stack.push((*part, path.clone()));
            }
            infos.push(info);
        }

        info!(
            "[discover]: Node {} has {} endpoint(s)",
            handle.node_id(),
            infos.len()
        );
        Ok(infos)
    }

    async fn describe(
        &self,
        handle: &DeviceSessionHandle,
        endpoint: EndpointId,
    ) -> Result<DeviceMatterInfo, CommissioningError> {
        let path = |attribute| AttributePath::new(endpoint, descriptor::CLUSTER_ID, attribute);
        let (parts, device_types, server_clusters, client_clusters) = futures::try_join!(
            self.client
                .read_as(handle, path(descriptor::ATTR_PARTS_LIST), clusters::decode_parts),
            self.client.read_as(
                handle,
                path(descriptor::ATTR_DEVICE_TYPE_LIST),
                clusters::decode_device_types
            ),
            self.client
                .read_as(handle, path(descriptor::ATTR_SERVER_LIST), TlvValue::as_u64_list),
            self.client
                .read_as(handle, path(descriptor::ATTR_CLIENT_LIST), TlvValue::as_u64_list),
        )?;
        debug!(
            "[describe]: Endpoint {endpoint}: types {device_types:?}, {} server cluster(s), parts {parts:?}",
            server_clusters.len()
        );
        Ok(DeviceMatterInfo {
            endpoint_id: endpoint,
            device_types,
            server_clusters,
            client_clusters,
            parts,
        })
    }
}

/// Whether any endpoint is an aggregator (the node bridges other devices).
pub fn has_bridge(infos: &[DeviceMatterInfo]) -> bool {
    infos
        .iter()
        .any(|info| info.device_types.contains(&device_types::AGGREGATOR))
}
