//! Operational Credentials cluster operations used for rollback.

use tracing::info;

use crate::core::cluster_client::ClusterClient;
use crate::core::clusters::{operational_credentials, ROOT_ENDPOINT};
use crate::core::controller::DeviceController;
use crate::core::error::CommissioningError;
use crate::core::session::DeviceSessionHandle;
use crate::core::tlv::TlvValue;
use crate::core::types::{AttributePath, CommandPath};

// NOCResponse fields
const TAG_STATUS_CODE: u8 = 0;
const TAG_FABRIC_INDEX: u8 = 1;

/// Fabric index the device assigned to the accessing fabric.
pub async fn current_fabric_index<C: DeviceController>(
    client: &ClusterClient<C>,
    handle: &DeviceSessionHandle,
) -> Result<u8, CommissioningError> {
    client
        .read_as(
            handle,
            AttributePath::new(
                ROOT_ENDPOINT,
                operational_credentials::CLUSTER_ID,
                operational_credentials::ATTR_CURRENT_FABRIC_INDEX,
            ),
            TlvValue::as_u8,
        )
        .await
}

/// Remove a fabric from the device. The NOCResponse status must be zero.
pub async fn remove_fabric<C: DeviceController>(
    client: &ClusterClient<C>,
    handle: &DeviceSessionHandle,
    fabric_index: u8,
) -> Result<(), CommissioningError> {
    let path = CommandPath::new(
        ROOT_ENDPOINT,
        operational_credentials::CLUSTER_ID,
        operational_credentials::CMD_REMOVE_FABRIC,
    );
    let response = client
        .invoke(
            handle,
            path,
            TlvValue::Struct(vec![(0, TlvValue::UInt(fabric_index.into()))]),
        )
        .await?;

    let decode_error = |source| CommissioningError::DecodeError {
        path: path.to_string(),
        source,
    };
    let status = response
        .required(TAG_STATUS_CODE)
        .and_then(TlvValue::as_u64)
        .map_err(decode_error)?;
    if status != 0 {
        return Err(CommissioningError::CommandFailed {
            path: path.to_string(),
            status,
        });
    }
    let removed = response
        .field(TAG_FABRIC_INDEX)
        .map_err(decode_error)?
        .map(TlvValue::as_u8)
        .transpose()
        .map_err(decode_error)?;
    info!(
        "[remove_fabric]: Node {} left fabric index {}",
        handle.node_id(),
        removed.unwrap_or(fabric_index)
    );
    Ok(())
}
