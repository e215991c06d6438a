//! Commands of the vendor controller cluster.
//!
//! Controller-capable devices expose a cluster through which the app hands
//! them cloud credentials so they can operate other nodes on the fabric.

use crate::core::cluster_client::ClusterClient;
use crate::core::clusters::controller;
use crate::core::controller::DeviceController;
use crate::core::error::CommissioningError;
use crate::core::session::DeviceSessionHandle;
use crate::core::tlv::TlvValue;
use crate::core::types::{CommandId, CommandPath, EndpointId};

pub struct ControllerClusterClient<'a, C: DeviceController> {
    client: &'a ClusterClient<C>,
    handle: &'a DeviceSessionHandle,
    endpoint: EndpointId,
}

impl<'a, C: DeviceController> ControllerClusterClient<'a, C> {
    pub fn new(
        client: &'a ClusterClient<C>,
        handle: &'a DeviceSessionHandle,
        endpoint: EndpointId,
    ) -> Self {
        Self {
            client,
            handle,
            endpoint,
        }
    }

    async fn invoke(&self, command: CommandId, fields: TlvValue) -> Result<(), CommissioningError> {
        let path = CommandPath::new(self.endpoint, controller::CLUSTER_ID, command);
        self.client.invoke(self.handle, path, fields).await?;
        Ok(())
    }

    fn string_arg(value: &str) -> TlvValue {
        TlvValue::Struct(vec![(0, TlvValue::Utf8(value.to_string()))])
    }

    /// Append a chunk of the cloud refresh token.
    pub async fn append_refresh_token(&self, chunk: &str) -> Result<(), CommissioningError> {
        self.invoke(controller::CMD_APPEND_REFRESH_TOKEN, Self::string_arg(chunk))
            .await
    }

    pub async fn reset_refresh_token(&self) -> Result<(), CommissioningError> {
        self.invoke(controller::CMD_RESET_REFRESH_TOKEN, TlvValue::empty_struct())
            .await
    }

    /// Let the device authorize itself against the cloud endpoint.
    pub async fn authorize_device(&self, endpoint_url: &str) -> Result<(), CommissioningError> {
        self.invoke(controller::CMD_AUTHORIZE_DEVICE, Self::string_arg(endpoint_url))
            .await
    }

    pub async fn update_user_noc(&self) -> Result<(), CommissioningError> {
        self.invoke(controller::CMD_UPDATE_USER_NOC, TlvValue::empty_struct())
            .await
    }

    pub async fn update_device_list(&self) -> Result<(), CommissioningError> {
        self.invoke(controller::CMD_UPDATE_DEVICE_LIST, TlvValue::empty_struct())
            .await
    }

    /// Reset, then send the token in chunks of at most `chunk_len` bytes.
    pub async fn send_refresh_token(
        &self,
        token: &str,
        chunk_len: usize,
    ) -> Result<(), CommissioningError> {
        self.reset_refresh_token().await?;
        let mut rest = token;
        while !rest.is_empty() {
            let mut end = chunk_len.max(1).min(rest.len());
            while !rest.is_char_boundary(end) {
                end -= 1;
            }
            if end == 0 {
                end = rest.chars().next().map_or(rest.len(), char::len_utf8);
            }
            let (chunk, tail) = rest.split_at(end);
            self.append_refresh_token(chunk).await?;
            rest = tail;
        }
        Ok(())
    }
}
