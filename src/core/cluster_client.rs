//! Handle-checked read/write/invoke on top of the device controller.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::core::controller::DeviceController;
use crate::core::error::{CommissioningError, ControllerError};
use crate::core::session::DeviceSessionHandle;
use crate::core::tlv::{TlvError, TlvValue};
use crate::core::types::{AttributePath, CommandPath};

pub struct ClusterClient<C: DeviceController> {
    controller: Arc<C>,
    command_timeout: Duration,
}

impl<C: DeviceController> Clone for ClusterClient<C> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            command_timeout: self.command_timeout,
        }
    }
}

impl<C: DeviceController> ClusterClient<C> {
    pub fn new(controller: Arc<C>, command_timeout: Duration) -> Self {
        Self {
            controller,
            command_timeout,
        }
    }

    pub fn controller(&self) -> &Arc<C> {
        &self.controller
    }

    fn io_error(
        handle: &DeviceSessionHandle,
        path: String,
        source: ControllerError,
    ) -> CommissioningError {
        if let ControllerError::StaleSession(_) = source {
            handle.mark_stale();
            return CommissioningError::StaleHandle {
                node_id: handle.node_id(),
            };
        }
        CommissioningError::AttributeIOError { path, source }
    }

    pub async fn read(
        &self,
        handle: &DeviceSessionHandle,
        path: AttributePath,
    ) -> Result<TlvValue, CommissioningError> {
        let session = handle.session()?;
        debug!("[read]: node {} {path}", handle.node_id());
        self.controller
            .read_attribute(session, path)
            .await
            .map_err(|e| Self::io_error(handle, path.to_string(), e))
    }

    /// Read and decode in one step.
    pub async fn read_as<T>(
        &self,
        handle: &DeviceSessionHandle,
        path: AttributePath,
        decode: impl FnOnce(&TlvValue) -> Result<T, TlvError>,
    ) -> Result<T, CommissioningError> {
        let value = self.read(handle, path).await?;
        decode(&value).map_err(|source| CommissioningError::DecodeError {
            path: path.to_string(),
            source,
        })
    }

    pub async fn write(
        &self,
        handle: &DeviceSessionHandle,
        path: AttributePath,
        value: TlvValue,
    ) -> Result<(), CommissioningError> {
        let session = handle.session()?;
        debug!("[write]: node {} {path}", handle.node_id());
        self.controller
            .write_attribute(session, path, value)
            .await
            .map_err(|e| Self::io_error(handle, path.to_string(), e))
    }

    /// Invoke with the configured command timeout.
    pub async fn invoke(
        &self,
        handle: &DeviceSessionHandle,
        path: CommandPath,
        fields: TlvValue,
    ) -> Result<TlvValue, CommissioningError> {
        let session = handle.session()?;
        debug!("[invoke]: node {} {path}", handle.node_id());
        self.controller
            .invoke_command(session, path, fields, Some(self.command_timeout))
            .await
            .map_err(|e| Self::io_error(handle, path.to_string(), e))
    }
}
