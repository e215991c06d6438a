//! Device session handles.
//!
//! [`SessionRegistry`] turns a node id into a live [`DeviceSessionHandle`].
//! It keeps at most one live handle per node: concurrent `resolve` calls for
//! the same node queue on a per-node slot and the later callers receive the
//! handle the first one established.
//!
//! ```text
//! resolve(node) ──► slot(node).lock() ──► live handle? ──yes──► clone
//!                                              │
//!                                              no
//!                                              ▼
//!                                      controller.connect(node)
//! ```
//!
//! There is no implicit retry. A failed `connect` surfaces as
//! `ConnectionUnavailable` and the caller decides whether to resolve again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::controller::{DeviceController, RawSession};
use crate::core::error::CommissioningError;
use crate::core::types::NodeId;

/// Live connection to one device.
///
/// Clones share the same liveness: invalidating the session through the
/// registry (or observing a stale session on the wire) makes every clone
/// stale.
#[derive(Clone, Debug)]
pub struct DeviceSessionHandle {
    node_id: NodeId,
    raw: RawSession,
    generation: u64,
    alive: CancellationToken,
}

impl DeviceSessionHandle {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Registry-wide sequence number of the connect that produced this handle.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_live(&self) -> bool {
        !self.alive.is_cancelled()
    }

    /// The raw session, if the handle is still live.
    pub fn session(&self) -> Result<RawSession, CommissioningError> {
        if self.is_live() {
            Ok(self.raw)
        } else {
            Err(CommissioningError::StaleHandle {
                node_id: self.node_id,
            })
        }
    }

    /// Mark the handle stale, e.g. after the controller rejected its session.
    pub fn mark_stale(&self) {
        self.alive.cancel();
    }

    /// Resolves when the handle becomes stale.
    pub async fn invalidated(&self) {
        self.alive.cancelled().await;
    }
}

type Slot = Arc<tokio::sync::Mutex<Option<DeviceSessionHandle>>>;

pub struct SessionRegistry<C: DeviceController> {
    controller: Arc<C>,
    slots: Mutex<HashMap<NodeId, Slot>>,
    generation: AtomicU64,
}

impl<C: DeviceController> SessionRegistry<C> {
    pub fn new(controller: Arc<C>) -> Self {
        Self {
            controller,
            slots: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    fn slot(&self, node_id: NodeId) -> Slot {
        // The map lock is never held across an await.
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        slots.entry(node_id).or_default().clone()
    }

    /// Resolve a live handle for the node, connecting if needed.
    pub async fn resolve(&self, node_id: NodeId) -> Result<DeviceSessionHandle, CommissioningError> {
        let slot = self.slot(node_id);
        let mut current = slot.lock().await;

        if let Some(handle) = current.as_ref() {
            if handle.is_live() {
                debug!("[resolve]: Reusing session for node {node_id}");
                return Ok(handle.clone());
            }
            debug!("[resolve]: Dropping stale session for node {node_id}");
            self.controller.release(handle.raw).await;
            *current = None;
        }

        let raw = self
            .controller
            .connect(node_id)
            .await
            .map_err(|source| CommissioningError::ConnectionUnavailable { node_id, source })?;

        let handle = DeviceSessionHandle {
            node_id,
            raw,
            generation: self.generation.fetch_add(1, Ordering::Relaxed) + 1,
            alive: CancellationToken::new(),
        };
        info!(
            "[resolve]: Connected to node {node_id} (session {}, generation {})",
            raw.0, handle.generation
        );
        *current = Some(handle.clone());
        Ok(handle)
    }

    /// The current handle for the node without connecting.
    pub async fn current(&self, node_id: NodeId) -> Option<DeviceSessionHandle> {
        let slot = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&node_id)
            .cloned()?;
        let current = slot.lock().await;
        current.as_ref().filter(|h| h.is_live()).cloned()
    }

    /// Tear down the node's session. Every clone of its handle becomes stale.
    pub async fn invalidate(&self, node_id: NodeId) {
        let slot = self.slot(node_id);
        let mut current = slot.lock().await;
        if let Some(handle) = current.take() {
            info!("[invalidate]: Releasing session for node {node_id}");
            handle.mark_stale();
            self.controller.release(handle.raw).await;
        }

        // Forget the slot unless another resolve already queued on it. New
        // callers clone slots under the map lock, so the count is stable here.
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let unused = slots
            .get(&node_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &slot) && Arc::strong_count(&slot) == 2);
        if unused {
            slots.remove(&node_id);
        }
    }

    /// Number of nodes with a session slot.
    pub fn tracked_nodes(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Invalidate every session, e.g. on process teardown.
    pub async fn invalidate_all(&self) {
        let nodes: Vec<NodeId> = {
            let slots = self
                .slots
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slots.keys().copied().collect()
        };
        for node_id in nodes {
            self.invalidate(node_id).await;
        }
    }
}
