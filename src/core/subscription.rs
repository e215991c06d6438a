//! Attribute subscriptions.
//!
//! A subscription lives as long as the session handle it was made on. Reports
//! and resubscription notices are surfaced as they come from the transport;
//! no backoff policy is applied here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info};

use crate::core::controller::{DeviceController, SubscribeRequest, SubscriptionEvent};
use crate::core::error::{CommissioningError, ControllerError};
use crate::core::session::DeviceSessionHandle;
use crate::core::types::{AttributePath, EventPath, NodeId};

/// Receiving end of one subscription.
#[derive(Debug)]
pub struct SubscriptionHandle {
    subscription_id: u32,
    session: DeviceSessionHandle,
    events: UnboundedReceiver<SubscriptionEvent>,
}

impl SubscriptionHandle {
    pub fn subscription_id(&self) -> u32 {
        self.subscription_id
    }

    pub fn node_id(&self) -> NodeId {
        self.session.node_id()
    }

    /// Next report or resubscription notice. `None` once the session handle
    /// is invalidated or the transport dropped the subscription.
    pub async fn next_event(&mut self) -> Option<SubscriptionEvent> {
        if !self.session.is_live() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.session.invalidated() => {
                debug!("[next_event]: Subscription {} ended with its session", self.subscription_id);
                None
            }
            event = self.events.recv() => event,
        }
    }
}

pub struct SubscriptionManager<C: DeviceController> {
    controller: Arc<C>,
}

impl<C: DeviceController> SubscriptionManager<C> {
    pub fn new(controller: Arc<C>) -> Self {
        Self { controller }
    }

    /// Subscribe to a batch of attribute paths.
    pub async fn subscribe(
        &self,
        handle: &DeviceSessionHandle,
        paths: Vec<AttributePath>,
        min_interval: Duration,
        max_interval: Duration,
    ) -> Result<SubscriptionHandle, CommissioningError> {
        self.subscribe_with_events(handle, paths, Vec::new(), min_interval, max_interval)
            .await
    }

    /// Subscribe to attribute and event paths in one request.
    pub async fn subscribe_with_events(
        &self,
        handle: &DeviceSessionHandle,
        attributes: Vec<AttributePath>,
        events: Vec<EventPath>,
        min_interval: Duration,
        max_interval: Duration,
    ) -> Result<SubscriptionHandle, CommissioningError> {
        if attributes.is_empty() && events.is_empty() {
            return Err(CommissioningError::InvalidSubscription(
                "no paths requested".to_string(),
            ));
        }
        if min_interval > max_interval {
            return Err(CommissioningError::InvalidSubscription(format!(
                "min interval {min_interval:?} exceeds max interval {max_interval:?}"
            )));
        }

        let session = handle.session()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let request = SubscribeRequest {
            attributes,
            events,
            min_interval,
            max_interval,
        };
        let path_count = request.attributes.len() + request.events.len();
        let subscription_id = self
            .controller
            .subscribe(session, request, tx)
            .await
            .map_err(|source| match source {
                ControllerError::StaleSession(_) => {
                    handle.mark_stale();
                    CommissioningError::StaleHandle {
                        node_id: handle.node_id(),
                    }
                }
                source => CommissioningError::AttributeIOError {
                    path: format!("subscribe({path_count} paths)"),
                    source,
                },
            })?;

        info!(
            "[subscribe]: Subscription {subscription_id} on node {} ({path_count} paths, {min_interval:?}..{max_interval:?})",
            handle.node_id()
        );
        Ok(SubscriptionHandle {
            subscription_id,
            session: handle.clone(),
            events: rx,
        })
    }
}
