//! Upstream notifications of a commissioning attempt.

use async_trait::async_trait;
use uuid::Uuid;

use crate::app::commissioner::CommissioningReport;
use crate::app::state_machine::CommissioningState;
use crate::core::CommissioningError;

/// Receives progress of commissioning attempts.
///
/// This is the seam to the orchestration layer (UI, push to the cloud
/// backend). Callbacks run on the attempt's task, in order.
#[async_trait]
pub trait CommissioningEventHandler: Send + Sync + 'static {
    /// Called on every state entered, `Failed` included.
    async fn on_state_changed(&self, attempt_id: Uuid, state: CommissioningState);

    /// Called once when the attempt reaches `Complete`.
    async fn on_complete(&self, report: &CommissioningReport);

    /// Called once when the attempt ends in `Failed`.
    async fn on_failed(&self, attempt_id: Uuid, error: &CommissioningError);
}
