//! Commissioning state machine.
//!
//! ```text
//! Idle ──► Discovering ──► SecurePairing ──► CredentialIssuance
//!                                                   │
//!   Complete ◄── AclReconciliation ◄── TopologyDiscovery ◄── FabricJoinPending
//!
//! any non-terminal state ──► Failed
//! ```
//!
//! The attempt is cancellable until it enters `FabricJoinPending`. After
//! that the device may already hold the NOC, so the attempt runs to an end.
use std::fmt::Display;

use tracing::info;

use crate::core::CommissioningError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommissioningState {
    Idle,
    /// Resolving the device address from its discriminator.
    Discovering,
    /// PASE in progress.
    SecurePairing,
    /// CSR received, NOC being issued.
    CredentialIssuance,
    /// NOC handed back, waiting for the fabric join result.
    FabricJoinPending,
    TopologyDiscovery,
    AclReconciliation,
    Complete,
    Failed,
}

impl Display for CommissioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            CommissioningState::Idle => "Idle",
            CommissioningState::Discovering => "Discovering",
            CommissioningState::SecurePairing => "SecurePairing",
            CommissioningState::CredentialIssuance => "CredentialIssuance",
            CommissioningState::FabricJoinPending => "FabricJoinPending",
            CommissioningState::TopologyDiscovery => "TopologyDiscovery",
            CommissioningState::AclReconciliation => "AclReconciliation",
            CommissioningState::Complete => "Complete",
            CommissioningState::Failed => "Failed",
        };
        write!(f, "{state}")
    }
}

impl CommissioningState {
    pub fn is_terminal(self) -> bool {
        matches!(self, CommissioningState::Complete | CommissioningState::Failed)
    }

    /// Whether the device may already hold a NOC from this attempt.
    pub fn is_past_join(self) -> bool {
        matches!(
            self,
            CommissioningState::FabricJoinPending
                | CommissioningState::TopologyDiscovery
                | CommissioningState::AclReconciliation
                | CommissioningState::Complete
        )
    }

    fn next(self) -> Option<CommissioningState> {
        use CommissioningState::*;
        match self {
            Idle => Some(Discovering),
            Discovering => Some(SecurePairing),
            SecurePairing => Some(CredentialIssuance),
            CredentialIssuance => Some(FabricJoinPending),
            FabricJoinPending => Some(TopologyDiscovery),
            TopologyDiscovery => Some(AclReconciliation),
            AclReconciliation => Some(Complete),
            Complete | Failed => None,
        }
    }
}

/// State of one commissioning attempt plus the states it went through.
#[derive(Debug, Clone)]
pub struct CommissioningStateMachine {
    state: CommissioningState,
    history: Vec<CommissioningState>,
}

impl Default for CommissioningStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl CommissioningStateMachine {
    pub fn new() -> Self {
        Self {
            state: CommissioningState::Idle,
            history: vec![CommissioningState::Idle],
        }
    }

    pub fn current_state(&self) -> CommissioningState {
        self.state
    }

    /// Every state entered so far, oldest first.
    pub fn history(&self) -> &[CommissioningState] {
        &self.history
    }

    pub fn has_entered(&self, state: CommissioningState) -> bool {
        self.history.contains(&state)
    }

    pub fn is_cancellable(&self) -> bool {
        !self.state.is_terminal() && !self.state.is_past_join()
    }

    /// Move to `to`, which must be the next stage or `Failed`.
    pub fn transition(&mut self, to: CommissioningState) -> Result<(), CommissioningError> {
        let allowed = match to {
            CommissioningState::Failed => !self.state.is_terminal(),
            to => self.state.next() == Some(to),
        };
        if !allowed {
            return Err(CommissioningError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        info!("[transition] {} -> {to}", self.state);
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Enter `Failed`. Returns false if the attempt had already ended.
    pub fn fail(&mut self) -> bool {
        self.transition(CommissioningState::Failed).is_ok()
    }
}
