//! Commissioning orchestration.
//!
//! - [`Commissioner`] drives one device through pairing, credential issuance,
//!   fabric join, topology discovery and ACL reconciliation
//! - [`CommissioningStateMachine`] tracks and validates the stages
//! - [`CommissioningEventHandler`] is the upstream reporting seam
//!
//! ```ignore
//! let commissioner = Commissioner::new(controller, credentials, keystore, handler, config);
//! let report = commissioner.commission(request, CancellationToken::new()).await?;
//! ```

mod commissioner;
mod config;
mod events;
mod state_machine;

pub use commissioner::{
    Commissioner, CommissioningReport, CommissioningRequest, DeviceTarget, DEFAULT_DEVICE_NAME,
};
pub use config::{CommissionerConfig, ConfigError};
pub use events::CommissioningEventHandler;
pub use state_machine::{CommissioningState, CommissioningStateMachine};
