//! Matter device onboarding.
//!
//! Commissions devices into a fabric and prepares them for operation:
//! secure pairing, operational credential issuance through a remote
//! credential service, fabric join, endpoint topology discovery, access
//! control reconciliation and attribute subscriptions.
//!
//! - [`core`]: pipeline components and the device controller contract
//! - [`app`]: the commissioning state machine and its driver
//! - [`sim`]: a simulated device controller for development and tests

pub mod app;
pub mod core;
pub mod logging;
pub mod sim;
