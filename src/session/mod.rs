//! Per-session sign-in state and the controller that moves it.

pub mod controller;
pub mod state;

pub use controller::{CheckOutcome, DeviceFlowController};
pub use state::{Phase, SessionState};
