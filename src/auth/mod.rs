//! Microsoft identity platform integration.
//!
//! Provides the OAuth2 device-code client and the Microsoft Graph API client.

pub mod device_flow;
pub mod graph;
pub mod token;

pub use device_flow::{DeviceCodeClient, DeviceFlow, PollResponse, PollWarning};
pub use graph::{GraphClient, Identity};
pub use token::AccessToken;
