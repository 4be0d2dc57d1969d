//! Authentication state for one logical user session.

use crate::auth::{AccessToken, DeviceFlow, Identity};

/// Where a session is in the sign-in flow.
///
/// The host creates one per user session and drops it when the session ends.
/// Only the controller moves it between phases.
#[derive(Debug, Clone, Default)]
pub enum SessionState {
    /// No flow has been started, or the user logged out.
    #[default]
    Unauthenticated,
    /// A flow has been started and the user has not finished signing in.
    Pending(DeviceFlow),
    /// Signed in and the profile has been fetched.
    Authenticated {
        token: AccessToken,
        identity: Identity,
    },
}

/// Phase of a [`SessionState`], without its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unauthenticated,
    Pending,
    Authenticated,
}

impl SessionState {
    /// Create a fresh, signed-out session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> Phase {
        match self {
            Self::Unauthenticated => Phase::Unauthenticated,
            Self::Pending(_) => Phase::Pending,
            Self::Authenticated { .. } => Phase::Authenticated,
        }
    }

    /// The active flow, while pending.
    pub fn flow(&self) -> Option<&DeviceFlow> {
        match self {
            Self::Pending(flow) => Some(flow),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            Self::Authenticated { token, .. } => Some(token),
            _ => None,
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Identity presence is the only signed-in marker.
    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    /// Drop the flow, token and identity (for log-out).
    pub fn clear(&mut self) {
        *self = Self::Unauthenticated;
    }
}
