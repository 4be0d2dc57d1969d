//! Access token held for the lifetime of one signed-in session.

use std::fmt;
use zeroize::Zeroizing;

/// Bearer token returned by a successful device-code poll.
///
/// Never refreshed. The value is wiped from memory when the token is dropped.
#[derive(Clone)]
pub struct AccessToken {
    value: Zeroizing<String>,
    /// Lifetime reported by the provider, in seconds.
    pub expires_in: Option<u64>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_in: Option<u64>) -> Self {
        Self {
            value: Zeroizing::new(value.into()),
            expires_in,
        }
    }

    /// The raw token, for the `Authorization` header only.
    pub fn secret(&self) -> &str {
        self.value.as_str()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"[redacted]")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
