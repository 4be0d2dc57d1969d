//! OAuth2 device authorization grant against the Microsoft identity platform.
//!
//! Two calls only: one to start a flow and one to poll it once. Polling is
//! driven by the user, so nothing here loops, sleeps, or retries.

use crate::auth::token::AccessToken;
use crate::config::{AuthConfig, HttpConfig};
use crate::error::AuthError;
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use tracing::{debug, error};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Grant type for redeeming a device code.
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Lifetime assumed when the provider omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECONDS: i64 = 900;

/// Device authorization response.
#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    device_code: String,
    user_code: String,
    message: String,
    #[serde(default)]
    verification_uri: Option<String>,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    interval: Option<u64>,
}

/// Opaque handle the poll call needs to resolve to the same flow.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
struct ContinuationHandle(String);

impl fmt::Debug for ContinuationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ContinuationHandle([redacted])")
    }
}

/// A started device-code flow waiting for the user to sign in elsewhere.
#[derive(Debug, Clone)]
pub struct DeviceFlow {
    /// Short code the user types on the verification page.
    pub user_code: String,
    pub verification_uri: Option<String>,
    /// Verification URI with the user code already filled in.
    pub verification_uri_complete: Option<String>,
    /// Full human-readable instructions from the provider.
    pub message: String,
    pub expires_at: DateTime<Utc>,
    /// Minimum seconds between polls, when the provider states one.
    pub interval: Option<u64>,
    handle: ContinuationHandle,
}

impl DeviceFlow {
    /// Fails when `expires_in` is not a positive lifetime that fits a timestamp.
    fn from_response(response: DeviceCodeResponse, now: DateTime<Utc>) -> Result<Self, AuthError> {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECONDS);
        let expires_at = Some(expires_in)
            .filter(|secs| *secs > 0)
            .and_then(Duration::try_seconds)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                AuthError::FlowInitiation(format!("invalid expires_in {}", expires_in))
            })?;

        Ok(Self {
            user_code: response.user_code,
            verification_uri: response.verification_uri.filter(|u| !u.is_empty()),
            verification_uri_complete: response
                .verification_uri_complete
                .filter(|u| !u.is_empty()),
            message: response.message,
            expires_at,
            interval: response.interval,
            handle: ContinuationHandle(response.device_code),
        })
    }

    /// Link to show the user: the pre-filled URI, else the bare URI, else `default`.
    pub fn login_url<'a>(&'a self, default: &'a str) -> &'a str {
        self.verification_uri_complete
            .as_deref()
            .or(self.verification_uri.as_deref())
            .unwrap_or(default)
    }

    /// Whether the provider will have stopped accepting this code.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    fn device_code(&self) -> &str {
        self.handle.0.as_str()
    }
}

/// Result of one poll that did not fail outright.
#[derive(Debug)]
pub enum PollResponse {
    /// The user finished signing in.
    Token(AccessToken),
    /// No token yet. Shown to the user as a warning.
    Waiting(PollWarning),
}

impl PollResponse {
    /// Interpret a token endpoint body.
    fn from_json(value: &Value) -> Self {
        if let Some(token) = value
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        {
            let expires_in = value.get("expires_in").and_then(Value::as_u64);
            return Self::Token(AccessToken::new(token, expires_in));
        }

        match value.get("error").and_then(Value::as_str) {
            Some(code) => Self::Waiting(PollWarning {
                code: Some(code.to_string()),
                description: value
                    .get("error_description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            }),
            None => Self::Waiting(PollWarning {
                code: None,
                description: value.to_string(),
            }),
        }
    }
}

/// Provider error code and description from a poll without a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollWarning {
    pub code: Option<String>,
    pub description: String,
}

impl PollWarning {
    /// True while the user simply has not finished signing in yet.
    pub fn is_pending(&self) -> bool {
        matches!(
            self.code.as_deref(),
            Some("authorization_pending") | Some("slow_down")
        )
    }
}

impl fmt::Display for PollWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.description),
            None => f.write_str(&self.description),
        }
    }
}

/// Client for the device-code and token endpoints of one tenant.
pub struct DeviceCodeClient {
    client_id: String,
    device_code_url: String,
    token_url: String,
    http_client: reqwest::Client,
}

impl DeviceCodeClient {
    /// Create a new device-code client from configuration.
    pub fn new(auth: &AuthConfig, http: &HttpConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(http.device_flow_timeout)
            .connect_timeout(http.connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client_id: auth.client_id.clone(),
            device_code_url: auth.device_code_url(),
            token_url: auth.token_url(),
            http_client,
        })
    }

    /// Start a new device-code flow for `scopes`.
    ///
    /// A response without an instruction message or without a user code is
    /// rejected with the raw response attached.
    pub async fn initiate(&self, scopes: &[String]) -> Result<DeviceFlow, AuthError> {
        let scope = scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("scope", scope.as_str()),
        ];

        debug!("Requesting device code from {}", self.device_code_url);

        let response = self
            .http_client
            .post(&self.device_code_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let value: Value = serde_json::from_str(&body).map_err(|_| {
            error!("Device code request returned non-JSON: HTTP {}", status);
            AuthError::FlowInitiation(format!("HTTP {} {}", status.as_u16(), body))
        })?;

        if value.get("message").is_none() {
            error!("Device code request failed: HTTP {} - {}", status, value);
            return Err(AuthError::FlowInitiation(value.to_string()));
        }

        let parsed: DeviceCodeResponse = serde_json::from_value(value)
            .map_err(|e| AuthError::FlowInitiation(format!("malformed response: {}", e)))?;

        if parsed.user_code.trim().is_empty() {
            return Err(AuthError::FlowInitiation(
                "response carried an empty user_code".to_string(),
            ));
        }

        DeviceFlow::from_response(parsed, Utc::now()).map_err(|e| {
            error!("Device code response rejected: {}", e);
            e
        })
    }

    /// Ask the token endpoint once whether `flow` has been completed.
    ///
    /// The body is read as JSON whatever the status, because the endpoint
    /// answers "not yet" with HTTP 400.
    pub async fn poll(&self, flow: &DeviceFlow) -> Result<PollResponse, AuthError> {
        let params = [
            ("grant_type", DEVICE_CODE_GRANT),
            ("client_id", self.client_id.as_str()),
            ("device_code", flow.device_code()),
        ];

        debug!("Polling token endpoint {}", self.token_url);

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(PollResponse::from_json(&value)),
            Err(_) => {
                error!("Token endpoint returned non-JSON: HTTP {}", status);
                Err(AuthError::InvalidTokenResponse(format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    body
                )))
            }
        }
    }
}

#[cfg(test)]
impl DeviceFlow {
    /// A flow as the provider would return it for `user_code`.
    pub(crate) fn sample(user_code: &str) -> Self {
        Self::from_response(
            DeviceCodeResponse {
                device_code: "device-code-1".into(),
                user_code: user_code.into(),
                message: format!("Enter the code {} to authenticate.", user_code),
                verification_uri: Some("https://microsoft.com/devicelogin".into()),
                verification_uri_complete: None,
                expires_in: Some(900),
                interval: Some(5),
            },
            Utc::now(),
        )
        .unwrap()
    }
}
