//! Microsoft Graph API client for fetching the signed-in user's profile.

use crate::config::HttpConfig;
use crate::error::ApiError;
use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, error};

/// Microsoft Graph API client.
pub struct GraphClient {
    http_client: reqwest::Client,
}

impl GraphClient {
    /// Create a new Graph client.
    pub fn new(http: &HttpConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(http.graph_timeout)
            .connect_timeout(http.connect_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { http_client })
    }

    /// Issue one authenticated GET and return the JSON body as-is.
    ///
    /// Any status of 400 or above fails with the status and raw body. There is no
    /// retry, and an expired token (401) is reported like any other failure.
    pub async fn get(&self, url: &str, access_token: &str) -> Result<Value, ApiError> {
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        if status >= 400 {
            let body = response.text().await.unwrap_or_default();
            error!("Graph request failed: HTTP {}", status);
            return Err(ApiError::Http { status, body });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| ApiError::ParseFailed(e.to_string()))
    }

    /// Fetch the identity behind `access_token` from the `/me` endpoint at `me_url`.
    pub async fn get_identity(
        &self,
        me_url: &str,
        access_token: &str,
    ) -> Result<Identity, ApiError> {
        let me = self.get(me_url, access_token).await?;
        Identity::from_json(&me)
    }
}

/// Basic profile of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub display_name: String,
    pub user_principal_name: String,
    pub id: String,
}

impl Identity {
    /// Read the profile fields from a Graph `/me` body.
    ///
    /// Fields that are absent or null become empty strings.
    pub fn from_json(value: &Value) -> Result<Self, ApiError> {
        let object = value.as_object().ok_or_else(|| {
            ApiError::ParseFailed(format!("expected a JSON object, got {}", value))
        })?;

        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            display_name: field("displayName"),
            user_principal_name: field("userPrincipalName"),
            id: field("id"),
        })
    }
}
