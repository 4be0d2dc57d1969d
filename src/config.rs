//! Configuration loading and management.
//!
//! Loads defaults from the embedded config.toml and the tenant/client identifiers
//! (plus optional overrides) from the environment.

use crate::error::AppError;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use url::Url;

/// Embedded configuration file content.
const CONFIG_TOML: &str = include_str!("../config.toml");

/// Shown when either identifier is missing.
pub const MISSING_IDENTIFIERS: &str = "Missing TENANT_ID or CLIENT_ID in environment (.env).";

/// Embedded defaults, as written in config.toml.
#[derive(Debug, Clone, Deserialize)]
struct FileConfig {
    oauth: OAuthDefaults,
    api: ApiConfig,
    http: HttpFileConfig,
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct OAuthDefaults {
    authority_host: String,
    scopes: Vec<String>,
    default_verification_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub graph_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpFileConfig {
    device_flow_timeout_seconds: u64,
    graph_timeout_seconds: u64,
    connect_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// Root configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub auth: AuthConfig,
    pub api: ApiConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Identity-provider settings for the device-code flow. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub tenant_id: String,
    pub client_id: String,
    /// `{authority_host}/{tenant_id}`
    pub authority_url: String,
    pub scopes: Vec<String>,
    /// Last-resort sign-in link when the provider supplies none.
    pub default_verification_uri: String,
}

impl AuthConfig {
    /// Device authorization endpoint.
    pub fn device_code_url(&self) -> String {
        format!("{}/oauth2/v2.0/devicecode", self.authority_url)
    }

    /// Token endpoint polled with the device code.
    pub fn token_url(&self) -> String {
        format!("{}/oauth2/v2.0/token", self.authority_url)
    }
}

/// Outbound HTTP timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub device_flow_timeout: Duration,
    pub graph_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Config {
    /// Load configuration from the embedded config.toml and the process environment.
    pub fn load() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration using `lookup` in place of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file: FileConfig = toml::from_str(CONFIG_TOML)
            .map_err(|e| AppError::Config(format!("Failed to parse embedded config.toml: {}", e)))?;

        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (tenant_id, client_id) = match (required("TENANT_ID"), required("CLIENT_ID")) {
            (Some(tenant), Some(client)) => (tenant, client),
            _ => return Err(AppError::Config(MISSING_IDENTIFIERS.to_string())),
        };

        let authority_host = match lookup("AUTHORITY_HOST") {
            Some(host) => validate_url("AUTHORITY_HOST", &host)?,
            None => file.oauth.authority_host,
        };

        let graph_base_url = match lookup("GRAPH_BASE_URL") {
            Some(base) => validate_url("GRAPH_BASE_URL", &base)?,
            None => file.api.graph_base_url,
        };

        let device_flow_timeout = match lookup("DEVICE_FLOW_TIMEOUT_SECONDS") {
            Some(v) => parse_seconds("DEVICE_FLOW_TIMEOUT_SECONDS", &v)?,
            None => file.http.device_flow_timeout_seconds,
        };

        let graph_timeout = match lookup("GRAPH_TIMEOUT_SECONDS") {
            Some(v) => parse_seconds("GRAPH_TIMEOUT_SECONDS", &v)?,
            None => file.http.graph_timeout_seconds,
        };

        let authority_url = format!("{}/{}", authority_host.trim_end_matches('/'), tenant_id);

        Ok(Self {
            auth: AuthConfig {
                tenant_id,
                client_id,
                authority_url,
                scopes: file.oauth.scopes,
                default_verification_uri: file.oauth.default_verification_uri,
            },
            api: ApiConfig {
                graph_base_url: graph_base_url.trim_end_matches('/').to_string(),
            },
            http: HttpConfig {
                device_flow_timeout: Duration::from_secs(device_flow_timeout),
                graph_timeout: Duration::from_secs(graph_timeout),
                connect_timeout: Duration::from_secs(file.http.connect_timeout_seconds),
            },
            logging: file.logging,
        })
    }

    /// The Graph endpoint for the signed-in user.
    pub fn me_url(&self) -> String {
        format!("{}/me", self.api.graph_base_url)
    }
}

fn validate_url(key: &str, value: &str) -> Result<String, AppError> {
    let url = Url::parse(value.trim())
        .map_err(|e| AppError::Config(format!("{} is not a valid URL: {}", key, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(AppError::Config(format!(
            "{} must be an http(s) URL, got {}",
            key,
            url.scheme()
        )));
    }

    Ok(value.trim().to_string())
}

fn parse_seconds(key: &str, value: &str) -> Result<u64, AppError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(secs),
        _ => Err(AppError::Config(format!(
            "{} must be a positive number of seconds, got {:?}",
            key, value
        ))),
    }
}
