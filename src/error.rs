//! Error types for the devicelogin application.
//!
//! Uses `thiserror` for library-style errors with automatic `Display` and `Error` implementations.
//! Every controller and client operation returns one of these instead of halting the page,
//! so the page decides how to present the failure.

use thiserror::Error;

/// Top-level application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Device-flow errors.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Device flow init failed: {0}")]
    FlowInitiation(String),

    #[error("No active login flow. Run \"start\" first.")]
    NoActiveFlow,

    #[error("Already signed in. Run \"logout\" first.")]
    AlreadyAuthenticated,

    #[error("Identity provider request failed: {0}")]
    RequestFailed(String),

    #[error("Unexpected token response: {0}")]
    InvalidTokenResponse(String),
}

/// Microsoft Graph errors.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-success status, carried verbatim.
    #[error("{status} {body}")]
    Http { status: u16, body: String },

    #[error("Graph API request failed: {0}")]
    RequestFailed(String),

    #[error("Failed to parse API response: {0}")]
    ParseFailed(String),
}

impl AppError {
    /// Returns a user-friendly message for display on the page.
    ///
    /// Provider and Graph failures are shown verbatim; there is no remediation
    /// beyond what the message itself says.
    pub fn user_message(&self) -> String {
        match self {
            Self::Config(msg) => msg.clone(),
            Self::Auth(AuthError::RequestFailed(_)) => {
                "Could not reach the identity provider. Check your connection.".to_string()
            }
            Self::Api(ApiError::RequestFailed(_)) => {
                "Could not reach Microsoft Graph. Check your connection.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_is_verbatim() {
        let err = AppError::Api(ApiError::Http {
            status: 401,
            body: "invalid token".into(),
        });
        assert_eq!(err.to_string(), "401 invalid token");
        assert_eq!(err.user_message(), "401 invalid token");
    }

    #[test]
    fn test_user_messages() {
        let err = AppError::Auth(AuthError::NoActiveFlow);
        assert!(err.user_message().contains("No active login flow"));

        let err = AppError::Auth(AuthError::RequestFailed("dns error".into()));
        assert_eq!(
            err.user_message(),
            "Could not reach the identity provider. Check your connection."
        );

        let err = AppError::Config("Missing TENANT_ID".into());
        assert_eq!(err.user_message(), "Missing TENANT_ID");
    }
}
