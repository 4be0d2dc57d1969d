//! Device-flow controller: the only code that changes a [`SessionState`].
//!
//! Each operation runs to completion, including its network calls, before
//! returning. Nothing runs in the background.

use crate::auth::{DeviceCodeClient, DeviceFlow, GraphClient, Identity, PollResponse, PollWarning};
use crate::config::{AuthConfig, Config};
use crate::error::{AppError, AuthError};
use crate::session::state::SessionState;
use anyhow::Result;
use tracing::{debug, error, info, warn};

/// Outcome of a successful [`DeviceFlowController::check`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The session is now signed in as this identity.
    Authenticated(Identity),
    /// Not signed in yet. The session is unchanged and `check` may be repeated.
    Waiting(PollWarning),
}

/// Drives sessions through sign-in. One controller can serve many sessions.
pub struct DeviceFlowController {
    auth: AuthConfig,
    me_url: String,
    device_client: DeviceCodeClient,
    graph_client: GraphClient,
}

impl DeviceFlowController {
    /// Create a controller and its HTTP clients from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            auth: config.auth.clone(),
            me_url: config.me_url(),
            device_client: DeviceCodeClient::new(&config.auth, &config.http)?,
            graph_client: GraphClient::new(&config.http)?,
        })
    }

    pub fn auth_config(&self) -> &AuthConfig {
        &self.auth
    }

    /// Start a new flow, replacing any pending one.
    ///
    /// On failure the session keeps whatever it had before.
    pub async fn start(&self, session: &mut SessionState) -> Result<DeviceFlow, AppError> {
        if session.is_authenticated() {
            return Err(AuthError::AlreadyAuthenticated.into());
        }

        info!("Starting device-code sign-in");

        let flow = self
            .device_client
            .initiate(&self.auth.scopes)
            .await
            .map_err(|e| {
                error!("Failed to start device-code flow: {}", e);
                e
            })?;

        info!("Device-code flow started, expires at {}", flow.expires_at);

        *session = SessionState::Pending(flow.clone());
        Ok(flow)
    }

    /// Poll the pending flow once and, if a token came back, fetch the profile.
    ///
    /// The session only becomes authenticated when both calls succeed. A failed
    /// profile fetch leaves the session pending on the same flow.
    pub async fn check(&self, session: &mut SessionState) -> Result<CheckOutcome, AppError> {
        let flow = match &*session {
            SessionState::Pending(flow) => flow,
            SessionState::Unauthenticated => return Err(AuthError::NoActiveFlow.into()),
            SessionState::Authenticated { .. } => {
                return Err(AuthError::AlreadyAuthenticated.into())
            }
        };

        let token = match self.device_client.poll(flow).await? {
            PollResponse::Token(token) => token,
            PollResponse::Waiting(warning) => {
                if warning.is_pending() {
                    info!("Sign-in not complete yet: {}", warning);
                } else {
                    warn!("Token poll returned an error: {}", warning);
                }
                return Ok(CheckOutcome::Waiting(warning));
            }
        };

        debug!("Token acquired, lifetime {:?} seconds", token.expires_in);

        let identity = self
            .graph_client
            .get_identity(&self.me_url, token.secret())
            .await
            .map_err(|e| {
                error!("Failed to fetch signed-in user: {}", e);
                e
            })?;

        info!("Sign-in successful: {}", identity.display_name);

        *session = SessionState::Authenticated {
            token,
            identity: identity.clone(),
        };
        Ok(CheckOutcome::Authenticated(identity))
    }

    /// Forget the flow, token and identity. Nothing is revoked server-side.
    pub fn logout(&self, session: &mut SessionState) {
        info!("Signing out");
        session.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::state::Phase;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn controller(server: &MockServer) -> DeviceFlowController {
        let uri = server.uri();
        let config = Config::from_lookup(|key| match key {
            "TENANT_ID" => Some("t1".to_string()),
            "CLIENT_ID" => Some("c1".to_string()),
            "AUTHORITY_HOST" => Some(uri.clone()),
            "GRAPH_BASE_URL" => Some(format!("{}/v1.0", uri)),
            _ => None,
        })
        .unwrap();
        DeviceFlowController::new(&config).unwrap()
    }

    async fn mount_device_code(server: &MockServer, user_code: &str) {
        Mock::given(method("POST"))
            .and(path("/t1/oauth2/v2.0/devicecode"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": format!("dc-{}", user_code),
                "user_code": user_code,
                "verification_uri": "https://microsoft.com/devicelogin",
                "expires_in": 900,
                "message": format!("Enter the code {} to authenticate.", user_code)
            })))
            .mount(server)
            .await;
    }

    async fn mount_token(server: &MockServer, status: u16, body: serde_json::Value) {
        Mock::given(method("POST"))
            .and(path("/t1/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(server)
            .await;
    }

    async fn pending_session(controller: &DeviceFlowController) -> SessionState {
        let mut session = SessionState::new();
        controller.start(&mut session).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_start_enters_pending() {
        let server = MockServer::start().await;
        mount_device_code(&server, "ABC123").await;
        let controller = controller(&server);

        let mut session = SessionState::new();
        let flow = controller.start(&mut session).await.unwrap();

        assert_eq!(flow.user_code, "ABC123");
        assert_eq!(session.phase(), Phase::Pending);
        assert_eq!(session.flow().unwrap().user_code, "ABC123");
        assert_eq!(
            session.flow().unwrap().login_url(&controller.auth_config().default_verification_uri),
            "https://microsoft.com/devicelogin"
        );
    }

    #[tokio::test]
    async fn test_start_failure_keeps_previous_state() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/t1/oauth2/v2.0/devicecode"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_scope" })),
            )
            .mount(&server)
            .await;
        let controller = controller(&server);

        let mut session = SessionState::new();
        let err = controller.start(&mut session).await.unwrap_err();

        assert!(matches!(err, AppError::Auth(AuthError::FlowInitiation(_))));
        assert!(err.to_string().starts_with("Device flow init failed"));
        assert_eq!(session.phase(), Phase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_restart_replaces_pending_flow() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        Mock::given(method("POST"))
            .and(path("/t1/oauth2/v2.0/devicecode"))
            .respond_with(move |_req: &Request| {
                let code = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    "FIRST1"
                } else {
                    "SECOND"
                };
                ResponseTemplate::new(200).set_body_json(json!({
                    "device_code": "dc",
                    "user_code": code,
                    "verification_uri": "https://microsoft.com/devicelogin",
                    "message": "Enter the code"
                }))
            })
            .expect(2)
            .mount(&server)
            .await;
        let controller = controller(&server);

        let mut session = pending_session(&controller).await;
        assert_eq!(session.flow().unwrap().user_code, "FIRST1");

        controller.start(&mut session).await.unwrap();
        assert_eq!(session.flow().unwrap().user_code, "SECOND");
    }

    #[tokio::test]
    async fn test_check_without_flow_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let controller = controller(&server);

        let mut session = SessionState::new();
        let err = controller.check(&mut session).await.unwrap_err();

        assert!(matches!(err, AppError::Auth(AuthError::NoActiveFlow)));
        assert!(err.to_string().contains("No active login flow"));
        assert_eq!(session.phase(), Phase::Unauthenticated);
    }

    #[tokio::test]
    async fn test_check_pending_is_repeatable() {
        let server = MockServer::start().await;
        mount_device_code(&server, "ABC123").await;
        mount_token(
            &server,
            400,
            json!({
                "error": "authorization_pending",
                "error_description": "still waiting"
            }),
        )
        .await;
        let controller = controller(&server);
        let mut session = pending_session(&controller).await;
        let expires_at = session.flow().unwrap().expires_at;

        for _ in 0..3 {
            let outcome = controller.check(&mut session).await.unwrap();
            match outcome {
                CheckOutcome::Waiting(warning) => {
                    let text = warning.to_string();
                    assert!(text.contains("authorization_pending"));
                    assert!(text.contains("still waiting"));
                }
                other => panic!("unexpected outcome: {:?}", other),
            }

            assert_eq!(session.phase(), Phase::Pending);
            assert_eq!(session.flow().unwrap().user_code, "ABC123");
            assert_eq!(session.flow().unwrap().expires_at, expires_at);
        }
    }

    #[tokio::test]
    async fn test_check_provider_error_is_a_warning() {
        let server = MockServer::start().await;
        mount_device_code(&server, "ABC123").await;
        mount_token(
            &server,
            400,
            json!({
                "error": "expired_token",
                "error_description": "The code has expired."
            }),
        )
        .await;
        let controller = controller(&server);
        let mut session = pending_session(&controller).await;

        let outcome = controller.check(&mut session).await.unwrap();

        assert!(matches!(outcome, CheckOutcome::Waiting(ref w) if !w.is_pending()));
        assert_eq!(session.phase(), Phase::Pending);
    }

    #[tokio::test]
    async fn test_check_pending_then_authenticated() {
        let server = MockServer::start().await;
        mount_device_code(&server, "ABC123").await;

        let polls = Arc::new(AtomicUsize::new(0));
        let counter = polls.clone();
        Mock::given(method("POST"))
            .and(path("/t1/oauth2/v2.0/token"))
            .respond_with(move |_req: &Request| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(400).set_body_json(json!({
                        "error": "authorization_pending",
                        "error_description": "still waiting"
                    }))
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok1" }))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .and(header("Authorization", "Bearer tok1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "displayName": "Jane Doe",
                "userPrincipalName": "jane@example.com",
                "id": "u1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let controller = controller(&server);
        let mut session = pending_session(&controller).await;

        let first = controller.check(&mut session).await.unwrap();
        assert!(matches!(first, CheckOutcome::Waiting(_)));
        assert_eq!(session.phase(), Phase::Pending);

        let second = controller.check(&mut session).await.unwrap();
        let expected = Identity {
            display_name: "Jane Doe".into(),
            user_principal_name: "jane@example.com".into(),
            id: "u1".into(),
        };
        assert_eq!(second, CheckOutcome::Authenticated(expected.clone()));
        assert_eq!(session.phase(), Phase::Authenticated);
        assert_eq!(session.identity(), Some(&expected));
        assert_eq!(session.token().unwrap().secret(), "tok1");
        assert!(session.flow().is_none());
    }

    #[tokio::test]
    async fn test_graph_failure_does_not_authenticate() {
        let server = MockServer::start().await;
        mount_device_code(&server, "ABC123").await;
        mount_token(&server, 200, json!({ "access_token": "tok1" })).await;
        Mock::given(method("GET"))
            .and(path("/v1.0/me"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid token"))
            .expect(1)
            .mount(&server)
            .await;
        let controller = controller(&server);
        let mut session = pending_session(&controller).await;

        let err = controller.check(&mut session).await.unwrap_err();

        let message = err.user_message();
        assert!(message.contains("401"));
        assert!(message.contains("invalid token"));
        assert!(!session.is_authenticated());
        assert!(session.token().is_none());
        assert_eq!(session.phase(), Phase::Pending);
        assert_eq!(session.flow().unwrap().user_code, "ABC123");
    }

    #[tokio::test]
    async fn test_signed_in_session_rejects_start_and_check() {
        let server = MockServer::start().await;
        let controller = controller(&server);
        let mut session = SessionState::Authenticated {
            token: crate::auth::AccessToken::new("tok1", None),
            identity: Identity {
                display_name: "Jane Doe".into(),
                user_principal_name: "jane@example.com".into(),
                id: "u1".into(),
            },
        };

        assert!(matches!(
            controller.start(&mut session).await,
            Err(AppError::Auth(AuthError::AlreadyAuthenticated))
        ));
        assert!(matches!(
            controller.check(&mut session).await,
            Err(AppError::Auth(AuthError::AlreadyAuthenticated))
        ));
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_logout_from_any_state() {
        let server = MockServer::start().await;
        mount_device_code(&server, "ABC123").await;
        let controller = controller(&server);

        let mut session = SessionState::new();
        controller.logout(&mut session);
        assert_eq!(session.phase(), Phase::Unauthenticated);

        let mut session = pending_session(&controller).await;
        controller.logout(&mut session);
        assert_eq!(session.phase(), Phase::Unauthenticated);

        let mut session = SessionState::Authenticated {
            token: crate::auth::AccessToken::new("tok1", None),
            identity: Identity {
                display_name: "Jane Doe".into(),
                user_principal_name: "jane@example.com".into(),
                id: "u1".into(),
            },
        };
        controller.logout(&mut session);
        assert!(session.flow().is_none());
        assert!(session.token().is_none());
        assert!(session.identity().is_none());
    }
}
