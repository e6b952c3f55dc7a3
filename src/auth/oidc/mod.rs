// OpenID Connect login: browser flow or service account, then IAM federation
pub mod server;
pub mod service_account;
pub mod verifier;

use crate::config::OidcConfig;
use crate::endpoints::Endpoints;
use crate::error::{AuthError, Result};
use crate::http;
use crate::models::{LoginRequest, OidcCredentials, TokenResponse};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Url};
use serde::Deserialize;
use server::CallbackListener;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;
use verifier::{IdTokenVerifier, JwksVerifier};

/// Progress of an interactive login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    ListenerStarted,
    AwaitingCallback,
    Exchanging,
    Verifying,
    Delivered,
    Failed(FlowFailure),
}

/// Why a callback ended the login. A forged or missing `state` is not one of
/// these: such requests are refused and the login keeps waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowFailure {
    /// The IdP redirected back with an `error` parameter.
    Rejected(String),
    Exchange(String),
    Verification(String),
}

impl From<FlowFailure> for AuthError {
    fn from(failure: FlowFailure) -> Self {
        match failure {
            FlowFailure::Rejected(message) => {
                AuthError::AuthenticationFailed(format!("IdP returned an error: {}", message))
            }
            FlowFailure::Exchange(message) => AuthError::AuthenticationFailed(message),
            FlowFailure::Verification(message) => AuthError::TokenVerificationFailed(message),
        }
    }
}

pub(crate) fn transition(flow: &watch::Sender<FlowState>, next: FlowState) {
    tracing::debug!("OIDC flow: {:?}", next);
    flow.send_replace(next);
}

/// The subset of the discovery document the flow needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
}

pub async fn discover(client: &Client, idp_url: &str) -> Result<ProviderMetadata> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        idp_url.trim_end_matches('/')
    );
    tracing::debug!("Discovering OIDC provider at {}", url);

    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| AuthError::Discovery(e.to_string()))?;
    let bytes = http::body_bytes(response)
        .await
        .map_err(|e| AuthError::Discovery(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| AuthError::Discovery(e.to_string()))
}

/// S256 code challenge for a PKCE verifier.
fn pkce_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[derive(Debug, Deserialize)]
struct CodeExchangeResponse {
    #[serde(default)]
    id_token: Option<String>,
}

/// Everything one authorization-code login needs, shared with the listener.
pub struct OidcSession {
    pub state: String,
    pkce_verifier: String,
    pub client_id: String,
    client_secret: Option<String>,
    pub redirect_url: String,
    callback_path: String,
    pub scopes: Vec<String>,
    pub provider: ProviderMetadata,
    pub verifier: Arc<dyn IdTokenVerifier>,
    http: Client,
}

impl OidcSession {
    pub fn new(
        http: Client,
        provider: ProviderMetadata,
        verifier: Arc<dyn IdTokenVerifier>,
        client_id: &str,
        client_secret: Option<String>,
        config: &OidcConfig,
    ) -> Result<Self> {
        let callback_path = Url::parse(&config.redirect_url)
            .map_err(|e| {
                AuthError::ConfigError(format!(
                    "invalid redirect url '{}': {}",
                    config.redirect_url, e
                ))
            })?
            .path()
            .to_string();

        Ok(Self {
            state: Uuid::new_v4().to_string(),
            pkce_verifier: format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple()),
            client_id: client_id.to_string(),
            client_secret: client_secret.filter(|s| !s.is_empty()),
            redirect_url: config.redirect_url.clone(),
            callback_path,
            scopes: config.scopes.clone(),
            provider,
            verifier,
            http,
        })
    }

    pub fn callback_path(&self) -> &str {
        &self.callback_path
    }

    pub fn authorization_url(&self) -> Result<String> {
        let challenge = pkce_challenge(&self.pkce_verifier);
        let scope = self.scopes.join(" ");
        let url = Url::parse_with_params(
            &self.provider.authorization_endpoint,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("scope", scope.as_str()),
                ("state", self.state.as_str()),
                ("code_challenge", challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| AuthError::Discovery(format!("bad authorization endpoint: {}", e)))?;
        Ok(url.to_string())
    }

    /// Trade the authorization code for the raw ID token.
    pub async fn exchange_code(&self, code: &str) -> Result<String> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_url.as_str()),
            ("code_verifier", self.pkce_verifier.as_str()),
        ];

        let mut request = self.http.post(&self.provider.token_endpoint);
        match &self.client_secret {
            Some(secret) => request = request.basic_auth(&self.client_id, Some(secret)),
            None => form.push(("client_id", self.client_id.as_str())),
        }

        let response = request.form(&form).send().await?;
        let bytes = http::body_bytes(response).await?;
        let parsed: CodeExchangeResponse = serde_json::from_slice(&bytes)?;

        parsed
            .id_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::AuthenticationFailed("No id_token field in oauth2 token".to_string()))
    }
}

/// Obtain IdP credentials, then trade them for an unscoped IAM token.
///
/// Interactive logins run the authorization-code flow with PKCE through a
/// local listener; service accounts use the client-credentials grant.
pub async fn authenticate(
    client: &Client,
    endpoints: &Endpoints,
    request: &LoginRequest,
    config: &OidcConfig,
    headless: bool,
) -> Result<TokenResponse> {
    let idp_name = request.require(&request.idp_name, "idp name")?;
    let idp_url = request.require(&request.idp_url, "idp url")?;
    let client_id = request.require(&request.client_id, "client id")?;

    let credentials = if request.service_account {
        let secret = request.require(&request.client_secret, "client secret")?;
        service_account::authenticate(client, idp_url, client_id, secret).await?
    } else {
        let provider = discover(client, idp_url).await?;
        let verifier = Arc::new(JwksVerifier::new(
            client.clone(),
            &provider.jwks_uri,
            &provider.issuer,
            client_id,
        ));
        let session = OidcSession::new(
            client.clone(),
            provider,
            verifier,
            client_id,
            request.client_secret.clone(),
            config,
        )?;
        authenticate_with_idp(session, config, headless).await?
    };

    authenticate_with_service_provider(client, endpoints, idp_name, &credentials).await
}

/// Run the browser flow and wait for the listener to deliver credentials.
pub async fn authenticate_with_idp(
    session: OidcSession,
    config: &OidcConfig,
    headless: bool,
) -> Result<OidcCredentials> {
    let session = Arc::new(session);
    let (results_tx, mut results_rx) = mpsc::channel(1);
    let (flow_tx, mut flow_rx) = watch::channel(FlowState::Idle);
    let flow = Arc::new(flow_tx);

    let app = server::router(session.clone(), results_tx, flow.clone());
    let listener = CallbackListener::bind(&config.listen_address, app).await?;
    transition(&flow, FlowState::ListenerStarted);

    display_login_prompt(&format!("http://{}", listener.local_addr()), headless);
    transition(&flow, FlowState::AwaitingCallback);

    let outcome = wait_for_callback(&mut results_rx, &mut flow_rx, config.timeout()).await;
    if let Err(e) = &outcome {
        tracing::debug!("OIDC login ended without credentials: {}", e);
    }

    listener.shutdown().await;
    outcome
}

/// Wait for the single result, bounded by `timeout` and interruptible by Ctrl-C.
///
/// A callback that fails after passing the state check ends the wait with
/// its own error.
pub async fn wait_for_callback(
    results: &mut mpsc::Receiver<OidcCredentials>,
    flow: &mut watch::Receiver<FlowState>,
    timeout: Duration,
) -> Result<OidcCredentials> {
    tokio::select! {
        received = tokio::time::timeout(timeout, results.recv()) => match received {
            Ok(Some(credentials)) => Ok(credentials),
            Ok(None) => Err(AuthError::AuthenticationFailed(
                "callback listener stopped before delivering a result".to_string(),
            )),
            Err(_) => Err(AuthError::OidcTimeout(timeout.as_secs())),
        },
        Some(failure) = flow_failure(flow) => Err(failure.into()),
        _ = tokio::signal::ctrl_c() => Err(AuthError::Cancelled),
    }
}

async fn flow_failure(flow: &mut watch::Receiver<FlowState>) -> Option<FlowFailure> {
    let state = flow
        .wait_for(|s| matches!(s, FlowState::Failed(_)))
        .await
        .ok()?;
    match &*state {
        FlowState::Failed(failure) => Some(failure.clone()),
        _ => None,
    }
}

fn display_login_prompt(url: &str, headless: bool) {
    eprintln!("\n=== OTC OIDC Login ===");

    if headless {
        eprintln!("Running in headless mode - please open browser manually:");
        eprintln!();
        eprintln!("Visit: {}", url);
        eprintln!();
    } else {
        eprintln!("Opening browser to: {}", url);
        eprintln!("\nIf browser doesn't open automatically, visit:");
        eprintln!("  {}\n", url);

        if let Err(e) = webbrowser::open(url) {
            eprintln!("Could not open browser automatically: {}", e);
            eprintln!("Please open the URL manually.\n");
        }
    }

    eprintln!("Waiting for authorization...");
}

/// Present the ID token to IAM's OIDC federation endpoint.
pub async fn authenticate_with_service_provider(
    client: &Client,
    endpoints: &Endpoints,
    idp_name: &str,
    credentials: &OidcCredentials,
) -> Result<TokenResponse> {
    let url = endpoints.federation_auth(idp_name, "oidc");
    tracing::debug!("Exchanging ID token at {}", url);

    let response = client
        .post(&url)
        .header(AUTHORIZATION, bearer(&credentials.bearer_token))
        .send()
        .await?;

    let mut token = http::cloud_credentials_from_response(response).await?;
    token.token.user.name = credentials.preferred_username.clone();
    Ok(token)
}

fn bearer(token: &str) -> String {
    if token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bearer {}", token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::X_SUBJECT_TOKEN;
    use verifier::MockIdTokenVerifier;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_pkce_challenge_matches_reference_vector() {
        assert_eq!(
            pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_bearer_prefix_is_not_doubled() {
        assert_eq!(bearer("abc"), "Bearer abc");
        assert_eq!(bearer("Bearer abc"), "Bearer abc");
    }

    #[test]
    fn test_sessions_get_fresh_state() {
        let provider = ProviderMetadata {
            issuer: "https://idp".to_string(),
            authorization_endpoint: "https://idp/auth".to_string(),
            token_endpoint: "https://idp/token".to_string(),
            jwks_uri: "https://idp/certs".to_string(),
        };
        let make = || {
            OidcSession::new(
                Client::new(),
                provider.clone(),
                Arc::new(MockIdTokenVerifier::new()),
                "c",
                None,
                &OidcConfig::default(),
            )
            .unwrap()
        };
        let (a, b) = (make(), make());
        assert_ne!(a.state, b.state);
        assert_eq!(a.callback_path(), "/oidc/auth");
        assert!(a.pkce_verifier.len() >= 43);
    }

    #[test]
    fn test_invalid_redirect_url() {
        let config = OidcConfig {
            redirect_url: "not a url".to_string(),
            ..OidcConfig::default()
        };
        let provider = ProviderMetadata {
            issuer: String::new(),
            authorization_endpoint: String::new(),
            token_endpoint: String::new(),
            jwks_uri: String::new(),
        };
        let result = OidcSession::new(
            Client::new(),
            provider,
            Arc::new(MockIdTokenVerifier::new()),
            "c",
            None,
            &config,
        );
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let (_tx, mut rx) = mpsc::channel::<OidcCredentials>(1);
        let (_flow_tx, mut flow_rx) = watch::channel(FlowState::AwaitingCallback);
        let result = wait_for_callback(&mut rx, &mut flow_rx, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AuthError::OidcTimeout(_))));
    }

    #[tokio::test]
    async fn test_wait_receives_delivered_result() {
        let (tx, mut rx) = mpsc::channel(1);
        let (_flow_tx, mut flow_rx) = watch::channel(FlowState::AwaitingCallback);
        tx.send(OidcCredentials {
            bearer_token: "Bearer t".to_string(),
            preferred_username: "alice".to_string(),
        })
        .await
        .unwrap();
        let credentials = wait_for_callback(&mut rx, &mut flow_rx, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(credentials.preferred_username, "alice");
    }

    #[tokio::test]
    async fn test_wait_ends_on_failed_flow() {
        let (_tx, mut rx) = mpsc::channel::<OidcCredentials>(1);
        let (flow_tx, mut flow_rx) = watch::channel(FlowState::AwaitingCallback);
        flow_tx.send_replace(FlowState::Failed(FlowFailure::Verification(
            "bad signature".to_string(),
        )));

        let result = wait_for_callback(&mut rx, &mut flow_rx, Duration::from_secs(30)).await;
        match result {
            Err(AuthError::TokenVerificationFailed(message)) => {
                assert_eq!(message, "bad signature")
            }
            other => panic!("expected TokenVerificationFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_verification_ends_login_before_timeout() {
        let idp = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id_token": "raw-id"})),
            )
            .mount(&idp)
            .await;

        let mut verifier = MockIdTokenVerifier::new();
        verifier.expect_verify().returning(|_| {
            Err(AuthError::TokenVerificationFailed("bad signature".to_string()))
        });

        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = OidcConfig {
            listen_address: format!("127.0.0.1:{}", port),
            redirect_url: format!("http://127.0.0.1:{}/oidc/auth", port),
            timeout_secs: 30,
            ..OidcConfig::default()
        };
        let provider = ProviderMetadata {
            issuer: idp.uri(),
            authorization_endpoint: format!("{}/auth", idp.uri()),
            token_endpoint: format!("{}/token", idp.uri()),
            jwks_uri: format!("{}/certs", idp.uri()),
        };
        let session = OidcSession::new(
            Client::new(),
            provider,
            Arc::new(verifier),
            "otc-cli",
            None,
            &config,
        )
        .unwrap();

        let callback = format!(
            "http://127.0.0.1:{}/oidc/auth?state={}&code=c",
            port, session.state
        );
        let browser = tokio::spawn(async move {
            let client = Client::new();
            for _ in 0..100 {
                if let Ok(response) = client.get(&callback).send().await {
                    return response.status();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            panic!("callback listener never came up");
        });

        let started = std::time::Instant::now();
        let result = authenticate_with_idp(session, &config, true).await;
        assert!(matches!(result, Err(AuthError::TokenVerificationFailed(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(
            browser.await.unwrap(),
            reqwest::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_discovery() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/realms/otc/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://idp/realms/otc",
                "authorization_endpoint": "https://idp/auth",
                "token_endpoint": "https://idp/token",
                "jwks_uri": "https://idp/certs",
                "response_types_supported": ["code"]
            })))
            .mount(&server)
            .await;

        let provider = discover(&Client::new(), &format!("{}/realms/otc", server.uri()))
            .await
            .unwrap();
        assert_eq!(provider.token_endpoint, "https://idp/token");

        assert!(matches!(
            discover(&Client::new(), &format!("{}/missing", server.uri())).await,
            Err(AuthError::Discovery(_))
        ));
    }

    #[tokio::test]
    async fn test_federation_exchange_sets_username() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(
                "/v3/OS-FEDERATION/identity_providers/corp/protocols/oidc/auth",
            ))
            .and(header("authorization", "Bearer raw-id"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header(X_SUBJECT_TOKEN, "oidc-token")
                    .set_body_json(serde_json::json!({
                        "token": {
                            "expires_at": "2030-01-01T00:00:00Z",
                            "user": {"domain": {"id": "d1", "name": "d"}, "name": "federated"}
                        }
                    })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoints = Endpoints::with_base(&format!("{}/v3", server.uri()));
        let credentials = OidcCredentials {
            bearer_token: "raw-id".to_string(),
            preferred_username: "alice".to_string(),
        };
        let token = authenticate_with_service_provider(&Client::new(), &endpoints, "corp", &credentials)
            .await
            .unwrap();
        assert_eq!(token.token.secret, "oidc-token");
        assert_eq!(token.token.user.name, "alice");
    }
}
