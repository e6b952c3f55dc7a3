// Local HTTP listener receiving the authorization-code redirect
use super::{transition, FlowFailure, FlowState, OidcSession};
use crate::error::{AuthError, Result};
use crate::models::OidcCredentials;
use axum::extract::{Query, State};
use axum::http::header::{AUTHORIZATION, LOCATION};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>otc-auth</title></head>
<body>
<h2>Authentication successful</h2>
<p>You can close this window and return to the terminal.</p>
</body>
</html>"#;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct ListenerState {
    session: Arc<OidcSession>,
    results: mpsc::Sender<OidcCredentials>,
    flow: Arc<watch::Sender<FlowState>>,
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    state: Option<String>,
    code: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Routes: `/` starts the login, `/callback` and the redirect URL path finish it.
pub fn router(
    session: Arc<OidcSession>,
    results: mpsc::Sender<OidcCredentials>,
    flow: Arc<watch::Sender<FlowState>>,
) -> Router {
    let callback_path = session.callback_path().to_string();
    let mut router = Router::new()
        .route("/", get(start_login))
        .route("/callback", get(callback));

    if callback_path != "/" && callback_path != "/callback" {
        router = router.route(&callback_path, get(callback));
    }

    router.with_state(ListenerState {
        session,
        results,
        flow,
    })
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

async fn start_login(State(state): State<ListenerState>, headers: HeaderMap) -> Response {
    let auth_url = match state.session.authorization_url() {
        Ok(url) => url,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    let raw = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if raw.is_empty() {
        return found(&auth_url);
    }

    let parts: Vec<&str> = raw.split(' ').collect();
    if parts.len() != 2 {
        return StatusCode::BAD_REQUEST.into_response();
    }

    match state.session.verifier.verify(parts[1]).await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => {
            tracing::debug!("Presented bearer token rejected: {}", e);
            found(&auth_url)
        }
    }
}

async fn callback(
    State(state): State<ListenerState>,
    Query(params): Query<CallbackParams>,
) -> Response {
    if params.state.as_deref() != Some(state.session.state.as_str()) {
        let error = AuthError::StateMismatch;
        tracing::warn!("Rejected OIDC callback: {}", error);
        return (StatusCode::BAD_REQUEST, error.to_string()).into_response();
    }

    if let Some(error) = params.error {
        let reason = match params.error_description {
            Some(description) if !description.is_empty() => format!("{}: {}", error, description),
            _ => error,
        };
        transition(&state.flow, FlowState::Failed(FlowFailure::Rejected(reason.clone())));
        return (
            StatusCode::BAD_REQUEST,
            format!("IdP returned an error: {}", reason),
        )
            .into_response();
    }

    let code = match params.code.filter(|c| !c.is_empty()) {
        Some(code) => code,
        None => return (StatusCode::BAD_REQUEST, "missing code").into_response(),
    };

    transition(&state.flow, FlowState::Exchanging);
    let id_token = match state.session.exchange_code(&code).await {
        Ok(token) => token,
        Err(e) => {
            tracing::error!("Failed to exchange token: {}", e);
            transition(&state.flow, FlowState::Failed(FlowFailure::Exchange(e.to_string())));
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to exchange token: {}", e),
            )
                .into_response();
        }
    };

    transition(&state.flow, FlowState::Verifying);
    let claims = match state.session.verifier.verify(&id_token).await {
        Ok(claims) => claims,
        Err(e) => {
            tracing::error!("Failed to verify ID Token: {}", e);
            let body = format!("Failed to verify ID Token: {}", e);
            let reason = match e {
                AuthError::TokenVerificationFailed(reason) => reason,
                other => other.to_string(),
            };
            transition(&state.flow, FlowState::Failed(FlowFailure::Verification(reason)));
            return (StatusCode::INTERNAL_SERVER_ERROR, body).into_response();
        }
    };

    let credentials = OidcCredentials {
        bearer_token: format!("Bearer {}", id_token),
        preferred_username: claims.preferred_username.unwrap_or_default(),
    };

    // Capacity one: a repeated callback after delivery is answered but dropped.
    match state.results.try_send(credentials) {
        Ok(()) => transition(&state.flow, FlowState::Delivered),
        Err(_) => tracing::debug!("Login result already delivered, ignoring callback"),
    }

    Html(SUCCESS_PAGE).into_response()
}

/// A running listener. Dropping it without `shutdown` leaves the task serving.
pub struct CallbackListener {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

impl CallbackListener {
    pub async fn bind(address: &str, router: Router) -> Result<Self> {
        let listener = TcpListener::bind(address).await?;
        let local_addr = listener.local_addr()?;
        tracing::debug!("OIDC callback listener bound to {}", local_addr);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            if let Err(e) = result {
                tracing::error!("OIDC callback listener failed: {}", e);
            }
        });

        Ok(Self {
            local_addr,
            shutdown,
            handle,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight responses finish, then return.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.handle).await.is_err() {
            tracing::warn!("OIDC callback listener did not stop within {:?}", SHUTDOWN_GRACE);
        }
    }
}
