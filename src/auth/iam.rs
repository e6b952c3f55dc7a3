// IAM password (and optional TOTP) login
use crate::endpoints::Endpoints;
use crate::error::Result;
use crate::http::{self, APPLICATION_JSON};
use crate::models::{LoginRequest, TokenResponse};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};

/// Single round trip against `POST /v3/auth/tokens`.
pub async fn authenticate(
    client: &Client,
    endpoints: &Endpoints,
    request: &LoginRequest,
) -> Result<TokenResponse> {
    let username = request.require(&request.username, "username")?;
    let password = request.require(&request.password, "password")?;

    let totp = match (request.otp.as_deref(), request.user_domain_id.as_deref()) {
        (Some(otp), Some(user_id)) if !otp.is_empty() && !user_id.is_empty() => {
            Some((user_id, otp))
        }
        (Some(otp), _) if !otp.is_empty() => {
            tracing::warn!("A one-time password was given without a user domain id, ignoring it");
            None
        }
        _ => None,
    };

    tracing::debug!(
        "Requesting unscoped token for {} in domain {} (mfa: {})",
        username,
        request.domain_name,
        totp.is_some()
    );

    let body = password_auth_body(username, password, &request.domain_name, totp);
    let response = client
        .post(endpoints.tokens())
        .header(CONTENT_TYPE, APPLICATION_JSON)
        .json(&body)
        .send()
        .await?;

    http::cloud_credentials_from_response(response).await
}

/// Request body selecting `password`, or `password` + `totp` when a passcode is supplied.
fn password_auth_body(
    username: &str,
    password: &str,
    domain_name: &str,
    totp: Option<(&str, &str)>,
) -> Value {
    let password_method = json!({
        "user": {
            "name": username,
            "password": password,
            "domain": { "name": domain_name }
        }
    });

    let identity = match totp {
        Some((user_id, passcode)) => json!({
            "methods": ["password", "totp"],
            "password": password_method,
            "totp": { "user": { "id": user_id, "passcode": passcode } }
        }),
        None => json!({
            "methods": ["password"],
            "password": password_method
        }),
    };

    json!({
        "auth": {
            "identity": identity,
            "scope": { "domain": { "name": domain_name } }
        }
    })
}
