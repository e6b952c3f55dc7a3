// Client-credentials grant for non-interactive OIDC logins
use crate::error::{AuthError, Result};
use crate::http;
use crate::models::OidcCredentials;
use reqwest::Client;
use serde::Deserialize;

/// Username recorded for logins made with a service account.
pub const SERVICE_ACCOUNT_USERNAME: &str = "ServiceAccount";

#[derive(Debug, Deserialize)]
struct ClientCredentialsResponse {
    #[serde(default)]
    id_token: Option<String>,
}

pub async fn authenticate(
    client: &Client,
    idp_url: &str,
    client_id: &str,
    client_secret: &str,
) -> Result<OidcCredentials> {
    let url = format!(
        "{}/protocol/openid-connect/token",
        idp_url.trim_end_matches('/')
    );
    tracing::debug!("Requesting service account token from {}", url);

    let response = client
        .post(&url)
        .basic_auth(client_id, Some(client_secret))
        .form(&[("grant_type", "client_credentials"), ("scope", "openid")])
        .send()
        .await?;
    let bytes = http::body_bytes(response).await?;

    let parsed: ClientCredentialsResponse = serde_json::from_slice(&bytes)?;
    let id_token = parsed.id_token.filter(|t| !t.is_empty()).ok_or_else(|| {
        AuthError::AuthenticationFailed("IdP returned no id_token for the service account".to_string())
    })?;

    Ok(OidcCredentials {
        bearer_token: id_token,
        preferred_username: SERVICE_ACCOUNT_USERNAME.to_string(),
    })
}
