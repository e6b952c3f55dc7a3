// Shared request/response helpers for every login flow
use crate::error::{AuthError, Result};
use crate::models::TokenResponse;
use reqwest::{Client, Response};

pub const X_SUBJECT_TOKEN: &str = "X-Subject-Token";
pub const X_AUTH_TOKEN: &str = "X-Auth-Token";
pub const PAOS: &str = "PAOS";

pub const APPLICATION_JSON: &str = "application/json";
pub const APPLICATION_PAOS: &str = "application/vnd.paos+xml";
pub const TEXT_XML: &str = "text/xml";
pub const PAOS_ECP_PROFILE: &str =
    r#"ver="urn:liberty:paos:2003-08";"urn:oasis:names:tc:SAML:2.0:profiles:SSO:ecp""#;

/// Marker IAM puts in the body when the TOTP passcode was rejected.
const MFA_FAILURE_MARKER: &str = "mfa totp code verify fail";

pub fn build_client(skip_tls_verification: bool) -> Result<Client> {
    if skip_tls_verification {
        tracing::warn!("TLS verification is disabled");
    }
    let client = Client::builder()
        .danger_accept_invalid_certs(skip_tls_verification)
        .build()?;
    Ok(client)
}

/// Read the whole body, failing on any non-2xx status.
pub async fn body_bytes(response: Response) -> Result<Vec<u8>> {
    let status = response.status();
    let bytes = response.bytes().await?;

    if !status.is_success() {
        return Err(AuthError::HttpStatus {
            status: status.as_u16(),
            body: format_json_body(&bytes),
        });
    }

    Ok(bytes.to_vec())
}

/// Extract an IAM token: the secret from `X-Subject-Token`, the rest from the JSON body.
///
/// Without the header the body decides between a rejected one-time password
/// and a generic failure carrying the body for diagnostics.
pub async fn cloud_credentials_from_response(response: Response) -> Result<TokenResponse> {
    let secret = response
        .headers()
        .get(X_SUBJECT_TOKEN)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string());

    let secret = match secret {
        Some(secret) => secret,
        None => {
            let status = response.status();
            let bytes = response.bytes().await?;
            if String::from_utf8_lossy(&bytes).contains(MFA_FAILURE_MARKER) {
                return Err(AuthError::InvalidOtp);
            }
            return Err(AuthError::AuthenticationFailed(format!(
                "response failed with status {}. Body:\n{}",
                status,
                format_json_body(&bytes)
            )));
        }
    };

    let bytes = body_bytes(response).await?;
    let mut token_response: TokenResponse = serde_json::from_slice(&bytes)?;
    token_response.token.secret = secret;

    Ok(token_response)
}

/// Pretty-print a JSON body; anything else comes back as lossy text.
pub fn format_json_body(bytes: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(bytes)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| String::from_utf8_lossy(bytes).into_owned())
}
