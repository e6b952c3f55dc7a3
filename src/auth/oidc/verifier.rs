// ID token verification against the IdP's published signing keys
use crate::error::{AuthError, Result};
use crate::http;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;

/// Claims this tool reads from an ID token.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct IdTokenClaims {
    #[serde(default)]
    pub sub: String,
    #[serde(default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    /// Check signature, issuer, audience and expiry; return the claims.
    async fn verify(&self, raw_id_token: &str) -> Result<IdTokenClaims>;
}

/// Verifies tokens with keys fetched from the provider's `jwks_uri`.
pub struct JwksVerifier {
    http: Client,
    jwks_uri: String,
    issuer: String,
    client_id: String,
}

impl JwksVerifier {
    pub fn new(http: Client, jwks_uri: &str, issuer: &str, client_id: &str) -> Self {
        Self {
            http,
            jwks_uri: jwks_uri.to_string(),
            issuer: issuer.to_string(),
            client_id: client_id.to_string(),
        }
    }

    async fn fetch_keys(&self) -> Result<JwkSet> {
        tracing::debug!("Fetching signing keys from {}", self.jwks_uri);
        let response = self.http.get(&self.jwks_uri).send().await?;
        let bytes = http::body_bytes(response).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl IdTokenVerifier for JwksVerifier {
    async fn verify(&self, raw_id_token: &str) -> Result<IdTokenClaims> {
        let header = decode_header(raw_id_token)
            .map_err(|e| AuthError::TokenVerificationFailed(format!("bad token header: {}", e)))?;

        if matches!(
            header.alg,
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512
        ) {
            return Err(AuthError::TokenVerificationFailed(
                "symmetric signing algorithms are not accepted".to_string(),
            ));
        }

        let keys = self.fetch_keys().await?;
        let jwk = match header.kid.as_deref() {
            Some(kid) => keys.find(kid),
            None => keys.keys.first(),
        }
        .ok_or_else(|| {
            AuthError::TokenVerificationFailed(format!(
                "no signing key for kid {}",
                header.kid.as_deref().unwrap_or("<none>")
            ))
        })?;

        let key = DecodingKey::from_jwk(jwk)
            .map_err(|e| AuthError::TokenVerificationFailed(format!("unusable key: {}", e)))?;

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.client_id]);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<IdTokenClaims>(raw_id_token, &key, &validation)
            .map_err(|e| AuthError::TokenVerificationFailed(e.to_string()))?;

        tracing::debug!("ID token verified for subject {}", data.claims.sub);
        Ok(data.claims)
    }
}
