use crate::config::RetryConfig;
use crate::endpoints::Endpoints;
use crate::error::{AuthError, Result};
use crate::http::{self, APPLICATION_JSON};
use crate::models::{Project, Token};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde_json::{json, Value};

/// Issues project-scoped tokens from the identity service
#[derive(Clone)]
pub struct TokenFetcher {
    client: Client,
    endpoints: Endpoints,
    retry: RetryConfig,
}

impl TokenFetcher {
    pub fn new(client: Client, endpoints: Endpoints, retry: RetryConfig) -> Self {
        Self {
            client,
            endpoints,
            retry,
        }
    }

    /// Fetch a scoped token, retrying transient failures with a fixed delay
    pub async fn fetch_scoped_token(&self, unscoped_token: &str, project: &Project) -> Result<Token> {
        let attempts = self.retry.attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.request_scoped_token(unscoped_token, &project.id).await {
                Ok(token) => {
                    tracing::debug!(
                        "Scoped token for {} issued on attempt {}",
                        project.name,
                        attempt
                    );
                    return Ok(token);
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        "Attempt {}/{} to get a scoped token for {} failed: {}",
                        attempt,
                        attempts,
                        project.name,
                        e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.retry.delay()).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(AuthError::TokenRefreshExhausted {
            project: project.name.clone(),
            attempts,
            last_error,
        })
    }

    async fn request_scoped_token(&self, unscoped_token: &str, project_id: &str) -> Result<Token> {
        let response = self
            .client
            .post(self.endpoints.tokens())
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .json(&scoped_token_body(unscoped_token, project_id))
            .send()
            .await?;

        let token = http::cloud_credentials_from_response(response).await?;
        Ok(token.to_token())
    }
}

fn scoped_token_body(unscoped_token: &str, project_id: &str) -> Value {
    json!({
        "auth": {
            "identity": {
                "methods": ["token"],
                "token": { "id": unscoped_token }
            },
            "scope": { "project": { "id": project_id } }
        }
    })
}
