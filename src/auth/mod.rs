// Cloud authentication: strategy dispatch plus unscoped token persistence
pub mod iam;
pub mod oidc;
pub mod saml;

use crate::config::Config;
use crate::credentials::{RefreshReport, ScopedTokenManager, TokenFetcher};
use crate::endpoints::Endpoints;
use crate::error::{AuthError, Result};
use crate::http;
use crate::models::{Cloud, LoginRequest, Protocol, Token, TokenResponse};
use crate::projects;
use crate::store::CredentialStore;
use reqwest::Client;

/// What a login produced.
#[derive(Debug)]
pub struct LoginOutcome {
    pub cloud: Cloud,
    pub token: Token,
    /// True when the cached unscoped token was still valid and nothing was sent.
    pub reused: bool,
    pub refresh: RefreshReport,
}

/// High-level authentication interface
pub struct AuthManager {
    config: Config,
    store: CredentialStore,
    client: Client,
    headless: bool,
}

impl AuthManager {
    pub fn new(config: Config, store: CredentialStore, headless: bool) -> Result<Self> {
        let client = http::build_client(config.cloud.skip_tls_verification)?;
        Ok(Self {
            config,
            store,
            client,
            headless,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn endpoints(&self, region: &str) -> Result<Endpoints> {
        Endpoints::resolve(&self.config.cloud, region)
    }

    /// Scoped token manager bound to the active cloud's region.
    pub fn token_manager(&self) -> Result<ScopedTokenManager<'_>> {
        let cloud = self.store.active_cloud()?;
        let fetcher = TokenFetcher::new(
            self.client.clone(),
            self.endpoints(&cloud.region)?,
            self.config.retry.clone(),
        );
        Ok(ScopedTokenManager::new(&self.store, fetcher))
    }

    /// Log in to the requested domain.
    ///
    /// A still-valid unscoped token short-circuits everything unless
    /// `overwrite` is set. Nothing is persisted unless the strategy fully
    /// succeeds.
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginOutcome> {
        let cloud = self.store.load_cloud(&request.domain_name, &request.region)?;

        if !request.overwrite && cloud.unscoped_token.is_valid()? {
            tracing::info!("Unscoped token for {} is still valid, skipping login", cloud.domain.name);
            return Ok(LoginOutcome {
                token: cloud.unscoped_token.clone(),
                cloud,
                reused: true,
                refresh: RefreshReport::default(),
            });
        }

        let endpoints = self.endpoints(&cloud.region)?;
        tracing::info!(
            "Logging in to {} with {}",
            request.domain_name,
            request.protocol.as_str()
        );

        let response = self
            .authenticate(&endpoints, request)
            .await
            .map_err(as_authentication_failure)?;

        let cloud = self.persist(cloud, request, &response)?;

        if let Err(e) = projects::sync_projects(&self.client, &endpoints, &self.store).await {
            tracing::warn!("Could not list projects for {}: {}", cloud.domain.name, e);
        }

        let refresh = self.token_manager()?.refresh_all().await?;
        let cloud = self.store.active_cloud()?;

        Ok(LoginOutcome {
            token: cloud.unscoped_token.clone(),
            cloud,
            reused: false,
            refresh,
        })
    }

    async fn authenticate(&self, endpoints: &Endpoints, request: &LoginRequest) -> Result<TokenResponse> {
        match request.protocol {
            Protocol::Iam => iam::authenticate(&self.client, endpoints, request).await,
            Protocol::Saml => saml::authenticate(&self.client, endpoints, request).await,
            Protocol::Oidc => {
                oidc::authenticate(&self.client, endpoints, request, &self.config.oidc, self.headless)
                    .await
            }
        }
    }

    fn persist(&self, mut cloud: Cloud, request: &LoginRequest, response: &TokenResponse) -> Result<Cloud> {
        let token = &response.token;
        if token.secret.is_empty() {
            return Err(AuthError::AuthenticationFailed(
                "the identity service returned an empty token".to_string(),
            ));
        }

        if token.user.domain.name != request.domain_name {
            return Err(AuthError::WrongDomainMismatch {
                expected: request.domain_name.clone(),
                actual: token.user.domain.name.clone(),
            });
        }

        cloud.domain.id = token.user.domain.id.clone();
        if !cloud.username.is_empty() && cloud.username != token.user.name {
            tracing::info!(
                "User changed from {} to {}, clearing scoped tokens",
                cloud.username,
                token.user.name
            );
            cloud.clear_scoped_tokens();
        }
        cloud.username = token.user.name.clone();
        cloud.unscoped_token = response.to_token();

        self.store.save_active_cloud(&cloud)?;
        tracing::debug!("Unscoped token for {} saved", cloud.domain.name);
        Ok(cloud)
    }

    /// Remove a cloud and all of its tokens.
    pub fn logout(&self, domain_name: &str) -> Result<bool> {
        self.store.remove_cloud(domain_name)
    }
}

/// Transport and protocol failures of a login surface as one kind.
fn as_authentication_failure(error: AuthError) -> AuthError {
    match error {
        AuthError::Http(_) | AuthError::HttpStatus { .. } | AuthError::Saml(_) | AuthError::Json(_) => {
            AuthError::AuthenticationFailed(error.to_string())
        }
        other => other,
    }
}
