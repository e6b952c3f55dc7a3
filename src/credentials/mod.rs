// Scoped token lifecycle: cached per project, re-issued when expired
mod fetcher;

pub use fetcher::TokenFetcher;

use crate::error::{AuthError, Result};
use crate::models::{Cloud, Project, Token};
use crate::store::CredentialStore;

/// Per-project results of a refresh over the whole active cloud.
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub refreshed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

/// High-level scoped token management
pub struct ScopedTokenManager<'a> {
    store: &'a CredentialStore,
    fetcher: TokenFetcher,
}

impl<'a> ScopedTokenManager<'a> {
    pub fn new(store: &'a CredentialStore, fetcher: TokenFetcher) -> Self {
        Self { store, fetcher }
    }

    /// Return a valid scoped token for `project_name`.
    ///
    /// A cached valid token is returned without a network call. Otherwise a
    /// new one is issued and the store is rewritten before returning, so
    /// callers must not run this concurrently for the same store.
    pub async fn ensure_scoped_token(&self, project_name: &str) -> Result<Token> {
        let mut cloud = self.store.active_cloud()?;
        let project = cloud
            .project(project_name)
            .cloned()
            .ok_or_else(|| AuthError::ProjectNotFound(project_name.to_string()))?;

        if project.scoped_token.is_valid()? {
            tracing::debug!("Using cached scoped token for {}", project_name);
            return Ok(project.scoped_token);
        }

        let token = self.issue(&cloud, &project).await?;
        if let Some(entry) = cloud.project_mut(project_name) {
            entry.scoped_token = token.clone();
        }
        self.store.save_active_cloud(&cloud)?;

        tracing::info!("Scoped token for {} refreshed", project_name);
        Ok(token)
    }

    /// Refresh every project whose token is missing or expired.
    ///
    /// One project failing does not stop the others; failures are logged and
    /// returned in the report. A project whose stored expiry cannot be parsed
    /// is reported as failed and left untouched. Store errors still abort.
    pub async fn refresh_all(&self) -> Result<RefreshReport> {
        let mut cloud = self.store.active_cloud()?;
        let mut report = RefreshReport::default();

        for index in 0..cloud.projects.len() {
            let project = cloud.projects[index].clone();
            match project.scoped_token.is_valid() {
                Ok(true) => continue,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Skipping scoped token of {}: {}", project.name, e);
                    report.failed.push((project.name, e.to_string()));
                    continue;
                }
            }

            match self.issue(&cloud, &project).await {
                Ok(token) => {
                    cloud.projects[index].scoped_token = token;
                    report.refreshed.push(project.name);
                }
                Err(e) => {
                    tracing::warn!("Could not refresh scoped token for {}: {}", project.name, e);
                    report.failed.push((project.name, e.to_string()));
                }
            }
        }

        if !report.refreshed.is_empty() {
            self.store.save_active_cloud(&cloud)?;
        }
        Ok(report)
    }

    async fn issue(&self, cloud: &Cloud, project: &Project) -> Result<Token> {
        if !cloud.unscoped_token.is_valid()? {
            return Err(AuthError::LoginRequired(cloud.domain.name.clone()));
        }
        self.fetcher
            .fetch_scoped_token(&cloud.unscoped_token.secret, project)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::endpoints::Endpoints;
    use crate::http::X_SUBJECT_TOKEN;
    use reqwest::Client;
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn token(secret: &str, expires_at: &str) -> Token {
        Token {
            secret: secret.to_string(),
            issued_at: "2024-01-01T00:00:00Z".to_string(),
            expires_at: expires_at.to_string(),
        }
    }

    fn project(name: &str, scoped: Token) -> Project {
        Project {
            name: name.to_string(),
            id: format!("{}-id", name),
            scoped_token: scoped,
        }
    }

    fn seeded_store(dir: &TempDir, projects: Vec<Project>) -> CredentialStore {
        let store = CredentialStore::new(dir.path().join("store.json"));
        let mut cloud = store.load_cloud("d", "eu-de").unwrap();
        cloud.unscoped_token = token("unscoped", "2099-01-01T00:00:00Z");
        cloud.projects = projects;
        store.save_active_cloud(&cloud).unwrap();
        store
    }

    fn fetcher(base: &str) -> TokenFetcher {
        TokenFetcher::new(
            Client::new(),
            Endpoints::with_base(base),
            RetryConfig {
                attempts: 3,
                delay_secs: 0,
            },
        )
    }

    fn issued(secret: &str) -> ResponseTemplate {
        ResponseTemplate::new(201)
            .insert_header(X_SUBJECT_TOKEN, secret)
            .set_body_json(json!({
                "token": {
                    "expires_at": "2099-06-01T00:00:00Z",
                    "issued_at": "2099-05-31T00:00:00Z",
                    "user": {"domain": {"id": "d1", "name": "d"}, "name": "u"}
                }
            }))
    }

    #[tokio::test]
    async fn test_cached_token_returned_without_network() {
        let dir = TempDir::new().unwrap();
        let cached = token("cached", "2099-01-01T00:00:00Z");
        let store = seeded_store(&dir, vec![project("app", cached.clone())]);

        // Nothing listens here; any request would fail.
        let manager = ScopedTokenManager::new(&store, fetcher("http://127.0.0.1:9/v3"));
        assert_eq!(manager.ensure_scoped_token("app").await.unwrap(), cached);
    }

    #[tokio::test]
    async fn test_unknown_project() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, vec![]);
        let manager = ScopedTokenManager::new(&store, fetcher("http://127.0.0.1:9/v3"));
        assert!(matches!(
            manager.ensure_scoped_token("nope").await,
            Err(AuthError::ProjectNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_expiry_raises() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, vec![project("app", token("x", "yesterday"))]);
        let manager = ScopedTokenManager::new(&store, fetcher("http://127.0.0.1:9/v3"));
        assert!(matches!(
            manager.ensure_scoped_token("app").await,
            Err(AuthError::InvalidExpiry(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_reissued_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/auth/tokens"))
            .and(body_partial_json(json!({"auth": {"scope": {"project": {"id": "app-id"}}}})))
            .respond_with(issued("fresh"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, vec![project("app", token("old", "2000-01-01T00:00:00Z"))]);
        let manager = ScopedTokenManager::new(&store, fetcher(&format!("{}/v3", server.uri())));

        let fresh = manager.ensure_scoped_token("app").await.unwrap();
        assert_eq!(fresh.secret, "fresh");

        let saved = store.active_cloud().unwrap();
        assert_eq!(saved.project("app").unwrap().scoped_token, fresh);

        // Second call is served from the store.
        assert_eq!(manager.ensure_scoped_token("app").await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn test_exhausted_refresh_leaves_store_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let old = token("old", "2000-01-01T00:00:00Z");
        let store = seeded_store(&dir, vec![project("app", old.clone())]);
        let manager = ScopedTokenManager::new(&store, fetcher(&format!("{}/v3", server.uri())));

        assert!(matches!(
            manager.ensure_scoped_token("app").await,
            Err(AuthError::TokenRefreshExhausted { attempts: 3, .. })
        ));
        assert_eq!(store.active_cloud().unwrap().project("app").unwrap().scoped_token, old);
    }

    #[tokio::test]
    async fn test_expired_unscoped_token_requires_login() {
        let dir = TempDir::new().unwrap();
        let store = seeded_store(&dir, vec![project("app", Token::default())]);
        let mut cloud = store.active_cloud().unwrap();
        cloud.unscoped_token = token("unscoped", "2000-01-01T00:00:00Z");
        store.save_active_cloud(&cloud).unwrap();

        let manager = ScopedTokenManager::new(&store, fetcher("http://127.0.0.1:9/v3"));
        assert!(matches!(
            manager.ensure_scoped_token("app").await,
            Err(AuthError::LoginRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_all_continues_past_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"auth": {"scope": {"project": {"id": "good-id"}}}})))
            .respond_with(issued("good-token"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"auth": {"scope": {"project": {"id": "bad-id"}}}})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let valid = token("still-good", "2099-01-01T00:00:00Z");
        let store = seeded_store(
            &dir,
            vec![
                project("bad", Token::default()),
                project("good", Token::default()),
                project("valid", valid.clone()),
            ],
        );
        let manager = ScopedTokenManager::new(&store, fetcher(&format!("{}/v3", server.uri())));

        let report = manager.refresh_all().await.unwrap();
        assert_eq!(report.refreshed, vec!["good".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");

        let saved = store.active_cloud().unwrap();
        assert_eq!(saved.project("good").unwrap().scoped_token.secret, "good-token");
        assert_eq!(saved.project("valid").unwrap().scoped_token, valid);
        assert!(saved.project("bad").unwrap().scoped_token.secret.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_all_reports_corrupt_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(issued("replacement"))
            .expect(0)
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let corrupt = token("kept", "next tuesday");
        let store = seeded_store(&dir, vec![project("app", corrupt.clone())]);
        let manager = ScopedTokenManager::new(&store, fetcher(&format!("{}/v3", server.uri())));

        let report = manager.refresh_all().await.unwrap();
        assert!(report.refreshed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "app");
        assert!(report.failed[0].1.contains("next tuesday"));

        assert_eq!(store.active_cloud().unwrap().project("app").unwrap().scoped_token, corrupt);
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
