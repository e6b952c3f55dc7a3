// Project discovery for the active cloud
use crate::endpoints::Endpoints;
use crate::error::{AuthError, Result};
use crate::http::{self, X_AUTH_TOKEN};
use crate::models::{NameAndId, Project, ProjectsResponse};
use crate::store::CredentialStore;
use reqwest::Client;

/// Fetch the projects visible to the active cloud's unscoped token and merge
/// them into the store.
pub async fn sync_projects(
    client: &Client,
    endpoints: &Endpoints,
    store: &CredentialStore,
) -> Result<Vec<Project>> {
    let cloud = store.active_cloud()?;
    if !cloud.unscoped_token.is_valid()? {
        return Err(AuthError::LoginRequired(cloud.domain.name));
    }

    tracing::debug!("Listing projects for {}", cloud.domain.name);
    let response = client
        .get(endpoints.projects())
        .header(X_AUTH_TOKEN, &cloud.unscoped_token.secret)
        .send()
        .await?;
    let bytes = http::body_bytes(response).await?;
    let listed: ProjectsResponse = serde_json::from_slice(&bytes)?;

    let projects = merge_projects(&cloud.projects, listed.projects);
    store.update_projects(projects.clone())?;

    tracing::info!("Found {} projects for {}", projects.len(), cloud.domain.name);
    Ok(projects)
}

/// Known projects keep their scoped token when name and id still match.
fn merge_projects(known: &[Project], listed: Vec<NameAndId>) -> Vec<Project> {
    let mut projects: Vec<Project> = listed
        .into_iter()
        .map(|remote| {
            let scoped_token = known
                .iter()
                .find(|p| p.name == remote.name && p.id == remote.id)
                .map(|p| p.scoped_token.clone())
                .unwrap_or_default();
            Project {
                name: remote.name,
                id: remote.id,
                scoped_token,
            }
        })
        .collect();
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    projects.dedup_by(|a, b| a.name == b.name);
    projects
}
