use crate::auth::AuthManager;
use crate::cli::ProjectsCommand;
use crate::config::Config;
use crate::error::Result;
use crate::projects;
use crate::store::CredentialStore;

pub async fn execute(config: Config, command: ProjectsCommand) -> Result<()> {
    let ProjectsCommand::List { json } = command;

    let store = CredentialStore::from_config(&config)?;
    let auth = AuthManager::new(config, store, false)?;
    let cloud = auth.store().active_cloud()?;
    let endpoints = auth.endpoints(&cloud.region)?;

    let projects = projects::sync_projects(auth.client(), &endpoints, auth.store()).await?;

    if json {
        let listing = projects
            .iter()
            .map(|p| {
                Ok(serde_json::json!({
                    "name": p.name,
                    "id": p.id,
                    "token_valid": p.scoped_token.is_valid()?,
                }))
            })
            .collect::<Result<Vec<serde_json::Value>>>()?;
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    println!("Projects of {}:\n", cloud.domain.name);
    for project in projects {
        println!(
            "  {} ({})  token: {}",
            project.name,
            project.id,
            project.scoped_token.expiration_display()?
        );
    }

    Ok(())
}
