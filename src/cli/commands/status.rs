use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::expiry::{is_expiring_soon, EXPIRY_WARNING_MINUTES};
use crate::store::CredentialStore;

pub fn execute(config: Config, json: bool) -> Result<()> {
    let store = CredentialStore::from_config(&config)?;

    let cloud = match store.active_cloud() {
        Ok(cloud) => cloud,
        Err(AuthError::NoActiveCloud) => {
            if json {
                println!("{{\"active\":false,\"reason\":\"no_active_cloud\"}}");
            } else {
                println!("No active cloud");
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e),
    };

    let token = &cloud.unscoped_token;
    if !token.is_valid()? {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "active": false,
                    "reason": "expired",
                    "domain": cloud.domain.name,
                })
            );
        } else {
            println!("Session for {} expired or missing", cloud.domain.name);
        }
        std::process::exit(1);
    }

    let expires_in_minutes = token.expires_in_minutes()?;
    if json {
        println!(
            "{}",
            serde_json::json!({
                "active": true,
                "domain": cloud.domain.name,
                "region": cloud.region,
                "username": cloud.username,
                "expires_in_minutes": expires_in_minutes,
                "projects": cloud.project_names(),
            })
        );
        return Ok(());
    }

    println!("Active cloud: {} ({})", cloud.domain.name, cloud.region);
    println!("User: {}", cloud.username);
    println!("Session expires in {} minutes", expires_in_minutes);
    if let Some(expires_at) = token.expires_at()? {
        if is_expiring_soon(&expires_at, EXPIRY_WARNING_MINUTES) {
            println!("⚠ Session expires soon, consider logging in again");
        }
    }

    for project in &cloud.projects {
        println!(
            "  {}: {}",
            project.name,
            project.scoped_token.expiration_display()?
        );
    }

    Ok(())
}
