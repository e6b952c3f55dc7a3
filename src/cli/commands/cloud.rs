use crate::cli::CloudCommand;
use crate::config::Config;
use crate::error::Result;
use crate::store::CredentialStore;

pub fn execute(config: Config, command: CloudCommand) -> Result<()> {
    let store = CredentialStore::from_config(&config)?;

    match command {
        CloudCommand::List => {
            let clouds = store.clouds()?;
            if clouds.is_empty() {
                println!("No clouds configured. Log in first with 'otc-auth login'");
                return Ok(());
            }
            for cloud in clouds {
                let marker = if cloud.active { "*" } else { " " };
                println!(
                    "{} {} ({}, {} projects)",
                    marker,
                    cloud.domain.name,
                    cloud.region,
                    cloud.projects.len()
                );
            }
        }
        CloudCommand::Activate { domain_name } => {
            store.set_active(&domain_name)?;
            println!("✓ {} is now the active cloud", domain_name);
        }
    }

    Ok(())
}
