use crate::auth::AuthManager;
use crate::cli::TokenCommand;
use crate::config::Config;
use crate::error::Result;
use crate::store::CredentialStore;

pub async fn execute(config: Config, command: TokenCommand) -> Result<()> {
    let TokenCommand::Scoped { project_name } = command;

    let store = CredentialStore::from_config(&config)?;
    let auth = AuthManager::new(config, store, false)?;
    let token = auth
        .token_manager()?
        .ensure_scoped_token(&project_name)
        .await?;

    eprintln!(
        "Scoped token for {} expires in: {}",
        project_name,
        token.expiration_display()?
    );
    // Bare secret on stdout so it can be captured by scripts
    println!("{}", token.secret);

    Ok(())
}
