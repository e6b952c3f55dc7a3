use crate::auth::AuthManager;
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::store::CredentialStore;

pub fn execute(config: Config, domain_name: &str) -> Result<()> {
    let store = CredentialStore::from_config(&config)?;
    let auth = AuthManager::new(config, store, false)?;

    if !auth.logout(domain_name)? {
        return Err(AuthError::CloudNotFound(domain_name.to_string()));
    }

    println!("✓ Removed cloud {}", domain_name);
    Ok(())
}
