// Credential store: one JSON file holding every known cloud
use crate::config::Config;
use crate::error::{AuthError, Result};
use crate::models::{Cloud, CloudsFile, Project};
use std::fs;
use std::path::{Path, PathBuf};

/// File-backed store of cloud records.
///
/// Every update reads the whole file, mutates it in memory and rewrites it.
/// There is no locking: two processes writing at once can lose an update.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.store_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the store, creating an empty one on first use.
    pub fn read(&self) -> Result<CloudsFile> {
        if !self.path.exists() {
            self.write(&CloudsFile::default())?;
            tracing::debug!("Created credential store at {}", self.path.display());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| AuthError::StoreError(format!("Failed to read store file: {}", e)))?;

        if contents.trim().is_empty() {
            return Ok(CloudsFile::default());
        }

        Ok(serde_json::from_str(&contents)?)
    }

    fn write(&self, content: &CloudsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(content)?;
        fs::write(&self.path, json)
            .map_err(|e| AuthError::StoreError(format!("Failed to write store file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    /// Register the domain if needed and make it the only active cloud.
    pub fn load_cloud(&self, domain_name: &str, region: &str) -> Result<Cloud> {
        let mut content = self.read()?;

        if !content.contains(domain_name) {
            tracing::info!("Registering new cloud {}", domain_name);
            content.clouds.push(Cloud::new(domain_name, region));
        }
        content.set_active(domain_name);

        let index = content.active_index()?;
        if !region.is_empty() {
            content.clouds[index].region = region.to_string();
        }
        self.write(&content)?;

        tracing::debug!("Cloud {} loaded and set to active", domain_name);
        Ok(content.clouds[index].clone())
    }

    pub fn active_cloud(&self) -> Result<Cloud> {
        Ok(self.read()?.active()?.clone())
    }

    /// Replace the active record with `cloud`.
    pub fn save_active_cloud(&self, cloud: &Cloud) -> Result<()> {
        let mut content = self.read()?;
        let index = content.active_index()?;
        content.clouds[index] = Cloud {
            active: true,
            ..cloud.clone()
        };
        self.write(&content)?;
        tracing::debug!("Saved cloud {}", cloud.domain.name);
        Ok(())
    }

    pub fn set_active(&self, domain_name: &str) -> Result<()> {
        let mut content = self.read()?;
        if !content.set_active(domain_name) {
            return Err(AuthError::CloudNotFound(domain_name.to_string()));
        }
        self.write(&content)
    }

    /// Remove a cloud record. Returns false when the domain was unknown.
    pub fn remove_cloud(&self, domain_name: &str) -> Result<bool> {
        let mut content = self.read()?;
        if !content.remove(domain_name) {
            tracing::warn!("Cloud with name {} doesn't exist", domain_name);
            return Ok(false);
        }
        self.write(&content)?;
        Ok(true)
    }

    pub fn update_projects(&self, projects: Vec<Project>) -> Result<()> {
        let mut content = self.read()?;
        let index = content.active_index()?;
        content.clouds[index].projects = projects;
        self.write(&content)
    }

    pub fn clouds(&self) -> Result<Vec<Cloud>> {
        Ok(self.read()?.clouds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Token;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("nested").join(".otc-auth-config"))
    }

    fn project(name: &str, secret: &str) -> Project {
        Project {
            name: name.to_string(),
            id: format!("{}-id", name),
            scoped_token: Token {
                secret: secret.to_string(),
                issued_at: "2030-01-01T00:00:00Z".to_string(),
                expires_at: "2030-01-02T00:00:00Z".to_string(),
            },
        }
    }

    #[test]
    fn test_store_created_on_first_read() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.read().unwrap().clouds.is_empty());
        assert!(store.path().exists());
        assert!(matches!(store.active_cloud(), Err(AuthError::NoActiveCloud)));
    }

    #[test]
    fn test_load_cloud_registers_and_activates() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.load_cloud("a", "eu-de").unwrap();
        store.load_cloud("b", "eu-nl").unwrap();

        let clouds = store.clouds().unwrap();
        assert_eq!(clouds.len(), 2);
        assert_eq!(clouds.iter().filter(|c| c.active).count(), 1);
        assert_eq!(store.active_cloud().unwrap().domain.name, "b");
        assert_eq!(store.active_cloud().unwrap().region, "eu-nl");

        // Loading again does not duplicate
        store.load_cloud("a", "").unwrap();
        assert_eq!(store.clouds().unwrap().len(), 2);
        assert_eq!(store.active_cloud().unwrap().region, "eu-de");
    }

    #[test]
    fn test_switching_domains_keeps_scoped_tokens_isolated() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store.load_cloud("a", "eu-de").unwrap();
        store.update_projects(vec![project("shared", "token-a")]).unwrap();

        store.load_cloud("b", "eu-de").unwrap();
        store.update_projects(vec![project("shared", "token-b")]).unwrap();

        store.set_active("a").unwrap();
        let a = store.active_cloud().unwrap();
        assert_eq!(a.project("shared").unwrap().scoped_token.secret, "token-a");

        store.set_active("b").unwrap();
        let b = store.active_cloud().unwrap();
        assert_eq!(b.project("shared").unwrap().scoped_token.secret, "token-b");

        store.set_active("a").unwrap();
        assert_eq!(store.active_cloud().unwrap(), a);
    }

    #[test]
    fn test_save_active_cloud_replaces_record() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        let mut cloud = store.load_cloud("a", "eu-de").unwrap();

        cloud.username = "alice".to_string();
        cloud.unscoped_token.secret = "s".to_string();
        store.save_active_cloud(&cloud).unwrap();

        let saved = store.active_cloud().unwrap();
        assert_eq!(saved.username, "alice");
        assert!(saved.active);
    }

    #[test]
    fn test_remove_and_unknown_activation() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.load_cloud("a", "eu-de").unwrap();

        assert!(matches!(
            store.set_active("zzz"),
            Err(AuthError::CloudNotFound(_))
        ));
        assert!(store.remove_cloud("a").unwrap());
        assert!(!store.remove_cloud("a").unwrap());
        assert!(matches!(store.active_cloud(), Err(AuthError::NoActiveCloud)));
    }
}
