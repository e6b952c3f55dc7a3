// Configuration management
use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR: &str = "otc-auth";
const STORE_FILE_NAME: &str = ".otc-auth-config";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub oidc: OidcConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Overrides the regional IAM base URL (including the `/v3` suffix)
    pub iam_endpoint: Option<String>,
    #[serde(default)]
    pub skip_tls_verification: bool,
}

fn default_region() -> String {
    "eu-de".to_string()
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            iam_endpoint: None,
            skip_tls_verification: false,
        }
    }
}

/// Fixed-delay retry policy for scoped token requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
}

fn default_attempts() -> u32 {
    5
}

fn default_delay_secs() -> u64 {
    5
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_secs: default_delay_secs(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_listen_address() -> String {
    "localhost:8088".to_string()
}

fn default_redirect_url() -> String {
    "http://localhost:8088/oidc/auth".to_string()
}

fn default_scopes() -> Vec<String> {
    ["openid", "profile", "roles", "name", "groups", "email"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            redirect_url: default_redirect_url(),
            scopes: default_scopes(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl OidcConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Credential store file; defaults to ~/.otc-auth-config
    pub path: Option<PathBuf>,
}

impl Config {
    /// Get the config directory path
    ///
    /// Priority:
    /// 1. XDG_CONFIG_HOME/otc-auth (if env var is set)
    /// 2. ~/.config/otc-auth (if ~/.config exists)
    /// 3. ~/.otc-auth (fallback on Unix, doesn't create ~/.config)
    /// 4. Platform default on Windows
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join(APP_DIR));
        }

        #[cfg(unix)]
        {
            if let Some(home_dir) = dirs::home_dir() {
                let xdg_config = home_dir.join(".config");

                if xdg_config.exists() {
                    return Ok(xdg_config.join(APP_DIR));
                }

                return Ok(home_dir.join(".otc-auth"));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(config_dir) = dirs::config_dir() {
                return Ok(config_dir.join(APP_DIR));
            }
        }

        Err(AuthError::ConfigError(
            "Could not determine config directory".to_string(),
        ))
    }

    /// Get the config file path
    pub fn config_file_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, environment variables, and defaults
    pub fn load() -> Result<Self> {
        let config_path = Self::config_file_path()?;

        let mut config = if config_path.exists() {
            tracing::debug!("Loading config from: {}", config_path.display());
            let contents = fs::read_to_string(&config_path)
                .map_err(|e| AuthError::ConfigError(format!("Failed to read config file: {}", e)))?;
            Self::from_toml(&contents)?
        } else {
            tracing::debug!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Config::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env(&mut self) {
        if let Ok(region) = std::env::var("REGION") {
            tracing::debug!("Using REGION from environment: {}", region);
            self.cloud.region = region;
        }

        if let Ok(skip) = std::env::var("SKIP_TLS_VERIFICATION") {
            self.cloud.skip_tls_verification = matches!(skip.as_str(), "1" | "true" | "TRUE");
        }

        if let Ok(path) = std::env::var("OTC_AUTH_CONFIG_FILE") {
            tracing::debug!("Using OTC_AUTH_CONFIG_FILE from environment: {}", path);
            self.store.path = Some(PathBuf::from(path));
        }

        if let Ok(scopes) = std::env::var("OIDC_SCOPES") {
            self.oidc.scopes = scopes
                .split([',', ' '])
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
        }
    }

    /// Path of the credential store file
    pub fn store_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.store.path {
            return Ok(path.clone());
        }
        dirs::home_dir()
            .map(|home| home.join(STORE_FILE_NAME))
            .ok_or_else(|| AuthError::StoreError("Could not determine home directory".to_string()))
    }

    /// Create a sample config file with comments
    pub fn create_sample() -> Result<()> {
        let config_dir = Self::config_dir()?;
        let config_path = Self::config_file_path()?;

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).map_err(|e| {
                AuthError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Don't overwrite existing config
        if config_path.exists() {
            return Err(AuthError::ConfigError(format!(
                "Config file already exists at: {}",
                config_path.display()
            )));
        }

        let sample_config = r#"# otc-auth configuration
# Location priority:
#   1. $XDG_CONFIG_HOME/otc-auth/config.toml (if XDG_CONFIG_HOME is set)
#   2. ~/.config/otc-auth/config.toml (if ~/.config exists)
#   3. ~/.otc-auth/config.toml (fallback)
#
# Environment overrides: REGION, SKIP_TLS_VERIFICATION, OTC_AUTH_CONFIG_FILE, OIDC_SCOPES

[cloud]
region = "eu-de"
# iam_endpoint = "https://iam.eu-de.otc.t-systems.com:443/v3"
skip_tls_verification = false

[retry]
# Scoped token requests are retried with a fixed delay
attempts = 5
delay_secs = 5

[oidc]
listen_address = "localhost:8088"
redirect_url = "http://localhost:8088/oidc/auth"
scopes = ["openid", "profile", "roles", "name", "groups", "email"]
# How long to wait for the browser login to finish
timeout_secs = 300

[store]
# path = "/home/me/.otc-auth-config"
"#;

        fs::write(&config_path, sample_config)
            .map_err(|e| AuthError::ConfigError(format!("Failed to write sample config: {}", e)))?;

        println!("Created sample config file at: {}", config_path.display());
        Ok(())
    }
}
