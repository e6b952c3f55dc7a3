// IAM endpoint URLs
use crate::config::CloudConfig;
use crate::error::{AuthError, Result};

/// URLs of the identity service for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base: String,
}

impl Endpoints {
    pub fn for_region(region: &str) -> Result<Self> {
        let base = match region {
            "" => {
                return Err(AuthError::ConfigError(
                    "empty region supplied, can't generate IAM URL".to_string(),
                ))
            }
            "eu-ch2" => "https://iam-pub.eu-ch2.sc.otc.t-systems.com:443/v3".to_string(),
            region => format!("https://iam.{}.otc.t-systems.com:443/v3", region),
        };
        Ok(Self { base })
    }

    /// Explicit `iam_endpoint` wins over the regional default.
    pub fn resolve(config: &CloudConfig, region: &str) -> Result<Self> {
        match &config.iam_endpoint {
            Some(base) if !base.is_empty() => Ok(Self::with_base(base)),
            _ => Self::for_region(region),
        }
    }

    pub fn with_base(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn tokens(&self) -> String {
        format!("{}/auth/tokens", self.base)
    }

    pub fn projects(&self) -> String {
        format!("{}/auth/projects", self.base)
    }

    pub fn federation_auth(&self, identity_provider: &str, protocol: &str) -> String {
        format!(
            "{}/OS-FEDERATION/identity_providers/{}/protocols/{}/auth",
            self.base,
            urlencoding::encode(identity_provider),
            protocol
        )
    }
}
