use crate::error::{AuthError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cloud token as persisted in the credential store.
///
/// Timestamps are kept as the RFC 3339 strings IAM hands out so the file
/// stays byte-compatible with what the service returned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Token {
    #[serde(default)]
    pub secret: String,
    #[serde(default)]
    pub issued_at: String,
    #[serde(default)]
    pub expires_at: String,
}

impl Token {
    /// Parsed expiry, `None` for a token that was never issued.
    pub fn expires_at(&self) -> Result<Option<DateTime<Utc>>> {
        if self.expires_at.is_empty() {
            return Ok(None);
        }
        DateTime::parse_from_rfc3339(&self.expires_at)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| AuthError::InvalidExpiry(self.expires_at.clone()))
    }

    /// A token is valid when it has a secret and its expiry is strictly in the future.
    ///
    /// An expiry that is present but unparsable is an error, never "invalid".
    pub fn is_valid(&self) -> Result<bool> {
        let expires_at = match self.expires_at()? {
            Some(t) => t,
            None => return Ok(false),
        };
        if self.secret.is_empty() {
            return Ok(false);
        }
        Ok(expires_at > Utc::now())
    }

    pub fn expires_in_minutes(&self) -> Result<i64> {
        Ok(self
            .expires_at()?
            .map(|t| (t - Utc::now()).num_minutes().max(0))
            .unwrap_or(0))
    }

    /// Format expiration time as human-readable string
    pub fn expiration_display(&self) -> Result<String> {
        match self.expires_at()? {
            Some(t) => Ok(crate::expiry::format_time_remaining(&t)),
            None => Ok("NOT ISSUED".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NameAndId {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
}

pub type Cluster = NameAndId;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(rename = "scopedToken", default)]
    pub scoped_token: Token,
}

/// One cloud context: a domain with its unscoped token and per-project tokens.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cloud {
    #[serde(default)]
    pub region: String,
    pub domain: NameAndId,
    #[serde(rename = "unscopedToken", default)]
    pub unscoped_token: Token,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub clusters: Vec<Cluster>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub active: bool,
}

impl Cloud {
    pub fn new(domain_name: &str, region: &str) -> Self {
        Self {
            region: region.to_string(),
            domain: NameAndId {
                name: domain_name.to_string(),
                id: String::new(),
            },
            ..Default::default()
        }
    }

    /// Exact-name project lookup.
    pub fn project(&self, name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn project_mut(&mut self, name: &str) -> Option<&mut Project> {
        self.projects.iter_mut().find(|p| p.name == name)
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.iter().map(|p| p.name.clone()).collect()
    }

    /// Drop every cached scoped token, keeping the project list itself.
    pub fn clear_scoped_tokens(&mut self) {
        for project in &mut self.projects {
            project.scoped_token = Token::default();
        }
    }
}

/// Root document of the credential store file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloudsFile {
    #[serde(default)]
    pub clouds: Vec<Cloud>,
}

impl CloudsFile {
    pub fn contains(&self, domain_name: &str) -> bool {
        self.clouds.iter().any(|c| c.domain.name == domain_name)
    }

    pub fn active_index(&self) -> Result<usize> {
        let mut active = self
            .clouds
            .iter()
            .enumerate()
            .filter(|(_, c)| c.active)
            .map(|(i, _)| i);

        match (active.next(), active.next()) {
            (Some(index), None) => Ok(index),
            (None, _) => Err(AuthError::NoActiveCloud),
            (Some(_), Some(_)) => Err(AuthError::MultipleActiveClouds),
        }
    }

    pub fn active(&self) -> Result<&Cloud> {
        let index = self.active_index()?;
        Ok(&self.clouds[index])
    }

    /// Mark exactly one cloud active. Returns false if the domain is unknown.
    pub fn set_active(&mut self, domain_name: &str) -> bool {
        if !self.contains(domain_name) {
            return false;
        }
        for cloud in &mut self.clouds {
            cloud.active = cloud.domain.name == domain_name;
        }
        true
    }

    /// Returns true if a cloud was removed.
    pub fn remove(&mut self, domain_name: &str) -> bool {
        let before = self.clouds.len();
        self.clouds.retain(|c| c.domain.name != domain_name);
        before != self.clouds.len()
    }
}

/// Token issuance response body (`POST /v3/auth/tokens`).
///
/// The secret never comes from the body; it is filled in from `X-Subject-Token`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub token: TokenBody,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenBody {
    #[serde(skip)]
    pub secret: String,
    #[serde(default)]
    pub expires_at: String,
    #[serde(default)]
    pub issued_at: String,
    #[serde(default)]
    pub user: TokenUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenUser {
    #[serde(default)]
    pub domain: NameAndId,
    #[serde(default)]
    pub name: String,
}

impl TokenResponse {
    pub fn to_token(&self) -> Token {
        Token {
            secret: self.token.secret.clone(),
            issued_at: self.token.issued_at.clone(),
            expires_at: self.token.expires_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectsResponse {
    #[serde(default)]
    pub projects: Vec<NameAndId>,
}

/// Which strategy produces the unscoped token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Iam,
    Saml,
    Oidc,
}

impl Protocol {
    /// Resolve an auth type (`iam` | `idp`) plus optional IdP sub-protocol.
    pub fn from_selector(auth_type: &str, idp_protocol: Option<&str>) -> Result<Self> {
        match (auth_type, idp_protocol) {
            ("iam", _) => Ok(Protocol::Iam),
            ("idp", Some("saml")) => Ok(Protocol::Saml),
            ("idp", Some("oidc")) => Ok(Protocol::Oidc),
            ("idp", other) => Err(AuthError::UnsupportedProtocol(format!(
                "idp/{}",
                other.unwrap_or("<none>")
            ))),
            (other, _) => Err(AuthError::UnsupportedProtocol(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Protocol::Iam => "iam",
            Protocol::Saml => "saml",
            Protocol::Oidc => "oidc",
        }
    }
}

/// Everything a login needs, regardless of protocol.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub protocol: Protocol,
    pub domain_name: String,
    pub region: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub otp: Option<String>,
    pub user_domain_id: Option<String>,
    pub idp_name: Option<String>,
    pub idp_url: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub service_account: bool,
    pub overwrite: bool,
}

impl LoginRequest {
    pub fn new(protocol: Protocol, domain_name: &str, region: &str) -> Self {
        Self {
            protocol,
            domain_name: domain_name.to_string(),
            region: region.to_string(),
            username: None,
            password: None,
            otp: None,
            user_domain_id: None,
            idp_name: None,
            idp_url: None,
            client_id: None,
            client_secret: None,
            service_account: false,
            overwrite: false,
        }
    }

    /// Fetch a field the selected protocol cannot do without.
    pub fn require<'a>(&self, value: &'a Option<String>, name: &str) -> Result<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                AuthError::ConfigError(format!(
                    "{} is required for {} login",
                    name,
                    self.protocol.as_str()
                ))
            })
    }
}

/// Result of the IdP leg of an OIDC login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OidcCredentials {
    pub bearer_token: String,
    pub preferred_username: String,
}
