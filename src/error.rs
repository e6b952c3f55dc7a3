use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Unsupported protocol: {0}. Allowed values are \"iam\", or \"idp\" with \"saml\" or \"oidc\"")]
    UnsupportedProtocol(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid one-time password.\n\nPlease try it again with a new OTP code")]
    InvalidOtp,

    #[error("Authorization made for wrong cloud configuration: expected domain '{expected}', token belongs to '{actual}'")]
    WrongDomainMismatch { expected: String, actual: String },

    #[error("Project '{0}' not found. Use 'otc-auth projects list' to see the projects of the active cloud")]
    ProjectNotFound(String),

    #[error("Could not obtain a scoped token for project '{project}' after {attempts} attempts: {last_error}")]
    TokenRefreshExhausted {
        project: String,
        attempts: u32,
        last_error: String,
    },

    #[error("OIDC state does not match")]
    StateMismatch,

    #[error("ID token verification failed: {0}")]
    TokenVerificationFailed(String),

    #[error("Could not parse token expiry '{0}'")]
    InvalidExpiry(String),

    #[error("No active cloud. Log in first or activate a cloud with 'otc-auth cloud activate'")]
    NoActiveCloud,

    #[error("More than one cloud is marked active in the credential store")]
    MultipleActiveClouds,

    #[error("Cloud '{0}' not found in the credential store")]
    CloudNotFound(String),

    #[error("Timed out waiting for the OIDC callback after {0} seconds")]
    OidcTimeout(u64),

    #[error("Login cancelled")]
    Cancelled,

    #[error("SAML error: {0}")]
    Saml(String),

    #[error("OIDC discovery failed: {0}")]
    Discovery(String),

    #[error("Request failed with status {status}. Body:\n{body}")]
    HttpStatus { status: u16, body: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Credential store error: {0}")]
    StoreError(String),

    #[error("The unscoped token of cloud '{0}' has expired. Please log in again")]
    LoginRequired(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AuthError {
    /// Errors worth another attempt when minting scoped tokens.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AuthError::Http(_) | AuthError::HttpStatus { .. } | AuthError::AuthenticationFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
