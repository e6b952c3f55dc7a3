// CLI interface
pub mod commands;

use crate::config::Config;
use crate::error::Result;
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser, Debug)]
#[command(name = "otc-auth")]
#[command(about = "Log in to Open Telekom Cloud and manage project-scoped tokens", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print login URLs instead of opening a browser
    #[arg(long, global = true)]
    pub headless: bool,

    /// Accept invalid TLS certificates (also SKIP_TLS_VERIFICATION=true)
    #[arg(long, global = true)]
    pub skip_tls_verification: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in to a cloud, or remove one
    Login {
        #[command(subcommand)]
        command: LoginCommand,
    },

    /// Projects of the active cloud
    Projects {
        #[command(subcommand)]
        command: ProjectsCommand,
    },

    /// Obtain tokens for the active cloud
    Token {
        #[command(subcommand)]
        command: TokenCommand,
    },

    /// Manage known clouds
    Cloud {
        #[command(subcommand)]
        command: CloudCommand,
    },

    /// Show the state of the active cloud
    Status {
        /// Output in JSON format for scripting
        #[arg(long)]
        json: bool,
    },

    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Generate shell completion scripts
    ///
    /// INSTALLATION:
    ///
    /// Bash:
    ///   eval "$(otc-auth completions bash)"    # Add to ~/.bashrc
    ///
    /// Zsh:
    ///   eval "$(otc-auth completions zsh)"     # Add to ~/.zshrc
    ///
    /// Fish:
    ///   otc-auth completions fish > ~/.config/fish/completions/otc-auth.fish
    Completions {
        /// Shell type to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by every login method
#[derive(Args, Debug)]
pub struct CloudArgs {
    /// Domain (tenant) name
    #[arg(short = 'd', long = "os-domain-name", env = "OS_DOMAIN_NAME")]
    pub domain_name: String,

    /// OTC region code, defaults to the configured region
    #[arg(short, long, env = "REGION")]
    pub region: Option<String>,

    /// Log in again even if the cached token is still valid
    #[arg(short, long = "overwrite-token")]
    pub overwrite: bool,
}

#[derive(Args, Debug)]
pub struct IdpArgs {
    /// Identity provider name as configured in IAM
    #[arg(short = 'i', long, env = "IDP_NAME")]
    pub idp_name: String,

    /// Identity provider URL
    #[arg(long, env = "IDP_URL")]
    pub idp_url: String,
}

#[derive(Subcommand, Debug)]
pub enum LoginCommand {
    /// Log in with IAM username and password, optionally with a TOTP code
    Iam {
        #[command(flatten)]
        cloud: CloudArgs,

        #[arg(short = 'u', long = "os-username", env = "OS_USERNAME")]
        username: String,

        #[arg(short = 'p', long = "os-password", env = "OS_PASSWORD", hide_env_values = true)]
        password: String,

        /// 6-digit time-based one-time password, requires --os-user-domain-id
        #[arg(short = 't', long, requires = "user_domain_id")]
        totp: Option<String>,

        /// User id from the "My Credentials" page, required with --totp
        #[arg(long = "os-user-domain-id", env = "OS_USER_DOMAIN_ID")]
        user_domain_id: Option<String>,
    },

    /// Log in through a SAML identity provider (ECP)
    IdpSaml {
        #[command(flatten)]
        cloud: CloudArgs,

        #[command(flatten)]
        idp: IdpArgs,

        #[arg(short = 'u', long = "os-username", env = "OS_USERNAME")]
        username: String,

        #[arg(short = 'p', long = "os-password", env = "OS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in through an OpenID Connect identity provider
    IdpOidc {
        #[command(flatten)]
        cloud: CloudArgs,

        #[command(flatten)]
        idp: IdpArgs,

        /// Client ID as set on the IdP
        #[arg(short = 'c', long, env = "CLIENT_ID")]
        client_id: String,

        /// Client secret as set on the IdP
        #[arg(short = 's', long, env = "CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,

        /// Use the client-credentials grant instead of the browser
        #[arg(long)]
        service_account: bool,

        /// Scopes to request, comma or space separated
        #[arg(long, env = "OIDC_SCOPES")]
        oidc_scopes: Option<String>,
    },

    /// Remove a cloud and all of its tokens
    Remove {
        #[arg(short = 'd', long = "os-domain-name", env = "OS_DOMAIN_NAME")]
        domain_name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectsCommand {
    /// Refresh and list the projects of the active cloud
    List {
        /// Output in JSON format for scripting
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Print a valid scoped token for a project, issuing one if needed
    Scoped {
        #[arg(short = 'p', long = "os-project-name", env = "OS_PROJECT_NAME")]
        project_name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum CloudCommand {
    /// List known clouds
    List,

    /// Make a known cloud the active one
    Activate {
        /// Domain name of the cloud
        domain_name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Create a sample config file
    Init,
    /// Show the config file path
    Path,
}

pub async fn execute(args: Cli, headless: bool) -> Result<()> {
    let mut config = Config::load()?;
    if args.skip_tls_verification {
        config.cloud.skip_tls_verification = true;
    }

    match args.command {
        Commands::Login { command } => commands::login::execute(config, command, headless).await,
        Commands::Projects { command } => commands::projects::execute(config, command).await,
        Commands::Token { command } => commands::token::execute(config, command).await,
        Commands::Cloud { command } => commands::cloud::execute(config, command),
        Commands::Status { json } => commands::status::execute(config, json),
        Commands::Config { command } => commands::config::execute(config, command),
        Commands::Completions { shell } => {
            commands::completions::execute(shell);
            Ok(())
        }
    }
}
