use crate::auth::{AuthManager, LoginOutcome};
use crate::cli::{CloudArgs, LoginCommand};
use crate::config::Config;
use crate::error::Result;
use crate::models::{LoginRequest, Protocol};
use crate::store::CredentialStore;

pub async fn execute(mut config: Config, command: LoginCommand, headless: bool) -> Result<()> {
    let request = match command {
        LoginCommand::Remove { domain_name } => {
            return super::logout::execute(config, &domain_name);
        }
        LoginCommand::Iam {
            cloud,
            username,
            password,
            totp,
            user_domain_id,
        } => {
            let mut request = new_request(("iam", None), cloud, &config)?;
            request.username = Some(username);
            request.password = Some(password);
            request.otp = totp;
            request.user_domain_id = user_domain_id;
            request
        }
        LoginCommand::IdpSaml {
            cloud,
            idp,
            username,
            password,
        } => {
            let mut request = new_request(("idp", Some("saml")), cloud, &config)?;
            request.idp_name = Some(idp.idp_name);
            request.idp_url = Some(idp.idp_url);
            request.username = Some(username);
            request.password = Some(password);
            request
        }
        LoginCommand::IdpOidc {
            cloud,
            idp,
            client_id,
            client_secret,
            service_account,
            oidc_scopes,
        } => {
            if let Some(scopes) = oidc_scopes {
                config.oidc.scopes = scopes
                    .split([',', ' '])
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect();
            }
            let mut request = new_request(("idp", Some("oidc")), cloud, &config)?;
            request.idp_name = Some(idp.idp_name);
            request.idp_url = Some(idp.idp_url);
            request.client_id = Some(client_id);
            request.client_secret = client_secret;
            request.service_account = service_account;
            request
        }
    };

    let store = CredentialStore::from_config(&config)?;
    let auth = AuthManager::new(config, store, headless)?;
    let outcome = auth.login(&request).await?;

    print_outcome(&outcome)
}

/// `selector` is the auth type plus IdP protocol the subcommand stands for.
fn new_request(
    selector: (&str, Option<&str>),
    cloud: CloudArgs,
    config: &Config,
) -> Result<LoginRequest> {
    let protocol = Protocol::from_selector(selector.0, selector.1)?;
    let region = cloud.region.unwrap_or_else(|| config.cloud.region.clone());
    let mut request = LoginRequest::new(protocol, &cloud.domain_name, &region);
    request.overwrite = cloud.overwrite;
    Ok(request)
}

fn print_outcome(outcome: &LoginOutcome) -> Result<()> {
    if outcome.reused {
        println!("✓ Already logged in to {}", outcome.cloud.domain.name);
        println!("  Use --overwrite-token to log in again");
    } else {
        println!(
            "✓ Logged in to {} as {}",
            outcome.cloud.domain.name, outcome.cloud.username
        );
    }
    println!("  Token expires in: {}", outcome.token.expiration_display()?);

    if !outcome.refresh.refreshed.is_empty() {
        println!(
            "  Refreshed scoped tokens: {}",
            outcome.refresh.refreshed.join(", ")
        );
    }
    for (project, error) in &outcome.refresh.failed {
        eprintln!("⚠ Could not refresh token for {}: {}", project, error);
    }

    Ok(())
}
