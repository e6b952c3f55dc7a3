use crate::cli::ConfigCommand;
use crate::config::Config;
use crate::endpoints::Endpoints;
use crate::error::Result;

pub fn execute(config: Config, command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init => {
            Config::create_sample()?;
            println!("✓ Sample config written to {}", Config::config_file_path()?.display());
        }
        ConfigCommand::Path => {
            let config_path = Config::config_file_path()?;
            println!("Config file path: {}", config_path.display());

            if config_path.exists() {
                println!("Status: File exists");
            } else {
                println!("Status: File does not exist");
                println!("\nTo create a sample config file, run:");
                println!("  otc-auth config init");
            }

            println!("\nEffective settings:");
            println!("  Region: {}", config.cloud.region);
            match Endpoints::resolve(&config.cloud, &config.cloud.region) {
                Ok(endpoints) => println!("  IAM endpoint: {}", endpoints.base()),
                Err(e) => println!("  IAM endpoint: {}", e),
            }
            println!("  Credential store: {}", config.store_path()?.display());
            println!(
                "  Scoped token retry: {} attempts, {}s apart",
                config.retry.attempts, config.retry.delay_secs
            );
            println!("  OIDC listener: {}", config.oidc.listen_address);
        }
    }

    Ok(())
}
