// otc-auth - Open Telekom Cloud authentication CLI

mod auth;
mod cli;
mod config;
mod credentials;
mod endpoints;
mod env;
mod error;
mod expiry;
mod http;
mod models;
mod projects;
mod store;

use clap::Parser;

#[tokio::main]
async fn main() {
    // Parse CLI arguments first to get verbose flag
    let args = cli::Cli::parse();

    if args.headless {
        env::set_headless_override(true);
    }

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    // Logs on stderr; stdout carries results such as tokens
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(log_level.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let headless = env::is_headless_environment();

    if let Err(e) = cli::execute(args, headless).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
