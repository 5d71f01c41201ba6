// sso-creds - AWS SSO session to per-role credential profiles

mod auth;
mod aws_config;
mod cli;
mod client;
mod config;
mod credentials;
mod env;
mod error;
mod expiry;
mod models;
mod session;

use clap::Parser;
use error::SsoError;
use std::process::ExitCode;

fn main() -> ExitCode {
    // Parse CLI arguments first to get the log level
    let args = cli::Cli::parse();

    // Logs go to stderr; stdout carries the completion message and completions
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(args.log_level().into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli::execute(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::debug!("{:?}", e);
            eprintln!("{}", error_message(&e));
            ExitCode::FAILURE
        }
    }
}

fn error_message(e: &SsoError) -> String {
    format!("Error: {}", e)
}
