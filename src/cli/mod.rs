// CLI interface
pub mod commands;

use crate::error::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sso-creds")]
#[command(
    about = "Exchange an AWS SSO session for per-role credential profiles",
    long_about = None
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Back up the AWS config and credentials files before writing them
    #[arg(short, long)]
    pub backup: bool,

    /// Log in even if the cached SSO session is still valid
    #[arg(short, long)]
    pub login: bool,

    /// How to talk to the SSO portal
    #[arg(long, value_enum, default_value_t = Transport::Cli)]
    pub transport: Transport,

    /// Give up after this many seconds, cutting off a login or SSO call in flight
    #[arg(long, default_value_t = 120)]
    pub timeout: u64,

    /// SSO start URL (overrides the configured one)
    #[arg(long, env = "AWS_SSO_START_URL")]
    pub start_url: Option<String>,

    /// SSO region (overrides the configured one)
    #[arg(long, env = "AWS_SSO_REGION")]
    pub region: Option<String>,

    /// Path to config.toml
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print the verification URL instead of opening a browser (sdk transport)
    #[arg(long)]
    pub headless: bool,

    /// Enable verbose/debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<tracing::Level>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Save the account, role, start URL and region used by every run
    Configure {
        /// AWS account ID of the SSO session profile
        #[arg(long)]
        account_id: String,

        /// Role name of the SSO session profile
        #[arg(long)]
        role_name: String,

        /// SSO start URL
        #[arg(long)]
        start_url: String,

        /// SSO region
        #[arg(long)]
        region: String,
    },

    /// Generate shell completion scripts
    ///
    /// INSTALLATION:
    ///
    /// Bash:
    ///   eval "$(sso-creds completions bash)"    # Add to ~/.bashrc
    ///
    /// Zsh:
    ///   eval "$(sso-creds completions zsh)"     # Add to ~/.zshrc
    ///
    /// Fish:
    ///   sso-creds completions fish > ~/.config/fish/completions/sso-creds.fish
    Completions {
        /// Shell type to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// Shell out to the `aws` CLI
    Cli,
    /// Call the SSO APIs through the AWS SDK
    Sdk,
}

#[derive(Debug, Clone, ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

impl Cli {
    /// Level directive for the log filter; `--log-level` wins over `--verbose`
    pub fn log_level(&self) -> tracing::Level {
        match (self.log_level, self.verbose) {
            (Some(level), _) => level,
            (None, true) => tracing::Level::DEBUG,
            (None, false) => tracing::Level::INFO,
        }
    }
}

pub fn execute(args: Cli) -> Result<()> {
    match &args.command {
        Some(Commands::Configure {
            account_id,
            role_name,
            start_url,
            region,
        }) => commands::configure::execute(
            args.config.as_deref(),
            account_id,
            role_name,
            start_url,
            region,
        ),
        Some(Commands::Completions { shell }) => {
            commands::completions::execute(shell.clone());
            Ok(())
        }
        None => commands::run::execute(&args),
    }
}
