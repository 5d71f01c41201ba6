use crate::auth::TokenCache;
use crate::aws_config::AwsPaths;
use crate::cli::{Cli, Transport};
use crate::client::{AwsCli, SdkClient, SsoControlPlane};
use crate::config::ConfigStore;
use crate::env;
use crate::error::{Result, SsoError};
use crate::expiry;
use crate::models::SessionConfig;
use crate::session::{Deadline, RunOptions, RunSummary, SessionManager};
use chrono::{DateTime, Utc};
use std::time::Duration;

pub fn execute(args: &Cli) -> Result<()> {
    let store = match &args.config {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location()?,
    };
    let config = apply_overrides(store.load()?, args);
    let paths = AwsPaths::from_env()?;

    tracing::debug!(
        "Using {} and {}",
        paths.config_file.display(),
        paths.credentials_file.display()
    );

    let deadline = Deadline::after(Duration::from_secs(args.timeout));
    let client = build_client(args, &config, &paths, deadline)?;
    let options = RunOptions {
        backup: args.backup,
        force_login: args.login,
        deadline,
    };

    let summary = SessionManager::new(client.as_ref(), &paths, options).run(&config)?;
    println!("{}", completion_message(&summary, Utc::now()));
    Ok(())
}

fn apply_overrides(mut config: SessionConfig, args: &Cli) -> SessionConfig {
    if let Some(start_url) = &args.start_url {
        config.start_url = start_url.clone();
    }
    if let Some(region) = &args.region {
        config.region = region.clone();
    }
    config
}

fn build_client(
    args: &Cli,
    config: &SessionConfig,
    paths: &AwsPaths,
    deadline: Deadline,
) -> Result<Box<dyn SsoControlPlane>> {
    match args.transport {
        Transport::Cli => Ok(Box::new(AwsCli::new().with_deadline(deadline))),
        Transport::Sdk => {
            let client = SdkClient::new(
                &config.start_url,
                &config.region,
                TokenCache::new(&paths.sso_cache_dir),
                env::is_headless_environment(args.headless),
                deadline,
            )
            .map_err(SsoError::ClientSetup)?;
            Ok(Box::new(client))
        }
    }
}

fn completion_message(summary: &RunSummary, now: DateTime<Utc>) -> String {
    let mut lines = vec![
        format!(
            "✓ Credentials written to {}",
            summary.credentials.store_location.display()
        ),
        format!(
            "  {} profile(s): {}",
            summary.profiles.len(),
            summary.profiles.join(", ")
        ),
        "  Use them with `export AWS_PROFILE=<profile>` or `aws --profile <profile> ...`"
            .to_string(),
    ];

    if let Some(expiry) = summary.credentials.latest_expiry {
        lines.push(format!(
            "  Credentials expire at {} ({})",
            expiry.format("%Y-%m-%d %H:%M:%S UTC"),
            expiry::format_time_remaining_at(&expiry, now)
        ));
    }

    lines.join("\n")
}
