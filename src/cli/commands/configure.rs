use crate::config::ConfigStore;
use crate::error::Result;
use crate::models::SessionConfig;
use std::path::Path;

pub fn execute(
    config_path: Option<&Path>,
    account_id: &str,
    role_name: &str,
    start_url: &str,
    region: &str,
) -> Result<()> {
    let store = match config_path {
        Some(path) => ConfigStore::new(path),
        None => ConfigStore::default_location()?,
    };

    let config = SessionConfig {
        account_id: account_id.trim().to_string(),
        role_name: role_name.trim().to_string(),
        start_url: start_url.trim().to_string(),
        region: region.trim().to_string(),
    };
    store.save(&config)?;

    println!("✓ Configuration saved to {}", store.path().display());
    println!("  Run `sso-creds` to fetch credentials for every account and role.");
    Ok(())
}
