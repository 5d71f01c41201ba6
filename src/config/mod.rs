// Configuration management
use crate::error::{Result, SsoError};
use crate::models::SessionConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "sso-creds";

/// On-disk layout of config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    sso: SessionConfig,
}

/// Persists the account/role/start URL/region chosen with `configure`
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the config directory path
    ///
    /// Priority:
    /// 1. XDG_CONFIG_HOME/sso-creds (if env var is set)
    /// 2. ~/.config/sso-creds (if ~/.config exists)
    /// 3. ~/.sso-creds (fallback on Unix, doesn't create ~/.config)
    /// 4. Platform default on Windows
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join(APP_DIR));
        }

        #[cfg(unix)]
        {
            if let Some(home_dir) = dirs::home_dir() {
                let xdg_config = home_dir.join(".config");

                if xdg_config.exists() {
                    return Ok(xdg_config.join(APP_DIR));
                }

                return Ok(home_dir.join(format!(".{}", APP_DIR)));
            }
        }

        #[cfg(not(unix))]
        {
            if let Some(config_dir) = dirs::config_dir() {
                return Ok(config_dir.join(APP_DIR));
            }
        }

        Err(SsoError::ConfigError(
            "Could not determine config directory".to_string(),
        ))
    }

    /// Store at the default location
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(Self::config_dir()?.join("config.toml")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<SessionConfig> {
        if !self.path.exists() {
            return Err(SsoError::ConfigError(format!(
                "config file not found at {}. please run: sso-creds configure",
                self.path.display()
            )));
        }

        tracing::info!("Loading config from: {}", self.path.display());
        let contents = fs::read_to_string(&self.path)
            .map_err(|e| SsoError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| SsoError::ConfigError(format!("Failed to parse config file: {}", e)))?;

        validate(&file.sso)?;
        tracing::debug!(
            "Config loaded: account {} role {} region {}",
            file.sso.account_id,
            file.sso.role_name,
            file.sso.region
        );

        Ok(file.sso)
    }

    pub fn save(&self, config: &SessionConfig) -> Result<()> {
        validate(config)?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| {
                    SsoError::ConfigError(format!("Failed to create config directory: {}", e))
                })?;
                tracing::info!("Created config directory: {}", dir.display());
            }
        }

        let file = ConfigFile {
            sso: config.clone(),
        };
        let toml_string = toml::to_string_pretty(&file)
            .map_err(|e| SsoError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.path, toml_string)
            .map_err(|e| SsoError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::debug!("Saved config to: {}", self.path.display());
        Ok(())
    }
}

fn validate(config: &SessionConfig) -> Result<()> {
    let fields = [
        ("account_id", &config.account_id),
        ("role_name", &config.role_name),
        ("start_url", &config.start_url),
        ("region", &config.region),
    ];

    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(SsoError::ConfigError(format!("sso.{} must not be empty", name)));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session_config() -> SessionConfig {
        SessionConfig {
            account_id: "111111111111".to_string(),
            role_name: "Admin".to_string(),
            start_url: "https://example.awsapps.com/start".to_string(),
            region: "us-east-1".to_string(),
        }
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("nested").join("config.toml"));

        store.save(&session_config()).unwrap();
        assert_eq!(store.load().unwrap(), session_config());

        let written = fs::read_to_string(store.path()).unwrap();
        assert!(written.contains("[sso]"));
        assert!(written.contains("start_url = \"https://example.awsapps.com/start\""));
    }

    #[test]
    fn test_missing_config_asks_for_configure() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.toml"));

        match store.load().unwrap_err() {
            SsoError::ConfigError(msg) => assert!(msg.contains("sso-creds configure")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_incomplete_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[sso]\naccount_id = \"1\"\nrole_name = \"Admin\"\n").unwrap();

        let err = ConfigStore::new(&path).load().unwrap_err();
        assert!(matches!(err, SsoError::ConfigError(_)));
    }

    #[test]
    fn test_empty_field_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path().join("config.toml"));
        let mut config = session_config();
        config.region = "  ".to_string();

        assert!(matches!(
            store.save(&config).unwrap_err(),
            SsoError::ConfigError(_)
        ));
        assert!(!store.path().exists());
    }
}
