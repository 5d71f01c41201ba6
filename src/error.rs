use crate::client::ClientError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SsoError {
    #[error("Failed to read SSO cache file {path}: {reason}")]
    CacheRead { path: PathBuf, reason: String },

    #[error("SSO login failed: {0}")]
    Login(#[source] ClientError),

    /// Login went through but the cache still holds no usable token
    #[error("Can not renew the SSO token for {start_url}: cache is still missing or expired after login")]
    RenewalFailed { start_url: String },

    #[error("Failed to list accounts: {0}")]
    ListAccounts(#[source] ClientError),

    #[error("Failed to list roles for account {account_id}: {source}")]
    ListRoles {
        account_id: String,
        #[source]
        source: ClientError,
    },

    #[error("Failed to get credentials for {account_id}/{role_name}: {source}")]
    GetCredentials {
        account_id: String,
        role_name: String,
        #[source]
        source: ClientError,
    },

    #[error("No credentials were found: no roles are assigned in any account")]
    NoCredentialsFound,

    #[error("Failed to back up {path}: {source}")]
    Backup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set up the SSO client: {0}")]
    ClientSetup(#[source] ClientError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Run deadline exceeded before {stage}")]
    DeadlineExceeded { stage: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SsoError>;
