// SSO control-plane capability and its transports
mod aws_cli;
mod sdk;

pub use aws_cli::AwsCli;
pub use sdk::SdkClient;

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("[aws cli] {0}")]
    Command(String),

    #[error("AWS SDK error: {0}")]
    AwsSdk(String),

    #[error("Authorization expired - user took too long to complete device flow")]
    AuthorizationExpired,

    #[error("Timed out while {0}")]
    TimedOut(&'static str),

    #[error("Unexpected response: {0}")]
    Response(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Account as returned by ListAccounts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "accountId")]
    pub id: String,
    #[serde(rename = "accountName", default)]
    pub name: String,
    #[serde(rename = "emailAddress", default)]
    pub email: String,
}

/// Role assignment as returned by ListAccountRoles
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleInfo {
    pub role_name: String,
    #[serde(default)]
    pub account_id: String,
}

/// Short-term credentials as returned by GetRoleCredentials
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    /// Milliseconds since the Unix epoch
    pub expiration: i64,
}

/// Operations against the identity provider.
///
/// Calls block until they complete. `login` must leave a fresh token in the
/// SSO cache file for the configured start URL.
#[cfg_attr(test, mockall::automock)]
pub trait SsoControlPlane {
    fn login(&self, role_name: &str) -> Result<(), ClientError>;

    fn list_accounts(
        &self,
        access_token: &str,
        region: &str,
    ) -> Result<Vec<AccountInfo>, ClientError>;

    fn list_account_roles(
        &self,
        access_token: &str,
        region: &str,
        account_id: &str,
    ) -> Result<Vec<RoleInfo>, ClientError>;

    fn get_role_credentials(
        &self,
        access_token: &str,
        region: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials, ClientError>;
}
