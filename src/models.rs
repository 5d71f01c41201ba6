use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Cache timestamp layouts written by different AWS CLI v2 releases
const EXPIRES_AT_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%SUTC"];

/// Who is logging in: the identity every run starts from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionConfig {
    pub account_id: String,
    pub role_name: String,
    pub start_url: String,
    pub region: String,
}

/// SSO access token as cached by `aws sso login` in ~/.aws/sso/cache/
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedSessionToken {
    #[serde(rename = "startUrl", default, skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(rename = "accessToken")]
    pub access_token: String,

    /// Kept verbatim; see [`parse_expires_at`]
    #[serde(rename = "expiresAt")]
    pub expires_at: String,
}

impl CachedSessionToken {
    /// Expiry as an instant. Unparseable values are already expired.
    pub fn expires_at(&self) -> DateTime<Utc> {
        parse_expires_at(&self.expires_at).unwrap_or_else(|| {
            tracing::warn!("Error parsing SSO token expiry '{}'", self.expires_at);
            DateTime::<Utc>::MIN_UTC
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Region the token was issued in, falling back to the configured one
    pub fn region_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.region
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(fallback)
    }
}

/// Parse an SSO cache `expiresAt` value in either known layout
pub fn parse_expires_at(value: &str) -> Option<DateTime<Utc>> {
    EXPIRES_AT_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive))
    })
}

/// An AWS account visible to the SSO principal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    /// Role names in the order the control plane returned them
    pub roles: Vec<String>,
}

/// Temporary credentials for one (account, role) pair, ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub profile_name: String,
    pub account_name: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration_epoch_millis: i64,
}

impl Credential {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.expiration_epoch_millis)
            .single()
    }
}

/// Where a store was written and, for credentials, when the newest expires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceResult {
    pub store_location: PathBuf,
    pub latest_expiry: Option<DateTime<Utc>>,
}
