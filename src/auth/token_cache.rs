use crate::error::{Result, SsoError};
use crate::models::CachedSessionToken;
use sha1::{Digest, Sha1};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// SSO token cache compatible with AWS CLI v2 (~/.aws/sso/cache/)
pub struct TokenCache {
    cache_dir: PathBuf,
}

impl TokenCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// Lowercase hex SHA-1 of the start URL, as the AWS CLI names it
    fn cache_key(start_url: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(start_url.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn cache_file_path(&self, start_url: &str) -> PathBuf {
        self.cache_dir
            .join(format!("{}.json", Self::cache_key(start_url)))
    }

    /// Read the cached token for a start URL, whether or not it has expired.
    ///
    /// A missing cache file yields `Ok(None)`; anything else that prevents
    /// reading a token is a `CacheRead` error.
    pub fn get_token(&self, start_url: &str) -> Result<Option<CachedSessionToken>> {
        let cache_file = self.cache_file_path(start_url);
        tracing::debug!("Searching for the SSO cache file: {}", cache_file.display());

        let contents = match fs::read_to_string(&cache_file) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("SSO cache file not found: {}", cache_file.display());
                return Ok(None);
            }
            Err(e) => return Err(cache_read_error(&cache_file, e)),
        };

        let token: CachedSessionToken =
            serde_json::from_str(&contents).map_err(|e| cache_read_error(&cache_file, e))?;

        tracing::debug!("SSO cache file read, token expires at {}", token.expires_at);
        Ok(Some(token))
    }

    /// Replace the cached token for a start URL
    pub fn save_token(&self, start_url: &str, token: &CachedSessionToken) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir)?;

        let cache_file = self.cache_file_path(start_url);
        let json = serde_json::to_string_pretty(token)?;
        fs::write(&cache_file, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&cache_file, fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }
}

fn cache_read_error(path: &Path, e: impl std::fmt::Display) -> SsoError {
    SsoError::CacheRead {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
