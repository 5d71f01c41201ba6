// AWS credentials and config file writer
mod document;

use crate::error::{Result, SsoError};
use crate::models::{Credential, PersistenceResult, SessionConfig};
use chrono::Utc;
use document::{strip_header_comments, ProfileDocument};
use ini::{Ini, ParseOption};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const DEFAULT_OUTPUT: &str = "json";

const KEY_OUTPUT: &str = "output";
const KEY_REGION: &str = "region";
const KEY_SSO_START_URL: &str = "sso_start_url";
const KEY_SSO_REGION: &str = "sso_region";
const KEY_SSO_ACCOUNT_ID: &str = "sso_account_id";
const KEY_SSO_ROLE_NAME: &str = "sso_role_name";
const KEY_ACCESS_KEY_ID: &str = "aws_access_key_id";
const KEY_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const KEY_SESSION_TOKEN: &str = "aws_session_token";

/// Locations of the AWS files this tool reads and writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsPaths {
    pub config_file: PathBuf,
    pub credentials_file: PathBuf,
    pub sso_cache_dir: PathBuf,
}

impl AwsPaths {
    /// Standard layout below an `.aws` directory
    pub fn under(aws_dir: &Path) -> Self {
        Self {
            config_file: aws_dir.join("config"),
            credentials_file: aws_dir.join("credentials"),
            sso_cache_dir: aws_dir.join("sso").join("cache"),
        }
    }

    /// ~/.aws, honouring AWS_CONFIG_FILE and AWS_SHARED_CREDENTIALS_FILE
    pub fn from_env() -> Result<Self> {
        let home = dirs::home_dir().ok_or_else(|| {
            SsoError::ConfigError("Could not determine home directory".to_string())
        })?;

        let mut paths = Self::under(&home.join(".aws"));

        if let Ok(path) = std::env::var("AWS_CONFIG_FILE") {
            paths.config_file = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("AWS_SHARED_CREDENTIALS_FILE") {
            paths.credentials_file = PathBuf::from(path);
        }

        Ok(paths)
    }

    pub fn store(&self, kind: StoreKind, backup: bool) -> ProfileStore {
        let path = match kind {
            StoreKind::SessionProfile => &self.config_file,
            StoreKind::Credential => &self.credentials_file,
        };
        ProfileStore::new(path.clone(), backup)
    }
}

/// The two INI stores a run writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// ~/.aws/config: SSO settings for the logged-in role
    SessionProfile,
    /// ~/.aws/credentials: one section per resolved profile
    Credential,
}

/// One INI section and the keys to set in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSection {
    pub name: String,
    pub entries: Vec<(&'static str, String)>,
}

impl From<&SessionConfig> for ProfileSection {
    fn from(config: &SessionConfig) -> Self {
        let name = if config.role_name == "default" {
            config.role_name.clone()
        } else {
            format!("profile {}", config.role_name)
        };

        Self {
            name,
            entries: vec![
                (KEY_OUTPUT, DEFAULT_OUTPUT.to_string()),
                (KEY_REGION, config.region.clone()),
                (KEY_SSO_START_URL, config.start_url.clone()),
                (KEY_SSO_REGION, config.region.clone()),
                (KEY_SSO_ACCOUNT_ID, config.account_id.clone()),
                (KEY_SSO_ROLE_NAME, config.role_name.clone()),
            ],
        }
    }
}

impl From<&Credential> for ProfileSection {
    fn from(cred: &Credential) -> Self {
        Self {
            name: cred.profile_name.clone(),
            entries: vec![
                (KEY_OUTPUT, DEFAULT_OUTPUT.to_string()),
                (KEY_REGION, cred.region.clone()),
                (KEY_ACCESS_KEY_ID, cred.access_key_id.clone()),
                (KEY_SECRET_ACCESS_KEY, cred.secret_access_key.clone()),
                (KEY_SESSION_TOKEN, cred.session_token.clone()),
            ],
        }
    }
}

/// An INI profile file that is merged into, never replaced wholesale
pub struct ProfileStore {
    path: PathBuf,
    backup: bool,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>, backup: bool) -> Self {
        Self {
            path: path.into(),
            backup,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the store to `<path>.backup_<unix seconds>`.
    ///
    /// Returns `None` when there is nothing to back up yet.
    pub fn backup(&self) -> Result<Option<PathBuf>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let backup_path = self.backup_path(Utc::now().timestamp());
        fs::copy(&self.path, &backup_path).map_err(|source| SsoError::Backup {
            path: self.path.clone(),
            source,
        })?;

        Ok(Some(backup_path))
    }

    fn backup_path(&self, timestamp: i64) -> PathBuf {
        PathBuf::from(format!("{}.backup_{}", self.path.display(), timestamp))
    }

    /// Existing contents, both as parsed values and as editable lines; a
    /// store that does not exist yet is empty
    fn load(&self) -> Result<(Ini, ProfileDocument)> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(self.load_error(e)),
        };

        let ini = Ini::load_from_str_opt(&strip_header_comments(&contents), parse_option())
            .map_err(|e| self.load_error(e))?;
        let document = ProfileDocument::parse(&contents).map_err(|e| self.load_error(e))?;

        Ok((ini, document))
    }

    fn load_error(&self, e: impl std::fmt::Display) -> SsoError {
        SsoError::Load {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }

    /// Upsert `sections` and rewrite the file in one step.
    ///
    /// Only the lines of keys listed in `sections` change, and only when
    /// their value differs. Other sections, other keys, comments and nested
    /// blocks are written back as they were.
    pub fn persist(&self, sections: &[ProfileSection]) -> Result<PathBuf> {
        tracing::debug!("Preparing to store {}", self.path.display());

        if self.backup {
            if let Some(backup_path) = self.backup()? {
                tracing::info!("Backup completed: {}", backup_path.display());
            }
        }

        let (ini, mut document) = self.load()?;

        for section in sections {
            for (key, value) in &section.entries {
                if ini.get_from(Some(section.name.as_str()), key) != Some(value.as_str()) {
                    document.set(&section.name, key, value);
                }
            }
        }

        self.write_atomically(&document.render())
            .map_err(|source| SsoError::Write {
                path: self.path.clone(),
                source,
            })?;

        Ok(self.path.clone())
    }

    fn write_atomically(&self, contents: &str) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;

        // Same directory so the rename cannot cross filesystems; created 0600
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(contents.as_bytes())?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        Ok(())
    }
}

/// Values are compared byte for byte: no quote stripping, no escape
/// handling, and indented keys of nested blocks such as `s3 =` stay
/// distinct from top-level keys
fn parse_option() -> ParseOption {
    ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        enabled_preserve_key_leading_whitespace: true,
        ..ParseOption::default()
    }
}

/// Store the SSO settings of the configured role in the session profile store
pub fn persist_session_profile(
    store: &ProfileStore,
    config: &SessionConfig,
) -> Result<PersistenceResult> {
    let path = store.persist(&[ProfileSection::from(config)])?;
    tracing::info!("The AWS SSO config file has been stored: {}", path.display());

    Ok(PersistenceResult {
        store_location: path,
        latest_expiry: None,
    })
}

/// Merge `creds` into the credential store.
///
/// `latest_expiry` is the latest expiry among `creds` themselves.
pub fn persist_credentials(store: &ProfileStore, creds: &[Credential]) -> Result<PersistenceResult> {
    let sections: Vec<ProfileSection> = creds.iter().map(ProfileSection::from).collect();
    let path = store.persist(&sections)?;
    tracing::info!(
        "{} credential profiles have been stored: {}",
        creds.len(),
        path.display()
    );

    Ok(PersistenceResult {
        store_location: path,
        latest_expiry: creds.iter().filter_map(Credential::expires_at).max(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn credential(profile: &str, key: &str, expiration_epoch_millis: i64) -> Credential {
        Credential {
            profile_name: profile.to_string(),
            account_name: profile.to_string(),
            region: "us-east-1".to_string(),
            access_key_id: key.to_string(),
            secret_access_key: "secret/with+chars=".to_string(),
            session_token: "IQoJb3JpZ2luX2VjE//token==".to_string(),
            expiration_epoch_millis,
        }
    }

    fn session_config() -> SessionConfig {
        SessionConfig {
            account_id: "111111111111".to_string(),
            role_name: "Admin".to_string(),
            start_url: "https://example.awsapps.com/start".to_string(),
            region: "eu-west-1".to_string(),
        }
    }

    fn read(path: &Path) -> Ini {
        Ini::load_from_str_opt(&fs::read_to_string(path).unwrap(), parse_option()).unwrap()
    }

    fn backups_of(path: &Path) -> Vec<PathBuf> {
        let prefix = format!(
            "{}.backup_",
            path.file_name().unwrap().to_string_lossy()
        );
        fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(&prefix))
            .collect()
    }

    #[test]
    fn test_paths_under_aws_dir() {
        let paths = AwsPaths::under(Path::new("/home/me/.aws"));
        assert_eq!(paths.config_file, PathBuf::from("/home/me/.aws/config"));
        assert_eq!(paths.credentials_file, PathBuf::from("/home/me/.aws/credentials"));
        assert_eq!(paths.sso_cache_dir, PathBuf::from("/home/me/.aws/sso/cache"));
        assert_eq!(
            paths.store(StoreKind::Credential, false).path(),
            Path::new("/home/me/.aws/credentials")
        );
    }

    #[test]
    fn test_persist_credentials_creates_store() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".aws").join("credentials");
        let store = ProfileStore::new(&path, false);

        let result = persist_credentials(&store, &[credential("team", "AKIA1", 1_614_592_800_000)])
            .unwrap();

        assert_eq!(result.store_location, path);
        assert_eq!(
            result.latest_expiry,
            Some(Utc.with_ymd_and_hms(2021, 3, 1, 10, 0, 0).unwrap())
        );

        let ini = read(&path);
        let section = ini.section(Some("team")).unwrap();
        assert_eq!(section.get("output"), Some("json"));
        assert_eq!(section.get("region"), Some("us-east-1"));
        assert_eq!(section.get("aws_access_key_id"), Some("AKIA1"));
        assert_eq!(section.get("aws_secret_access_key"), Some("secret/with+chars="));
        assert_eq!(section.get("aws_session_token"), Some("IQoJb3JpZ2luX2VjE//token=="));
    }

    #[test]
    fn test_latest_expiry_is_maximum_not_last() {
        let dir = TempDir::new().unwrap();
        let store = ProfileStore::new(dir.path().join("credentials"), false);

        let result = persist_credentials(
            &store,
            &[
                credential("a", "K1", 2_000_000_000_000),
                credential("b", "K2", 3_000_000_000_000),
                credential("c", "K3", 1_000_000_000_000),
            ],
        )
        .unwrap();

        assert_eq!(
            result.latest_expiry,
            Utc.timestamp_millis_opt(3_000_000_000_000).single()
        );
    }

    #[test]
    fn test_persist_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let store = ProfileStore::new(&path, false);
        let creds = [credential("a", "K1", 1_000), credential("b", "K2", 1_000)];

        persist_credentials(&store, &creds).unwrap();
        let first = fs::read_to_string(&path).unwrap();
        persist_credentials(&store, &creds).unwrap();
        let second = fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        assert_eq!(read(&path).sections().flatten().count(), 2);
    }

    #[test]
    fn test_persist_merges_across_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let store = ProfileStore::new(&path, false);

        persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap();
        persist_credentials(&store, &[credential("b", "K2", 1_000)]).unwrap();

        let ini = read(&path);
        assert_eq!(ini.section(Some("a")).unwrap().get("aws_access_key_id"), Some("K1"));
        assert_eq!(ini.section(Some("b")).unwrap().get("aws_access_key_id"), Some("K2"));
    }

    #[test]
    fn test_persist_overwrites_keys_and_keeps_unrelated_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(
            &path,
            "[personal]\naws_access_key_id = MINE\naws_secret_access_key = \"quoted\"\n\n\
             [team]\naws_access_key_id = OLD\nmfa_serial = arn:aws:iam::1:mfa/me\n",
        )
        .unwrap();

        let store = ProfileStore::new(&path, false);
        persist_credentials(&store, &[credential("team", "NEW", 1_000)]).unwrap();

        let ini = read(&path);
        let personal = ini.section(Some("personal")).unwrap();
        assert_eq!(personal.get("aws_access_key_id"), Some("MINE"));
        assert_eq!(personal.get("aws_secret_access_key"), Some("\"quoted\""));

        let team = ini.section(Some("team")).unwrap();
        assert_eq!(team.get("aws_access_key_id"), Some("NEW"));
        assert_eq!(team.get("mfa_serial"), Some("arn:aws:iam::1:mfa/me"));
    }

    #[test]
    fn test_unparseable_store_is_load_error_and_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[broken\naws_access_key_id = X\n").unwrap();

        let store = ProfileStore::new(&path, false);
        let err = persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap_err();

        assert!(matches!(err, SsoError::Load { .. }));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[broken\naws_access_key_id = X\n"
        );
    }

    #[test]
    fn test_non_utf8_store_is_load_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x5b]).unwrap();

        let store = ProfileStore::new(&path, false);
        let err = persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap_err();
        assert!(matches!(err, SsoError::Load { .. }));
    }

    #[test]
    fn test_backup_before_write() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[old]\naws_access_key_id = OLD\n").unwrap();

        let store = ProfileStore::new(&path, true);
        persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap();

        let backups = backups_of(&path);
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(&backups[0]).unwrap(),
            "[old]\naws_access_key_id = OLD\n"
        );
        assert!(read(&path).section(Some("a")).is_some());
    }

    #[test]
    fn test_backup_of_missing_store_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");

        let store = ProfileStore::new(&path, true);
        assert_eq!(store.backup().unwrap(), None);

        persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap();
        assert!(backups_of(&path).is_empty());
        assert!(path.exists());
    }

    #[test]
    fn test_write_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let store = ProfileStore::new(&path, false);

        persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap();

        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_store_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let store = ProfileStore::new(&path, false);
        persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_persist_session_profile() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(&path, "[default]\nregion = us-east-1\n").unwrap();

        let store = ProfileStore::new(&path, false);
        let result = persist_session_profile(&store, &session_config()).unwrap();
        assert_eq!(result.store_location, path);
        assert_eq!(result.latest_expiry, None);

        let ini = read(&path);
        assert_eq!(ini.section(Some("default")).unwrap().get("region"), Some("us-east-1"));

        let profile = ini.section(Some("profile Admin")).unwrap();
        assert_eq!(profile.get("output"), Some("json"));
        assert_eq!(profile.get("region"), Some("eu-west-1"));
        assert_eq!(profile.get("sso_start_url"), Some("https://example.awsapps.com/start"));
        assert_eq!(profile.get("sso_region"), Some("eu-west-1"));
        assert_eq!(profile.get("sso_account_id"), Some("111111111111"));
        assert_eq!(profile.get("sso_role_name"), Some("Admin"));
    }

    #[test]
    fn test_nested_blocks_of_other_sections_are_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        let existing = "[default]\nregion = us-east-1\ns3 =\n    max_concurrent_requests = 20\n    signature_version = s3v4\n\n[profile other]\nregion = eu-west-1\n";
        fs::write(&path, existing).unwrap();

        let store = ProfileStore::new(&path, false);
        persist_session_profile(&store, &session_config()).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(existing));

        let ini = read(&path);
        let default = ini.section(Some("default")).unwrap();
        assert_eq!(default.get("    max_concurrent_requests"), Some("20"));
        assert_eq!(default.get("max_concurrent_requests"), None);
        assert!(ini.section(Some("profile Admin")).is_some());
    }

    #[test]
    fn test_nested_block_in_updated_section_is_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config");
        fs::write(
            &path,
            "[profile Admin]\nregion = us-east-1\ns3 =\n    addressing_style = path\n",
        )
        .unwrap();

        let store = ProfileStore::new(&path, false);
        persist_session_profile(&store, &session_config()).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(
            "[profile Admin]\nregion = eu-west-1\ns3 =\n    addressing_style = path\noutput = json\n"
        ));
        assert_eq!(written.matches("[profile Admin]").count(), 1);
    }

    #[test]
    fn test_comments_are_kept() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        let existing = "# my personal notes\n[default]\n; keep this\nregion = us-west-2\n";
        fs::write(&path, existing).unwrap();

        let store = ProfileStore::new(&path, false);
        persist_credentials(&store, &[credential("team", "K1", 1_000)]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(existing));
        assert!(written.contains("\n[team]\noutput = json\n"));
    }

    #[test]
    fn test_header_with_inline_comment_is_accepted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[team] # work\naws_access_key_id = OLD\n").unwrap();

        let store = ProfileStore::new(&path, false);
        persist_credentials(&store, &[credential("team", "NEW", 1_000)]).unwrap();

        let written = fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("[team] # work\naws_access_key_id = NEW\n"));
        assert_eq!(written.matches("[team]").count(), 1);
    }

    #[test]
    fn test_unchanged_values_keep_their_formatting() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[a]\nregion=us-east-1\n").unwrap();

        let store = ProfileStore::new(&path, false);
        persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap();

        assert!(fs::read_to_string(&path)
            .unwrap()
            .starts_with("[a]\nregion=us-east-1\n"));
    }

    #[test]
    fn test_failed_backup_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("credentials");
        fs::write(&path, "[old]\naws_access_key_id = OLD\n").unwrap();

        let store = ProfileStore::new(&path, true);
        // A directory in the way of every backup name this run could pick
        let now = Utc::now().timestamp();
        for timestamp in now - 1..=now + 30 {
            fs::create_dir(store.backup_path(timestamp)).unwrap();
        }

        let err = persist_credentials(&store, &[credential("a", "K1", 1_000)]).unwrap_err();

        assert!(matches!(err, SsoError::Backup { .. }));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[old]\naws_access_key_id = OLD\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_leaves_store_untouched() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let aws_dir = dir.path().join(".aws");
        fs::create_dir(&aws_dir).unwrap();
        let path = aws_dir.join("credentials");
        fs::write(&path, "[old]\naws_access_key_id = OLD\n").unwrap();

        fs::set_permissions(&aws_dir, fs::Permissions::from_mode(0o555)).unwrap();
        if fs::File::create(aws_dir.join(".writable")).is_ok() {
            // Permissions are not enforced for this user (root)
            fs::set_permissions(&aws_dir, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let store = ProfileStore::new(&path, false);
        let result = persist_credentials(&store, &[credential("a", "K1", 1_000)]);
        fs::set_permissions(&aws_dir, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result.unwrap_err(), SsoError::Write { .. }));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "[old]\naws_access_key_id = OLD\n"
        );
        assert_eq!(fs::read_dir(&aws_dir).unwrap().count(), 1);
    }

    #[test]
    fn test_default_role_uses_default_section() {
        let mut config = session_config();
        config.role_name = "default".to_string();
        assert_eq!(ProfileSection::from(&config).name, "default");
    }
}
