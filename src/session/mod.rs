// Session management module
use crate::auth::{Authenticator, TokenCache};
use crate::aws_config::{persist_credentials, persist_session_profile, AwsPaths, StoreKind};
use crate::client::SsoControlPlane;
use crate::credentials;
use crate::error::{Result, SsoError};
use crate::models::{PersistenceResult, SessionConfig};
use std::time::{Duration, Instant};

/// Wall-clock bound for one run
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
        }
    }

    /// Time left, `None` when unbounded; zero once passed
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Fail if the deadline has passed; `stage` names what was about to run
    pub fn check(&self, stage: &'static str) -> Result<()> {
        match self.at {
            Some(at) if Instant::now() >= at => Err(SsoError::DeadlineExceeded { stage }),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub backup: bool,
    pub force_login: bool,
    pub deadline: Deadline,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            backup: false,
            force_login: false,
            deadline: Deadline::none(),
        }
    }
}

/// What a completed run wrote
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session_profile: PersistenceResult,
    pub credentials: PersistenceResult,
    pub profiles: Vec<String>,
}

/// Runs the whole exchange: SSO session in, credential profiles out
pub struct SessionManager<'a, C: SsoControlPlane + ?Sized> {
    client: &'a C,
    paths: &'a AwsPaths,
    options: RunOptions,
}

impl<'a, C: SsoControlPlane + ?Sized> SessionManager<'a, C> {
    pub fn new(client: &'a C, paths: &'a AwsPaths, options: RunOptions) -> Self {
        Self {
            client,
            paths,
            options,
        }
    }

    /// Store the session profile, log in if needed, fetch every role's
    /// credentials and merge them into the credential store.
    ///
    /// The credential store is only written once every credential is in
    /// memory; any earlier failure leaves it untouched.
    pub fn run(&self, config: &SessionConfig) -> Result<RunSummary> {
        let deadline = &self.options.deadline;

        // Written first: `aws sso login --profile <role>` reads it
        let session_store = self
            .paths
            .store(StoreKind::SessionProfile, self.options.backup);
        let session_profile = persist_session_profile(&session_store, config)?;

        deadline.check("logging in")?;
        let token_cache = TokenCache::new(&self.paths.sso_cache_dir);
        let token = Authenticator::new(self.client, &token_cache)
            .obtain_session(config, self.options.force_login)?;

        let region = token.region_or(&config.region);
        let accounts = credentials::enumerate(self.client, &token, region, deadline)?;
        let creds = credentials::fetch_credentials(self.client, &token, region, &accounts, deadline)?;

        deadline.check("storing credentials")?;
        let credential_store = self
            .paths
            .store(StoreKind::Credential, self.options.backup);
        let credentials = persist_credentials(&credential_store, &creds)?;

        Ok(RunSummary {
            session_profile,
            credentials,
            profiles: creds.into_iter().map(|c| c.profile_name).collect(),
        })
    }
}
