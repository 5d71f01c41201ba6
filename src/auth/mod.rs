// SSO session token: cache lookup and login
mod oidc;
mod token_cache;

pub use oidc::OidcClient;
pub use token_cache::TokenCache;

use crate::client::SsoControlPlane;
use crate::error::{Result, SsoError};
use crate::models::{CachedSessionToken, SessionConfig};

/// Whether the SSO cache currently holds a usable token
#[derive(Debug, Clone)]
pub enum AuthState {
    Unauthenticated,
    Authenticated(CachedSessionToken),
}

/// Turns a session configuration into a usable SSO access token.
///
/// Logs in at most once per call: `Unauthenticated --login--> Authenticated`
/// is the only transition, and it is attempted a single time.
pub struct Authenticator<'a, C: SsoControlPlane + ?Sized> {
    client: &'a C,
    token_cache: &'a TokenCache,
}

impl<'a, C: SsoControlPlane + ?Sized> Authenticator<'a, C> {
    pub fn new(client: &'a C, token_cache: &'a TokenCache) -> Self {
        Self {
            client,
            token_cache,
        }
    }

    /// Inspect the cache without side effects
    pub fn current_state(&self, config: &SessionConfig) -> Result<AuthState> {
        match self.token_cache.get_token(&config.start_url)? {
            Some(token) if !token.is_expired() => {
                tracing::debug!("The SSO cache token is not expired: {}", token.expires_at);
                Ok(AuthState::Authenticated(token))
            }
            Some(token) => {
                tracing::debug!("The SSO cache token expired at {}", token.expires_at);
                Ok(AuthState::Unauthenticated)
            }
            None => Ok(AuthState::Unauthenticated),
        }
    }

    /// Return a valid token, logging in once if the cache has none.
    ///
    /// With `force_login` the cached token is ignored and the login always
    /// happens; the result is still read back from the cache.
    pub fn obtain_session(
        &self,
        config: &SessionConfig,
        force_login: bool,
    ) -> Result<CachedSessionToken> {
        let state = if force_login {
            AuthState::Unauthenticated
        } else {
            self.current_state(config)?
        };

        if let AuthState::Authenticated(token) = state {
            return Ok(token);
        }

        self.client
            .login(&config.role_name)
            .map_err(SsoError::Login)?;
        tracing::info!("The SSO cache file has been updated");

        match self.current_state(config)? {
            AuthState::Authenticated(token) => Ok(token),
            AuthState::Unauthenticated => Err(SsoError::RenewalFailed {
                start_url: config.start_url.clone(),
            }),
        }
    }
}
