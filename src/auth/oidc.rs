use crate::client::ClientError;
use crate::models::CachedSessionToken;
use aws_config::SdkConfig;
use aws_sdk_ssooidc::Client as SsoOidcClient;
use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;
use tokio::time::sleep;

const CLIENT_NAME: &str = "sso-creds";
const CLIENT_TYPE: &str = "public";
const POLL_INTERVAL_SECONDS: u64 = 5;
const SLOW_DOWN_EXTRA_SECONDS: u64 = 5;
const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Layout the AWS CLI v2 uses for `expiresAt` in the SSO cache
pub const CACHE_EXPIRES_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Device authorization information from StartDeviceAuthorization
#[derive(Debug, Clone)]
struct DeviceAuthorizationInfo {
    device_code: String,
    user_code: String,
    verification_uri: String,
    verification_uri_complete: Option<String>,
    interval: Option<i32>,
}

/// OIDC client for the SSO device authorization flow
pub struct OidcClient {
    client: SsoOidcClient,
    region: String,
}

impl OidcClient {
    pub fn new(sdk_config: &SdkConfig, region: &str) -> Self {
        Self {
            client: SsoOidcClient::new(sdk_config),
            region: region.to_string(),
        }
    }

    async fn register_client(&self) -> Result<(String, String), ClientError> {
        tracing::debug!("Registering client with SSO-OIDC");

        let response = self
            .client
            .register_client()
            .client_name(CLIENT_NAME)
            .client_type(CLIENT_TYPE)
            .send()
            .await
            .map_err(|e| ClientError::AwsSdk(format!("Failed to register client: {}", e)))?;

        let client_id = response
            .client_id()
            .ok_or_else(|| ClientError::Response("No client_id in response".to_string()))?
            .to_string();

        let client_secret = response
            .client_secret()
            .ok_or_else(|| ClientError::Response("No client_secret in response".to_string()))?
            .to_string();

        Ok((client_id, client_secret))
    }

    async fn start_device_authorization(
        &self,
        client_id: &str,
        client_secret: &str,
        start_url: &str,
    ) -> Result<DeviceAuthorizationInfo, ClientError> {
        tracing::debug!("Starting device authorization for: {}", start_url);

        let response = self
            .client
            .start_device_authorization()
            .client_id(client_id)
            .client_secret(client_secret)
            .start_url(start_url)
            .send()
            .await
            .map_err(|e| {
                ClientError::AwsSdk(format!("Failed to start device authorization: {}", e))
            })?;

        Ok(DeviceAuthorizationInfo {
            device_code: response
                .device_code()
                .ok_or_else(|| ClientError::Response("No device_code in response".to_string()))?
                .to_string(),
            user_code: response
                .user_code()
                .ok_or_else(|| ClientError::Response("No user_code in response".to_string()))?
                .to_string(),
            verification_uri: response
                .verification_uri()
                .ok_or_else(|| {
                    ClientError::Response("No verification_uri in response".to_string())
                })?
                .to_string(),
            verification_uri_complete: response.verification_uri_complete().map(|s| s.to_string()),
            interval: Some(response.interval()),
        })
    }

    async fn poll_for_token(
        &self,
        client_id: &str,
        client_secret: &str,
        device_code: &str,
        start_url: &str,
        poll_interval: u64,
    ) -> Result<CachedSessionToken, ClientError> {
        tracing::debug!("Polling for token with interval: {}s", poll_interval);

        loop {
            match self
                .client
                .create_token()
                .client_id(client_id)
                .client_secret(client_secret)
                .grant_type(DEVICE_CODE_GRANT)
                .device_code(device_code)
                .send()
                .await
            {
                Ok(response) => {
                    let access_token = response
                        .access_token()
                        .ok_or_else(|| {
                            ClientError::Response("No access_token in response".to_string())
                        })?;

                    tracing::debug!("Token received, expires in {} seconds", response.expires_in());

                    return Ok(session_token(
                        access_token,
                        response.expires_in(),
                        Utc::now(),
                        start_url,
                        &self.region,
                    ));
                }
                Err(err) => {
                    use aws_sdk_ssooidc::error::ProvideErrorMetadata;

                    let Some(code) = err.code() else {
                        return Err(ClientError::AwsSdk(format!("Token creation failed: {}", err)));
                    };

                    tracing::debug!(
                        "CreateToken error: {} - {}",
                        code,
                        err.message().unwrap_or("")
                    );

                    match next_poll(code, poll_interval) {
                        PollStep::Wait(delay) => sleep(delay).await,
                        PollStep::Expired => return Err(ClientError::AuthorizationExpired),
                        PollStep::Fail => {
                            return Err(ClientError::AwsSdk(format!(
                                "Token creation failed with error code '{}': {}",
                                code,
                                err.message().unwrap_or("unknown error")
                            )));
                        }
                    }
                }
            }
        }
    }

    /// Run the whole device flow and return a token in SSO cache shape
    pub async fn perform_device_flow(
        &self,
        start_url: &str,
        headless: bool,
    ) -> Result<CachedSessionToken, ClientError> {
        let (client_id, client_secret) = self.register_client().await?;

        let auth_info = self
            .start_device_authorization(&client_id, &client_secret, start_url)
            .await?;

        display_authorization_prompt(&auth_info, headless);

        let poll_interval = poll_interval(auth_info.interval);

        self.poll_for_token(
            &client_id,
            &client_secret,
            &auth_info.device_code,
            start_url,
            poll_interval,
        )
        .await
    }
}

/// What to do after a failed CreateToken call
#[derive(Debug, PartialEq, Eq)]
enum PollStep {
    Wait(StdDuration),
    Expired,
    Fail,
}

fn next_poll(error_code: &str, poll_interval: u64) -> PollStep {
    match error_code {
        "AuthorizationPendingException" => PollStep::Wait(StdDuration::from_secs(poll_interval)),
        "SlowDownException" => {
            PollStep::Wait(StdDuration::from_secs(poll_interval + SLOW_DOWN_EXTRA_SECONDS))
        }
        "ExpiredTokenException" => PollStep::Expired,
        _ => PollStep::Fail,
    }
}

/// Seconds between CreateToken calls; the server's value when it gave one
fn poll_interval(server_interval: Option<i32>) -> u64 {
    server_interval
        .filter(|i| *i > 0)
        .map(|i| i as u64)
        .unwrap_or(POLL_INTERVAL_SECONDS)
}

/// The token as the AWS CLI writes it to the SSO cache
fn session_token(
    access_token: &str,
    expires_in_seconds: i32,
    now: DateTime<Utc>,
    start_url: &str,
    region: &str,
) -> CachedSessionToken {
    let expires_at = now + Duration::seconds(i64::from(expires_in_seconds));

    CachedSessionToken {
        start_url: Some(start_url.to_string()),
        region: Some(region.to_string()),
        access_token: access_token.to_string(),
        expires_at: expires_at.format(CACHE_EXPIRES_AT_FORMAT).to_string(),
    }
}

fn display_authorization_prompt(auth_info: &DeviceAuthorizationInfo, headless: bool) {
    eprintln!("\n=== AWS SSO Login ===");

    if headless {
        eprintln!("Running in headless mode - please open browser manually:");
        eprintln!();
        eprintln!("Visit: {}", auth_info.verification_uri);
        eprintln!("Enter code: {}", auth_info.user_code);
        eprintln!();
    } else {
        eprintln!("Opening browser to: {}", auth_info.verification_uri);
        eprintln!("\nIf browser doesn't open automatically, visit:");
        eprintln!("  {}", auth_info.verification_uri);
        eprintln!("\nAnd enter code: {}\n", auth_info.user_code);

        let url_to_open = auth_info
            .verification_uri_complete
            .as_ref()
            .unwrap_or(&auth_info.verification_uri);

        if let Err(e) = webbrowser::open(url_to_open) {
            eprintln!("Could not open browser automatically: {}", e);
            eprintln!("Please open the URL manually.\n");
        }
    }

    eprintln!("Waiting for authorization...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_poll_interval() {
        assert_eq!(poll_interval(Some(3)), 3);
        assert_eq!(poll_interval(Some(0)), POLL_INTERVAL_SECONDS);
        assert_eq!(poll_interval(Some(-1)), POLL_INTERVAL_SECONDS);
        assert_eq!(poll_interval(None), POLL_INTERVAL_SECONDS);
    }

    #[test]
    fn test_next_poll() {
        assert_eq!(
            next_poll("AuthorizationPendingException", 3),
            PollStep::Wait(StdDuration::from_secs(3))
        );
        assert_eq!(
            next_poll("SlowDownException", 3),
            PollStep::Wait(StdDuration::from_secs(8))
        );
        assert_eq!(next_poll("ExpiredTokenException", 3), PollStep::Expired);
        assert_eq!(next_poll("AccessDeniedException", 3), PollStep::Fail);
    }

    #[test]
    fn test_session_token_uses_cache_format() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let token = session_token(
            "tok",
            28_800,
            now,
            "https://example.awsapps.com/start",
            "eu-west-1",
        );

        assert_eq!(token.expires_at, "2024-05-01T18:00:00Z");
        assert_eq!(token.region_or("us-east-1"), "eu-west-1");
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap()));

        let json = serde_json::to_string(&token).unwrap();
        assert!(json.contains("\"startUrl\":\"https://example.awsapps.com/start\""));
        assert!(json.contains("\"accessToken\":\"tok\""));
    }
}
