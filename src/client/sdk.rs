use super::{AccountInfo, ClientError, RoleCredentials, RoleInfo, SsoControlPlane};
use crate::auth::{OidcClient, TokenCache};
use crate::session::Deadline;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_sso::Client as SsoClient;
use std::future::Future;
use tokio::runtime::Runtime;

/// Talks to the SSO portal API through the AWS SDK.
///
/// The SDK is async; each call is driven to completion on a private
/// current-thread runtime so callers see plain blocking calls. Every call,
/// the device-flow polling included, is cut off at the deadline.
pub struct SdkClient {
    runtime: Runtime,
    sdk_config: SdkConfig,
    start_url: String,
    region: String,
    headless: bool,
    token_cache: TokenCache,
    deadline: Deadline,
}

impl SdkClient {
    pub fn new(
        start_url: &str,
        region: &str,
        token_cache: TokenCache,
        headless: bool,
        deadline: Deadline,
    ) -> Result<Self, ClientError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let sdk_config = block_on_until(&runtime, &deadline, "loading the AWS SDK config", async {
            Ok(aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load()
                .await)
        })?;

        Ok(Self {
            runtime,
            sdk_config,
            start_url: start_url.to_string(),
            region: region.to_string(),
            headless,
            token_cache,
            deadline,
        })
    }

    fn sso_client(&self, region: &str) -> SsoClient {
        let config = aws_sdk_sso::config::Builder::from(&self.sdk_config)
            .region(Region::new(region.to_string()))
            .build();
        SsoClient::from_conf(config)
    }
}

impl SsoControlPlane for SdkClient {
    fn login(&self, role_name: &str) -> Result<(), ClientError> {
        tracing::debug!(
            "Starting SSO device flow for {} (role {})",
            self.start_url,
            role_name
        );

        let oidc = OidcClient::new(&self.sdk_config, &self.region);
        let token = block_on_until(
            &self.runtime,
            &self.deadline,
            "waiting for the SSO device authorization",
            oidc.perform_device_flow(&self.start_url, self.headless),
        )?;

        self.token_cache.save_token(&self.start_url, &token)?;
        tracing::debug!("SSO token cached for {}", self.start_url);

        Ok(())
    }

    fn list_accounts(
        &self,
        access_token: &str,
        region: &str,
    ) -> Result<Vec<AccountInfo>, ClientError> {
        let client = self.sso_client(region);

        block_on_until(&self.runtime, &self.deadline, "listing accounts", async {
            let mut accounts = Vec::new();
            let mut next_token: Option<String> = None;

            loop {
                let mut request = client.list_accounts().access_token(access_token);

                if let Some(token) = next_token {
                    request = request.next_token(token);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| ClientError::AwsSdk(format!("Failed to list accounts: {}", e)))?;

                for account in response.account_list() {
                    accounts.push(AccountInfo {
                        id: account.account_id().unwrap_or("").to_string(),
                        name: account.account_name().unwrap_or("").to_string(),
                        email: account.email_address().unwrap_or("").to_string(),
                    });
                }

                next_token = response.next_token().map(|s| s.to_string());
                if next_token.is_none() {
                    break;
                }
            }

            Ok::<_, ClientError>(accounts)
        })
    }

    fn list_account_roles(
        &self,
        access_token: &str,
        region: &str,
        account_id: &str,
    ) -> Result<Vec<RoleInfo>, ClientError> {
        let client = self.sso_client(region);

        block_on_until(&self.runtime, &self.deadline, "listing account roles", async {
            let mut roles = Vec::new();
            let mut next_token: Option<String> = None;

            loop {
                let mut request = client
                    .list_account_roles()
                    .access_token(access_token)
                    .account_id(account_id);

                if let Some(token) = next_token {
                    request = request.next_token(token);
                }

                let response = request.send().await.map_err(|e| {
                    ClientError::AwsSdk(format!("Failed to list account roles: {}", e))
                })?;

                for role in response.role_list() {
                    if let Some(role_name) = role.role_name() {
                        roles.push(RoleInfo {
                            role_name: role_name.to_string(),
                            account_id: role.account_id().unwrap_or(account_id).to_string(),
                        });
                    }
                }

                next_token = response.next_token().map(|s| s.to_string());
                if next_token.is_none() {
                    break;
                }
            }

            Ok::<_, ClientError>(roles)
        })
    }

    fn get_role_credentials(
        &self,
        access_token: &str,
        region: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials, ClientError> {
        let client = self.sso_client(region);

        let response = block_on_until(
            &self.runtime,
            &self.deadline,
            "fetching role credentials",
            async {
                client
                    .get_role_credentials()
                    .access_token(access_token)
                    .account_id(account_id)
                    .role_name(role_name)
                    .send()
                    .await
                    .map_err(|e| {
                        ClientError::AwsSdk(format!("Failed to get role credentials: {}", e))
                    })
            },
        )?;

        let role_creds = response
            .role_credentials()
            .ok_or_else(|| ClientError::Response("No role_credentials in response".to_string()))?;

        let access_key_id = role_creds
            .access_key_id()
            .ok_or_else(|| ClientError::Response("No access_key_id in credentials".to_string()))?
            .to_string();

        let secret_access_key = role_creds
            .secret_access_key()
            .ok_or_else(|| {
                ClientError::Response("No secret_access_key in credentials".to_string())
            })?
            .to_string();

        let session_token = role_creds
            .session_token()
            .ok_or_else(|| ClientError::Response("No session_token in credentials".to_string()))?
            .to_string();

        Ok(RoleCredentials {
            access_key_id,
            secret_access_key,
            session_token,
            expiration: role_creds.expiration(),
        })
    }
}

/// Drive `future` on `runtime`, giving up once `deadline` passes
fn block_on_until<T, F>(
    runtime: &Runtime,
    deadline: &Deadline,
    stage: &'static str,
    future: F,
) -> Result<T, ClientError>
where
    F: Future<Output = Result<T, ClientError>>,
{
    match deadline.remaining() {
        None => runtime.block_on(future),
        Some(remaining) => runtime
            .block_on(async move { tokio::time::timeout(remaining, future).await })
            .map_err(|_| ClientError::TimedOut(stage))?,
    }
}
