// Account/role fan-out and credential retrieval
mod naming;

pub use naming::resolve_profile_name;

use crate::client::SsoControlPlane;
use crate::error::{Result, SsoError};
use crate::models::{Account, CachedSessionToken, Credential};
use crate::session::Deadline;

/// Lists every account visible to the token, then the roles of each.
///
/// Account order and role order are kept as returned; they decide profile
/// naming. Accounts without roles stay in the result.
pub fn enumerate<C: SsoControlPlane + ?Sized>(
    client: &C,
    token: &CachedSessionToken,
    region: &str,
    deadline: &Deadline,
) -> Result<Vec<Account>> {
    deadline.check("listing accounts")?;
    let listed = client
        .list_accounts(&token.access_token, region)
        .map_err(SsoError::ListAccounts)?;

    tracing::debug!("{} accounts obtained with the SSO token", listed.len());

    let mut accounts = Vec::with_capacity(listed.len());
    for info in listed {
        deadline.check("listing account roles")?;
        let roles = client
            .list_account_roles(&token.access_token, region, &info.id)
            .map_err(|source| SsoError::ListRoles {
                account_id: info.id.clone(),
                source,
            })?;

        let roles: Vec<String> = roles.into_iter().map(|r| r.role_name).collect();
        tracing::debug!("Account {} has roles {:?}", info.id, roles);

        accounts.push(Account {
            id: info.id,
            name: info.name,
            email: info.email,
            roles,
        });
    }

    Ok(accounts)
}

/// Fetches credentials for every (account, role) pair, in order.
///
/// The first failure aborts the whole fan-out. An empty result is an error:
/// there would be nothing to persist.
pub fn fetch_credentials<C: SsoControlPlane + ?Sized>(
    client: &C,
    token: &CachedSessionToken,
    region: &str,
    accounts: &[Account],
    deadline: &Deadline,
) -> Result<Vec<Credential>> {
    let mut creds = Vec::new();

    for account in accounts {
        for (index, role_name) in account.roles.iter().enumerate() {
            deadline.check("fetching role credentials")?;
            let role_creds = client
                .get_role_credentials(&token.access_token, region, &account.id, role_name)
                .map_err(|source| SsoError::GetCredentials {
                    account_id: account.id.clone(),
                    role_name: role_name.clone(),
                    source,
                })?;

            let profile_name = resolve_profile_name(account, index, role_name);
            tracing::info!(
                "Credentials profile {} ({} / {}, {})",
                profile_name,
                account.name,
                role_name,
                region
            );

            creds.push(Credential {
                profile_name,
                account_name: account.name.clone(),
                region: region.to_string(),
                access_key_id: role_creds.access_key_id,
                secret_access_key: role_creds.secret_access_key,
                session_token: role_creds.session_token,
                expiration_epoch_millis: role_creds.expiration,
            });
        }
    }

    tracing::debug!("{} credentials have been generated", creds.len());

    if creds.is_empty() {
        return Err(SsoError::NoCredentialsFound);
    }

    Ok(creds)
}
