use super::{AccountInfo, ClientError, RoleCredentials, RoleInfo, SsoControlPlane};
use crate::session::Deadline;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

const DEFAULT_PROGRAM: &str = "aws";
const LOGIN_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Deserialize)]
struct AccountList {
    #[serde(rename = "accountList", default)]
    items: Vec<AccountInfo>,
}

#[derive(Deserialize)]
struct RoleList {
    #[serde(rename = "roleList", default)]
    items: Vec<RoleInfo>,
}

#[derive(Deserialize)]
struct CredentialsEnvelope {
    #[serde(rename = "roleCredentials")]
    item: RoleCredentials,
}

/// Drives the control plane through the `aws` command line (v2).
///
/// Login relies on a `profile <role>` section with the SSO settings being
/// present in ~/.aws/config, which the session profile store provides.
///
/// With a deadline, API calls get matching `--cli-read-timeout` and
/// `--cli-connect-timeout` values and a login still running at the
/// deadline is killed.
pub struct AwsCli {
    program: String,
    deadline: Deadline,
}

impl AwsCli {
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            deadline: Deadline::none(),
        }
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    fn run(&self, args: &[&str]) -> Result<String, ClientError> {
        // Only the subcommand: later arguments carry the access token
        let subcommand = args.iter().take(2).copied().collect::<Vec<_>>().join(" ");
        tracing::trace!("Running {} {}", self.program, subcommand);

        let mut command = Command::new(&self.program);
        command.args(args).stdin(Stdio::null());

        if let Some(remaining) = self.deadline.remaining() {
            if remaining.is_zero() {
                return Err(ClientError::TimedOut("waiting for the aws cli"));
            }
            // 0 would mean no timeout to the aws cli
            let seconds = remaining.as_secs().max(1).to_string();
            command
                .args(["--cli-read-timeout", seconds.as_str()])
                .args(["--cli-connect-timeout", seconds.as_str()]);
        }

        let output = command.output()?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.trim().is_empty() {
                stdout.trim().replace('\n', " ")
            } else {
                stderr.trim().replace('\n', " ")
            };
            return Err(ClientError::Command(message));
        }

        Ok(stdout)
    }

    fn run_json<T: DeserializeOwned>(&self, args: &[&str]) -> Result<T, ClientError> {
        let out = self.run(args)?;
        Ok(serde_json::from_str(&out)?)
    }
}

impl Default for AwsCli {
    fn default() -> Self {
        Self::new()
    }
}

impl SsoControlPlane for AwsCli {
    fn login(&self, role_name: &str) -> Result<(), ClientError> {
        tracing::debug!("Running aws sso login for profile {}", role_name);

        // Interactive: the user has to see the verification code
        let child = Command::new(&self.program)
            .args(["sso", "login", "--profile", role_name])
            .spawn()?;
        let status = wait_until(child, &self.deadline)?;

        if !status.success() {
            return Err(ClientError::Command(format!(
                "sso login exited with {}",
                status
            )));
        }

        Ok(())
    }

    fn list_accounts(
        &self,
        access_token: &str,
        region: &str,
    ) -> Result<Vec<AccountInfo>, ClientError> {
        let list: AccountList = self.run_json(&[
            "sso",
            "list-accounts",
            "--access-token",
            access_token,
            "--region",
            region,
        ])?;
        Ok(list.items)
    }

    fn list_account_roles(
        &self,
        access_token: &str,
        region: &str,
        account_id: &str,
    ) -> Result<Vec<RoleInfo>, ClientError> {
        let list: RoleList = self.run_json(&[
            "sso",
            "list-account-roles",
            "--access-token",
            access_token,
            "--region",
            region,
            "--account-id",
            account_id,
        ])?;
        Ok(list.items)
    }

    fn get_role_credentials(
        &self,
        access_token: &str,
        region: &str,
        account_id: &str,
        role_name: &str,
    ) -> Result<RoleCredentials, ClientError> {
        let envelope: CredentialsEnvelope = self.run_json(&[
            "sso",
            "get-role-credentials",
            "--access-token",
            access_token,
            "--region",
            region,
            "--account-id",
            account_id,
            "--role-name",
            role_name,
        ])?;
        Ok(envelope.item)
    }
}

/// Wait for `child`, killing it if it outlives `deadline`
fn wait_until(mut child: Child, deadline: &Deadline) -> Result<ExitStatus, ClientError> {
    if deadline.remaining().is_none() {
        return Ok(child.wait()?);
    }

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }

        if deadline.remaining().is_some_and(|left| left.is_zero()) {
            tracing::debug!("Killing aws sso login: deadline reached");
            child.kill()?;
            child.wait()?;
            return Err(ClientError::TimedOut("waiting for aws sso login"));
        }

        thread::sleep(LOGIN_POLL_INTERVAL);
    }
}
