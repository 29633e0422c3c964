use std::process::Command;
use std::sync::Arc;

use super::error::{RemoteError, Result};
use super::{CredentialStore, RepositoryClient};
use crate::shared::env_var::EnvVars;

/// Get a GitHub token from the gh CLI.
pub fn get_gh_token() -> Result<String> {
    let output = Command::new("gh")
        .args(["auth", "token"])
        .output()
        .map_err(|e| RemoteError::Auth(format!("Failed to run gh auth token: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RemoteError::Auth(format!("gh auth token failed: {stderr}")));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(RemoteError::Auth(
            "gh auth token returned empty token".to_string(),
        ));
    }

    Ok(token)
}

type ClientFactory = dyn Fn(String) -> Result<Arc<dyn RepositoryClient>> + Send + Sync;

/// Re-authenticates by asking the gh CLI for its current token.
///
/// `gh auth token` reflects a `gh auth login` or `gh auth refresh` done after
/// the first token was handed out, so re-running it picks up new credentials.
pub struct GhCredentialStore {
    build: Box<ClientFactory>,
}

impl GhCredentialStore {
    pub fn new(
        build: impl Fn(String) -> Result<Arc<dyn RepositoryClient>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            build: Box::new(build),
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for GhCredentialStore {
    async fn reauthenticate(&self) -> Result<Arc<dyn RepositoryClient>> {
        let token = get_gh_token()?;
        tracing::debug!("obtained a new token from gh");
        (self.build)(token)
    }
}

type GatewayFactory = dyn Fn(Option<String>) -> Result<Arc<dyn RepositoryClient>> + Send + Sync;

/// Re-authenticates against the gateway by re-reading its session token from
/// COMMITFLOW_TOKEN and rebuilding the client around it.
pub struct GatewayCredentialStore {
    build: Box<GatewayFactory>,
}

impl GatewayCredentialStore {
    pub fn new(
        build: impl Fn(Option<String>) -> Result<Arc<dyn RepositoryClient>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            build: Box::new(build),
        }
    }
}

#[async_trait::async_trait]
impl CredentialStore for GatewayCredentialStore {
    async fn reauthenticate(&self) -> Result<Arc<dyn RepositoryClient>> {
        let token = EnvVars::load().token;
        tracing::debug!(has_token = token.is_some(), "rebuilding the gateway session");
        (self.build)(token)
    }
}
