use std::sync::Arc;

use anyhow::Context;

use crate::infra::remote::{
    self, AuthenticationGate, Committer, DirectClient, GatewayClient, GatewayCredentialStore,
    GhCredentialStore, RepositoryClient, get_gh_token,
};
use crate::shared::config::{BackendKind, Config, ConfigError};
use crate::shared::env_var::EnvVars;

/// Build the repository client selected by `backend.kind`.
///
/// Both backends sit behind an [`AuthenticationGate`]. The direct backend takes
/// its token from COMMITFLOW_TOKEN, falling back to `gh auth token`, and
/// re-authenticates through gh. The gateway sends COMMITFLOW_TOKEN as its
/// session token when set and re-reads it when the gateway answers 401.
pub fn build_client(config: &Config) -> anyhow::Result<Arc<dyn RepositoryClient>> {
    let can_fork = config.backend.can_fork;
    match config.backend.kind {
        BackendKind::Direct => {
            let token = match EnvVars::load().token {
                Some(token) => token,
                None => get_gh_token().context("Set COMMITFLOW_TOKEN or log in with `gh auth login`")?,
            };
            let api_url = config.backend.api_url.clone();
            let client = DirectClient::new(&api_url, &token)?.with_fork_support(can_fork);
            let credentials = GhCredentialStore::new(move |token| {
                let client: Arc<dyn RepositoryClient> =
                    Arc::new(DirectClient::new(&api_url, &token)?.with_fork_support(can_fork));
                Ok(client)
            });
            Ok(Arc::new(AuthenticationGate::new(
                Arc::new(client),
                Arc::new(credentials),
            )))
        }
        BackendKind::Gateway => {
            let url = config
                .backend
                .gateway_url
                .clone()
                .ok_or(ConfigError::MissingGatewayUrl)?;
            let committer = Committer {
                name: config.commit.committer_name.clone(),
                email: config.commit.committer_email.clone(),
            };
            let build = move |token: Option<String>| -> remote::Result<Arc<dyn RepositoryClient>> {
                let client: Arc<dyn RepositoryClient> = Arc::new(
                    GatewayClient::new(&url, committer.clone())?
                        .with_token(token)
                        .with_fork_support(can_fork),
                );
                Ok(client)
            };
            let client = build(EnvVars::load().token)?;
            Ok(Arc::new(AuthenticationGate::new(
                client,
                Arc::new(GatewayCredentialStore::new(build)),
            )))
        }
    }
}
