//! One-shot re-authentication in front of a repository backend.

use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use super::error::Result;
use super::{
    BranchAvailability, BranchCreation, BranchSource, CommitDescriptor, DiffDescriptor,
    FileVersion, FileWrite, PullRequestParams, RepositoryClient, StagedCommit,
};
use crate::infra::locator::RepositoryRef;

/// Source of fresh credentials once the current ones are rejected.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Obtain new credentials and build a client that uses them.
    async fn reauthenticate(&self) -> Result<Arc<dyn RepositoryClient>>;
}

/// Wraps a backend so that an `Auth` failure triggers re-authentication and
/// exactly one replay of the failed call.
///
/// A second `Auth` failure from the replay is returned as-is.
pub struct AuthenticationGate {
    client: RwLock<Arc<dyn RepositoryClient>>,
    credentials: Arc<dyn CredentialStore>,
}

impl AuthenticationGate {
    pub fn new(client: Arc<dyn RepositoryClient>, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client: RwLock::new(client),
            credentials,
        }
    }

    fn current(&self) -> Arc<dyn RepositoryClient> {
        self.client
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn replay<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        T: Send,
        F: Fn(Arc<dyn RepositoryClient>) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T>> + Send,
    {
        match call(self.current()).await {
            Err(err) if err.is_auth() => {
                tracing::info!(operation, "credentials rejected, re-authenticating");
                let fresh = self.credentials.reauthenticate().await?;
                *self.client.write().unwrap_or_else(PoisonError::into_inner) = fresh.clone();
                call(fresh).await
            }
            other => other,
        }
    }
}

#[async_trait::async_trait]
impl RepositoryClient for AuthenticationGate {
    async fn get_file_version(
        &self,
        repo: &RepositoryRef,
        reference: &str,
        path: &str,
    ) -> Result<FileVersion> {
        self.replay("get_file_version", |c| async move {
            c.get_file_version(repo, reference, path).await
        })
        .await
    }

    async fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Result<String> {
        self.replay("branch_head", |c| async move { c.branch_head(repo, branch).await })
            .await
    }

    async fn ensure_branch(
        &self,
        repo: &RepositoryRef,
        source: &BranchSource,
        new_branch: &str,
    ) -> Result<BranchCreation> {
        self.replay("ensure_branch", |c| async move {
            c.ensure_branch(repo, source, new_branch).await
        })
        .await
    }

    async fn commit_fast_forward(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitDescriptor> {
        self.replay("commit_fast_forward", |c| async move {
            c.commit_fast_forward(repo, write).await
        })
        .await
    }

    async fn overwrite(&self, repo: &RepositoryRef, write: &FileWrite) -> Result<CommitDescriptor> {
        self.replay("overwrite", |c| async move { c.overwrite(repo, write).await })
            .await
    }

    async fn stage_commit(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<StagedCommit> {
        self.replay("stage_commit", |c| async move {
            c.stage_commit(repo, branch, path, content, message).await
        })
        .await
    }

    async fn compare(&self, repo: &RepositoryRef, from: &str, to: &str) -> Result<DiffDescriptor> {
        self.replay("compare", |c| async move { c.compare(repo, from, to).await })
            .await
    }

    async fn fork(&self, repo: &RepositoryRef) -> Result<RepositoryRef> {
        self.replay("fork", |c| async move { c.fork(repo).await }).await
    }

    async fn open_pull_request(&self, params: &PullRequestParams) -> Result<String> {
        self.replay("open_pull_request", |c| async move {
            c.open_pull_request(params).await
        })
        .await
    }

    async fn branch_exists(
        &self,
        repo: &RepositoryRef,
        candidate: &str,
    ) -> Result<BranchAvailability> {
        self.replay("branch_exists", |c| async move {
            c.branch_exists(repo, candidate).await
        })
        .await
    }

    fn can_fork(&self) -> bool {
        self.current().can_fork()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::remote::{RemoteError, RemoteMockServer};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out the same mock-backed client and counts the calls.
    struct CountingStore {
        client: Arc<dyn RepositoryClient>,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CredentialStore for CountingStore {
        async fn reauthenticate(&self) -> Result<Arc<dyn RepositoryClient>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.client.clone())
        }
    }

    fn repo() -> RepositoryRef {
        RepositoryRef::github("acme", "docs")
    }

    #[tokio::test]
    async fn replays_once_after_reauthentication() {
        let stale = RemoteMockServer::start().await;
        stale.gateway_http_status("head", 401).await;
        let fresh = RemoteMockServer::start().await;
        fresh
            .gateway("head", json!({ "status": "ok", "sha": "head-1" }))
            .await;

        let store = Arc::new(CountingStore {
            client: Arc::new(fresh.gateway_client()),
            calls: AtomicUsize::new(0),
        });
        let gate = AuthenticationGate::new(Arc::new(stale.gateway_client()), store.clone());

        let sha = gate.branch_head(&repo(), "main").await.unwrap();

        assert_eq!(sha, "head-1");
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        // The fresh client is kept for later calls.
        gate.branch_head(&repo(), "main").await.unwrap();
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn second_auth_failure_is_surfaced() {
        let mock = RemoteMockServer::start().await;
        mock.gateway_http_status("head", 401).await;

        let store = Arc::new(CountingStore {
            client: Arc::new(mock.gateway_client()),
            calls: AtomicUsize::new(0),
        });
        let gate = AuthenticationGate::new(Arc::new(mock.gateway_client()), store.clone());

        let err = gate.branch_head(&repo(), "main").await.unwrap_err();

        assert!(matches!(err, RemoteError::Auth(_)));
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_errors_are_not_replayed() {
        let mock = RemoteMockServer::start().await;
        mock.gateway("head", json!({ "status": "not-found" })).await;

        let store = Arc::new(CountingStore {
            client: Arc::new(mock.gateway_client()),
            calls: AtomicUsize::new(0),
        });
        let gate = AuthenticationGate::new(Arc::new(mock.gateway_client()), store.clone());

        let err = gate.branch_head(&repo(), "main").await.unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
