//! Repository backends.
//!
//! [`RepositoryClient`] is the one seam between the commit protocol and the
//! hosting service. Two implementations exist: [`DirectClient`] talks to the
//! hosted REST API, [`GatewayClient`] talks to a server-side git gateway that
//! answers with status-tagged envelopes. [`AuthenticationGate`] wraps either
//! one and replays a call once after re-authentication.

mod auth;
mod direct;
pub(crate) mod error;
mod gateway;
#[cfg(test)]
mod mock;
mod token;

pub use auth::{AuthenticationGate, CredentialStore};
pub use direct::DirectClient;
pub use error::{RemoteError, Result, ServerMerge};
pub use gateway::{Committer, GatewayClient};
#[cfg(test)]
pub use mock::RemoteMockServer;
pub use token::{GatewayCredentialStore, GhCredentialStore, get_gh_token};

use serde::{Deserialize, Serialize};

use crate::infra::locator::RepositoryRef;

/// A file as currently committed on a branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileVersion {
    /// Blob sha of the file.
    pub sha: String,
    pub content: String,
}

/// A commit that landed on a branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitDescriptor {
    pub commit_sha: String,
    /// Blob sha of the committed file.
    pub blob_sha: String,
    /// Web page of the commit, when the backend knows it.
    pub html_url: Option<String>,
}

/// A commit object created on top of a branch head without moving the branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedCommit {
    pub sha: String,
    pub parent_sha: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub filename: String,
    pub status: String,
    pub patch: Option<String>,
}

/// A reviewable difference between two commits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffDescriptor {
    /// Page where the difference can be reviewed.
    pub url: Option<String>,
    pub files: Vec<ChangedFile>,
}

/// Where a new branch starts from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchSource {
    Branch(String),
    Commit(String),
}

/// Outcome of [`RepositoryClient::ensure_branch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchCreation {
    Created,
    AlreadyExists,
}

/// Answer to a branch-name availability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchAvailability {
    /// Whether the probed name is taken.
    pub exists: bool,
    /// First free name in the probed name's series (the name itself when free).
    pub next_available: String,
}

/// One write of the edited file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub branch: String,
    pub path: String,
    pub content: String,
    pub message: String,
    /// Blob sha the remote file must still have. `None` creates the file.
    pub expected_sha: Option<String>,
    /// Content `expected_sha` refers to, for backends that merge on conflict.
    pub ancestor: Option<String>,
}

/// Parameters for opening a pull request across repositories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestParams {
    pub source: RepositoryRef,
    pub destination: RepositoryRef,
    pub source_branch: String,
    pub destination_branch: String,
    pub title: String,
    pub body: String,
}

/// Operations the commit protocol needs from a hosting backend.
///
/// Every call may fail with [`RemoteError::Auth`]; no call path is exempt.
#[async_trait::async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Read the file on a branch (or commit sha).
    async fn get_file_version(
        &self,
        repo: &RepositoryRef,
        reference: &str,
        path: &str,
    ) -> Result<FileVersion>;

    /// Commit sha at the head of a branch.
    async fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Result<String>;

    /// Create `new_branch` from `source`. An existing `new_branch` is not an error.
    async fn ensure_branch(
        &self,
        repo: &RepositoryRef,
        source: &BranchSource,
        new_branch: &str,
    ) -> Result<BranchCreation>;

    /// Commit only if the remote file still has `write.expected_sha`.
    async fn commit_fast_forward(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitDescriptor>;

    /// Commit regardless of the remote file's current state.
    async fn overwrite(&self, repo: &RepositoryRef, write: &FileWrite) -> Result<CommitDescriptor>;

    /// Create a commit of `content` on top of `branch` without moving the branch.
    async fn stage_commit(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<StagedCommit>;

    async fn compare(&self, repo: &RepositoryRef, from: &str, to: &str) -> Result<DiffDescriptor>;

    /// Fork the repository into the authenticated account.
    async fn fork(&self, repo: &RepositoryRef) -> Result<RepositoryRef>;

    /// Open a pull request and return its URL.
    async fn open_pull_request(&self, params: &PullRequestParams) -> Result<String>;

    async fn branch_exists(
        &self,
        repo: &RepositoryRef,
        candidate: &str,
    ) -> Result<BranchAvailability>;

    /// Whether this backend can fork repositories for the current user.
    fn can_fork(&self) -> bool;
}
