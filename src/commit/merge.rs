//! Three-way merge through the external merge service.
//!
//! The coordinator never merges text itself. It asks the service (or reuses a
//! merge the gateway already computed), classifies the outcome, and for
//! anything that needs a decision stages a commit so the user has a concrete
//! diff to look at.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infra::locator::RepositoryRef;
use crate::infra::remote::{self, DiffDescriptor, RepositoryClient, ServerMerge, StagedCommit};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeOutcome {
    /// The remote side brings nothing new; the local content can be committed as is.
    Identical,
    /// Merged without textual conflicts.
    Clean,
    WithConflicts,
    /// The service could not be reached or gave no usable answer.
    Failed,
}

impl MergeOutcome {
    /// Classify a result tag; anything unrecognised counts as a failed merge.
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "IDENTICAL" => Self::Identical,
            "CLEAN" => Self::Clean,
            "WITH_CONFLICTS" => Self::WithConflicts,
            _ => Self::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeInput {
    pub ancestor: String,
    /// The edited document.
    pub local: String,
    /// Latest content on the target branch.
    pub remote: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    pub outcome: MergeOutcome,
    pub merged: String,
}

impl MergeResult {
    fn failed() -> Self {
        Self {
            outcome: MergeOutcome::Failed,
            merged: String::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("Merge service unreachable: {0}")]
    Transport(String),

    #[error("Merge service answered HTTP {0}")]
    Status(u16),

    #[error("Unexpected merge service response: {0}")]
    Decode(String),
}

#[async_trait::async_trait]
pub trait MergeService: Send + Sync {
    async fn merge(&self, input: &MergeInput) -> Result<MergeResult, MergeError>;
}

#[derive(Debug, Serialize)]
struct MergeRequest<'a> {
    ancestor: &'a str,
    left: &'a str,
    right: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergeResponse {
    result_type: String,
    #[serde(default)]
    merged: String,
}

/// Merge service reached with one `POST {ancestor, left, right}`.
pub struct HttpMergeService {
    http: reqwest::Client,
    url: String,
}

impl HttpMergeService {
    pub fn new(url: &str) -> Result<Self, MergeError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| MergeError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl MergeService for HttpMergeService {
    async fn merge(&self, input: &MergeInput) -> Result<MergeResult, MergeError> {
        let request = MergeRequest {
            ancestor: &input.ancestor,
            left: &input.local,
            right: &input.remote,
        };
        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| MergeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MergeError::Status(status.as_u16()));
        }

        let body: MergeResponse = response
            .json()
            .await
            .map_err(|e| MergeError::Decode(e.to_string()))?;
        Ok(MergeResult {
            outcome: MergeOutcome::from_tag(&body.result_type),
            merged: body.merged,
        })
    }
}

/// Where a conflicting commit was headed.
#[derive(Debug, Clone, Copy)]
pub struct MergeTarget<'a> {
    pub repository: &'a RepositoryRef,
    pub branch: &'a str,
    pub path: &'a str,
    pub message: &'a str,
    /// Commit the document was opened at.
    pub baseline_commit: &'a str,
    /// Whether the attempt already targets a branch other than the document's own.
    pub different_branch: bool,
}

/// Everything the user needs to decide how to resolve a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictDescriptor {
    pub outcome: MergeOutcome,
    pub diff: DiffDescriptor,
    /// Staged commit the diff was computed against.
    pub commit: StagedCommit,
    /// Merged text, meaningful only for [`MergeOutcome::Clean`].
    pub merged: String,
    /// Blob sha of the remote file the merge was computed against.
    pub latest_sha: String,
    pub different_branch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Nothing to merge: commit the local content on top of `latest_sha`.
    Identical { latest_sha: String },
    /// A clean merge the policy allows committing without asking.
    AutoCommit { merged: String, latest_sha: String },
    NeedsChoice(ConflictDescriptor),
}

pub struct MergeCoordinator {
    service: Arc<dyn MergeService>,
    auto_commit_clean: bool,
}

impl MergeCoordinator {
    pub fn new(service: Arc<dyn MergeService>, auto_commit_clean: bool) -> Self {
        Self {
            service,
            auto_commit_clean,
        }
    }

    /// Ask the service to merge. Service failures classify as [`MergeOutcome::Failed`].
    pub async fn classify(&self, input: &MergeInput) -> MergeResult {
        match self.service.merge(input).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "merge service failed, asking the user instead");
                MergeResult::failed()
            }
        }
    }

    /// Reconcile a commit whose target moved since the baseline.
    ///
    /// `server` carries a merge the backend already computed; when present the
    /// merge service is not called.
    pub async fn reconcile(
        &self,
        client: &dyn RepositoryClient,
        target: MergeTarget<'_>,
        input: &MergeInput,
        latest_sha: &str,
        server: Option<ServerMerge>,
    ) -> remote::Result<Reconciliation> {
        let (result, latest_sha) = match server {
            Some(merge) => (
                MergeResult {
                    outcome: MergeOutcome::from_tag(&merge.result_type),
                    merged: merge.merged,
                },
                merge.latest_sha,
            ),
            None => (self.classify(input).await, latest_sha.to_string()),
        };
        tracing::info!(outcome = ?result.outcome, branch = target.branch, "merge classified");

        match result.outcome {
            MergeOutcome::Identical => return Ok(Reconciliation::Identical { latest_sha }),
            MergeOutcome::Clean if self.auto_commit_clean && !target.different_branch => {
                return Ok(Reconciliation::AutoCommit {
                    merged: result.merged,
                    latest_sha,
                });
            }
            _ => {}
        }

        // Stage a commit so there is something concrete to diff. A clean merge
        // is compared with the baseline, everything else with the remote head.
        let staged_content = if result.outcome == MergeOutcome::Clean {
            &result.merged
        } else {
            &input.local
        };
        let commit = client
            .stage_commit(
                target.repository,
                target.branch,
                target.path,
                staged_content,
                target.message,
            )
            .await?;
        let from = if result.outcome == MergeOutcome::Clean {
            target.baseline_commit
        } else {
            commit.parent_sha.as_str()
        };
        let diff = client.compare(target.repository, from, &commit.sha).await?;

        Ok(Reconciliation::NeedsChoice(ConflictDescriptor {
            outcome: result.outcome,
            diff,
            commit,
            merged: result.merged,
            latest_sha,
            different_branch: target.different_branch,
        }))
    }
}
