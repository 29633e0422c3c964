//! Gateway backend: a server-side git service that answers every call with a
//! status-tagged JSON envelope.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::error::{RemoteError, Result, ServerMerge};
use super::{
    BranchAvailability, BranchCreation, BranchSource, ChangedFile, CommitDescriptor,
    DiffDescriptor, FileVersion, FileWrite, PullRequestParams, RepositoryClient, StagedCommit,
};
use crate::infra::locator::RepositoryRef;

/// Identity recorded on commits made through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum FileReply {
    Ok {
        sha: String,
        content: String,
    },
    NotFound,
    Error {
        #[serde(default)]
        error_message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum BranchReply {
    Created,
    Exists,
    NotFound,
    NoAccess {
        #[serde(default)]
        error_message: String,
    },
    Error {
        #[serde(default)]
        error_message: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum CommitReply {
    Ok {
        commit_sha: String,
        file_sha: String,
        url: Option<String>,
    },
    Merge {
        merge_result_type: String,
        merged_string: String,
        latest_sha: String,
    },
    NoAccess {
        #[serde(default)]
        error_message: String,
    },
    Error {
        #[serde(default)]
        error_message: String,
    },
}

/// Envelope shared by the endpoints whose only failure is `error`.
#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case", rename_all_fields = "camelCase")]
enum Reply<T> {
    Ok(T),
    NotFound,
    Error {
        #[serde(default)]
        error_message: String,
    },
}

#[derive(Debug, Deserialize)]
struct ShaBody {
    sha: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StageBody {
    sha: String,
    parent_sha: String,
}

#[derive(Debug, Deserialize)]
struct CompareBody {
    url: Option<String>,
    #[serde(default)]
    files: Vec<CompareFile>,
}

#[derive(Debug, Deserialize)]
struct CompareFile {
    filename: String,
    status: String,
    patch: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ForkBody {
    repository_uri: String,
}

#[derive(Debug, Deserialize)]
struct UrlBody {
    url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BranchExistsBody {
    branch_exists: bool,
    next_available: String,
}

/// Request body of the `commit` and `write` endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CommitPayload<'a> {
    repository_uri: &'a str,
    destination_branch: &'a str,
    file_path: &'a str,
    new_file_content: &'a str,
    commit_message: &'a str,
    committer: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_content: Option<&'a str>,
}

impl<T> Reply<T> {
    fn into_result(self, what: &str) -> Result<T> {
        match self {
            Reply::Ok(body) => Ok(body),
            Reply::NotFound => Err(RemoteError::NotFound(what.to_string())),
            Reply::Error { error_message } => Err(gateway_error(what, error_message)),
        }
    }
}

pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    committer: Committer,
    token: Option<String>,
    can_fork: bool,
}

impl GatewayClient {
    pub fn new(base_url: &str, committer: Committer) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("commitflow/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            committer,
            token: None,
            can_fork: true,
        })
    }

    /// Session token sent as a bearer credential, when the gateway wants one.
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_fork_support(mut self, can_fork: bool) -> Self {
        self.can_fork = can_fork;
        self
    }

    async fn call<T: DeserializeOwned>(&self, endpoint: &str, body: serde_json::Value) -> Result<T> {
        let url = format!("{}/{endpoint}", self.base_url);
        tracing::debug!(endpoint, "gateway request");

        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Auth(format!("gateway rejected {endpoint}")));
        }
        if !status.is_success() {
            return Err(RemoteError::Transport(format!(
                "gateway {endpoint} answered HTTP {status}"
            )));
        }
        Ok(response.json::<T>().await?)
    }

    fn commit_payload<'a>(&'a self, repo: &'a RepositoryRef, write: &'a FileWrite) -> CommitPayload<'a> {
        CommitPayload {
            repository_uri: &repo.uri,
            destination_branch: &write.branch,
            file_path: &write.path,
            new_file_content: &write.content,
            commit_message: &write.message,
            committer: &self.committer.name,
            email: &self.committer.email,
            initial_sha: write.expected_sha.as_deref(),
            initial_content: write.ancestor.as_deref(),
        }
    }

    async fn send_commit(
        &self,
        endpoint: &str,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitDescriptor> {
        let payload = serde_json::to_value(self.commit_payload(repo, write))
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let what = format!("{}:{}", repo.full_name(), write.branch);

        match self.call::<CommitReply>(endpoint, payload).await? {
            CommitReply::Ok {
                commit_sha,
                file_sha,
                url,
            } => Ok(CommitDescriptor {
                commit_sha,
                blob_sha: file_sha,
                html_url: url,
            }),
            CommitReply::Merge {
                merge_result_type,
                merged_string,
                latest_sha,
            } => Err(RemoteError::Conflict(Some(ServerMerge {
                result_type: merge_result_type,
                merged: merged_string,
                latest_sha,
            }))),
            CommitReply::NoAccess { error_message } => Err(RemoteError::NotAccessible(
                with_detail(&what, &error_message),
            )),
            CommitReply::Error { error_message } => Err(gateway_error(&what, error_message)),
        }
    }
}

#[async_trait::async_trait]
impl RepositoryClient for GatewayClient {
    async fn get_file_version(
        &self,
        repo: &RepositoryRef,
        reference: &str,
        path: &str,
    ) -> Result<FileVersion> {
        let what = format!("{path} on {reference}");
        let reply: FileReply = self
            .call(
                "file",
                json!({ "repositoryUri": repo.uri, "branch": reference, "filePath": path }),
            )
            .await?;
        match reply {
            FileReply::Ok { sha, content } => Ok(FileVersion { sha, content }),
            FileReply::NotFound => Err(RemoteError::NotFound(what)),
            FileReply::Error { error_message } => Err(gateway_error(&what, error_message)),
        }
    }

    async fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Result<String> {
        let reply: Reply<ShaBody> = self
            .call("head", json!({ "repositoryUri": repo.uri, "branch": branch }))
            .await?;
        Ok(reply.into_result(&format!("branch {branch}"))?.sha)
    }

    async fn ensure_branch(
        &self,
        repo: &RepositoryRef,
        source: &BranchSource,
        new_branch: &str,
    ) -> Result<BranchCreation> {
        let (source_branch, source_commit) = match source {
            BranchSource::Branch(name) => (Some(name.as_str()), None),
            BranchSource::Commit(sha) => (None, Some(sha.as_str())),
        };
        let reply: BranchReply = self
            .call(
                "branch",
                json!({
                    "repositoryUri": repo.uri,
                    "sourceBranch": source_branch,
                    "sourceCommit": source_commit,
                    "newBranch": new_branch,
                }),
            )
            .await?;
        match reply {
            BranchReply::Created => Ok(BranchCreation::Created),
            BranchReply::Exists => Ok(BranchCreation::AlreadyExists),
            BranchReply::NotFound => Err(RemoteError::NotFound(format!("{source:?}"))),
            BranchReply::NoAccess { error_message } => Err(RemoteError::NotAccessible(
                with_detail(&repo.full_name(), &error_message),
            )),
            BranchReply::Error { error_message } => Err(gateway_error(new_branch, error_message)),
        }
    }

    async fn commit_fast_forward(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitDescriptor> {
        self.send_commit("commit", repo, write).await
    }

    async fn overwrite(&self, repo: &RepositoryRef, write: &FileWrite) -> Result<CommitDescriptor> {
        let unconditional = FileWrite {
            expected_sha: None,
            ancestor: None,
            ..write.clone()
        };
        self.send_commit("write", repo, &unconditional).await
    }

    async fn stage_commit(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<StagedCommit> {
        let reply: Reply<StageBody> = self
            .call(
                "stage",
                json!({
                    "repositoryUri": repo.uri,
                    "branch": branch,
                    "filePath": path,
                    "newFileContent": content,
                    "commitMessage": message,
                    "committer": self.committer.name,
                    "email": self.committer.email,
                }),
            )
            .await?;
        let staged = reply.into_result(&format!("branch {branch}"))?;
        Ok(StagedCommit {
            sha: staged.sha,
            parent_sha: staged.parent_sha,
        })
    }

    async fn compare(&self, repo: &RepositoryRef, from: &str, to: &str) -> Result<DiffDescriptor> {
        let reply: Reply<CompareBody> = self
            .call(
                "compare",
                json!({ "repositoryUri": repo.uri, "from": from, "to": to }),
            )
            .await?;
        let diff = reply.into_result(&format!("{from}...{to}"))?;
        Ok(DiffDescriptor {
            url: diff.url,
            files: diff
                .files
                .into_iter()
                .map(|f| ChangedFile {
                    filename: f.filename,
                    status: f.status,
                    patch: f.patch,
                })
                .collect(),
        })
    }

    async fn fork(&self, repo: &RepositoryRef) -> Result<RepositoryRef> {
        let reply: Reply<ForkBody> = self
            .call("fork", json!({ "repositoryUri": repo.uri }))
            .await?;
        let fork = reply.into_result(&repo.full_name())?;
        RepositoryRef::from_uri(&fork.repository_uri).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn open_pull_request(&self, params: &PullRequestParams) -> Result<String> {
        let reply: Reply<UrlBody> = self
            .call(
                "pull-request",
                json!({
                    "sourceRepositoryUri": params.source.uri,
                    "destinationRepositoryUri": params.destination.uri,
                    "head": format!("{}:{}", params.source.owner, params.source_branch),
                    "base": params.destination_branch,
                    "title": params.title,
                    "body": params.body,
                }),
            )
            .await?;
        Ok(reply.into_result(&params.destination.full_name())?.url)
    }

    async fn branch_exists(
        &self,
        repo: &RepositoryRef,
        candidate: &str,
    ) -> Result<BranchAvailability> {
        let reply: Reply<BranchExistsBody> = self
            .call(
                "branch-exists",
                json!({ "repositoryUri": repo.uri, "branch": candidate }),
            )
            .await?;
        let body = reply.into_result(candidate)?;
        if body.branch_exists && (body.next_available.is_empty() || body.next_available == candidate)
        {
            return Err(RemoteError::NamingExhausted(candidate.to_string()));
        }
        Ok(BranchAvailability {
            exists: body.branch_exists,
            next_available: if body.branch_exists {
                body.next_available
            } else {
                candidate.to_string()
            },
        })
    }

    fn can_fork(&self) -> bool {
        self.can_fork
    }
}

fn with_detail(what: &str, detail: &str) -> String {
    if detail.is_empty() {
        what.to_string()
    } else {
        format!("{what}: {detail}")
    }
}

fn gateway_error(what: &str, message: String) -> RemoteError {
    RemoteError::Api {
        status: 200,
        message: with_detail(what, &message),
    }
}
