//! Direct backend: the hosted repository REST API (GitHub v3 shape).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use super::error::{RemoteError, Result};
use super::{
    BranchAvailability, BranchCreation, BranchSource, ChangedFile, CommitDescriptor,
    DiffDescriptor, FileVersion, FileWrite, PullRequestParams, RepositoryClient, StagedCommit,
};
use crate::commit::naming::{self, MAX_PROBES};
use crate::infra::locator::RepositoryRef;

/// Path segment characters left as-is in request URLs.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("commitflow/", env!("CARGO_PKG_VERSION"));

/// Error body returned by the API.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct RefResponse {
    object: RefObject,
}

#[derive(Debug, Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    content: ShaOnly,
    commit: WrittenCommit,
}

#[derive(Debug, Deserialize)]
struct WrittenCommit {
    sha: String,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ShaOnly {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GitCommitResponse {
    tree: ShaOnly,
}

#[derive(Debug, Deserialize)]
struct CompareResponse {
    html_url: Option<String>,
    permalink_url: Option<String>,
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
struct HtmlUrl {
    html_url: String,
}

/// Client for the hosted REST API.
pub struct DirectClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
    can_fork: bool,
}

impl DirectClient {
    pub fn new(api_url: &str, token: &str) -> Result<Self> {
        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            can_fork: true,
        })
    }

    pub fn with_fork_support(mut self, can_fork: bool) -> Self {
        self.can_fork = can_fork;
        self
    }

    fn repo_url(&self, repo: &RepositoryRef, rest: &str) -> String {
        format!(
            "{}/repos/{}/{}/{rest}",
            self.api_url,
            encode(&repo.owner),
            encode(&repo.name)
        )
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        tracing::debug!(%method, url, "direct api request");
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    /// Send a request and decode a successful JSON body.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, what))
    }

    async fn put_contents(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
        sha: Option<&str>,
    ) -> Result<CommitDescriptor> {
        let mut body = json!({
            "message": write.message,
            "content": STANDARD.encode(write.content.as_bytes()),
            "branch": write.branch,
        });
        if let Some(sha) = sha {
            body["sha"] = json!(sha);
        }

        let url = self.repo_url(repo, &format!("contents/{}", encode_path(&write.path)));
        let what = format!("{}:{}", repo.full_name(), write.branch);
        let written: WriteResponse = self
            .send(self.request(Method::PUT, &url).json(&body), &what)
            .await
            .map_err(|err| match err {
                // A write the token may not perform is reported as 404 on private repositories.
                RemoteError::NotFound(what) => RemoteError::NotAccessible(what),
                RemoteError::Api { status: 422, message }
                    if message.contains("does not match") || message.contains("sha") =>
                {
                    RemoteError::Conflict(None)
                }
                other => other,
            })?;

        Ok(CommitDescriptor {
            commit_sha: written.commit.sha,
            blob_sha: written.content.sha,
            html_url: written.commit.html_url,
        })
    }

    async fn create_ref(&self, repo: &RepositoryRef, sha: &str, branch: &str) -> Result<BranchCreation> {
        let url = self.repo_url(repo, "git/refs");
        let body = json!({ "ref": format!("refs/heads/{branch}"), "sha": sha });
        let created: Result<serde_json::Value> = self
            .send(self.request(Method::POST, &url).json(&body), &repo.full_name())
            .await;
        match created {
            Ok(_) => Ok(BranchCreation::Created),
            Err(RemoteError::Api { status: 422, message })
                if message.contains("Reference already exists") =>
            {
                Ok(BranchCreation::AlreadyExists)
            }
            Err(RemoteError::NotFound(what)) => Err(RemoteError::NotAccessible(what)),
            Err(err) => Err(err),
        }
    }

    /// Create a git object. Like a contents write, a 404 here means the token
    /// may read the repository but not write to it.
    async fn create_object(
        &self,
        repo: &RepositoryRef,
        endpoint: &str,
        body: serde_json::Value,
    ) -> Result<ShaOnly> {
        self.send(
            self.request(Method::POST, &self.repo_url(repo, endpoint)).json(&body),
            &repo.full_name(),
        )
        .await
        .map_err(|err| match err {
            RemoteError::NotFound(what) => RemoteError::NotAccessible(what),
            other => other,
        })
    }

    async fn branch_is_present(&self, repo: &RepositoryRef, name: &str) -> Result<bool> {
        let url = self.repo_url(repo, &format!("branches/{}", encode_path(name)));
        match self
            .send::<serde_json::Value>(self.request(Method::GET, &url), name)
            .await
        {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

#[async_trait::async_trait]
impl RepositoryClient for DirectClient {
    async fn get_file_version(
        &self,
        repo: &RepositoryRef,
        reference: &str,
        path: &str,
    ) -> Result<FileVersion> {
        let url = self.repo_url(repo, &format!("contents/{}", encode_path(path)));
        let file: ContentsResponse = self
            .send(
                self.request(Method::GET, &url).query(&[("ref", reference)]),
                &format!("{path} on {reference}"),
            )
            .await?;

        let packed: String = file.content.split_whitespace().collect();
        let bytes = STANDARD
            .decode(packed)
            .map_err(|e| RemoteError::Decode(format!("file content is not base64: {e}")))?;
        let content = String::from_utf8(bytes)
            .map_err(|e| RemoteError::Decode(format!("file content is not UTF-8: {e}")))?;

        Ok(FileVersion {
            sha: file.sha,
            content,
        })
    }

    async fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Result<String> {
        let url = self.repo_url(repo, &format!("git/ref/heads/{}", encode_path(branch)));
        let reference: RefResponse = self
            .send(self.request(Method::GET, &url), &format!("branch {branch}"))
            .await?;
        Ok(reference.object.sha)
    }

    async fn ensure_branch(
        &self,
        repo: &RepositoryRef,
        source: &BranchSource,
        new_branch: &str,
    ) -> Result<BranchCreation> {
        let sha = match source {
            BranchSource::Commit(sha) => sha.clone(),
            BranchSource::Branch(name) => match self.branch_head(repo, name).await {
                Ok(sha) => sha,
                // The source may be a commit the document was opened at.
                Err(RemoteError::NotFound(_)) => name.clone(),
                Err(err) => return Err(err),
            },
        };
        let creation = self.create_ref(repo, &sha, new_branch).await?;
        tracing::debug!(repo = %repo.full_name(), new_branch, ?creation, "ensure branch");
        Ok(creation)
    }

    async fn commit_fast_forward(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitDescriptor> {
        self.put_contents(repo, write, write.expected_sha.as_deref())
            .await
    }

    async fn overwrite(&self, repo: &RepositoryRef, write: &FileWrite) -> Result<CommitDescriptor> {
        let current = match self.get_file_version(repo, &write.branch, &write.path).await {
            Ok(version) => Some(version.sha),
            Err(RemoteError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };
        self.put_contents(repo, write, current.as_deref()).await
    }

    async fn stage_commit(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        content: &str,
        message: &str,
    ) -> Result<StagedCommit> {
        let head = self.branch_head(repo, branch).await?;
        let what = repo.full_name();

        let parent: GitCommitResponse = self
            .send(
                self.request(Method::GET, &self.repo_url(repo, &format!("git/commits/{head}"))),
                &what,
            )
            .await?;

        let blob = self
            .create_object(
                repo,
                "git/blobs",
                json!({ "content": content, "encoding": "utf-8" }),
            )
            .await?;

        let tree = self
            .create_object(
                repo,
                "git/trees",
                json!({
                    "base_tree": parent.tree.sha,
                    "tree": [{ "path": path, "mode": "100644", "type": "blob", "sha": blob.sha }],
                }),
            )
            .await?;

        let commit = self
            .create_object(
                repo,
                "git/commits",
                json!({ "message": message, "tree": tree.sha, "parents": [head] }),
            )
            .await?;

        Ok(StagedCommit {
            sha: commit.sha,
            parent_sha: head,
        })
    }

    async fn compare(&self, repo: &RepositoryRef, from: &str, to: &str) -> Result<DiffDescriptor> {
        let url = self.repo_url(repo, &format!("compare/{from}...{to}"));
        let diff: CompareResponse = self
            .send(self.request(Method::GET, &url), &format!("{from}...{to}"))
            .await?;
        Ok(DiffDescriptor {
            url: diff.permalink_url.or(diff.html_url),
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
        let url = self.repo_url(repo, "forks");
        let fork: HtmlUrl = self
            .send(
                self.request(Method::POST, &url).json(&json!({})),
                &repo.full_name(),
            )
            .await?;
        RepositoryRef::from_uri(&fork.html_url).map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn open_pull_request(&self, params: &PullRequestParams) -> Result<String> {
        let url = self.repo_url(&params.destination, "pulls");
        let pull: HtmlUrl = self
            .send(
                self.request(Method::POST, &url).json(&json!({
                    "title": params.title,
                    "head": format!("{}:{}", params.source.owner, params.source_branch),
                    "base": params.destination_branch,
                    "body": params.body,
                })),
                &params.destination.full_name(),
            )
            .await?;
        Ok(pull.html_url)
    }

    async fn branch_exists(
        &self,
        repo: &RepositoryRef,
        candidate: &str,
    ) -> Result<BranchAvailability> {
        if !self.branch_is_present(repo, candidate).await? {
            return Ok(BranchAvailability {
                exists: false,
                next_available: candidate.to_string(),
            });
        }

        let mut name = candidate.to_string();
        for _ in 0..MAX_PROBES {
            name = naming::next_available(&name)
                .map_err(|_| RemoteError::NamingExhausted(candidate.to_string()))?;
            if !self.branch_is_present(repo, &name).await? {
                return Ok(BranchAvailability {
                    exists: true,
                    next_available: name,
                });
            }
        }
        Err(RemoteError::NamingExhausted(candidate.to_string()))
    }

    fn can_fork(&self) -> bool {
        self.can_fork
    }
}

fn encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn encode_path(path: &str) -> String {
    path.split('/').map(encode).collect::<Vec<_>>().join("/")
}

/// Map a non-success status to the error taxonomy.
fn status_error(status: StatusCode, body: &str, what: &str) -> RemoteError {
    let message = serde_json::from_str::<ApiMessage>(body)
        .map(|m| m.message)
        .unwrap_or_else(|_| body.to_string());
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Auth(message),
        StatusCode::FORBIDDEN => RemoteError::NotAccessible(format!("{what}: {message}")),
        StatusCode::NOT_FOUND => RemoteError::NotFound(what.to_string()),
        StatusCode::CONFLICT => RemoteError::Conflict(None),
        _ => RemoteError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
