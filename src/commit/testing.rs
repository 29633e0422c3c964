//! In-memory fakes for orchestrator tests.
//!
//! `FakeRemote` keeps every repository as a set of branches pointing at
//! commit snapshots, enforces the fast-forward precondition on blob shas, and
//! records every call so tests can assert on the protocol rather than only on
//! the final state.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use super::merge::{MergeError, MergeInput, MergeOutcome, MergeResult, MergeService};
use super::naming::{self, MAX_PROBES};
use crate::infra::locator::RepositoryRef;
use crate::infra::remote::{
    BranchAvailability, BranchCreation, BranchSource, CommitDescriptor, DiffDescriptor,
    FileVersion, FileWrite, PullRequestParams, RemoteError, RepositoryClient, Result,
    StagedCommit,
};

/// path -> (blob sha, content)
type Files = BTreeMap<String, (String, String)>;

#[derive(Default)]
struct RepoState {
    branches: BTreeMap<String, String>,
}

#[derive(Default)]
struct State {
    repos: HashMap<String, RepoState>,
    commits: HashMap<String, Files>,
    staged: HashMap<String, String>,
    denied: HashSet<String>,
    failures: HashMap<&'static str, VecDeque<RemoteError>>,
    calls: Vec<String>,
    compares: Vec<(String, String)>,
    pull_requests: Vec<PullRequestParams>,
    fork_owner: String,
    fork_fails: bool,
    pull_requests_fail: bool,
    next_id: u32,
}

impl State {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn head(&self, repo: &RepositoryRef, branch: &str) -> Result<String> {
        self.repos
            .get(&repo.full_name())
            .and_then(|r| r.branches.get(branch))
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch}")))
    }

    fn files_at(&self, commit: &str) -> Files {
        self.commits.get(commit).cloned().unwrap_or_default()
    }

    fn write(
        &mut self,
        repo: &RepositoryRef,
        write: &FileWrite,
        check_sha: bool,
    ) -> Result<CommitDescriptor> {
        if self.denied.contains(&repo.full_name()) {
            return Err(RemoteError::NotAccessible(repo.full_name()));
        }
        let head = self.head(repo, &write.branch)?;
        let mut files = self.files_at(&head);
        let current = files.get(&write.path).map(|(sha, _)| sha.clone());
        if check_sha && current != write.expected_sha {
            return Err(RemoteError::Conflict(None));
        }

        let blob_sha = self.id("blob");
        let commit_sha = self.id("commit");
        files.insert(write.path.clone(), (blob_sha.clone(), write.content.clone()));
        self.commits.insert(commit_sha.clone(), files);
        self.repos
            .entry(repo.full_name())
            .or_default()
            .branches
            .insert(write.branch.clone(), commit_sha.clone());

        Ok(CommitDescriptor {
            html_url: Some(format!("{}/commit/{commit_sha}", repo.uri)),
            commit_sha,
            blob_sha,
        })
    }
}

pub struct FakeRemote {
    state: Mutex<State>,
    can_fork: bool,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                fork_owner: "me".to_string(),
                ..State::default()
            }),
            can_fork: true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Seed a file. The branch gets a head commit `c-<branch>-0` if it is new.
    pub fn with_file(
        self,
        repo: &RepositoryRef,
        branch: &str,
        path: &str,
        sha: &str,
        content: &str,
    ) -> Self {
        {
            let mut state = self.lock();
            let head = state
                .repos
                .get(&repo.full_name())
                .and_then(|r| r.branches.get(branch))
                .cloned()
                .unwrap_or_else(|| format!("c-{branch}-0"));
            let mut files = state.files_at(&head);
            files.insert(path.to_string(), (sha.to_string(), content.to_string()));
            state.commits.insert(head.clone(), files);
            state
                .repos
                .entry(repo.full_name())
                .or_default()
                .branches
                .insert(branch.to_string(), head);
        }
        self
    }

    /// Seed an empty branch.
    pub fn with_branch(self, repo: &RepositoryRef, branch: &str) -> Self {
        {
            let mut state = self.lock();
            let head = format!("c-{branch}-0");
            state.commits.entry(head.clone()).or_default();
            state
                .repos
                .entry(repo.full_name())
                .or_default()
                .branches
                .insert(branch.to_string(), head);
        }
        self
    }

    pub fn deny_writes(self, repo: &RepositoryRef) -> Self {
        self.lock().denied.insert(repo.full_name());
        self
    }

    pub fn without_fork_support(mut self) -> Self {
        self.can_fork = false;
        self
    }

    pub fn failing_forks(self) -> Self {
        self.lock().fork_fails = true;
        self
    }

    pub fn failing_pull_requests(self) -> Self {
        self.lock().pull_requests_fail = true;
        self
    }

    /// Make the next call of `operation` fail with `err`.
    pub fn fail_next(&self, operation: &'static str, err: RemoteError) {
        self.lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(err);
    }

    /// Simulate someone else committing to the branch.
    pub fn remote_edit(&self, repo: &RepositoryRef, branch: &str, path: &str, sha: &str, content: &str) {
        let mut state = self.lock();
        let head = state.head(repo, branch).unwrap();
        let mut files = state.files_at(&head);
        files.insert(path.to_string(), (sha.to_string(), content.to_string()));
        let commit = state.id("other");
        state.commits.insert(commit.clone(), files);
        state
            .repos
            .get_mut(&repo.full_name())
            .unwrap()
            .branches
            .insert(branch.to_string(), commit);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    /// (blob sha, content) of a file at a branch head.
    pub fn file(&self, repo: &RepositoryRef, branch: &str, path: &str) -> Option<(String, String)> {
        let state = self.lock();
        let head = state.head(repo, branch).ok()?;
        state.files_at(&head).get(path).cloned()
    }

    pub fn branches(&self, repo: &RepositoryRef) -> Vec<String> {
        self.lock()
            .repos
            .get(&repo.full_name())
            .map(|r| r.branches.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn head(&self, repo: &RepositoryRef, branch: &str) -> Option<String> {
        self.lock().head(repo, branch).ok()
    }

    pub fn staged_content(&self, sha: &str) -> Option<String> {
        self.lock().staged.get(sha).cloned()
    }

    pub fn last_compare(&self) -> Option<(String, String)> {
        self.lock().compares.last().cloned()
    }

    pub fn pull_requests(&self) -> Vec<PullRequestParams> {
        self.lock().pull_requests.clone()
    }

    fn enter(&self, operation: &'static str) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(operation.to_string());
        match state.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl RepositoryClient for FakeRemote {
    async fn get_file_version(
        &self,
        repo: &RepositoryRef,
        reference: &str,
        path: &str,
    ) -> Result<FileVersion> {
        self.enter("get_file_version")?;
        let state = self.lock();
        let head = state.head(repo, reference)?;
        state
            .files_at(&head)
            .get(path)
            .map(|(sha, content)| FileVersion {
                sha: sha.clone(),
                content: content.clone(),
            })
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn branch_head(&self, repo: &RepositoryRef, branch: &str) -> Result<String> {
        self.enter("branch_head")?;
        self.lock().head(repo, branch)
    }

    async fn ensure_branch(
        &self,
        repo: &RepositoryRef,
        source: &BranchSource,
        new_branch: &str,
    ) -> Result<BranchCreation> {
        self.enter("ensure_branch")?;
        let mut state = self.lock();
        if state.denied.contains(&repo.full_name()) {
            return Err(RemoteError::NotAccessible(repo.full_name()));
        }
        if state.head(repo, new_branch).is_ok() {
            return Ok(BranchCreation::AlreadyExists);
        }
        let head = match source {
            BranchSource::Branch(name) => state.head(repo, name)?,
            BranchSource::Commit(sha) => sha.clone(),
        };
        state
            .repos
            .entry(repo.full_name())
            .or_default()
            .branches
            .insert(new_branch.to_string(), head);
        Ok(BranchCreation::Created)
    }

    async fn commit_fast_forward(
        &self,
        repo: &RepositoryRef,
        write: &FileWrite,
    ) -> Result<CommitDescriptor> {
        self.enter("commit_fast_forward")?;
        self.lock().write(repo, write, true)
    }

    async fn overwrite(&self, repo: &RepositoryRef, write: &FileWrite) -> Result<CommitDescriptor> {
        self.enter("overwrite")?;
        self.lock().write(repo, write, false)
    }

    async fn stage_commit(
        &self,
        repo: &RepositoryRef,
        branch: &str,
        _path: &str,
        content: &str,
        _message: &str,
    ) -> Result<StagedCommit> {
        self.enter("stage_commit")?;
        let mut state = self.lock();
        if state.denied.contains(&repo.full_name()) {
            return Err(RemoteError::NotAccessible(repo.full_name()));
        }
        let parent_sha = state.head(repo, branch)?;
        let sha = state.id("staged");
        state.staged.insert(sha.clone(), content.to_string());
        Ok(StagedCommit { sha, parent_sha })
    }

    async fn compare(&self, repo: &RepositoryRef, from: &str, to: &str) -> Result<DiffDescriptor> {
        self.enter("compare")?;
        self.lock()
            .compares
            .push((from.to_string(), to.to_string()));
        Ok(DiffDescriptor {
            url: Some(format!("{}/compare/{from}...{to}", repo.uri)),
            files: Vec::new(),
        })
    }

    async fn fork(&self, repo: &RepositoryRef) -> Result<RepositoryRef> {
        self.enter("fork")?;
        let mut state = self.lock();
        if state.fork_fails {
            return Err(RemoteError::Api {
                status: 403,
                message: "forking is disabled".to_string(),
            });
        }
        let fork = RepositoryRef::github(&state.fork_owner, &repo.name);
        let mirrored = state
            .repos
            .get(&repo.full_name())
            .map(|r| r.branches.clone())
            .unwrap_or_default();
        state
            .repos
            .entry(fork.full_name())
            .or_default()
            .branches
            .extend(mirrored);
        Ok(fork)
    }

    async fn open_pull_request(&self, params: &PullRequestParams) -> Result<String> {
        self.enter("open_pull_request")?;
        let mut state = self.lock();
        if state.pull_requests_fail {
            return Err(RemoteError::Api {
                status: 422,
                message: "A pull request already exists".to_string(),
            });
        }
        state.pull_requests.push(params.clone());
        Ok(format!(
            "{}/pull/{}",
            params.destination.uri,
            state.pull_requests.len()
        ))
    }

    async fn branch_exists(
        &self,
        repo: &RepositoryRef,
        candidate: &str,
    ) -> Result<BranchAvailability> {
        self.enter("branch_exists")?;
        let state = self.lock();
        if state.head(repo, candidate).is_err() {
            return Ok(BranchAvailability {
                exists: false,
                next_available: candidate.to_string(),
            });
        }
        let mut name = candidate.to_string();
        for _ in 0..MAX_PROBES {
            name = naming::next_available(&name)
                .map_err(|_| RemoteError::NamingExhausted(candidate.to_string()))?;
            if state.head(repo, &name).is_err() {
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

/// Merge service answering every request the same way.
pub struct FakeMergeService {
    answer: std::result::Result<MergeResult, u16>,
    inputs: Mutex<Vec<MergeInput>>,
}

impl FakeMergeService {
    pub fn answering(outcome: MergeOutcome, merged: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: Ok(MergeResult {
                outcome,
                merged: merged.to_string(),
            }),
            inputs: Mutex::new(Vec::new()),
        })
    }

    /// A service that always answers with an HTTP error status.
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            answer: Err(503),
            inputs: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<MergeInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MergeService for FakeMergeService {
    async fn merge(&self, input: &MergeInput) -> std::result::Result<MergeResult, MergeError> {
        self.inputs.lock().unwrap().push(input.clone());
        self.answer.clone().map_err(MergeError::Status)
    }
}
