//! The commit orchestrator.
//!
//! One [`CommitSession`] per open document. A commit request runs until it
//! either lands or reaches a choice point; at a choice point the session keeps
//! the attempt and returns a [`Prompt`], and the attempt continues only through
//! [`CommitSession::resume`] with that prompt's token.

use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use super::error::{CommitError, Result};
use super::merge::{ConflictDescriptor, MergeCoordinator, MergeInput, MergeTarget, Reconciliation};
use super::naming::{self, BranchNamingPolicy, MAX_PROBES};
use super::prompt::{
    ConflictResolutionChoice, ForkDecision, Prompt, PromptKind, PullRequestDraft, ResumeInput,
    ResumeToken, legal_choices,
};
use super::state::{CommitContext, DocumentBaseline, Position, SessionState};
use crate::infra::locator::{FileLocation, RepositoryRef};
use crate::infra::remote::{
    BranchCreation, BranchSource, CommitDescriptor, FileVersion, FileWrite, PullRequestParams,
    RemoteError, RepositoryClient, ServerMerge,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub branch: String,
    pub message: String,
    pub content: String,
}

/// A fork made to get around missing write access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkResult {
    pub source_repository: RepositoryRef,
    /// Branch the fork branch was created from; also the pull request base.
    pub source_branch: String,
    pub fork: RepositoryRef,
    pub destination_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullRequestOutcome {
    Opened { url: String },
    /// The commit landed but the pull request could not be opened.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReport {
    pub repository: RepositoryRef,
    pub branch: String,
    pub commit: CommitDescriptor,
    /// The committed content is a merge result.
    pub merged: bool,
    /// The branch was created by this attempt.
    pub created_branch: bool,
    pub fork: Option<ForkResult>,
    pub pull_request: Option<PullRequestOutcome>,
    /// Locator to reopen when the document moved to another branch or repository.
    pub reopen_locator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitStep {
    Committed(CommitReport),
    AwaitingChoice(Prompt),
}

struct ForkRun {
    result: ForkResult,
    pull_request: Option<PullRequestDraft>,
}

struct Attempt {
    context: CommitContext,
    fork: Option<ForkRun>,
}

enum Suspended {
    Conflict {
        attempt: Attempt,
        descriptor: ConflictDescriptor,
    },
    ForkConfirmation {
        attempt: Attempt,
    },
}

struct Pending {
    token: ResumeToken,
    stage: Suspended,
}

#[derive(Clone, Copy)]
enum WriteMode {
    FastForward,
    Overwrite,
}

type Clock = Box<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Read the document and build the session state it starts from.
pub async fn open_document(
    client: &dyn RepositoryClient,
    location: FileLocation,
) -> Result<SessionState> {
    let commit_sha = client
        .branch_head(&location.repository, &location.branch)
        .await?;
    let version = client
        .get_file_version(&location.repository, &location.branch, &location.path)
        .await?;
    tracing::info!(
        repository = %location.repository.full_name(),
        branch = %location.branch,
        path = %location.path,
        blob_sha = %version.sha,
        "document opened"
    );
    Ok(SessionState::new(
        location,
        DocumentBaseline {
            blob_sha: version.sha,
            commit_sha,
            content: version.content,
        },
    ))
}

pub struct CommitSession {
    client: Arc<dyn RepositoryClient>,
    merge: MergeCoordinator,
    naming: BranchNamingPolicy,
    pull_request_title: String,
    state: SessionState,
    pending: Option<Pending>,
    clock: Clock,
}

impl CommitSession {
    pub fn new(
        client: Arc<dyn RepositoryClient>,
        merge: MergeCoordinator,
        naming: BranchNamingPolicy,
        state: SessionState,
    ) -> Self {
        Self {
            client,
            merge,
            naming,
            pull_request_title: String::new(),
            state,
            pending: None,
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    pub fn with_pull_request_title(mut self, title: impl Into<String>) -> Self {
        self.pull_request_title = title.into();
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Whether an attempt is waiting at a choice point.
    #[cfg(test)]
    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    /// Start a commit attempt.
    ///
    /// Refused with [`CommitError::Busy`] while a previous attempt waits at a
    /// choice point; resume or abort that one first.
    pub async fn commit(&mut self, request: CommitRequest) -> Result<CommitStep> {
        if self.pending.is_some() {
            return Err(CommitError::Busy);
        }
        naming::validate(&request.branch)?;

        let current = self.state.current().clone();
        let mut context = CommitContext {
            repository: current.repository.clone(),
            target_branch: request.branch,
            message: request.message,
            content: request.content,
            branch_existed_before: true,
        };
        tracing::info!(
            repository = %context.repository.full_name(),
            branch = %context.target_branch,
            "commit requested"
        );

        if context.target_branch != current.branch {
            let source = BranchSource::Branch(current.branch.clone());
            let creation = self
                .client
                .ensure_branch(&current.repository, &source, &context.target_branch)
                .await;
            match creation {
                Ok(BranchCreation::Created) => context.branch_existed_before = false,
                Ok(BranchCreation::AlreadyExists) => {}
                Err(RemoteError::NotAccessible(_)) => {
                    return self.escalate(Attempt {
                        context,
                        fork: None,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.attempt(Attempt {
            context,
            fork: None,
        })
        .await
    }

    /// Continue a suspended attempt.
    pub async fn resume(&mut self, token: ResumeToken, input: ResumeInput) -> Result<CommitStep> {
        let pending = match self.pending.take() {
            Some(pending) if pending.token == token => pending,
            other => {
                self.pending = other;
                return Err(CommitError::UnknownToken);
            }
        };

        match (pending.stage, input) {
            (
                Suspended::Conflict {
                    attempt,
                    descriptor,
                },
                ResumeInput::Conflict {
                    choice,
                    branch_name,
                },
            ) => {
                if !legal_choices(descriptor.outcome).contains(&choice) {
                    self.pending = Some(Pending {
                        token,
                        stage: Suspended::Conflict {
                            attempt,
                            descriptor,
                        },
                    });
                    return Err(CommitError::IllegalChoice(choice.key().to_string()));
                }
                tracing::info!(choice = choice.key(), "resuming after conflict");
                self.resolve(attempt, descriptor, choice, branch_name).await
            }
            (Suspended::ForkConfirmation { attempt }, ResumeInput::Fork(decision)) => {
                self.run_fork(attempt, decision).await
            }
            (stage, input) => {
                self.pending = Some(Pending { token, stage });
                let key = match input {
                    ResumeInput::Conflict { choice, .. } => choice.key(),
                    ResumeInput::Fork(_) => "fork",
                };
                Err(CommitError::IllegalChoice(key.to_string()))
            }
        }
    }

    /// Drop a suspended attempt. Nothing is written by aborting.
    pub fn abort(&mut self, token: ResumeToken) -> Result<()> {
        match &self.pending {
            Some(pending) if pending.token == token => {
                self.pending = None;
                tracing::info!("commit attempt aborted");
                Ok(())
            }
            _ => Err(CommitError::UnknownToken),
        }
    }

    async fn attempt(&mut self, attempt: Attempt) -> Result<CommitStep> {
        let context = &attempt.context;
        tracing::debug!(
            repository = %context.repository.full_name(),
            branch = %context.target_branch,
            branch_existed_before = context.branch_existed_before,
            "attempting commit"
        );

        let remote = match self
            .client
            .get_file_version(&context.repository, &context.target_branch, self.state.path())
            .await
        {
            Ok(version) => Some(version),
            Err(RemoteError::NotFound(_)) if self.may_create(&attempt) => None,
            Err(err) => return Err(err.into()),
        };

        let Some(remote) = remote else {
            tracing::info!(branch = %context.target_branch, "file is new on the target branch");
            let write = self.write_for(context, context.content.clone(), None);
            return self.write_file(attempt, write, WriteMode::FastForward, false).await;
        };

        if remote.sha != self.state.baseline().blob_sha {
            return self.merge_path(attempt, remote, None).await;
        }

        let write = self.write_for(context, context.content.clone(), Some(remote.sha.clone()));
        match self
            .client
            .commit_fast_forward(&context.repository, &write)
            .await
        {
            Ok(commit) => self.land(attempt, commit, write.content, false).await,
            Err(RemoteError::Conflict(server)) => {
                // The branch moved between reading and writing.
                let latest = match server {
                    Some(_) => remote,
                    None => {
                        self.client
                            .get_file_version(
                                &context.repository,
                                &context.target_branch,
                                self.state.path(),
                            )
                            .await?
                    }
                };
                self.merge_path(attempt, latest, server).await
            }
            Err(RemoteError::NotAccessible(_)) if attempt.fork.is_none() => self.escalate(attempt),
            Err(err) => Err(err.into()),
        }
    }

    async fn merge_path(
        &mut self,
        attempt: Attempt,
        remote: FileVersion,
        server: Option<ServerMerge>,
    ) -> Result<CommitStep> {
        let context = &attempt.context;
        let baseline = self.state.baseline();
        let input = MergeInput {
            ancestor: baseline.content.clone(),
            local: context.content.clone(),
            remote: remote.content,
        };
        let target = MergeTarget {
            repository: &context.repository,
            branch: &context.target_branch,
            path: self.state.path(),
            message: &context.message,
            baseline_commit: &baseline.commit_sha,
            different_branch: self.is_different_branch(context),
        };

        let reconciliation = match self
            .merge
            .reconcile(self.client.as_ref(), target, &input, &remote.sha, server)
            .await
        {
            Ok(reconciliation) => reconciliation,
            // Staging the diff commit is the first write on this path.
            Err(RemoteError::NotAccessible(_)) if attempt.fork.is_none() => {
                return self.escalate(attempt);
            }
            Err(err) => return Err(err.into()),
        };

        match reconciliation {
            Reconciliation::Identical { latest_sha } => {
                let write = self.write_for(context, context.content.clone(), Some(latest_sha));
                self.write_file(attempt, write, WriteMode::FastForward, false)
                    .await
            }
            Reconciliation::AutoCommit { merged, latest_sha } => {
                let write = self.write_for(context, merged, Some(latest_sha));
                self.write_file(attempt, write, WriteMode::FastForward, true)
                    .await
            }
            Reconciliation::NeedsChoice(descriptor) => {
                let kind = PromptKind::Conflict {
                    descriptor: descriptor.clone(),
                    legal: legal_choices(descriptor.outcome),
                    on_fork: attempt.fork.is_some(),
                };
                Ok(self.suspend(
                    Suspended::Conflict {
                        attempt,
                        descriptor,
                    },
                    kind,
                ))
            }
        }
    }

    async fn resolve(
        &mut self,
        attempt: Attempt,
        descriptor: ConflictDescriptor,
        choice: ConflictResolutionChoice,
        branch_name: Option<String>,
    ) -> Result<CommitStep> {
        match choice {
            ConflictResolutionChoice::MergeAndCommit => {
                let write = self.write_for(
                    &attempt.context,
                    descriptor.merged,
                    Some(descriptor.latest_sha),
                );
                self.write_file(attempt, write, WriteMode::FastForward, true)
                    .await
            }
            ConflictResolutionChoice::Overwrite => {
                let write =
                    self.write_for(&attempt.context, attempt.context.content.clone(), None);
                self.write_file(attempt, write, WriteMode::Overwrite, false)
                    .await
            }
            ConflictResolutionChoice::CommitOnNewBranch => {
                self.commit_on_new_branch(attempt, branch_name).await
            }
        }
    }

    async fn commit_on_new_branch(
        &mut self,
        mut attempt: Attempt,
        branch_name: Option<String>,
    ) -> Result<CommitStep> {
        let name = match branch_name {
            Some(name) => name,
            None => self
                .naming
                .candidate(&attempt.context.target_branch, &(self.clock)()),
        };
        naming::validate(&name)?;

        let repository = attempt.context.repository.clone();
        let availability = self.client.branch_exists(&repository, &name).await?;
        let branch = availability.next_available;
        let baseline = self.state.baseline().clone();

        let source = BranchSource::Commit(baseline.commit_sha.clone());
        let creation = self
            .client
            .ensure_branch(&repository, &source, &branch)
            .await?;
        tracing::info!(%branch, ?creation, "committing on a new branch");

        attempt.context.target_branch = branch;
        attempt.context.branch_existed_before = creation == BranchCreation::AlreadyExists;
        let write = self.write_for(
            &attempt.context,
            attempt.context.content.clone(),
            Some(baseline.blob_sha),
        );
        self.write_file(attempt, write, WriteMode::FastForward, false)
            .await
    }

    /// Write access was denied: offer a fork, or give up when forking is unavailable.
    fn escalate(&mut self, attempt: Attempt) -> Result<CommitStep> {
        let repository = attempt.context.repository.full_name();
        if attempt.fork.is_some() {
            return Err(RemoteError::NotAccessible(repository).into());
        }
        if !self.client.can_fork() {
            tracing::warn!(%repository, "write access denied and forking is unavailable");
            return Err(CommitError::NoWriteAccess(repository));
        }

        tracing::info!(%repository, "write access denied, offering a fork");
        let kind = PromptKind::ForkConfirmation {
            repository,
            proposed_branch: attempt.context.target_branch.clone(),
            pull_request: PullRequestDraft {
                title: self.pull_request_title.clone(),
                body: attempt.context.message.clone(),
            },
        };
        Ok(self.suspend(Suspended::ForkConfirmation { attempt }, kind))
    }

    async fn run_fork(&mut self, attempt: Attempt, decision: ForkDecision) -> Result<CommitStep> {
        naming::validate(&decision.destination_branch)?;

        let origin = attempt.context.repository.clone();
        let fork = self
            .client
            .fork(&origin)
            .await
            .map_err(|source| CommitError::ForkFailed {
                repository: origin.full_name(),
                source,
            })?;
        tracing::info!(fork = %fork.full_name(), "repository forked");

        // Branch from the chosen branch when the origin has it, otherwise from
        // the branch the document is on.
        let chosen = attempt.context.target_branch.clone();
        let source_branch = match self.client.branch_head(&origin, &chosen).await {
            Ok(_) => chosen,
            Err(err) if err.is_not_found() => self.state.current().branch.clone(),
            Err(err) => return Err(err.into()),
        };

        let source = BranchSource::Branch(source_branch.clone());
        let mut destination = decision.destination_branch.clone();
        let mut created = false;
        for _ in 0..MAX_PROBES {
            match self
                .client
                .ensure_branch(&fork, &source, &destination)
                .await?
            {
                BranchCreation::Created => {
                    created = true;
                    break;
                }
                BranchCreation::AlreadyExists => {
                    tracing::debug!(%destination, "branch taken on the fork");
                    destination = naming::seed_or_next(&destination)?;
                }
            }
        }
        if !created {
            return Err(CommitError::NamingExhausted(decision.destination_branch));
        }
        tracing::info!(%destination, %source_branch, "branch created on the fork");

        let result = ForkResult {
            source_repository: origin,
            source_branch,
            fork: fork.clone(),
            destination_branch: destination.clone(),
        };
        let context = CommitContext {
            repository: fork,
            target_branch: destination,
            branch_existed_before: false,
            ..attempt.context
        };
        self.attempt(Attempt {
            context,
            fork: Some(ForkRun {
                result,
                pull_request: decision.pull_request,
            }),
        })
        .await
    }

    async fn write_file(
        &mut self,
        attempt: Attempt,
        write: FileWrite,
        mode: WriteMode,
        merged: bool,
    ) -> Result<CommitStep> {
        let repository = &attempt.context.repository;
        let written = match mode {
            WriteMode::FastForward => self.client.commit_fast_forward(repository, &write).await,
            WriteMode::Overwrite => self.client.overwrite(repository, &write).await,
        };
        match written {
            Ok(commit) => self.land(attempt, commit, write.content, merged).await,
            Err(RemoteError::NotAccessible(_)) if attempt.fork.is_none() => self.escalate(attempt),
            Err(err) => Err(err.into()),
        }
    }

    /// The only place session state changes.
    async fn land(
        &mut self,
        attempt: Attempt,
        commit: CommitDescriptor,
        content: String,
        merged: bool,
    ) -> Result<CommitStep> {
        let Attempt { context, fork } = attempt;
        let before = self.state.location();

        self.state.finalize(
            Position {
                repository: context.repository.clone(),
                branch: context.target_branch.clone(),
            },
            DocumentBaseline {
                blob_sha: commit.blob_sha.clone(),
                commit_sha: commit.commit_sha.clone(),
                content,
            },
        );
        tracing::info!(
            repository = %context.repository.full_name(),
            branch = %context.target_branch,
            commit = %commit.commit_sha,
            merged,
            "commit landed"
        );

        let pull_request = match &fork {
            Some(ForkRun {
                result,
                pull_request: Some(draft),
            }) => Some(self.open_pull_request(result, draft).await),
            _ => None,
        };

        let after = self.state.location();
        let reopen_locator = (after != before).then(|| after.to_locator());

        Ok(CommitStep::Committed(CommitReport {
            repository: context.repository,
            branch: context.target_branch,
            commit,
            merged,
            created_branch: !context.branch_existed_before,
            fork: fork.map(|run| run.result),
            pull_request,
            reopen_locator,
        }))
    }

    async fn open_pull_request(
        &self,
        fork: &ForkResult,
        draft: &PullRequestDraft,
    ) -> PullRequestOutcome {
        // Landing on the fork moved the session; the request targets where it came from.
        let destination = self
            .state
            .previous()
            .map_or_else(|| fork.source_repository.clone(), |left| left.repository.clone());
        let params = PullRequestParams {
            source: fork.fork.clone(),
            destination,
            source_branch: fork.destination_branch.clone(),
            destination_branch: fork.source_branch.clone(),
            title: draft.title.clone(),
            body: draft.body.clone(),
        };
        match self.client.open_pull_request(&params).await {
            Ok(url) => {
                tracing::info!(%url, "pull request opened");
                PullRequestOutcome::Opened { url }
            }
            Err(err) => {
                tracing::warn!(error = %err, "commit landed but the pull request failed");
                PullRequestOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        }
    }

    fn suspend(&mut self, stage: Suspended, kind: PromptKind) -> CommitStep {
        let token = ResumeToken::new();
        self.pending = Some(Pending { token, stage });
        tracing::info!(%token, "waiting for the user");
        CommitStep::AwaitingChoice(Prompt { token, kind })
    }

    fn write_for(
        &self,
        context: &CommitContext,
        content: String,
        expected_sha: Option<String>,
    ) -> FileWrite {
        let baseline = self.state.baseline();
        let ancestor = expected_sha
            .as_deref()
            .filter(|sha| *sha == baseline.blob_sha)
            .map(|_| baseline.content.clone());
        FileWrite {
            branch: context.target_branch.clone(),
            path: self.state.path().to_string(),
            content,
            message: context.message.clone(),
            expected_sha,
            ancestor,
        }
    }

    /// A missing file is created rather than reported when the attempt moved
    /// away from the document's own branch.
    fn may_create(&self, attempt: &Attempt) -> bool {
        let current = self.state.current();
        attempt.fork.is_some()
            || attempt.context.repository != current.repository
            || attempt.context.target_branch != current.branch
    }

    fn is_different_branch(&self, context: &CommitContext) -> bool {
        let origin = self.state.origin();
        context.repository != origin.repository || context.target_branch != origin.branch
    }
}
