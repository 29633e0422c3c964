//! Choice points where a commit attempt waits for the user.
//!
//! The orchestrator hands out a [`Prompt`] and stays suspended until it is
//! resumed with the prompt's token. Which answers are legal is decided here
//! and nowhere else.

use std::fmt;

use indoc::formatdoc;
use uuid::Uuid;

use super::error::{CommitError, Result};
use super::merge::{ConflictDescriptor, MergeOutcome};

const CANCEL: &str = "cancel";
const FORK_WITH_PULL_REQUEST: &str = "fork";
const FORK_ONLY: &str = "fork-only";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolutionChoice {
    /// Commit the merge service's merged text on the target branch.
    MergeAndCommit,
    /// Commit the local content on a new branch created from the baseline commit.
    CommitOnNewBranch,
    /// Replace the remote content with the local content.
    Overwrite,
}

impl ConflictResolutionChoice {
    pub fn key(self) -> &'static str {
        match self {
            Self::MergeAndCommit => "merge",
            Self::CommitOnNewBranch => "branch",
            Self::Overwrite => "overwrite",
        }
    }

    fn caption(self) -> &'static str {
        match self {
            Self::MergeAndCommit => "Commit the merged version",
            Self::CommitOnNewBranch => "Commit my version on a new branch",
            Self::Overwrite => "Overwrite the remote version",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        [Self::MergeAndCommit, Self::CommitOnNewBranch, Self::Overwrite]
            .into_iter()
            .find(|choice| choice.key() == key)
    }
}

/// Choices offered for a merge outcome. Merging is only offered for a clean merge.
pub fn legal_choices(outcome: MergeOutcome) -> Vec<ConflictResolutionChoice> {
    let mut choices = Vec::with_capacity(3);
    if outcome == MergeOutcome::Clean {
        choices.push(ConflictResolutionChoice::MergeAndCommit);
    }
    choices.push(ConflictResolutionChoice::CommitOnNewBranch);
    choices.push(ConflictResolutionChoice::Overwrite);
    choices
}

/// Identifies one suspended commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResumeToken(Uuid);

impl ResumeToken {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Pull request to open once a commit lands on a fork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestDraft {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkDecision {
    /// Branch to create on the fork; deconflicted against the fork's branches.
    pub destination_branch: String,
    pub pull_request: Option<PullRequestDraft>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    Conflict {
        descriptor: ConflictDescriptor,
        legal: Vec<ConflictResolutionChoice>,
        /// The conflicting attempt targets a fork.
        on_fork: bool,
    },
    ForkConfirmation {
        repository: String,
        proposed_branch: String,
        pull_request: PullRequestDraft,
    },
}

/// Answer to a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeInput {
    Conflict {
        choice: ConflictResolutionChoice,
        /// Name for [`ConflictResolutionChoice::CommitOnNewBranch`]; generated when `None`.
        branch_name: Option<String>,
    },
    Fork(ForkDecision),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogButton {
    pub key: String,
    pub caption: String,
}

/// What the UI layer renders. The body is markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogRequest {
    pub title: String,
    pub body: String,
    pub buttons: Vec<DialogButton>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub token: ResumeToken,
    pub kind: PromptKind,
}

impl Prompt {
    pub fn dialog(&self) -> DialogRequest {
        match &self.kind {
            PromptKind::Conflict {
                descriptor,
                legal,
                on_fork,
            } => {
                let mut buttons: Vec<DialogButton> = legal
                    .iter()
                    .map(|choice| button(choice.key(), choice.caption()))
                    .collect();
                buttons.push(button(CANCEL, "Cancel"));
                DialogRequest {
                    title: "The file was changed on the remote".to_string(),
                    body: conflict_body(descriptor, *on_fork),
                    buttons,
                }
            }
            PromptKind::ForkConfirmation {
                repository,
                proposed_branch,
                ..
            } => DialogRequest {
                title: "No write access".to_string(),
                body: formatdoc! {"
                    You cannot commit to **{repository}**.

                    Fork it and commit on branch `{proposed_branch}` of your fork instead?
                "},
                buttons: vec![
                    button(FORK_WITH_PULL_REQUEST, "Fork and open a pull request"),
                    button(FORK_ONLY, "Fork only"),
                    button(CANCEL, "Cancel"),
                ],
            },
        }
    }

    /// Turn a dialog key into resume input. `Ok(None)` means the user cancelled.
    pub fn interpret(&self, key: &str) -> Result<Option<ResumeInput>> {
        if key == CANCEL {
            return Ok(None);
        }
        match &self.kind {
            PromptKind::Conflict { .. } => {
                let choice = ConflictResolutionChoice::from_key(key)
                    .filter(|choice| self.allows(*choice))
                    .ok_or_else(|| CommitError::IllegalChoice(key.to_string()))?;
                Ok(Some(ResumeInput::Conflict {
                    choice,
                    branch_name: None,
                }))
            }
            PromptKind::ForkConfirmation {
                proposed_branch,
                pull_request,
                ..
            } => {
                let pull_request = match key {
                    FORK_WITH_PULL_REQUEST => Some(pull_request.clone()),
                    FORK_ONLY => None,
                    other => return Err(CommitError::IllegalChoice(other.to_string())),
                };
                Ok(Some(ResumeInput::Fork(ForkDecision {
                    destination_branch: proposed_branch.clone(),
                    pull_request,
                })))
            }
        }
    }

    /// Whether `choice` may be used to resume this prompt.
    pub fn allows(&self, choice: ConflictResolutionChoice) -> bool {
        matches!(&self.kind, PromptKind::Conflict { legal, .. } if legal.contains(&choice))
    }
}

fn button(key: &str, caption: &str) -> DialogButton {
    DialogButton {
        key: key.to_string(),
        caption: caption.to_string(),
    }
}

fn conflict_body(descriptor: &ConflictDescriptor, on_fork: bool) -> String {
    let summary = match descriptor.outcome {
        MergeOutcome::Clean => "Your changes merge cleanly with the remote changes.",
        MergeOutcome::WithConflicts => "Your changes conflict with the remote changes.",
        MergeOutcome::Failed => "The merge service could not merge your changes.",
        MergeOutcome::Identical => "The remote content matches yours.",
    };
    let mut body = summary.to_string();
    if on_fork {
        body.push_str(" This happened on your fork.");
    }
    if let Some(url) = &descriptor.diff.url {
        body.push_str(&format!("\n\n[Review the changes]({url})"));
    }
    for file in &descriptor.diff.files {
        body.push_str(&format!("\n* `{}` ({})", file.filename, file.status));
    }
    body
}
