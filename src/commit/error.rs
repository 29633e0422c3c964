use thiserror::Error;

use super::naming::NamingError;
use crate::infra::remote::RemoteError;

/// What the user can do after a failed commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Try the same commit again.
    Retry,
    /// Commit on a fork of the repository.
    Fork,
    /// Sign in as a user with write access.
    SwitchUser,
    /// Pick a different branch name.
    NewBranch,
    /// Give up on this commit.
    Cancel,
}

#[derive(Error, Debug)]
pub enum CommitError {
    #[error(transparent)]
    Remote(RemoteError),

    #[error("No free branch name after '{0}'")]
    NamingExhausted(String),

    #[error(transparent)]
    InvalidBranchName(NamingError),

    #[error("A commit is already waiting for a decision")]
    Busy,

    #[error("No pending commit matches this resume token")]
    UnknownToken,

    #[error("'{0}' is not a valid answer to this prompt")]
    IllegalChoice(String),

    #[error("Could not fork {repository}: {source}")]
    ForkFailed {
        repository: String,
        source: RemoteError,
    },

    #[error("No write access to {0}, and forking is not available")]
    NoWriteAccess(String),
}

impl From<RemoteError> for CommitError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NamingExhausted(name) => Self::NamingExhausted(name),
            other => Self::Remote(other),
        }
    }
}

impl From<NamingError> for CommitError {
    fn from(err: NamingError) -> Self {
        match err {
            NamingError::Exhausted(name) => Self::NamingExhausted(name),
            invalid @ NamingError::Invalid { .. } => Self::InvalidBranchName(invalid),
        }
    }
}

impl CommitError {
    pub fn next_action(&self) -> NextAction {
        match self {
            Self::Remote(RemoteError::Auth(_)) => NextAction::SwitchUser,
            Self::Remote(RemoteError::NotAccessible(_)) => NextAction::Fork,
            Self::Remote(RemoteError::NotFound(_)) => NextAction::Cancel,
            Self::Remote(_) => NextAction::Retry,
            Self::NamingExhausted(_) | Self::InvalidBranchName(_) => NextAction::NewBranch,
            Self::Busy | Self::IllegalChoice(_) | Self::ForkFailed { .. } => NextAction::Cancel,
            Self::UnknownToken => NextAction::Retry,
            Self::NoWriteAccess(_) => NextAction::SwitchUser,
        }
    }
}

pub type Result<T> = std::result::Result<T, CommitError>;
