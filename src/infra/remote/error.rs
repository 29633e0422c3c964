//! Repository backend error types.

use thiserror::Error;

/// A merge the backend already computed while rejecting a commit.
///
/// The gateway backend merges server-side and answers a stale commit with
/// the merge result instead of a bare conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMerge {
    /// Raw result tag (`CLEAN`, `IDENTICAL`, `WITH_CONFLICTS`).
    pub result_type: String,
    pub merged: String,
    /// Blob sha of the remote file the merge was computed against.
    pub latest_sha: String,
}

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication required: {0}")]
    Auth(String),

    #[error("No write access: {0}")]
    NotAccessible(String),

    #[error("The file was changed on the remote since it was opened")]
    Conflict(Option<ServerMerge>),

    #[error("No free branch name after '{0}'")]
    NamingExhausted(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("Remote API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Unexpected response: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;
