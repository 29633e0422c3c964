//! Session state owned by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::infra::locator::{FileLocation, RepositoryRef};

/// Last committed state of the document as this session knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentBaseline {
    pub blob_sha: String,
    pub commit_sha: String,
    pub content: String,
}

/// A branch on a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub repository: RepositoryRef,
    pub branch: String,
}

/// Where the document came from, where it is now, and what was last committed.
///
/// `current` and `baseline` only ever change together, through [`SessionState::finalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    origin: FileLocation,
    current: Position,
    previous: Option<Position>,
    baseline: DocumentBaseline,
}

impl SessionState {
    pub fn new(origin: FileLocation, baseline: DocumentBaseline) -> Self {
        let current = Position {
            repository: origin.repository.clone(),
            branch: origin.branch.clone(),
        };
        Self {
            origin,
            current,
            previous: None,
            baseline,
        }
    }

    pub fn origin(&self) -> &FileLocation {
        &self.origin
    }

    pub fn current(&self) -> &Position {
        &self.current
    }

    /// Position held before the session moved to another repository.
    pub fn previous(&self) -> Option<&Position> {
        self.previous.as_ref()
    }

    pub fn baseline(&self) -> &DocumentBaseline {
        &self.baseline
    }

    pub fn path(&self) -> &str {
        &self.origin.path
    }

    /// The document's file at its current position.
    pub fn location(&self) -> FileLocation {
        self.origin
            .relocated(&self.current.repository, &self.current.branch)
    }

    /// Record a commit that landed at `landed`.
    ///
    /// Moving to another repository keeps the position being left as
    /// `previous`; moving between branches of one repository does not.
    pub fn finalize(&mut self, landed: Position, baseline: DocumentBaseline) {
        if landed.repository != self.current.repository {
            self.previous = Some(std::mem::replace(&mut self.current, landed));
        } else {
            self.current = landed;
        }
        self.baseline = baseline;
    }
}

/// One commit attempt. Discarded once the attempt finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitContext {
    pub repository: RepositoryRef,
    pub target_branch: String,
    pub message: String,
    pub content: String,
    /// The target branch existed before this attempt started.
    pub branch_existed_before: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(
            FileLocation {
                repository: RepositoryRef::github("acme", "docs"),
                branch: "main".into(),
                path: "a.xml".into(),
            },
            DocumentBaseline {
                blob_sha: "S1".into(),
                commit_sha: "C1".into(),
                content: "old".into(),
            },
        )
    }

    fn baseline(sha: &str) -> DocumentBaseline {
        DocumentBaseline {
            blob_sha: sha.into(),
            commit_sha: format!("commit-{sha}"),
            content: "new".into(),
        }
    }

    #[test]
    fn finalize_on_same_repository_keeps_previous_empty() {
        let mut state = state();

        state.finalize(
            Position {
                repository: RepositoryRef::github("acme", "docs"),
                branch: "topic".into(),
            },
            baseline("S2"),
        );

        assert_eq!(state.current().branch, "topic");
        assert_eq!(state.baseline().blob_sha, "S2");
        assert!(state.previous().is_none());
        assert_eq!(state.location().branch, "topic");
        assert_eq!(state.origin().branch, "main");
    }

    #[test]
    fn finalize_on_fork_remembers_where_it_came_from() {
        let mut state = state();
        let fork = RepositoryRef::github("me", "docs");

        state.finalize(
            Position {
                repository: fork.clone(),
                branch: "main-1".into(),
            },
            baseline("S3"),
        );

        assert_eq!(state.current().repository, fork);
        let previous = state.previous().unwrap();
        assert_eq!(previous.repository, RepositoryRef::github("acme", "docs"));
        assert_eq!(previous.branch, "main");
        assert_eq!(state.location().repository, fork);
    }

    #[test]
    fn state_round_trips_through_json() {
        let state = state();
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(serde_json::from_str::<SessionState>(&json).unwrap(), state);
    }
}
