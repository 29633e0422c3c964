//! The commit protocol: fast-forward, three-way merge, branch creation and
//! fork escalation, driven by [`CommitSession`].

pub mod error;
pub mod merge;
pub mod message;
pub mod naming;
pub mod prompt;
pub mod session;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;


pub use error::{CommitError, NextAction};
pub use merge::{HttpMergeService, MergeCoordinator};
pub use naming::BranchNamingPolicy;
pub use prompt::{DialogRequest, ResumeInput};
pub use session::{
    CommitReport, CommitRequest, CommitSession, CommitStep, PullRequestOutcome, open_document,
};
pub use state::SessionState;
