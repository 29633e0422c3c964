use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use crate::shared::diff::print_diff;
use crate::shared::session_store::SessionStore;

#[derive(Args, Clone, PartialEq, Eq)]
pub struct DiffArgs {
    /// Local copy created by `cf open`
    pub file: PathBuf,
}

/// Show what `cf commit` would commit: the local copy against the last committed version.
pub fn run(args: &DiffArgs) -> anyhow::Result<()> {
    let store = SessionStore::open_default()?;
    let record = store.load(&args.file)?;
    let local = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let location = record.state.location();
    let baseline_label = format!(
        "{}@{}:{}",
        location.repository.full_name(),
        location.branch,
        location.path
    );
    print_diff(
        &record.state.baseline().content,
        &local,
        &baseline_label,
        &args.file.display().to_string(),
    )
}
