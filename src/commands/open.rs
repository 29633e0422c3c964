use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use super::backend::build_client;
use crate::commit::open_document;
use crate::infra::locator::FileLocation;
use crate::infra::remote::RepositoryClient;
use crate::shared::config::Config;
use crate::shared::session_store::SessionStore;

#[derive(Args, Clone, PartialEq, Eq)]
pub struct OpenArgs {
    /// Document locator (github:// locator or a github.com blob/raw URL)
    pub locator: String,

    /// Where to write the local copy (default: the file's name in the current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[tokio::main]
pub async fn run(args: &OpenArgs, config: &Config) -> anyhow::Result<()> {
    let client = build_client(config)?;
    let store = SessionStore::open_default()?;

    let spinner = spinner("Fetching document...");
    let file = open(client.as_ref(), &store, &args.locator, args.output.as_deref()).await;
    spinner.finish_and_clear();

    println!("{}", file?.display());
    Ok(())
}

/// Fetch the document, write the local copy and record its session.
pub async fn open(
    client: &dyn RepositoryClient,
    store: &SessionStore,
    locator: &str,
    output: Option<&Path>,
) -> anyhow::Result<PathBuf> {
    let location = FileLocation::parse(locator)?;
    let file = match output {
        Some(path) => path.to_path_buf(),
        None => default_output(&location),
    };

    let state = open_document(client, location)
        .await
        .context("Failed to fetch the document")?;
    std::fs::write(&file, &state.baseline().content)
        .with_context(|| format!("Failed to write {}", file.display()))?;
    store.save(&file, &state)?;

    Ok(file)
}

fn default_output(location: &FileLocation) -> PathBuf {
    Path::new(&location.path)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("document"))
}

fn spinner(message: &'static str) -> ProgressBar {
    if !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}
