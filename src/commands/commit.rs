use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use termimad::MadSkin;

use super::backend::build_client;
use crate::commit::merge::MergeService;
use crate::commit::message;
use crate::commit::prompt::ConflictResolutionChoice;
use crate::commit::{
    BranchNamingPolicy, CommitError, CommitReport, CommitRequest, CommitSession, CommitStep,
    DialogRequest, HttpMergeService, MergeCoordinator, NextAction, PullRequestOutcome,
    ResumeInput,
};
use crate::infra::remote::RepositoryClient;
use crate::shared::config::Config;
use crate::shared::session_store::SessionStore;

#[derive(Args, Clone, PartialEq, Eq)]
pub struct CommitArgs {
    /// Local copy created by `cf open`
    pub file: PathBuf,

    /// Commit message (default: commit.default_message from config)
    #[arg(short, long, default_value = "")]
    pub message: String,

    /// Branch to commit to (default: the document's current branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// User to notify, prefixed to the message as @user
    #[arg(long)]
    pub notify: Option<String>,

    /// Issue number, prefixed to the message as #N
    #[arg(long)]
    pub issue: Option<u64>,

    /// Open the pull request (or the commit) in the browser afterwards
    #[arg(long)]
    pub open: bool,
}

/// Where choice points are shown to the user.
pub trait Dialog {
    /// Show the request; `None` means the dialog was closed.
    fn choose(&mut self, request: &DialogRequest) -> anyhow::Result<Option<String>>;

    /// Ask for free text. Empty input keeps `default`.
    fn ask_text(&mut self, question: &str, default: &str) -> anyhow::Result<String>;
}

/// Dialog on the terminal: markdown body, numbered buttons, empty input closes.
pub struct TerminalDialog<R, W> {
    input: R,
    output: W,
    skin: MadSkin,
}

impl TerminalDialog<io::StdinLock<'static>, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalDialog<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            skin: MadSkin::default_dark(),
        }
    }

    fn read_line(&mut self) -> anyhow::Result<String> {
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Dialog for TerminalDialog<R, W> {
    fn choose(&mut self, request: &DialogRequest) -> anyhow::Result<Option<String>> {
        let text = format!("# {}\n\n{}\n", request.title, request.body);
        writeln!(self.output, "{}", self.skin.term_text(&text))?;
        for (index, button) in request.buttons.iter().enumerate() {
            writeln!(self.output, "  {}) {}", index + 1, button.caption)?;
        }

        loop {
            write!(
                self.output,
                "Choose [1-{}], empty to close: ",
                request.buttons.len()
            )?;
            self.output.flush()?;

            let answer = self.read_line()?;
            if answer.is_empty() {
                return Ok(None);
            }
            let picked = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| request.buttons.get(i));
            match picked {
                Some(button) => return Ok(Some(button.key.clone())),
                None => writeln!(self.output, "Not a choice: {answer}")?,
            }
        }
    }

    fn ask_text(&mut self, question: &str, default: &str) -> anyhow::Result<String> {
        if default.is_empty() {
            write!(self.output, "{question}: ")?;
        } else {
            write!(self.output, "{question} [{default}]: ")?;
        }
        self.output.flush()?;

        let answer = self.read_line()?;
        Ok(if answer.is_empty() {
            default.to_string()
        } else {
            answer
        })
    }
}

#[tokio::main]
pub async fn run(args: &CommitArgs, config: &Config) -> anyhow::Result<()> {
    let store = SessionStore::open_default()?;
    let client = build_client(config)?;
    let merge = Arc::new(HttpMergeService::new(&config.merge.service_url)?);
    let mut dialog = TerminalDialog::stdio();

    match commit_file(args, config, client, merge, &store, &mut dialog).await {
        Ok(Some(report)) => {
            print_report(&report);
            if args.open
                && let Some(url) = browser_url(&report)
            {
                let _ = open::that(url);
            }
            Ok(())
        }
        Ok(None) => {
            eprintln!("Commit cancelled.");
            Ok(())
        }
        Err(err) => {
            if let Some(commit_err) = err.downcast_ref::<CommitError>() {
                eprintln!("{}", hint(commit_err.next_action()));
            }
            Err(err)
        }
    }
}

/// Commit the local copy and store the session it ends in.
/// Returns `None` when the user closed a dialog.
pub async fn commit_file(
    args: &CommitArgs,
    config: &Config,
    client: Arc<dyn RepositoryClient>,
    merge: Arc<dyn MergeService>,
    store: &SessionStore,
    dialog: &mut dyn Dialog,
) -> anyhow::Result<Option<CommitReport>> {
    let record = store.load(&args.file)?;
    let content = std::fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let branch = args
        .branch
        .clone()
        .unwrap_or_else(|| record.state.current().branch.clone());
    let message = message::compose(
        &args.message,
        &config.commit.default_message,
        args.notify.as_deref(),
        args.issue,
    );

    let mut session = CommitSession::new(
        client,
        MergeCoordinator::new(merge, config.merge.auto_commit_clean),
        BranchNamingPolicy::new(&config.naming.label),
        record.state,
    )
    .with_pull_request_title(&config.commit.pull_request_title);

    let request = CommitRequest {
        branch,
        message,
        content,
    };
    let report = drive(&mut session, request, dialog).await?;
    if report.is_some() {
        store.save(&args.file, session.state())?;
    }
    Ok(report)
}

/// Run one commit attempt, answering every choice point through `dialog`.
pub async fn drive(
    session: &mut CommitSession,
    request: CommitRequest,
    dialog: &mut dyn Dialog,
) -> anyhow::Result<Option<CommitReport>> {
    let mut step = session.commit(request).await?;
    loop {
        let prompt = match step {
            CommitStep::Committed(report) => return Ok(Some(report)),
            CommitStep::AwaitingChoice(prompt) => prompt,
        };

        let input = match dialog.choose(&prompt.dialog())? {
            Some(key) => prompt.interpret(&key)?,
            None => None,
        };
        let Some(input) = input else {
            session.abort(prompt.token)?;
            return Ok(None);
        };

        let input = complete_input(input, dialog)?;
        step = session.resume(prompt.token, input).await?;
    }
}

/// Ask for the free-text parts of an answer.
fn complete_input(input: ResumeInput, dialog: &mut dyn Dialog) -> anyhow::Result<ResumeInput> {
    match input {
        ResumeInput::Conflict {
            choice: ConflictResolutionChoice::CommitOnNewBranch,
            ..
        } => {
            let name = dialog.ask_text("New branch name (empty for a generated one)", "")?;
            Ok(ResumeInput::Conflict {
                choice: ConflictResolutionChoice::CommitOnNewBranch,
                branch_name: Some(name).filter(|n| !n.is_empty()),
            })
        }
        ResumeInput::Fork(mut decision) => {
            decision.destination_branch =
                dialog.ask_text("Branch on your fork", &decision.destination_branch)?;
            if let Some(draft) = decision.pull_request.as_mut() {
                draft.title = dialog.ask_text("Pull request title", &draft.title)?;
            }
            Ok(ResumeInput::Fork(decision))
        }
        other => Ok(other),
    }
}

fn print_report(report: &CommitReport) {
    let short: String = report.commit.commit_sha.chars().take(7).collect();
    println!(
        "Committed to {}@{} ({short})",
        report.repository.full_name(),
        report.branch
    );
    if let Some(url) = &report.commit.html_url {
        println!("  {url}");
    }
    if report.merged {
        println!("Merged with the remote changes.");
    }
    if let Some(fork) = &report.fork {
        println!(
            "Forked {} to {}",
            fork.source_repository.full_name(),
            fork.fork.full_name()
        );
    }
    match &report.pull_request {
        Some(PullRequestOutcome::Opened { url }) => println!("Pull request: {url}"),
        Some(PullRequestOutcome::Failed { reason }) => {
            eprintln!("Warning: the pull request could not be opened: {reason}");
        }
        None => {}
    }
    if let Some(locator) = &report.reopen_locator {
        println!("The document moved. Reopen it with:\n  {locator}");
    }
}

fn browser_url(report: &CommitReport) -> Option<&str> {
    match &report.pull_request {
        Some(PullRequestOutcome::Opened { url }) => Some(url),
        _ => report.commit.html_url.as_deref(),
    }
}

fn hint(action: NextAction) -> &'static str {
    match action {
        NextAction::Retry => "Try the commit again.",
        NextAction::Fork => "You cannot write to this repository; commit again to fork it.",
        NextAction::SwitchUser => "Sign in as a user with write access (`gh auth login`).",
        NextAction::NewBranch => "Pick a different branch name with --branch.",
        NextAction::Cancel => "Nothing was committed.",
    }
}
