use clap::{Parser, Subcommand};
use clap_complete::Shell;

use crate::commands::commit::CommitArgs;
use crate::commands::config::ConfigCommands;
use crate::commands::diff::DiffArgs;
use crate::commands::open::OpenArgs;

#[derive(Parser)]
#[command(
    name = "commitflow",
    bin_name = "cf",
    version,
    about,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Fetch a document and start a session for it
    Open(OpenArgs),

    /// Commit a local copy back to its repository
    Commit(CommitArgs),

    /// Show the changes a commit would make
    Diff(DiffArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}
