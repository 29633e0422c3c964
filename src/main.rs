mod cli;
mod commands;
mod commit;
mod infra;
mod shared;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use shared::config::{LogConfig, load_config};

fn main() -> anyhow::Result<()> {
    let Cli { log_json, command } = Cli::parse();

    // A broken config must not prevent `cf config schema` or completions.
    let config = load_config();
    let default_log = LogConfig::default();
    let log = config.as_ref().map_or(&default_log, |c| &c.log);
    let _guard = shared::logging::init(log, log_json);

    match command {
        Commands::Open(args) => commands::open::run(&args, &config?)?,
        Commands::Commit(args) => commands::commit::run(&args, &config?)?,
        Commands::Diff(args) => commands::diff::run(&args)?,
        Commands::Config(cmd) => cmd.run()?,
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "cf", &mut std::io::stdout());
        }
    }

    Ok(())
}
