use clap::Subcommand;

use crate::shared::config::{config_search_dir, find_config_file, generate_schema};

/// Configuration management commands.
#[derive(Subcommand, Clone, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Print JSON Schema for the configuration file
    Schema,

    /// Print the config file in effect, or where one would be read from
    Path,
}

impl ConfigCommands {
    pub fn run(&self) -> anyhow::Result<()> {
        match self {
            Self::Schema => {
                let json = serde_json::to_string_pretty(&generate_schema())?;
                println!("{json}");
            }
            Self::Path => {
                let Some(dir) = config_search_dir() else {
                    anyhow::bail!("Could not determine the config directory");
                };
                match find_config_file(&dir) {
                    Some(path) => println!("{}", path.display()),
                    None => println!("{} (not found)", dir.join("config.yaml").display()),
                }
            }
        }
        Ok(())
    }
}
