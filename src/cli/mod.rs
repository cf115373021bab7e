//! CLI command implementations

use anyhow::Result;
use clap::{ArgMatches, Command};

pub mod commands;

/// Main CLI application
pub struct CliApp;

impl CliApp {
    /// Create the CLI application
    pub fn app() -> Command {
        Command::new("liftoff")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Resolve plugin dependencies and inspect application boot order")
            .subcommand_negates_reqs(true)
            .subcommand(commands::init::command())
            .subcommand(commands::validate::command())
            .subcommand(commands::resolve::command())
            .subcommand(commands::plugins::command())
    }

    /// Run the CLI application
    pub async fn run(matches: &ArgMatches) -> Result<()> {
        match matches.subcommand() {
            Some(("init", sub_matches)) => commands::init::run(sub_matches).await,
            Some(("validate", sub_matches)) => commands::validate::run(sub_matches).await,
            Some(("resolve", sub_matches)) => commands::resolve::run(sub_matches).await,
            Some(("plugins", sub_matches)) => commands::plugins::run(sub_matches).await,
            _ => {
                // No subcommand provided, show help
                let _ = Self::app().print_help();
                Ok(())
            }
        }
    }
}

/// Common CLI utilities
pub mod utils {
    use anyhow::{anyhow, Result};
    use clap::{Arg, ArgMatches};
    use std::path::PathBuf;

    use crate::{AppOptions, Application, Config};

    /// `--config` argument shared by every command that reads a config
    pub fn config_arg() -> Arg {
        Arg::new("config")
            .short('c')
            .long("config")
            .help("Configuration file path")
            .value_name("FILE")
    }

    /// `--env` argument overriding the server environment
    pub fn env_arg() -> Arg {
        Arg::new("env")
            .short('e')
            .long("env")
            .help("Server environment (defaults to LIFTOFF_SERVER_ENV, config, LIFTOFF_ENV, local)")
            .value_name("ENV")
    }

    /// Get configuration file path from arguments or use default
    pub fn get_config_path(matches: &ArgMatches) -> Result<PathBuf> {
        if let Some(config_path) = matches.get_one::<String>("config") {
            return Ok(PathBuf::from(config_path));
        }

        let base = std::env::current_dir()?;
        crate::utils::default_config_paths(&base)
            .into_iter()
            .find(|path| path.exists())
            .ok_or_else(|| {
                anyhow!("No configuration file found. Use --config to specify a file or create one with 'liftoff init'")
            })
    }

    /// Load configuration from file
    pub fn load_config(matches: &ArgMatches) -> Result<Config> {
        let config_path = get_config_path(matches)?;
        Config::from_file(&config_path)
    }

    /// Create an application, honouring `--env` when the command has it
    pub fn create_app(config: Config, matches: &ArgMatches) -> Result<Application> {
        let server_env = matches
            .try_get_one::<String>("env")
            .ok()
            .flatten()
            .cloned();
        Application::new(
            config,
            AppOptions {
                server_env,
                ..AppOptions::default()
            },
        )
    }
}
