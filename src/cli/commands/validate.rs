//! Validate command implementation

use crate::cli::utils;
use crate::SequencifyError;
use anyhow::{anyhow, Result};
use clap::{ArgMatches, Command};
use tracing::info;

pub fn command() -> Command {
    Command::new("validate")
        .about("Validate configuration file and plugin dependencies")
        .arg(utils::config_arg())
        .arg(utils::env_arg())
}

pub async fn run(matches: &ArgMatches) -> Result<()> {
    info!("Validating configuration file");

    let config = utils::load_config(matches)?;
    let mut app = utils::create_app(config, matches)?;

    match app.load_plugins().await {
        Ok(plugins) => {
            println!("Configuration is valid!");
            println!("Application: {}", app.config().name);
            println!("Server env: {}", app.server_env());
            println!("Frameworks: {}", app.config().frameworks.len());
            println!("Enabled plugins: {}", plugins.len());
            Ok(())
        }
        Err(err) => match err.downcast_ref::<SequencifyError>() {
            Some(resolution) => {
                print_resolution_error(resolution);
                Err(anyhow!("Plugin dependency resolution failed"))
            }
            None => Err(err),
        },
    }
}

/// Print every missing and cyclic dependency
pub fn print_resolution_error(err: &SequencifyError) {
    println!("Plugin dependencies are invalid:");
    for missing in &err.missing {
        println!(
            "  - {} is disabled or missing, required by [{}]",
            missing.name,
            missing.required_by.join(", ")
        );
    }
    for cycle in &err.cycles {
        println!("  - dependency cycle: {}", cycle.join(" -> "));
    }
}
