//! Resolve command implementation

use crate::cli::utils;
use crate::SequencifyError;
use anyhow::{anyhow, Result};
use clap::{ArgMatches, Command};
use serde_json::json;

pub fn command() -> Command {
    Command::new("resolve")
        .about("Print the resolved plugin order and load units")
        .arg(utils::config_arg())
        .arg(utils::env_arg())
        .arg(
            clap::Arg::new("json")
                .long("json")
                .help("Print machine-readable JSON")
                .action(clap::ArgAction::SetTrue),
        )
}

pub async fn run(matches: &ArgMatches) -> Result<()> {
    let config = utils::load_config(matches)?;
    let mut app = utils::create_app(config, matches)?;

    let plugins = match app.load_plugins().await {
        Ok(plugins) => plugins,
        Err(err) => {
            return match err.downcast_ref::<SequencifyError>() {
                Some(resolution) => {
                    super::validate::print_resolution_error(resolution);
                    Err(anyhow!("Plugin dependency resolution failed"))
                }
                None => Err(err),
            };
        }
    };
    let units = app.load_units();

    if matches.get_flag("json") {
        let output = json!({
            "server_env": app.server_env(),
            "plugins": plugins,
            "units": units,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Server env: {}", app.server_env());
    println!("Plugin order:");
    for (index, plugin) in plugins.iter().enumerate() {
        if plugin.implicit_enable {
            println!(
                "  {}. {} (implicit, required by {})",
                index + 1,
                plugin.name(),
                plugin.dependents.join(", ")
            );
        } else {
            println!("  {}. {}", index + 1, plugin.name());
        }
    }

    println!("Load units:");
    for unit in &units {
        match &unit.path {
            Some(path) => println!("  [{}] {} ({})", unit.kind, unit.name, path.display()),
            None => println!("  [{}] {}", unit.kind, unit.name),
        }
    }

    Ok(())
}
