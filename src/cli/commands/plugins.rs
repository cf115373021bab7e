//! Plugins command implementation

use crate::cli::utils;
use crate::{PluginDescriptor, PluginLocation};
use anyhow::Result;
use clap::{ArgMatches, Command};

pub fn command() -> Command {
    Command::new("plugins")
        .about("List merged plugin declarations")
        .arg(utils::config_arg())
        .arg(utils::env_arg())
        .arg(
            clap::Arg::new("all")
                .short('a')
                .long("all")
                .help("Include disabled plugins")
                .action(clap::ArgAction::SetTrue),
        )
}

pub async fn run(matches: &ArgMatches) -> Result<()> {
    let config = utils::load_config(matches)?;
    let app = utils::create_app(config, matches)?;
    let show_all = matches.get_flag("all");

    let registry = app.plugin_registry().await;
    println!("Plugins (env: {}):", app.server_env());

    let mut shown = 0;
    for plugin in registry.iter().filter(|p| show_all || p.enable) {
        let status = if registry.is_excluded(plugin.name()) {
            "excluded"
        } else if plugin.enable {
            "enabled"
        } else {
            "disabled"
        };
        println!("  {} [{}] from {}", plugin.name(), status, plugin.from);
        print_details(plugin);
        shown += 1;
    }

    if shown == 0 {
        println!("  (none)");
    }
    Ok(())
}

fn print_details(plugin: &PluginDescriptor) {
    match &plugin.location {
        Some(PluginLocation::Path(path)) => println!("    path: {}", path.display()),
        Some(PluginLocation::Package(package)) => println!("    package: {}", package),
        None => {}
    }
    if !plugin.env.is_empty() {
        println!("    env: {}", plugin.env.join(", "));
    }
    if !plugin.dependencies.is_empty() {
        println!("    dependencies: {}", plugin.dependencies.join(", "));
    }
    if !plugin.optional_dependencies.is_empty() {
        println!(
            "    optional dependencies: {}",
            plugin.optional_dependencies.join(", ")
        );
    }
}
