//! Init command implementation

use crate::{Config, FrameworkConfig, PluginSpec};
use anyhow::{anyhow, Result};
use clap::{ArgMatches, Command};
use std::path::PathBuf;
use tracing::info;

pub fn command() -> Command {
    Command::new("init")
        .about("Initialize a new configuration file")
        .arg(
            clap::Arg::new("path")
                .short('p')
                .long("path")
                .help("Output file path")
                .value_name("FILE")
                .default_value("liftoff.yaml"),
        )
        .arg(
            clap::Arg::new("force")
                .short('f')
                .long("force")
                .help("Overwrite an existing file")
                .action(clap::ArgAction::SetTrue),
        )
}

pub async fn run(matches: &ArgMatches) -> Result<()> {
    let output_path = matches
        .get_one::<String>("path")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("liftoff.yaml"));
    let force = matches.get_flag("force");

    if output_path.exists() && !force {
        return Err(anyhow!(
            "{:?} already exists, use --force to overwrite it",
            output_path
        ));
    }

    info!("Initializing configuration file: {:?}", output_path);

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::utils::ensure_directory(parent)?;
    }
    create_example_config().save_to_file(&output_path)?;

    info!("Configuration file created: {:?}", output_path);
    println!("Example configuration created at {}.", output_path.display());
    println!("Run 'liftoff resolve' to see the plugin boot order.");

    Ok(())
}

/// Sample configuration: one framework layer and a small plugin chain
pub fn create_example_config() -> Config {
    let mut framework = FrameworkConfig::new("web");
    framework.plugins.insert(
        "session",
        PluginSpec {
            package: Some("liftoff-session".to_string()),
            ..PluginSpec::default()
        },
    );
    framework.plugins.insert(
        "cache",
        PluginSpec {
            package: Some("liftoff-cache".to_string()),
            dependencies: Some(vec!["session".to_string()]),
            ..PluginSpec::default()
        },
    );
    framework.plugins.insert(
        "devtools",
        PluginSpec {
            path: Some(PathBuf::from("./plugins/devtools")),
            env: Some(vec!["local".to_string(), "unittest".to_string()]),
            ..PluginSpec::default()
        },
    );

    let mut config = Config {
        name: "example".to_string(),
        ..Config::default()
    };
    config.frameworks.push(framework);
    config.plugins.insert(
        "api",
        PluginSpec {
            path: Some(PathBuf::from("./plugins/api")),
            dependencies: Some(vec!["cache".to_string()]),
            optional_dependencies: Some(vec!["devtools".to_string()]),
            ..PluginSpec::default()
        },
    );
    config
}
