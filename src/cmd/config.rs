//! Configuration view and validation commands — `atelier config`.

use std::path::Path;

use anyhow::{Context, Result};

use atelier::config::AtelierConfig;

use crate::ConfigCommands;

pub fn cmd_config(config_path: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
                let config = AtelierConfig::load(config_path)?;
                print_config(&config)?;
            } else {
                println!("No config file found at {}", config_path.display());
                println!("Using default configuration:");
                print_config(&AtelierConfig::default())?;
                println!("Run 'atelier config init' to create one.");
            }
        }
        Some(ConfigCommands::Validate) => {
            let config = AtelierConfig::load(config_path)
                .with_context(|| format!("failed to load {}", config_path.display()))?;
            config.validate()?;
            println!("{} is valid", config_path.display());
        }
        Some(ConfigCommands::Init) => {
            if config_path.exists() {
                anyhow::bail!("{} already exists", config_path.display());
            }
            let rendered = toml::to_string_pretty(&AtelierConfig::default())
                .context("failed to render default configuration")?;
            std::fs::write(config_path, rendered)
                .with_context(|| format!("failed to write {}", config_path.display()))?;
            println!("Created {}", config_path.display());
        }
    }
    Ok(())
}

fn print_config(config: &AtelierConfig) -> Result<()> {
    let rendered =
        toml::to_string_pretty(config).context("failed to render configuration")?;
    println!();
    println!("{rendered}");
    Ok(())
}
