//! Config command - manage the settings file

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use ptzcast_core::config::{ConfigFile, sample_config};

use super::with_hint;

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the path to the settings file
    Path,

    /// Show the effective settings
    Show,

    /// Write a commented settings file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print a sample settings file to stdout
    Sample,
}

/// Run config subcommand
pub async fn config(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommand::Path => {
            let path = ConfigFile::default_path();
            let state = if path.exists() { "exists" } else { "does not exist" };
            println!("{} ({})", path.display(), state);
        }
        ConfigCommand::Show => {
            let path = ConfigFile::default_path();
            let config = ConfigFile::load_from(path.clone())?;
            if path.exists() {
                println!("# Loaded from {}\n", path.display());
            } else {
                println!("# No settings file at {}; showing defaults", path.display());
                println!("# Create one with: ptzcast config init\n");
            }
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render settings")?
            );
            println!();
            println!("# State: {}", config.state.dir.display());
        }
        ConfigCommand::Init { force } => {
            let path = ConfigFile::default_path();

            if path.exists() && !force {
                println!("Settings file already exists: {}", path.display());
                println!();
                println!("Use --force to overwrite, or edit the existing file.");
                return Ok(());
            }

            if path.exists() {
                std::fs::remove_file(&path).context("Failed to replace settings file")?;
            }
            ConfigFile::create_default_at(&path).map_err(with_hint)?;

            println!("Created settings file: {}", path.display());
            println!("Restart `ptzcast serve` to pick up changes.");
        }
        ConfigCommand::Sample => {
            print!("{}", sample_config());
        }
    }

    Ok(())
}
