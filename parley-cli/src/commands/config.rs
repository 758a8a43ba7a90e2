//! Config subcommands for parley CLI

use anyhow::Result;
use clap::{Args, Subcommand};
use parley_core::config::{API_URL_ENV, ENDPOINT_ENV, env_value};

use crate::config::{ConfigLoader, ParleyConfig};

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration (user + project + environment)
    Show {
        /// Print as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },
    /// Show configuration and credential file paths
    Path,
}

pub fn run(args: ConfigArgs) -> Result<()> {
    match args.command {
        ConfigCommands::Show { json } => {
            let config = ConfigLoader::load()?;
            println!("{}", render(&config, json)?);
            Ok(())
        }
        ConfigCommands::Path => {
            show_paths();
            Ok(())
        }
    }
}

fn render(config: &ParleyConfig, json: bool) -> Result<String> {
    Ok(if json {
        serde_json::to_string_pretty(config)?
    } else {
        toml::to_string_pretty(config)?
    })
}

fn show_paths() {
    println!("User config:    {}", ConfigLoader::user_config_path().display());
    println!("Project config: {}", ConfigLoader::project_config_path().display());
    println!("Credentials:    {}", parley_paths::credentials_file().display());
    for name in [ENDPOINT_ENV, API_URL_ENV] {
        if let Some(value) = env_value(name) {
            println!("{name} = {value}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_defaults_as_toml() {
        let rendered = render(&ParleyConfig::default(), false).unwrap();
        assert!(rendered.contains("[server]"));
        assert!(rendered.contains("endpoint = \"http://localhost:3001\""));
        assert!(rendered.contains("[reconnect]"));
        assert!(rendered.contains("max_attempts = 5"));
    }

    #[test]
    fn test_render_json() {
        let rendered = render(&ParleyConfig::default(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(value["server"]["endpoint"], "http://localhost:3001");
        assert_eq!(value["reconnect"]["delay"], "1s");
    }
}
