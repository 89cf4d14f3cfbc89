// SPDX-FileCopyrightText: 2026 Sokoni Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sokoni - conversational commerce backend over WhatsApp.
//!
//! This is the binary entry point.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod serve;

/// Sokoni - conversational commerce backend over WhatsApp.
#[derive(Parser, Debug)]
#[command(name = "sokoni", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the XDG hierarchy.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook server and the abandoned-cart scanner.
    Serve,
    /// Print the resolved configuration.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<sokoni_config::SokoniConfig, Vec<sokoni_config::ConfigError>> {
    match path {
        Some(path) => match sokoni_config::load_config_from_path(path) {
            Ok(config) => {
                sokoni_config::validation::validate_config(&config)?;
                Ok(config)
            }
            Err(err) => Err(sokoni_config::diagnostic::figment_to_config_errors(err)),
        },
        None => sokoni_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(errors) => {
            sokoni_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => match toml::to_string_pretty(&config) {
            Ok(rendered) => println!("{rendered}"),
            Err(e) => {
                eprintln!("error: failed to render config: {e}");
                std::process::exit(1);
            }
        },
        None => {
            println!("sokoni: use --help for available commands");
        }
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn binary_loads_config_defaults() {
        // Verify config loads with defaults (no config file needed).
        let config = sokoni_config::load_and_validate().expect("default config should be valid");
        assert_eq!(config.agent.name, "sokoni");
    }
}
