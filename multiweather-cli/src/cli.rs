use std::{path::PathBuf, sync::Arc, time::Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use inquire::{Confirm, Text};
use multiweather_core::{Aggregator, Config, ProviderConfig, ProviderId};

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "multiweather",
    version,
    about = "Average the current temperature reported by several weather services"
)]
pub struct Cli {
    /// Config file; defaults to the platform config directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve `GET /weather/{city}`.
    Serve {
        /// Overrides `[server] port` from the config file.
        #[arg(long)]
        port: Option<u16>,
    },

    /// Query every configured provider once and print the mean.
    Show {
        /// City name, passed verbatim to the providers.
        city: String,
    },

    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweathermap" or "forecast".
        provider: String,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Serve { port } => {
                let config = Config::load(self.config.as_deref())?;
                let aggregator = Aggregator::from_config(&config)?;
                let port = port.unwrap_or(config.server.port);

                server::serve(Arc::new(aggregator), port).await?;
            }
            Command::Show { city } => {
                let config = Config::load(self.config.as_deref())?;
                let aggregator = Aggregator::from_config(&config)?;

                let begin = Instant::now();
                let temp = aggregator.temperature(&city).await?;

                println!("{city}: {temp:.2} °C (took {:?})", begin.elapsed());
            }
            Command::Configure { provider } => {
                let id = ProviderId::try_from(provider.as_str())?;
                let path = match self.config {
                    Some(path) => path,
                    None => Config::config_file_path()?,
                };

                let mut config = Config::load_from(&path)?;
                let entry = prompt_provider(id, config.provider_config(id))?;
                config.upsert_provider(id, entry);
                config.save_to(&path)?;

                println!("Saved {id} configuration to {}", path.display());
            }
        }

        Ok(())
    }
}

fn prompt_provider(
    id: ProviderId,
    existing: Option<&ProviderConfig>,
) -> anyhow::Result<ProviderConfig> {
    let current = existing.cloned().unwrap_or_default();

    let message = format!("API key for {id}:");
    let mut key_prompt = Text::new(&message);
    if let Some(key) = current.api_key.as_deref() {
        key_prompt = key_prompt.with_default(key);
    }
    if !id.requires_api_key() {
        key_prompt = key_prompt.with_help_message("optional, press Enter to skip");
    }

    let api_key = key_prompt
        .prompt_skippable()
        .context("Failed to read API key")?
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty());

    if id.requires_api_key() && api_key.is_none() {
        anyhow::bail!("Provider '{id}' requires an API key");
    }

    let requires_coords = if id.always_needs_coords() {
        true
    } else {
        Confirm::new("Resolve the city to coordinates before querying?")
            .with_default(current.requires_coords)
            .prompt()
            .context("Failed to read answer")?
    };

    Ok(ProviderConfig {
        api_key,
        requires_coords,
        base_url: current.base_url,
    })
}
