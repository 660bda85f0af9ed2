use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{aggregator::TimeoutPolicy, provider::ProviderId};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DEADLINE_MS: u64 = 2_000;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 10_000;

/// Configuration for a single provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Resolve the city to coordinates before querying the service.
    #[serde(default)]
    pub requires_coords: bool,

    /// Override of the service's base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Global collection deadline, measured from fan-out.
    pub deadline_ms: u64,
    pub on_timeout: TimeoutPolicy,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
            on_timeout: TimeoutPolicy::default(),
        }
    }
}

impl AggregatorConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeocoderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Transport-level timeout of every outbound request.
    pub http_timeout_ms: u64,

    pub server: ServerConfig,
    pub aggregator: AggregatorConfig,
    pub geocoder: GeocoderConfig,

    /// Example TOML:
    /// [providers.forecast]
    /// api_key = "..."
    /// requires_coords = true
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_timeout_ms: DEFAULT_HTTP_TIMEOUT_MS,
            server: ServerConfig::default(),
            aggregator: AggregatorConfig::default(),
            geocoder: GeocoderConfig::default(),
            providers: HashMap::new(),
        }
    }
}

impl Config {
    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(id.as_str()))
            .map(|(_, cfg)| cfg)
    }

    pub fn is_provider_configured(&self, id: ProviderId) -> bool {
        self.provider_config(id).is_some()
    }

    /// Set or replace the configuration of one provider.
    pub fn upsert_provider(&mut self, id: ProviderId, provider: ProviderConfig) {
        self.providers
            .retain(|name, _| !name.eq_ignore_ascii_case(id.as_str()));
        self.providers.insert(id.as_str().to_string(), provider);
    }

    /// Configured providers in `ProviderId::all()` order.
    ///
    /// Fails on entries that don't name a known provider, so typos in the
    /// file don't silently drop a source, and on sections that name the same
    /// provider in different case.
    pub fn configured_providers(&self) -> Result<Vec<ProviderId>> {
        let mut seen: HashMap<ProviderId, &str> = HashMap::new();

        for name in self.providers.keys() {
            let id = ProviderId::try_from(name.as_str())
                .with_context(|| format!("Invalid [providers.{name}] section"))?;

            if let Some(other) = seen.insert(id, name.as_str()) {
                return Err(anyhow!(
                    "Sections [providers.{other}] and [providers.{name}] both configure '{id}'"
                ));
            }
        }

        Ok(ProviderId::all()
            .iter()
            .copied()
            .filter(|id| self.is_provider_configured(*id))
            .collect())
    }

    /// Load config from `path`, or from the platform default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Self::load_from(&Self::config_file_path()?),
        }
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the default config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "multiweather", "multiweather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_policy() {
        let cfg = Config::default();

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.aggregator.deadline(), Duration::from_secs(2));
        assert_eq!(cfg.aggregator.on_timeout, TimeoutPolicy::Zero);
        assert!(cfg.configured_providers().unwrap().is_empty());
    }

    #[test]
    fn parses_full_file() {
        let cfg = Config::from_toml(
            r#"
            http_timeout_ms = 500

            [server]
            port = 9000

            [aggregator]
            deadline_ms = 750
            on_timeout = "error"

            [geocoder]
            api_key = "GEO"

            [providers.forecast]
            api_key = "F"
            requires_coords = true

            [providers.openweathermap]
            "#,
        )
        .unwrap();

        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.http_timeout_ms, 500);
        assert_eq!(cfg.aggregator.deadline(), Duration::from_millis(750));
        assert_eq!(cfg.aggregator.on_timeout, TimeoutPolicy::Error);
        assert_eq!(cfg.geocoder.api_key.as_deref(), Some("GEO"));

        let forecast = cfg.provider_config(ProviderId::Forecast).unwrap();
        assert_eq!(forecast.api_key.as_deref(), Some("F"));
        assert!(forecast.requires_coords);

        assert_eq!(
            cfg.configured_providers().unwrap(),
            vec![ProviderId::OpenWeatherMap, ProviderId::Forecast]
        );
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let cfg = Config::from_toml("[aggregator]\non_timeout = \"error\"\n").unwrap();

        assert_eq!(cfg.aggregator.deadline_ms, DEFAULT_DEADLINE_MS);
        assert_eq!(cfg.server.port, DEFAULT_PORT);
    }

    #[test]
    fn unknown_provider_section_is_rejected() {
        let cfg = Config::from_toml("[providers.darksky]\napi_key = \"x\"\n").unwrap();
        let err = cfg.configured_providers().unwrap_err();

        assert!(format!("{err:#}").contains("Unknown provider 'darksky'"));
    }

    #[test]
    fn duplicate_sections_differing_in_case_are_rejected() {
        let cfg = Config::from_toml(
            "[providers.Forecast]\napi_key = \"A\"\n\n[providers.forecast]\napi_key = \"B\"\n",
        )
        .unwrap();

        let err = cfg.configured_providers().unwrap_err();
        assert!(err.to_string().contains("both configure 'forecast'"));
    }

    #[test]
    fn mixed_case_section_is_accepted() {
        let mut cfg = Config::from_toml("[providers.OpenWeatherMap]\n").unwrap();

        assert_eq!(cfg.configured_providers().unwrap(), vec![ProviderId::OpenWeatherMap]);
        assert!(cfg.provider_config(ProviderId::OpenWeatherMap).is_some());

        cfg.upsert_provider(ProviderId::OpenWeatherMap, ProviderConfig::default());
        assert_eq!(cfg.providers.len(), 1);
        assert!(cfg.configured_providers().is_ok());
    }

    #[test]
    fn upsert_replaces_existing_entry() {
        let mut cfg = Config::default();

        cfg.upsert_provider(
            ProviderId::WeatherUnderground,
            ProviderConfig {
                api_key: Some("OLD".into()),
                ..Default::default()
            },
        );
        cfg.upsert_provider(
            ProviderId::WeatherUnderground,
            ProviderConfig {
                api_key: Some("NEW".into()),
                requires_coords: true,
                base_url: None,
            },
        );

        let wu = cfg.provider_config(ProviderId::WeatherUnderground).unwrap();
        assert_eq!(wu.api_key.as_deref(), Some("NEW"));
        assert!(wu.requires_coords);
        assert!(cfg.is_provider_configured(ProviderId::WeatherUnderground));
        assert!(!cfg.is_provider_configured(ProviderId::Forecast));
    }

    #[test]
    fn save_then_load_preserves_providers() {
        let path = std::env::temp_dir()
            .join(format!("multiweather-config-{}", std::process::id()))
            .join("config.toml");

        let mut cfg = Config::default();
        cfg.upsert_provider(
            ProviderId::Forecast,
            ProviderConfig {
                api_key: Some("F".into()),
                requires_coords: true,
                base_url: None,
            },
        );
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.configured_providers().unwrap(), vec![ProviderId::Forecast]);

        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("multiweather-does-not-exist/config.toml");
        let cfg = Config::load_from(&path).unwrap();

        assert!(cfg.providers.is_empty());
    }
}
