use crate::{
    Config,
    error::ProviderError,
    geocode::{CoordinateResolver, GoogleGeocoder},
    model::LocationQuery,
    provider::{
        forecast::ForecastProvider, openweathermap::OpenWeatherMapProvider,
        wunderground::WeatherUndergroundProvider,
    },
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use std::{convert::TryFrom, fmt::Debug, sync::Arc, time::Duration};

pub mod forecast;
pub mod openweathermap;
pub mod wunderground;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    OpenWeatherMap,
    WeatherUnderground,
    Forecast,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::OpenWeatherMap => "openweathermap",
            ProviderId::WeatherUnderground => "weatherunderground",
            ProviderId::Forecast => "forecast",
        }
    }

    /// Every known provider, in the order an aggregator queries them.
    pub const fn all() -> &'static [ProviderId] {
        &[
            ProviderId::OpenWeatherMap,
            ProviderId::WeatherUnderground,
            ProviderId::Forecast,
        ]
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderId::OpenWeatherMap)
    }

    /// The service only accepts coordinates, whatever the config says.
    pub fn always_needs_coords(&self) -> bool {
        matches!(self, ProviderId::Forecast)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "openweathermap" => Ok(ProviderId::OpenWeatherMap),
            "weatherunderground" => Ok(ProviderId::WeatherUnderground),
            "forecast" => Ok(ProviderId::Forecast),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: openweathermap, weatherunderground, forecast."
            )),
        }
    }
}

/// A single upstream source of current temperature.
///
/// Implementations convert their service's native unit, so a successful
/// value is always in degrees Celsius.
#[async_trait]
pub trait TemperatureProvider: Send + Sync + Debug {
    fn name(&self) -> &str;

    async fn temperature(&self, city: &str) -> Result<f64, ProviderError>;
}

/// Decide how a provider addresses `city`, resolving it first if needed.
pub(crate) async fn locate(
    city: &str,
    resolver: Option<&Arc<dyn CoordinateResolver>>,
) -> Result<LocationQuery, ProviderError> {
    match resolver {
        Some(resolver) => Ok(LocationQuery::Coords(resolver.resolve(city).await?)),
        None => Ok(LocationQuery::Name(city.to_string())),
    }
}

/// Send `req` and decode a successful JSON body into `T`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    service: &'static str,
    req: RequestBuilder,
) -> Result<T, ProviderError> {
    let res = req
        .send()
        .await
        .map_err(|source| ProviderError::Transport { service, source })?;

    let status = res.status();
    let body = res
        .text()
        .await
        .map_err(|source| ProviderError::Transport { service, source })?;

    if !status.is_success() {
        return Err(ProviderError::Status {
            service,
            status,
            body: truncate_body(&body),
        });
    }

    serde_json::from_str(&body).map_err(|source| ProviderError::Decode { service, source })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

/// HTTP client shared by every provider built from `config`.
pub fn http_client(config: &Config) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(Duration::from_millis(config.http_timeout_ms))
        .build()
        .context("Failed to build HTTP client")
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: &Client,
) -> anyhow::Result<Arc<dyn TemperatureProvider>> {
    let provider_cfg = config.provider_config(id).ok_or_else(|| {
        anyhow::anyhow!(
            "Provider '{id}' is not configured.\n\
                 Hint: run `multiweather configure {id}` first."
        )
    })?;

    let api_key = provider_cfg.api_key.clone();
    let geocoder: Option<Arc<dyn CoordinateResolver>> =
        if provider_cfg.requires_coords || id.always_needs_coords() {
            Some(Arc::new(geocoder_from_config(config, http)))
        } else {
            None
        };

    let base_url = provider_cfg.base_url.clone();
    let http = http.clone();

    let provider: Arc<dyn TemperatureProvider> = match id {
        ProviderId::OpenWeatherMap => {
            let mut p = OpenWeatherMapProvider::new(http, api_key, geocoder);
            if let Some(base) = base_url {
                p = p.with_base_url(base);
            }
            Arc::new(p)
        }
        ProviderId::WeatherUnderground => {
            let key = required_key(id, api_key)?;
            let mut p = WeatherUndergroundProvider::new(http, key, geocoder);
            if let Some(base) = base_url {
                p = p.with_base_url(base);
            }
            Arc::new(p)
        }
        ProviderId::Forecast => {
            let key = required_key(id, api_key)?;
            let geocoder = geocoder
                .unwrap_or_else(|| Arc::new(geocoder_from_config(config, &http)));
            let mut p = ForecastProvider::new(http, key, geocoder);
            if let Some(base) = base_url {
                p = p.with_base_url(base);
            }
            Arc::new(p)
        }
    };

    Ok(provider)
}

fn required_key(id: ProviderId, api_key: Option<String>) -> anyhow::Result<String> {
    api_key
        .ok_or(ProviderError::MissingApiKey(id.as_str()))
        .with_context(|| {
            format!(
                "No API key configured for provider '{id}'.\n\
                     Hint: run `multiweather configure {id}` and enter your API key."
            )
        })
}

fn geocoder_from_config(config: &Config, http: &Client) -> GoogleGeocoder {
    let geo = &config.geocoder;
    match &geo.base_url {
        Some(base) => GoogleGeocoder::with_base_url(http.clone(), geo.api_key.clone(), base.as_str()),
        None => GoogleGeocoder::new(http.clone(), geo.api_key.clone()),
    }
}

/// Build every configured provider, in `ProviderId::all()` order.
pub fn providers_from_config(config: &Config) -> anyhow::Result<Vec<Arc<dyn TemperatureProvider>>> {
    let http = http_client(config)?;

    config
        .configured_providers()?
        .into_iter()
        .map(|id| provider_from_config(id, config, &http))
        .collect()
}
