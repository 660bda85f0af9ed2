use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::ProviderError,
    geocode::CoordinateResolver,
    model::LocationQuery,
    provider::{ProviderId, fetch_json, locate},
    units::kelvin_to_celsius,
};

use super::TemperatureProvider;

pub const OPENWEATHERMAP_BASE: &str = "http://api.openweathermap.org";

const SERVICE: &str = "OpenWeatherMap";

/// OpenWeatherMap current conditions. Reports Kelvin.
#[derive(Debug, Clone)]
pub struct OpenWeatherMapProvider {
    api_key: Option<String>,
    base_url: String,
    geocoder: Option<Arc<dyn CoordinateResolver>>,
    http: Client,
}

impl OpenWeatherMapProvider {
    pub fn new(
        http: Client,
        api_key: Option<String>,
        geocoder: Option<Arc<dyn CoordinateResolver>>,
    ) -> Self {
        Self {
            api_key,
            base_url: OPENWEATHERMAP_BASE.to_string(),
            geocoder,
            http,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwmResponse {
    main: OwmMain,
}

#[async_trait]
impl TemperatureProvider for OpenWeatherMapProvider {
    fn name(&self) -> &str {
        ProviderId::OpenWeatherMap.as_str()
    }

    async fn temperature(&self, city: &str) -> Result<f64, ProviderError> {
        let url = format!("{}/data/2.5/weather", self.base_url);

        let mut req = match locate(city, self.geocoder.as_ref()).await? {
            LocationQuery::Name(name) => self.http.get(url).query(&[("q", name)]),
            LocationQuery::Coords(c) => self
                .http
                .get(url)
                .query(&[("lat", c.lat.to_string()), ("lon", c.lng.to_string())]),
        };
        if let Some(key) = &self.api_key {
            req = req.query(&[("appid", key.as_str())]);
        }

        let parsed: OwmResponse = fetch_json(SERVICE, req).await?;

        let celsius = kelvin_to_celsius(parsed.main.temp);
        tracing::info!("{}: {city}: {celsius:.2}", self.name());

        Ok(celsius)
    }
}
