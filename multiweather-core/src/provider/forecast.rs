use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::ProviderError,
    geocode::CoordinateResolver,
    provider::{ProviderId, fetch_json},
    units::fahrenheit_to_celsius,
};

use super::TemperatureProvider;

pub const FORECAST_BASE: &str = "https://api.forecast.io";

const SERVICE: &str = "Forecast.io";

/// Forecast.io current conditions. Needs coordinates and reports Fahrenheit.
#[derive(Debug, Clone)]
pub struct ForecastProvider {
    api_key: String,
    base_url: String,
    geocoder: Arc<dyn CoordinateResolver>,
    http: Client,
}

impl ForecastProvider {
    pub fn new(http: Client, api_key: String, geocoder: Arc<dyn CoordinateResolver>) -> Self {
        Self {
            api_key,
            base_url: FORECAST_BASE.to_string(),
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
struct FcCurrently {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct FcResponse {
    currently: FcCurrently,
}

#[async_trait]
impl TemperatureProvider for ForecastProvider {
    fn name(&self) -> &str {
        ProviderId::Forecast.as_str()
    }

    async fn temperature(&self, city: &str) -> Result<f64, ProviderError> {
        let coords = self.geocoder.resolve(city).await?;
        let url = format!(
            "{}/forecast/{}/{:.7},{:.7}",
            self.base_url, self.api_key, coords.lat, coords.lng
        );

        let parsed: FcResponse = fetch_json(SERVICE, self.http.get(url)).await?;

        let celsius = fahrenheit_to_celsius(parsed.currently.temperature);
        tracing::info!("{}: {city}: {celsius:.2}", self.name());

        Ok(celsius)
    }
}
