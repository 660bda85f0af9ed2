use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::ProviderError,
    geocode::CoordinateResolver,
    model::LocationQuery,
    provider::{ProviderId, fetch_json, locate},
};

use super::TemperatureProvider;

pub const WUNDERGROUND_BASE: &str = "http://api.wunderground.com";

const SERVICE: &str = "Weather Underground";

/// Weather Underground current conditions. Reports Celsius directly.
#[derive(Debug, Clone)]
pub struct WeatherUndergroundProvider {
    api_key: String,
    base_url: String,
    geocoder: Option<Arc<dyn CoordinateResolver>>,
    http: Client,
}

impl WeatherUndergroundProvider {
    pub fn new(
        http: Client,
        api_key: String,
        geocoder: Option<Arc<dyn CoordinateResolver>>,
    ) -> Self {
        Self {
            api_key,
            base_url: WUNDERGROUND_BASE.to_string(),
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
struct WuObservation {
    temp_c: f64,
}

#[derive(Debug, Deserialize)]
struct WuResponse {
    current_observation: WuObservation,
}

#[async_trait]
impl TemperatureProvider for WeatherUndergroundProvider {
    fn name(&self) -> &str {
        ProviderId::WeatherUnderground.as_str()
    }

    async fn temperature(&self, city: &str) -> Result<f64, ProviderError> {
        let location = match locate(city, self.geocoder.as_ref()).await? {
            LocationQuery::Name(name) => name,
            LocationQuery::Coords(c) => format!("{},{}", c.lat, c.lng),
        };
        let url = format!(
            "{}/api/{}/conditions/q/{}.json",
            self.base_url, self.api_key, location
        );

        let parsed: WuResponse = fetch_json(SERVICE, self.http.get(url)).await?;

        let celsius = parsed.current_observation.temp_c;
        tracing::info!("{}: {city}: {celsius:.2}", self.name());

        Ok(celsius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_celsius_without_conversion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/KEY/conditions/q/london.json")
            .with_body(r#"{"current_observation":{"temp_c":12.5,"temp_f":54.5}}"#)
            .create_async()
            .await;

        let provider = WeatherUndergroundProvider::new(Client::new(), "KEY".into(), None)
            .with_base_url(server.url());

        assert_eq!(provider.temperature("london").await.unwrap(), 12.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_observation_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/KEY/conditions/q/atlantis.json")
            .with_body(r#"{"response":{"error":{"type":"querynotfound"}}}"#)
            .create_async()
            .await;

        let provider = WeatherUndergroundProvider::new(Client::new(), "KEY".into(), None)
            .with_base_url(server.url());
        let err = provider.temperature("atlantis").await.unwrap_err();

        assert!(matches!(err, ProviderError::Decode { .. }));
        assert!(!err.is_retryable());
    }
}
