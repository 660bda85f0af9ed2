use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{error::ProviderError, model::Coordinates, provider::fetch_json};

pub const GOOGLE_GEOCODE_BASE: &str = "https://maps.googleapis.com";

const SERVICE: &str = "Google geocoding";

/// Resolves a free-form city name to coordinates.
#[async_trait]
pub trait CoordinateResolver: Send + Sync + std::fmt::Debug {
    async fn resolve(&self, city: &str) -> Result<Coordinates, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GoogleGeocoder {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl GoogleGeocoder {
    pub fn new(http: Client, api_key: Option<String>) -> Self {
        Self::with_base_url(http, api_key, GOOGLE_GEOCODE_BASE)
    }

    pub fn with_base_url(http: Client, api_key: Option<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            http,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GeoLocation {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct GeoGeometry {
    location: GeoLocation,
}

#[derive(Debug, Deserialize)]
struct GeoResult {
    geometry: GeoGeometry,
}

#[derive(Debug, Deserialize)]
struct GeoResponse {
    results: Vec<GeoResult>,
}

#[async_trait]
impl CoordinateResolver for GoogleGeocoder {
    async fn resolve(&self, city: &str) -> Result<Coordinates, ProviderError> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);

        let mut req = self.http.get(url).query(&[("address", city)]);
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key.as_str())]);
        }

        let parsed: GeoResponse = fetch_json(SERVICE, req).await?;

        let location = parsed
            .results
            .into_iter()
            .next()
            .map(|r| r.geometry.location)
            .ok_or_else(|| ProviderError::NoLocationMatch(city.to_string()))?;

        tracing::debug!("coords of {city} located: {}, {}", location.lat, location.lng);

        Ok(Coordinates {
            lat: location.lat,
            lng: location.lng,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn takes_first_match() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/maps/api/geocode/json")
            .match_query(Matcher::UrlEncoded("address".into(), "london".into()))
            .with_body(
                r#"{"results":[
                    {"geometry":{"location":{"lat":51.5,"lng":-0.12}}},
                    {"geometry":{"location":{"lat":42.98,"lng":-81.24}}}
                ],"status":"OK"}"#,
            )
            .create_async()
            .await;

        let geocoder = GoogleGeocoder::with_base_url(Client::new(), None, server.url());
        let coords = geocoder.resolve("london").await.unwrap();

        assert_eq!(coords, Coordinates { lat: 51.5, lng: -0.12 });
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn zero_matches_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/maps/api/geocode/json")
            .match_query(Matcher::Any)
            .with_body(r#"{"results":[],"status":"ZERO_RESULTS"}"#)
            .create_async()
            .await;

        let geocoder = GoogleGeocoder::with_base_url(Client::new(), None, server.url());
        let err = geocoder.resolve("nowhere").await.unwrap_err();

        assert!(matches!(err, ProviderError::NoLocationMatch(ref c) if c == "nowhere"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/maps/api/geocode/json")
            .match_query(Matcher::Any)
            .with_body(r#"{"status":"OK"}"#)
            .create_async()
            .await;

        let geocoder = GoogleGeocoder::with_base_url(Client::new(), None, server.url());
        let err = geocoder.resolve("london").await.unwrap_err();

        assert!(matches!(err, ProviderError::Decode { .. }));
    }

    #[tokio::test]
    async fn api_key_is_forwarded() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/maps/api/geocode/json")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("address".into(), "paris".into()),
                Matcher::UrlEncoded("key".into(), "GEO".into()),
            ]))
            .with_body(r#"{"results":[{"geometry":{"location":{"lat":48.85,"lng":2.35}}}]}"#)
            .create_async()
            .await;

        let geocoder =
            GoogleGeocoder::with_base_url(Client::new(), Some("GEO".into()), server.url());
        geocoder.resolve("paris").await.unwrap();

        mock.assert_async().await;
    }
}
