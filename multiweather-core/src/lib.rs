//! Core library for the `multiweather` service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over temperature providers and the geocoder they may need
//! - The aggregator that queries every provider concurrently and averages them
//!
//! It is used by `multiweather-cli`, but can also be reused by other binaries or services.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod geocode;
pub mod model;
pub mod provider;
pub mod units;

pub use aggregator::{Aggregator, TimeoutPolicy};
pub use config::{Config, ProviderConfig};
pub use error::{AggregateError, ProviderError};
pub use geocode::{CoordinateResolver, GoogleGeocoder};
pub use model::{AggregationOutcome, Coordinates, LocationQuery, WeatherReport};
pub use provider::{ProviderId, TemperatureProvider};
