use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AggregateError;

/// Geographic position as returned by the coordinate resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// What a provider actually puts on the wire for a city.
#[derive(Debug, Clone, PartialEq)]
pub enum LocationQuery {
    Name(String),
    Coords(Coordinates),
}

/// Terminal state of one aggregation call.
#[derive(Debug)]
pub enum AggregationOutcome {
    /// Every provider answered before the deadline.
    Mean(f64),
    /// The first error observed; later results were discarded.
    Failed(AggregateError),
    /// The deadline elapsed before every provider answered.
    Degraded { completed: usize, expected: usize },
}

/// Body of a successful `/weather/{city}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherReport {
    pub city: String,
    pub temp: f64,
    pub took: String,
}

impl WeatherReport {
    pub fn new(city: impl Into<String>, temp: f64, took: Duration) -> Self {
        Self {
            city: city.into(),
            temp,
            took: format!("{took:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_expected_fields() {
        let report = WeatherReport::new("london", 15.0, Duration::from_millis(3));
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["city"], "london");
        assert_eq!(json["temp"], 15.0);
        assert_eq!(json["took"], "3ms");
    }
}
