use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single provider (or the coordinate resolver) call.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {service} failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} responded with status {status}: {body}")]
    Status {
        service: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("failed to decode {service} response: {source}")]
    Decode {
        service: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("no location found for '{0}'")]
    NoLocationMatch(String),

    #[error("provider '{0}' requires an API key")]
    MissingApiKey(&'static str),
}

impl ProviderError {
    /// Whether the same call could reasonably succeed later.
    ///
    /// Nothing in this crate retries; the classification is for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Transport { .. } | ProviderError::NoLocationMatch(_) => true,
            ProviderError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            ProviderError::Decode { .. } | ProviderError::MissingApiKey(_) => false,
        }
    }
}

/// Failure of a whole aggregation call.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("no weather providers configured")]
    NoProviders,

    #[error("{provider}: {source}")]
    Provider {
        provider: String,
        #[source]
        source: ProviderError,
    },

    #[error("only {completed} of {expected} providers answered within {deadline:?}")]
    Timeout {
        completed: usize,
        expected: usize,
        deadline: Duration,
    },

    #[error("{missing} provider task(s) ended without reporting")]
    Task { missing: usize },
}
