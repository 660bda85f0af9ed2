//! Fan-out/fan-in over every configured provider.
//!
//! One task is spawned per provider. Each task reports on exactly one of two
//! channels (values or errors) sized to the number of providers, so a task
//! never blocks on a send even after the caller has stopped listening. The
//! collection loop waits for all of them, bounded by a deadline measured from
//! the moment of fan-out:
//!
//! - the first error observed ends the call with that error;
//! - if the deadline passes first, the call is degraded (see [`TimeoutPolicy`]);
//! - otherwise the result is the mean of all values.
//!
//! Tasks still running when the call returns are cancelled.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    Config,
    error::{AggregateError, ProviderError},
    model::AggregationOutcome,
    provider::{TemperatureProvider, providers_from_config},
};

/// What a degraded (timed out) aggregation returns to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutPolicy {
    /// Report `0.0` with no error.
    #[default]
    Zero,
    /// Report [`AggregateError::Timeout`].
    Error,
}

#[derive(Debug, Clone)]
pub struct Aggregator {
    providers: Vec<Arc<dyn TemperatureProvider>>,
    deadline: Duration,
    on_timeout: TimeoutPolicy,
}

impl Aggregator {
    pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(2);

    /// Fails with [`AggregateError::NoProviders`] on an empty list.
    pub fn new(providers: Vec<Arc<dyn TemperatureProvider>>) -> Result<Self, AggregateError> {
        if providers.is_empty() {
            return Err(AggregateError::NoProviders);
        }

        Ok(Self {
            providers,
            deadline: Self::DEFAULT_DEADLINE,
            on_timeout: TimeoutPolicy::default(),
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let providers = providers_from_config(config)?;

        let aggregator = Self::new(providers)
            .context("Hint: add at least one [providers.<name>] section to the config file")?;

        Ok(aggregator
            .with_deadline(config.aggregator.deadline())
            .with_timeout_policy(config.aggregator.on_timeout))
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.on_timeout = policy;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn TemperatureProvider>] {
        &self.providers
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Mean Celsius temperature of `city` across all providers.
    pub async fn temperature(&self, city: &str) -> Result<f64, AggregateError> {
        match self.aggregate(city).await {
            AggregationOutcome::Mean(celsius) => Ok(celsius),
            AggregationOutcome::Failed(err) => Err(err),
            AggregationOutcome::Degraded {
                completed,
                expected,
            } => match self.on_timeout {
                TimeoutPolicy::Zero => Ok(0.0),
                TimeoutPolicy::Error => Err(AggregateError::Timeout {
                    completed,
                    expected,
                    deadline: self.deadline,
                }),
            },
        }
    }

    /// Run one aggregation and report which terminal state it reached.
    pub async fn aggregate(&self, city: &str) -> AggregationOutcome {
        let expected = self.providers.len();
        let deadline = Instant::now() + self.deadline;

        let cancel = CancellationToken::new();
        let _cancel_on_return = cancel.clone().drop_guard();

        let (temps_tx, mut temps_rx) = mpsc::channel::<f64>(expected);
        let (errs_tx, mut errs_rx) = mpsc::channel::<(String, ProviderError)>(expected);

        let city: Arc<str> = Arc::from(city);

        tracing::debug!(%city, providers = expected, "dispatching");

        for provider in &self.providers {
            let provider = Arc::clone(provider);
            let city = Arc::clone(&city);
            let token = cancel.child_token();
            let temps = temps_tx.clone();
            let errs = errs_tx.clone();

            tokio::spawn(async move {
                let result = tokio::select! {
                    _ = token.cancelled() => return,
                    result = provider.temperature(&city) => result,
                };

                // Capacity equals the number of tasks: a send only fails once
                // the collector is gone, and then nobody wants the result.
                match result {
                    Ok(celsius) => {
                        let _ = temps.try_send(celsius);
                    }
                    Err(err) => {
                        let _ = errs.try_send((provider.name().to_string(), err));
                    }
                }
            });
        }

        // Only the tasks hold senders now; both channels close once all exit.
        drop(temps_tx);
        drop(errs_tx);

        let timeout = tokio::time::sleep_until(deadline);
        tokio::pin!(timeout);

        let mut sum = 0.0;
        let mut completed = 0;

        while completed < expected {
            tokio::select! {
                Some((provider, source)) = errs_rx.recv() => {
                    tracing::warn!(%city, %provider, error = %source, "provider failed, aborting aggregation");
                    return AggregationOutcome::Failed(AggregateError::Provider { provider, source });
                }
                temp = temps_rx.recv() => match temp {
                    Some(celsius) => {
                        sum += celsius;
                        completed += 1;
                    }
                    None => {
                        // Every task has exited; an error may still be buffered.
                        if let Ok((provider, source)) = errs_rx.try_recv() {
                            tracing::warn!(%city, %provider, error = %source, "provider failed, aborting aggregation");
                            return AggregationOutcome::Failed(AggregateError::Provider { provider, source });
                        }
                        let missing = expected - completed;
                        tracing::error!(%city, missing, "provider tasks ended without reporting");
                        return AggregationOutcome::Failed(AggregateError::Task { missing });
                    }
                },
                _ = &mut timeout => {
                    tracing::warn!(%city, completed, expected, deadline = ?self.deadline, "deadline elapsed, degrading");
                    return AggregationOutcome::Degraded { completed, expected };
                }
            }
        }

        let mean = sum / expected as f64;
        tracing::debug!(%city, mean, "aggregation complete");

        AggregationOutcome::Mean(mean)
    }
}
