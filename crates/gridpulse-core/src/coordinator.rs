// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of GridPulse.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use chrono::{DateTime, Utc};
use gridpulse_types::{DatasetId, Observation, PollerConfig, Snapshot};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::traits::{DatasetSource, FetchError, FetchErrorKind, FetchResult};

/// Pause between consecutive dataset requests inside one cycle
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_secs(7);

/// Why a cycle did not produce a snapshot
#[derive(Error, Debug)]
pub enum CycleError {
    /// The API key was rejected; polling must stop until reconfigured
    #[error("Authentication failed: {0}")]
    AuthFailed(#[source] FetchError),

    /// Every enabled dataset came back empty or failed
    #[error("Failed to fetch any data: {last_error}")]
    UpdateFailed { last_error: String },

    /// The installation was shut down or is waiting for new credentials
    #[error("Installation is not polling")]
    Inactive,
}

impl CycleError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailed(_))
    }
}

/// Folds per-dataset fetch outcomes into a snapshot or a cycle error
///
/// Auth escalation fires at most once per aggregator. A later auth error is
/// treated like any other per-dataset failure.
#[derive(Debug, Default)]
pub struct CycleAggregator {
    entries: BTreeMap<DatasetId, Option<Observation>>,
    auth_escalated: bool,
    last_error: Option<String>,
}

impl CycleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome. `Break` means the cycle must end now.
    pub fn record(&mut self, dataset: DatasetId, result: FetchResult) -> ControlFlow<CycleError> {
        match result {
            Ok(Some(observation)) => {
                debug!(dataset = %dataset, value = %observation.value, "Dataset fetched");
                self.entries.insert(dataset, Some(observation));
            }
            Ok(None) => {
                warn!(dataset = %dataset, "No data returned for dataset");
                self.entries.insert(dataset, None);
            }
            Err(err) if err.kind() == FetchErrorKind::Auth && !self.auth_escalated => {
                self.auth_escalated = true;
                return ControlFlow::Break(CycleError::AuthFailed(err));
            }
            Err(err) => {
                match err.kind() {
                    FetchErrorKind::RateLimit => {
                        warn!(dataset = %dataset, "Rate limit hit, dataset skipped this cycle");
                    }
                    FetchErrorKind::Auth => {
                        warn!(dataset = %dataset, error = %err, "Repeated authentication error");
                    }
                    FetchErrorKind::Generic => {
                        warn!(dataset = %dataset, error = %err, "Fetch failed");
                    }
                }
                self.last_error = Some(err.to_string());
                self.entries.insert(dataset, None);
            }
        }
        ControlFlow::Continue(())
    }

    pub fn auth_escalated(&self) -> bool {
        self.auth_escalated
    }

    /// Close the cycle. Fails only when datasets were polled and none yielded data.
    pub fn finish(self, fetched_at: DateTime<Utc>) -> Result<Snapshot, CycleError> {
        let all_absent = self.entries.values().all(Option::is_none);
        if !self.entries.is_empty() && all_absent && !self.auth_escalated {
            return Err(CycleError::UpdateFailed {
                last_error: self.last_error.unwrap_or_else(|| "no data".to_owned()),
            });
        }
        Ok(Snapshot::new(fetched_at, self.entries))
    }
}

/// Runs poll cycles for one installation
pub struct Coordinator {
    source: Arc<dyn DatasetSource>,
    config: PollerConfig,
    pacing_delay: Duration,
}

impl Coordinator {
    pub fn new(source: Arc<dyn DatasetSource>, config: PollerConfig) -> Self {
        Self {
            source,
            config,
            pacing_delay: DEFAULT_PACING_DELAY,
        }
    }

    #[must_use]
    pub fn with_pacing_delay(mut self, pacing_delay: Duration) -> Self {
        self.pacing_delay = pacing_delay;
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    pub fn pacing_delay(&self) -> Duration {
        self.pacing_delay
    }

    /// Fetch every enabled dataset once, in canonical order
    pub async fn run_cycle(&self) -> Result<Snapshot, CycleError> {
        if self.config.is_below_rate_limit_floor() {
            warn!(
                interval_secs = self.config.poll_interval.as_secs(),
                "Poll interval below 3 minutes may exceed the API rate limit"
            );
        }

        let datasets: Vec<DatasetId> = self.config.enabled_datasets.iter().copied().collect();
        debug!(source = self.source.name(), datasets = datasets.len(), "Starting poll cycle");

        let mut aggregator = CycleAggregator::new();
        for (index, dataset) in datasets.iter().enumerate() {
            let result = self.source.fetch(*dataset).await;
            if let ControlFlow::Break(err) = aggregator.record(*dataset, result) {
                warn!(dataset = %dataset, error = %err, "Aborting poll cycle");
                return Err(err);
            }

            if index + 1 < datasets.len() && !self.pacing_delay.is_zero() {
                tokio::time::sleep(self.pacing_delay).await;
            }
        }

        let snapshot = aggregator.finish(Utc::now())?;
        info!(
            present = snapshot.present_count(),
            absent = snapshot.absent_count(),
            "Poll cycle complete"
        );
        Ok(snapshot)
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("source", &self.source.name())
            .field("config", &self.config)
            .field("pacing_delay", &self.pacing_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Scripted, ScriptedSource};
    use serde_json::json;

    fn coordinator(source: &Arc<ScriptedSource>, datasets: &[DatasetId]) -> Coordinator {
        let config = PollerConfig::new("key").with_datasets(datasets.iter().copied());
        Coordinator::new(source.clone(), config).with_pacing_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_all_datasets_fetched_in_canonical_order() {
        let source = ScriptedSource::healthy().into_arc();
        let coordinator = coordinator(
            &source,
            &[
                DatasetId::ElectricityShortageStatus,
                DatasetId::PowerSystemState,
                DatasetId::GridFrequency,
            ],
        );

        let snapshot = coordinator.run_cycle().await.unwrap();

        assert_eq!(snapshot.present_count(), 3);
        assert_eq!(
            source.calls(),
            vec![
                DatasetId::PowerSystemState,
                DatasetId::GridFrequency,
                DatasetId::ElectricityShortageStatus,
            ]
        );
    }

    #[tokio::test]
    async fn test_rate_limited_dataset_is_absent_but_cycle_succeeds() {
        let source = ScriptedSource::healthy()
            .with(DatasetId::GridFrequency, Scripted::RateLimited)
            .into_arc();
        let coordinator = coordinator(&source, DatasetId::all());

        let snapshot = coordinator.run_cycle().await.unwrap();

        assert!(snapshot.is_absent(DatasetId::GridFrequency));
        assert_eq!(
            snapshot.get(DatasetId::PowerSystemState).unwrap().value,
            json!(1)
        );
        assert_eq!(snapshot.present_count(), 2);
    }

    #[tokio::test]
    async fn test_auth_error_ends_cycle_immediately() {
        let source = ScriptedSource::healthy()
            .with(DatasetId::PowerSystemState, Scripted::Auth)
            .into_arc();
        let coordinator = coordinator(&source, DatasetId::all());

        let err = coordinator.run_cycle().await.unwrap_err();

        assert!(err.is_auth());
        assert_eq!(source.calls(), vec![DatasetId::PowerSystemState]);
    }

    #[tokio::test]
    async fn test_all_failed_is_update_failed() {
        let source = ScriptedSource::new()
            .with(DatasetId::PowerSystemState, Scripted::Api(500))
            .with(DatasetId::GridFrequency, Scripted::Empty)
            .into_arc();
        let coordinator = coordinator(
            &source,
            &[DatasetId::PowerSystemState, DatasetId::GridFrequency],
        );

        match coordinator.run_cycle().await {
            Err(CycleError::UpdateFailed { last_error }) => {
                assert!(last_error.contains("HTTP 500"), "got {last_error}");
            }
            other => panic!("expected UpdateFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_dataset_set_yields_empty_snapshot() {
        let source = ScriptedSource::healthy().into_arc();
        let coordinator = coordinator(&source, &[]);

        let snapshot = coordinator.run_cycle().await.unwrap();

        assert!(snapshot.is_empty());
        assert_eq!(source.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_requests_only() {
        let source = ScriptedSource::healthy().into_arc();
        let config = PollerConfig::new("key").with_datasets(DatasetId::all().iter().copied());
        let coordinator =
            Coordinator::new(source.clone(), config).with_pacing_delay(Duration::from_secs(7));

        let started = tokio::time::Instant::now();
        coordinator.run_cycle().await.unwrap();

        // three datasets, two gaps
        assert_eq!(started.elapsed(), Duration::from_secs(14));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_applies_after_failed_requests() {
        let source = ScriptedSource::healthy()
            .with(DatasetId::PowerSystemState, Scripted::RateLimited)
            .with(DatasetId::GridFrequency, Scripted::Api(500))
            .into_arc();
        let config = PollerConfig::new("key").with_datasets(DatasetId::all().iter().copied());
        let coordinator =
            Coordinator::new(source.clone(), config).with_pacing_delay(Duration::from_secs(7));

        let started = tokio::time::Instant::now();
        let snapshot = coordinator.run_cycle().await.unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(14));
        assert_eq!(source.calls(), DatasetId::all());
        assert_eq!(snapshot.absent_count(), 2);
        assert_eq!(snapshot.present_count(), 1);
    }

    #[test]
    fn test_aggregator_escalates_auth_only_once() {
        let mut aggregator = CycleAggregator::new();
        let auth = |dataset| -> FetchResult {
            Err(FetchError::Auth {
                dataset,
                status: 401,
            })
        };

        assert!(
            aggregator
                .record(DatasetId::PowerSystemState, auth(DatasetId::PowerSystemState))
                .is_break()
        );
        assert!(
            aggregator
                .record(DatasetId::GridFrequency, auth(DatasetId::GridFrequency))
                .is_continue()
        );
        assert!(aggregator.auth_escalated());

        let snapshot = aggregator.finish(Utc::now()).unwrap();
        assert!(snapshot.is_absent(DatasetId::GridFrequency));
    }

    #[test]
    fn test_aggregator_partial_snapshot() {
        let mut aggregator = CycleAggregator::new();
        let observation = Observation::new(DatasetId::PowerSystemState, json!(2), None, None);

        let _ = aggregator.record(DatasetId::PowerSystemState, Ok(Some(observation)));
        let _ = aggregator.record(
            DatasetId::ElectricityShortageStatus,
            Err(FetchError::Timeout {
                dataset: DatasetId::ElectricityShortageStatus,
            }),
        );

        let snapshot = aggregator.finish(Utc::now()).unwrap();
        assert_eq!(snapshot.present_count(), 1);
        assert!(snapshot.is_absent(DatasetId::ElectricityShortageStatus));
    }
}
