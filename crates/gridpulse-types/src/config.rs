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

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use crate::DatasetId;

pub const MIN_POLL_INTERVAL_MINUTES: u64 = 1;
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 60;
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 5;

/// Polling faster than this risks the API limit of ~10 requests per minute
pub const RATE_LIMIT_SAFE_INTERVAL: Duration = Duration::from_secs(3 * 60);

/// Configuration of one polling installation
///
/// Replaced as a whole on reconfiguration, never patched in place.
#[derive(Clone, PartialEq, Eq)]
pub struct PollerConfig {
    pub api_key: String,
    pub enabled_datasets: BTreeSet<DatasetId>,
    pub poll_interval: Duration,
}

impl PollerConfig {
    /// Defaults: power system state only, polled every 5 minutes
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            enabled_datasets: BTreeSet::from([DatasetId::PowerSystemState]),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_MINUTES * 60),
        }
    }

    pub fn with_datasets(mut self, datasets: impl IntoIterator<Item = DatasetId>) -> Self {
        self.enabled_datasets = datasets.into_iter().collect();
        self
    }

    /// Set the poll interval, clamped to 1..=60 minutes
    pub fn with_poll_interval_minutes(mut self, minutes: u64) -> Self {
        let minutes = minutes.clamp(MIN_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES);
        self.poll_interval = Duration::from_secs(minutes * 60);
        self
    }

    pub fn poll_interval_minutes(&self) -> u64 {
        self.poll_interval.as_secs() / 60
    }

    pub fn is_below_rate_limit_floor(&self) -> bool {
        self.poll_interval < RATE_LIMIT_SAFE_INTERVAL
    }
}

impl fmt::Debug for PollerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollerConfig")
            .field("api_key", &"<redacted>")
            .field("enabled_datasets", &self.enabled_datasets)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}
