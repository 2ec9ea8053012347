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
use serde::Serialize;
use std::collections::BTreeMap;

use crate::{DatasetId, Observation};

/// Result of one poll cycle: latest observation per enabled dataset
///
/// A dataset that was polled but produced nothing maps to `None`. Datasets
/// that were not enabled are not keys at all. Snapshots are immutable and are
/// replaced wholesale by the next successful cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    entries: BTreeMap<DatasetId, Option<Observation>>,
}

impl Snapshot {
    pub fn new(
        fetched_at: DateTime<Utc>,
        entries: BTreeMap<DatasetId, Option<Observation>>,
    ) -> Self {
        Self {
            fetched_at,
            entries,
        }
    }

    pub fn get(&self, dataset: DatasetId) -> Option<&Observation> {
        self.entries.get(&dataset).and_then(Option::as_ref)
    }

    /// Whether the dataset was polled in this cycle (present or absent)
    pub fn contains(&self, dataset: DatasetId) -> bool {
        self.entries.contains_key(&dataset)
    }

    /// Polled in this cycle but no observation recorded
    pub fn is_absent(&self, dataset: DatasetId) -> bool {
        matches!(self.entries.get(&dataset), Some(None))
    }

    pub fn present_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_some()).count()
    }

    pub fn absent_count(&self) -> usize {
        self.entries.values().filter(|entry| entry.is_none()).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (DatasetId, Option<&Observation>)> + '_ {
        self.entries
            .iter()
            .map(|(dataset, entry)| (*dataset, entry.as_ref()))
    }
}
