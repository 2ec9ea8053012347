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

//! GridPulse polling core
//!
//! - `traits`: the `DatasetSource` seam and the fetch error taxonomy
//! - `coordinator`: one poll cycle over all enabled datasets
//! - `installation`: tick loop, backoff and published snapshot per installation
//! - `registry`: explicit map of running installations
//! - `presenters`: raw observation -> sensor state
//! - `entities`: in-process entity/state registry fed by the installations

pub mod coordinator;
pub mod entities;
pub mod installation;
pub mod presenters;
pub mod registry;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{Coordinator, CycleAggregator, CycleError, DEFAULT_PACING_DELAY};
pub use entities::{EntityRecord, EntityRegistry, InstallationSummary, spawn_entity_sync};
pub use installation::{BackoffPolicy, Installation};
pub use presenters::{
    ElectricityShortageStatus, PowerSystemState, Presenter, StateCode, UNKNOWN_LABEL,
    decode_category, decode_frequency, describe, present,
};
pub use registry::{ApplyReport, InstallationRegistry, SourceFactory};
pub use traits::{DatasetSource, FetchError, FetchErrorKind, FetchResult};

pub use gridpulse_types::*;
