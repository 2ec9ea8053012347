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

//! Shared data types for GridPulse.
//!
//! Plain data only: no I/O, no async. Everything here is shared between the
//! Fingrid adapter, the polling core and the binary.

pub mod config;
pub mod dataset;
pub mod installation;
pub mod observation;
pub mod sensor;
pub mod snapshot;

pub use config::{
    DEFAULT_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES, MIN_POLL_INTERVAL_MINUTES,
    PollerConfig, RATE_LIMIT_SAFE_INTERVAL,
};
pub use dataset::{DatasetId, UnknownDatasetError};
pub use installation::{InstallationHealth, InstallationId, InstallationStatus};
pub use observation::Observation;
pub use sensor::{PresentedState, SensorDescriptor, SensorState};
pub use snapshot::Snapshot;
