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

//! Turns raw observations into sensor states
//!
//! Everything here is pure: the same snapshot always renders the same way.

use gridpulse_types::{
    DatasetId, InstallationId, Observation, PresentedState, SensorDescriptor, SensorState,
    Snapshot,
};
use serde_json::Value;

/// Label for codes outside the published table, and for non-numeric values
pub const UNKNOWN_LABEL: &str = "Unknown";

/// A categorical dataset whose integer codes map to fixed labels
pub trait StateCode: Sized + Copy {
    fn from_code(code: i64) -> Option<Self>;
    fn label(self) -> &'static str;
}

/// Power system state (dataset 209)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum PowerSystemState {
    Normal = 1,
    Endangered = 2,
    Disturbed = 3,
    Blackout = 4,
    Restoration = 5,
}

impl StateCode for PowerSystemState {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Normal),
            2 => Some(Self::Endangered),
            3 => Some(Self::Disturbed),
            4 => Some(Self::Blackout),
            5 => Some(Self::Restoration),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Endangered => "Endangered",
            Self::Disturbed => "Disturbed",
            Self::Blackout => "Blackout",
            Self::Restoration => "Restoration",
        }
    }
}

/// Electricity shortage status (dataset 336)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ElectricityShortageStatus {
    Normal = 0,
    ShortagePossible = 1,
    HighRisk = 2,
    Shortage = 3,
}

impl StateCode for ElectricityShortageStatus {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Normal),
            1 => Some(Self::ShortagePossible),
            2 => Some(Self::HighRisk),
            3 => Some(Self::Shortage),
            _ => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::ShortagePossible => "Electricity shortage possible",
            Self::HighRisk => "High risk of electricity shortage",
            Self::Shortage => "Electricity shortage",
        }
    }
}

/// Integer code of a JSON number, truncated toward zero
#[expect(clippy::cast_possible_truncation)]
fn truncate_code(value: &Value) -> Option<i64> {
    if let Some(code) = value.as_i64() {
        return Some(code);
    }
    value
        .as_f64()
        .filter(|number| number.is_finite())
        .map(|number| number.trunc() as i64)
}

/// Map a raw value through a code table
///
/// Returns the state and, whenever the input was numeric, the truncated code
/// to expose as `raw_value` (even if the code is not in the table).
pub fn decode_category<T: StateCode>(value: &Value) -> (SensorState, Option<i64>) {
    match truncate_code(value) {
        Some(code) => {
            let label = T::from_code(code).map_or(UNKNOWN_LABEL, StateCode::label);
            (SensorState::Text(label.to_owned()), Some(code))
        }
        None => (SensorState::Text(UNKNOWN_LABEL.to_owned()), None),
    }
}

/// Frequency in Hz is shown as-is
pub fn decode_frequency(value: &Value) -> SensorState {
    value
        .as_f64()
        .map_or(SensorState::Unknown, SensorState::Number)
}

/// How each dataset renders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presenter {
    PowerSystemState,
    GridFrequency,
    ElectricityShortageStatus,
}

impl Presenter {
    pub fn for_dataset(dataset: DatasetId) -> Self {
        match dataset {
            DatasetId::PowerSystemState => Self::PowerSystemState,
            DatasetId::GridFrequency => Self::GridFrequency,
            DatasetId::ElectricityShortageStatus => Self::ElectricityShortageStatus,
        }
    }

    pub fn render(self, observation: &Observation) -> PresentedState {
        let (state, raw_value) = match self {
            Self::PowerSystemState => decode_category::<PowerSystemState>(&observation.value),
            Self::ElectricityShortageStatus => {
                decode_category::<ElectricityShortageStatus>(&observation.value)
            }
            Self::GridFrequency => (decode_frequency(&observation.value), None),
        };

        let mut presented = PresentedState::new(state);
        if let Some(raw_value) = raw_value {
            presented = presented.with_attribute("raw_value", raw_value);
        }
        if let Some(timestamp) = observation.timestamp() {
            presented = presented.with_attribute("api_timestamp", timestamp);
        }
        presented
    }

    fn icon(self) -> &'static str {
        match self {
            Self::PowerSystemState => "mdi:transmission-tower",
            Self::GridFrequency => "mdi:sine-wave",
            Self::ElectricityShortageStatus => "mdi:power-plug-off-outline",
        }
    }
}

/// Render one dataset from the latest snapshot
///
/// Missing snapshot, dataset not polled, or polled without data all render
/// as `Unavailable` with no attributes.
pub fn present(dataset: DatasetId, snapshot: Option<&Snapshot>) -> PresentedState {
    snapshot
        .and_then(|snapshot| snapshot.get(dataset))
        .map_or_else(PresentedState::unavailable, |observation| {
            Presenter::for_dataset(dataset).render(observation)
        })
}

/// Static entity metadata for one dataset of one installation
pub fn describe(installation: &InstallationId, dataset: DatasetId) -> SensorDescriptor {
    let presenter = Presenter::for_dataset(dataset);
    let is_frequency = presenter == Presenter::GridFrequency;

    SensorDescriptor {
        dataset,
        unique_id: format!("{installation}_{}", dataset.as_str()),
        name: dataset.display_name(),
        icon: presenter.icon(),
        unit_of_measurement: is_frequency.then_some("Hz"),
        device_class: is_frequency.then_some("frequency"),
        state_class: is_frequency.then_some("measurement"),
    }
}
