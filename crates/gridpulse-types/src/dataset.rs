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

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fingrid open-data datasets supported by GridPulse.
///
/// The declaration order is the canonical fetch order. `Ord` follows it, so a
/// `BTreeSet<DatasetId>` always iterates power system state first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DatasetId {
    /// Dataset 209: categorical state of the Finnish power system
    PowerSystemState,
    /// Dataset 177: grid frequency in Hz
    GridFrequency,
    /// Dataset 336: categorical electricity shortage status
    ElectricityShortageStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown dataset id: '{0}'. Supported ids: 209, 177, 336")]
pub struct UnknownDatasetError(pub String);

impl DatasetId {
    /// Numeric id used in the Fingrid API path
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PowerSystemState => "209",
            Self::GridFrequency => "177",
            Self::ElectricityShortageStatus => "336",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Self::PowerSystemState => "Power System State",
            Self::GridFrequency => "Grid Frequency",
            Self::ElectricityShortageStatus => "Electricity Shortage Status",
        }
    }

    /// snake_case name, used in entity ids and accepted in config files
    pub const fn slug(self) -> &'static str {
        match self {
            Self::PowerSystemState => "power_system_state",
            Self::GridFrequency => "grid_frequency",
            Self::ElectricityShortageStatus => "electricity_shortage_status",
        }
    }

    pub fn all() -> &'static [DatasetId] {
        &[
            Self::PowerSystemState,
            Self::GridFrequency,
            Self::ElectricityShortageStatus,
        ]
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetId {
    type Err = UnknownDatasetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        Self::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == needle || id.slug().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownDatasetError(s.to_owned()))
    }
}

impl Serialize for DatasetId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for DatasetId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Config files written by hand sometimes carry the id as a bare number
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        let raw = match RawId::deserialize(deserializer)? {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        };
        raw.parse().map_err(serde::de::Error::custom)
    }
}
