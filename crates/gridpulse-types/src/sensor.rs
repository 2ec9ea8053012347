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

use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::DatasetId;

/// Externally visible state of a sensor entity
#[derive(Debug, Clone, PartialEq)]
pub enum SensorState {
    Text(String),
    Number(f64),
    /// Data was received but could not be interpreted
    Unknown,
    /// No data for this cycle, or the installation is unhealthy
    Unavailable,
}

impl SensorState {
    pub fn is_available(&self) -> bool {
        !matches!(self, Self::Unavailable)
    }
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(number) => write!(f, "{number}"),
            Self::Unknown => f.write_str("unknown"),
            Self::Unavailable => f.write_str("unavailable"),
        }
    }
}

// Serialized the way Home Assistant reports states: numbers stay numbers,
// everything else becomes a string.
impl Serialize for SensorState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(number) => serializer.serialize_f64(*number),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Unknown | Self::Unavailable => serializer.collect_str(self),
        }
    }
}

/// State plus secondary attributes (`raw_value`, `api_timestamp`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresentedState {
    pub state: SensorState,
    pub attributes: BTreeMap<String, Value>,
}

impl PresentedState {
    pub fn new(state: SensorState) -> Self {
        Self {
            state,
            attributes: BTreeMap::new(),
        }
    }

    pub fn unavailable() -> Self {
        Self::new(SensorState::Unavailable)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}

/// Static description of the sensor entity backing one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SensorDescriptor {
    pub dataset: DatasetId,
    pub unique_id: String,
    pub name: &'static str,
    pub icon: &'static str,
    pub unit_of_measurement: Option<&'static str>,
    pub device_class: Option<&'static str>,
    pub state_class: Option<&'static str>,
}
