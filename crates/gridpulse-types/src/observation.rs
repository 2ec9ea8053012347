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

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DatasetId;

/// Most recent data point of one dataset, as returned by the API
///
/// `value` is kept as raw JSON: the API documents it as a number, but the
/// presenters have to cope with anything the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub dataset: DatasetId,
    pub value: Value,
    /// Start of the measurement interval (RFC 3339 as sent by the API)
    pub start_time: Option<String>,
    /// End of the measurement interval (RFC 3339 as sent by the API)
    pub end_time: Option<String>,
}

impl Observation {
    pub fn new(
        dataset: DatasetId,
        value: Value,
        start_time: Option<String>,
        end_time: Option<String>,
    ) -> Self {
        Self {
            dataset,
            value,
            start_time,
            end_time,
        }
    }

    /// Value as f64 when the API sent a JSON number
    pub fn numeric_value(&self) -> Option<f64> {
        self.value.as_f64()
    }

    /// Timestamp of the observation: end of interval, falling back to its start
    pub fn timestamp(&self) -> Option<&str> {
        self.end_time.as_deref().or(self.start_time.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timestamp_prefers_end_time() {
        let obs = Observation::new(
            DatasetId::GridFrequency,
            json!(49.98),
            Some("2025-05-01T10:00:00.000Z".to_owned()),
            Some("2025-05-01T10:03:00.000Z".to_owned()),
        );
        assert_eq!(obs.timestamp(), Some("2025-05-01T10:03:00.000Z"));
    }

    #[test]
    fn test_timestamp_falls_back_to_start_time() {
        let obs = Observation::new(
            DatasetId::GridFrequency,
            json!(49.98),
            Some("2025-05-01T10:00:00.000Z".to_owned()),
            None,
        );
        assert_eq!(obs.timestamp(), Some("2025-05-01T10:00:00.000Z"));

        let bare = Observation::new(DatasetId::GridFrequency, json!(49.98), None, None);
        assert_eq!(bare.timestamp(), None);
    }

    #[test]
    fn test_numeric_value() {
        let int = Observation::new(DatasetId::PowerSystemState, json!(2), None, None);
        assert_eq!(int.numeric_value(), Some(2.0));

        let text = Observation::new(DatasetId::PowerSystemState, json!("2"), None, None);
        assert_eq!(text.numeric_value(), None);

        let null = Observation::new(DatasetId::PowerSystemState, Value::Null, None, None);
        assert_eq!(null.numeric_value(), None);
    }
}
