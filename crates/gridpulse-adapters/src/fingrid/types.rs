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

use gridpulse_core::{DatasetId, Observation};
use serde::Deserialize;
use serde_json::Value;

/// Body of `GET /api/datasets/{id}/data`
///
/// Only the fields the poller reads are modelled; pagination metadata is ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub data: Option<Vec<ApiDataPoint>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDataPoint {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
}

impl ApiResponse {
    /// Newest data point, if the page carried any
    pub fn into_latest(self, dataset: DatasetId) -> Option<Observation> {
        self.data?
            .into_iter()
            .next()
            .map(|point| point.into_observation(dataset))
    }
}

impl ApiDataPoint {
    pub fn into_observation(self, dataset: DatasetId) -> Observation {
        Observation::new(dataset, self.value, self.start_time, self.end_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_data_page() {
        let body = json!({
            "data": [
                {
                    "datasetId": 209,
                    "startTime": "2025-05-01T10:00:00.000Z",
                    "endTime": "2025-05-01T10:03:00.000Z",
                    "value": 1
                }
            ],
            "pagination": { "total": 1, "currentPage": 1 }
        });

        let response: ApiResponse = serde_json::from_value(body).unwrap();
        let observation = response.into_latest(DatasetId::PowerSystemState).unwrap();

        assert_eq!(observation.value, json!(1));
        assert_eq!(observation.timestamp(), Some("2025-05-01T10:03:00.000Z"));
    }

    #[test]
    fn test_missing_value_becomes_null() {
        let point: ApiDataPoint =
            serde_json::from_value(json!({ "startTime": "2025-05-01T10:00:00.000Z" })).unwrap();

        assert_eq!(point.value, Value::Null);
        assert_eq!(point.end_time, None);
    }

    #[test]
    fn test_empty_or_missing_data() {
        let empty: ApiResponse = serde_json::from_value(json!({ "data": [] })).unwrap();
        assert!(empty.into_latest(DatasetId::GridFrequency).is_none());

        let missing: ApiResponse = serde_json::from_value(json!({ "error": "nope" })).unwrap();
        assert!(missing.into_latest(DatasetId::GridFrequency).is_none());
    }
}
