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

//! Scripted in-memory data source for unit tests

use async_trait::async_trait;
use gridpulse_types::{DatasetId, Observation};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::traits::{DatasetSource, FetchError, FetchResult};

/// Canned response for one dataset
#[derive(Debug, Clone)]
pub enum Scripted {
    Value(Value),
    Empty,
    Auth,
    RateLimited,
    Api(u16),
}

impl Scripted {
    fn produce(&self, dataset: DatasetId) -> FetchResult {
        match self {
            Self::Value(value) => Ok(Some(Observation::new(
                dataset,
                value.clone(),
                Some("2025-05-01T10:00:00.000Z".to_owned()),
                Some("2025-05-01T10:03:00.000Z".to_owned()),
            ))),
            Self::Empty => Ok(None),
            Self::Auth => Err(FetchError::Auth {
                dataset,
                status: 401,
            }),
            Self::RateLimited => Err(FetchError::RateLimited { dataset }),
            Self::Api(status) => Err(FetchError::Api {
                dataset,
                status: *status,
                body: "upstream error".to_owned(),
            }),
        }
    }
}

/// Answers from a per-dataset script and records every call
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<HashMap<DatasetId, Scripted>>,
    calls: Mutex<Vec<DatasetId>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dataset answers with a valid value
    pub fn healthy() -> Self {
        Self::new()
            .with(DatasetId::PowerSystemState, Scripted::Value(json!(1)))
            .with(DatasetId::GridFrequency, Scripted::Value(json!(50.01)))
            .with(DatasetId::ElectricityShortageStatus, Scripted::Value(json!(0)))
    }

    pub fn with(self, dataset: DatasetId, response: Scripted) -> Self {
        self.script.lock().insert(dataset, response);
        self
    }

    pub fn set(&self, dataset: DatasetId, response: Scripted) {
        self.script.lock().insert(dataset, response);
    }

    pub fn calls(&self) -> Vec<DatasetId> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl DatasetSource for ScriptedSource {
    async fn fetch(&self, dataset: DatasetId) -> FetchResult {
        self.calls.lock().push(dataset);
        let response = self
            .script
            .lock()
            .get(&dataset)
            .cloned()
            .unwrap_or(Scripted::Empty);
        response.produce(dataset)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
