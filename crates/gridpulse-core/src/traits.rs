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

use async_trait::async_trait;
use gridpulse_types::{DatasetId, Observation};
use thiserror::Error;

/// Boxed transport error, so core does not depend on a particular HTTP client
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failure of a single dataset fetch
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Authentication failed for dataset {dataset} (HTTP {status})")]
    Auth { dataset: DatasetId, status: u16 },

    #[error("Rate limit hit for dataset {dataset}")]
    RateLimited { dataset: DatasetId },

    #[error("Error fetching dataset {dataset}: HTTP {status} - {body}")]
    Api {
        dataset: DatasetId,
        status: u16,
        body: String,
    },

    #[error("Network error fetching dataset {dataset}: {source}")]
    Network {
        dataset: DatasetId,
        #[source]
        source: BoxError,
    },

    #[error("Timeout fetching dataset {dataset}")]
    Timeout { dataset: DatasetId },
}

/// How the coordinator reacts to a fetch error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    /// Credentials invalid or revoked: fatal for the cycle
    Auth,
    /// Upstream throttling: dataset absent for this cycle
    RateLimit,
    /// Anything else: dataset absent for this cycle
    Generic,
}

impl FetchError {
    pub fn kind(&self) -> FetchErrorKind {
        match self {
            Self::Auth { .. } => FetchErrorKind::Auth,
            Self::RateLimited { .. } => FetchErrorKind::RateLimit,
            Self::Api { .. } | Self::Network { .. } | Self::Timeout { .. } => {
                FetchErrorKind::Generic
            }
        }
    }

    pub fn dataset(&self) -> DatasetId {
        match self {
            Self::Auth { dataset, .. }
            | Self::RateLimited { dataset }
            | Self::Api { dataset, .. }
            | Self::Network { dataset, .. }
            | Self::Timeout { dataset } => *dataset,
        }
    }
}

/// `Ok(None)` means the request succeeded but carried no usable data point
pub type FetchResult = Result<Option<Observation>, FetchError>;

/// Source of latest observations, one dataset per call
///
/// Implementations must not retry internally; retry and backoff belong to the
/// installation tick loop.
#[async_trait]
pub trait DatasetSource: Send + Sync {
    async fn fetch(&self, dataset: DatasetId) -> FetchResult;

    /// Human-readable name for logs
    fn name(&self) -> &str;
}
