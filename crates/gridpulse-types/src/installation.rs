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
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one configured installation (one API key + options)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(String);

impl InstallationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase alphanumerics and underscores, for use inside entity ids
    pub fn slug(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstallationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle of an installation's poll loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InstallationStatus {
    /// Waiting for the first cycle to finish
    Starting,
    /// Last cycle published a snapshot
    Ready,
    /// Last cycle produced no data at all; retrying with backoff
    UpdateFailed {
        reason: String,
        consecutive_failures: u32,
    },
    /// API key was rejected; polling stopped until reconfigured
    ReauthRequired { reason: String },
    Stopped,
}

impl InstallationStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallationHealth {
    #[serde(flatten)]
    pub status: InstallationStatus,
    pub last_attempt: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
}

impl InstallationHealth {
    pub fn starting() -> Self {
        Self {
            status: InstallationStatus::Starting,
            last_attempt: None,
            last_success: None,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        match &self.status {
            InstallationStatus::UpdateFailed {
                consecutive_failures,
                ..
            } => *consecutive_failures,
            InstallationStatus::Starting
            | InstallationStatus::Ready
            | InstallationStatus::ReauthRequired { .. }
            | InstallationStatus::Stopped => 0,
        }
    }
}

impl Default for InstallationHealth {
    fn default() -> Self {
        Self::starting()
    }
}
