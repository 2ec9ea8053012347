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
use gridpulse_core::{DatasetId, DatasetSource, FetchError, FetchResult};
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::errors::{ClientError, ClientResult};
use super::types::ApiResponse;

pub const DEFAULT_BASE_URL: &str = "https://data.fingrid.fi";

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const VALIDATION_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_LIMIT: usize = 150;

/// Outcome of checking an API key against the live API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyValidation {
    Accepted,
    /// 401/403: the key itself is wrong
    Rejected,
    /// Anything else; the key may still be fine
    CannotConnect,
}

impl KeyValidation {
    pub fn is_accepted(self) -> bool {
        self == Self::Accepted
    }
}

impl fmt::Display for KeyValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::CannotConnect => "CannotConnect",
        })
    }
}

/// Fingrid open-data REST API client
#[derive(Clone)]
pub struct FingridClient {
    base_url: String,
    api_key: String,
    client: Client,
}

impl FingridClient {
    /// Client against the public API
    pub fn new(api_key: impl Into<String>) -> ClientResult<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key)
    }

    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> ClientResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ClientError::MissingApiKey);
        }

        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key,
            client,
        })
    }

    /// Build from `FINGRID_API_KEY` (and optionally `FINGRID_BASE_URL`)
    pub fn from_env() -> ClientResult<Self> {
        Self::from_env_with(|name| std::env::var(name).ok())
    }

    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let api_key = lookup("FINGRID_API_KEY").ok_or(ClientError::MissingApiKey)?;
        let base_url = lookup("FINGRID_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());

        info!(base_url = %base_url, "Initializing Fingrid client from environment");
        Self::with_base_url(base_url, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn latest_url(&self, dataset: DatasetId) -> String {
        format!(
            "{}/api/datasets/{}/data?pageSize=1",
            self.base_url,
            dataset.as_str()
        )
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header("x-api-key", &self.api_key)
            .header(ACCEPT, "application/json")
    }

    /// Fetch the newest data point of one dataset
    ///
    /// `Ok(None)` when the request worked but carried nothing usable.
    /// Never retries.
    pub async fn fetch_latest(&self, dataset: DatasetId) -> FetchResult {
        let url = self.latest_url(dataset);
        debug!(dataset = %dataset, url = %url, "Fetching dataset");

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| transport_error(dataset, e))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| transport_error(dataset, e))?;

                match serde_json::from_str::<ApiResponse>(&body) {
                    Ok(page) => {
                        let latest = page.into_latest(dataset);
                        if latest.is_none() {
                            warn!(dataset = %dataset, "Response contained no data points");
                        }
                        Ok(latest)
                    }
                    Err(e) => {
                        warn!(
                            dataset = %dataset,
                            error = %e,
                            body = %truncate(&body),
                            "Unexpected response body"
                        );
                        Ok(None)
                    }
                }
            }
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                error!(dataset = %dataset, status = status.as_u16(), "API key rejected");
                Err(FetchError::Auth {
                    dataset,
                    status: status.as_u16(),
                })
            }
            StatusCode::TOO_MANY_REQUESTS => {
                warn!(dataset = %dataset, "Rate limit exceeded");
                Err(FetchError::RateLimited { dataset })
            }
            status => {
                let body = truncate(&response.text().await.unwrap_or_default());
                error!(dataset = %dataset, status = status.as_u16(), body = %body, "API error");
                Err(FetchError::Api {
                    dataset,
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    /// Setup-time check of the API key against dataset 209
    pub async fn validate_api_key(&self) -> KeyValidation {
        let url = self.latest_url(DatasetId::PowerSystemState);

        let response = match self.get(&url).timeout(VALIDATION_TIMEOUT).send().await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "Cannot connect to Fingrid API");
                return KeyValidation::CannotConnect;
            }
        };

        match response.status() {
            StatusCode::OK => {
                info!("Fingrid API key accepted");
                KeyValidation::Accepted
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(status = response.status().as_u16(), "Fingrid API key rejected");
                KeyValidation::Rejected
            }
            status => {
                let body = truncate(&response.text().await.unwrap_or_default());
                error!(
                    status = status.as_u16(),
                    body = %body,
                    "Unexpected response while validating API key"
                );
                KeyValidation::CannotConnect
            }
        }
    }
}

fn transport_error(dataset: DatasetId, e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        warn!(dataset = %dataset, "Request timed out");
        FetchError::Timeout { dataset }
    } else {
        warn!(dataset = %dataset, error = %e, "Network error");
        FetchError::Network {
            dataset,
            source: Box::new(e),
        }
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(ERROR_BODY_LIMIT).collect()
}

impl fmt::Debug for FingridClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingridClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DatasetSource for FingridClient {
    async fn fetch(&self, dataset: DatasetId) -> FetchResult {
        self.fetch_latest(dataset).await
    }

    fn name(&self) -> &str {
        "fingrid"
    }
}
