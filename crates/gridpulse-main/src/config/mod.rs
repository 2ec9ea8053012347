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

mod validation;

pub use validation::{ValidationIssue, ValidationResult, ValidationSeverity};

use anyhow::{Context, Result};
use gridpulse_adapters::DEFAULT_BASE_URL;
use gridpulse_core::{
    DEFAULT_POLL_INTERVAL_MINUTES, DatasetId, InstallationId, MAX_POLL_INTERVAL_MINUTES,
    MIN_POLL_INTERVAL_MINUTES, PollerConfig, RATE_LIMIT_SAFE_INTERVAL,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub installations: Vec<InstallationConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Address of the read-only state API
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Fingrid API root, overridable for testing
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            listen: default_listen(),
            base_url: default_base_url(),
        }
    }
}

/// One Fingrid API key and what to poll with it
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallationConfig {
    #[serde(default = "default_installation_id")]
    pub id: String,

    #[serde(default)]
    pub api_key: String,

    /// Dataset ids ("209") or names ("power_system_state")
    #[serde(default = "default_enabled_sensors")]
    pub enabled_sensors: Vec<String>,

    /// Minutes between polls
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,
}

impl InstallationConfig {
    pub fn new(id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            api_key: api_key.into(),
            enabled_sensors: default_enabled_sensors(),
            update_interval: default_update_interval(),
        }
    }

    pub fn installation_id(&self) -> InstallationId {
        InstallationId::new(self.id.as_str())
    }

    pub fn datasets(&self) -> Result<Vec<DatasetId>> {
        self.enabled_sensors
            .iter()
            .map(|sensor| {
                sensor
                    .parse::<DatasetId>()
                    .with_context(|| format!("Installation '{}'", self.id))
            })
            .collect()
    }

    pub fn to_poller_config(&self) -> Result<PollerConfig> {
        Ok(PollerConfig::new(self.api_key.as_str())
            .with_datasets(self.datasets()?)
            .with_poll_interval_minutes(self.update_interval))
    }
}

impl fmt::Debug for InstallationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstallationConfig")
            .field("id", &self.id)
            .field("api_key", &"<redacted>")
            .field("enabled_sensors", &self.enabled_sensors)
            .field("update_interval", &self.update_interval)
            .finish()
    }
}

/// Flat add-on options: a single installation, no `installations` table
#[derive(Debug, Deserialize)]
struct AddonOptions {
    #[serde(flatten)]
    installation: InstallationConfig,
    #[serde(flatten)]
    system: SystemConfig,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_listen() -> String {
    "127.0.0.1:8099".to_owned()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_owned()
}

fn default_installation_id() -> String {
    "default".to_owned()
}

fn default_enabled_sensors() -> Vec<String> {
    vec![DatasetId::PowerSystemState.as_str().to_owned()]
}

fn default_update_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MINUTES
}

/// Where the configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Environment,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Environment => f.write_str("defaults with environment overrides"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: ConfigSource,
}

/// Candidate files, tried in order after an explicit `--config`
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub addon_options: PathBuf,
    pub toml: PathBuf,
    pub json: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            addon_options: PathBuf::from("/data/options.json"),
            toml: PathBuf::from("gridpulse.toml"),
            json: PathBuf::from("gridpulse.json"),
        }
    }
}

impl AppConfig {
    /// Load from `explicit`, the add-on options, gridpulse.toml or
    /// gridpulse.json, falling back to defaults plus environment variables
    pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
        Self::load_with(explicit, &ConfigPaths::default(), |name| {
            std::env::var(name).ok()
        })
    }

    pub fn load_with(
        explicit: Option<&Path>,
        paths: &ConfigPaths,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<LoadedConfig> {
        if let Some(path) = explicit {
            let config = Self::from_file(path)?;
            return Ok(LoadedConfig {
                config,
                source: ConfigSource::File(path.to_path_buf()),
            });
        }

        for path in [&paths.addon_options, &paths.toml, &paths.json] {
            if path.is_file() {
                let config = Self::from_file(path)?;
                return Ok(LoadedConfig {
                    config,
                    source: ConfigSource::File(path.clone()),
                });
            }
        }

        Ok(LoadedConfig {
            config: Self::from_env_with(lookup),
            source: ConfigSource::Environment,
        })
    }

    /// Parse a TOML or JSON file, chosen by extension
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
        } else {
            Self::from_json_str(&contents)
                .with_context(|| format!("Failed to parse {}", path.display()))
        }
    }

    /// JSON accepts both the full layout and flat add-on options
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(contents)?;
        if value.get("installations").is_some() || value.get("system").is_some() {
            return Ok(serde_json::from_value(value)?);
        }

        let options: AddonOptions = serde_json::from_value(value)?;
        Ok(Self {
            system: options.system,
            installations: vec![options.installation],
        })
    }

    /// Defaults plus `FINGRID_API_KEY`, `GRIDPULSE_UPDATE_INTERVAL`,
    /// `GRIDPULSE_ENABLED_SENSORS`, `GRIDPULSE_LISTEN` and `GRIDPULSE_LOG_LEVEL`
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(listen) = lookup("GRIDPULSE_LISTEN") {
            config.system.listen = listen;
        }
        if let Some(level) = lookup("GRIDPULSE_LOG_LEVEL") {
            config.system.log_level = level;
        }
        if let Some(base_url) = lookup("FINGRID_BASE_URL") {
            config.system.base_url = base_url;
        }

        if let Some(api_key) = lookup("FINGRID_API_KEY") {
            let mut installation = InstallationConfig::new(default_installation_id(), api_key);

            if let Some(interval) = lookup("GRIDPULSE_UPDATE_INTERVAL")
                && let Ok(minutes) = interval.trim().parse::<u64>()
            {
                installation.update_interval = minutes;
            }
            if let Some(sensors) = lookup("GRIDPULSE_ENABLED_SENSORS") {
                installation.enabled_sensors = sensors
                    .split(',')
                    .map(str::trim)
                    .filter(|sensor| !sensor.is_empty())
                    .map(str::to_owned)
                    .collect();
            }

            config.installations.push(installation);
        }

        config
    }

    pub fn validate_detailed(&self) -> ValidationResult {
        let mut result = ValidationResult::success();

        if !LOG_LEVELS.contains(&self.system.log_level.to_ascii_lowercase().as_str()) {
            result.add_warning(
                "system.log_level",
                format!("Unknown log level '{}', using info", self.system.log_level),
            );
        }
        if self.system.listen.parse::<SocketAddr>().is_err() {
            result.add_error(
                "system.listen",
                format!("'{}' is not a socket address", self.system.listen),
            );
        }

        if self.installations.is_empty() {
            result.add_error(
                "installations",
                "At least one installation with an API key is required",
            );
            return result;
        }

        let mut seen_slugs = HashMap::new();
        for (idx, installation) in self.installations.iter().enumerate() {
            result.merge(validate_installation(idx, installation, &mut seen_slugs));
        }

        result
    }

    pub fn validate(&self) -> Result<()> {
        let result = self.validate_detailed();
        if result.has_errors() {
            let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
            anyhow::bail!("Invalid configuration: {}", errors.join("; "));
        }
        Ok(())
    }

    /// Poller configs keyed by installation, ready for the registry
    pub fn poller_configs(&self) -> Result<BTreeMap<InstallationId, PollerConfig>> {
        self.installations
            .iter()
            .map(|installation| {
                Ok((
                    installation.installation_id(),
                    installation.to_poller_config()?,
                ))
            })
            .collect()
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.system
            .listen
            .parse()
            .with_context(|| format!("Invalid listen address '{}'", self.system.listen))
    }
}

fn validate_installation(
    idx: usize,
    installation: &InstallationConfig,
    seen_slugs: &mut HashMap<String, String>,
) -> ValidationResult {
    let mut result = ValidationResult::success();
    let prefix = format!("installations[{idx}]");

    if installation.id.trim().is_empty() {
        result.add_error(format!("{prefix}.id"), "Installation id cannot be empty");
    } else {
        // entity ids are built from the slug, so ids must differ after slugging
        let slug = installation.installation_id().slug();
        match seen_slugs.get(&slug) {
            Some(first) if *first == installation.id => result.add_error(
                format!("{prefix}.id"),
                format!("Duplicate installation id '{}'", installation.id),
            ),
            Some(first) => result.add_error(
                format!("{prefix}.id"),
                format!(
                    "Installation id '{}' clashes with '{first}' (both become '{slug}')",
                    installation.id
                ),
            ),
            None => {
                seen_slugs.insert(slug, installation.id.clone());
            }
        }
    }

    if installation.api_key.trim().is_empty() {
        result.add_error(format!("{prefix}.api_key"), "API key cannot be empty");
    }

    let interval = installation.update_interval;
    if !(MIN_POLL_INTERVAL_MINUTES..=MAX_POLL_INTERVAL_MINUTES).contains(&interval) {
        result.add_error(
            format!("{prefix}.update_interval"),
            format!(
                "Update interval must be between {MIN_POLL_INTERVAL_MINUTES} and \
                 {MAX_POLL_INTERVAL_MINUTES} minutes, got {interval}"
            ),
        );
    } else if interval * 60 < RATE_LIMIT_SAFE_INTERVAL.as_secs() {
        result.add_warning(
            format!("{prefix}.update_interval"),
            format!("Polling every {interval} minute(s) may exceed the Fingrid API rate limit"),
        );
    }

    if installation.enabled_sensors.is_empty() {
        result.add_warning(
            format!("{prefix}.enabled_sensors"),
            "No sensors enabled; nothing will be polled",
        );
    }
    for (sensor_idx, sensor) in installation.enabled_sensors.iter().enumerate() {
        if let Err(e) = sensor.parse::<DatasetId>() {
            result.add_error(format!("{prefix}.enabled_sensors[{sensor_idx}]"), e.to_string());
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn config_with(installation: InstallationConfig) -> AppConfig {
        AppConfig {
            system: SystemConfig::default(),
            installations: vec![installation],
        }
    }

    fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn paths_in(dir: &TempDir) -> ConfigPaths {
        ConfigPaths {
            addon_options: dir.path().join("options.json"),
            toml: dir.path().join("gridpulse.toml"),
            json: dir.path().join("gridpulse.json"),
        }
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.system.log_level, "info");
        assert_eq!(config.system.listen, "127.0.0.1:8099");
        assert_eq!(config.system.base_url, "https://data.fingrid.fi");
        assert!(config.installations.is_empty());

        // an empty config has nothing to poll
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_installation_defaults() {
        let installation = InstallationConfig::new("home", "key");
        let poller = installation.to_poller_config().unwrap();

        assert_eq!(installation.enabled_sensors, vec!["209".to_owned()]);
        assert_eq!(poller.poll_interval_minutes(), 5);
        assert!(config_with(installation).validate().is_ok());
    }

    #[test]
    fn test_validate_interval_bounds() {
        for bad in [0, 61] {
            let mut installation = InstallationConfig::new("home", "key");
            installation.update_interval = bad;

            let result = config_with(installation).validate_detailed();
            assert!(
                result.has_error_for("installations[0].update_interval"),
                "interval {bad}"
            );
        }

        let mut installation = InstallationConfig::new("home", "key");
        installation.update_interval = 2;
        let result = config_with(installation).validate_detailed();

        assert!(result.valid);
        assert!(result.has_warning_for("installations[0].update_interval"));
    }

    #[test]
    fn test_validate_ids_keys_and_sensors() {
        let mut broken = InstallationConfig::new("home", "");
        broken.enabled_sensors = vec!["209".to_owned(), "999".to_owned()];
        let mut empty = InstallationConfig::new("home", "key");
        empty.enabled_sensors.clear();

        let config = AppConfig {
            system: SystemConfig::default(),
            installations: vec![broken, empty],
        };
        let result = config.validate_detailed();

        assert!(result.has_error_for("installations[0].api_key"));
        assert!(result.has_error_for("installations[0].enabled_sensors[1]"));
        assert!(result.has_error_for("installations[1].id"));
        assert!(result.has_warning_for("installations[1].enabled_sensors"));
        assert!(
            config
                .validate()
                .unwrap_err()
                .to_string()
                .contains("Duplicate installation id 'home'")
        );
    }

    #[test]
    fn test_validate_ids_that_slug_alike() {
        for (first, second) in [("Home", "home"), ("home office", "home_office")] {
            let config = AppConfig {
                system: SystemConfig::default(),
                installations: vec![
                    InstallationConfig::new(first, "k1"),
                    InstallationConfig::new(second, "k2"),
                ],
            };
            let result = config.validate_detailed();

            assert!(result.has_error_for("installations[1].id"), "{first} / {second}");
            assert!(!result.has_error_for("installations[0].id"));
            assert!(config.validate().unwrap_err().to_string().contains("clashes with"));
        }
    }

    #[test]
    fn test_validate_listen_address() {
        let mut config = config_with(InstallationConfig::new("home", "key"));
        config.system.listen = "not-an-address".to_owned();

        assert!(config.validate_detailed().has_error_for("system.listen"));
    }

    #[test]
    fn test_toml_file() {
        let dir = TempDir::new().unwrap();
        let path = write_file(
            &dir,
            "custom.toml",
            r#"
[system]
log_level = "debug"
listen = "0.0.0.0:9000"

[[installations]]
id = "home"
api_key = "abc"
enabled_sensors = ["209", "grid_frequency"]
update_interval = 10

[[installations]]
id = "cabin"
api_key = "def"
"#,
        );

        let loaded = AppConfig::load_with(Some(&path), &paths_in(&dir), |_| None).unwrap();
        let config = loaded.config;

        assert_eq!(loaded.source, ConfigSource::File(path));
        assert_eq!(config.system.log_level, "debug");
        assert_eq!(config.installations.len(), 2);
        assert_eq!(config.installations[1].enabled_sensors, vec!["209".to_owned()]);

        let pollers = config.poller_configs().unwrap();
        let home = &pollers[&InstallationId::new("home")];
        assert_eq!(
            home.enabled_datasets.iter().copied().collect::<Vec<_>>(),
            vec![DatasetId::PowerSystemState, DatasetId::GridFrequency]
        );
        assert_eq!(home.poll_interval_minutes(), 10);
    }

    #[test]
    fn test_flat_addon_options() {
        let config = AppConfig::from_json_str(
            r#"{"api_key": "abc", "enabled_sensors": ["209", "336"], "update_interval": 15}"#,
        )
        .unwrap();

        assert_eq!(config.installations.len(), 1);
        assert_eq!(config.installations[0].id, "default");
        assert_eq!(config.installations[0].update_interval, 15);
        assert_eq!(config.system.listen, "127.0.0.1:8099");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_addon_options_take_precedence() {
        let dir = TempDir::new().unwrap();
        write_file(&dir, "options.json", r#"{"api_key": "from-addon"}"#);
        write_file(
            &dir,
            "gridpulse.toml",
            "[[installations]]\nid = \"toml\"\napi_key = \"from-toml\"\n",
        );

        let loaded = AppConfig::load_with(None, &paths_in(&dir), |_| None).unwrap();

        assert_eq!(loaded.config.installations[0].api_key, "from-addon");
        assert_eq!(
            loaded.source,
            ConfigSource::File(dir.path().join("options.json"))
        );
    }

    #[test]
    fn test_toml_before_json() {
        let dir = TempDir::new().unwrap();
        write_file(
            &dir,
            "gridpulse.toml",
            "[[installations]]\nid = \"toml\"\napi_key = \"from-toml\"\n",
        );
        write_file(
            &dir,
            "gridpulse.json",
            r#"{"installations": [{"id": "json", "api_key": "from-json"}]}"#,
        );

        let loaded = AppConfig::load_with(None, &paths_in(&dir), |_| None).unwrap();
        assert_eq!(loaded.config.installations[0].id, "toml");
    }

    #[test]
    fn test_environment_fallback() {
        let dir = TempDir::new().unwrap();
        let loaded = AppConfig::load_with(None, &paths_in(&dir), |name| match name {
            "FINGRID_API_KEY" => Some("env-key".to_owned()),
            "GRIDPULSE_UPDATE_INTERVAL" => Some("3".to_owned()),
            "GRIDPULSE_ENABLED_SENSORS" => Some("209, 177,".to_owned()),
            "GRIDPULSE_LISTEN" => Some("0.0.0.0:8100".to_owned()),
            _ => None,
        })
        .unwrap();

        assert_eq!(loaded.source, ConfigSource::Environment);
        let config = loaded.config;
        assert_eq!(config.system.listen, "0.0.0.0:8100");
        assert_eq!(config.installations[0].api_key, "env-key");
        assert_eq!(config.installations[0].update_interval, 3);
        assert_eq!(
            config.installations[0].enabled_sensors,
            vec!["209".to_owned(), "177".to_owned()]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_without_key_has_no_installations() {
        let config = AppConfig::from_env_with(|_| None);
        assert!(config.installations.is_empty());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(b"[[installations]\nbroken").unwrap();

        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let installation = InstallationConfig::new("home", "very-secret");
        assert!(!format!("{installation:?}").contains("very-secret"));
    }
}
