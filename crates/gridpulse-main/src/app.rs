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

//! Wires config, Fingrid clients, installations and the state API together

use anyhow::{Context, Result};
use gridpulse_adapters::{ClientError, FingridClient, KeyValidation};
use gridpulse_core::{
    ApplyReport, BackoffPolicy, Coordinator, DEFAULT_PACING_DELAY, DatasetSource, EntityRecord,
    EntityRegistry, Installation, InstallationId, InstallationRegistry, PollerConfig,
    SourceFactory,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{ApiState, router};
use crate::cli::{Cli, Command, ConfigArgs, RunArgs, ValidateKeyArgs};
use crate::config::{AppConfig, LoadedConfig};

pub async fn dispatch(cli: Cli) -> Result<ExitCode> {
    match cli.into_command() {
        Command::Run(args) => run(args).await.map(|()| ExitCode::SUCCESS),
        Command::ValidateKey(args) => validate_key(args).await,
        Command::Once(args) => once(&args).await,
        Command::CheckConfig(args) => check_config(&args),
    }
}

/// `RUST_LOG` wins over the configured level
pub fn init_tracing(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,reqwest=warn")));

    // a subscriber may already be installed (tests, repeated dispatch)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// One `FingridClient` per installation, all against `base_url`
pub fn source_factory(base_url: impl Into<String>) -> SourceFactory {
    let base_url = base_url.into();
    Arc::new(move |config: &PollerConfig| -> Result<Arc<dyn DatasetSource>> {
        let client = FingridClient::with_base_url(base_url.as_str(), config.api_key.as_str())?;
        Ok(Arc::new(client) as Arc<dyn DatasetSource>)
    })
}

fn load(args: &ConfigArgs) -> Result<LoadedConfig> {
    AppConfig::load(args.config.as_deref())
}

/// Log warnings and refuse to continue on errors
fn ensure_valid(config: &AppConfig) -> Result<()> {
    let report = config.validate_detailed();
    for warning in &report.warnings {
        warn!(field = %warning.field, "{}", warning.message);
    }
    config.validate()
}

async fn run(args: RunArgs) -> Result<()> {
    let LoadedConfig { mut config, source } = load(&args.config)?;
    init_tracing(&config.system.log_level);
    info!(source = %source, "Configuration loaded");

    if let Some(listen) = &args.listen {
        config.system.listen.clone_from(listen);
    }
    ensure_valid(&config)?;

    let entities = EntityRegistry::new();
    let mut registry = InstallationRegistry::new(
        source_factory(config.system.base_url.as_str()),
        entities.clone(),
    );

    let desired = screen_api_keys(&config, &registry).await?;
    log_report(&registry.apply(desired).await);
    if registry.is_empty() {
        warn!("No installation is running; the state API will stay empty until reload");
    }

    let addr = config.listen_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind state API to {addr}"))?;
    info!(addr = %addr, "State API listening");

    let app = router(ApiState { entities });
    let mut server = tokio::spawn(async move { axum::serve(listener, app).await });
    let mut signals = Signals::new()?;

    let outcome = loop {
        tokio::select! {
            signal = signals.next() => match signal {
                Signal::Shutdown => break Ok(()),
                Signal::Reload => reload(&args, &config, &mut registry).await,
            },
            joined = &mut server => {
                break match joined {
                    Ok(Ok(())) => Err(anyhow::anyhow!("State API server stopped unexpectedly")),
                    Ok(Err(e)) => Err(anyhow::Error::new(e).context("State API server failed")),
                    Err(e) => Err(anyhow::Error::new(e).context("State API task panicked")),
                };
            }
        }
    };

    info!("Shutting down");
    server.abort();
    registry.shutdown_all().await;
    outcome
}

/// Re-read the config and converge the running installations onto it
///
/// Listen address, base URL and log level only change on restart.
async fn reload(args: &RunArgs, running: &AppConfig, registry: &mut InstallationRegistry) {
    info!("Reloading configuration");

    let mut config = match load(&args.config) {
        Ok(loaded) => loaded.config,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Reload failed, keeping current installations");
            return;
        }
    };
    if let Some(listen) = &args.listen {
        config.system.listen.clone_from(listen);
    }
    if let Err(e) = ensure_valid(&config) {
        error!(error = %e, "Reload failed, keeping current installations");
        return;
    }
    if config.system != running.system {
        warn!("System settings changed; restart to apply them");
    }

    match screen_api_keys(&config, registry).await {
        Ok(desired) => log_report(&registry.apply(desired).await),
        Err(e) => error!(error = %e, "Reload failed, keeping current installations"),
    }
}

/// Poller configs for every installation whose API key is not rejected
///
/// Keys that are already running unchanged are not re-checked. A rejected
/// key for a running installation keeps the previous config.
async fn screen_api_keys(
    config: &AppConfig,
    registry: &InstallationRegistry,
) -> Result<BTreeMap<InstallationId, PollerConfig>> {
    let mut desired = BTreeMap::new();

    for (id, poller) in config.poller_configs()? {
        let running = registry.get(&id).map(Installation::config);
        if running
            .as_ref()
            .is_some_and(|current| current.api_key == poller.api_key)
        {
            desired.insert(id, poller);
            continue;
        }

        match check_key(&config.system.base_url, &poller.api_key).await? {
            KeyValidation::Accepted => {
                desired.insert(id, poller);
            }
            KeyValidation::CannotConnect => {
                warn!(installation = %id, "Could not verify API key, starting anyway");
                desired.insert(id, poller);
            }
            KeyValidation::Rejected => {
                error!(
                    installation = %id,
                    "Fingrid rejected the API key; installation not started"
                );
                if let Some(current) = running {
                    desired.insert(id, current);
                }
            }
        }
    }

    Ok(desired)
}

async fn check_key(base_url: &str, api_key: &str) -> Result<KeyValidation> {
    match FingridClient::with_base_url(base_url, api_key) {
        Ok(client) => Ok(client.validate_api_key().await),
        Err(ClientError::MissingApiKey) => Ok(KeyValidation::Rejected),
        Err(e @ ClientError::HttpClient(_)) => Err(e.into()),
    }
}

fn log_report(report: &ApplyReport) {
    info!(
        added = report.added.len(),
        removed = report.removed.len(),
        reconfigured = report.reconfigured.len(),
        unchanged = report.unchanged.len(),
        failed = report.failed.len(),
        "Installations applied"
    );
}

enum Signal {
    Shutdown,
    Reload,
}

/// Ctrl-C and SIGTERM stop the process, SIGHUP reloads the config
struct Signals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                hangup: signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?,
                terminate: signal(SignalKind::terminate())
                    .context("Failed to install SIGTERM handler")?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    async fn next(&mut self) -> Signal {
        #[cfg(unix)]
        {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for Ctrl-C");
                    }
                    Signal::Shutdown
                }
                _ = self.terminate.recv() => Signal::Shutdown,
                _ = self.hangup.recv() => Signal::Reload,
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            Signal::Shutdown
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OnceFailure {
    pub installation: InstallationId,
    pub error: String,
}

/// Result of a single poll of every configured installation
#[derive(Debug, Clone, Default, Serialize)]
pub struct OnceReport {
    pub entities: Vec<EntityRecord>,
    pub failures: Vec<OnceFailure>,
}

/// Run one cycle per installation, without a poll loop
pub async fn run_once(config: &AppConfig, pacing_delay: Duration) -> Result<OnceReport> {
    let factory = source_factory(config.system.base_url.as_str());
    let entities = EntityRegistry::new();
    let mut failures = Vec::new();

    for (id, poller) in config.poller_configs()? {
        let source = match factory(&poller) {
            Ok(source) => source,
            Err(e) => {
                failures.push(OnceFailure {
                    installation: id,
                    error: e.to_string(),
                });
                continue;
            }
        };

        entities.register_installation(&id, &poller.enabled_datasets);
        let coordinator = Coordinator::new(source, poller).with_pacing_delay(pacing_delay);
        let installation = Installation::new(id.clone(), coordinator, BackoffPolicy::default());

        if let Err(e) = installation.refresh_now().await {
            failures.push(OnceFailure {
                installation: id.clone(),
                error: e.to_string(),
            });
        }
        entities.publish(&id, installation.snapshot().as_deref(), &installation.health());
    }

    Ok(OnceReport {
        entities: entities.list(),
        failures,
    })
}

async fn once(args: &ConfigArgs) -> Result<ExitCode> {
    let LoadedConfig { config, source } = load(args)?;
    init_tracing(&config.system.log_level);
    info!(source = %source, "Configuration loaded");
    ensure_valid(&config)?;

    let report = run_once(&config, DEFAULT_PACING_DELAY).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(if report.failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn check_config(args: &ConfigArgs) -> Result<ExitCode> {
    let LoadedConfig { config, source } = load(args)?;
    let report = config.validate_detailed();

    println!("Configuration source: {source}");
    print!("{report}");
    if report.errors.is_empty() && report.warnings.is_empty() {
        println!();
    }

    Ok(if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn validate_key(args: ValidateKeyArgs) -> Result<ExitCode> {
    init_tracing("warn");
    let result = check_key(&args.base_url, &args.api_key).await?;
    println!("{result}");

    Ok(if result.is_accepted() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
