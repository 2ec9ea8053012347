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

use clap::{Args, Parser, Subcommand};
use gridpulse_adapters::DEFAULT_BASE_URL;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "gridpulse", version, about = "Fingrid open-data poller")]
#[command(
    long_about = "Polls the Fingrid open-data API for the power system state, grid frequency\n\
    and electricity shortage status, and serves the decoded sensor states as JSON.\n\
    \nExamples:\n  \
    gridpulse                                   # run with gridpulse.toml or env config\n  \
    gridpulse run --config /etc/gridpulse.toml\n  \
    gridpulse validate-key --api-key <KEY>\n  \
    gridpulse once"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// `run` with default arguments when no subcommand is given
    pub fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Run(RunArgs::default()))
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Poll continuously and serve the state API (default)
    Run(RunArgs),

    /// Check an API key against the Fingrid API
    ValidateKey(ValidateKeyArgs),

    /// Run one poll cycle per installation and print the sensor states
    Once(ConfigArgs),

    /// Print the configuration validation report
    CheckConfig(ConfigArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct ConfigArgs {
    /// Configuration file (TOML or JSON)
    #[arg(long, short, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Override the state API listen address
    #[arg(long, value_name = "ADDR")]
    pub listen: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ValidateKeyArgs {
    /// Fingrid API key to check
    #[arg(long, value_name = "KEY")]
    pub api_key: String,

    #[arg(long, default_value = DEFAULT_BASE_URL, hide = true)]
    pub base_url: String,
}
