//! `privstreams.toml` configuration.

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use engine::EngineConfig;
use location::LocationLevel;
use serde::{Deserialize, Serialize};
use streams::Capability;

/// File read when `--config` is not given. Missing means defaults.
pub const DEFAULT_CONFIG_FILE: &str = "privstreams.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub engine: EngineConfig,
    pub host: HostConfig,
    pub location: LocationConfig,
    pub logging: LoggingConfig,
}

/// `[host]`: what the console host has granted and how it asks for more.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HostConfig {
    /// Capabilities granted at start-up.
    pub granted: Vec<String>,
    /// Whether the host may prompt for missing capabilities at runtime.
    pub runtime_requests: bool,
    pub prompt: PromptMode,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            granted: Vec::new(),
            runtime_requests: true,
            prompt: PromptMode::Interactive,
        }
    }
}

impl HostConfig {
    /// The configured grants as capabilities.
    pub fn capabilities(&self) -> Result<Vec<Capability>> {
        self.granted
            .iter()
            .map(|name| {
                Capability::new(name.trim())
                    .with_context(|| format!("Invalid capability name {name:?} in [host].granted"))
            })
            .collect()
    }
}

/// How runtime grant requests are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PromptMode {
    /// Grant everything that is asked for.
    Approve,
    /// Refuse everything.
    Deny,
    /// Ask on the terminal.
    Interactive,
}

/// `[location]`: the demo query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocationConfig {
    pub interval_ms: u64,
    pub level: LocationLevel,
    /// Items to receive before stopping.
    pub updates: usize,
    /// Read the last known fix once instead of subscribing to updates.
    pub single_shot: bool,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            level: LocationLevel::Building,
            updates: 5,
            single_shot: false,
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
    /// OTLP gRPC endpoint; spans are exported only when set.
    pub otlp_endpoint: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            format: LogFormat::Pretty,
            otlp_endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl CliConfig {
    /// Loads `path`, or [`DEFAULT_CONFIG_FILE`] when `None`.
    ///
    /// An explicitly named file must exist; a missing default file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path, true),
            None => (Path::new(DEFAULT_CONFIG_FILE), false),
        };

        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.location.interval_ms == 0 {
            bail!("[location].interval_ms must be greater than zero");
        }
        if self.location.updates == 0 {
            bail!("[location].updates must be greater than zero");
        }
        if self.engine.interrupt_reason.trim().is_empty() {
            bail!("[engine].interrupt_reason must not be empty");
        }
        self.host.capabilities()?;
        Ok(())
    }
}
