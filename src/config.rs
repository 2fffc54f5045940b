//! Runtime configuration for `lightd`.
//!
//! Values come from three layers: built-in defaults, `LIGHTS_*` environment
//! variables, then command-line flags (applied by `main`).

use crate::error::ConfigError;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SETTLE_MS: u64 = 150;
pub const DEFAULT_DRIVER_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_GPIO_PROGRAM: &str = "gpio";

/// One addressable output: a lower-cased name bound to a BCM pin number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub name: String,
    pub pin: u32,
}

impl TargetSpec {
    pub fn new(name: &str, pin: u32) -> Self {
        Self {
            name: name.to_lowercase(),
            pin,
        }
    }
}

impl FromStr for TargetSpec {
    type Err = ConfigError;

    /// Parses `NAME=PIN`, e.g. `red=21`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTargetSpec(s.to_string());
        let (name, pin) = s.split_once('=').ok_or_else(invalid)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(invalid());
        }
        let pin = pin.trim().parse::<u32>().map_err(|_| invalid())?;
        Ok(TargetSpec::new(name, pin))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum DriverKind {
    /// Shell out to the `gpio` utility
    Gpio,
    /// Keep output state in memory (no hardware)
    Memory,
}

impl FromStr for DriverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpio" => Ok(DriverKind::Gpio),
            "memory" => Ok(DriverKind::Memory),
            other => Err(ConfigError::UnknownDriver(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Wait between a confirmed read and the status broadcast
    pub settle_delay: Duration,
    /// Upper bound on any single driver call
    pub driver_timeout: Duration,
    pub driver: DriverKind,
    pub gpio_program: String,
    pub targets: Vec<TargetSpec>,
    /// Reply to the origin session when a read fails instead of staying silent
    pub report_driver_errors: bool,
    /// Drive every output OFF right after initialising it
    pub init_outputs_off: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_MS),
            driver_timeout: Duration::from_millis(DEFAULT_DRIVER_TIMEOUT_MS),
            driver: DriverKind::Gpio,
            gpio_program: DEFAULT_GPIO_PROGRAM.to_string(),
            targets: default_targets(),
            report_driver_errors: false,
            init_outputs_off: true,
        }
    }
}

/// The traffic-light set: red on 21, yellow on 20, green on 16.
pub fn default_targets() -> Vec<TargetSpec> {
    vec![
        TargetSpec::new("red", 21),
        TargetSpec::new("yellow", 20),
        TargetSpec::new("green", 16),
    ]
}

impl ServerConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay `LIGHTS_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("LIGHTS_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("LIGHTS_PORT") {
            self.port = parse_env("LIGHTS_PORT", &port)?;
        }
        if let Some(ms) = lookup("LIGHTS_SETTLE_MS") {
            self.settle_delay = Duration::from_millis(parse_env("LIGHTS_SETTLE_MS", &ms)?);
        }
        if let Some(ms) = lookup("LIGHTS_DRIVER_TIMEOUT_MS") {
            self.driver_timeout =
                Duration::from_millis(parse_env("LIGHTS_DRIVER_TIMEOUT_MS", &ms)?);
        }
        if let Some(driver) = lookup("LIGHTS_DRIVER") {
            self.driver = driver.parse()?;
        }
        if let Some(targets) = lookup("LIGHTS_TARGETS") {
            self.targets = targets
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse::<TargetSpec>)
                .collect::<Result<Vec<_>, _>>()?;
        }
        Ok(())
    }

    /// Reject an empty or duplicated target set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        for (i, target) in self.targets.iter().enumerate() {
            if self.targets[..i].iter().any(|t| t.name == target.name) {
                return Err(ConfigError::DuplicateTarget(target.name.clone()));
            }
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        name,
        value: value.to_string(),
    })
}
