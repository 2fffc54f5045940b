use crate::config::{DriverKind, ServerConfig, TargetSpec};
use clap::Parser;
use std::time::Duration;

const LONG_ABOUT: &str = r#"
lightd - WebSocket control for GPIO outputs

Clients connect over WebSocket and send JSON:
  {"action": "get",  "target": "red"}
  {"action": "set",  "target": "red", "value": true}
  {"action": "echo"}

State changes are broadcast to every connected client. Errors go only
to the client that caused them.

Environment (overridden by flags):
  LIGHTS_HOST, LIGHTS_PORT, LIGHTS_SETTLE_MS, LIGHTS_DRIVER_TIMEOUT_MS,
  LIGHTS_DRIVER, LIGHTS_TARGETS (e.g. "red=21,yellow=20,green=16")
  RUST_LOG overrides the log filter; LIGHTS_LOG_FILE=<path> logs to a file.
"#;

#[derive(Parser, Clone, Debug)]
#[command(name = "lightd")]
#[command(about = "WebSocket control service for named GPIO outputs")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (-v)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output (-q)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output logs in JSON format
    #[arg(long)]
    pub json: bool,

    /// Address to bind (default: 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on (default: 8080)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Delay in milliseconds between a read and its status broadcast (default: 150)
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Upper bound in milliseconds for any single driver call (default: 5000)
    #[arg(long)]
    pub driver_timeout_ms: Option<u64>,

    /// Output driver
    #[arg(long, value_enum)]
    pub driver: Option<DriverKind>,

    /// Program used by the gpio driver (default: gpio)
    #[arg(long)]
    pub gpio_program: Option<String>,

    /// Output as NAME=PIN; repeat to configure several (replaces the default set)
    #[arg(long = "target", value_name = "NAME=PIN", value_parser = parse_target)]
    pub targets: Vec<TargetSpec>,

    /// Tell the requesting client when a read fails instead of staying silent
    #[arg(long)]
    pub report_driver_errors: bool,

    /// Leave outputs as they are at startup instead of switching them off
    #[arg(long)]
    pub no_init_off: bool,
}

fn parse_target(s: &str) -> Result<TargetSpec, String> {
    s.parse().map_err(|e: crate::error::ConfigError| e.to_string())
}

impl Cli {
    /// Apply the flags that were given on top of `config`.
    pub fn apply_to(&self, config: &mut ServerConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(ms) = self.settle_ms {
            config.settle_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.driver_timeout_ms {
            config.driver_timeout = Duration::from_millis(ms);
        }
        if let Some(driver) = self.driver {
            config.driver = driver;
        }
        if let Some(program) = &self.gpio_program {
            config.gpio_program = program.clone();
        }
        if !self.targets.is_empty() {
            config.targets = self.targets.clone();
        }
        if self.report_driver_errors {
            config.report_driver_errors = true;
        }
        if self.no_init_off {
            config.init_outputs_off = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["lightd"]);
        let mut config = ServerConfig::default();
        cli.apply_to(&mut config);
        assert_eq!(config.port, 8080);
        assert_eq!(config.targets.len(), 3);
        assert!(config.init_outputs_off);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "lightd",
            "--port",
            "9000",
            "--settle-ms",
            "0",
            "--driver",
            "memory",
            "--target",
            "Blue=4",
            "--target",
            "white=5",
            "--report-driver-errors",
            "--no-init-off",
        ]);
        let mut config = ServerConfig::default();
        cli.apply_to(&mut config);

        assert_eq!(config.port, 9000);
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.driver, DriverKind::Memory);
        assert_eq!(
            config.targets,
            vec![TargetSpec::new("blue", 4), TargetSpec::new("white", 5)]
        );
        assert!(config.report_driver_errors);
        assert!(!config.init_outputs_off);
    }

    #[test]
    fn test_bad_target_is_rejected() {
        assert!(Cli::try_parse_from(["lightd", "--target", "blue"]).is_err());
    }
}
