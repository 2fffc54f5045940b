//! Driver backed by the WiringPi `gpio` command-line utility.
//!
//! Pins are addressed in BCM numbering (`gpio -g ...`).

use super::DeviceDriver;
use crate::config::TargetSpec;
use crate::error::DriverError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::process::Command;

pub struct GpioUtilityDriver {
    program: String,
    pins: HashMap<String, u32>,
}

impl GpioUtilityDriver {
    pub fn new(program: impl Into<String>, targets: &[TargetSpec]) -> Self {
        Self {
            program: program.into(),
            pins: targets.iter().map(|t| (t.name.clone(), t.pin)).collect(),
        }
    }

    fn pin(&self, target: &str) -> Result<u32, DriverError> {
        self.pins
            .get(target)
            .copied()
            .ok_or_else(|| DriverError::UnknownTarget(target.to_string()))
    }

    /// Argument list for `gpio`, without the program name.
    fn mode_args(pin: u32) -> Vec<String> {
        vec!["-g".into(), "mode".into(), pin.to_string(), "out".into()]
    }

    fn read_args(pin: u32) -> Vec<String> {
        vec!["-g".into(), "read".into(), pin.to_string()]
    }

    fn write_args(pin: u32, value: bool) -> Vec<String> {
        let level = if value { "1" } else { "0" };
        vec!["-g".into(), "write".into(), pin.to_string(), level.into()]
    }

    async fn run(&self, args: Vec<String>) -> Result<String, DriverError> {
        let command_line = format!("{} {}", self.program, args.join(" "));
        tracing::debug!("Running: {}", command_line);

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| DriverError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DriverError::Failed {
                command: command_line,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DeviceDriver for GpioUtilityDriver {
    async fn initialize(&self, target: &str) -> Result<(), DriverError> {
        let pin = self.pin(target)?;
        self.run(Self::mode_args(pin)).await.map(|_| ())
    }

    async fn read(&self, target: &str) -> Result<String, DriverError> {
        let pin = self.pin(target)?;
        self.run(Self::read_args(pin)).await
    }

    async fn write(&self, target: &str, value: bool) -> Result<(), DriverError> {
        let pin = self.pin(target)?;
        self.run(Self::write_args(pin, value)).await.map(|_| ())
    }
}
