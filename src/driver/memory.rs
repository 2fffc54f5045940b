//! In-memory driver used with `--driver memory` and throughout the tests.

use super::DeviceDriver;
use crate::error::DriverError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// A driver call as observed by [`MemoryDriver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Initialize(String),
    Read(String),
    Write(String, bool),
}

/// Simulated output lines. Unknown targets spring into existence low.
#[derive(Debug, Default)]
pub struct MemoryDriver {
    levels: Mutex<HashMap<String, bool>>,
    faulty: Mutex<HashSet<String>>,
    calls: Mutex<Vec<DriverCall>>,
    latency: Option<Duration>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make every subsequent call for `target` fail.
    pub fn fail(&self, target: &str) {
        lock(&self.faulty).insert(target.to_string());
    }

    pub fn recover(&self, target: &str) {
        lock(&self.faulty).remove(target);
    }

    /// Set a line level behind the engine's back, as a hardware change would.
    pub fn set_level(&self, target: &str, value: bool) {
        lock(&self.levels).insert(target.to_string(), value);
    }

    pub fn level(&self, target: &str) -> Option<bool> {
        lock(&self.levels).get(target).copied()
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.calls).clone()
    }

    async fn enter(&self, call: DriverCall) -> Result<(), DriverError> {
        let target = match &call {
            DriverCall::Initialize(t) | DriverCall::Read(t) | DriverCall::Write(t, _) => t.clone(),
        };
        lock(&self.calls).push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if lock(&self.faulty).contains(&target) {
            return Err(DriverError::Simulated(target));
        }
        Ok(())
    }
}

// A poisoned lock only means a test panicked mid-call; the data is still usable.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl DeviceDriver for MemoryDriver {
    async fn initialize(&self, target: &str) -> Result<(), DriverError> {
        self.enter(DriverCall::Initialize(target.to_string()))
            .await?;
        lock(&self.levels).entry(target.to_string()).or_insert(false);
        Ok(())
    }

    async fn read(&self, target: &str) -> Result<String, DriverError> {
        self.enter(DriverCall::Read(target.to_string())).await?;
        let on = self.level(target).unwrap_or(false);
        Ok(if on { "1\n" } else { "0\n" }.to_string())
    }

    async fn write(&self, target: &str, value: bool) -> Result<(), DriverError> {
        self.enter(DriverCall::Write(target.to_string(), value))
            .await?;
        self.set_level(target, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read() {
        let driver = MemoryDriver::new();
        driver.initialize("red").await.unwrap();
        assert_eq!(driver.read("red").await.unwrap(), "0\n");

        driver.write("red", true).await.unwrap();
        assert_eq!(driver.read("red").await.unwrap(), "1\n");
    }

    #[tokio::test]
    async fn test_faults_are_per_target() {
        let driver = MemoryDriver::new();
        driver.fail("red");

        assert!(matches!(
            driver.write("red", true).await,
            Err(DriverError::Simulated(t)) if t == "red"
        ));
        assert_eq!(driver.level("red"), None);
        assert!(driver.write("green", true).await.is_ok());

        driver.recover("red");
        assert!(driver.write("red", true).await.is_ok());
    }

    #[tokio::test]
    async fn test_calls_are_recorded_in_order() {
        let driver = MemoryDriver::new();
        driver.initialize("red").await.unwrap();
        driver.write("red", false).await.unwrap();
        let _ = driver.read("red").await;

        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Initialize("red".into()),
                DriverCall::Write("red".into(), false),
                DriverCall::Read("red".into()),
            ]
        );
    }
}
