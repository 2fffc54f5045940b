//! Device drivers: the boundary between the control engine and the outputs.
//!
//! Every call is async and may be slow or fail. The engine only ever talks to
//! a driver through [`DeviceDriver`], usually wrapped in a [`TimeoutDriver`].

pub mod gpio;
pub mod memory;

use crate::error::DriverError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub use gpio::GpioUtilityDriver;
pub use memory::MemoryDriver;

#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Configure the target's line as an output.
    async fn initialize(&self, target: &str) -> Result<(), DriverError>;

    /// Read the raw status text for a target.
    async fn read(&self, target: &str) -> Result<String, DriverError>;

    /// Drive the target's line high (`true`) or low.
    async fn write(&self, target: &str, value: bool) -> Result<(), DriverError>;
}

/// Whether raw driver output reports the line as on.
pub fn reports_on(raw: &str) -> bool {
    raw.contains('1')
}

/// Bounds every call of the wrapped driver. A call that overruns is dropped
/// and surfaces as [`DriverError::Timeout`].
pub struct TimeoutDriver {
    inner: Arc<dyn DeviceDriver>,
    timeout: Duration,
}

impl TimeoutDriver {
    pub fn new(inner: Arc<dyn DeviceDriver>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, DriverError>
    where
        F: std::future::Future<Output = Result<T, DriverError>> + Send,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(DriverError::Timeout(self.timeout)))
    }
}

#[async_trait]
impl DeviceDriver for TimeoutDriver {
    async fn initialize(&self, target: &str) -> Result<(), DriverError> {
        self.bounded(self.inner.initialize(target)).await
    }

    async fn read(&self, target: &str) -> Result<String, DriverError> {
        self.bounded(self.inner.read(target)).await
    }

    async fn write(&self, target: &str, value: bool) -> Result<(), DriverError> {
        self.bounded(self.inner.write(target, value)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_on() {
        assert!(reports_on("1\n"));
        assert!(reports_on(" 1"));
        assert!(!reports_on("0\n"));
        assert!(!reports_on(""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_driver_times_out_slow_calls() {
        let slow = Arc::new(MemoryDriver::new().with_latency(Duration::from_secs(10)));
        let driver = TimeoutDriver::new(slow, Duration::from_secs(1));

        let err = driver.read("red").await.unwrap_err();
        assert!(matches!(err, DriverError::Timeout(d) if d == Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_driver_passes_through_fast_calls() {
        let fast = Arc::new(MemoryDriver::new());
        let driver = TimeoutDriver::new(fast.clone(), Duration::from_secs(1));

        driver.write("red", true).await.unwrap();
        assert_eq!(driver.read("red").await.unwrap(), "1\n");
        assert_eq!(fast.level("red"), Some(true));
    }
}
