//! Control engine: turns validated commands into driver calls, registry
//! updates and outbound messages.
//!
//! Reads are confirmed: the status broadcast waits for the driver and then for
//! the settling delay. Writes are optimistic: the registry and every client
//! are told the commanded state straight away, while the driver call runs in
//! the background and its outcome is only logged.

use crate::driver::{reports_on, DeviceDriver};
use crate::log_driver_outcome;
use crate::protocol::{parse_command, Action, Command, OutboundMessage, TargetRef};
use crate::registry::TargetRegistry;
use crate::sessions::{Dispatch, SessionId};
use std::sync::Arc;
use std::time::Duration;

pub struct ControlEngine {
    registry: Arc<TargetRegistry>,
    driver: Arc<dyn DeviceDriver>,
    settle_delay: Duration,
    report_driver_errors: bool,
}

impl ControlEngine {
    pub fn new(
        registry: Arc<TargetRegistry>,
        driver: Arc<dyn DeviceDriver>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            registry,
            driver,
            settle_delay,
            report_driver_errors: false,
        }
    }

    /// Reply to the origin session when a read fails. Off by default: clients
    /// otherwise hear nothing back for a failed get.
    pub fn with_driver_error_replies(mut self, enabled: bool) -> Self {
        self.report_driver_errors = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<TargetRegistry> {
        &self.registry
    }

    /// Parse and execute one inbound payload from `origin`.
    pub async fn handle_payload(&self, payload: &[u8], origin: SessionId) -> Vec<Dispatch> {
        match parse_command(payload, &self.registry) {
            Ok(command) => self.execute(command, origin).await,
            Err(e) => {
                tracing::warn!(session_id = origin, error = %e, "Rejected request");
                let reply = OutboundMessage::for_parse_error(e, self.registry.names());
                vec![Dispatch::reply(origin, reply)]
            },
        }
    }

    pub async fn execute(&self, command: Command, origin: SessionId) -> Vec<Dispatch> {
        tracing::debug!(
            session_id = origin,
            action = command.action.as_str(),
            "Executing command"
        );
        match (command.action, command.target) {
            (Action::Echo, _) => vec![Dispatch::reply(origin, OutboundMessage::echo(command.raw))],
            (Action::Get, Some(target)) => self.get(target, command.raw, origin).await,
            (Action::Set, Some(target)) => self.set(target, command.value, command.raw).await,
            // The interpreter never builds a get/set without a target.
            (_, None) => vec![Dispatch::reply(
                origin,
                OutboundMessage::unknown_target(self.registry.names(), command.raw),
            )],
        }
    }

    async fn get(&self, target: TargetRef, raw: serde_json::Value, origin: SessionId) -> Vec<Dispatch> {
        let result = self.driver.read(&target.name).await;
        log_driver_outcome!("read", target.name, result);

        match result {
            Ok(status) => {
                let on = reports_on(&status);
                tracing::info!(
                    target_name = %target.name,
                    raw = status.trim(),
                    "Setting stored state to {}",
                    on
                );
                self.registry.set_known_state(&target.name, on).await;
            },
            Err(_) if self.report_driver_errors => {
                return vec![Dispatch::reply(
                    origin,
                    OutboundMessage::read_failed(&target.label, raw),
                )];
            },
            Err(_) => return Vec::new(),
        }

        // Give the hardware time to settle before reporting.
        tokio::time::sleep(self.settle_delay).await;

        // Report whatever is known now; a concurrent set may have landed.
        let on = self
            .registry
            .get(&target.name)
            .await
            .map(|t| t.known_state)
            .unwrap_or(false);
        vec![Dispatch::broadcast(OutboundMessage::current_status(
            &target.label,
            on,
            raw,
        ))]
    }

    async fn set(&self, target: TargetRef, value: bool, raw: serde_json::Value) -> Vec<Dispatch> {
        let driver = Arc::clone(&self.driver);
        let name = target.name.clone();
        tokio::spawn(async move {
            let result = driver.write(&name, value).await;
            log_driver_outcome!("write", name, result);
        });

        self.registry.set_known_state(&target.name, value).await;
        vec![Dispatch::broadcast(OutboundMessage::set_status(
            &target.label,
            value,
            raw,
        ))]
    }
}
