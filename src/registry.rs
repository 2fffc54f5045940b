//! Target registry: the fixed set of outputs and their last known state.
//!
//! The set of names is decided at construction and never changes. Each
//! target's state sits behind its own lock, so writers to different targets
//! never contend and a single target's state is always updated atomically.

use crate::driver::DeviceDriver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Target {
    pub name: String,
    pub known_state: bool,
    /// When `known_state` was last written; `None` until the first update
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
struct TargetState {
    on: bool,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct TargetRegistry {
    /// Canonical (lower-case) names in configured order
    names: Vec<String>,
    states: HashMap<String, RwLock<TargetState>>,
}

impl TargetRegistry {
    /// Build a registry over `names`. Names are lower-cased; repeats are
    /// collapsed into the first occurrence.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ordered = Vec::new();
        let mut states = HashMap::new();
        for name in names {
            let name = name.as_ref().to_lowercase();
            if states.contains_key(&name) {
                continue;
            }
            states.insert(name.clone(), RwLock::new(TargetState::default()));
            ordered.push(name);
        }
        Self {
            names: ordered,
            states,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Canonical name for `name`, matched case-insensitively.
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let wanted = name.to_lowercase();
        self.names
            .iter()
            .find(|n| **n == wanted)
            .map(String::as_str)
    }

    pub fn has(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    pub async fn get(&self, name: &str) -> Option<Target> {
        let canonical = self.resolve(name)?;
        let state = *self.states.get(canonical)?.read().await;
        Some(Target {
            name: canonical.to_string(),
            known_state: state.on,
            updated_at: state.updated_at,
        })
    }

    /// Record a new state for `name`. Returns `false` if the name is unknown.
    pub async fn set_known_state(&self, name: &str, value: bool) -> bool {
        let Some(slot) = self.resolve(name).and_then(|n| self.states.get(n)) else {
            return false;
        };
        let mut state = slot.write().await;
        state.on = value;
        state.updated_at = Some(Utc::now());
        true
    }

    /// Snapshot of every target in configured order.
    pub async fn snapshot(&self) -> Vec<Target> {
        let mut targets = Vec::with_capacity(self.names.len());
        for name in &self.names {
            if let Some(target) = self.get(name).await {
                targets.push(target);
            }
        }
        targets
    }

    /// Initialise every target in order, one after another. A failure is
    /// logged and the next target is still attempted. With `drive_off`, each
    /// successfully initialised target is then written low.
    ///
    /// Returns the number of targets that initialised cleanly.
    pub async fn initialize_all(&self, driver: &dyn DeviceDriver, drive_off: bool) -> usize {
        tracing::info!("Initializing {} output(s)", self.names.len());
        let mut ready = 0;

        for name in &self.names {
            if let Err(e) = driver.initialize(name).await {
                tracing::error!(target_name = %name, error = %e, "Error initializing output");
                continue;
            }
            tracing::info!(target_name = %name, "Successfully initialized output");

            if drive_off {
                match driver.write(name, false).await {
                    Ok(()) => {
                        self.set_known_state(name, false).await;
                    },
                    Err(e) => {
                        tracing::error!(target_name = %name, error = %e, "Error setting output OFF");
                        continue;
                    },
                }
            }
            ready += 1;
        }

        ready
    }
}
