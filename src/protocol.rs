//! Wire protocol: inbound commands and outbound messages.
//!
//! Inbound frames are JSON objects such as
//! `{"action": "set", "target": "red", "value": true}`. Outbound frames are
//! always `{"message": "...", "received": <inbound payload>}`, with
//! `received` omitted when there is nothing to echo.

use crate::error::ParseError;
use crate::registry::TargetRegistry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WELCOME: &str = "Welcome!";
pub const GOODBYE: &str = "Goodbye!";
pub const NOT_JSON: &str = "Only JSON is currently supported.";
pub const UNKNOWN_ACTION: &str = "Sorry. Unknown action given.";
pub const ECHO: &str = "ECHO Echo echo ....";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Get,
    Set,
    Echo,
}

impl Action {
    fn parse(s: &str) -> Option<Self> {
        [Action::Get, Action::Set, Action::Echo]
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(s))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Get => "get",
            Action::Set => "set",
            Action::Echo => "echo",
        }
    }
}

/// A validated request. Get and Set always carry a resolved target.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub action: Action,
    pub target: Option<TargetRef>,
    pub value: bool,
    pub raw: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TargetRef {
    /// Registry name (lower case)
    pub name: String,
    /// The name as the client spelled it, used in replies
    pub label: String,
}

/// Validate `payload` against the registry's configured targets.
///
/// Nothing is mutated here: a request that fails to parse never reaches a
/// driver.
pub fn parse_command(payload: &[u8], registry: &TargetRegistry) -> Result<Command, ParseError> {
    let raw: Value = serde_json::from_slice(payload)
        .map_err(|e| ParseError::NotStructuredData(e.to_string()))?;

    let Some(action) = raw
        .get("action")
        .and_then(Value::as_str)
        .and_then(Action::parse)
    else {
        return Err(ParseError::UnknownAction { received: raw });
    };

    match action {
        Action::Echo => Ok(Command {
            action,
            target: None,
            value: false,
            raw,
        }),
        Action::Get | Action::Set => {
            let resolved = raw.get("target").and_then(Value::as_str).and_then(|label| {
                registry.resolve(label).map(|name| TargetRef {
                    name: name.to_string(),
                    label: label.to_string(),
                })
            });
            let Some(target) = resolved else {
                return Err(ParseError::UnknownTarget { received: raw });
            };
            let value = action == Action::Set && loosely_true(raw.get("value"));
            Ok(Command {
                action,
                target: Some(target),
                value,
                raw,
            })
        },
    }
}

/// Loose equality with `true`: JSON `true`, the number 1, or a string that
/// reads as the number 1. Anything else, including the string `"true"`, is
/// off.
pub fn loosely_true(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() == Some(1.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok() == Some(1.0),
        _ => false,
    }
}

pub fn status_word(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received: Option<Value>,
}

impl OutboundMessage {
    pub fn new(message: impl Into<String>, received: Option<Value>) -> Self {
        Self {
            message: message.into(),
            received,
        }
    }

    pub fn welcome() -> Self {
        Self::new(WELCOME, None)
    }

    pub fn goodbye() -> Self {
        Self::new(GOODBYE, None)
    }

    pub fn not_json() -> Self {
        Self::new(NOT_JSON, None)
    }

    pub fn unknown_action(received: Value) -> Self {
        Self::new(UNKNOWN_ACTION, Some(received))
    }

    pub fn unknown_target(names: &[String], received: Value) -> Self {
        let message = format!(
            "Error, unknown target given. Target should be {}.",
            quoted_choice(names)
        );
        Self::new(message, Some(received))
    }

    pub fn echo(received: Value) -> Self {
        Self::new(ECHO, Some(received))
    }

    pub fn current_status(label: &str, on: bool, received: Value) -> Self {
        let message = format!("Current status of {} light is {}.", label, status_word(on));
        Self::new(message, Some(received))
    }

    pub fn set_status(label: &str, on: bool, received: Value) -> Self {
        let message = format!("Successfully set {} light to {}.", label, status_word(on));
        Self::new(message, Some(received))
    }

    pub fn read_failed(label: &str, received: Value) -> Self {
        Self::new(format!("Error reading {} light.", label), Some(received))
    }

    /// Reply for a request that failed validation.
    pub fn for_parse_error(err: ParseError, names: &[String]) -> Self {
        match err {
            ParseError::NotStructuredData(_) => Self::not_json(),
            ParseError::UnknownAction { received } => Self::unknown_action(received),
            ParseError::UnknownTarget { received } => Self::unknown_target(names, received),
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of a String and a serde_json::Value cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"message\":{:?}}}", self.message))
    }
}

/// `'a'`, `'a' or 'b'`, `'a', 'b', or 'c'`.
fn quoted_choice(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [only] => only.clone(),
        [a, b] => format!("{} or {}", a, b),
        [rest @ .., last] => format!("{}, or {}", rest.join(", "), last),
    }
}
