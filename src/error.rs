use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Why an inbound payload could not become a [`Command`](crate::protocol::Command).
///
/// Variants that reached the decoding stage keep the decoded payload so the
/// reply can echo it back in `received`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    NotStructuredData(String),

    #[error("unknown action")]
    UnknownAction { received: Value },

    #[error("unknown target")]
    UnknownTarget { received: Value },
}

impl ParseError {
    /// The decoded payload, when there was one.
    pub fn received(&self) -> Option<&Value> {
        match self {
            ParseError::NotStructuredData(_) => None,
            ParseError::UnknownAction { received } | ParseError::UnknownTarget { received } => {
                Some(received)
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("driver call timed out after {0:?}")]
    Timeout(Duration),

    #[error("no output configured for target '{0}'")]
    UnknownTarget(String),

    #[error("simulated fault on '{0}'")]
    Simulated(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("invalid target spec '{0}', expected NAME=PIN")]
    InvalidTargetSpec(String),

    #[error("target '{0}' is configured more than once")]
    DuplicateTarget(String),

    #[error("at least one target must be configured")]
    NoTargets,

    #[error("invalid value for {name}: '{value}'")]
    InvalidEnv { name: &'static str, value: String },

    #[error("unknown driver '{0}', expected 'gpio' or 'memory'")]
    UnknownDriver(String),
}

#[derive(Error, Debug)]
pub enum LightsError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("Protocol error: {0}")]
    Parse(#[from] ParseError),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl LightsError {
    pub fn to_error_code(&self) -> &'static str {
        match self {
            LightsError::Config(_) => "INVALID_CONFIG",
            LightsError::Driver(DriverError::Timeout(_)) => "DRIVER_TIMEOUT",
            LightsError::Driver(_) => "DRIVER_ERROR",
            LightsError::Parse(ParseError::NotStructuredData(_)) => "NOT_JSON",
            LightsError::Parse(ParseError::UnknownAction { .. }) => "UNKNOWN_ACTION",
            LightsError::Parse(ParseError::UnknownTarget { .. }) => "UNKNOWN_TARGET",
            _ => "INTERNAL_ERROR",
        }
    }

    pub fn to_error_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.to_error_code().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LightsError>;
