use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

const SHORT_ID_LENGTH: usize = 8;

/// Unique identifier for a request, used for tracing and correlation.
///
/// UUID v7, so ids sort by creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(uuid::Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v7(uuid::Timestamp::now(uuid::NoContext)))
    }

    /// First few characters, for compact log lines.
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(SHORT_ID_LENGTH).collect()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for RequestId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

/// Verbosity of the logging middleware, from most verbose to off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Whether a message at `target` passes this threshold.
    pub fn should_log(&self, target: LogLevel) -> bool {
        *self != LogLevel::Off && target != LogLevel::Off && target >= *self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_and_parse_back() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().parse::<RequestId>().unwrap(), a);
        assert_eq!(a.short().len(), SHORT_ID_LENGTH);
    }

    #[test]
    fn level_thresholds() {
        assert!(LogLevel::Info.should_log(LogLevel::Warn));
        assert!(LogLevel::Info.should_log(LogLevel::Info));
        assert!(!LogLevel::Info.should_log(LogLevel::Debug));
        assert!(!LogLevel::Off.should_log(LogLevel::Error));
        assert!(LogLevel::Trace.should_log(LogLevel::Trace));
    }
}
