use std::collections::HashSet;

use super::types::LogLevel;

const DEFAULT_SLOW_THRESHOLD_MS: u64 = 1_000;

fn default_redacted_fields() -> HashSet<String> {
    [
        "password",
        "secret",
        "token",
        "api_key",
        "apiKey",
        "authorization",
        "credential",
        "private_key",
        "privateKey",
        "ssn",
        "credit_card",
        "creditCard",
        "cvv",
        "pin",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Configuration for the logging middleware.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Threshold for lifecycle messages.
    pub level: LogLevel,
    /// Log the redacted request input.
    pub log_input: bool,
    /// Log the redacted response data.
    pub log_output: bool,
    /// Key fragments to redact (case-insensitive substring match).
    pub redacted_fields: HashSet<String>,
    pub redaction_replacement: String,
    /// Routes that are never logged.
    pub excluded_paths: HashSet<String>,
    /// Warn when a request takes longer than this.
    pub slow_request_threshold_ms: Option<u64>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_input: false,
            log_output: false,
            redacted_fields: default_redacted_fields(),
            redaction_replacement: "[REDACTED]".to_string(),
            excluded_paths: HashSet::new(),
            slow_request_threshold_ms: Some(DEFAULT_SLOW_THRESHOLD_MS),
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_input_logging(mut self, enabled: bool) -> Self {
        self.log_input = enabled;
        self
    }

    #[must_use]
    pub fn with_output_logging(mut self, enabled: bool) -> Self {
        self.log_output = enabled;
        self
    }

    /// Adds a field name to the redaction list.
    #[must_use]
    pub fn redact_field(mut self, field: impl Into<String>) -> Self {
        self.redacted_fields.insert(field.into());
        self
    }

    /// Clears all redacted fields, including the defaults.
    #[must_use]
    pub fn clear_redacted_fields(mut self) -> Self {
        self.redacted_fields.clear();
        self
    }

    #[must_use]
    pub fn with_redaction_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.redaction_replacement = replacement.into();
        self
    }

    #[must_use]
    pub fn exclude_path(mut self, path: impl Into<String>) -> Self {
        self.excluded_paths.insert(path.into());
        self
    }

    #[must_use]
    pub fn with_slow_request_threshold(mut self, threshold_ms: u64) -> Self {
        self.slow_request_threshold_ms = Some(threshold_ms);
        self
    }

    #[must_use]
    pub fn without_slow_request_logging(mut self) -> Self {
        self.slow_request_threshold_ms = None;
        self
    }

    pub fn should_log_path(&self, path: &str) -> bool {
        !self.excluded_paths.contains(path)
    }
}
