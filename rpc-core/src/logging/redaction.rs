//! Sensitive data redaction for log output.

use std::collections::HashSet;

use serde_json::Value;

use super::config::LogConfig;

/// Replaces the values of sensitive keys anywhere in a JSON value.
///
/// Field names are lowercased once up front; values are only cloned along
/// paths that actually change.
#[derive(Debug, Clone)]
pub struct RedactionEngine {
    sensitive_fields_lower: HashSet<String>,
    replacement: String,
}

impl RedactionEngine {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            sensitive_fields_lower: config
                .redacted_fields
                .iter()
                .map(|s| s.to_lowercase())
                .collect(),
            replacement: config.redaction_replacement.clone(),
        }
    }

    pub fn redact(&self, value: &Value) -> Value {
        self.redact_changed(value).unwrap_or_else(|| value.clone())
    }

    fn is_sensitive(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.sensitive_fields_lower
            .iter()
            .any(|field| key.contains(field.as_str()))
    }

    /// `None` when nothing under `value` needed redaction.
    fn redact_changed(&self, value: &Value) -> Option<Value> {
        match value {
            Value::Object(map) => {
                let mut changed = false;
                let redacted = map
                    .iter()
                    .map(|(key, val)| {
                        let new_val = if self.is_sensitive(key) {
                            changed = true;
                            Value::String(self.replacement.clone())
                        } else if let Some(inner) = self.redact_changed(val) {
                            changed = true;
                            inner
                        } else {
                            val.clone()
                        };
                        (key.clone(), new_val)
                    })
                    .collect();
                changed.then_some(Value::Object(redacted))
            }
            Value::Array(items) => {
                let mut changed = false;
                let redacted = items
                    .iter()
                    .map(|item| match self.redact_changed(item) {
                        Some(inner) => {
                            changed = true;
                            inner
                        }
                        None => item.clone(),
                    })
                    .collect();
                changed.then_some(Value::Array(redacted))
            }
            _ => None,
        }
    }
}

/// Redacts sensitive fields from a JSON value using `config`'s field list.
pub fn redact_value(value: &Value, config: &LogConfig) -> Value {
    RedactionEngine::new(config).redact(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_nested_keys_case_insensitively() {
        let config = LogConfig::new();
        let input = json!({
            "user": {"name": "ada", "Password": "hunter2"},
            "items": [{"apiKey": "k"}, {"id": 1}],
        });
        let redacted = redact_value(&input, &config);
        assert_eq!(redacted["user"]["name"], "ada");
        assert_eq!(redacted["user"]["Password"], "[REDACTED]");
        assert_eq!(redacted["items"][0]["apiKey"], "[REDACTED]");
        assert_eq!(redacted["items"][1]["id"], 1);
    }

    #[test]
    fn untouched_values_are_equal() {
        let config = LogConfig::new();
        let input = json!({"a": [1, 2, {"b": "c"}]});
        assert_eq!(redact_value(&input, &config), input);
    }

    #[test]
    fn custom_fields_and_replacement() {
        let config = LogConfig::new()
            .clear_redacted_fields()
            .redact_field("email")
            .with_redaction_replacement("***");
        let redacted = redact_value(&json!({"email": "a@b.c", "password": "p"}), &config);
        assert_eq!(redacted, json!({"email": "***", "password": "p"}));
    }
}
