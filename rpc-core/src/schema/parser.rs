//! The pluggable decode contract and the built-in implementation.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::cache::{CompiledSchema, SchemaCache};
use super::{PreparedSchema, SchemaType, TypeSchema};
use crate::validation::{FieldError, is_valid_email};

/// Outcome of decoding: the accepted value, or every violation found.
pub type Decoded = Result<Value, Vec<FieldError>>;

/// Checks a value against a schema.
///
/// Implementations must report all violations, not just the first, and
/// must be safe to call from many requests at once.
pub trait SchemaParser: Send + Sync {
    fn decode(&self, schema: &TypeSchema, value: &Value) -> Decoded;

    /// Decode against a schema whose fingerprint is already known.
    fn decode_prepared(&self, schema: &PreparedSchema, value: &Value) -> Decoded {
        self.decode(schema.schema(), value)
    }
}

/// [`SchemaParser`] for [`TypeSchema`], backed by a [`SchemaCache`].
#[derive(Debug, Clone, Default)]
pub struct TypeSchemaParser {
    cache: Arc<SchemaCache>,
}

impl TypeSchemaParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing cache, e.g. between several dispatchers.
    pub fn with_cache(cache: Arc<SchemaCache>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }
}

impl SchemaParser for TypeSchemaParser {
    fn decode(&self, schema: &TypeSchema, value: &Value) -> Decoded {
        decode_compiled(&self.cache.get_or_compile(schema), value)
    }

    fn decode_prepared(&self, schema: &PreparedSchema, value: &Value) -> Decoded {
        decode_compiled(&self.cache.get_or_compile_prepared(schema), value)
    }
}

fn decode_compiled(compiled: &CompiledSchema, value: &Value) -> Decoded {
    let mut errors = Vec::new();
    check(compiled, value, "", &mut errors);
    if errors.is_empty() {
        Ok(value.clone())
    } else {
        debug!(error_count = errors.len(), "Schema decode failed");
        Err(errors)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn matches_type(schema_type: SchemaType, value: &Value) -> bool {
    match schema_type {
        SchemaType::Any => true,
        SchemaType::String => value.is_string(),
        SchemaType::Number => value.is_number(),
        SchemaType::Integer => {
            value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|n| n.fract() == 0.0)
        }
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Object => value.is_object(),
        SchemaType::Array => value.is_array(),
        SchemaType::Null => value.is_null(),
    }
}

fn check(compiled: &CompiledSchema, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
    let schema = &compiled.schema;

    if value.is_null() && (schema.nullable || schema.schema_type == SchemaType::Null) {
        return;
    }
    if !matches_type(schema.schema_type, value) {
        errors.push(FieldError::invalid_type(
            path,
            schema.schema_type.as_str(),
            json_type_name(value),
        ));
        return;
    }

    if let Some(allowed) = &schema.enum_values
        && !allowed.contains(value)
    {
        errors.push(FieldError::not_in_enum(path, allowed));
    }

    match value {
        Value::String(s) => check_string(compiled, s, path, errors),
        Value::Number(n) => {
            if let Some(n) = n.as_f64() {
                if let Some(min) = schema.minimum
                    && n < min
                {
                    errors.push(FieldError::minimum(path, min));
                }
                if let Some(max) = schema.maximum
                    && n > max
                {
                    errors.push(FieldError::maximum(path, max));
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = schema.min_length
                && items.len() < min
            {
                errors.push(FieldError::min_items(path, min));
            }
            if let Some(max) = schema.max_length
                && items.len() > max
            {
                errors.push(FieldError::max_items(path, max));
            }
            if let Some(item_schema) = &compiled.items {
                for (i, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{path}[{i}]"), errors);
                }
            }
        }
        Value::Object(map) => {
            for name in &schema.required {
                if !map.contains_key(name) {
                    errors.push(FieldError::required(child_path(path, name)));
                }
            }
            for (name, property) in &compiled.properties {
                if let Some(child) = map.get(name) {
                    check(property, child, &child_path(path, name), errors);
                }
            }
        }
        Value::Null | Value::Bool(_) => {}
    }
}

fn check_string(compiled: &CompiledSchema, s: &str, path: &str, errors: &mut Vec<FieldError>) {
    let schema = &compiled.schema;
    let length = s.chars().count();
    if let Some(min) = schema.min_length
        && length < min
    {
        errors.push(FieldError::min_length(path, min));
    }
    if let Some(max) = schema.max_length
        && length > max
    {
        errors.push(FieldError::max_length(path, max));
    }
    match &compiled.pattern {
        Some(Ok(re)) if !re.is_match(s) => {
            errors.push(FieldError::pattern(path, re.as_str()));
        }
        // Routers reject these at build time; only direct parser use gets here.
        Some(Err(_)) => errors.push(FieldError::new(
            path,
            "Invalid validation pattern",
            "invalid_pattern",
        )),
        _ => {}
    }
    if schema.format.as_deref() == Some("email") && !is_valid_email(s) {
        errors.push(FieldError::email(path));
    }
}
