//! Input and output transformers.
//!
//! A transformer is a pure function over JSON that runs after a value has
//! been validated, coercing it into the shape the handler's input type
//! expects (or, for outputs, the shape sent to callers). Input transformer
//! failures become `BAD_REQUEST`; output failures are server bugs.
//!
//! # Example
//! ```rust,ignore
//! let procedure = Procedure::builder()
//!     .input(TypeSchema::object().with_required_property("at", TypeSchema::array(TypeSchema::number())))
//!     .transform_field("at", tuple_to_object(&["lat", "lng"]))
//!     .query(nearby);
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::trace;

use crate::validation::FieldError;

/// A pure JSON-to-JSON coercion. `Err` carries a human-readable reason.
pub type TransformFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Wrap a closure as a [`TransformFn`].
pub fn transformer<F>(f: F) -> TransformFn
where
    F: Fn(Value) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Per-field transformers followed by whole-value transformers.
///
/// Field transformers run first, in declaration order, on fields that are
/// present; every failing field is reported. Whole-value transformers then
/// run in declaration order and stop at the first failure.
#[derive(Clone, Default)]
pub struct InputTransform {
    fields: IndexMap<String, TransformFn>,
    whole: Vec<TransformFn>,
}

impl InputTransform {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.whole.is_empty()
    }

    pub(crate) fn add_field(&mut self, name: String, f: TransformFn) {
        self.fields.insert(name, f);
    }

    pub(crate) fn add_whole(&mut self, f: TransformFn) {
        self.whole.push(f);
    }

    pub fn apply(&self, mut value: Value) -> Result<Value, Vec<FieldError>> {
        if !self.fields.is_empty() {
            let Value::Object(map) = &mut value else {
                return Err(vec![FieldError::new(
                    "",
                    "value must be an object to transform its fields",
                    "transform",
                )]);
            };
            let mut errors = Vec::new();
            for (name, f) in &self.fields {
                if let Some(slot) = map.get_mut(name) {
                    trace!(field = %name, "Transforming input field");
                    match f(slot.take()) {
                        Ok(transformed) => *slot = transformed,
                        Err(reason) => errors.push(FieldError::new(
                            name.as_str(),
                            format!("{name}: {reason}"),
                            "transform",
                        )),
                    }
                }
            }
            if !errors.is_empty() {
                return Err(errors);
            }
        }

        for f in &self.whole {
            value = f(value).map_err(|reason| vec![FieldError::new("", reason, "transform")])?;
        }
        Ok(value)
    }
}

impl fmt::Debug for InputTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputTransform")
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("whole", &self.whole.len())
            .finish()
    }
}

// =============================================================================
// Built-in transformers
// =============================================================================

/// Turn a fixed-length array into an object with the given keys.
///
/// `[52.5, 13.4]` with `["lat", "lng"]` becomes `{"lat": 52.5, "lng": 13.4}`.
pub fn tuple_to_object(keys: &[&str]) -> TransformFn {
    let keys: Vec<String> = keys.iter().map(|k| (*k).to_string()).collect();
    Arc::new(move |value| match value {
        Value::Array(items) if items.len() == keys.len() => Ok(Value::Object(
            keys.iter().cloned().zip(items).collect::<Map<String, Value>>(),
        )),
        Value::Array(items) => Err(format!(
            "expected {} elements, received {}",
            keys.len(),
            items.len()
        )),
        _ => Err("expected an array".to_string()),
    })
}

/// Coerce a string value with `f`; non-strings are rejected.
pub fn map_string<F>(f: F) -> TransformFn
where
    F: Fn(&str) -> Result<Value, String> + Send + Sync + 'static,
{
    Arc::new(move |value| match value {
        Value::String(s) => f(&s),
        _ => Err("expected a string".to_string()),
    })
}
