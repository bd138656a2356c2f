//! Input/output schemas.
//!
//! [`TypeSchema`] is a JSON-Schema-like description of a value. Procedures
//! attach one for their input and optionally one for their output; the
//! dispatcher checks values against them through a [`SchemaParser`].
//!
//! The built-in [`TypeSchemaParser`] compiles each schema once (regex
//! patterns included) into a shared [`SchemaCache`]. Any other validation
//! library can be plugged in by implementing [`SchemaParser`].
//!
//! # Example
//! ```rust,ignore
//! use rpc_core::schema::TypeSchema;
//!
//! let input = TypeSchema::object()
//!     .with_property("firstName", TypeSchema::string().with_min_length(4))
//!     .with_required("firstName");
//! ```

mod cache;
mod parser;

pub use cache::{CompiledSchema, SchemaCache};
pub use parser::{Decoded, SchemaParser, TypeSchemaParser};

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The JSON type a schema accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    Null,
    /// Accepts any JSON value.
    Any,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema for a single value.
///
/// Properties keep their declaration order, so serializing the same schema
/// always yields the same document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeSchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    /// For object types, the properties
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, TypeSchema>,
    /// Required properties for object types
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// For array types, the item type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<TypeSchema>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Allowed values
    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,
    /// Format hint; `email` is checked, other formats are informational
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Minimum value (for numbers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Maximum value (for numbers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    /// Minimum length (characters for strings, items for arrays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    /// Maximum length (characters for strings, items for arrays)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Regex the whole string must match somewhere (for strings)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Whether the value can be null
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
}

impl TypeSchema {
    /// Create a schema of the given type with no constraints.
    pub fn of(schema_type: SchemaType) -> Self {
        Self {
            schema_type,
            properties: IndexMap::new(),
            required: Vec::new(),
            items: None,
            description: None,
            enum_values: None,
            format: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            pattern: None,
            nullable: false,
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    pub fn null() -> Self {
        Self::of(SchemaType::Null)
    }

    pub fn any() -> Self {
        Self::of(SchemaType::Any)
    }

    pub fn object() -> Self {
        Self::of(SchemaType::Object)
    }

    /// Create an array type schema
    pub fn array(items: TypeSchema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array)
        }
    }

    /// Add a property to an object type
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: TypeSchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark a property as required
    #[must_use]
    pub fn with_required(mut self, name: impl Into<String>) -> Self {
        self.required.push(name.into());
        self
    }

    /// Add a property and mark it required
    #[must_use]
    pub fn with_required_property(self, name: impl Into<String>, schema: TypeSchema) -> Self {
        let name = name.into();
        self.with_property(name.clone(), schema).with_required(name)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set enum values
    #[must_use]
    pub fn with_enum(mut self, values: impl IntoIterator<Item = impl Serialize>) -> Self {
        self.enum_values = Some(
            values
                .into_iter()
                .filter_map(|v| serde_json::to_value(v).ok())
                .collect(),
        );
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    #[must_use]
    pub fn with_minimum(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    #[must_use]
    pub fn with_maximum(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }

    #[must_use]
    pub fn with_min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    #[must_use]
    pub fn with_max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Mark as nullable
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Canonical JSON form, used as the cache key.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Fails with the first `pattern`, at any depth, that is not a valid regex.
    pub fn check_patterns(&self) -> Result<(), String> {
        self.check_patterns_at("")
    }

    fn check_patterns_at(&self, path: &str) -> Result<(), String> {
        if let Some(pattern) = &self.pattern {
            Regex::new(pattern).map_err(|e| {
                let at = if path.is_empty() { "the root" } else { path };
                format!("pattern {pattern:?} at {at} does not compile: {e}")
            })?;
        }
        for (name, child) in &self.properties {
            let child_path = if path.is_empty() {
                name.clone()
            } else {
                format!("{path}.{name}")
            };
            child.check_patterns_at(&child_path)?;
        }
        if let Some(items) = &self.items {
            items.check_patterns_at(&format!("{path}[]"))?;
        }
        Ok(())
    }
}

/// A schema with its fingerprint computed once, up front.
///
/// Procedures hold their schemas in this form so decoding a request does
/// not re-serialize the schema to find its cache entry.
#[derive(Debug, Clone)]
pub struct PreparedSchema {
    schema: TypeSchema,
    fingerprint: Arc<str>,
}

impl PreparedSchema {
    pub fn new(schema: TypeSchema) -> Self {
        let fingerprint = schema.fingerprint().into();
        Self {
            schema,
            fingerprint,
        }
    }

    pub fn schema(&self) -> &TypeSchema {
        &self.schema
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl From<TypeSchema> for PreparedSchema {
    fn from(schema: TypeSchema) -> Self {
        Self::new(schema)
    }
}
