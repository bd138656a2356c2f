//! Shared compiled-schema cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use indexmap::IndexMap;
use regex::Regex;
use tracing::{trace, warn};

use super::{PreparedSchema, TypeSchema};

/// A [`TypeSchema`] with its regex patterns compiled, mirrored recursively.
#[derive(Debug)]
pub struct CompiledSchema {
    pub(crate) schema: TypeSchema,
    /// `Err` holds the compile error of an invalid pattern.
    pub(crate) pattern: Option<Result<Regex, String>>,
    pub(crate) properties: IndexMap<String, CompiledSchema>,
    pub(crate) items: Option<Box<CompiledSchema>>,
}

impl CompiledSchema {
    pub fn compile(schema: &TypeSchema) -> Self {
        let pattern = schema.pattern.as_deref().map(|source| {
            Regex::new(source).map_err(|e| {
                warn!(pattern = %source, error = %e, "Invalid schema pattern");
                e.to_string()
            })
        });
        Self {
            schema: schema.clone(),
            pattern,
            properties: schema
                .properties
                .iter()
                .map(|(name, child)| (name.clone(), Self::compile(child)))
                .collect(),
            items: schema.items.as_deref().map(|s| Box::new(Self::compile(s))),
        }
    }

    pub fn schema(&self) -> &TypeSchema {
        &self.schema
    }
}

/// Concurrent cache from schema fingerprint to compiled schema.
///
/// Insertion is idempotent: when two requests compile the same schema at
/// once, the first insert wins and both get that entry.
#[derive(Debug, Default)]
pub struct SchemaCache {
    entries: DashMap<String, Arc<CompiledSchema>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the compiled form of `schema`, compiling it on first use.
    pub fn get_or_compile(&self, schema: &TypeSchema) -> Arc<CompiledSchema> {
        self.get_or_compile_keyed(&schema.fingerprint(), schema)
    }

    /// Like [`get_or_compile`](Self::get_or_compile) with the fingerprint
    /// already known.
    pub fn get_or_compile_prepared(&self, schema: &PreparedSchema) -> Arc<CompiledSchema> {
        self.get_or_compile_keyed(schema.fingerprint(), schema.schema())
    }

    fn get_or_compile_keyed(&self, key: &str, schema: &TypeSchema) -> Arc<CompiledSchema> {
        if let Some(hit) = self.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(hit.value());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(schema_type = %schema.schema_type, "Compiling schema");
        let compiled = Arc::new(CompiledSchema::compile(schema));
        let entry = self.entries.entry(key.to_string()).or_insert(compiled);
        Arc::clone(entry.value())
    }

    /// Number of distinct schemas compiled.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
