use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::{CacheConfig, Config, LegacyPolicy};
use crate::document::XmlDocument;
use crate::error::{Result, SchemaCacheError};
use crate::libxml2::{LibXml2Wrapper, ValidationResult};
use crate::schema::{SchemaEntry, SchemaHandle, SchemaKind};

/// Where a schema added to the cache comes from
#[derive(Debug, Clone)]
pub enum SchemaSource {
    /// No schema: adding it removes whatever is stored under the key
    None,
    /// File path or URL of a schema document
    Location(String),
    /// An already parsed schema document (XSD or XDR)
    Document(XmlDocument),
    /// Schema document text held in memory
    Markup(Vec<u8>),
}

impl From<&str> for SchemaSource {
    fn from(location: &str) -> Self {
        SchemaSource::Location(location.to_string())
    }
}

impl From<String> for SchemaSource {
    fn from(location: String) -> Self {
        SchemaSource::Location(location)
    }
}

impl From<XmlDocument> for SchemaSource {
    fn from(document: XmlDocument) -> Self {
        SchemaSource::Document(document)
    }
}

impl From<&XmlDocument> for SchemaSource {
    fn from(document: &XmlDocument) -> Self {
        SchemaSource::Document(document.clone())
    }
}

impl<T: Into<SchemaSource>> From<Option<T>> for SchemaSource {
    fn from(source: Option<T>) -> Self {
        source.map_or(SchemaSource::None, Into::into)
    }
}

/// Namespace-keyed cache of compiled schemas
///
/// Entries are shared through [`SchemaHandle`]s: the table holds one handle per
/// key, and merging a cache into another shares the same entries between both.
/// Dropping the cache releases every handle it holds.
///
/// Mutations (`add`, `remove`, `merge`) take the table's write lock only after
/// any new entry has been fully built, so a failed construction never disturbs
/// the table. Reads take the read lock.
pub struct SchemaCache {
    table: RwLock<HashMap<String, SchemaHandle>>,
    engine: LibXml2Wrapper,
    legacy_policy: LegacyPolicy,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self {
            table: RwLock::new(HashMap::with_capacity(config.initial_capacity)),
            engine: LibXml2Wrapper::new(),
            legacy_policy: config.legacy_schemas,
        }
    }

    /// Build a cache and load every schema listed in the configuration.
    ///
    /// Fails on the first definition that cannot be converted or loaded.
    pub fn from_config(config: &Config) -> Result<Self> {
        let cache = Self::with_config(&config.cache);
        for definition in &config.schemas {
            let source = SchemaSource::try_from(definition)?;
            cache.add(&definition.namespace, source)?;
        }
        Ok(cache)
    }

    /// Add, replace or remove the schema stored under `uri`.
    ///
    /// On failure the table is left exactly as it was, including any entry
    /// already stored under `uri`.
    ///
    /// # Errors
    ///
    /// - `SchemaParsing` / `InvalidSchemaRoot` when the source cannot be turned
    ///   into a schema entry
    /// - `UnsupportedSchemaType` when the source is an XDR schema and the cache
    ///   rejects legacy schemas
    pub fn add(&self, uri: &str, source: impl Into<SchemaSource>) -> Result<()> {
        let entry = match source.into() {
            SchemaSource::None => {
                self.remove(uri);
                return Ok(());
            }
            SchemaSource::Location(location) => SchemaEntry::from_location(&self.engine, &location)?,
            SchemaSource::Document(document) => self.entry_from_document(&document)?,
            SchemaSource::Markup(text) => self.entry_from_document(&XmlDocument::parse(&text)?)?,
        };

        let kind = entry.kind();
        let handle = Arc::new(entry);
        let replaced = self.table.write().insert(uri.to_string(), handle);

        debug!(uri, %kind, replaced = replaced.is_some(), "schema added");
        // `replaced` is released here, outside the table lock.
        Ok(())
    }

    fn entry_from_document(&self, document: &XmlDocument) -> Result<SchemaEntry> {
        if self.legacy_policy == LegacyPolicy::Reject
            && SchemaKind::detect(document) == SchemaKind::Legacy
        {
            return Err(SchemaCacheError::UnsupportedSchemaType {
                kind: SchemaKind::Legacy,
            });
        }
        SchemaEntry::from_document(&self.engine, document)
    }

    /// The document backing the schema stored under `uri`.
    ///
    /// The returned handle keeps the document alive on its own; it stays valid
    /// after the entry is removed or replaced.
    pub fn get(&self, uri: &str) -> Option<XmlDocument> {
        self.table
            .read()
            .get(uri)
            .map(|entry| entry.document().clone())
    }

    /// A shared handle to the entry stored under `uri`.
    pub fn entry(&self, uri: &str) -> Option<SchemaHandle> {
        self.table.read().get(uri).cloned()
    }

    /// Release and erase the entry stored under `uri`; absent keys are ignored.
    pub fn remove(&self, uri: &str) {
        let removed = self.table.write().remove(uri);
        if removed.is_some() {
            debug!(uri, "schema removed");
        }
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.table.read().contains_key(uri)
    }

    /// Number of namespaces currently stored
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// The namespace at position `index` in the table's enumeration order.
    ///
    /// The order is unspecified but stable as long as the cache is not mutated.
    ///
    /// # Errors
    ///
    /// Returns `IndexOutOfRange` when `index >= len()`.
    pub fn key_at(&self, index: usize) -> Result<String> {
        let table = self.table.read();
        table
            .keys()
            .nth(index)
            .cloned()
            .ok_or(SchemaCacheError::IndexOutOfRange {
                index,
                len: table.len(),
            })
    }

    /// Snapshot of every stored namespace, in enumeration order
    pub fn namespaces(&self) -> Vec<String> {
        self.table.read().keys().cloned().collect()
    }

    /// Add every entry of `other` whose namespace is not already stored here.
    ///
    /// Entries are shared, not copied; existing entries are never overwritten.
    /// Returns the number of namespaces added.
    pub fn merge(&self, other: &SchemaCache) -> usize {
        let snapshot: Vec<(String, SchemaHandle)> = other
            .table
            .read()
            .iter()
            .map(|(uri, entry)| (uri.clone(), Arc::clone(entry)))
            .collect();

        let mut table = self.table.write();
        let mut added = 0;
        for (uri, entry) in snapshot {
            if let std::collections::hash_map::Entry::Vacant(slot) = table.entry(uri) {
                slot.insert(entry);
                added += 1;
            }
        }
        drop(table);

        debug!(added, "schema caches merged");
        added
    }

    /// Validate `document` against the schema stored under `uri`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` if nothing is stored under `uri`, and
    /// `UnsupportedSchemaType` if the stored schema is an XDR schema.
    pub fn validate(&self, uri: &str, document: &XmlDocument) -> Result<ValidationResult> {
        let entry = self
            .entry(uri)
            .ok_or_else(|| SchemaCacheError::SchemaNotFound {
                uri: uri.to_string(),
            })?;
        entry.validate_document(&self.engine, document)
    }

    /// Validate the instance file at `path` against the schema stored under `uri`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaNotFound` if nothing is stored under `uri`,
    /// `UnsupportedSchemaType` for an XDR schema, and `ValidationFailed` if the
    /// file cannot be read or libxml2 fails internally.
    pub fn validate_file(&self, uri: &str, path: &Path) -> Result<ValidationResult> {
        let entry = self
            .entry(uri)
            .ok_or_else(|| SchemaCacheError::SchemaNotFound {
                uri: uri.to_string(),
            })?;
        entry.validate_file(&self.engine, path)
    }
}

impl fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaCache")
            .field("namespaces", &self.namespaces())
            .field("legacy_policy", &self.legacy_policy)
            .finish()
    }
}

impl Default for SchemaCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SchemaCache {
    fn drop(&mut self) {
        debug!(entries = self.table.get_mut().len(), "releasing schema cache");
    }
}
