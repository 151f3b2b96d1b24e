//! Schema entries: the unit of storage in a [`SchemaCache`](crate::SchemaCache).
//!
//! An entry is built once, from a location or from an in-memory document, and
//! is immutable afterwards. Entries are shared through [`SchemaHandle`]; the
//! last handle to go away releases the compiled schema and the backing document.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::document::XmlDocument;
use crate::error::{LibXml2Error, Result, SchemaCacheError};
use crate::libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};

/// Root element name of an XML Schema document
pub const XSD_ROOT: &str = "schema";
/// Namespace of an XML Schema document's root element
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
/// Root element name of an XDR (XML-Data Reduced) schema document
pub const XDR_ROOT: &str = "Schema";
/// Namespace of an XDR schema document's root element
pub const XDR_NAMESPACE: &str = "urn:schemas-microsoft-com:xml-data";

/// Shared ownership handle to a schema entry
pub type SchemaHandle = Arc<SchemaEntry>;

/// Which schema dialect a document is written in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaKind {
    /// Not a schema document
    Invalid,
    /// XDR schema; stored but never compiled
    Legacy,
    /// W3C XML Schema
    Xsd,
}

impl SchemaKind {
    /// Classify a document by its root element name and namespace.
    pub fn detect(document: &XmlDocument) -> SchemaKind {
        match document.root_element() {
            Some(root) if root.is(XSD_ROOT, XSD_NAMESPACE) => SchemaKind::Xsd,
            Some(root) if root.is(XDR_ROOT, XDR_NAMESPACE) => SchemaKind::Legacy,
            _ => SchemaKind::Invalid,
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaKind::Invalid => write!(f, "invalid"),
            SchemaKind::Legacy => write!(f, "XDR"),
            SchemaKind::Xsd => write!(f, "XSD"),
        }
    }
}

/// A schema together with the document backing it
pub struct SchemaEntry {
    kind: SchemaKind,
    // Declared before `document`: the schema is released first.
    schema: Option<XmlSchemaPtr>,
    document: XmlDocument,
}

impl SchemaEntry {
    /// Load and compile the XML Schema found at `location`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaCacheError::SchemaParsing` if the location cannot be read
    /// or does not hold a valid XML Schema.
    pub fn from_location(engine: &LibXml2Wrapper, location: &str) -> Result<SchemaEntry> {
        let document = XmlDocument::read(location)?;
        let schema = compile(engine, document, location)?;
        Ok(SchemaEntry::xsd(schema))
    }

    /// Compile an XML Schema from a caller-owned document.
    ///
    /// The document is copied first; the caller's tree is never handed to the
    /// schema parser and never aliased by the entry.
    pub fn from_xsd_document(engine: &LibXml2Wrapper, document: &XmlDocument) -> Result<SchemaEntry> {
        let copy = document.deep_copy()?;
        let schema = compile(engine, copy, "<document>")?;
        Ok(SchemaEntry::xsd(schema))
    }

    /// Store an XDR schema document.
    ///
    /// XDR schemas are not compiled: the entry keeps a copy of the document and
    /// reports [`SchemaCacheError::UnsupportedSchemaType`] when used to validate.
    pub fn from_legacy_document(document: &XmlDocument) -> Result<SchemaEntry> {
        warn!("XDR schema support not implemented; storing document without validation");
        let entry = SchemaEntry {
            kind: SchemaKind::Legacy,
            schema: None,
            document: document.deep_copy()?,
        };
        trace!(kind = %entry.kind, "schema entry created");
        Ok(entry)
    }

    /// Detect the document's schema dialect and build the matching entry.
    ///
    /// # Errors
    ///
    /// Returns `SchemaCacheError::InvalidSchemaRoot` if the root element is not
    /// an XSD or XDR schema root.
    pub fn from_document(engine: &LibXml2Wrapper, document: &XmlDocument) -> Result<SchemaEntry> {
        match SchemaKind::detect(document) {
            SchemaKind::Xsd => SchemaEntry::from_xsd_document(engine, document),
            SchemaKind::Legacy => SchemaEntry::from_legacy_document(document),
            SchemaKind::Invalid => {
                let root = document.root_element();
                warn!(root = ?root, "invalid schema!");
                Err(SchemaCacheError::InvalidSchemaRoot {
                    element: root.as_ref().map(|r| r.name.clone()),
                    namespace: root.and_then(|r| r.namespace),
                })
            }
        }
    }

    fn xsd(schema: XmlSchemaPtr) -> SchemaEntry {
        let entry = SchemaEntry {
            kind: SchemaKind::Xsd,
            document: schema.document().clone(),
            schema: Some(schema),
        };
        trace!(kind = %entry.kind, "schema entry created");
        entry
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    /// The document backing this entry
    pub fn document(&self) -> &XmlDocument {
        &self.document
    }

    /// The compiled schema; `None` for XDR entries
    pub fn schema(&self) -> Option<&XmlSchemaPtr> {
        self.schema.as_ref()
    }

    fn compiled(&self) -> Result<&XmlSchemaPtr> {
        self.schema
            .as_ref()
            .ok_or(SchemaCacheError::UnsupportedSchemaType { kind: self.kind })
    }

    /// Validate a parsed instance document against this schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaCacheError::UnsupportedSchemaType` for XDR entries.
    pub fn validate_document(
        &self,
        engine: &LibXml2Wrapper,
        document: &XmlDocument,
    ) -> Result<ValidationResult> {
        let schema = self.compiled()?;
        Ok(engine.validate_document(schema, document, None)?)
    }

    /// Validate the instance document stored at `path` against this schema.
    pub fn validate_file(&self, engine: &LibXml2Wrapper, path: &Path) -> Result<ValidationResult> {
        let schema = self.compiled()?;
        engine
            .validate_file(schema, path)
            .map_err(|e| SchemaCacheError::ValidationFailed {
                file: path.to_path_buf(),
                details: e.to_string(),
            })
    }
}

impl fmt::Debug for SchemaEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEntry")
            .field("kind", &self.kind)
            .field("document", &self.document)
            .finish()
    }
}

impl Drop for SchemaEntry {
    fn drop(&mut self) {
        trace!(kind = %self.kind, "schema entry released");
    }
}

fn compile(engine: &LibXml2Wrapper, document: XmlDocument, location: &str) -> Result<XmlSchemaPtr> {
    engine
        .parse_schema_from_document(document)
        .map_err(|e| match e {
            LibXml2Error::SchemaParseFailed { .. } => SchemaCacheError::SchemaParsing {
                location: location.to_string(),
                details: e.to_string(),
            },
            other => other.into(),
        })
}
