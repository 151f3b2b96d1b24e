use std::path::PathBuf;

use thiserror::Error;

use crate::schema::SchemaKind;

/// Main library error type that encompasses all possible failure modes
#[derive(Error, Debug)]
pub enum SchemaCacheError {
    #[error("Invalid input: {details}")]
    InvalidInput { details: String },

    #[error("Schema parsing error: {location} - {details}")]
    SchemaParsing { location: String, details: String },

    #[error("No recognizable schema root: element {element:?} in namespace {namespace:?}")]
    InvalidSchemaRoot {
        element: Option<String>,
        namespace: Option<String>,
    },

    #[error("Unsupported schema type: {kind}")]
    UnsupportedSchemaType { kind: SchemaKind },

    #[error("Index {index} out of range for cache of {len} entries")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Schema not found: {uri}")]
    SchemaNotFound { uri: String },

    #[error("XML validation failed: {file} - {details}")]
    ValidationFailed { file: PathBuf, details: String },

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("Resource exhaustion: {resource} - {details}")]
    ResourceExhaustion { resource: String, details: String },
}

impl SchemaCacheError {
    /// True for failures raised while building a schema entry: the source could
    /// not be read, parsed or recognized as a schema.
    pub fn is_construction_failure(&self) -> bool {
        matches!(
            self,
            SchemaCacheError::SchemaParsing { .. } | SchemaCacheError::InvalidSchemaRoot { .. }
        )
    }

    pub(crate) fn invalid_input(details: impl Into<String>) -> Self {
        SchemaCacheError::InvalidInput {
            details: details.into(),
        }
    }
}

/// LibXML2-specific error types
#[derive(Error, Debug)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: {}", join_messages(.messages))]
    SchemaParseFailed { messages: Vec<String> },

    #[error("Document parsing failed: {details}")]
    DocumentParseFailed { details: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Validation failed with code {code}: {file}")]
    ValidationFailed { code: i32, file: PathBuf },

    #[error("Memory allocation failed in libxml2")]
    MemoryAllocation,

    #[error("Invalid argument: {details}")]
    InvalidArgument { details: String },
}

fn join_messages(messages: &[String]) -> String {
    if messages.is_empty() {
        "null pointer returned".to_string()
    } else {
        messages.join("; ")
    }
}

// Error conversion implementations
impl From<LibXml2Error> for SchemaCacheError {
    fn from(err: LibXml2Error) -> Self {
        match err {
            LibXml2Error::MemoryAllocation => SchemaCacheError::ResourceExhaustion {
                resource: "libxml2".to_string(),
                details: err.to_string(),
            },
            other => SchemaCacheError::LibXml2Internal {
                details: other.to_string(),
            },
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SchemaCacheError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;
