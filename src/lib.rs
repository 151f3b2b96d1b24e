//! # xml-schema-cache Library
//!
//! A thread-safe cache of parsed XML Schemas keyed by namespace URI. Schemas are
//! parsed and validated once through libxml2 and then shared by every consumer
//! that looks them up.

pub mod cache;
pub mod cli;
pub mod config;
pub mod document;
pub mod error;
pub mod libxml2;
pub mod output;
pub mod schema;

pub use cache::{SchemaCache, SchemaSource};
pub use cli::{Cli, OutputFormat, VerbosityLevel};
pub use config::{CacheConfig, Config, ConfigManager, LegacyPolicy, SchemaDefinition};
pub use document::{RootElement, XmlDocument};
pub use error::{LibXml2Error, Result, SchemaCacheError};
pub use libxml2::{LibXml2Wrapper, ValidationResult, XmlSchemaPtr};
pub use output::{FileReport, Output, ReportStatus};
pub use schema::{
    SchemaEntry, SchemaHandle, SchemaKind, XDR_NAMESPACE, XDR_ROOT, XSD_NAMESPACE, XSD_ROOT,
};
