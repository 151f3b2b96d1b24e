use crate::cache::SchemaSource;
use crate::cli::{Cli, OutputFormat};
use crate::error::SchemaCacheError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Trait for abstracting environment variable access
pub trait EnvProvider {
    fn get(&self, key: &str) -> Option<String>;
}

/// System environment variable provider for production use
pub struct SystemEnvProvider;

impl EnvProvider for SystemEnvProvider {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonParsing(#[from] serde_json::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable error: {0}")]
    Environment(String),

    #[error("Unsupported configuration file format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub schemas: Vec<SchemaDefinition>,
    pub validation: ValidationConfig,
    pub output: OutputConfig,
}

/// How the cache treats XDR schema documents
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LegacyPolicy {
    /// Store them; validating against them reports an unsupported schema type
    #[default]
    Accept,
    /// Refuse to add them
    Reject,
}

impl std::str::FromStr for LegacyPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "accept" => Ok(LegacyPolicy::Accept),
            "reject" => Ok(LegacyPolicy::Reject),
            other => Err(format!("unknown legacy schema policy: {}", other)),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Treatment of XDR schema documents
    pub legacy_schemas: LegacyPolicy,
    /// Number of namespaces the table is sized for up front
    pub initial_capacity: usize,
}

/// A schema to preload into the cache
///
/// Exactly one of `location` and `inline` must be set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SchemaDefinition {
    /// Namespace URI the schema is stored under
    pub namespace: String,
    /// File path or URL of the schema document
    pub location: Option<String>,
    /// Schema document text
    pub inline: Option<String>,
}

/// Validation-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ValidationConfig {
    /// Number of concurrent validation threads
    pub threads: Option<usize>,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format
    pub format: OutputFormatConfig,
    /// Verbose output
    pub verbose: bool,
    /// Quiet mode (errors only)
    pub quiet: bool,
}

/// Output format configuration (serializable version of CLI OutputFormat)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormatConfig {
    #[default]
    Human,
    Json,
}

impl From<OutputFormat> for OutputFormatConfig {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Human => OutputFormatConfig::Human,
            OutputFormat::Json => OutputFormatConfig::Json,
        }
    }
}

impl From<OutputFormatConfig> for OutputFormat {
    fn from(format: OutputFormatConfig) -> Self {
        match format {
            OutputFormatConfig::Human => OutputFormat::Human,
            OutputFormatConfig::Json => OutputFormat::Json,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            legacy_schemas: LegacyPolicy::Accept,
            initial_capacity: 31,
        }
    }
}

impl TryFrom<&SchemaDefinition> for SchemaSource {
    type Error = SchemaCacheError;

    fn try_from(definition: &SchemaDefinition) -> std::result::Result<Self, Self::Error> {
        if definition.namespace.is_empty() {
            return Err(SchemaCacheError::invalid_input(
                "schema definition has an empty namespace",
            ));
        }

        match (&definition.location, &definition.inline) {
            (Some(location), None) => Ok(SchemaSource::Location(location.clone())),
            (None, Some(inline)) => Ok(SchemaSource::Markup(inline.clone().into_bytes())),
            (Some(_), Some(_)) => Err(SchemaCacheError::invalid_input(format!(
                "schema for {} sets both location and inline",
                definition.namespace
            ))),
            (None, None) => Err(SchemaCacheError::invalid_input(format!(
                "schema for {} sets neither location nor inline",
                definition.namespace
            ))),
        }
    }
}

/// Configuration manager for loading and merging configurations
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration with precedence: file -> environment -> CLI
    pub fn load_config(cli: &Cli) -> Result<Config> {
        Self::load_config_with(&SystemEnvProvider, cli)
    }

    /// Load configuration with a custom environment provider
    pub fn load_config_with(env: &impl EnvProvider, cli: &Cli) -> Result<Config> {
        // Start with default configuration
        let mut config = Config::default();

        // Load from configuration file if specified
        if let Some(config_path) = &cli.config {
            let file_config = Self::load_from_file(config_path)?;
            config = Self::merge_configs(config, file_config);
        } else if let Some(found_config) = Self::find_config_file()? {
            config = Self::merge_configs(config, found_config);
        }

        // Apply environment variable overrides
        config = Self::apply_environment_overrides_with(env, config)?;

        // Apply CLI argument overrides (highest precedence)
        config = Self::merge_with_cli(config, cli);

        // Validate the final configuration
        Self::validate_config(&config)?;

        Ok(config)
    }

    /// Load configuration from a file (TOML or JSON)
    ///
    /// Relative schema locations are resolved against the file's directory.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)?;

        let mut config: Config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)?,
            Some("json") => serde_json::from_str(&content)?,
            Some(ext) => return Err(ConfigError::UnsupportedFormat(ext.to_string())),
            None => {
                // Try to parse as TOML first, then JSON
                match toml::from_str::<Config>(&content) {
                    Ok(config) => config,
                    Err(_) => serde_json::from_str(&content)?,
                }
            }
        };

        if let Some(base) = path.parent() {
            Self::resolve_locations(&mut config, base);
        }

        Ok(config)
    }

    fn resolve_locations(config: &mut Config, base: &Path) {
        for definition in &mut config.schemas {
            if let Some(location) = &definition.location
                && !location.contains("://")
                && Path::new(location).is_relative()
            {
                definition.location = Some(base.join(location).to_string_lossy().into_owned());
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Result<Option<Config>> {
        let config_names = [
            "schema-cache.toml",
            "schema-cache.json",
            ".schema-cache.toml",
            ".schema-cache.json",
        ];

        // Check current directory first
        for name in &config_names {
            let path = PathBuf::from(name);
            if path.exists() {
                return Ok(Some(Self::load_from_file(&path)?));
            }
        }

        // Check user config directory
        if let Some(config_dir) = dirs::config_dir() {
            let app_config_dir = config_dir.join("schema-cache");
            for name in &config_names {
                let path = app_config_dir.join(name);
                if path.exists() {
                    return Ok(Some(Self::load_from_file(&path)?));
                }
            }
        }

        Ok(None)
    }

    /// Apply environment variable overrides with a custom environment provider
    pub fn apply_environment_overrides_with(
        env: &impl EnvProvider,
        mut config: Config,
    ) -> Result<Config> {
        // Cache settings
        if let Some(policy) = env.get("SCHEMA_CACHE_LEGACY_SCHEMAS") {
            config.cache.legacy_schemas = policy.parse().map_err(|_| {
                ConfigError::Environment(format!(
                    "Invalid SCHEMA_CACHE_LEGACY_SCHEMAS value: {}",
                    policy
                ))
            })?;
        }

        // Validation settings
        if let Some(threads) = env.get("SCHEMA_CACHE_THREADS") {
            config.validation.threads = Some(threads.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SCHEMA_CACHE_THREADS value: {}", threads))
            })?);
        }

        // Output settings
        if let Some(verbose) = env.get("SCHEMA_CACHE_VERBOSE") {
            config.output.verbose = verbose.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SCHEMA_CACHE_VERBOSE value: {}", verbose))
            })?;
        }

        if let Some(quiet) = env.get("SCHEMA_CACHE_QUIET") {
            config.output.quiet = quiet.parse().map_err(|_| {
                ConfigError::Environment(format!("Invalid SCHEMA_CACHE_QUIET value: {}", quiet))
            })?;
        }

        if let Some(format) = env.get("SCHEMA_CACHE_FORMAT") {
            config.output.format = match format.to_lowercase().as_str() {
                "human" => OutputFormatConfig::Human,
                "json" => OutputFormatConfig::Json,
                _ => {
                    return Err(ConfigError::Environment(format!(
                        "Invalid SCHEMA_CACHE_FORMAT value: {}",
                        format
                    )));
                }
            };
        }

        Ok(config)
    }

    /// Merge CLI arguments with configuration (CLI takes precedence)
    pub fn merge_with_cli(mut config: Config, cli: &Cli) -> Config {
        // Cache settings
        if cli.reject_legacy {
            config.cache.legacy_schemas = LegacyPolicy::Reject;
        }

        // Schemas named on the command line replace same-namespace file entries
        for binding in &cli.schemas {
            config
                .schemas
                .retain(|definition| definition.namespace != binding.namespace);
            config.schemas.push(SchemaDefinition {
                namespace: binding.namespace.clone(),
                location: Some(binding.location.clone()),
                inline: None,
            });
        }

        // Validation settings
        if cli.threads.is_some() {
            config.validation.threads = cli.threads;
        }

        // Output settings
        if let Some(format) = cli.output_format {
            config.output.format = format.into();
        }
        if cli.verbose {
            config.output.verbose = true;
            config.output.quiet = false;
        }
        if cli.quiet {
            config.output.quiet = true;
            config.output.verbose = false;
        }

        config
    }

    /// Merge two configurations (second takes precedence for non-None values)
    pub fn merge_configs(mut base: Config, override_config: Config) -> Config {
        // Cache settings
        base.cache = override_config.cache;

        // Schema definitions accumulate; later namespaces win
        for definition in override_config.schemas {
            base.schemas
                .retain(|existing| existing.namespace != definition.namespace);
            base.schemas.push(definition);
        }

        // Validation settings
        if override_config.validation.threads.is_some() {
            base.validation.threads = override_config.validation.threads;
        }

        // Output settings
        base.output = override_config.output;

        base
    }

    /// Validate configuration values
    pub fn validate_config(config: &Config) -> Result<()> {
        // Validate threads
        if let Some(threads) = config.validation.threads {
            if threads == 0 {
                return Err(ConfigError::Validation(
                    "Number of threads must be greater than 0".to_string(),
                ));
            }
            if threads > 1000 {
                return Err(ConfigError::Validation(
                    "Number of threads cannot exceed 1000".to_string(),
                ));
            }
        }

        // Validate cache settings
        if config.cache.initial_capacity == 0 {
            return Err(ConfigError::Validation(
                "Cache initial capacity must be greater than 0".to_string(),
            ));
        }

        // Validate schema definitions
        for definition in &config.schemas {
            SchemaSource::try_from(definition)
                .map_err(|e| ConfigError::Validation(e.to_string()))?;
        }

        // Validate output settings
        if config.output.verbose && config.output.quiet {
            return Err(ConfigError::Validation(
                "Cannot enable both verbose and quiet modes".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the effective thread count
    pub fn get_thread_count(config: &Config) -> usize {
        config.validation.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    /// Mock environment variable provider for testing
    #[derive(Default)]
    struct MockEnvProvider {
        vars: HashMap<String, String>,
    }

    impl MockEnvProvider {
        fn new() -> Self {
            Self {
                vars: HashMap::new(),
            }
        }

        fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
            self.vars.insert(key.into(), value.into());
        }
    }

    impl EnvProvider for MockEnvProvider {
        fn get(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    fn definition(namespace: &str, location: Option<&str>, inline: Option<&str>) -> SchemaDefinition {
        SchemaDefinition {
            namespace: namespace.to_string(),
            location: location.map(str::to_string),
            inline: inline.map(str::to_string),
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.cache.legacy_schemas, LegacyPolicy::Accept);
        assert_eq!(config.cache.initial_capacity, 31);
        assert!(config.schemas.is_empty());
        assert_eq!(config.validation.threads, None);
        assert_eq!(config.output.format, OutputFormatConfig::Human);
        assert!(!config.output.verbose);
        assert!(!config.output.quiet);
    }

    #[test]
    fn test_load_toml_config_resolves_relative_locations() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        fs::write(
            &config_path,
            r#"
[cache]
legacy_schemas = "reject"

[[schemas]]
namespace = "urn:example:books"
location = "schemas/books.xsd"

[[schemas]]
namespace = "urn:example:remote"
location = "http://example.com/remote.xsd"

[output]
format = "json"
"#,
        )
        .unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();

        assert_eq!(config.cache.legacy_schemas, LegacyPolicy::Reject);
        assert_eq!(config.cache.initial_capacity, 31);
        assert_eq!(config.schemas.len(), 2);
        assert_eq!(
            config.schemas[0].location.as_deref(),
            Some(
                temp_dir
                    .path()
                    .join("schemas/books.xsd")
                    .to_string_lossy()
                    .as_ref()
            )
        );
        assert_eq!(
            config.schemas[1].location.as_deref(),
            Some("http://example.com/remote.xsd")
        );
        assert_eq!(config.output.format, OutputFormatConfig::Json);
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        fs::write(
            &config_path,
            r#"{
  "schemas": [
    { "namespace": "urn:inline", "inline": "<xs:schema xmlns:xs=\"http://www.w3.org/2001/XMLSchema\"/>" }
  ],
  "validation": { "threads": 2 }
}"#,
        )
        .unwrap();

        let config = ConfigManager::load_from_file(&config_path).unwrap();

        assert_eq!(config.schemas.len(), 1);
        assert!(config.schemas[0].inline.is_some());
        assert_eq!(config.validation.threads, Some(2));
    }

    #[test]
    fn test_unsupported_config_format() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.yaml");
        fs::write(&config_path, "cache: {}").unwrap();

        match ConfigManager::load_from_file(&config_path) {
            Err(ConfigError::UnsupportedFormat(ext)) => assert_eq!(ext, "yaml"),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_environment_overrides() {
        let mut env = MockEnvProvider::new();
        env.set("SCHEMA_CACHE_LEGACY_SCHEMAS", "Reject");
        env.set("SCHEMA_CACHE_THREADS", "8");
        env.set("SCHEMA_CACHE_FORMAT", "json");
        env.set("SCHEMA_CACHE_VERBOSE", "true");

        let config =
            ConfigManager::apply_environment_overrides_with(&env, Config::default()).unwrap();

        assert_eq!(config.cache.legacy_schemas, LegacyPolicy::Reject);
        assert_eq!(config.validation.threads, Some(8));
        assert_eq!(config.output.format, OutputFormatConfig::Json);
        assert!(config.output.verbose);
    }

    #[test]
    fn test_invalid_environment_values() {
        let mut env = MockEnvProvider::new();
        env.set("SCHEMA_CACHE_THREADS", "many");
        assert!(matches!(
            ConfigManager::apply_environment_overrides_with(&env, Config::default()),
            Err(ConfigError::Environment(_))
        ));

        let mut env = MockEnvProvider::new();
        env.set("SCHEMA_CACHE_LEGACY_SCHEMAS", "sometimes");
        assert!(matches!(
            ConfigManager::apply_environment_overrides_with(&env, Config::default()),
            Err(ConfigError::Environment(_))
        ));
    }

    #[test]
    fn test_merge_configs_later_namespace_wins() {
        let mut base = Config::default();
        base.schemas.push(definition("urn:a", Some("old.xsd"), None));
        base.schemas.push(definition("urn:b", Some("b.xsd"), None));

        let mut override_config = Config::default();
        override_config
            .schemas
            .push(definition("urn:a", Some("new.xsd"), None));
        override_config.validation.threads = Some(3);

        let merged = ConfigManager::merge_configs(base, override_config);

        assert_eq!(merged.schemas.len(), 2);
        let a = merged
            .schemas
            .iter()
            .find(|d| d.namespace == "urn:a")
            .unwrap();
        assert_eq!(a.location.as_deref(), Some("new.xsd"));
        assert_eq!(merged.validation.threads, Some(3));
    }

    #[test]
    fn test_validate_config() {
        let mut config = Config::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        config.validation.threads = Some(0);
        assert!(ConfigManager::validate_config(&config).is_err());
        config.validation.threads = None;

        config.output.verbose = true;
        config.output.quiet = true;
        assert!(ConfigManager::validate_config(&config).is_err());
        config.output.quiet = false;

        config.schemas.push(definition("urn:a", None, None));
        assert!(matches!(
            ConfigManager::validate_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_schema_definition_conversion() {
        assert!(matches!(
            SchemaSource::try_from(&definition("urn:a", Some("a.xsd"), None)),
            Ok(SchemaSource::Location(_))
        ));
        assert!(matches!(
            SchemaSource::try_from(&definition("urn:a", None, Some("<x/>"))),
            Ok(SchemaSource::Markup(_))
        ));
        assert!(matches!(
            SchemaSource::try_from(&definition("urn:a", Some("a.xsd"), Some("<x/>"))),
            Err(SchemaCacheError::InvalidInput { .. })
        ));
        assert!(matches!(
            SchemaSource::try_from(&definition("urn:a", None, None)),
            Err(SchemaCacheError::InvalidInput { .. })
        ));
        assert!(matches!(
            SchemaSource::try_from(&definition("", Some("a.xsd"), None)),
            Err(SchemaCacheError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_legacy_policy_from_str() {
        assert_eq!("accept".parse::<LegacyPolicy>(), Ok(LegacyPolicy::Accept));
        assert_eq!("REJECT".parse::<LegacyPolicy>(), Ok(LegacyPolicy::Reject));
        assert!("maybe".parse::<LegacyPolicy>().is_err());
    }
}
