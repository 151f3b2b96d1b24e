use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum VerbosityLevel {
    /// Only show failures
    Quiet,
    /// Show standard information
    #[default]
    Normal,
    /// Show detailed information
    Verbose,
}

impl VerbosityLevel {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        if quiet {
            VerbosityLevel::Quiet
        } else if verbose {
            VerbosityLevel::Verbose
        } else {
            VerbosityLevel::Normal
        }
    }

    /// Default `tracing` filter directive for this verbosity
    pub fn log_filter(&self) -> &'static str {
        match self {
            VerbosityLevel::Quiet => "error",
            VerbosityLevel::Normal => "warn",
            VerbosityLevel::Verbose => "debug",
        }
    }
}

/// Report format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

/// A `NAMESPACE=LOCATION` pair given on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaBinding {
    pub namespace: String,
    pub location: String,
}

impl std::str::FromStr for SchemaBinding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The namespace ends at the first '='; locations may carry query strings.
        let (namespace, location) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAMESPACE=LOCATION, got '{}'", s))?;

        if namespace.is_empty() || location.is_empty() {
            return Err(format!("expected NAMESPACE=LOCATION, got '{}'", s));
        }

        Ok(SchemaBinding {
            namespace: namespace.to_string(),
            location: location.to_string(),
        })
    }
}

/// Load XML Schemas into a namespace-keyed cache and validate documents against them
#[derive(Parser, Debug, Clone)]
#[command(name = "schema-cache")]
#[command(about = "Load XML Schemas into a shared cache and validate XML files against them")]
#[command(version)]
pub struct Cli {
    /// XML files to validate
    #[arg(help = "XML files to validate against the cached schemas")]
    pub files: Vec<PathBuf>,

    /// Configuration file (TOML or JSON)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Schema to load, as NAMESPACE=LOCATION (the namespace must not contain '=')
    #[arg(short = 's', long = "schema", action = clap::ArgAction::Append)]
    pub schemas: Vec<SchemaBinding>,

    /// Validate every file against this namespace instead of its root element's
    #[arg(short = 'n', long = "namespace")]
    pub namespace: Option<String>,

    /// Print the cached namespaces
    #[arg(long = "list")]
    pub list: bool,

    /// Refuse XDR schemas instead of storing them unvalidated
    #[arg(long = "reject-legacy")]
    pub reject_legacy: bool,

    /// Number of concurrent validation threads
    #[arg(
        short = 't',
        long = "threads",
        help = "Number of concurrent validation threads"
    )]
    pub threads: Option<usize>,

    /// Output format
    #[arg(long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", help = "Enable verbose output")]
    pub verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Quiet mode",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn validate(&self) -> Result<(), String> {
        for file in &self.files {
            if !file.exists() {
                return Err(format!("Path does not exist: {}", file.display()));
            }
        }
        if let Some(threads) = self.threads
            && threads == 0
        {
            return Err("Number of threads must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_basic_cli_parsing() {
        let args = vec!["schema-cache", "a.xml", "b.xml"];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(
            cli.files,
            vec![PathBuf::from("a.xml"), PathBuf::from("b.xml")]
        );
        assert!(cli.schemas.is_empty());
        assert_eq!(cli.output_format, None);
    }

    #[test]
    fn test_schema_bindings() {
        let cli = Cli::try_parse_from([
            "schema-cache",
            "-s",
            "urn:books=books.xsd",
            "--schema",
            "urn:remote=http://example.com/schema.xsd?v=1",
        ])
        .unwrap();

        assert_eq!(
            cli.schemas,
            vec![
                SchemaBinding {
                    namespace: "urn:books".to_string(),
                    location: "books.xsd".to_string(),
                },
                SchemaBinding {
                    namespace: "urn:remote".to_string(),
                    location: "http://example.com/schema.xsd?v=1".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_malformed_schema_binding() {
        assert!(Cli::try_parse_from(["schema-cache", "-s", "no-separator"]).is_err());
        assert!(Cli::try_parse_from(["schema-cache", "-s", "=books.xsd"]).is_err());
        assert!(Cli::try_parse_from(["schema-cache", "-s", "urn:books="]).is_err());
    }

    #[test]
    fn test_schema_binding_location_keeps_every_equals_sign() {
        let binding: SchemaBinding = "urn:a=http://h/s.xsd?v=1&w=2".parse().unwrap();
        assert_eq!(binding.namespace, "urn:a");
        assert_eq!(binding.location, "http://h/s.xsd?v=1&w=2");
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["schema-cache", "-v", "-q"]).is_err());
    }

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(
            VerbosityLevel::from_flags(false, false),
            VerbosityLevel::Normal
        );
        assert_eq!(
            VerbosityLevel::from_flags(true, false),
            VerbosityLevel::Verbose
        );
        assert_eq!(VerbosityLevel::from_flags(false, true), VerbosityLevel::Quiet);
        assert_eq!(VerbosityLevel::Verbose.log_filter(), "debug");
    }

    #[test]
    fn test_validate_rejects_zero_threads() {
        let cli = Cli::try_parse_from(["schema-cache", "-t", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }
}
