use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use xml_schema_cache::{
    Cli, ConfigManager, FileReport, Output, OutputFormat, ReportStatus, SchemaCache,
    VerbosityLevel, XmlDocument,
};

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(2)
        }
    }
}

fn init_tracing(verbosity: VerbosityLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.log_filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns whether every file validated.
fn run(cli: &Cli) -> Result<bool> {
    cli.validate().map_err(anyhow::Error::msg)?;

    let config = ConfigManager::load_config(cli).context("Failed to load configuration")?;
    let verbosity = VerbosityLevel::from_flags(config.output.verbose, config.output.quiet);
    init_tracing(verbosity);

    let cache = SchemaCache::from_config(&config).context("Failed to load schemas")?;
    debug!(schemas = cache.len(), "schema cache ready");

    let output = Output::new(verbosity, OutputFormat::from(config.output.format));

    if cli.list {
        print!("{}", output.format_namespaces(&cache.namespaces()));
    }

    if cli.files.is_empty() {
        return Ok(true);
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(ConfigManager::get_thread_count(&config))
        .build()
        .context("Failed to start validation threads")?;

    let reports: Vec<FileReport> = pool.install(|| {
        cli.files
            .par_iter()
            .map(|path| validate_file(&cache, cli.namespace.as_deref(), path))
            .collect()
    });

    print!("{}", output.format_reports(&reports));

    Ok(reports.iter().all(FileReport::is_valid))
}

/// Validate one file against `namespace`, or the namespace of its root element.
fn validate_file(cache: &SchemaCache, namespace: Option<&str>, path: &Path) -> FileReport {
    let outcome = match namespace {
        // libxml2 reads the file directly
        Some(namespace) => cache
            .validate_file(namespace, path)
            .map(|result| (namespace.to_string(), result)),
        None => XmlDocument::read(&path.to_string_lossy()).and_then(|document| {
            let namespace = document
                .root_element()
                .and_then(|root| root.namespace)
                .unwrap_or_default();
            let result = cache.validate(&namespace, &document)?;
            Ok((namespace, result))
        }),
    };

    match outcome {
        Ok((namespace, result)) => FileReport {
            path: path.to_path_buf(),
            namespace: Some(namespace),
            status: ReportStatus::from(result),
        },
        Err(e) => FileReport {
            path: path.to_path_buf(),
            namespace: namespace.map(str::to_string),
            status: ReportStatus::Error {
                message: e.to_string(),
            },
        },
    }
}
