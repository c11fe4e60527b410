//! sqlsema CLI - semantic analysis of SQL files

mod args;
mod config;
mod output;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use miette::{IntoDiagnostic, Result, WrapErr};
use sqlsema_core::catalog::{Catalog, RelKind};
use sqlsema_core::types::{format_type, TypeKind};
use sqlsema_core::{Analyzer, Diagnostic, SchemaBuilder, Severity, SqlDialect};
use tracing_subscriber::EnvFilter;

use crate::args::{Args, Command, OutputFormat};
use crate::config::{Config, Overrides};
use crate::output::OutputFormatter;

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over -v / -q
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let quiet = args.quiet;
    match run(args) {
        Ok(has_errors) => {
            if has_errors {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            if !quiet {
                eprintln!("Error: {:?}", e);
            }
            ExitCode::from(2)
        }
    }
}

fn run(args: Args) -> Result<bool> {
    let quiet = args.quiet;
    match args.command {
        Command::Check {
            files,
            schema,
            schema_dir,
            dialect,
            format,
            max_errors,
            config: config_path,
            disable,
            relaxed_assignment,
            undefined_types,
        } => {
            let config = match config_path {
                Some(path) => Config::from_file(&path)?,
                None => Config::find_and_load()?.unwrap_or_default(),
            };

            // CLI takes precedence
            let config = config.merge_with_args(&Overrides {
                schema: &schema,
                schema_dir: schema_dir.as_deref(),
                files: &files,
                dialect: dialect.as_deref(),
                format,
                disable: &disable,
                relaxed_assignment,
                undefined_types,
            });
            let options = config.analyzer_options()?;

            let output_format = match &config.format {
                Some(fmt) => fmt.parse::<OutputFormat>().map_err(|e| miette::miette!(e))?,
                None => OutputFormat::Human,
            };

            let mut schema_files = expand_patterns(&config.schema)?;
            if let Some(dir) = &config.schema_dir {
                let pattern = format!("{}/**/*.sql", dir);
                schema_files.extend(glob::glob(&pattern).into_diagnostic()?.flatten());
            }
            if schema_files.is_empty() {
                miette::bail!(
                    "No schema files specified. Use --schema, --schema-dir, or configure in sqlsema.toml"
                );
            }

            let query_files = expand_patterns(&config.files)?;
            if query_files.is_empty() {
                miette::bail!(
                    "No query files specified. Use positional arguments or configure in sqlsema.toml"
                );
            }

            let disabled: HashSet<&str> = config.disable.iter().map(String::as_str).collect();
            let keep = |d: &Diagnostic| !disabled.contains(d.code());

            let Some(catalog) = load_schema(&schema_files, options.dialect, output_format, &keep)? else {
                return Ok(true);
            };

            let analyzer = Analyzer::new(&catalog).with_options(options);
            let mut total_errors = 0;
            let mut total_warnings = 0;

            for query_file in &query_files {
                if total_errors >= max_errors {
                    tracing::warn!(max_errors, "error limit reached, skipping remaining files");
                    break;
                }
                let content = read(query_file)?;
                let mut diagnostics: Vec<_> = analyzer.analyze(&content).into_iter().filter(|d| keep(d)).collect();

                let budget = max_errors - total_errors;
                let mut errors_seen = 0;
                diagnostics.retain(|d| {
                    if d.severity != Severity::Error {
                        return true;
                    }
                    errors_seen += 1;
                    errors_seen <= budget
                });

                for diag in &diagnostics {
                    match diag.severity {
                        Severity::Error => total_errors += 1,
                        Severity::Warning => total_warnings += 1,
                        Severity::Info => {}
                    }
                }
                if !diagnostics.is_empty() {
                    OutputFormatter::new(output_format, query_file.display().to_string())
                        .print_diagnostics(&diagnostics, &content);
                }
            }

            if !quiet {
                if total_errors > 0 || total_warnings > 0 {
                    eprintln!(
                        "Found {} error(s), {} warning(s) in {} file(s)",
                        total_errors,
                        total_warnings,
                        query_files.len()
                    );
                } else {
                    eprintln!("All {} file(s) passed validation", query_files.len());
                }
            }

            Ok(total_errors > 0)
        }

        Command::Schema {
            files,
            dialect,
            json,
        } => {
            let dialect = parse_dialect(&dialect)?;
            let Some(catalog) = load_schema(&files, dialect, OutputFormat::Human, &|_| true)? else {
                return Ok(true);
            };

            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&catalog).into_diagnostic()?
                );
            } else {
                print_catalog(&catalog);
            }
            Ok(false)
        }

        Command::Parse {
            file,
            schema,
            dialect,
        } => {
            let dialect = parse_dialect(&dialect)?;
            let catalog = if schema.is_empty() {
                Catalog::new()
            } else {
                match load_schema(&schema, dialect, OutputFormat::Human, &|_| true)? {
                    Some(catalog) => catalog,
                    None => return Ok(true),
                }
            };
            let content = read(&file)?;

            let options = sqlsema_core::AnalyzerOptions {
                dialect,
                ..Default::default()
            };
            let analysis = Analyzer::new(&catalog).with_options(options).analyze_queries(&content);
            for (i, query) in analysis.queries.iter().enumerate() {
                println!("Query {}:", i + 1);
                println!("{:#?}", query);
                println!();
            }
            if !analysis.diagnostics.is_empty() {
                OutputFormatter::new(OutputFormat::Human, file.display().to_string())
                    .print_diagnostics(&analysis.diagnostics, &content);
            }
            Ok(analysis.has_errors())
        }
    }
}

fn parse_dialect(name: &str) -> Result<SqlDialect> {
    name.parse().map_err(|e: String| miette::miette!(e))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read {}", path.display()))
}

/// Expand glob patterns; plain paths are kept as they are
fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for pattern in patterns {
        if pattern.contains(['*', '?', '[']) {
            paths.extend(glob::glob(pattern).into_diagnostic()?.flatten());
        } else {
            paths.push(PathBuf::from(pattern));
        }
    }
    Ok(paths)
}

/// Build the catalog from schema files. Schema errors are printed and give
/// `None`; schema warnings are printed and analysis goes on.
fn load_schema(
    files: &[PathBuf],
    dialect: SqlDialect,
    format: OutputFormat,
    keep: &dyn Fn(&Diagnostic) -> bool,
) -> Result<Option<Catalog>> {
    let mut builder = SchemaBuilder::new().with_dialect(dialect);
    let mut failed = false;
    for schema_file in files {
        let content = read(schema_file)?;
        let before = builder.catalog().relations().count();
        let result = builder.parse(&content);
        tracing::info!(
            file = %schema_file.display(),
            relations = builder.catalog().relations().count() - before,
            "loaded schema file"
        );
        if let Err(diags) = result {
            let shown: Vec<_> = diags.into_iter().filter(|d| keep(d)).collect();
            failed |= shown.iter().any(Diagnostic::is_error);
            OutputFormatter::new(format, schema_file.display().to_string()).print_diagnostics(&shown, &content);
        }
    }
    if failed {
        return Ok(None);
    }
    let (catalog, warnings) = builder.build();
    let warnings: Vec<_> = warnings.into_iter().filter(|d| keep(d)).collect();
    if !warnings.is_empty() {
        OutputFormatter::new(format, "<schema>".to_string()).print_diagnostics(&warnings, "");
    }
    Ok(Some(catalog))
}

fn print_catalog(catalog: &Catalog) {
    println!("Schema Information:");
    println!("==================");
    for schema_name in &catalog.schemas {
        let relations: Vec<_> = catalog
            .relations()
            .filter(|r| r.name.schema.as_deref() == Some(schema_name.as_str()))
            .collect();
        if relations.is_empty() {
            continue;
        }
        println!("\nSchema: {}", schema_name);
        for rel in relations {
            let kind = match rel.kind {
                RelKind::Table => "Table",
                RelKind::View => "View",
                RelKind::MatView => "Materialized view",
                RelKind::Foreign => "Foreign table",
                RelKind::CompositeType => "Composite type",
            };
            println!("  {}: {}", kind, rel.name.name);
            for col in rel.live_columns() {
                let nullable = if col.not_null { "NOT NULL" } else { "NULL" };
                println!(
                    "    - {} {} {}",
                    col.name,
                    format_type(catalog, col.type_oid, col.typmod),
                    nullable
                );
            }
            for constraint in &rel.constraints {
                println!("    * {} ({})", constraint.name, constraint.columns.join(", "));
            }
        }
    }

    let types: Vec<_> = catalog
        .user_types()
        .filter(|t| matches!(t.kind, TypeKind::Enum | TypeKind::Shell))
        .collect();
    if !types.is_empty() {
        println!("\nTypes:");
        for ty in types {
            match ty.kind {
                TypeKind::Enum => println!("  Enum: {}.{} ({})", ty.schema, ty.name, ty.labels.join(", ")),
                _ => println!("  Shell: {}.{}", ty.schema, ty.name),
            }
        }
    }
}
