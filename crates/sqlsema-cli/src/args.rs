//! CLI argument definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "sqlsema")]
#[command(author, version, about = "Semantic analysis of SQL against schema definitions")]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

impl Args {
    /// Log filter directive implied by -v / -q
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Check SQL files against schema definitions
    Check {
        /// SQL files to check (supports glob patterns)
        files: Vec<PathBuf>,

        /// Schema definition files
        #[arg(short, long = "schema", value_name = "FILE")]
        schema: Vec<PathBuf>,

        /// Directory containing schema files
        #[arg(long = "schema-dir", value_name = "DIR")]
        schema_dir: Option<PathBuf>,

        /// SQL dialect (postgresql, oracle)
        #[arg(short, long, env = "SQLSEMA_DIALECT")]
        dialect: Option<String>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Maximum number of errors to report
        #[arg(long, default_value = "100")]
        max_errors: usize,

        /// Configuration file (default: sqlsema.toml in this or a parent directory)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Diagnostic codes to suppress, e.g. E0001
        #[arg(long, value_name = "CODE")]
        disable: Vec<String>,

        /// Replace values that fail assignment coercion with a warning
        #[arg(long)]
        relaxed_assignment: bool,

        /// Treat unknown type names as UNDEFINED with a warning
        #[arg(long)]
        undefined_types: bool,
    },

    /// Display schema information
    Schema {
        /// Schema definition files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// SQL dialect (postgresql, oracle)
        #[arg(short, long, default_value = "postgresql")]
        dialect: String,

        /// Print the catalog as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze SQL and display the query trees (for debugging)
    Parse {
        /// SQL file to analyze
        file: PathBuf,

        /// Schema definition files
        #[arg(short, long = "schema", value_name = "FILE")]
        schema: Vec<PathBuf>,

        /// SQL dialect (postgresql, oracle)
        #[arg(short, long, default_value = "postgresql")]
        dialect: String,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable output with source snippets
    #[default]
    Human,
    /// JSON output
    Json,
    /// SARIF output (for GitHub Code Scanning)
    Sarif,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_flags() {
        let args = Args::parse_from([
            "sqlsema",
            "-vv",
            "check",
            "q.sql",
            "--schema",
            "s.sql",
            "--dialect",
            "oracle",
            "--disable",
            "E0001",
            "--disable",
            "E0002",
            "--relaxed-assignment",
        ]);
        assert_eq!(args.log_level(), "debug");
        let Command::Check {
            files,
            schema,
            dialect,
            disable,
            relaxed_assignment,
            undefined_types,
            ..
        } = args.command
        else {
            panic!("expected check");
        };
        assert_eq!(files, vec![PathBuf::from("q.sql")]);
        assert_eq!(schema, vec![PathBuf::from("s.sql")]);
        assert_eq!(dialect.as_deref(), Some("oracle"));
        assert_eq!(disable, vec!["E0001", "E0002"]);
        assert!(relaxed_assignment);
        assert!(!undefined_types);
    }

    #[test]
    fn test_quiet_wins_over_verbose() {
        let args = Args::parse_from(["sqlsema", "-q", "-v", "schema", "s.sql"]);
        assert_eq!(args.log_level(), "error");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("SARIF".parse::<OutputFormat>(), Ok(OutputFormat::Sarif));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
