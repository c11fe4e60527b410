//! Configuration file handling

use std::path::{Path, PathBuf};

use miette::{IntoDiagnostic, Result, WrapErr};
use serde::Deserialize;
use sqlsema_core::AnalyzerOptions;

pub const CONFIG_FILE_NAME: &str = "sqlsema.toml";

/// Configuration for sqlsema
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Schema file paths or patterns
    #[serde(default)]
    pub schema: Vec<String>,

    /// Query file patterns to check
    #[serde(default)]
    pub files: Vec<String>,

    /// SQL dialect ("postgresql" or "oracle")
    #[serde(default)]
    pub dialect: Option<String>,

    /// Output format (human, json, sarif)
    #[serde(default)]
    pub format: Option<String>,

    /// Diagnostic codes to suppress (e.g., ["E0001", "E0002"])
    #[serde(default)]
    pub disable: Vec<String>,

    /// Schema directory
    pub schema_dir: Option<String>,

    /// Analyzer settings
    #[serde(default)]
    pub analyzer: AnalyzerOptions,
}

/// Command-line values that override the file
#[derive(Debug, Default)]
pub struct Overrides<'a> {
    pub schema: &'a [PathBuf],
    pub schema_dir: Option<&'a Path>,
    pub files: &'a [PathBuf],
    pub dialect: Option<&'a str>,
    pub format: Option<crate::args::OutputFormat>,
    pub disable: &'a [String],
    pub relaxed_assignment: bool,
    pub undefined_types: bool,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&contents).wrap_err_with(|| format!("invalid config {}", path.display()))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).into_diagnostic()
    }

    /// Find sqlsema.toml in the current directory or one of its parents
    pub fn find_and_load() -> Result<Option<Self>> {
        let mut current_dir = std::env::current_dir().into_diagnostic()?;

        loop {
            let config_path = current_dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                tracing::debug!(path = %config_path.display(), "loading config");
                return Ok(Some(Self::from_file(&config_path)?));
            }

            if !current_dir.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Merge CLI arguments into configuration.
    /// CLI arguments take precedence over config file values.
    pub fn merge_with_args(mut self, args: &Overrides<'_>) -> Self {
        if !args.schema.is_empty() {
            self.schema = args.schema.iter().map(|p| p.display().to_string()).collect();
        }

        if let Some(dir) = args.schema_dir {
            self.schema_dir = Some(dir.display().to_string());
        }

        if !args.files.is_empty() {
            self.files = args.files.iter().map(|p| p.display().to_string()).collect();
        }

        if let Some(dialect) = args.dialect {
            self.dialect = Some(dialect.to_string());
        }

        if let Some(fmt) = args.format {
            self.format = Some(format!("{:?}", fmt).to_lowercase());
        }

        if !args.disable.is_empty() {
            self.disable = args.disable.to_vec();
        }

        self.analyzer.relaxed_assignment |= args.relaxed_assignment;
        self.analyzer.undefined_types |= args.undefined_types;

        self
    }

    /// Analyzer options with the top-level dialect applied
    pub fn analyzer_options(&self) -> Result<AnalyzerOptions> {
        let mut options = self.analyzer.clone();
        if let Some(dialect) = &self.dialect {
            options.dialect = dialect.parse().map_err(|e: String| miette::miette!(e))?;
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::OutputFormat;
    use pretty_assertions::assert_eq;
    use sqlsema_core::SqlDialect;

    const SAMPLE: &str = r#"
        schema = ["db/schema.sql"]
        files = ["queries/**/*.sql"]
        dialect = "oracle"
        disable = ["E0018"]

        [analyzer]
        max_grouping_sets = 64
        undefined_types = true
    "#;

    #[test]
    fn test_parse_config_with_analyzer_table() {
        let config = Config::from_toml(SAMPLE).unwrap();
        assert_eq!(config.schema, vec!["db/schema.sql"]);
        assert_eq!(config.disable, vec!["E0018"]);

        let options = config.analyzer_options().unwrap();
        assert_eq!(options.dialect, SqlDialect::Oracle);
        assert_eq!(options.max_grouping_sets, 64);
        assert!(options.undefined_types);
        assert_eq!(options.max_stack_depth, AnalyzerOptions::default().max_stack_depth);
    }

    #[test]
    fn test_args_override_file() {
        let schema = [PathBuf::from("other.sql")];
        let config = Config::from_toml(SAMPLE).unwrap().merge_with_args(&Overrides {
            schema: &schema,
            dialect: Some("postgresql"),
            format: Some(OutputFormat::Json),
            relaxed_assignment: true,
            ..Default::default()
        });
        assert_eq!(config.schema, vec!["other.sql"]);
        assert_eq!(config.files, vec!["queries/**/*.sql"]);
        assert_eq!(config.format.as_deref(), Some("json"));
        let options = config.analyzer_options().unwrap();
        assert_eq!(options.dialect, SqlDialect::PostgreSQL);
        assert!(options.relaxed_assignment);
    }

    #[test]
    fn test_unknown_dialect_is_a_config_error() {
        let config = Config::from_toml("dialect = \"mysql\"").unwrap();
        assert!(config.analyzer_options().is_err());
    }
}
