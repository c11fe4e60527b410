//! SQL dialect support

use serde::{Deserialize, Serialize};
use sqlparser::dialect::{Dialect, GenericDialect, PostgreSqlDialect};
use std::str::FromStr;

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    PostgreSQL,
    /// A-compatible mode: hierarchical queries, `PRIOR`, `ROWNUM`
    Oracle,
}

impl SqlDialect {
    /// Get the sqlparser dialect for parsing
    pub fn parser_dialect(&self) -> Box<dyn Dialect> {
        match self {
            SqlDialect::PostgreSQL => Box::new(PostgreSqlDialect {}),
            // hierarchical clauses are lifted out before parsing; the generic
            // dialect is the most permissive for the rest
            SqlDialect::Oracle => Box::new(GenericDialect {}),
        }
    }

    /// Get default schema name for this dialect
    pub fn default_schema(&self) -> &'static str {
        "public"
    }

    /// Whether START WITH / CONNECT BY and its pseudo columns are recognised
    pub fn supports_hierarchical_queries(&self) -> bool {
        matches!(self, SqlDialect::Oracle)
    }

    /// Whether an unqualified `rownum` is the ROWNUM pseudo column
    pub fn supports_rownum(&self) -> bool {
        matches!(self, SqlDialect::Oracle)
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgresql" | "postgres" | "pg" => Ok(SqlDialect::PostgreSQL),
            "oracle" | "a" | "ora" => Ok(SqlDialect::Oracle),
            "mysql" | "sqlite" => Err(format!(
                "{} dialect is not supported. Supported dialects: postgresql, oracle.",
                s
            )),
            _ => Err(format!(
                "Unknown dialect: '{}'. Supported dialects: postgresql, oracle.",
                s
            )),
        }
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::Oracle => write!(f, "oracle"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dialect_names() {
        assert_eq!("pg".parse::<SqlDialect>(), Ok(SqlDialect::PostgreSQL));
        assert_eq!("Oracle".parse::<SqlDialect>(), Ok(SqlDialect::Oracle));
        assert!("mysql".parse::<SqlDialect>().is_err());
        assert!("nope".parse::<SqlDialect>().is_err());
    }

    #[test]
    fn test_only_oracle_has_hierarchical_syntax() {
        assert!(SqlDialect::Oracle.supports_hierarchical_queries());
        assert!(!SqlDialect::PostgreSQL.supports_hierarchical_queries());
    }
}
