//! sqlsema-core: semantic analysis of SQL statements
//!
//! This library binds names, types expressions and checks grouping rules for
//! SELECT / INSERT / UPDATE / DELETE / MERGE statements against a catalog
//! built from schema DDL, without requiring a database connection. The
//! output is a [`query::Query`] tree per statement plus diagnostics.

pub mod analyzer;
pub mod catalog;
pub mod dialect;
pub mod error;
pub mod query;
mod stack;
pub mod syntax;
pub mod types;

pub use analyzer::{parse_type_string, Analysis, Analyzer, AnalyzerOptions, ResolvedType};
pub use catalog::{Catalog, CatalogProvider, ColumnDef, QualifiedName, RelationDef, SchemaBuilder};
pub use dialect::SqlDialect;
pub use error::{Diagnostic, DiagnosticKind, Severity, Span};
pub use query::Query;
