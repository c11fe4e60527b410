//! SQL analyzer module
//!
//! Turns raw statements into [`Query`] trees: names are bound to range
//! entries, expressions are typed, and aggregate, window and grouping rules
//! are enforced. Each statement gets its own [`state::Transformer`]; a
//! failing statement reports its error and the rest still run.

mod agg;
mod clause;
mod cte;
mod dml;
mod expr;
mod expr_kind;
mod func;
mod names;
mod relation;
mod select;
mod startwith;
mod state;
mod target;
mod type_name;

use tracing::debug;

use crate::catalog::CatalogProvider;
use crate::error::{Diagnostic, Result, Span};
use crate::query::Query;
use crate::syntax::lower::parse_sql;
use crate::syntax::{RawStmt, TypeName};
use crate::types::{BuiltinCoercion, CoercionService};

pub use state::AnalyzerOptions;
pub use type_name::ResolvedType;

use state::Transformer;

/// Everything analysis produced for one piece of SQL text
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    /// One query per statement that analysed cleanly, in source order
    pub queries: Vec<Query>,
    /// Errors and warnings, in the order they were raised
    pub diagnostics: Vec<Diagnostic>,
    /// Type names that resolved to the UNDEFINED placeholder
    pub type_deps: Vec<String>,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// SQL Analyzer - validates SQL against a schema catalog
pub struct Analyzer<'a> {
    catalog: &'a dyn CatalogProvider,
    coercion: &'a dyn CoercionService,
    options: AnalyzerOptions,
}

impl<'a> Analyzer<'a> {
    pub fn new(catalog: &'a dyn CatalogProvider) -> Self {
        Self {
            catalog,
            coercion: &BuiltinCoercion,
            options: AnalyzerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AnalyzerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replace the builtin category-based coercer
    pub fn with_coercion(mut self, coercion: &'a dyn CoercionService) -> Self {
        self.coercion = coercion;
        self
    }

    pub fn options(&self) -> &AnalyzerOptions {
        &self.options
    }

    /// Analyze SQL text and return its diagnostics
    pub fn analyze(&self, sql: &str) -> Vec<Diagnostic> {
        self.analyze_queries(sql).diagnostics
    }

    /// Analyze SQL text, keeping the query trees
    pub fn analyze_queries(&self, sql: &str) -> Analysis {
        let mut analysis = Analysis::default();
        let lowered = match parse_sql(sql, self.options.dialect) {
            Ok(lowered) => lowered,
            Err(mut diagnostic) => {
                if diagnostic.span.is_none() {
                    diagnostic.span = Some(Span::new(0, sql.len().min(50)));
                }
                analysis.diagnostics.push(diagnostic);
                return analysis;
            }
        };
        analysis.diagnostics.extend(lowered.warnings);

        for stmt in &lowered.statements {
            let (result, warnings, type_deps) = self.analyze_statement(stmt);
            analysis.diagnostics.extend(warnings);
            for dep in type_deps {
                if !analysis.type_deps.contains(&dep) {
                    analysis.type_deps.push(dep);
                }
            }
            match result {
                Ok(query) => analysis.queries.push(query),
                Err(diagnostic) => analysis.diagnostics.push(diagnostic),
            }
        }
        debug!(
            queries = analysis.queries.len(),
            diagnostics = analysis.diagnostics.len(),
            "analysis finished"
        );
        analysis
    }

    /// Analyze one already-lowered statement. Returns the query (or the
    /// error that stopped it), the warnings raised on the way and the
    /// undefined type names it depends on.
    pub fn analyze_statement(&self, stmt: &RawStmt) -> (Result<Query>, Vec<Diagnostic>, Vec<String>) {
        let mut t = Transformer::new(self.catalog, self.coercion, &self.options);
        let result = match stmt {
            RawStmt::Select(select) => t.transform_select_stmt(select),
            RawStmt::Insert(insert) => t.transform_insert(insert),
            RawStmt::Update(update) => t.transform_update(update),
            RawStmt::Delete(delete) => t.transform_delete(delete),
            RawStmt::Merge(merge) => t.transform_merge(merge),
        };
        (result, t.warnings, t.type_deps)
    }

    /// Resolve a type written as text, e.g. `numeric(10,2)` or `t.col%TYPE`
    pub fn parse_type_string(&self, text: &str) -> Result<ResolvedType> {
        let type_name = type_name::type_name_from_str(text)?;
        self.resolve_type_name(&type_name).0
    }

    /// Resolve a lowered type name, returning any warnings it raised
    pub fn resolve_type_name(&self, type_name: &TypeName) -> (Result<ResolvedType>, Vec<Diagnostic>) {
        let mut t = Transformer::new(self.catalog, self.coercion, &self.options);
        let result = t.resolve_type_name(type_name);
        (result, t.warnings)
    }
}

/// Resolve a type written as text against `catalog` with default options
pub fn parse_type_string(catalog: &dyn CatalogProvider, text: &str) -> Result<ResolvedType> {
    Analyzer::new(catalog).parse_type_string(text)
}
