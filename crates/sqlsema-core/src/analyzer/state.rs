//! Per-level parse state and the transformer that owns the scope stack

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, warn};

use super::expr_kind::ExprKind;
use crate::catalog::CatalogProvider;
use crate::dialect::SqlDialect;
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::query::{
    CommonTableExpr, JoinTreeNode, Query, RangeTblEntry, StartWithOptions,
};
use crate::stack;
use crate::syntax::{LockStrength, LockingClause, Location, SelectStmt, WindowDef};
use crate::types::{
    format_type, CoercionService, Oid, DEFAULT_COLLATION_OID, INVALID_OID,
};

/// An error positioned at `loc`
pub(crate) fn error_at(kind: DiagnosticKind, message: impl Into<String>, loc: Location) -> Diagnostic {
    Diagnostic::error(kind, message).at(loc.span())
}

/// Analyzer configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AnalyzerOptions {
    pub dialect: SqlDialect,
    /// Upper bound on the number of expanded grouping sets
    pub max_grouping_sets: usize,
    /// Replace values that fail assignment coercion with a zero value and
    /// warn, instead of failing
    pub relaxed_assignment: bool,
    /// Resolve unknown type names to the UNDEFINED placeholder with a warning
    pub undefined_types: bool,
    /// Nesting bound of expression and query transforms
    pub max_stack_depth: usize,
    /// Package being compiled; grants access to its private members
    pub current_package: Option<String>,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            dialect: SqlDialect::default(),
            max_grouping_sets: 4096,
            relaxed_assignment: false,
            undefined_types: false,
            max_stack_depth: 1000,
            current_package: None,
        }
    }
}

/// One visible range entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NamespaceItem {
    pub rtindex: usize,
    /// Visible as a relation name (`t.col`, `t.*`)
    pub rel_visible: bool,
    /// Its columns are visible unqualified
    pub cols_visible: bool,
    /// Visible only to LATERAL items
    pub lateral_only: bool,
    /// A LATERAL reference to it is legal
    pub lateral_ok: bool,
}

impl NamespaceItem {
    pub fn new(rtindex: usize) -> Self {
        Self {
            rtindex,
            rel_visible: true,
            cols_visible: true,
            lateral_only: false,
            lateral_ok: true,
        }
    }

    pub fn columns_only(rtindex: usize) -> Self {
        Self {
            rel_visible: false,
            ..Self::new(rtindex)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CteState {
    Pending,
    NonRecursiveTerm,
    RecursiveTerm,
    Done,
}

/// A WITH item of some query level
#[derive(Debug, Clone)]
pub(crate) struct CteEntry {
    pub name: String,
    pub aliascolnames: Vec<String>,
    pub raw: Box<SelectStmt>,
    pub state: CteState,
    pub recursive: bool,
    /// Forward references are not visible in a non-recursive WITH
    pub visible: bool,
    pub query: Option<Query>,
    pub colnames: Vec<String>,
    pub coltypes: Vec<Oid>,
    pub coltypmods: Vec<i32>,
    pub colcollations: Vec<Oid>,
    pub refcount: usize,
    pub sw_options: Option<StartWithOptions>,
    pub location: Location,
}

impl CteEntry {
    pub fn new(name: String, aliascolnames: Vec<String>, raw: Box<SelectStmt>, location: Location) -> Self {
        Self {
            name,
            aliascolnames,
            raw,
            state: CteState::Pending,
            recursive: false,
            visible: false,
            query: None,
            colnames: Vec::new(),
            coltypes: Vec::new(),
            coltypmods: Vec::new(),
            colcollations: Vec::new(),
            refcount: 0,
            sw_options: None,
            location,
        }
    }

    /// The analyzed form, once the body is done
    pub fn finish(self) -> Option<CommonTableExpr> {
        let query = self.query?;
        Some(CommonTableExpr {
            name: self.name,
            aliascolnames: self.aliascolnames,
            query: Box::new(query),
            recursive: self.recursive,
            refcount: self.refcount,
            colnames: self.colnames,
            coltypes: self.coltypes,
            coltypmods: self.coltypmods,
            colcollations: self.colcollations,
            sw_options: self.sw_options,
            location: self.location,
        })
    }
}

/// Analysis state of one query level
#[derive(Debug, Default)]
pub(crate) struct ParseState {
    pub rtable: Vec<RangeTblEntry>,
    pub joinlist: Vec<JoinTreeNode>,
    pub namespace: Vec<NamespaceItem>,
    pub ctes: Vec<CteEntry>,
    pub expr_kind: ExprKind,
    pub has_aggs: bool,
    pub has_window_funcs: bool,
    pub has_target_srfs: bool,
    pub has_sublinks: bool,
    pub lateral_active: bool,
    pub locking: Vec<LockingClause>,
    pub locked_from_parent: Option<LockStrength>,
    /// Named windows first, then inline specs in order of appearance
    pub windowdefs: Vec<WindowDef>,
    /// The WITH item (owning scope index, item index) whose body this level is
    pub parent_cte: Option<(usize, usize)>,
    /// On duplicate column names, the first namespace entry wins (MERGE)
    pub merge_use_level: bool,
    /// Direct inputs of each join entry
    pub join_members: BTreeMap<usize, [usize; 2]>,
    pub suppress_hierarchy: bool,
    /// DML result relation
    pub target_rtindex: Option<usize>,
    /// Leave unknown-type outputs unresolved; set-operation arms resolve
    /// them against the other arm instead
    pub keep_unknown_outputs: bool,
}

impl ParseState {
    pub fn rte(&self, rtindex: usize) -> Option<&RangeTblEntry> {
        rtindex.checked_sub(1).and_then(|i| self.rtable.get(i))
    }

    pub fn rte_mut(&mut self, rtindex: usize) -> Option<&mut RangeTblEntry> {
        rtindex.checked_sub(1).and_then(|i| self.rtable.get_mut(i))
    }

    /// Append a range entry, returning its 1-based index
    pub fn add_rte(&mut self, rte: RangeTblEntry) -> usize {
        debug!(refname = rte.refname(), rtindex = self.rtable.len() + 1, "adding range entry");
        self.rtable.push(rte);
        self.rtable.len()
    }
}

/// Drives analysis of one statement. `scopes` is never empty: the bottom
/// entry is the statement's own level.
pub(crate) struct Transformer<'a> {
    pub catalog: &'a dyn CatalogProvider,
    pub coercion: &'a dyn CoercionService,
    pub options: &'a AnalyzerOptions,
    pub scopes: Vec<ParseState>,
    pub warnings: Vec<Diagnostic>,
    /// Names that resolved to the UNDEFINED placeholder
    pub type_deps: Vec<String>,
    depth: usize,
    sw_subquery_count: usize,
}

impl<'a> Transformer<'a> {
    pub fn new(
        catalog: &'a dyn CatalogProvider,
        coercion: &'a dyn CoercionService,
        options: &'a AnalyzerOptions,
    ) -> Self {
        Self {
            catalog,
            coercion,
            options,
            scopes: vec![ParseState::default()],
            warnings: Vec::new(),
            type_deps: Vec::new(),
            depth: 0,
            sw_subquery_count: 0,
        }
    }

    pub fn pstate(&self) -> &ParseState {
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn pstate_mut(&mut self) -> &mut ParseState {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    /// Absolute index of the scope `levels_up` levels out
    pub fn scope_index(&self, levels_up: usize) -> usize {
        self.scopes.len() - 1 - levels_up
    }

    /// Run `f` in a fresh child level; the level is popped even on error
    pub fn with_scope<T>(
        &mut self,
        scope: ParseState,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(T, ParseState)> {
        self.scopes.push(scope);
        debug!(depth = self.scopes.len(), "push parse state");
        let result = f(self);
        let scope = self.scopes.pop().unwrap_or_default();
        debug!(depth = self.scopes.len(), "pop parse state");
        result.map(|value| (value, scope))
    }

    /// Guard a recursive transform against unbounded nesting
    pub fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.depth >= self.options.max_stack_depth {
            return Err(Diagnostic::error(
                DiagnosticKind::StackDepthExceeded,
                "stack depth limit exceeded",
            )
            .with_help(format!(
                "Increase max_stack_depth (currently {}) if the statement is legitimately this deep.",
                self.options.max_stack_depth
            )));
        }
        self.depth += 1;
        let result = stack::maybe_grow(|| f(self));
        self.depth -= 1;
        result
    }

    /// Run `f` with the current level's expression kind set to `kind`
    pub fn with_expr_kind<T>(
        &mut self,
        kind: ExprKind,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = std::mem::replace(&mut self.pstate_mut().expr_kind, kind);
        let result = f(self);
        self.pstate_mut().expr_kind = saved;
        result
    }

    pub fn warn(&mut self, diagnostic: Diagnostic) {
        warn!(code = diagnostic.code(), "{}", diagnostic.message);
        self.warnings.push(diagnostic);
    }

    pub fn type_name(&self, oid: Oid, typmod: i32) -> String {
        format_type(self.catalog, oid, typmod)
    }

    /// Collation a value of `oid` carries by default
    pub fn type_collation(&self, oid: Oid) -> Oid {
        match self.catalog.type_by_oid(oid) {
            Some(ty) if ty.collatable => DEFAULT_COLLATION_OID,
            _ => INVALID_OID,
        }
    }

    pub fn next_sw_subquery_name(&mut self) -> String {
        self.sw_subquery_count += 1;
        format!("sw_subquery_{}", self.sw_subquery_count)
    }
}
