//! Table and column reference resolution
//!
//! References are resolved against the namespace of the current level
//! first and then outward. Two candidates at the same level are always an
//! error, with one exception: a MERGE statement's level prefers its first
//! namespace entry.

use tracing::trace;

use super::expr_kind::ExprKind;
use super::relation::SYSTEM_COLUMNS;
use super::state::{error_at, Transformer};
use crate::catalog::{LockMode, QualifiedName};
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::query::walker::{walk_expr, Walk};
use crate::query::{Expr, RteKind, ACL_SELECT};
use crate::syntax::{ColumnField, ColumnRef, Location};

const LATERAL_DETAIL: &str = "The combining JOIN type must be INNER or LEFT for a LATERAL reference.";

fn invalid_lateral(name: &str, loc: Location) -> Diagnostic {
    error_at(
        DiagnosticKind::InvalidColumnReference,
        format!("invalid reference to FROM-clause entry for table \"{}\"", name),
        loc,
    )
    .with_detail(LATERAL_DETAIL)
}

/// The `column` part of a hierarchical dummy name `alias@column`
pub(crate) fn dummy_suffix(name: &str) -> Option<&str> {
    name.split_once('@').map(|(_, col)| col)
}

impl Transformer<'_> {
    /// Find the visible range entry called `name`, searching outward.
    /// Returns (levels up, range-table index).
    pub(crate) fn refname_range_entry(
        &self,
        schema: Option<&str>,
        name: &str,
        loc: Location,
    ) -> Result<Option<(usize, usize)>> {
        self.refname_range_entry_from(0, schema, name, loc)
    }

    fn refname_range_entry_from(
        &self,
        start: usize,
        schema: Option<&str>,
        name: &str,
        loc: Location,
    ) -> Result<Option<(usize, usize)>> {
        let relid = match schema {
            Some(schema) => {
                let qn = QualifiedName::with_schema(schema, name);
                match self.catalog.open_relation(&qn, LockMode::AccessShare) {
                    Some(rel) => Some(rel.oid),
                    None => return Ok(None),
                }
            }
            None => None,
        };

        for levels_up in start..self.scopes.len() {
            let scope = &self.scopes[self.scope_index(levels_up)];
            let mut found = None;
            for ns in &scope.namespace {
                if !ns.rel_visible || (ns.lateral_only && !scope.lateral_active) {
                    continue;
                }
                let Some(rte) = scope.rte(ns.rtindex) else { continue };
                let matches = match relid {
                    Some(relid) => rte.alias.is_none() && rte.relid() == Some(relid),
                    None => {
                        rte.eref.aliasname == name
                            || (rte.sw_converted
                                && !scope.suppress_hierarchy
                                && rte.origin_names.iter().any(|n| n == name))
                    }
                };
                if !matches {
                    continue;
                }
                if found.is_some_and(|idx| idx != ns.rtindex) {
                    return Err(error_at(
                        DiagnosticKind::AmbiguousAlias,
                        format!("table reference \"{}\" is ambiguous", name),
                        loc,
                    ));
                }
                if ns.lateral_only && !ns.lateral_ok {
                    return Err(invalid_lateral(name, loc));
                }
                found = Some(ns.rtindex);
            }
            if let Some(rtindex) = found {
                return Ok(Some((levels_up, rtindex)));
            }
        }
        Ok(None)
    }

    /// Attribute number of `colname` in an entry of scope `scope_idx`.
    ///
    /// `qualifier` is the name the reference was qualified with, which
    /// selects the dummy columns of a hierarchical rewrite's entry.
    pub(crate) fn scan_rte_for_column(
        &self,
        scope_idx: usize,
        rtindex: usize,
        qualifier: Option<&str>,
        colname: &str,
        loc: Location,
    ) -> Result<Option<i32>> {
        let scope = &self.scopes[scope_idx];
        let Some(rte) = scope.rte(rtindex) else {
            return Ok(None);
        };
        let ambiguous = |suffix: &str| {
            error_at(
                DiagnosticKind::AmbiguousColumn,
                format!("column reference \"{}\" is ambiguous{}", colname, suffix),
                loc,
            )
        };

        let names = &rte.eref.colnames;
        let mut result = None;
        if rte.sw_converted && !scope.suppress_hierarchy {
            match qualifier.filter(|q| rte.origin_names.iter().any(|n| n == q)) {
                Some(q) => {
                    let dummy = format!("{}@{}", q, colname);
                    result = names.iter().position(|n| *n == dummy);
                }
                None => {
                    for (i, name) in names.iter().enumerate() {
                        if name == colname || dummy_suffix(name) == Some(colname) {
                            if result.is_some() {
                                return Err(ambiguous("."));
                            }
                            result = Some(i);
                        }
                    }
                }
            }
        } else {
            for (i, name) in names.iter().enumerate() {
                if name == colname {
                    if result.is_some() {
                        return Err(ambiguous(""));
                    }
                    result = Some(i);
                }
            }
        }
        if let Some(i) = result {
            return Ok(Some(i as i32 + 1));
        }

        // system columns exist only on relations with storage
        let has_storage = matches!(&rte.kind, RteKind::Relation { relkind, .. } if relkind.has_storage());
        if !has_storage {
            return Ok(None);
        }
        let Some((_, attno, _)) = SYSTEM_COLUMNS.iter().find(|(n, _, _)| *n == colname) else {
            return Ok(None);
        };
        if self.pstate().expr_kind == ExprKind::GeneratedColumn && colname != "tableoid" {
            return Err(error_at(
                DiagnosticKind::InvalidColumnReference,
                format!("cannot use system column \"{}\" in column generation expression", colname),
                loc,
            ));
        }
        Ok(Some(*attno))
    }

    /// Unqualified column lookup in one level's namespace
    fn column_in_level(&self, levels_up: usize, colname: &str, loc: Location) -> Result<Option<(usize, i32)>> {
        let scope_idx = self.scope_index(levels_up);
        let scope = &self.scopes[scope_idx];
        let mut result: Option<(usize, i32)> = None;
        for ns in &scope.namespace {
            if !ns.cols_visible || (ns.lateral_only && !scope.lateral_active) {
                continue;
            }
            let Some(attno) = self.scan_rte_for_column(scope_idx, ns.rtindex, None, colname, loc)? else {
                continue;
            };
            if result.is_some() {
                if scope.merge_use_level {
                    continue;
                }
                return Err(error_at(
                    DiagnosticKind::AmbiguousColumn,
                    format!("column reference \"{}\" is ambiguous", colname),
                    loc,
                ));
            }
            if ns.lateral_only && !ns.lateral_ok {
                let refname = scope.rte(ns.rtindex).map_or("", |rte| rte.refname());
                return Err(invalid_lateral(refname, loc));
            }
            result = Some((ns.rtindex, attno));
        }
        Ok(result)
    }

    /// Resolve an unqualified column name, searching outward
    pub(crate) fn column_to_var(&mut self, colname: &str, loc: Location) -> Result<Option<Expr>> {
        for levels_up in 0..self.scopes.len() {
            if let Some((rtindex, attno)) = self.column_in_level(levels_up, colname, loc)? {
                return self.bound_var(levels_up, rtindex, attno, loc).map(Some);
            }
        }
        Ok(None)
    }

    fn bound_var(&mut self, levels_up: usize, rtindex: usize, attno: i32, loc: Location) -> Result<Expr> {
        trace!(levels_up, rtindex, attno, "resolved column");
        let var = self.make_var(levels_up, rtindex, attno, loc)?;
        self.mark_var_for_select(levels_up, rtindex, attno);
        Ok(var)
    }

    fn whole_row(&mut self, levels_up: usize, rtindex: usize, loc: Location) -> Result<Expr> {
        trace!(levels_up, rtindex, "resolved whole-row reference");
        let var = self.make_whole_row_var(levels_up, rtindex, loc)?;
        self.mark_var_for_select(levels_up, rtindex, 0);
        Ok(var)
    }

    /// Transform a column reference into a Var
    pub(crate) fn transform_column_ref(&mut self, cref: &ColumnRef) -> Result<Expr> {
        let loc = cref.loc;
        if cref.prior {
            return Err(error_at(
                DiagnosticKind::SyntaxError,
                "PRIOR can only be used in a CONNECT BY clause",
                loc,
            ));
        }
        let star = matches!(cref.fields.last(), Some(ColumnField::Star));
        let mut names = Vec::with_capacity(cref.fields.len());
        for field in &cref.fields {
            match field {
                ColumnField::Name(n) => names.push(n.as_str()),
                ColumnField::Star if star && names.len() + 1 == cref.fields.len() => {}
                ColumnField::Star => {
                    return Err(error_at(
                        DiagnosticKind::SyntaxError,
                        format!("improper use of \"*\" in {}", cref.dotted()),
                        loc,
                    ))
                }
            }
        }

        if star {
            // `rel.*` outside a target list is a whole-row value
            return match names.as_slice() {
                [] => Err(error_at(
                    DiagnosticKind::FeatureNotSupported,
                    "row expansion via \"*\" is not supported here",
                    loc,
                )),
                [rel] => self.whole_row_ref(None, rel, loc),
                [schema, rel] => self.whole_row_ref(Some(schema), rel, loc),
                _ => Err(self.improper_name(cref)),
            };
        }

        match names.as_slice() {
            [col] => {
                if let Some(var) = self.column_to_var(col, loc)? {
                    return Ok(var);
                }
                if let Some((levels_up, rtindex)) = self.refname_range_entry(None, col, loc)? {
                    return self.whole_row(levels_up, rtindex, loc);
                }
                Err(self.missing_column(None, col, loc))
            }
            [rel, col] => self.qualified_column(None, rel, col, loc),
            [schema, rel, col] => self.qualified_column(Some(schema), rel, col, loc),
            [_, _, _, _] => Err(error_at(
                DiagnosticKind::FeatureNotSupported,
                format!("cross-database references are not implemented: {}", cref.dotted()),
                loc,
            )),
            _ => Err(self.improper_name(cref)),
        }
    }

    fn improper_name(&self, cref: &ColumnRef) -> Diagnostic {
        error_at(
            DiagnosticKind::SyntaxError,
            format!("improper qualified name (too many dotted names): {}", cref.dotted()),
            cref.loc,
        )
    }

    fn whole_row_ref(&mut self, schema: Option<&str>, rel: &str, loc: Location) -> Result<Expr> {
        match self.refname_range_entry(schema, rel, loc)? {
            Some((levels_up, rtindex)) => self.whole_row(levels_up, rtindex, loc),
            None => Err(self.missing_rte(schema, rel, loc)),
        }
    }

    fn qualified_column(
        &mut self,
        schema: Option<&str>,
        rel: &str,
        col: &str,
        loc: Location,
    ) -> Result<Expr> {
        let Some((mut levels_up, mut rtindex)) = self.refname_range_entry(schema, rel, loc)? else {
            return Err(self.missing_rte(schema, rel, loc));
        };
        loop {
            let scope_idx = self.scope_index(levels_up);
            if let Some(attno) = self.scan_rte_for_column(scope_idx, rtindex, Some(rel), col, loc)? {
                return self.bound_var(levels_up, rtindex, attno, loc);
            }
            let converted = self.scopes[scope_idx]
                .rte(rtindex)
                .is_some_and(|rte| rte.sw_converted);
            if !converted {
                return Err(self.missing_column(Some(rel), col, loc));
            }
            // the name may belong to an outer query rather than the rewrite
            self.warn(
                Diagnostic::warning(
                    DiagnosticKind::ColumnNotFound,
                    format!(
                        "Cannot match table with startwith/connectby column {}.{}, maybe it is an upper query column",
                        rel, col
                    ),
                )
                .at(loc.span()),
            );
            match self.refname_range_entry_from(levels_up + 1, schema, rel, loc)? {
                Some((next_level, next_index)) => {
                    levels_up = next_level;
                    rtindex = next_index;
                }
                None => return Err(self.missing_column(Some(rel), col, loc)),
            }
        }
    }

    /// Error for a reference to a table name no visible entry has
    pub(crate) fn missing_rte(&self, schema: Option<&str>, name: &str, loc: Location) -> Diagnostic {
        let err = |message: String| error_at(DiagnosticKind::TableNotFound, message, loc);
        let found = self.scopes.iter().rev().find_map(|scope| {
            scope.rtable.iter().enumerate().find_map(|(i, rte)| {
                let relname_matches = match &rte.kind {
                    RteKind::Relation { relname, .. } => {
                        relname == name
                            && schema.map_or(true, |s| {
                                rte.relid()
                                    .and_then(|oid| self.catalog.relation(oid))
                                    .is_some_and(|r| r.name.schema.as_deref() == Some(s))
                            })
                    }
                    _ => false,
                };
                (relname_matches || rte.eref.aliasname == name).then_some((i + 1, rte))
            })
        });
        let Some((rtindex, rte)) = found else {
            return err(format!("missing FROM-clause entry for table \"{}\"", name));
        };

        // the entry is reachable, just under its alias
        let bad_alias = rte.alias.is_some()
            && rte.eref.aliasname != name
            && self
                .refname_range_entry(None, &rte.eref.aliasname, loc)
                .ok()
                .flatten()
                .is_some_and(|(_, idx)| idx == rtindex);
        let message = format!("invalid reference to FROM-clause entry for table \"{}\"", name);
        if bad_alias {
            err(message).with_help(format!(
                "Perhaps you meant to reference the table alias \"{}\".",
                rte.eref.aliasname
            ))
        } else {
            err(message).with_help(format!(
                "There is an entry for table \"{}\", but it cannot be referenced from this part of the query.",
                name
            ))
        }
    }

    /// Error for a column no visible entry has
    pub(crate) fn missing_column(&self, relname: Option<&str>, colname: &str, loc: Location) -> Diagnostic {
        let message = match relname {
            Some(rel) => format!("column {}.{} does not exist", rel, colname),
            None => format!("column \"{}\" does not exist", colname),
        };
        let err = error_at(DiagnosticKind::ColumnNotFound, message, loc);

        let elsewhere = self.scopes.iter().rev().find_map(|scope| {
            scope.rtable.iter().find(|rte| {
                relname.map_or(true, |r| rte.eref.aliasname == r)
                    && rte.eref.colnames.iter().any(|c| c == colname)
            })
        });
        if let Some(rte) = elsewhere {
            return err.with_help(format!(
                "There is a column named \"{}\" in table \"{}\", but it cannot be referenced from this part of the query.",
                colname,
                rte.eref.aliasname
            ));
        }

        let candidates = self.scopes.iter().rev().flat_map(|scope| {
            scope
                .namespace
                .iter()
                .filter(|ns| ns.cols_visible)
                .filter_map(|ns| scope.rte(ns.rtindex))
                .filter(|rte| relname.map_or(true, |r| rte.refname() == r))
                .flat_map(|rte| rte.eref.colnames.iter())
        });
        match find_similar_name(candidates, colname) {
            Some(suggestion) => err.with_help(format!("Did you mean '{}'?", suggestion)),
            None => err,
        }
    }

    /// Record that column `attno` of an entry is read.
    ///
    /// Join columns are traced through to the inputs they come from;
    /// a whole-row reference to a join marks both inputs.
    pub(crate) fn mark_var_for_select(&mut self, levels_up: usize, rtindex: usize, attno: i32) {
        let scope_idx = self.scope_index(levels_up);
        let scope = &self.scopes[scope_idx];
        let Some(rte) = scope.rte(rtindex) else { return };
        if let RteKind::Join { alias_vars, .. } = &rte.kind {
            if attno == 0 {
                if let Some(members) = scope.join_members.get(&rtindex).copied() {
                    for member in members {
                        self.mark_var_for_select(levels_up, member, 0);
                    }
                }
                return;
            }
            let Some(alias_var) = usize::try_from(attno - 1).ok().and_then(|i| alias_vars.get(i)) else {
                return;
            };
            let mut inputs = Vec::new();
            let _ = walk_expr(alias_var, 0, &mut |e: &Expr, _| -> std::result::Result<Walk, ()> {
                if let Expr::Var(v) = e {
                    inputs.push((v.varno, v.varattno));
                }
                Ok(Walk::Continue)
            });
            for (varno, varattno) in inputs {
                self.mark_var_for_select(levels_up, varno, varattno);
            }
            return;
        }
        trace!(levels_up, rtindex, attno, "marking column for select");
        if let Some(rte) = self.scopes[scope_idx].rte_mut(rtindex) {
            rte.required_perms |= ACL_SELECT;
            rte.selected_cols.insert(attno);
        }
    }
}

/// Closest candidate within edit distance 3, ignoring case
fn find_similar_name<'a>(candidates: impl Iterator<Item = &'a String>, name: &str) -> Option<String> {
    let name_lower = name.to_lowercase();
    let mut best: Option<(usize, &str)> = None;
    for candidate in candidates.filter(|c| !c.is_empty()) {
        let distance = levenshtein_distance(&name_lower, &candidate.to_lowercase());
        if distance <= 3 && best.map_or(true, |(d, _)| distance < d) {
            best = Some((distance, candidate));
        }
    }
    best.map(|(_, name)| name.to_string())
}

/// Edit distance, two rows at a time
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0; b.len() + 1];
    for (i, ca) in a.chars().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != *cb);
            cur[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::state::{NamespaceItem, ParseState};
    use crate::analyzer::AnalyzerOptions;
    use crate::catalog::{Catalog, ColumnDef, RelKind};
    use crate::query::{Alias, RangeTblEntry, Var};
    use crate::syntax::{FromItem, RangeVar};
    use crate::types::{BuiltinCoercion, INT4_OID, TEXT_OID, TID_OID};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.create_relation(
            &QualifiedName::new("t"),
            RelKind::Table,
            vec![ColumnDef::new("id", INT4_OID, -1), ColumnDef::new("name", TEXT_OID, -1)],
        );
        catalog.create_relation(
            &QualifiedName::new("u"),
            RelKind::Table,
            vec![ColumnDef::new("id", INT4_OID, -1), ColumnDef::new("t_id", INT4_OID, -1)],
        );
        catalog.create_relation(
            &QualifiedName::new("v"),
            RelKind::View,
            vec![ColumnDef::new("id", INT4_OID, -1)],
        );
        catalog
    }

    fn with_from<'a>(
        catalog: &'a Catalog,
        options: &'a AnalyzerOptions,
        items: &[FromItem],
    ) -> Transformer<'a> {
        let mut t = Transformer::new(catalog, &BuiltinCoercion, options);
        t.transform_from_clause(items).unwrap();
        t
    }

    fn rel(name: &str) -> FromItem {
        FromItem::Relation(RangeVar::new(name))
    }

    fn var(e: &Expr) -> &Var {
        e.as_var().expect("expected a Var")
    }

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("name", "name"), 0);
        assert_eq!(levenshtein_distance("nme", "name"), 1);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_unqualified_and_qualified_columns() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(&catalog, &options, &[rel("t"), rel("u")]);

        let e = t.transform_column_ref(&ColumnRef::new(&["name"])).unwrap();
        assert_eq!((var(&e).varno, var(&e).varattno), (1, 2));

        let e = t.transform_column_ref(&ColumnRef::new(&["u", "id"])).unwrap();
        assert_eq!((var(&e).varno, var(&e).varattno), (2, 1));

        let err = t.transform_column_ref(&ColumnRef::new(&["id"])).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::AmbiguousColumn);
        assert_eq!(err.message, "column reference \"id\" is ambiguous");

        let rte = t.pstate().rte(1).unwrap();
        assert!(rte.selected_cols.contains(&2));
        assert_eq!(rte.required_perms, ACL_SELECT);
    }

    #[test]
    fn test_merge_level_prefers_first_entry() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(&catalog, &options, &[rel("t"), rel("u")]);
        t.pstate_mut().merge_use_level = true;
        let e = t.transform_column_ref(&ColumnRef::new(&["id"])).unwrap();
        assert_eq!(var(&e).varno, 1);
    }

    #[test]
    fn test_outer_reference_counts_levels() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(&catalog, &options, &[rel("t")]);
        t.scopes.push(ParseState::default());
        t.transform_from_clause(&[rel("u")]).unwrap();

        let e = t.transform_column_ref(&ColumnRef::new(&["name"])).unwrap();
        assert_eq!((var(&e).levelsup, var(&e).varno), (1, 1));
        let e = t.transform_column_ref(&ColumnRef::new(&["id"])).unwrap();
        assert_eq!(var(&e).levelsup, 0);
    }

    #[test]
    fn test_system_columns() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(&catalog, &options, &[rel("t"), rel("v")]);

        let e = t.transform_column_ref(&ColumnRef::new(&["t", "ctid"])).unwrap();
        assert_eq!((var(&e).varattno, var(&e).vartype), (-1, TID_OID));

        // views have no system columns
        let err = t.transform_column_ref(&ColumnRef::new(&["v", "ctid"])).unwrap_err();
        assert_eq!(err.message, "column v.ctid does not exist");

        t.pstate_mut().expr_kind = ExprKind::GeneratedColumn;
        let err = t.transform_column_ref(&ColumnRef::new(&["t", "xmin"])).unwrap_err();
        assert_eq!(
            err.message,
            "cannot use system column \"xmin\" in column generation expression"
        );
        assert!(t.transform_column_ref(&ColumnRef::new(&["t", "tableoid"])).is_ok());
    }

    #[test]
    fn test_whole_row_reference() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(&catalog, &options, &[rel("t")]);
        let e = t.transform_column_ref(&ColumnRef::new(&["t"])).unwrap();
        let rowtype = catalog.find_relation(&QualifiedName::new("t")).unwrap().rowtype;
        assert_eq!((var(&e).varattno, var(&e).vartype), (0, rowtype));
        assert!(t.pstate().rte(1).unwrap().selected_cols.contains(&0));

        let err = t.transform_column_ref(&ColumnRef::new(&["*"])).unwrap_err();
        assert_eq!(err.message, "row expansion via \"*\" is not supported here");
    }

    #[test]
    fn test_missing_rte_hints() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(
            &catalog,
            &options,
            &[FromItem::Relation(RangeVar::new("t").with_alias("x"))],
        );
        let err = t.transform_column_ref(&ColumnRef::new(&["t", "id"])).unwrap_err();
        assert_eq!(err.message, "invalid reference to FROM-clause entry for table \"t\"");
        assert_eq!(
            err.help.as_deref(),
            Some("Perhaps you meant to reference the table alias \"x\".")
        );

        let err = t.transform_column_ref(&ColumnRef::new(&["w", "id"])).unwrap_err();
        assert_eq!(err.message, "missing FROM-clause entry for table \"w\"");
    }

    #[test]
    fn test_missing_column_suggestion() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(&catalog, &options, &[rel("t")]);
        let err = t.transform_column_ref(&ColumnRef::new(&["nmae"])).unwrap_err();
        assert_eq!(err.message, "column \"nmae\" does not exist");
        assert_eq!(err.help.as_deref(), Some("Did you mean 'name'?"));
    }

    #[test]
    fn test_column_hidden_in_other_level_hint() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = with_from(&catalog, &options, &[rel("t")]);
        // an entry that is in the range table but not in the namespace
        t.pstate_mut().namespace.clear();
        let err = t.transform_column_ref(&ColumnRef::new(&["name"])).unwrap_err();
        assert_eq!(
            err.help.as_deref(),
            Some("There is a column named \"name\" in table \"t\", but it cannot be referenced from this part of the query.")
        );
    }

    #[test]
    fn test_lateral_reference_to_nullable_side() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = Transformer::new(&catalog, &BuiltinCoercion, &options);
        t.transform_from_clause(&[rel("t")]).unwrap();
        let ns = &mut t.pstate_mut().namespace[0];
        ns.lateral_only = true;
        ns.lateral_ok = false;
        t.pstate_mut().lateral_active = true;

        let err = t.transform_column_ref(&ColumnRef::new(&["t", "id"])).unwrap_err();
        assert_eq!(err.message, "invalid reference to FROM-clause entry for table \"t\"");
        assert_eq!(err.detail.as_deref(), Some(LATERAL_DETAIL));

        // without LATERAL the entry is simply not visible
        t.pstate_mut().lateral_active = false;
        let err = t.transform_column_ref(&ColumnRef::new(&["t", "id"])).unwrap_err();
        assert!(err.help.is_some());
    }

    #[test]
    fn test_ambiguous_table_reference() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = Transformer::new(&catalog, &BuiltinCoercion, &options);
        let rte = |name: &str| {
            RangeTblEntry::new(RteKind::Result, None, Alias::new(name, vec!["a".to_string()]))
        };
        let first = t.pstate_mut().add_rte(rte("s"));
        let second = t.pstate_mut().add_rte(rte("s"));
        t.pstate_mut().namespace = vec![NamespaceItem::new(first), NamespaceItem::new(second)];
        let err = t.refname_range_entry(None, "s", Location::UNKNOWN).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::AmbiguousAlias);
        assert_eq!(err.message, "table reference \"s\" is ambiguous");
    }

    #[test]
    fn test_hierarchy_dummy_columns() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = Transformer::new(&catalog, &BuiltinCoercion, &options);
        let names = ["t@id", "t@name", "u@id", "level"];
        let mut rte = RangeTblEntry::new(
            RteKind::Cte {
                name: "tmp_result".to_string(),
                levels_up: 0,
                self_reference: false,
                coltypes: vec![INT4_OID, TEXT_OID, INT4_OID, INT4_OID],
                coltypmods: vec![-1; 4],
                colcollations: vec![0; 4],
            },
            None,
            Alias::new("tmp_result", names.iter().map(|s| s.to_string()).collect()),
        );
        rte.sw_converted = true;
        rte.origin_names = vec!["t".to_string(), "u".to_string()];
        let idx = t.pstate_mut().add_rte(rte);
        t.pstate_mut().namespace.push(NamespaceItem::new(idx));

        let e = t.transform_column_ref(&ColumnRef::new(&["u", "id"])).unwrap();
        assert_eq!(var(&e).varattno, 3);
        let e = t.transform_column_ref(&ColumnRef::new(&["name"])).unwrap();
        assert_eq!(var(&e).varattno, 2);
        let e = t.transform_column_ref(&ColumnRef::new(&["level"])).unwrap();
        assert_eq!(var(&e).varattno, 4);

        let err = t.transform_column_ref(&ColumnRef::new(&["id"])).unwrap_err();
        assert_eq!(err.message, "column reference \"id\" is ambiguous.");

        let err = t.transform_column_ref(&ColumnRef::new(&["t", "nope"])).unwrap_err();
        assert_eq!(err.message, "column t.nope does not exist");
        assert_eq!(t.warnings.len(), 1);

        // with hierarchy mapping suppressed only exact names resolve
        t.pstate_mut().suppress_hierarchy = true;
        let e = t.transform_column_ref(&ColumnRef::new(&["t@id"])).unwrap();
        assert_eq!(var(&e).varattno, 1);
        assert!(t.transform_column_ref(&ColumnRef::new(&["name"])).is_err());
    }
}
