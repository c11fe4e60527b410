//! Target lists: output columns, `*` expansion and assignment to table columns

use tracing::trace;

use super::expr_kind::ExprKind;
use super::relation::SYSTEM_COLUMNS;
use super::state::{error_at, Transformer};
use crate::catalog::RelationDef;
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::query::{Const, Expr, Query, RteKind, TargetEntry};
use crate::syntax::{ColumnField, ColumnRef, Indirection, Location, RawExpr, ResTarget, SelectBody, SubLinkKind};
use crate::types::{CoercionContext, Oid, INVALID_OID, RECORD_OID, UNDEFINED_OID};

/// Name and confidence of an inferred output column name. A weak name (1)
/// is replaced by a stronger one from an enclosing cast.
fn figure_colname_internal(raw: &RawExpr) -> Option<(String, u8)> {
    match raw {
        RawExpr::ColumnRef(cref) => cref.fields.iter().rev().find_map(|f| match f {
            ColumnField::Name(n) => Some((n.clone(), 2)),
            ColumnField::Star => None,
        }),
        RawExpr::Indirection { arg, indirection, .. } => {
            match indirection.iter().rev().find_map(|ind| match ind {
                Indirection::Field(name) => Some(name.clone()),
                _ => None,
            }) {
                Some(name) => Some((name, 2)),
                None => figure_colname_internal(arg),
            }
        }
        RawExpr::FuncCall(func) => Some((func.func_name().to_string(), 2)),
        RawExpr::TypeCast { arg, type_name, .. } => match figure_colname_internal(arg) {
            Some((name, 2)) => Some((name, 2)),
            inner => type_name
                .names
                .last()
                .map(|n| (n.clone(), 1))
                .or(inner),
        },
        RawExpr::Collate { arg, .. } => figure_colname_internal(arg),
        RawExpr::Case { .. } => Some(("case".to_string(), 1)),
        RawExpr::Array(..) => Some(("array".to_string(), 2)),
        RawExpr::Row(..) => Some(("row".to_string(), 2)),
        RawExpr::Coalesce(..) => Some(("coalesce".to_string(), 2)),
        RawExpr::NullIf(..) => Some(("nullif".to_string(), 2)),
        RawExpr::MinMax { greatest, .. } => {
            Some((if *greatest { "greatest" } else { "least" }.to_string(), 2))
        }
        RawExpr::GroupingFunc(..) => Some(("grouping".to_string(), 2)),
        RawExpr::Rownum(_) => Some(("rownum".to_string(), 2)),
        RawExpr::SubLink { kind, subselect, .. } => match kind {
            SubLinkKind::Exists => Some(("exists".to_string(), 2)),
            SubLinkKind::Array => Some(("array".to_string(), 2)),
            // a scalar subquery is named after its single output column
            SubLinkKind::Expr => match &subselect.body {
                SelectBody::Simple(select) => select.targets.first().and_then(|te| match &te.name {
                    Some(name) => Some((name.clone(), 2)),
                    None => figure_colname_internal(&te.val),
                }),
                _ => None,
            },
            SubLinkKind::Any(_) | SubLinkKind::All(_) => None,
        },
        _ => None,
    }
}

/// The output name of an unnamed target expression
pub(crate) fn figure_colname(raw: &RawExpr) -> String {
    figure_colname_internal(raw).map_or_else(|| "?column?".to_string(), |(name, _)| name)
}

/// Leading field names of a `rel.*` / `schema.rel.*` reference
fn star_qualifier(cref: &ColumnRef) -> Vec<&str> {
    cref.fields
        .iter()
        .filter_map(|f| match f {
            ColumnField::Name(n) => Some(n.as_str()),
            ColumnField::Star => None,
        })
        .collect()
}

fn type_mismatch(colname: &str, target: &str, source: &str, loc: Location) -> Diagnostic {
    error_at(
        DiagnosticKind::TypeMismatch,
        format!(
            "column \"{}\" is of type {} but expression is of type {}",
            colname, target, source
        ),
        loc,
    )
    .with_help("You will need to rewrite or cast the expression.")
}

impl Transformer<'_> {
    /// Analyze a SELECT list, RETURNING list or similar
    pub(crate) fn transform_target_list(&mut self, targets: &[ResTarget], kind: ExprKind) -> Result<Vec<TargetEntry>> {
        let mut tlist: Vec<TargetEntry> = Vec::with_capacity(targets.len());
        for target in targets {
            let expanded = match &target.val {
                RawExpr::ColumnRef(cref) if cref.is_star() => Some(self.expand_column_star(cref)?),
                RawExpr::Indirection {
                    arg,
                    indirection,
                    loc,
                } if matches!(indirection.last(), Some(Indirection::Star)) => {
                    Some(self.expand_indirection_star(arg, &indirection[..indirection.len() - 1], *loc)?)
                }
                _ => None,
            };
            if let Some(columns) = expanded {
                for (name, expr) in columns {
                    let resno = tlist.len() + 1;
                    tlist.push(TargetEntry::new(expr, resno, Some(name), false));
                }
                continue;
            }

            let expr = self.with_expr_kind(kind, |t| t.transform_expr(&target.val))?;
            let expr = if self.pstate().keep_unknown_outputs {
                expr
            } else {
                self.resolve_unknown(expr)
            };
            let name = target.name.clone().unwrap_or_else(|| figure_colname(&target.val));
            let resno = tlist.len() + 1;
            tlist.push(TargetEntry::new(expr, resno, Some(name), false));
        }
        self.mark_target_list_origins(&mut tlist);
        Ok(tlist)
    }

    /// Expand `*`, `rel.*` or `schema.rel.*` into (name, Var) pairs
    pub(crate) fn expand_column_star(&mut self, cref: &ColumnRef) -> Result<Vec<(String, Expr)>> {
        let loc = cref.loc;
        let qualifier = star_qualifier(cref);
        let (schema, rel) = match qualifier.as_slice() {
            [] => return self.expand_all_columns(loc),
            [rel] => (None, *rel),
            [schema, rel] => (Some(*schema), *rel),
            _ => {
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    format!("improper qualified name (too many dotted names): {}", cref.dotted()),
                    loc,
                ))
            }
        };
        let Some((levels_up, rtindex)) = self.refname_range_entry(schema, rel, loc)? else {
            return Err(self.missing_rte(schema, rel, loc));
        };
        self.expand_entry(levels_up, rtindex, Some(rel), loc)
    }

    /// Unqualified `*`: every entry whose columns are visible, in namespace order
    fn expand_all_columns(&mut self, loc: Location) -> Result<Vec<(String, Expr)>> {
        let pstate = self.pstate();
        let entries: Vec<usize> = pstate
            .namespace
            .iter()
            .filter(|ns| ns.cols_visible && (!ns.lateral_only || pstate.lateral_active))
            .map(|ns| ns.rtindex)
            .collect();
        if entries.is_empty() {
            return Err(error_at(
                DiagnosticKind::SyntaxError,
                "SELECT * with no tables specified is not valid",
                loc,
            ));
        }
        let mut out = Vec::new();
        for rtindex in entries {
            out.extend(self.expand_entry(0, rtindex, None, loc)?);
        }
        Ok(out)
    }

    /// Live columns of one entry. On a hierarchical rewrite's entry only
    /// the original columns come out, under their original names.
    fn expand_entry(
        &mut self,
        levels_up: usize,
        rtindex: usize,
        qualifier: Option<&str>,
        loc: Location,
    ) -> Result<Vec<(String, Expr)>> {
        let scope = &self.scopes[self.scope_index(levels_up)];
        let converted = scope
            .rte(rtindex)
            .filter(|rte| rte.sw_converted && !scope.suppress_hierarchy)
            .map(|rte| qualifier.filter(|q| rte.origin_names.iter().any(|n| n == q)));

        let columns = self.expand_rte_vars(levels_up, rtindex, loc)?;
        let columns: Vec<(String, Expr)> = match converted {
            None => columns,
            Some(origin) => columns
                .into_iter()
                .filter_map(|(name, expr)| {
                    let (prefix, column) = name.split_once('@')?;
                    if origin.is_some_and(|o| o != prefix) {
                        return None;
                    }
                    Some((column.to_string(), expr))
                })
                .collect(),
        };
        for (_, expr) in &columns {
            if let Expr::Var(var) = expr {
                self.mark_var_for_select(levels_up, rtindex, var.varattno);
            }
        }
        trace!(rtindex, columns = columns.len(), "expanded star");
        Ok(columns)
    }

    /// `(expr).*`: one field selection per column of a composite value
    fn expand_indirection_star(
        &mut self,
        arg: &RawExpr,
        indirection: &[Indirection],
        loc: Location,
    ) -> Result<Vec<(String, Expr)>> {
        let base = self.transform_expr(arg)?;
        let base = self.transform_indirection(base, indirection, loc)?;
        if let Expr::Var(var) = &base {
            if var.varattno == 0 {
                let (levels_up, rtindex) = (var.levelsup, var.varno);
                return self.expand_entry(levels_up, rtindex, None, loc);
            }
        }
        if let Expr::Row { args, colnames, .. } = &base {
            return Ok(colnames.iter().cloned().zip(args.iter().cloned()).collect());
        }

        let type_oid = base.type_oid();
        let catalog = self.catalog;
        let rel = catalog
            .type_by_oid(type_oid)
            .and_then(|ty| ty.relid)
            .and_then(|relid| catalog.relation(relid));
        let Some(rel) = rel else {
            let message = if type_oid == RECORD_OID {
                "record type has not been registered".to_string()
            } else {
                format!("type {} is not composite", self.type_name(type_oid, -1))
            };
            return Err(error_at(DiagnosticKind::WrongObjectType, message, loc));
        };
        // the base expression is repeated once per field
        let mut out = Vec::new();
        for (i, col) in rel.columns.iter().enumerate() {
            if col.dropped {
                continue;
            }
            out.push((
                col.name.clone(),
                Expr::FieldSelect {
                    arg: Box::new(base.clone()),
                    fieldnum: i as i32 + 1,
                    result_type: col.type_oid,
                    typmod: col.typmod,
                    collid: col.collation,
                },
            ));
        }
        Ok(out)
    }

    /// Record the base relation and attribute each plain column output
    /// comes from, looking through joins, subqueries and WITH items
    pub(crate) fn mark_target_list_origins(&self, tlist: &mut [TargetEntry]) {
        for te in tlist.iter_mut() {
            if let Expr::Var(var) = &te.expr {
                if let Some((tbl, col)) = self.var_origin(var.levelsup, var.varno, var.varattno) {
                    te.resorigtbl = tbl;
                    te.resorigcol = col;
                }
            }
        }
    }

    fn var_origin(&self, levels_up: usize, rtindex: usize, attno: i32) -> Option<(Oid, i32)> {
        if attno <= 0 || levels_up >= self.scopes.len() {
            return None;
        }
        let rte = self.scopes[self.scope_index(levels_up)].rte(rtindex)?;
        let index = usize::try_from(attno - 1).ok()?;
        match &rte.kind {
            RteKind::Relation { relid, .. } => Some((*relid, attno)),
            RteKind::Join { alias_vars, .. } => match alias_vars.get(index)? {
                Expr::Var(v) => self.var_origin(levels_up + v.levelsup, v.varno, v.varattno),
                _ => None,
            },
            RteKind::Subquery { query } => target_origin(query, index),
            RteKind::Cte { name, levels_up: cte_levels, .. } => {
                let scope = self.scopes.get(self.scope_index(levels_up + cte_levels))?;
                let cte = scope.ctes.iter().find(|c| c.name == *name)?;
                target_origin(cte.query.as_ref()?, index)
            }
            _ => None,
        }
    }

    /// The target relation of the current DML level
    pub(crate) fn target_relation(&self) -> Result<(usize, &RelationDef)> {
        let pstate = self.pstate();
        let rel = pstate.target_rtindex.and_then(|rtindex| {
            let relid = pstate.rte(rtindex)?.relid()?;
            Some((rtindex, self.catalog.relation(relid)?))
        });
        rel.ok_or_else(|| {
            error_at(
                DiagnosticKind::InvalidParameterValue,
                "statement has no target relation",
                Location::UNKNOWN,
            )
        })
    }

    /// Attribute number of an assignment target column
    pub(crate) fn target_column(&self, colname: &str, loc: Location) -> Result<i32> {
        let (_, rel) = self.target_relation()?;
        if let Some(attno) = rel.attnum(colname) {
            return Ok(attno);
        }
        if SYSTEM_COLUMNS.iter().any(|(name, _, _)| *name == colname) {
            return Err(error_at(
                DiagnosticKind::InvalidColumnReference,
                format!("cannot assign to system column \"{}\"", colname),
                loc,
            ));
        }
        Err(error_at(
            DiagnosticKind::ColumnNotFound,
            format!(
                "column \"{}\" of relation \"{}\" does not exist",
                colname, rel.name.name
            ),
            loc,
        ))
    }

    /// Analyze the value assigned to column `attno`; a bare DEFAULT becomes
    /// a set-to-default node of the column's type
    pub(crate) fn transform_assignment_source(
        &mut self,
        raw: &RawExpr,
        attno: i32,
        indirection: &[Indirection],
        kind: ExprKind,
    ) -> Result<Expr> {
        let RawExpr::SetToDefault(loc) = raw else {
            return self.with_expr_kind(kind, |t| t.transform_expr(raw));
        };
        match indirection.first() {
            Some(Indirection::Subscript { .. }) => {
                return Err(error_at(
                    DiagnosticKind::FeatureNotSupported,
                    "cannot set an array element to DEFAULT",
                    *loc,
                ))
            }
            Some(_) => {
                return Err(error_at(
                    DiagnosticKind::FeatureNotSupported,
                    "cannot set a subfield to DEFAULT",
                    *loc,
                ))
            }
            None => {}
        }
        let (_, rel) = self.target_relation()?;
        let col = rel.column(attno).ok_or_else(|| {
            error_at(
                DiagnosticKind::InvalidColumnReference,
                format!("invalid attribute number {}", attno),
                *loc,
            )
        })?;
        Ok(Expr::SetToDefault {
            type_oid: col.type_oid,
            typmod: col.typmod,
            collid: col.collation,
            location: *loc,
        })
    }

    /// Coerce `expr` for storage into column `attno` of the target relation,
    /// building field-store and array-assignment nodes for `indirection`.
    ///
    /// For INSERT (`is_insert`) an indirect assignment starts from a NULL
    /// of the column type, since there is no prior value.
    pub(crate) fn transform_assigned_expr(
        &mut self,
        expr: Expr,
        colname: &str,
        attno: i32,
        indirection: &[Indirection],
        is_insert: bool,
        loc: Location,
    ) -> Result<Expr> {
        let (rtindex, rel) = self.target_relation()?;
        let Some(col) = rel.column(attno) else {
            return Err(error_at(
                DiagnosticKind::InvalidColumnReference,
                format!("cannot assign to system column \"{}\"", colname),
                loc,
            ));
        };
        let (attrtype, attrtypmod, attrcollid) = (col.type_oid, col.typmod, col.collation);

        if !indirection.is_empty() {
            let base = if is_insert {
                Expr::Const(Const::null(attrtype, attrtypmod, attrcollid))
            } else {
                self.make_var(0, rtindex, attno, loc)?
            };
            return self.transform_assignment_indirection(
                base,
                colname,
                false,
                (attrtype, attrtypmod, attrcollid),
                indirection,
                expr,
                loc,
            );
        }
        if matches!(expr, Expr::SetToDefault { .. }) {
            return Ok(expr);
        }

        let source = expr.type_oid();
        if source == attrtype && expr.typmod() == attrtypmod {
            return Ok(expr);
        }
        match self
            .coercion
            .coerce(self.catalog, expr, attrtype, attrtypmod, CoercionContext::Assignment)
        {
            Some(coerced) => Ok(coerced),
            None if source == UNDEFINED_OID || attrtype == UNDEFINED_OID => Ok(Expr::Const(Const::null(
                attrtype,
                attrtypmod,
                attrcollid,
            ))),
            None => {
                let target = self.type_name(attrtype, attrtypmod);
                let source = self.type_name(source, -1);
                if !self.options.relaxed_assignment {
                    return Err(type_mismatch(colname, &target, &source, loc));
                }
                self.warn(
                    Diagnostic::warning(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "column \"{}\" is of type {} but expression is of type {}. Data truncated automatically.",
                            colname, target, source
                        ),
                    )
                    .at(loc.span()),
                );
                Ok(self.coercion.zero_value(self.catalog, attrtype, attrtypmod))
            }
        }
    }

    /// Build the assignment of `rhs` into a sub-object of `base`.
    ///
    /// `target` is the type, typmod and collation of `base`; the prior value
    /// of each nested sub-object is represented by a placeholder node.
    #[allow(clippy::too_many_arguments)]
    fn transform_assignment_indirection(
        &mut self,
        base: Expr,
        target_name: &str,
        target_is_array: bool,
        target: (Oid, i32, Oid),
        indirection: &[Indirection],
        rhs: Expr,
        loc: Location,
    ) -> Result<Expr> {
        let (target_type, target_typmod, _) = target;
        let Some(first) = indirection.first() else {
            return self.coerce_assignment_leaf(rhs, target_name, target_is_array, target, loc);
        };

        if let Indirection::Subscript { .. } = first {
            let run = indirection
                .iter()
                .take_while(|ind| matches!(ind, Indirection::Subscript { .. }))
                .count();
            let is_slice = indirection[..run]
                .iter()
                .any(|ind| matches!(ind, Indirection::Subscript { is_slice: true, .. }));
            let catalog = self.catalog;
            let element = match catalog.type_by_oid(target_type) {
                Some(ty) if ty.is_array() => ty.elem.unwrap_or(UNDEFINED_OID),
                _ => {
                    return Err(error_at(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "cannot subscript type {} because it does not support subscripting",
                            self.type_name(target_type, -1)
                        ),
                        loc,
                    ))
                }
            };
            let needed = if is_slice { target_type } else { element };
            let needed_collid = self.type_collation(needed);
            let placeholder = Expr::CaseTest {
                type_oid: needed,
                typmod: target_typmod,
                collid: needed_collid,
            };
            let inner = self.transform_assignment_indirection(
                placeholder,
                target_name,
                true,
                (needed, target_typmod, needed_collid),
                &indirection[run..],
                rhs,
                loc,
            )?;
            return self.subscript(base, &indirection[..run], Some(inner), loc);
        }

        let Indirection::Field(field) = first else {
            return Err(error_at(
                DiagnosticKind::SyntaxError,
                "row expansion via \"*\" is not supported here",
                loc,
            ));
        };
        let catalog = self.catalog;
        let rel = catalog
            .type_by_oid(target_type)
            .and_then(|ty| ty.relid)
            .and_then(|relid| catalog.relation(relid));
        let Some(rel) = rel else {
            return Err(error_at(
                DiagnosticKind::TypeMismatch,
                format!(
                    "cannot assign to field \"{}\" of column \"{}\" because its type {} is not a composite type",
                    field,
                    target_name,
                    self.type_name(target_type, -1)
                ),
                loc,
            ));
        };
        let Some((attno, col)) = rel.attnum(field).and_then(|n| Some((n, rel.column(n)?))) else {
            return Err(error_at(
                DiagnosticKind::ColumnNotFound,
                format!(
                    "cannot assign to field \"{}\" of column \"{}\" because there is no such column in data type {}",
                    field,
                    target_name,
                    self.type_name(target_type, -1)
                ),
                loc,
            ));
        };
        let field_target = (col.type_oid, col.typmod, col.collation);
        let placeholder = Expr::CaseTest {
            type_oid: col.type_oid,
            typmod: col.typmod,
            collid: col.collation,
        };
        let newval = self.transform_assignment_indirection(
            placeholder,
            field,
            false,
            field_target,
            &indirection[1..],
            rhs,
            loc,
        )?;
        Ok(Expr::FieldStore {
            arg: Box::new(base),
            newvals: vec![newval],
            fieldnums: vec![attno],
            result_type: target_type,
        })
    }

    fn coerce_assignment_leaf(
        &self,
        rhs: Expr,
        target_name: &str,
        target_is_array: bool,
        target: (Oid, i32, Oid),
        loc: Location,
    ) -> Result<Expr> {
        let (target_type, target_typmod, _) = target;
        let source = rhs.type_oid();
        if source == target_type {
            return Ok(rhs);
        }
        self.coercion
            .coerce(self.catalog, rhs, target_type, target_typmod, CoercionContext::Assignment)
            .ok_or_else(|| {
                let target = self.type_name(target_type, target_typmod);
                let source = self.type_name(source, -1);
                let message = if target_is_array {
                    format!(
                        "array assignment to \"{}\" requires type {} but expression is of type {}",
                        target_name, target, source
                    )
                } else {
                    format!(
                        "subfield \"{}\" is of type {} but expression is of type {}",
                        target_name, target, source
                    )
                };
                error_at(DiagnosticKind::TypeMismatch, message, loc)
                    .with_help("You will need to rewrite or cast the expression.")
            })
    }
}

fn target_origin(query: &Query, index: usize) -> Option<(Oid, i32)> {
    let te = query.visible_targets().nth(index)?;
    (te.resorigtbl != INVALID_OID).then_some((te.resorigtbl, te.resorigcol))
}

#[cfg(test)]
mod tests {
    use super::figure_colname;
    use crate::analyzer::testing::{analyze, analyze_err, catalog};
    use crate::analyzer::{Analyzer, AnalyzerOptions};
    use crate::catalog::SchemaBuilder;
    use crate::error::{Diagnostic, DiagnosticKind, Severity};
    use crate::query::{Datum, Expr, Query};
    use crate::dialect::SqlDialect;
    use crate::query::RteKind;
    use crate::syntax::lower::parse_sql;
    use crate::syntax::{RawExpr, RawStmt, SelectBody};
    use crate::types::TEXT_OID;
    use pretty_assertions::assert_eq;

    fn first_target(sql: &str) -> RawExpr {
        let mut lowered = parse_sql(&format!("SELECT {}", sql), SqlDialect::PostgreSQL).unwrap();
        match lowered.statements.remove(0) {
            RawStmt::Select(stmt) => match stmt.body {
                SelectBody::Simple(mut select) => select.targets.remove(0).val,
                other => panic!("expected a simple select, got {:?}", other),
            },
            other => panic!("expected SELECT, got {:?}", other),
        }
    }

    fn output_names(sql: &str) -> Vec<String> {
        analyze(sql)
            .target_list
            .iter()
            .filter(|te| !te.resjunk)
            .filter_map(|te| te.resname.clone())
            .collect()
    }

    #[test]
    fn test_figure_colname() {
        let cases = [
            ("t.name", "name"),
            ("lower(name)", "lower"),
            ("CAST(1 AS int8)", "int8"),
            ("CAST(name AS text)", "name"),
            ("CASE WHEN true THEN 1 END", "case"),
            ("ARRAY[1, 2]", "array"),
            ("EXISTS (SELECT 1)", "exists"),
            ("1 + 2", "?column?"),
        ];
        for (sql, expected) in cases {
            assert_eq!(figure_colname(&first_target(sql)), expected, "{}", sql);
        }
    }

    #[test]
    fn test_star_expansion() {
        assert_eq!(
            output_names("SELECT * FROM t"),
            vec!["id", "code", "name", "parent_id", "amount"]
        );
        assert_eq!(
            output_names("SELECT u.*, t.id FROM t JOIN u ON u.t_id = t.id"),
            vec!["t_id", "note", "id"]
        );
        let err = analyze_err("SELECT *");
        assert_eq!(err.message, "SELECT * with no tables specified is not valid");
        let err = analyze_err("SELECT x.* FROM t");
        assert_eq!(err.message, "missing FROM-clause entry for table \"x\"");
    }

    #[test]
    fn test_star_marks_selected_columns() {
        let query = analyze("SELECT * FROM u");
        let cols: Vec<i32> = query.rtable[0].selected_cols.iter().copied().collect();
        assert_eq!(cols, vec![1, 2]);
    }

    #[test]
    fn test_unknown_output_becomes_text() {
        let query = analyze("SELECT 'x' AS label");
        assert_eq!(query.target_list[0].expr.type_oid(), TEXT_OID);
    }

    #[test]
    fn test_origins_through_subquery() {
        let query = analyze("SELECT s.code FROM (SELECT code FROM t) s");
        let te = &query.target_list[0];
        let RteKind::Subquery { query: sub } = &query.rtable[0].kind else {
            panic!("expected a subquery entry");
        };
        assert_eq!(te.resorigtbl, sub.rtable[0].relid().unwrap());
        assert_eq!(te.resorigcol, 2);
    }

    const COMPOSITE_SCHEMA: &str = "
        CREATE TYPE pair AS (x integer, y text);
        CREATE TABLE c (id integer, p pair, arr integer[]);
    ";

    fn analyze_composite(sql: &str) -> Result<Query, Diagnostic> {
        let mut builder = SchemaBuilder::new();
        builder.parse(COMPOSITE_SCHEMA).unwrap();
        let catalog = builder.build().0;
        let analysis = Analyzer::new(&catalog).analyze_queries(sql);
        match analysis.diagnostics.into_iter().find(Diagnostic::is_error) {
            Some(err) => Err(err),
            None => Ok(analysis.queries.into_iter().next().expect("one query")),
        }
    }

    fn assigned<'q>(query: &'q Query, column: &str) -> &'q Expr {
        &query
            .target_list
            .iter()
            .find(|te| te.resname.as_deref() == Some(column))
            .expect("assigned column")
            .expr
    }

    #[test]
    fn test_relaxed_assignment_zeroes_and_warns() {
        let err = analyze_err("UPDATE t SET code = name");
        assert_eq!(err.kind, DiagnosticKind::TypeMismatch);
        assert_eq!(err.message, "column \"code\" is of type integer but expression is of type text");

        let catalog = catalog();
        let analysis = Analyzer::new(&catalog)
            .with_options(AnalyzerOptions {
                relaxed_assignment: true,
                ..Default::default()
            })
            .analyze_queries("UPDATE t SET code = name");
        assert!(!analysis.has_errors());
        assert_eq!(analysis.diagnostics.len(), 1);
        assert_eq!(analysis.diagnostics[0].severity, Severity::Warning);
        assert_eq!(
            analysis.diagnostics[0].message,
            "column \"code\" is of type integer but expression is of type text. Data truncated automatically."
        );
        let Expr::Const(zero) = assigned(&analysis.queries[0], "code") else {
            panic!("expected the zero value");
        };
        assert_eq!(zero.value, Datum::Int(0));
    }

    #[test]
    fn test_field_assignment() {
        let query = analyze_composite("UPDATE c SET p.x = 1, p.y = 'a'").unwrap();
        let Expr::FieldStore { fieldnums, arg, .. } = assigned(&query, "p") else {
            panic!("expected a field store");
        };
        assert_eq!(fieldnums, &vec![1]);
        assert!(matches!(arg.as_ref(), Expr::Var(_)));

        let err = analyze_composite("UPDATE c SET p.z = 1").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::ColumnNotFound);
        assert_eq!(
            err.message,
            "cannot assign to field \"z\" of column \"p\" because there is no such column in data type pair"
        );

        let err = analyze_composite("UPDATE c SET id.x = 1").unwrap_err();
        assert_eq!(
            err.message,
            "cannot assign to field \"x\" of column \"id\" because its type integer is not a composite type"
        );

        let err = analyze_composite("UPDATE c SET p.x = p").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TypeMismatch);
        assert_eq!(err.message, "subfield \"x\" is of type integer but expression is of type pair");
    }

    #[test]
    fn test_subscript_assignment() {
        let query = analyze_composite("UPDATE c SET arr[2] = 5, arr[1:2] = '{1,2}' WHERE id = 1").unwrap();
        let Expr::Subscript(sref) = assigned(&query, "arr") else {
            panic!("expected a subscripted assignment");
        };
        assert!(sref.assign.is_some());
        assert!(matches!(sref.container, Expr::Var(_)));

        let err = analyze_composite("UPDATE c SET arr[1] = p").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TypeMismatch);
        assert_eq!(
            err.message,
            "array assignment to \"arr\" requires type integer but expression is of type pair"
        );

        let err = analyze_composite("UPDATE c SET id[1] = 1").unwrap_err();
        assert_eq!(
            err.message,
            "cannot subscript type integer because it does not support subscripting"
        );
    }
}
