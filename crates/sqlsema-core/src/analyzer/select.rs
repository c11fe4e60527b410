//! SELECT statements: plain selects, VALUES lists and set operations
//!
//! Every entry point here runs on the current top of the scope stack and
//! leaves that level's range table, join tree and flags in the returned
//! [`Query`]. The caller owns pushing and popping the level.

use tracing::debug;

use super::expr_kind::ExprKind;
use super::state::{error_at, CteEntry, NamespaceItem, ParseState, Transformer};
use crate::error::{DiagnosticKind, Result};
use crate::query::walker::locate_var_of_level;
use crate::query::{
    CommandType, Expr, JoinTreeNode, Query, RowMarkClause, RteKind, SetOperationStmt,
    SetOperationTree, TargetEntry, Var, ACL_SELECT_FOR_UPDATE,
};
use crate::syntax::{self, Location, LockStrength, RawExpr, SelectBody, SelectStmt, SetOpKind, SimpleSelect};
use crate::types::{CoercionContext, Oid, INT8_OID};

pub(crate) fn lock_clause_name(strength: LockStrength) -> &'static str {
    match strength {
        LockStrength::Update => "FOR UPDATE",
        LockStrength::Share => "FOR SHARE",
    }
}

/// One output column of a set-operation arm
struct SetOpColumn {
    type_oid: Oid,
    typmod: i32,
    collid: Oid,
    name: String,
    loc: Location,
}

fn leftmost_leaf(tree: &SetOperationTree) -> usize {
    match tree {
        SetOperationTree::RangeTblRef(rti) => *rti,
        SetOperationTree::SetOp(op) => leftmost_leaf(&op.larg),
    }
}

impl Transformer<'_> {
    /// Analyze a SELECT (or VALUES, or set operation) on the current level
    pub(crate) fn transform_select_stmt(&mut self, stmt: &SelectStmt) -> Result<Query> {
        self.guarded(|t| {
            t.pstate_mut().locking = stmt.locking.clone();
            if let Some(with) = &stmt.with {
                t.transform_with_clause(with)?;
            }
            let mut query = match &stmt.body {
                SelectBody::Simple(select) => t.transform_simple_select(stmt, select)?,
                SelectBody::Values(rows) => t.transform_values_select(stmt, rows)?,
                SelectBody::SetOp { .. } => t.transform_set_operations(stmt)?,
            };
            query.cte_list = t
                .pstate_mut()
                .ctes
                .drain(..)
                .filter_map(CteEntry::finish)
                .collect();
            if stmt.with.as_ref().is_some_and(|w| w.recursive) {
                query.has_recursive = true;
            }
            Ok(query)
        })
    }

    /// A boolean condition (WHERE, HAVING, JOIN/ON, ...)
    pub(crate) fn transform_where_clause(
        &mut self,
        raw: &RawExpr,
        kind: ExprKind,
        construct: &str,
    ) -> Result<Expr> {
        let expr = self.with_expr_kind(kind, |t| t.transform_expr(raw))?;
        self.coerce_to_boolean(expr, construct)
    }

    fn transform_simple_select(&mut self, stmt: &SelectStmt, select: &SimpleSelect) -> Result<Query> {
        let mut query = Query::new(CommandType::Select);

        match &select.start_with {
            Some(clause) if !self.pstate().suppress_hierarchy => {
                self.transform_start_with(&select.from, select.where_clause.as_ref(), clause)?;
                query.has_recursive = true;
            }
            _ => self.transform_from_clause(&select.from)?,
        }

        self.load_window_defs(&select.windows)?;
        query.target_list = self.transform_target_list(&select.targets, ExprKind::SelectTarget)?;

        query.jointree.quals = select
            .where_clause
            .as_ref()
            .map(|w| self.transform_where_clause(w, ExprKind::Where, "WHERE"))
            .transpose()?;
        query.having_qual = select
            .having
            .as_ref()
            .map(|h| self.transform_where_clause(h, ExprKind::Having, "HAVING"))
            .transpose()?;

        query.sort_clause = self.transform_sort_clause(&stmt.order_by, &mut query.target_list)?;
        let (group_clause, grouping_sets) = self.transform_group_clause(&select.group_by, &mut query.target_list)?;
        query.group_clause = group_clause;
        query.grouping_sets = grouping_sets;

        match &select.distinct {
            None => {}
            Some(on) if on.is_empty() => {
                query.distinct_clause = self.transform_distinct_clause(&mut query.target_list, &query.sort_clause)?;
            }
            Some(on) => {
                query.distinct_clause =
                    self.transform_distinct_on_clause(on, &mut query.target_list, &query.sort_clause)?;
                query.has_distinct_on = true;
            }
        }

        query.limit_offset = self.transform_limit(stmt.offset.as_ref(), ExprKind::Offset, "OFFSET")?;
        query.limit_count = self.transform_limit(stmt.limit.as_ref(), ExprKind::Limit, "LIMIT")?;
        query.window_clause = self.transform_window_clauses(&mut query.target_list)?;

        self.finish_level(&mut query);
        self.check_recursive_term(&query, stmt.loc)?;
        if query.has_aggs
            || !query.group_clause.is_empty()
            || !query.grouping_sets.is_empty()
            || query.having_qual.is_some()
        {
            self.check_grouping(&mut query)?;
        }
        self.check_select_locking(&query, stmt)?;
        self.apply_row_marks(&mut query)?;
        debug!(
            targets = query.target_list.len(),
            rtable = query.rtable.len(),
            has_aggs = query.has_aggs,
            "analyzed SELECT"
        );
        Ok(query)
    }

    fn transform_values_select(&mut self, stmt: &SelectStmt, rows: &[Vec<RawExpr>]) -> Result<Query> {
        let mut query = Query::new(CommandType::Select);
        if let Some(lc) = stmt.locking.first() {
            return Err(error_at(
                DiagnosticKind::FeatureNotSupported,
                format!("{} cannot be applied to VALUES", lock_clause_name(lc.strength)),
                lc.loc,
            ));
        }

        let width = rows.first().map_or(0, Vec::len);
        let mut lists = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != width {
                let loc = row.first().map_or(stmt.loc, RawExpr::location);
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    "VALUES lists must all be the same length",
                    loc,
                ));
            }
            lists.push(self.with_expr_kind(ExprKind::Values, |t| t.transform_list(row))?);
        }

        let (coltypes, coltypmods, colcollations) = self.values_column_types(&lists)?;
        let mut coerced = Vec::with_capacity(lists.len());
        for row in lists {
            let mut out = Vec::with_capacity(row.len());
            for (i, expr) in row.into_iter().enumerate() {
                let loc = expr.location();
                out.push(self.coerce_to_common_type(expr, coltypes[i], "VALUES", loc)?);
            }
            coerced.push(out);
        }

        let rtindex = self.add_values_rte(coerced, coltypes, coltypmods, colcollations, false);
        let pstate = self.pstate_mut();
        pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
        pstate.namespace.push(NamespaceItem::new(rtindex));
        for (i, (name, var)) in self.expand_rte_vars(0, rtindex, stmt.loc)?.into_iter().enumerate() {
            query.target_list.push(TargetEntry::new(var, i + 1, Some(name), false));
        }

        query.sort_clause = self.transform_sort_clause(&stmt.order_by, &mut query.target_list)?;
        query.limit_offset = self.transform_limit(stmt.offset.as_ref(), ExprKind::Offset, "OFFSET")?;
        query.limit_count = self.transform_limit(stmt.limit.as_ref(), ExprKind::Limit, "LIMIT")?;
        self.finish_level(&mut query);
        Ok(query)
    }

    /// Per-column common type, typmod and collation of VALUES rows
    pub(crate) fn values_column_types(&self, lists: &[Vec<Expr>]) -> Result<(Vec<Oid>, Vec<i32>, Vec<Oid>)> {
        let width = lists.first().map_or(0, Vec::len);
        let mut coltypes = Vec::with_capacity(width);
        let mut coltypmods = Vec::with_capacity(width);
        let mut colcollations = Vec::with_capacity(width);
        for col in 0..width {
            let types: Vec<(Oid, Location)> = lists
                .iter()
                .map(|row| (row[col].type_oid(), row[col].location()))
                .collect();
            let common = self.select_common_type(&types, "VALUES")?;
            let typmods: Vec<(Oid, i32)> = lists
                .iter()
                .map(|row| (row[col].type_oid(), row[col].typmod()))
                .collect();
            coltypes.push(common);
            coltypmods.push(Self::select_common_typmod(&typmods, common));
            colcollations.push(self.type_collation(common));
        }
        Ok((coltypes, coltypmods, colcollations))
    }

    fn transform_set_operations(&mut self, stmt: &SelectStmt) -> Result<Query> {
        let SelectBody::SetOp { op, all, left, right } = &stmt.body else {
            return Err(error_at(DiagnosticKind::SyntaxError, "expected a set operation", stmt.loc));
        };
        if let Some(lc) = stmt.locking.first() {
            return Err(error_at(
                DiagnosticKind::FeatureNotSupported,
                format!(
                    "{} is not allowed with UNION/INTERSECT/EXCEPT",
                    lock_clause_name(lc.strength)
                ),
                lc.loc,
            ));
        }

        let mut query = Query::new(CommandType::Select);
        let (node, columns) = self.set_operation_node(*op, *all, left, right)?;
        let leftmost = leftmost_leaf(&node.larg);
        for (i, col) in columns.into_iter().enumerate() {
            let var = Expr::Var(Var {
                varno: leftmost,
                varattno: i as i32 + 1,
                vartype: col.type_oid,
                vartypmod: col.typmod,
                varcollid: col.collid,
                levelsup: 0,
                location: col.loc,
            });
            query.target_list.push(TargetEntry::new(var, i + 1, Some(col.name), false));
        }
        query.set_operations = Some(node);

        // only output names and positions may be used here; the output
        // columns resolve through the leftmost arm so that expressions over
        // them reach the check below
        let before = query.target_list.len();
        let outer = std::mem::replace(
            &mut self.pstate_mut().namespace,
            vec![NamespaceItem::columns_only(leftmost)],
        );
        let sort_clause = self.transform_sort_clause(&stmt.order_by, &mut query.target_list);
        self.pstate_mut().namespace = outer;
        query.sort_clause = sort_clause?;
        if query.target_list.len() > before {
            let loc = query.target_list[before].expr.location();
            return Err(error_at(
                DiagnosticKind::FeatureNotSupported,
                "invalid UNION/INTERSECT/EXCEPT ORDER BY clause",
                loc,
            )
            .with_detail("Only result column names can be used, not expressions or functions.")
            .with_help("Add the expression/function to every SELECT, or move the UNION into a FROM clause."));
        }
        query.limit_offset = self.transform_limit(stmt.offset.as_ref(), ExprKind::Offset, "OFFSET")?;
        query.limit_count = self.transform_limit(stmt.limit.as_ref(), ExprKind::Limit, "LIMIT")?;
        self.finish_level(&mut query);
        Ok(query)
    }

    fn set_operation_node(
        &mut self,
        op: SetOpKind,
        all: bool,
        left: &SelectStmt,
        right: &SelectStmt,
    ) -> Result<(SetOperationStmt, Vec<SetOpColumn>)> {
        let (larg, lcols) = self.set_operation_arm(left)?;
        let (rarg, rcols) = self.set_operation_arm(right)?;
        let construct = op.to_string();
        if lcols.len() != rcols.len() {
            return Err(error_at(
                DiagnosticKind::SyntaxError,
                format!("each {} query must have the same number of columns", construct),
                right.loc,
            ));
        }

        let mut columns = Vec::with_capacity(lcols.len());
        for (l, r) in lcols.into_iter().zip(&rcols) {
            let common = self.select_common_type(&[(l.type_oid, l.loc), (r.type_oid, r.loc)], &construct)?;
            let typmod = Self::select_common_typmod(&[(l.type_oid, l.typmod), (r.type_oid, r.typmod)], common);
            let collid = if l.collid == r.collid {
                l.collid
            } else {
                self.type_collation(common)
            };
            columns.push(SetOpColumn {
                type_oid: common,
                typmod,
                collid,
                name: l.name,
                loc: l.loc,
            });
        }
        self.coerce_set_op_arm(&larg, &columns, &construct)?;
        self.coerce_set_op_arm(&rarg, &columns, &construct)?;

        let node = SetOperationStmt {
            op,
            all,
            larg,
            rarg,
            col_types: columns.iter().map(|c| c.type_oid).collect(),
            col_typmods: columns.iter().map(|c| c.typmod).collect(),
            col_collations: columns.iter().map(|c| c.collid).collect(),
        };
        Ok((node, columns))
    }

    /// A set-operation input: a nested set operation, or a leaf SELECT
    /// analyzed as a subquery entry of this level
    fn set_operation_arm(&mut self, stmt: &SelectStmt) -> Result<(SetOperationTree, Vec<SetOpColumn>)> {
        if let SelectBody::SetOp { op, all, left, right } = &stmt.body {
            let decorated = !stmt.order_by.is_empty()
                || stmt.limit.is_some()
                || stmt.offset.is_some()
                || stmt.with.is_some()
                || !stmt.locking.is_empty();
            if !decorated {
                let (node, columns) = self.guarded(|t| t.set_operation_node(*op, *all, left, right))?;
                return Ok((SetOperationTree::SetOp(Box::new(node)), columns));
            }
        }

        let scope = ParseState {
            parent_cte: self.pstate().parent_cte,
            locked_from_parent: self.pstate().locked_from_parent,
            keep_unknown_outputs: true,
            ..Default::default()
        };
        let (query, _) = self.with_scope(scope, |t| t.transform_select_stmt(stmt))?;
        let columns = query
            .visible_targets()
            .map(|te| SetOpColumn {
                type_oid: te.expr.type_oid(),
                typmod: te.expr.typmod(),
                collid: te.expr.collation(),
                name: te.resname.clone().unwrap_or_else(|| "?column?".to_string()),
                loc: te.expr.location(),
            })
            .collect();
        let alias = syntax::Alias::new(format!("*SELECT* {}", self.pstate().rtable.len() + 1));
        let rtindex = self.add_subquery_rte(query, Some(&alias), false, stmt.loc)?;
        if let Some(rte) = self.pstate_mut().rte_mut(rtindex) {
            rte.in_from_cl = false;
        }
        Ok((SetOperationTree::RangeTblRef(rtindex), columns))
    }

    /// Coerce the outputs of a leaf arm to the operation's column types
    fn coerce_set_op_arm(&mut self, arm: &SetOperationTree, columns: &[SetOpColumn], construct: &str) -> Result<()> {
        let SetOperationTree::RangeTblRef(rtindex) = arm else {
            return Ok(());
        };
        let outputs: Vec<(usize, Expr)> = match self.pstate().rte(*rtindex).map(|rte| &rte.kind) {
            Some(RteKind::Subquery { query }) => query
                .target_list
                .iter()
                .enumerate()
                .filter(|(_, te)| !te.resjunk)
                .map(|(i, te)| (i, te.expr.clone()))
                .collect(),
            _ => return Ok(()),
        };
        let mut coerced = Vec::new();
        for ((i, expr), col) in outputs.into_iter().zip(columns) {
            if expr.type_oid() == col.type_oid {
                continue;
            }
            let loc = expr.location();
            coerced.push((i, self.coerce_to_common_type(expr, col.type_oid, construct, loc)?));
        }
        if let Some(RteKind::Subquery { query }) = self.pstate_mut().rte_mut(*rtindex).map(|rte| &mut rte.kind) {
            for (i, expr) in coerced {
                query.target_list[i].expr = expr;
            }
        }
        Ok(())
    }

    /// LIMIT / OFFSET: variable-free, coerced to bigint
    fn transform_limit(&mut self, raw: Option<&RawExpr>, kind: ExprKind, construct: &str) -> Result<Option<Expr>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let expr = self.with_expr_kind(kind, |t| t.transform_expr(raw))?;
        if let Some(var) = locate_var_of_level(&expr, 0) {
            return Err(error_at(
                DiagnosticKind::InvalidColumnReference,
                format!("argument of {} must not contain variables", construct),
                var.location,
            ));
        }
        let (source, loc) = (expr.type_oid(), expr.location());
        self.coercion
            .coerce(self.catalog, expr, INT8_OID, -1, CoercionContext::Implicit)
            .map(Some)
            .ok_or_else(|| {
                error_at(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "argument of {} must be type bigint, not type {}",
                        construct,
                        self.type_name(source, -1)
                    ),
                    loc,
                )
            })
    }

    /// Move the level's range table, join list and flags into `query`
    pub(crate) fn finish_level(&mut self, query: &mut Query) {
        let pstate = self.pstate_mut();
        query.rtable = std::mem::take(&mut pstate.rtable);
        query.jointree.fromlist = std::mem::take(&mut pstate.joinlist);
        query.has_aggs = pstate.has_aggs;
        query.has_window_funcs = pstate.has_window_funcs;
        query.has_target_srfs = pstate.has_target_srfs;
        query.has_sublinks = pstate.has_sublinks;
    }

    fn check_recursive_term(&self, query: &Query, loc: Location) -> Result<()> {
        if self.pstate().parent_cte.is_none() || !query.has_aggs {
            return Ok(());
        }
        let self_reference = query
            .rtable
            .iter()
            .any(|rte| matches!(rte.kind, RteKind::Cte { self_reference: true, .. }));
        if self_reference {
            return Err(error_at(
                DiagnosticKind::InvalidRecursion,
                "aggregate functions are not allowed in a recursive query's recursive term",
                loc,
            ));
        }
        Ok(())
    }

    fn check_select_locking(&self, query: &Query, stmt: &SelectStmt) -> Result<()> {
        let Some(lc) = stmt.locking.first() else {
            return Ok(());
        };
        let what = if !query.distinct_clause.is_empty() {
            "DISTINCT clause"
        } else if !query.group_clause.is_empty() || !query.grouping_sets.is_empty() {
            "GROUP BY clause"
        } else if query.having_qual.is_some() {
            "HAVING clause"
        } else if query.has_aggs {
            "aggregate functions"
        } else if query.has_window_funcs {
            "window functions"
        } else if query.has_target_srfs {
            "set-returning functions in the target list"
        } else {
            return Ok(());
        };
        Err(error_at(
            DiagnosticKind::FeatureNotSupported,
            format!("{} is not allowed with {}", lock_clause_name(lc.strength), what),
            lc.loc,
        ))
    }

    /// Row marks for FOR UPDATE / FOR SHARE, local or inherited from an
    /// enclosing level
    fn apply_row_marks(&mut self, query: &mut Query) -> Result<()> {
        let pstate = self.pstate();
        if pstate.locking.is_empty() && pstate.locked_from_parent.is_none() {
            return Ok(());
        }
        for lc in &pstate.locking {
            for name in &lc.rels {
                if !query.rtable.iter().any(|rte| rte.in_from_cl && rte.refname() == name) {
                    return Err(error_at(
                        DiagnosticKind::TableNotFound,
                        format!(
                            "relation \"{}\" in {} clause not found in FROM clause",
                            name,
                            lock_clause_name(lc.strength)
                        ),
                        lc.loc,
                    ));
                }
            }
        }

        let parent = pstate.locked_from_parent;
        let mut marks = Vec::new();
        for (i, rte) in query.rtable.iter_mut().enumerate() {
            if !rte.in_from_cl || !matches!(rte.kind, RteKind::Relation { .. } | RteKind::Subquery { .. }) {
                continue;
            }
            let local = pstate
                .locking
                .iter()
                .filter(|lc| lc.rels.is_empty() || lc.rels.iter().any(|n| n == rte.refname()))
                .map(|lc| lc.strength)
                .max();
            let Some(strength) = local.max(parent) else {
                continue;
            };
            if rte.is_relation() {
                rte.required_perms |= ACL_SELECT_FOR_UPDATE;
            }
            marks.push(RowMarkClause {
                rti: i + 1,
                strength,
                pushed_down: local.is_none(),
            });
        }
        query.has_for_update = !marks.is_empty();
        query.row_marks = marks;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{analyze, analyze_err};
    use crate::types::{INT4_OID, NUMERIC_OID, TEXT_OID};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_select_shape() {
        let query = analyze("SELECT id, name FROM t WHERE id > 1");
        assert_eq!(query.rtable.len(), 1);
        assert_eq!(query.jointree.fromlist, vec![JoinTreeNode::RangeTblRef(1)]);
        assert!(query.jointree.quals.is_some());
        let names: Vec<_> = query.target_list.iter().map(|te| te.resname.clone().unwrap()).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(query.target_list[0].resorigcol, 1);
    }

    #[test]
    fn test_where_must_be_boolean() {
        let err = analyze_err("SELECT id FROM t WHERE name");
        assert_eq!(err.message, "argument of WHERE must be type boolean, not type text");
    }

    #[test]
    fn test_values_common_types() {
        let query = analyze("VALUES (1, 'a'), (2.5, 'b')");
        let RteKind::Values { coltypes, .. } = &query.rtable[0].kind else {
            panic!("expected a VALUES entry");
        };
        assert_eq!(coltypes, &vec![NUMERIC_OID, TEXT_OID]);
        assert_eq!(query.target_list[0].resname.as_deref(), Some("column1"));
    }

    #[test]
    fn test_values_lists_same_length() {
        let err = analyze_err("VALUES (1, 2), (3)");
        assert_eq!(err.message, "VALUES lists must all be the same length");
    }

    #[test]
    fn test_union_resolves_unknown_against_other_arm() {
        let query = analyze("SELECT 1 AS x UNION SELECT '2'");
        let setop = query.set_operations.as_ref().unwrap();
        assert_eq!(setop.col_types, vec![INT4_OID]);
        assert_eq!(query.rtable.len(), 2);
        assert_eq!(query.target_list[0].resname.as_deref(), Some("x"));
        assert_eq!(query.target_list[0].expr.type_oid(), INT4_OID);
    }

    #[test]
    fn test_union_column_count() {
        let err = analyze_err("SELECT 1, 2 UNION SELECT 3");
        assert_eq!(err.message, "each UNION query must have the same number of columns");
        let err = analyze_err("SELECT id FROM t INTERSECT SELECT name FROM t");
        assert_eq!(err.message, "INTERSECT types integer and text cannot be matched");
    }

    #[test]
    fn test_union_order_by_output_only() {
        let query = analyze("SELECT id FROM t UNION SELECT code FROM t ORDER BY id");
        assert_eq!(query.sort_clause.len(), 1);
        let err = analyze_err("SELECT id FROM t UNION SELECT code FROM t ORDER BY id + 1");
        assert_eq!(err.message, "invalid UNION/INTERSECT/EXCEPT ORDER BY clause");
        assert_eq!(err.kind, DiagnosticKind::FeatureNotSupported);

        // Only the leftmost arm's names are in scope
        let err = analyze_err("SELECT id FROM t UNION SELECT code FROM t ORDER BY code");
        assert_eq!(err.kind, DiagnosticKind::ColumnNotFound);
        let err = analyze_err("SELECT id FROM t UNION SELECT code FROM t ORDER BY t.id");
        assert_eq!(err.kind, DiagnosticKind::TableNotFound);
    }

    #[test]
    fn test_limit_coerced_to_bigint() {
        let query = analyze("SELECT id FROM t LIMIT 10 OFFSET 2");
        assert_eq!(query.limit_count.as_ref().unwrap().type_oid(), INT8_OID);
        assert_eq!(query.limit_offset.as_ref().unwrap().type_oid(), INT8_OID);
        let err = analyze_err("SELECT id FROM t LIMIT id");
        assert_eq!(err.message, "argument of LIMIT must not contain variables");
        let err = analyze_err("SELECT id FROM t LIMIT sum(id)");
        assert_eq!(err.message, "aggregate functions are not allowed in LIMIT");
    }

    #[test]
    fn test_row_marks() {
        let query = analyze("SELECT id FROM t, u FOR UPDATE OF t");
        assert_eq!(query.row_marks.len(), 1);
        assert_eq!(query.row_marks[0].rti, 1);
        assert!(query.has_for_update);
        assert_ne!(query.rtable[0].required_perms & ACL_SELECT_FOR_UPDATE, 0);

        let err = analyze_err("SELECT id FROM t FOR UPDATE OF x");
        assert_eq!(err.message, "relation \"x\" in FOR UPDATE clause not found in FROM clause");
        let err = analyze_err("SELECT count(*) FROM t FOR UPDATE");
        assert_eq!(err.message, "FOR UPDATE is not allowed with aggregate functions");
    }

    #[test]
    fn test_row_marks_pushed_into_subquery() {
        let query = analyze("SELECT * FROM (SELECT id FROM t) s FOR SHARE");
        let RteKind::Subquery { query: sub } = &query.rtable[0].kind else {
            panic!("expected a subquery entry");
        };
        assert_eq!(sub.row_marks.len(), 1);
        assert!(sub.row_marks[0].pushed_down);
        assert_eq!(sub.row_marks[0].strength, LockStrength::Share);
    }

    #[test]
    fn test_aggregate_in_recursive_term() {
        let err = analyze_err(
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT count(n)::int FROM r) SELECT * FROM r",
        );
        assert_eq!(
            err.message,
            "aggregate functions are not allowed in a recursive query's recursive term"
        );
    }
}
