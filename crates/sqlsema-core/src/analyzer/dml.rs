//! INSERT, UPDATE, DELETE and MERGE
//!
//! The result relation is always range entry 1 of its level and is opened
//! with `RowExclusive`. Target lists are indexed by attribute number of
//! the result relation.

use tracing::debug;

use super::expr_kind::ExprKind;
use super::state::{error_at, NamespaceItem, ParseState, Transformer};
use crate::catalog::LockMode;
use crate::error::{DiagnosticKind, Result};
use crate::query::{
    CommandType, Expr, JoinTreeNode, MergeAction, Query, TargetEntry, ACL_DELETE, ACL_INSERT, ACL_UPDATE,
};
use crate::syntax::{
    self, DeleteStmt, Indirection, InsertStmt, Location, MergeStmt, RangeVar, RawExpr, ResTarget, SelectBody,
    SelectStmt, UpdateStmt, WithClause,
};

/// One column an INSERT assigns to
struct InsertColumn {
    name: String,
    attno: i32,
    indirection: Vec<Indirection>,
    loc: Location,
}

impl Transformer<'_> {
    /// Open the result relation, add it to the range table and record the
    /// permission the statement needs on it
    fn set_target_table(&mut self, rv: &RangeVar, perms: u32) -> Result<usize> {
        let rtindex = self.add_relation_rte(rv, LockMode::RowExclusive)?;
        if let Some(rte) = self.pstate_mut().rte_mut(rtindex) {
            rte.required_perms = perms;
        }
        self.pstate_mut().target_rtindex = Some(rtindex);
        debug!(relation = %rv.name, rtindex, "set result relation");
        Ok(rtindex)
    }

    fn transform_dml_with(&mut self, with: Option<&WithClause>, query: &mut Query) -> Result<()> {
        if let Some(with) = with {
            self.transform_with_clause(with)?;
            query.has_recursive = with.recursive;
        }
        Ok(())
    }

    fn finish_dml(&mut self, mut query: Query) -> Query {
        self.finish_level(&mut query);
        query.cte_list = self
            .pstate_mut()
            .ctes
            .drain(..)
            .filter_map(super::state::CteEntry::finish)
            .collect();
        query
    }

    fn transform_returning(&mut self, returning: &[ResTarget]) -> Result<Vec<TargetEntry>> {
        if returning.is_empty() {
            return Ok(Vec::new());
        }
        self.transform_target_list(returning, ExprKind::Returning)
    }

    /// The columns an INSERT assigns: the named ones, or every live column
    fn insert_columns(&self, columns: &[ResTarget]) -> Result<Vec<InsertColumn>> {
        if columns.is_empty() {
            let (_, rel) = self.target_relation()?;
            return Ok(rel
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| !c.dropped)
                .map(|(i, c)| InsertColumn {
                    name: c.name.clone(),
                    attno: i as i32 + 1,
                    indirection: Vec::new(),
                    loc: Location::UNKNOWN,
                })
                .collect());
        }

        let mut out: Vec<InsertColumn> = Vec::with_capacity(columns.len());
        for col in columns {
            let name = col.name.clone().unwrap_or_default();
            let attno = self.target_column(&name, col.loc)?;
            // distinct subfields or elements of one column may be assigned separately
            let clash = out
                .iter()
                .any(|c| c.attno == attno && (c.indirection.is_empty() || col.indirection.is_empty()));
            if clash {
                return Err(error_at(
                    DiagnosticKind::DuplicateColumn,
                    format!("column \"{}\" specified more than once", name),
                    col.loc,
                ));
            }
            out.push(InsertColumn {
                name,
                attno,
                indirection: col.indirection.clone(),
                loc: col.loc,
            });
        }
        Ok(out)
    }

    /// Match source expressions with target columns
    fn check_insert_count(
        &self,
        exprs: &[Expr],
        columns: &mut Vec<InsertColumn>,
        explicit: bool,
        loc: Location,
    ) -> Result<()> {
        if exprs.len() > columns.len() {
            let at = exprs.get(columns.len()).map_or(loc, Expr::location);
            return Err(error_at(
                DiagnosticKind::ColumnCountMismatch,
                "INSERT has more expressions than target columns",
                at,
            ));
        }
        if exprs.len() < columns.len() {
            if explicit {
                let at = columns.get(exprs.len()).map_or(loc, |c| c.loc);
                return Err(error_at(
                    DiagnosticKind::ColumnCountMismatch,
                    "INSERT has more target columns than expressions",
                    at,
                ));
            }
            columns.truncate(exprs.len());
        }
        Ok(())
    }

    /// Coerce each source expression into its column and build the target
    /// list, recording the inserted columns
    fn insert_target_list(
        &mut self,
        rtindex: usize,
        exprs: Vec<Expr>,
        columns: &[InsertColumn],
    ) -> Result<Vec<TargetEntry>> {
        let mut tlist = Vec::with_capacity(exprs.len());
        for (expr, col) in exprs.into_iter().zip(columns) {
            let loc = if col.loc.span().is_some() { col.loc } else { expr.location() };
            let expr = self.transform_assigned_expr(expr, &col.name, col.attno, &col.indirection, true, loc)?;
            if let Some(rte) = self.pstate_mut().rte_mut(rtindex) {
                rte.inserted_cols.insert(col.attno);
            }
            tlist.push(TargetEntry::new(expr, col.attno as usize, Some(col.name.clone()), false));
        }
        Ok(tlist)
    }

    /// Source expressions of one VALUES row, with DEFAULT allowed
    fn insert_row(&mut self, row: &[RawExpr], columns: &[InsertColumn], kind: ExprKind) -> Result<Vec<Expr>> {
        let mut out = Vec::with_capacity(row.len());
        for (i, raw) in row.iter().enumerate() {
            let expr = match columns.get(i) {
                Some(col) => self.transform_assignment_source(raw, col.attno, &col.indirection, kind)?,
                None => self.with_expr_kind(kind, |t| t.transform_expr(raw))?,
            };
            out.push(expr);
        }
        Ok(out)
    }

    pub(crate) fn transform_insert(&mut self, stmt: &InsertStmt) -> Result<Query> {
        let mut query = Query::new(CommandType::Insert);
        self.transform_dml_with(stmt.with.as_ref(), &mut query)?;
        let rtindex = self.set_target_table(&stmt.relation, ACL_INSERT)?;
        let explicit = !stmt.columns.is_empty();
        let mut columns = self.insert_columns(&stmt.columns)?;

        let exprs = match stmt.source.as_deref() {
            None => {
                columns.clear();
                Vec::new()
            }
            Some(SelectStmt {
                with: None,
                body: SelectBody::Values(rows),
                order_by,
                limit: None,
                offset: None,
                locking,
                ..
            }) if order_by.is_empty() && locking.is_empty() => {
                if let [row] = rows.as_slice() {
                    self.insert_row(row, &columns, ExprKind::ValuesSingle)?
                } else {
                    self.insert_values_rows(rows, &columns, stmt.loc)?
                }
            }
            Some(select) => {
                // the target is not visible to the source query
                let (sub, _) = self.with_expr_kind(ExprKind::FromSubselect, |t| {
                    t.with_scope(ParseState::default(), |t| t.transform_select_stmt(select))
                })?;
                let alias = syntax::Alias::new("*SELECT*");
                let sub_index = self.add_subquery_rte(sub, Some(&alias), false, select.loc)?;
                self.pstate_mut().joinlist.push(JoinTreeNode::RangeTblRef(sub_index));
                self.expand_rte_vars(0, sub_index, select.loc)?
                    .into_iter()
                    .map(|(_, var)| var)
                    .collect()
            }
        };
        self.check_insert_count(&exprs, &mut columns, explicit, stmt.loc)?;
        query.target_list = self.insert_target_list(rtindex, exprs, &columns)?;

        // RETURNING sees the target
        self.pstate_mut().namespace.push(NamespaceItem::new(rtindex));
        query.returning_list = self.transform_returning(&stmt.returning)?;
        query.result_relation = Some(rtindex);
        debug!(columns = query.target_list.len(), "analyzed INSERT");
        Ok(self.finish_dml(query))
    }

    /// A multi-row VALUES source becomes a VALUES entry whose columns feed
    /// the target list
    fn insert_values_rows(&mut self, rows: &[Vec<RawExpr>], columns: &[InsertColumn], loc: Location) -> Result<Vec<Expr>> {
        let width = rows.first().map_or(0, Vec::len);
        let mut lists = Vec::with_capacity(rows.len());
        for row in rows {
            if row.len() != width {
                let at = row.first().map_or(loc, RawExpr::location);
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    "VALUES lists must all be the same length",
                    at,
                ));
            }
            lists.push(self.insert_row(row, columns, ExprKind::Values)?);
        }
        let (coltypes, coltypmods, colcollations) = self.values_column_types(&lists)?;
        let mut coerced = Vec::with_capacity(lists.len());
        for row in lists {
            let mut out = Vec::with_capacity(row.len());
            for (i, expr) in row.into_iter().enumerate() {
                let at = expr.location();
                out.push(self.coerce_to_common_type(expr, coltypes[i], "VALUES", at)?);
            }
            coerced.push(out);
        }
        let values_index = self.add_values_rte(coerced, coltypes, coltypmods, colcollations, false);
        self.pstate_mut().joinlist.push(JoinTreeNode::RangeTblRef(values_index));
        Ok(self
            .expand_rte_vars(0, values_index, loc)?
            .into_iter()
            .map(|(_, var)| var)
            .collect())
    }

    /// `SET col = expr, ...` of UPDATE and MERGE
    fn transform_update_targets(&mut self, rtindex: usize, targets: &[ResTarget]) -> Result<Vec<TargetEntry>> {
        let mut tlist: Vec<TargetEntry> = Vec::with_capacity(targets.len());
        let mut assigned: Vec<(i32, bool)> = Vec::new();
        for target in targets {
            let name = target.name.clone().unwrap_or_default();
            let attno = self.target_column(&name, target.loc)?;
            let whole = target.indirection.is_empty();
            if assigned.iter().any(|&(a, w)| a == attno && (w || whole)) {
                return Err(error_at(
                    DiagnosticKind::DuplicateColumn,
                    format!("multiple assignments to same column \"{}\"", name),
                    target.loc,
                ));
            }
            assigned.push((attno, whole));
            let source = self.transform_assignment_source(&target.val, attno, &target.indirection, ExprKind::UpdateSource)?;
            let loc = if target.loc.span().is_some() { target.loc } else { target.val.location() };
            let expr = self.transform_assigned_expr(source, &name, attno, &target.indirection, false, loc)?;
            if let Some(rte) = self.pstate_mut().rte_mut(rtindex) {
                rte.updated_cols.insert(attno);
            }
            tlist.push(TargetEntry::new(expr, attno as usize, Some(name), false));
        }
        Ok(tlist)
    }

    pub(crate) fn transform_update(&mut self, stmt: &UpdateStmt) -> Result<Query> {
        let mut query = Query::new(CommandType::Update);
        self.transform_dml_with(stmt.with.as_ref(), &mut query)?;
        let rtindex = self.set_target_table(&stmt.relation, ACL_UPDATE)?;
        let pstate = self.pstate_mut();
        pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
        pstate.namespace.push(NamespaceItem::new(rtindex));
        self.transform_from_clause(&stmt.from)?;

        query.jointree.quals = stmt
            .where_clause
            .as_ref()
            .map(|w| self.transform_where_clause(w, ExprKind::Where, "WHERE"))
            .transpose()?;
        query.target_list = self.transform_update_targets(rtindex, &stmt.targets)?;
        query.returning_list = self.transform_returning(&stmt.returning)?;
        query.result_relation = Some(rtindex);
        Ok(self.finish_dml(query))
    }

    pub(crate) fn transform_delete(&mut self, stmt: &DeleteStmt) -> Result<Query> {
        let mut query = Query::new(CommandType::Delete);
        self.transform_dml_with(stmt.with.as_ref(), &mut query)?;
        let rtindex = self.set_target_table(&stmt.relation, ACL_DELETE)?;
        let pstate = self.pstate_mut();
        pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
        pstate.namespace.push(NamespaceItem::new(rtindex));
        self.transform_from_clause(&stmt.using)?;

        query.jointree.quals = stmt
            .where_clause
            .as_ref()
            .map(|w| self.transform_where_clause(w, ExprKind::Where, "WHERE"))
            .transpose()?;
        query.returning_list = self.transform_returning(&stmt.returning)?;
        query.result_relation = Some(rtindex);
        Ok(self.finish_dml(query))
    }

    pub(crate) fn transform_merge(&mut self, stmt: &MergeStmt) -> Result<Query> {
        let mut query = Query::new(CommandType::Merge);
        self.transform_dml_with(stmt.with.as_ref(), &mut query)?;
        let rtindex = self.set_target_table(&stmt.target, 0)?;
        self.pstate_mut().merge_use_level = true;

        let source = self.transform_from_item(&stmt.source)?;
        let existing = vec![NamespaceItem::new(rtindex)];
        self.check_namespace_conflicts(&existing, &source.namespace, stmt.source.location())?;
        let pstate = self.pstate_mut();
        pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
        pstate.joinlist.push(source.node);
        pstate.namespace.push(NamespaceItem::new(rtindex));
        pstate.namespace.extend(source.namespace);

        query.merge_join_condition = Some(self.transform_where_clause(&stmt.on, ExprKind::JoinOn, "JOIN/ON")?);

        let mut unconditional = [false, false];
        for when in &stmt.clauses {
            let slot = usize::from(when.matched);
            if unconditional[slot] {
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    "unreachable WHEN clause specified after unconditional WHEN clause",
                    when.loc,
                ));
            }
            unconditional[slot] = when.condition.is_none();

            // NOT MATCHED rows have no target row to refer to
            if !when.matched {
                self.set_target_visible(rtindex, false);
            }
            let action = self.transform_merge_when(rtindex, when);
            self.set_target_visible(rtindex, true);
            query.merge_action_list.push(action?);
        }

        query.result_relation = Some(rtindex);
        debug!(actions = query.merge_action_list.len(), "analyzed MERGE");
        Ok(self.finish_dml(query))
    }

    fn set_target_visible(&mut self, rtindex: usize, visible: bool) {
        for ns in self.pstate_mut().namespace.iter_mut().filter(|ns| ns.rtindex == rtindex) {
            ns.rel_visible = visible;
            ns.cols_visible = visible;
        }
    }

    fn transform_merge_when(&mut self, rtindex: usize, when: &syntax::MergeWhen) -> Result<MergeAction> {
        let qual = when
            .condition
            .as_ref()
            .map(|c| self.transform_where_clause(c, ExprKind::MergeWhen, "WHEN"))
            .transpose()?;
        let add_perm = |t: &mut Self, perm: u32| {
            if let Some(rte) = t.pstate_mut().rte_mut(rtindex) {
                rte.required_perms |= perm;
            }
        };
        let (command, target_list) = match &when.action {
            syntax::MergeAction::Update(targets) => {
                add_perm(self, ACL_UPDATE);
                (CommandType::Update, self.transform_update_targets(rtindex, targets)?)
            }
            syntax::MergeAction::Delete => {
                add_perm(self, ACL_DELETE);
                (CommandType::Delete, Vec::new())
            }
            syntax::MergeAction::Insert { columns, values } => {
                add_perm(self, ACL_INSERT);
                let explicit = !columns.is_empty();
                let mut cols = self.insert_columns(columns)?;
                let exprs = match values {
                    Some(values) => self.insert_row(values, &cols, ExprKind::ValuesSingle)?,
                    None => {
                        cols.clear();
                        Vec::new()
                    }
                };
                self.check_insert_count(&exprs, &mut cols, explicit, when.loc)?;
                (CommandType::Insert, self.insert_target_list(rtindex, exprs, &cols)?)
            }
            syntax::MergeAction::DoNothing => (CommandType::Nothing, Vec::new()),
        };
        Ok(MergeAction {
            matched: when.matched,
            command,
            qual,
            target_list,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{analyze, analyze_err};
    use crate::query::{RteKind, ACL_SELECT};
    use crate::types::{INT4_OID, NUMERIC_OID};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn resnos(tlist: &[TargetEntry]) -> Vec<usize> {
        tlist.iter().map(|te| te.resno).collect()
    }

    #[test]
    fn test_insert_values() {
        let query = analyze("INSERT INTO t (id, name) VALUES (1, 'a') RETURNING id");
        assert_eq!(query.command, CommandType::Insert);
        assert_eq!(query.result_relation, Some(1));
        assert_eq!(resnos(&query.target_list), vec![1, 3]);
        let rte = &query.rtable[0];
        assert_eq!(rte.inserted_cols, BTreeSet::from([1, 3]));
        assert_eq!(rte.required_perms, ACL_INSERT | ACL_SELECT);
        assert_eq!(query.returning_list.len(), 1);
        assert!(matches!(&rte.kind, RteKind::Relation { lock: LockMode::RowExclusive, .. }));
    }

    #[test]
    fn test_insert_implicit_columns_and_coercion() {
        let query = analyze("INSERT INTO t VALUES (1, 2)");
        assert_eq!(resnos(&query.target_list), vec![1, 2]);

        let query = analyze("INSERT INTO t (amount) VALUES (1)");
        assert_eq!(query.target_list[0].expr.type_oid(), NUMERIC_OID);
    }

    #[test]
    fn test_insert_multi_row_values() {
        let query = analyze("INSERT INTO t (id, code) VALUES (1, 2), (3, DEFAULT)");
        assert_eq!(query.rtable.len(), 2);
        assert!(matches!(&query.rtable[1].kind, RteKind::Values { lists, .. } if lists.len() == 2));
        assert_eq!(query.target_list[1].expr.type_oid(), INT4_OID);
    }

    #[test]
    fn test_insert_select() {
        let query = analyze("INSERT INTO u (t_id) SELECT id FROM t");
        assert_eq!(query.rtable[1].eref.aliasname, "*SELECT*");
        assert_eq!(resnos(&query.target_list), vec![1]);
    }

    #[test]
    fn test_insert_errors() {
        let err = analyze_err("INSERT INTO t (id, id) VALUES (1, 2)");
        assert_eq!(err.message, "column \"id\" specified more than once");

        let err = analyze_err("INSERT INTO t (nope) VALUES (1)");
        assert_eq!(err.message, "column \"nope\" of relation \"t\" does not exist");

        let err = analyze_err("INSERT INTO t (ctid) VALUES (1)");
        assert_eq!(err.message, "cannot assign to system column \"ctid\"");

        let err = analyze_err("INSERT INTO t (id) VALUES (1, 2)");
        assert_eq!(err.message, "INSERT has more expressions than target columns");

        let err = analyze_err("INSERT INTO t (id, code) VALUES (1)");
        assert_eq!(err.message, "INSERT has more target columns than expressions");

        let err = analyze_err("INSERT INTO t (id) VALUES (true)");
        assert_eq!(err.kind, DiagnosticKind::TypeMismatch);
    }

    #[test]
    fn test_insert_default() {
        let query = analyze("INSERT INTO t (id, name) VALUES (DEFAULT, 'x')");
        assert!(matches!(
            query.target_list[0].expr,
            Expr::SetToDefault { type_oid: INT4_OID, .. }
        ));
    }

    #[test]
    fn test_update() {
        let query = analyze("UPDATE t SET code = u.t_id FROM u WHERE t.id = u.t_id RETURNING t.name");
        assert_eq!(query.command, CommandType::Update);
        assert_eq!(resnos(&query.target_list), vec![2]);
        assert_eq!(query.rtable[0].updated_cols, BTreeSet::from([2]));
        assert!(query.jointree.quals.is_some());
        assert_eq!(query.jointree.fromlist.len(), 2);

        let err = analyze_err("UPDATE t SET code = 1, code = 2");
        assert_eq!(err.message, "multiple assignments to same column \"code\"");
    }

    #[test]
    fn test_delete() {
        let query = analyze("DELETE FROM t USING u WHERE t.id = u.t_id");
        assert_eq!(query.command, CommandType::Delete);
        assert_eq!(query.rtable[0].required_perms & ACL_DELETE, ACL_DELETE);
        assert!(query.target_list.is_empty());
    }

    #[test]
    fn test_merge() {
        let query = analyze(
            "MERGE INTO t USING u ON t.id = u.t_id \
             WHEN MATCHED THEN UPDATE SET code = 1 \
             WHEN NOT MATCHED THEN INSERT (id, name) VALUES (t_id, note)",
        );
        assert_eq!(query.command, CommandType::Merge);
        assert_eq!(query.merge_action_list.len(), 2);
        assert_eq!(query.merge_action_list[0].command, CommandType::Update);
        assert_eq!(query.merge_action_list[1].command, CommandType::Insert);
        assert_eq!(query.rtable[0].required_perms & (ACL_INSERT | ACL_UPDATE), ACL_INSERT | ACL_UPDATE);
        assert!(query.merge_join_condition.is_some());
    }

    #[test]
    fn test_merge_errors() {
        let err = analyze_err(
            "MERGE INTO t USING u ON t.id = u.t_id \
             WHEN MATCHED THEN DELETE WHEN MATCHED THEN UPDATE SET code = 1",
        );
        assert_eq!(
            err.message,
            "unreachable WHEN clause specified after unconditional WHEN clause"
        );

        // the target row does not exist for NOT MATCHED
        let err = analyze_err(
            "MERGE INTO t USING u ON t.id = u.t_id WHEN NOT MATCHED THEN INSERT (id) VALUES (t.code)",
        );
        assert_eq!(err.kind, DiagnosticKind::TableNotFound);
    }
}
