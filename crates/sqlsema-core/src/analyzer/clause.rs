//! ORDER BY, GROUP BY, DISTINCT and window clauses
//!
//! Each of these names target-list entries. An item is first matched the
//! SQL92 way (output column name or position) where that is allowed, then
//! as an expression; an expression with no matching entry gets a resjunk
//! entry appended so later stages can still refer to it.

use super::expr_kind::ExprKind;
use super::state::{error_at, Transformer};
use crate::error::{DiagnosticKind, Result};
use crate::query::walker::{locate_var_of_level, walk_expr, Walk};
use crate::query::{
    expand_grouping_sets, Expr, FrameBoundKind, GroupingSet, SortGroupClause, TargetEntry,
    WindowClause, WindowFrame,
};
use crate::syntax::{
    ColumnField, FrameBound, FrameSpec, FrameUnits, GroupItem, Literal, Location, NullsOrder,
    RawExpr, SortBy, SortDir, WindowDef,
};
use crate::types::{CoercionContext, Oid, INT8_OID, JSON_OID};

/// Give entry `idx` a sort/group reference if it has none yet
fn assign_sort_group_ref(tlist: &mut [TargetEntry], idx: usize) -> usize {
    if tlist[idx].ressortgroupref == 0 {
        let next = tlist.iter().map(|te| te.ressortgroupref).max().unwrap_or(0) + 1;
        tlist[idx].ressortgroupref = next;
    }
    tlist[idx].ressortgroupref
}

fn group_clause_for(sgref: usize) -> SortGroupClause {
    SortGroupClause {
        tle_sort_group_ref: sgref,
        eqop: "=".to_string(),
        sortop: Some("<".to_string()),
        nulls_first: false,
        hashable: true,
    }
}

fn group_item_location(item: &GroupItem) -> Location {
    match item {
        GroupItem::Expr(e) => e.location(),
        GroupItem::Simple(es) => es.first().map_or(Location::UNKNOWN, RawExpr::location),
        GroupItem::Rollup(items) | GroupItem::Cube(items) | GroupItem::Sets(items) => {
            items.first().map_or(Location::UNKNOWN, group_item_location)
        }
        GroupItem::Empty => Location::UNKNOWN,
    }
}

/// Reject an entry a GROUP BY or window definition may not name
fn check_clause_target(te: &TargetEntry, kind: ExprKind) -> Result<()> {
    let grouping = kind == ExprKind::GroupBy;
    walk_expr(&te.expr, 0, &mut |e, sub| match e {
        Expr::Aggref(a) if grouping && a.agglevelsup == sub => Err(error_at(
            DiagnosticKind::GroupingError,
            "aggregate functions are not allowed in GROUP BY",
            a.location,
        )),
        Expr::GroupingFunc(g) if grouping && g.agglevelsup == sub => Err(error_at(
            DiagnosticKind::GroupingError,
            "grouping operations are not allowed in GROUP BY",
            g.location,
        )),
        Expr::WindowFunc(w) if sub == 0 => Err(error_at(
            DiagnosticKind::WindowingError,
            if grouping {
                "window functions are not allowed in GROUP BY"
            } else {
                "window functions are not allowed in window definitions"
            },
            w.location,
        )),
        _ => Ok(Walk::Continue),
    })
}

impl Transformer<'_> {
    /// Index into `tlist` of the entry `raw` names, appending a resjunk
    /// entry when nothing matches
    pub(crate) fn find_target_list_entry(
        &mut self,
        raw: &RawExpr,
        tlist: &mut Vec<TargetEntry>,
        kind: ExprKind,
    ) -> Result<usize> {
        let checked = matches!(
            kind,
            ExprKind::GroupBy | ExprKind::WindowPartition | ExprKind::WindowOrder
        );
        if matches!(kind, ExprKind::OrderBy | ExprKind::GroupBy | ExprKind::DistinctOn) {
            if let Some(idx) = self.find_output_column(raw, tlist, kind)? {
                if checked {
                    check_clause_target(&tlist[idx], kind)?;
                }
                return Ok(idx);
            }
        }

        let expr = self.with_expr_kind(kind, |t| t.transform_expr(raw))?;
        if let Some(idx) = tlist
            .iter()
            .position(|te| te.expr.strip_implicit() == expr.strip_implicit())
        {
            if checked {
                check_clause_target(&tlist[idx], kind)?;
            }
            return Ok(idx);
        }
        let expr = self.resolve_unknown(expr);
        tlist.push(TargetEntry::new(expr, tlist.len() + 1, None, true));
        Ok(tlist.len() - 1)
    }

    /// SQL92 matching: a bare output-column name, or an output position
    fn find_output_column(
        &mut self,
        raw: &RawExpr,
        tlist: &[TargetEntry],
        kind: ExprKind,
    ) -> Result<Option<usize>> {
        match raw {
            RawExpr::ColumnRef(cref) if !cref.prior => {
                let [ColumnField::Name(name)] = cref.fields.as_slice() else {
                    return Ok(None);
                };
                // GROUP BY prefers an input column of the same name
                if kind == ExprKind::GroupBy && self.column_ref_resolves(cref) {
                    return Ok(None);
                }
                let mut found: Option<usize> = None;
                for (i, te) in tlist.iter().enumerate() {
                    if te.resjunk || te.resname.as_deref() != Some(name.as_str()) {
                        continue;
                    }
                    match found {
                        Some(prev) if tlist[prev].expr != te.expr => {
                            return Err(error_at(
                                DiagnosticKind::AmbiguousColumn,
                                format!("{} \"{}\" is ambiguous", kind.name(), name),
                                cref.loc,
                            ))
                        }
                        Some(_) => {}
                        None => found = Some(i),
                    }
                }
                Ok(found)
            }
            RawExpr::Const(Literal::Integer(n), loc) => {
                let visible: Vec<usize> = (0..tlist.len()).filter(|&i| !tlist[i].resjunk).collect();
                match usize::try_from(*n).ok().filter(|p| (1..=visible.len()).contains(p)) {
                    Some(pos) => Ok(Some(visible[pos - 1])),
                    None => Err(error_at(
                        DiagnosticKind::InvalidColumnReference,
                        format!("{} position {} is not in select list", kind.name(), n),
                        *loc,
                    )),
                }
            }
            _ => Ok(None),
        }
    }

    fn check_ordering_operator(&self, type_oid: Oid, loc: Location) -> Result<()> {
        if type_oid == JSON_OID {
            return Err(error_at(
                DiagnosticKind::UndefinedFunction,
                format!(
                    "could not identify an ordering operator for type {}",
                    self.type_name(type_oid, -1)
                ),
                loc,
            )
            .with_help("Use an explicit ordering operator or modify the query."));
        }
        Ok(())
    }

    fn check_equality_operator(&self, type_oid: Oid, loc: Location) -> Result<()> {
        if type_oid == JSON_OID {
            return Err(error_at(
                DiagnosticKind::UndefinedFunction,
                format!(
                    "could not identify an equality operator for type {}",
                    self.type_name(type_oid, -1)
                ),
                loc,
            ));
        }
        Ok(())
    }

    pub(crate) fn transform_sort_clause(
        &mut self,
        sorts: &[SortBy],
        tlist: &mut Vec<TargetEntry>,
    ) -> Result<Vec<SortGroupClause>> {
        self.sort_list(sorts, tlist, ExprKind::OrderBy)
    }

    fn sort_list(
        &mut self,
        sorts: &[SortBy],
        tlist: &mut Vec<TargetEntry>,
        kind: ExprKind,
    ) -> Result<Vec<SortGroupClause>> {
        let mut out: Vec<SortGroupClause> = Vec::with_capacity(sorts.len());
        for sort in sorts {
            let idx = self.find_target_list_entry(&sort.expr, tlist, kind)?;
            self.check_ordering_operator(tlist[idx].expr.type_oid(), sort.expr.location())?;
            let sgref = assign_sort_group_ref(tlist, idx);
            if out.iter().any(|c| c.tle_sort_group_ref == sgref) {
                continue;
            }
            let descending = sort.dir == SortDir::Desc;
            out.push(SortGroupClause {
                tle_sort_group_ref: sgref,
                eqop: "=".to_string(),
                sortop: Some(if descending { ">" } else { "<" }.to_string()),
                nulls_first: match sort.nulls {
                    NullsOrder::First => true,
                    NullsOrder::Last => false,
                    NullsOrder::Default => descending,
                },
                hashable: true,
            });
        }
        Ok(out)
    }

    /// GROUP BY: the flat clause plus, when grouping sets are used, the
    /// grouping-set tree
    pub(crate) fn transform_group_clause(
        &mut self,
        items: &[GroupItem],
        tlist: &mut Vec<TargetEntry>,
    ) -> Result<(Vec<SortGroupClause>, Vec<GroupingSet>)> {
        let mut clause = Vec::new();
        let mut sets = Vec::with_capacity(items.len());
        for item in items {
            sets.push(self.group_item(item, tlist, &mut clause)?);
        }
        if items.iter().all(|i| matches!(i, GroupItem::Expr(_))) {
            return Ok((clause, Vec::new()));
        }

        let limit = self.options.max_grouping_sets;
        let Some(expanded) = expand_grouping_sets(&sets, limit) else {
            let loc = items.first().map_or(Location::UNKNOWN, group_item_location);
            return Err(error_at(
                DiagnosticKind::StatementTooComplex,
                format!("too many grouping sets present (maximum {})", limit),
                loc,
            ));
        };
        // a single set is plain grouping
        if expanded.len() == 1 && !clause.is_empty() {
            sets.clear();
        }
        Ok((clause, sets))
    }

    fn group_item(
        &mut self,
        item: &GroupItem,
        tlist: &mut Vec<TargetEntry>,
        clause: &mut Vec<SortGroupClause>,
    ) -> Result<GroupingSet> {
        Ok(match item {
            GroupItem::Expr(e) => GroupingSet::Simple(vec![self.group_expr(e, tlist, clause)?]),
            GroupItem::Empty => GroupingSet::Empty,
            GroupItem::Simple(exprs) => {
                let mut refs = Vec::with_capacity(exprs.len());
                for e in exprs {
                    refs.push(self.group_expr(e, tlist, clause)?);
                }
                GroupingSet::Simple(refs)
            }
            GroupItem::Rollup(items) => GroupingSet::Rollup(self.group_items(items, tlist, clause)?),
            GroupItem::Cube(items) => GroupingSet::Cube(self.group_items(items, tlist, clause)?),
            GroupItem::Sets(items) => GroupingSet::Sets(self.group_items(items, tlist, clause)?),
        })
    }

    fn group_items(
        &mut self,
        items: &[GroupItem],
        tlist: &mut Vec<TargetEntry>,
        clause: &mut Vec<SortGroupClause>,
    ) -> Result<Vec<GroupingSet>> {
        items.iter().map(|i| self.group_item(i, tlist, clause)).collect()
    }

    fn group_expr(
        &mut self,
        raw: &RawExpr,
        tlist: &mut Vec<TargetEntry>,
        clause: &mut Vec<SortGroupClause>,
    ) -> Result<usize> {
        let idx = self.find_target_list_entry(raw, tlist, ExprKind::GroupBy)?;
        self.check_equality_operator(tlist[idx].expr.type_oid(), raw.location())?;
        let sgref = assign_sort_group_ref(tlist, idx);
        if !clause.iter().any(|c| c.tle_sort_group_ref == sgref) {
            clause.push(group_clause_for(sgref));
        }
        Ok(sgref)
    }

    /// Plain DISTINCT: ORDER BY items first, then every other output column
    pub(crate) fn transform_distinct_clause(
        &mut self,
        tlist: &mut [TargetEntry],
        sort: &[SortGroupClause],
    ) -> Result<Vec<SortGroupClause>> {
        for sc in sort {
            if let Some(te) = tlist.iter().find(|te| te.ressortgroupref == sc.tle_sort_group_ref) {
                if te.resjunk {
                    return Err(error_at(
                        DiagnosticKind::InvalidColumnReference,
                        "for SELECT DISTINCT, ORDER BY expressions must appear in select list",
                        te.expr.location(),
                    ));
                }
            }
        }
        let mut out = sort.to_vec();
        for idx in 0..tlist.len() {
            if tlist[idx].resjunk {
                continue;
            }
            self.check_equality_operator(tlist[idx].expr.type_oid(), tlist[idx].expr.location())?;
            let sgref = assign_sort_group_ref(tlist, idx);
            if !out.iter().any(|c| c.tle_sort_group_ref == sgref) {
                out.push(group_clause_for(sgref));
            }
        }
        Ok(out)
    }

    /// DISTINCT ON: the ORDER BY, if any, must start with the same expressions
    pub(crate) fn transform_distinct_on_clause(
        &mut self,
        exprs: &[RawExpr],
        tlist: &mut Vec<TargetEntry>,
        sort: &[SortGroupClause],
    ) -> Result<Vec<SortGroupClause>> {
        let mut refs: Vec<(usize, Location)> = Vec::with_capacity(exprs.len());
        for raw in exprs {
            let idx = self.find_target_list_entry(raw, tlist, ExprKind::DistinctOn)?;
            let sgref = assign_sort_group_ref(tlist, idx);
            if !refs.iter().any(|(r, _)| *r == sgref) {
                refs.push((sgref, raw.location()));
            }
        }

        let mismatch = |loc: Location| {
            error_at(
                DiagnosticKind::InvalidColumnReference,
                "SELECT DISTINCT ON expressions must match initial ORDER BY expressions",
                loc,
            )
        };
        let mut out: Vec<SortGroupClause> = Vec::new();
        let mut skipped_sort_item = false;
        for sc in sort {
            match refs.iter().find(|(r, _)| *r == sc.tle_sort_group_ref) {
                Some((_, loc)) if skipped_sort_item => return Err(mismatch(*loc)),
                Some(_) => out.push(sc.clone()),
                None => skipped_sort_item = true,
            }
        }
        for (sgref, loc) in refs {
            if out.iter().any(|c| c.tle_sort_group_ref == sgref) {
                continue;
            }
            if skipped_sort_item {
                return Err(mismatch(loc));
            }
            out.push(group_clause_for(sgref));
        }
        Ok(out)
    }

    /// Register the WINDOW clause's named definitions
    pub(crate) fn load_window_defs(&mut self, defs: &[WindowDef]) -> Result<()> {
        for def in defs {
            let duplicate = self
                .pstate()
                .windowdefs
                .iter()
                .any(|d| d.name.is_some() && d.name == def.name);
            if duplicate {
                return Err(error_at(
                    DiagnosticKind::WindowingError,
                    format!("window \"{}\" is already defined", def.name.as_deref().unwrap_or_default()),
                    def.loc,
                ));
            }
            self.pstate_mut().windowdefs.push(def.clone());
        }
        Ok(())
    }

    /// One clause per window definition of the level, in `winref` order
    pub(crate) fn transform_window_clauses(&mut self, tlist: &mut Vec<TargetEntry>) -> Result<Vec<WindowClause>> {
        let defs = self.pstate().windowdefs.clone();
        let mut out = Vec::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            let mut partition_by = &def.partition_by;
            let mut order_by = &def.order_by;
            let mut copied_order = false;
            if let Some(refname) = &def.refname {
                let Some(base) = defs.iter().find(|d| d.name.as_deref() == Some(refname.as_str())) else {
                    return Err(error_at(
                        DiagnosticKind::UndefinedObject,
                        format!("window \"{}\" does not exist", refname),
                        def.loc,
                    ));
                };
                if !def.partition_by.is_empty() {
                    return Err(error_at(
                        DiagnosticKind::WindowingError,
                        format!("cannot override PARTITION BY clause of window \"{}\"", refname),
                        def.loc,
                    ));
                }
                partition_by = &base.partition_by;
                if !base.order_by.is_empty() {
                    if !def.order_by.is_empty() {
                        return Err(error_at(
                            DiagnosticKind::WindowingError,
                            format!("cannot override ORDER BY clause of window \"{}\"", refname),
                            def.loc,
                        ));
                    }
                    order_by = &base.order_by;
                    copied_order = true;
                }
                if base.frame.is_some() {
                    return Err(error_at(
                        DiagnosticKind::WindowingError,
                        format!("cannot copy window \"{}\" because it has a frame clause", refname),
                        def.loc,
                    )
                    .with_help("Omit the parentheses in this OVER clause."));
                }
            }

            let mut partition_clause: Vec<SortGroupClause> = Vec::with_capacity(partition_by.len());
            for raw in partition_by {
                let idx = self.find_target_list_entry(raw, tlist, ExprKind::WindowPartition)?;
                self.check_equality_operator(tlist[idx].expr.type_oid(), raw.location())?;
                let sgref = assign_sort_group_ref(tlist, idx);
                if !partition_clause.iter().any(|c| c.tle_sort_group_ref == sgref) {
                    partition_clause.push(group_clause_for(sgref));
                }
            }
            let order_clause = self.sort_list(order_by, tlist, ExprKind::WindowOrder)?;
            let frame = def
                .frame
                .as_ref()
                .map(|f| self.transform_frame(f, order_clause.len(), def.loc))
                .transpose()?;
            out.push(WindowClause {
                name: def.name.clone(),
                refname: def.refname.clone(),
                partition_clause,
                order_clause,
                frame,
                winref: i + 1,
                copied_order,
            });
        }
        Ok(out)
    }

    fn transform_frame(&mut self, spec: &FrameSpec, order_count: usize, loc: Location) -> Result<WindowFrame> {
        let framing = |message: &str| error_at(DiagnosticKind::WindowingError, message.to_string(), loc);
        if spec.units == FrameUnits::Groups && order_count == 0 {
            return Err(framing("GROUPS mode requires an ORDER BY clause"));
        }
        let (start, start_offset) = self.frame_bound(&spec.start, spec.units, order_count)?;
        let (end, end_offset) = match &spec.end {
            Some(bound) => self.frame_bound(bound, spec.units, order_count)?,
            None => (FrameBoundKind::CurrentRow, None),
        };
        if start == FrameBoundKind::UnboundedFollowing {
            return Err(framing("frame start cannot be UNBOUNDED FOLLOWING"));
        }
        if end == FrameBoundKind::UnboundedPreceding {
            return Err(framing("frame end cannot be UNBOUNDED PRECEDING"));
        }
        if start == FrameBoundKind::CurrentRow && end == FrameBoundKind::Preceding {
            return Err(framing("frame starting from current row cannot have preceding rows"));
        }
        if start == FrameBoundKind::Following
            && matches!(end, FrameBoundKind::Preceding | FrameBoundKind::CurrentRow)
        {
            return Err(framing("frame starting from following row cannot have preceding rows"));
        }
        Ok(WindowFrame {
            units: spec.units,
            start,
            start_offset,
            end,
            end_offset,
        })
    }

    fn frame_bound(
        &mut self,
        bound: &FrameBound,
        units: FrameUnits,
        order_count: usize,
    ) -> Result<(FrameBoundKind, Option<Expr>)> {
        Ok(match bound {
            FrameBound::UnboundedPreceding => (FrameBoundKind::UnboundedPreceding, None),
            FrameBound::CurrentRow => (FrameBoundKind::CurrentRow, None),
            FrameBound::UnboundedFollowing => (FrameBoundKind::UnboundedFollowing, None),
            FrameBound::Preceding(offset) => (
                FrameBoundKind::Preceding,
                Some(self.frame_offset(offset, units, order_count)?),
            ),
            FrameBound::Following(offset) => (
                FrameBoundKind::Following,
                Some(self.frame_offset(offset, units, order_count)?),
            ),
        })
    }

    fn frame_offset(&mut self, raw: &RawExpr, units: FrameUnits, order_count: usize) -> Result<Expr> {
        let (kind, construct) = match units {
            FrameUnits::Rows => (ExprKind::WindowFrameRows, "ROWS"),
            FrameUnits::Range => (ExprKind::WindowFrameRange, "RANGE"),
            FrameUnits::Groups => (ExprKind::WindowFrameGroups, "GROUPS"),
        };
        let expr = self.with_expr_kind(kind, |t| t.transform_expr(raw))?;
        if let Some(var) = locate_var_of_level(&expr, 0) {
            return Err(error_at(
                DiagnosticKind::InvalidColumnReference,
                format!("argument of {} must not contain variables", construct),
                var.location,
            ));
        }
        if units == FrameUnits::Range {
            if order_count != 1 {
                return Err(error_at(
                    DiagnosticKind::WindowingError,
                    "RANGE with offset PRECEDING/FOLLOWING requires exactly one ORDER BY column",
                    raw.location(),
                ));
            }
            return Ok(self.resolve_unknown(expr));
        }
        let (source, loc) = (expr.type_oid(), expr.location());
        self.coercion
            .coerce(self.catalog, expr, INT8_OID, -1, CoercionContext::Implicit)
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{analyze, analyze_err};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_order_by_output_name_and_position() {
        let query = analyze("SELECT id AS k, name FROM t ORDER BY k DESC, 2");
        assert_eq!(query.sort_clause.len(), 2);
        assert_eq!(query.sort_clause[0].tle_sort_group_ref, 1);
        assert_eq!(query.sort_clause[0].sortop.as_deref(), Some(">"));
        assert!(query.sort_clause[0].nulls_first);
        assert_eq!(query.target_list[1].ressortgroupref, 2);
        assert_eq!(query.target_list.len(), 2);
    }

    #[test]
    fn test_order_by_expression_adds_junk_entry() {
        let query = analyze("SELECT name FROM t ORDER BY id + 1");
        assert_eq!(query.target_list.len(), 2);
        assert!(query.target_list[1].resjunk);
        assert_eq!(query.target_list[1].ressortgroupref, 1);
    }

    #[test]
    fn test_order_by_errors() {
        let err = analyze_err("SELECT id FROM t ORDER BY 3");
        assert_eq!(err.message, "ORDER BY position 3 is not in select list");
        let err = analyze_err("SELECT id AS x, name AS x FROM t ORDER BY x");
        assert_eq!(err.message, "ORDER BY \"x\" is ambiguous");
    }

    #[test]
    fn test_group_by_prefers_input_column() {
        // `code` is both an input column and an output alias of `id`
        let query = analyze("SELECT id AS code FROM t GROUP BY code, id");
        assert_eq!(query.group_clause.len(), 2);
        assert!(query.target_list[1].resjunk);
    }

    #[test]
    fn test_group_by_position_rejects_aggregate() {
        let err = analyze_err("SELECT count(*) FROM t GROUP BY 1");
        assert_eq!(err.message, "aggregate functions are not allowed in GROUP BY");
    }

    #[test]
    fn test_grouping_sets() {
        let query = analyze("SELECT id, code, count(*) FROM t GROUP BY ROLLUP (id, code)");
        assert_eq!(query.group_clause.len(), 2);
        assert_eq!(query.grouping_sets.len(), 1);

        // a single set is plain grouping
        let query = analyze("SELECT id FROM t GROUP BY GROUPING SETS ((id))");
        assert!(query.grouping_sets.is_empty());
        assert_eq!(query.group_clause.len(), 1);
    }

    #[test]
    fn test_distinct() {
        let query = analyze("SELECT DISTINCT id, name FROM t");
        assert_eq!(query.distinct_clause.len(), 2);
        let err = analyze_err("SELECT DISTINCT id FROM t ORDER BY name");
        assert_eq!(
            err.message,
            "for SELECT DISTINCT, ORDER BY expressions must appear in select list"
        );
    }

    #[test]
    fn test_distinct_on_must_lead_order_by() {
        let query = analyze("SELECT DISTINCT ON (code) id, code FROM t ORDER BY code, id");
        assert!(query.has_distinct_on);
        assert_eq!(query.distinct_clause.len(), 1);
        let err = analyze_err("SELECT DISTINCT ON (code) id, code FROM t ORDER BY id, code");
        assert_eq!(
            err.message,
            "SELECT DISTINCT ON expressions must match initial ORDER BY expressions"
        );
    }

    #[test]
    fn test_named_windows() {
        let query = analyze(
            "SELECT rank() OVER w, sum(amount) OVER (w ROWS BETWEEN 1 PRECEDING AND CURRENT ROW) \
             FROM t WINDOW w AS (PARTITION BY code ORDER BY id)",
        );
        assert_eq!(query.window_clause.len(), 2);
        assert_eq!(query.window_clause[0].name.as_deref(), Some("w"));
        let copy = &query.window_clause[1];
        assert_eq!(copy.refname.as_deref(), Some("w"));
        assert!(copy.copied_order);
        assert_eq!(copy.partition_clause.len(), 1);
        let frame = copy.frame.as_ref().unwrap();
        assert_eq!(frame.start, FrameBoundKind::Preceding);
        assert_eq!(frame.start_offset.as_ref().unwrap().type_oid(), INT8_OID);
    }

    #[test]
    fn test_window_errors() {
        let err = analyze_err("SELECT rank() OVER w FROM t WINDOW w AS (ORDER BY id), w AS (ORDER BY code)");
        assert_eq!(err.message, "window \"w\" is already defined");
        let err = analyze_err("SELECT rank() OVER (w ORDER BY code) FROM t WINDOW w AS (ORDER BY id)");
        assert_eq!(err.message, "cannot override ORDER BY clause of window \"w\"");
        let err = analyze_err("SELECT rank() OVER (w PARTITION BY code) FROM t WINDOW w AS (ORDER BY id)");
        assert_eq!(err.message, "cannot override PARTITION BY clause of window \"w\"");
        let err = analyze_err(
            "SELECT sum(id) OVER (w) FROM t WINDOW w AS (ORDER BY id ROWS UNBOUNDED PRECEDING)",
        );
        assert_eq!(err.message, "cannot copy window \"w\" because it has a frame clause");
    }
}
