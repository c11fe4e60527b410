//! Aggregate levels and grouping validity
//!
//! An aggregate belongs to the lowest query level any of its aggregated
//! arguments reference, not necessarily the level it is written in. Once a
//! level is fully analyzed, every column it outputs must be grouped, used
//! inside one of its aggregates, or functionally dependent on a grouped
//! primary key.

use super::relation::SYSTEM_COLUMNS;
use super::state::{error_at, Transformer};
use crate::catalog::CatalogProvider;
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::query::walker::{increment_var_sublevels_up, walk_expr, walk_expr_mut, Walk};
use crate::query::{expand_grouping_sets, Expr, GroupingFunc, Query, RangeTblEntry, RteKind, Var};
use crate::syntax::{Location, RawExpr};
use crate::types::Oid;

/// Lowest variable and aggregate levels referenced by `exprs`, relative to
/// the level they are written in
fn argument_levels<'e>(exprs: impl IntoIterator<Item = &'e Expr>) -> Result<(Option<usize>, Option<usize>)> {
    let mut min_var: Option<usize> = None;
    let mut min_agg: Option<usize> = None;
    let lower = |slot: &mut Option<usize>, level: usize| {
        *slot = Some(slot.map_or(level, |cur| cur.min(level)));
    };
    for expr in exprs {
        walk_expr(expr, 0, &mut |e, sub| match e {
            Expr::Var(v) => {
                if v.levelsup >= sub {
                    lower(&mut min_var, v.levelsup - sub);
                }
                Ok(Walk::Continue)
            }
            Expr::Aggref(a) => {
                if a.agglevelsup >= sub {
                    lower(&mut min_agg, a.agglevelsup - sub);
                }
                Ok(Walk::Skip)
            }
            Expr::GroupingFunc(g) => {
                if g.agglevelsup >= sub {
                    lower(&mut min_agg, g.agglevelsup - sub);
                }
                Ok(Walk::Continue)
            }
            Expr::Func(f) if sub == 0 && f.returns_set => Err(error_at(
                DiagnosticKind::FeatureNotSupported,
                "aggregate function calls cannot contain set-returning function calls",
                f.location,
            )),
            Expr::WindowFunc(w) if sub == 0 => Err(error_at(
                DiagnosticKind::GroupingError,
                "aggregate function calls cannot contain window function calls",
                w.location,
            )),
            _ => Ok(Walk::Continue),
        })?;
    }
    Ok((min_var, min_agg))
}

/// Position of the first aggregate of `level` in `exprs`
fn locate_agg_of_level<'e>(exprs: impl IntoIterator<Item = &'e Expr>, level: usize) -> Location {
    let mut found = Location::UNKNOWN;
    for expr in exprs {
        let hit = walk_expr(expr, 0, &mut |e, sub| match e {
            Expr::Aggref(a) if a.agglevelsup == level + sub => Err(a.location),
            Expr::GroupingFunc(g) if g.agglevelsup == level + sub => Err(g.location),
            _ => Ok(Walk::Continue),
        });
        if let Err(loc) = hit {
            found = loc;
            break;
        }
    }
    found
}

fn nested_aggregate(loc: Location) -> Diagnostic {
    error_at(
        DiagnosticKind::GroupingError,
        "aggregate function calls cannot be nested",
        loc,
    )
}

impl Transformer<'_> {
    /// Settle the semantic level of an aggregate or GROUPING call and check
    /// it is legal where that level is currently being analyzed. Returns the
    /// level.
    pub(crate) fn check_agg_level(
        &mut self,
        direct_args: &[Expr],
        args: &[&Expr],
        is_agg: bool,
        loc: Location,
    ) -> Result<usize> {
        let (min_var, min_agg) = argument_levels(args.iter().copied())?;
        let level = match (min_var, min_agg) {
            (None, None) => 0,
            (Some(v), None) => v,
            (None, Some(a)) => a,
            (Some(v), Some(a)) => v.min(a),
        };
        if min_agg == Some(level) {
            return Err(nested_aggregate(locate_agg_of_level(args.iter().copied(), level)));
        }
        if !direct_args.is_empty() {
            let (direct_var, direct_agg) = argument_levels(direct_args)?;
            if let Some(v) = direct_var.filter(|v| *v < level) {
                let loc = direct_args
                    .iter()
                    .find_map(|e| crate::query::walker::locate_var_of_level(e, v))
                    .map_or(loc, |var| var.location);
                return Err(error_at(
                    DiagnosticKind::GroupingError,
                    "outer-level aggregate cannot contain a lower-level variable in its direct arguments",
                    loc,
                ));
            }
            if let Some(a) = direct_agg.filter(|a| *a <= level) {
                return Err(nested_aggregate(locate_agg_of_level(direct_args, a)));
            }
        }
        if level >= self.scopes.len() {
            return Err(error_at(
                DiagnosticKind::GroupingError,
                "aggregate references a query level that does not exist",
                loc,
            ));
        }

        let idx = self.scope_index(level);
        let scope = &mut self.scopes[idx];
        scope.has_aggs = true;
        if let Some(message) = scope.expr_kind.agg_error(is_agg) {
            return Err(error_at(DiagnosticKind::GroupingError, message, loc));
        }
        Ok(level)
    }

    /// `GROUPING(a, b, ...)`; the grouping references are filled in once the
    /// level's GROUP BY is known
    pub(crate) fn transform_grouping_func(&mut self, args: &[RawExpr], loc: Location) -> Result<Expr> {
        if args.len() > 31 {
            return Err(error_at(
                DiagnosticKind::ProgramLimitExceeded,
                "GROUPING must have fewer than 32 arguments",
                loc,
            ));
        }
        let args = self.transform_list(args)?;
        let arg_refs: Vec<&Expr> = args.iter().collect();
        let agglevelsup = self.check_agg_level(&[], &arg_refs, false, loc)?;
        Ok(Expr::GroupingFunc(Box::new(GroupingFunc {
            args,
            refs: Vec::new(),
            agglevelsup,
            location: loc,
        })))
    }

    /// Check the finished level `query` for ungrouped column references and
    /// resolve its GROUPING calls
    pub(crate) fn check_grouping(&mut self, query: &mut Query) -> Result<()> {
        let common_refs: Option<Vec<usize>> = if query.grouping_sets.is_empty() {
            None
        } else {
            let limit = self.options.max_grouping_sets;
            let sets = expand_grouping_sets(&query.grouping_sets, limit).ok_or_else(|| {
                error_at(
                    DiagnosticKind::StatementTooComplex,
                    format!("too many grouping sets present (maximum {})", limit),
                    Location::UNKNOWN,
                )
            })?;
            let mut iter = sets.into_iter();
            let first = iter.next().unwrap_or_default();
            Some(iter.fold(first, |acc, set| acc.into_iter().filter(|r| set.contains(r)).collect()))
        };

        let has_joins = query.rtable.iter().any(RangeTblEntry::is_join);
        let mut group_exprs: Vec<(Expr, usize)> = Vec::with_capacity(query.group_clause.len());
        for clause in &query.group_clause {
            if let Some(te) = query
                .target_list
                .iter()
                .find(|te| te.ressortgroupref == clause.tle_sort_group_ref)
            {
                let mut expr = te.expr.clone();
                if has_joins {
                    flatten_join_alias_vars(&query.rtable, &mut expr, 0);
                }
                group_exprs.push((expr, te.ressortgroupref));
            }
        }
        let have_non_var = group_exprs.iter().any(|(e, _)| !matches!(e, Expr::Var(_)));
        let common_vars: Vec<Var> = group_exprs
            .iter()
            .filter(|(_, r)| common_refs.as_ref().map_or(true, |c| c.contains(r)))
            .filter_map(|(e, _)| e.as_var().cloned())
            .collect();

        let grouping = GroupingContext {
            rtable: &query.rtable,
            group_exprs: &group_exprs,
            have_non_var,
            flatten: has_joins,
        };
        for te in &mut query.target_list {
            grouping.finalize_grouping_funcs(&mut te.expr, 0)?;
        }
        if let Some(having) = query.having_qual.as_mut() {
            grouping.finalize_grouping_funcs(having, 0)?;
        }

        let mut check = UngroupedCheck {
            catalog: self.catalog,
            rtable: &query.rtable,
            group_exprs: &group_exprs,
            common_vars: &common_vars,
            have_non_var,
            in_direct_args: false,
            func_grouped_rels: Vec::new(),
            constraint_deps: Vec::new(),
        };
        let clauses = query.target_list.iter().map(|te| &te.expr).chain(query.having_qual.as_ref());
        for expr in clauses {
            let mut expr = expr.clone();
            if has_joins {
                flatten_join_alias_vars(&query.rtable, &mut expr, 0);
            }
            check.check(&expr, 0)?;
        }
        let deps = check.constraint_deps;
        for dep in deps {
            if !query.constraint_deps.contains(&dep) {
                query.constraint_deps.push(dep);
            }
        }
        Ok(())
    }
}

/// Replace references to join output columns with the join's input columns
fn flatten_join_alias_vars(rtable: &[RangeTblEntry], expr: &mut Expr, sublevels_up: usize) {
    let _ = walk_expr_mut(expr, sublevels_up, &mut |node: &mut Expr, sub| -> std::result::Result<Walk, std::convert::Infallible> {
        while let Expr::Var(v) = node {
            if v.levelsup != sub || v.varattno <= 0 {
                break;
            }
            let alias = rtable.get(v.varno - 1).and_then(|rte| match &rte.kind {
                RteKind::Join { alias_vars, .. } => alias_vars.get(v.varattno as usize - 1),
                _ => None,
            });
            let Some(alias) = alias else { break };
            let mut replacement = alias.clone();
            increment_var_sublevels_up(&mut replacement, sub, 0);
            *node = replacement;
        }
        Ok(Walk::Continue)
    });
}

struct GroupingContext<'q> {
    rtable: &'q [RangeTblEntry],
    group_exprs: &'q [(Expr, usize)],
    have_non_var: bool,
    flatten: bool,
}

impl GroupingContext<'_> {
    /// Fill in the references of every GROUPING call of this level; `expr`
    /// sits `sublevels_up` levels below it
    fn finalize_grouping_funcs(&self, expr: &mut Expr, sublevels_up: usize) -> Result<()> {
        walk_expr_mut(expr, sublevels_up, &mut |node: &mut Expr, sub| match node {
            Expr::Aggref(a) if a.agglevelsup == sub => {
                for arg in &mut a.direct_args {
                    self.finalize_grouping_funcs(arg, sub)?;
                }
                Ok(Walk::Skip)
            }
            Expr::Aggref(a) if a.agglevelsup > sub => Ok(Walk::Skip),
            Expr::GroupingFunc(g) if g.agglevelsup == sub => {
                let mut refs = Vec::with_capacity(g.args.len());
                for arg in &g.args {
                    refs.push(self.grouping_ref(arg, sub)?);
                }
                g.refs = refs;
                Ok(Walk::Continue)
            }
            Expr::GroupingFunc(g) if g.agglevelsup > sub => Ok(Walk::Skip),
            _ => Ok(Walk::Continue),
        })
    }

    fn grouping_ref(&self, arg: &Expr, sub: usize) -> Result<usize> {
        let mut arg = arg.clone();
        if self.flatten {
            flatten_join_alias_vars(self.rtable, &mut arg, sub);
        }
        let found = match &arg {
            Expr::Var(v) if v.levelsup == sub => self.group_exprs.iter().find_map(|(g, r)| match g {
                Expr::Var(gv) if gv.varno == v.varno && gv.varattno == v.varattno && gv.levelsup == 0 => {
                    Some(*r)
                }
                _ => None,
            }),
            Expr::Var(_) => None,
            other if self.have_non_var && sub == 0 => {
                self.group_exprs.iter().find(|(g, _)| g == other).map(|(_, r)| *r)
            }
            _ => None,
        };
        found.ok_or_else(|| {
            error_at(
                DiagnosticKind::GroupingError,
                "arguments to GROUPING must be grouping expressions of the associated query level",
                arg.location(),
            )
        })
    }
}

struct UngroupedCheck<'q> {
    catalog: &'q dyn CatalogProvider,
    rtable: &'q [RangeTblEntry],
    group_exprs: &'q [(Expr, usize)],
    /// Grouped Vars present in every grouping set
    common_vars: &'q [Var],
    have_non_var: bool,
    in_direct_args: bool,
    /// Entries already proven functionally dependent on the grouping
    func_grouped_rels: Vec<usize>,
    constraint_deps: Vec<Oid>,
}

impl UngroupedCheck<'_> {
    fn check(&mut self, expr: &Expr, sublevels_up: usize) -> Result<()> {
        walk_expr(expr, sublevels_up, &mut |node, sub| self.visit(node, sub))
    }

    fn visit(&mut self, node: &Expr, sub: usize) -> Result<Walk> {
        match node {
            Expr::Const(_) | Expr::Param { .. } => return Ok(Walk::Skip),
            Expr::Aggref(a) if a.agglevelsup == sub => {
                self.in_direct_args = true;
                let result = a.direct_args.iter().try_for_each(|arg| self.check(arg, sub));
                self.in_direct_args = false;
                result?;
                return Ok(Walk::Skip);
            }
            Expr::Aggref(a) if a.agglevelsup > sub => return Ok(Walk::Skip),
            Expr::GroupingFunc(g) if g.agglevelsup >= sub => return Ok(Walk::Skip),
            _ => {}
        }

        if self.have_non_var && sub == 0 && self.group_exprs.iter().any(|(g, _)| g == node) {
            return Ok(Walk::Skip);
        }

        match node {
            Expr::Rownum(loc) if sub == 0 && !self.have_non_var => Err(error_at(
                DiagnosticKind::GroupingError,
                "ROWNUM must appear in the GROUP BY clause or be used in an aggregate function",
                *loc,
            )),
            Expr::Var(v) if v.levelsup == sub => self.check_var(v, sub).map(|()| Walk::Continue),
            _ => Ok(Walk::Continue),
        }
    }

    fn check_var(&mut self, var: &Var, sub: usize) -> Result<()> {
        if !self.have_non_var || sub != 0 {
            let grouped = self.group_exprs.iter().any(|(g, _)| {
                matches!(g, Expr::Var(gv) if gv.varno == var.varno && gv.varattno == var.varattno && gv.levelsup == 0)
            });
            if grouped {
                return Ok(());
            }
        }
        if self.func_grouped_rels.contains(&var.varno) {
            return Ok(());
        }
        let Some(rte) = var.varno.checked_sub(1).and_then(|i| self.rtable.get(i)) else {
            return Ok(());
        };
        if let RteKind::Relation { relid, .. } = &rte.kind {
            let grouped_attnos: Vec<i32> = self
                .common_vars
                .iter()
                .filter(|gv| gv.varno == var.varno && gv.levelsup == 0)
                .map(|gv| gv.varattno)
                .collect();
            if let Some(constraint) = self.catalog.functional_dependency(*relid, &grouped_attnos) {
                self.func_grouped_rels.push(var.varno);
                if !self.constraint_deps.contains(&constraint) {
                    self.constraint_deps.push(constraint);
                }
                return Ok(());
            }
        }
        Err(self.ungrouped_error(rte, var, sub))
    }

    fn ungrouped_error(&self, rte: &RangeTblEntry, var: &Var, sub: usize) -> Diagnostic {
        let attname = attribute_name(rte, var.varattno);
        let (relname, colname) = match (rte.sw_converted, attname.split_once('@')) {
            (true, Some((rel, col))) => (rel.to_string(), col.to_string()),
            _ => (rte.eref.aliasname.clone(), attname.clone()),
        };
        if sub > 0 {
            return error_at(
                DiagnosticKind::GroupingError,
                format!("subquery uses ungrouped column \"{}.{}\" from outer query", relname, colname),
                var.location,
            );
        }
        let mut err = error_at(
            DiagnosticKind::GroupingError,
            format!(
                "column \"{}.{}\" must appear in the GROUP BY clause or be used in an aggregate function",
                relname, colname
            ),
            var.location,
        );
        if self.in_direct_args {
            err = err.with_detail("Direct arguments of an ordered-set aggregate must use only grouped columns.");
        } else if rte.sw_converted {
            err = err.with_detail("Please check your start with rewrite table's column.");
        }
        err
    }
}

fn attribute_name(rte: &RangeTblEntry, attno: i32) -> String {
    match attno {
        0 => "*".to_string(),
        n if n < 0 => SYSTEM_COLUMNS
            .iter()
            .find(|(_, num, _)| *num == n)
            .map_or_else(|| format!("#{}", n), |(name, _, _)| name.to_string()),
        n => rte
            .eref
            .colnames
            .get(n as usize - 1)
            .cloned()
            .unwrap_or_else(|| format!("#{}", n)),
    }
}

#[cfg(test)]
mod tests {
    use crate::analyzer::testing::{analyze, analyze_err, analyze_oracle_err};
    use crate::query::Expr;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_aggregate_level_follows_arguments() {
        let query = analyze("SELECT (SELECT max(t.id) FROM u) FROM t");
        assert!(query.has_aggs);
        let Expr::SubLink(sublink) = &query.target_list[0].expr else {
            panic!("expected a sublink");
        };
        assert!(!sublink.subselect.has_aggs);
        let Expr::Aggref(agg) = &sublink.subselect.target_list[0].expr else {
            panic!("expected an aggregate");
        };
        assert_eq!(agg.agglevelsup, 1);
    }

    #[test]
    fn test_nested_aggregates() {
        let err = analyze_err("SELECT sum(sum(id)) FROM t");
        assert_eq!(err.message, "aggregate function calls cannot be nested");
        analyze("SELECT sum((SELECT sum(t_id) FROM u)) FROM t");
    }

    #[test]
    fn test_aggregate_placement() {
        let err = analyze_err("SELECT id FROM t WHERE count(*) > 1");
        assert_eq!(err.message, "aggregate functions are not allowed in WHERE");
        let err = analyze_err("SELECT sum(rank() OVER (ORDER BY id)) FROM t");
        assert_eq!(err.message, "aggregate function calls cannot contain window function calls");
        let err = analyze_err("SELECT sum(generate_series(1, id)) FROM t");
        assert_eq!(
            err.message,
            "aggregate function calls cannot contain set-returning function calls"
        );
    }

    #[test]
    fn test_ungrouped_columns() {
        let err = analyze_err("SELECT code, name FROM t GROUP BY code");
        assert_eq!(
            err.message,
            "column \"t.name\" must appear in the GROUP BY clause or be used in an aggregate function"
        );
        analyze("SELECT code, count(name) FROM t GROUP BY code");
        let err = analyze_err("SELECT code FROM t GROUP BY code HAVING (SELECT u.note FROM u WHERE u.t_id = t.id) = ''");
        assert_eq!(err.message, "subquery uses ungrouped column \"t.id\" from outer query");
    }

    #[test]
    fn test_grouped_expression_covers_output() {
        analyze("SELECT code + 1, count(*) FROM t GROUP BY code + 1");
        let err = analyze_err("SELECT code + 1, code FROM t GROUP BY code + 1");
        assert_eq!(
            err.message,
            "column \"t.code\" must appear in the GROUP BY clause or be used in an aggregate function"
        );
    }

    #[test]
    fn test_functional_dependency_on_primary_key() {
        let query = analyze("SELECT id, name, amount FROM t GROUP BY id");
        assert_eq!(query.constraint_deps.len(), 1);
        // only grouping columns common to every set count
        let err = analyze_err("SELECT id, name FROM t GROUP BY GROUPING SETS ((id), (code))");
        assert!(err.message.starts_with("column \"t.name\""));
    }

    #[test]
    fn test_join_alias_vars_match_grouping() {
        analyze("SELECT code FROM t JOIN u ON t.id = u.t_id GROUP BY t.code");
    }

    #[test]
    fn test_grouping_function_refs() {
        let query = analyze("SELECT code, grouping(code) FROM t GROUP BY ROLLUP (code)");
        let Expr::GroupingFunc(g) = &query.target_list[1].expr else {
            panic!("expected GROUPING");
        };
        assert_eq!(g.refs, vec![1]);
        let err = analyze_err("SELECT grouping(name) FROM t GROUP BY code");
        assert_eq!(
            err.message,
            "arguments to GROUPING must be grouping expressions of the associated query level"
        );
    }

    #[test]
    fn test_rownum_must_be_grouped() {
        let err = analyze_oracle_err("SELECT code FROM t GROUP BY code HAVING rownum < 2");
        assert_eq!(
            err.message,
            "ROWNUM must appear in the GROUP BY clause or be used in an aggregate function"
        );
    }
}
