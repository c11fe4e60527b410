//! Level-tracking walkers over analyzed expressions and queries
//!
//! Every walker carries a `sublevels_up` counter that is incremented when the
//! walk enters a nested [`Query`] (sublink subselect, subquery range entry or
//! CTE body) and restored on exit. Callbacks receive the counter alongside
//! each node so they can compare a node's own `levelsup` against it.

use super::{Expr, JoinTreeNode, Query, RteKind};
use crate::stack;

/// What a callback wants the walker to do with the current node's children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// Do not descend into this node
    Skip,
}

/// Pre-order walk over an expression tree
pub fn walk_expr<F, E>(expr: &Expr, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, usize) -> Result<Walk, E>,
{
    stack::maybe_grow(|| walk_expr_node(expr, sublevels_up, f))
}

fn walk_expr_node<F, E>(expr: &Expr, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, usize) -> Result<Walk, E>,
{
    if f(expr, sublevels_up)? == Walk::Skip {
        return Ok(());
    }
    match expr {
        Expr::Var(_)
        | Expr::Const(_)
        | Expr::Param { .. }
        | Expr::CaseTest { .. }
        | Expr::SetToDefault { .. }
        | Expr::Rownum(_) => Ok(()),
        Expr::Aggref(agg) => {
            walk_list(&agg.direct_args, sublevels_up, f)?;
            walk_list(&agg.args, sublevels_up, f)?;
            for sort in &agg.order_by {
                walk_expr(&sort.expr, sublevels_up, f)?;
            }
            walk_opt(agg.filter.as_ref(), sublevels_up, f)
        }
        Expr::GroupingFunc(g) => walk_list(&g.args, sublevels_up, f),
        Expr::WindowFunc(w) => {
            walk_list(&w.args, sublevels_up, f)?;
            walk_opt(w.filter.as_ref(), sublevels_up, f)
        }
        Expr::Func(func) => walk_list(&func.args, sublevels_up, f),
        Expr::Op(op) => walk_list(&op.args, sublevels_up, f),
        Expr::Bool { args, .. }
        | Expr::Distinct { args, .. }
        | Expr::Coalesce { args, .. }
        | Expr::NullIf { args, .. }
        | Expr::MinMax { args, .. }
        | Expr::Row { args, .. } => walk_list(args, sublevels_up, f),
        Expr::Array { elements, .. } => walk_list(elements, sublevels_up, f),
        Expr::NullTest { arg, .. }
        | Expr::BooleanTest { arg, .. }
        | Expr::Coerce { arg, .. }
        | Expr::Collate { arg, .. }
        | Expr::FieldSelect { arg, .. } => walk_expr(arg, sublevels_up, f),
        Expr::FieldStore { arg, newvals, .. } => {
            walk_expr(arg, sublevels_up, f)?;
            walk_list(newvals, sublevels_up, f)
        }
        Expr::SubLink(sublink) => {
            walk_opt(sublink.testexpr.as_ref(), sublevels_up, f)?;
            walk_query(&sublink.subselect, sublevels_up + 1, f)
        }
        Expr::Case(case) => {
            walk_opt(case.arg.as_ref(), sublevels_up, f)?;
            for when in &case.whens {
                walk_expr(&when.cond, sublevels_up, f)?;
                walk_expr(&when.result, sublevels_up, f)?;
            }
            walk_opt(case.default.as_ref(), sublevels_up, f)
        }
        Expr::Subscript(sub) => {
            for e in sub.upper.iter().chain(sub.lower.iter()).flatten() {
                walk_expr(e, sublevels_up, f)?;
            }
            walk_expr(&sub.container, sublevels_up, f)?;
            walk_opt(sub.assign.as_ref(), sublevels_up, f)
        }
    }
}

fn walk_list<F, E>(exprs: &[Expr], sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, usize) -> Result<Walk, E>,
{
    for e in exprs {
        walk_expr(e, sublevels_up, f)?;
    }
    Ok(())
}

fn walk_opt<F, E>(expr: Option<&Expr>, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, usize) -> Result<Walk, E>,
{
    match expr {
        Some(e) => walk_expr(e, sublevels_up, f),
        None => Ok(()),
    }
}

fn walk_jointree<F, E>(node: &JoinTreeNode, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, usize) -> Result<Walk, E>,
{
    if let JoinTreeNode::Join(join) = node {
        walk_jointree(&join.larg, sublevels_up, f)?;
        walk_jointree(&join.rarg, sublevels_up, f)?;
        walk_opt(join.quals.as_ref(), sublevels_up, f)?;
    }
    Ok(())
}

/// Walk every expression of a query. `sublevels_up` is the level of `query`
/// itself relative to where the walk started.
///
/// Join alias variables are not visited; they only restate columns of the
/// join inputs.
pub fn walk_query<F, E>(query: &Query, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&Expr, usize) -> Result<Walk, E>,
{
    for te in query.target_list.iter().chain(query.returning_list.iter()) {
        walk_expr(&te.expr, sublevels_up, f)?;
    }
    for node in &query.jointree.fromlist {
        walk_jointree(node, sublevels_up, f)?;
    }
    walk_opt(query.jointree.quals.as_ref(), sublevels_up, f)?;
    walk_opt(query.having_qual.as_ref(), sublevels_up, f)?;
    walk_opt(query.limit_count.as_ref(), sublevels_up, f)?;
    walk_opt(query.limit_offset.as_ref(), sublevels_up, f)?;
    walk_opt(query.merge_join_condition.as_ref(), sublevels_up, f)?;
    for wc in &query.window_clause {
        if let Some(frame) = &wc.frame {
            walk_opt(frame.start_offset.as_ref(), sublevels_up, f)?;
            walk_opt(frame.end_offset.as_ref(), sublevels_up, f)?;
        }
    }
    for action in &query.merge_action_list {
        walk_opt(action.qual.as_ref(), sublevels_up, f)?;
        for te in &action.target_list {
            walk_expr(&te.expr, sublevels_up, f)?;
        }
    }
    for rte in &query.rtable {
        match &rte.kind {
            RteKind::Subquery { query } => walk_query(query, sublevels_up + 1, f)?,
            RteKind::Function { functions, .. } => {
                for func in functions {
                    walk_expr(&func.expr, sublevels_up, f)?;
                }
            }
            RteKind::Values { lists, .. } => {
                for row in lists {
                    walk_list(row, sublevels_up, f)?;
                }
            }
            RteKind::Relation { .. } | RteKind::Join { .. } | RteKind::Cte { .. } | RteKind::Result => {}
        }
    }
    for cte in &query.cte_list {
        walk_query(&cte.query, sublevels_up + 1, f)?;
    }
    Ok(())
}

/// Pre-order walk that may rewrite nodes in place. A callback that replaces
/// `*expr` should usually return [`Walk::Skip`].
pub fn walk_expr_mut<F, E>(expr: &mut Expr, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, usize) -> Result<Walk, E>,
{
    stack::maybe_grow(|| walk_expr_mut_node(expr, sublevels_up, f))
}

fn walk_expr_mut_node<F, E>(expr: &mut Expr, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, usize) -> Result<Walk, E>,
{
    if f(expr, sublevels_up)? == Walk::Skip {
        return Ok(());
    }
    match expr {
        Expr::Var(_)
        | Expr::Const(_)
        | Expr::Param { .. }
        | Expr::CaseTest { .. }
        | Expr::SetToDefault { .. }
        | Expr::Rownum(_) => Ok(()),
        Expr::Aggref(agg) => {
            walk_list_mut(&mut agg.direct_args, sublevels_up, f)?;
            walk_list_mut(&mut agg.args, sublevels_up, f)?;
            for sort in &mut agg.order_by {
                walk_expr_mut(&mut sort.expr, sublevels_up, f)?;
            }
            walk_opt_mut(agg.filter.as_mut(), sublevels_up, f)
        }
        Expr::GroupingFunc(g) => walk_list_mut(&mut g.args, sublevels_up, f),
        Expr::WindowFunc(w) => {
            walk_list_mut(&mut w.args, sublevels_up, f)?;
            walk_opt_mut(w.filter.as_mut(), sublevels_up, f)
        }
        Expr::Func(func) => walk_list_mut(&mut func.args, sublevels_up, f),
        Expr::Op(op) => walk_list_mut(&mut op.args, sublevels_up, f),
        Expr::Bool { args, .. }
        | Expr::Distinct { args, .. }
        | Expr::Coalesce { args, .. }
        | Expr::NullIf { args, .. }
        | Expr::MinMax { args, .. }
        | Expr::Row { args, .. } => walk_list_mut(args, sublevels_up, f),
        Expr::Array { elements, .. } => walk_list_mut(elements, sublevels_up, f),
        Expr::NullTest { arg, .. }
        | Expr::BooleanTest { arg, .. }
        | Expr::Coerce { arg, .. }
        | Expr::Collate { arg, .. }
        | Expr::FieldSelect { arg, .. } => walk_expr_mut(arg, sublevels_up, f),
        Expr::FieldStore { arg, newvals, .. } => {
            walk_expr_mut(arg, sublevels_up, f)?;
            walk_list_mut(newvals, sublevels_up, f)
        }
        Expr::SubLink(sublink) => {
            walk_opt_mut(sublink.testexpr.as_mut(), sublevels_up, f)?;
            walk_query_mut(&mut sublink.subselect, sublevels_up + 1, f)
        }
        Expr::Case(case) => {
            walk_opt_mut(case.arg.as_mut(), sublevels_up, f)?;
            for when in &mut case.whens {
                walk_expr_mut(&mut when.cond, sublevels_up, f)?;
                walk_expr_mut(&mut when.result, sublevels_up, f)?;
            }
            walk_opt_mut(case.default.as_mut(), sublevels_up, f)
        }
        Expr::Subscript(sub) => {
            for e in sub.upper.iter_mut().chain(sub.lower.iter_mut()).flatten() {
                walk_expr_mut(e, sublevels_up, f)?;
            }
            walk_expr_mut(&mut sub.container, sublevels_up, f)?;
            walk_opt_mut(sub.assign.as_mut(), sublevels_up, f)
        }
    }
}

fn walk_list_mut<F, E>(exprs: &mut [Expr], sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, usize) -> Result<Walk, E>,
{
    for e in exprs {
        walk_expr_mut(e, sublevels_up, f)?;
    }
    Ok(())
}

fn walk_opt_mut<F, E>(expr: Option<&mut Expr>, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, usize) -> Result<Walk, E>,
{
    match expr {
        Some(e) => walk_expr_mut(e, sublevels_up, f),
        None => Ok(()),
    }
}

fn walk_jointree_mut<F, E>(node: &mut JoinTreeNode, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, usize) -> Result<Walk, E>,
{
    if let JoinTreeNode::Join(join) = node {
        walk_jointree_mut(&mut join.larg, sublevels_up, f)?;
        walk_jointree_mut(&mut join.rarg, sublevels_up, f)?;
        walk_opt_mut(join.quals.as_mut(), sublevels_up, f)?;
    }
    Ok(())
}

/// Mutable counterpart of [`walk_query`]; join alias variables are included
/// so that level adjustments keep them consistent.
pub fn walk_query_mut<F, E>(query: &mut Query, sublevels_up: usize, f: &mut F) -> Result<(), E>
where
    F: FnMut(&mut Expr, usize) -> Result<Walk, E>,
{
    for te in query
        .target_list
        .iter_mut()
        .chain(query.returning_list.iter_mut())
    {
        walk_expr_mut(&mut te.expr, sublevels_up, f)?;
    }
    for node in &mut query.jointree.fromlist {
        walk_jointree_mut(node, sublevels_up, f)?;
    }
    walk_opt_mut(query.jointree.quals.as_mut(), sublevels_up, f)?;
    walk_opt_mut(query.having_qual.as_mut(), sublevels_up, f)?;
    walk_opt_mut(query.limit_count.as_mut(), sublevels_up, f)?;
    walk_opt_mut(query.limit_offset.as_mut(), sublevels_up, f)?;
    walk_opt_mut(query.merge_join_condition.as_mut(), sublevels_up, f)?;
    for action in &mut query.merge_action_list {
        walk_opt_mut(action.qual.as_mut(), sublevels_up, f)?;
        for te in &mut action.target_list {
            walk_expr_mut(&mut te.expr, sublevels_up, f)?;
        }
    }
    for rte in &mut query.rtable {
        match &mut rte.kind {
            RteKind::Subquery { query } => walk_query_mut(query, sublevels_up + 1, f)?,
            RteKind::Function { functions, .. } => {
                for func in functions {
                    walk_expr_mut(&mut func.expr, sublevels_up, f)?;
                }
            }
            RteKind::Values { lists, .. } => {
                for row in lists {
                    walk_list_mut(row, sublevels_up, f)?;
                }
            }
            RteKind::Join { alias_vars, .. } => walk_list_mut(alias_vars, sublevels_up, f)?,
            RteKind::Relation { .. } | RteKind::Cte { .. } | RteKind::Result => {}
        }
    }
    for cte in &mut query.cte_list {
        walk_query_mut(&mut cte.query, sublevels_up + 1, f)?;
    }
    Ok(())
}

/// Add `delta` to the level of every Var, aggregate and CTE reference that
/// points at or above `min_sublevels_up` relative to `expr`.
///
/// Used when an expression built at one query level is placed `delta` levels
/// deeper.
pub fn increment_var_sublevels_up(expr: &mut Expr, delta: usize, min_sublevels_up: usize) {
    if delta == 0 {
        return;
    }
    let mut bump = |node: &mut Expr, sublevels_up: usize| -> Result<Walk, std::convert::Infallible> {
        let threshold = min_sublevels_up + sublevels_up;
        match node {
            Expr::Var(v) if v.levelsup >= threshold => v.levelsup += delta,
            Expr::Aggref(a) if a.agglevelsup >= threshold => a.agglevelsup += delta,
            Expr::GroupingFunc(g) if g.agglevelsup >= threshold => g.agglevelsup += delta,
            _ => {}
        }
        Ok(Walk::Continue)
    };
    let _ = walk_expr_mut(expr, 0, &mut bump);
}

/// Whether any Var of the given level occurs, looking into sublinks
pub fn contain_vars_of_level(expr: &Expr, levelsup: usize) -> bool {
    locate_var_of_level(expr, levelsup).is_some()
}

/// The first Var of the given level, looking into sublinks
pub fn locate_var_of_level(expr: &Expr, levelsup: usize) -> Option<super::Var> {
    let mut found = None;
    let _ = walk_expr(expr, 0, &mut |node: &Expr, sublevels_up| -> Result<Walk, ()> {
        match node {
            Expr::Var(v) if v.levelsup == levelsup + sublevels_up => {
                found = Some(v.clone());
                Err(())
            }
            _ => Ok(Walk::Continue),
        }
    });
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{CommandType, Const, SubLink, SubLinkType, TargetEntry, Var};
    use crate::syntax::Location;
    use crate::types::{BOOL_OID, INT4_OID};

    fn var(levelsup: usize) -> Expr {
        Expr::Var(Var {
            varno: 1,
            varattno: 1,
            vartype: INT4_OID,
            vartypmod: -1,
            varcollid: 0,
            levelsup,
            location: Location::UNKNOWN,
        })
    }

    fn exists(target: Expr) -> Expr {
        let mut sub = Query::new(CommandType::Select);
        sub.target_list.push(TargetEntry::new(target, 1, None, false));
        Expr::SubLink(Box::new(SubLink {
            kind: SubLinkType::Exists,
            testexpr: None,
            operator: None,
            subselect: Box::new(sub),
            result_type: BOOL_OID,
            location: Location::UNKNOWN,
        }))
    }

    #[test]
    fn test_sublevels_increment_inside_sublink() {
        // the inner Var points one level out of the subquery, i.e. at our level
        let expr = exists(var(1));
        assert!(contain_vars_of_level(&expr, 0));
        assert!(!contain_vars_of_level(&expr, 1));
    }

    #[test]
    fn test_increment_skips_local_vars_of_nested_query() {
        let mut expr = Expr::Bool {
            op: crate::syntax::BoolOp::And,
            args: vec![var(0), exists(var(0)), exists(var(1))],
            location: Location::UNKNOWN,
        };
        increment_var_sublevels_up(&mut expr, 2, 0);
        let mut levels = Vec::new();
        let _ = walk_expr(&expr, 0, &mut |node: &Expr, _| -> Result<Walk, ()> {
            if let Expr::Var(v) = node {
                levels.push(v.levelsup);
            }
            Ok(Walk::Continue)
        });
        assert_eq!(levels, vec![2, 0, 3]);
    }

    #[test]
    fn test_skip_stops_descent() {
        let expr = Expr::Coalesce {
            type_oid: INT4_OID,
            collid: 0,
            args: vec![var(0), Expr::Const(Const::int4(1))],
            location: Location::UNKNOWN,
        };
        let mut seen = 0;
        let _ = walk_expr(&expr, 0, &mut |_: &Expr, _| -> Result<Walk, ()> {
            seen += 1;
            Ok(Walk::Skip)
        });
        assert_eq!(seen, 1);
    }
}
