//! Traversals of the raw tree
//!
//! [`RawVisitor`] is a read-only pre-order walk over statements and
//! expressions. [`map_expr`] rebuilds an expression tree, which is how raw
//! rewrites avoid mutating a tree that other stages still read.

use super::*;
use crate::query::walker::Walk;
use crate::stack;

/// Callbacks for [`walk_select`] and [`walk_expr`]. Every method has a
/// default that just keeps walking.
pub trait RawVisitor {
    fn visit_expr(&mut self, _expr: &RawExpr) -> Walk {
        Walk::Continue
    }

    fn visit_range_var(&mut self, _rv: &RangeVar) {}

    /// Called before descending into any nested SELECT, including CTE
    /// bodies and set-operation arms
    fn enter_select(&mut self, _stmt: &SelectStmt) -> Walk {
        Walk::Continue
    }

    fn leave_select(&mut self, _stmt: &SelectStmt) {}
}

pub fn walk_select<V: RawVisitor + ?Sized>(v: &mut V, stmt: &SelectStmt) {
    if v.enter_select(stmt) == Walk::Skip {
        return;
    }
    if let Some(with) = &stmt.with {
        for cte in &with.ctes {
            walk_select(v, &cte.query);
        }
    }
    match &stmt.body {
        SelectBody::Simple(select) => walk_simple(v, select),
        SelectBody::Values(rows) => {
            for e in rows.iter().flatten() {
                walk_expr(v, e);
            }
        }
        SelectBody::SetOp { left, right, .. } => {
            walk_select(v, left);
            walk_select(v, right);
        }
    }
    for sort in &stmt.order_by {
        walk_expr(v, &sort.expr);
    }
    walk_opt(v, stmt.limit.as_ref());
    walk_opt(v, stmt.offset.as_ref());
    v.leave_select(stmt);
}

fn walk_simple<V: RawVisitor + ?Sized>(v: &mut V, select: &SimpleSelect) {
    for e in select.distinct.iter().flatten() {
        walk_expr(v, e);
    }
    for target in &select.targets {
        walk_expr(v, &target.val);
    }
    for item in &select.from {
        walk_from_item(v, item);
    }
    walk_opt(v, select.where_clause.as_ref());
    for item in &select.group_by {
        walk_group_item(v, item);
    }
    walk_opt(v, select.having.as_ref());
    for window in &select.windows {
        walk_window(v, window);
    }
    if let Some(sw) = &select.start_with {
        walk_opt(v, sw.start_with.as_ref());
        walk_expr(v, &sw.connect_by);
        for sort in &sw.siblings_order {
            walk_expr(v, &sort.expr);
        }
    }
}

pub fn walk_from_item<V: RawVisitor + ?Sized>(v: &mut V, item: &FromItem) {
    match item {
        FromItem::Relation(rv) => v.visit_range_var(rv),
        FromItem::Subselect { query, .. } => walk_select(v, query),
        FromItem::Function { func, .. } => walk_func_call(v, func),
        FromItem::Join(join) => {
            walk_from_item(v, &join.left);
            walk_from_item(v, &join.right);
            walk_opt(v, join.quals.as_ref());
        }
    }
}

fn walk_group_item<V: RawVisitor + ?Sized>(v: &mut V, item: &GroupItem) {
    match item {
        GroupItem::Expr(e) => walk_expr(v, e),
        GroupItem::Empty => {}
        GroupItem::Simple(exprs) => {
            for e in exprs {
                walk_expr(v, e);
            }
        }
        GroupItem::Rollup(items) | GroupItem::Cube(items) | GroupItem::Sets(items) => {
            for item in items {
                walk_group_item(v, item);
            }
        }
    }
}

fn walk_window<V: RawVisitor + ?Sized>(v: &mut V, window: &WindowDef) {
    for e in &window.partition_by {
        walk_expr(v, e);
    }
    for sort in &window.order_by {
        walk_expr(v, &sort.expr);
    }
    if let Some(frame) = &window.frame {
        for bound in std::iter::once(&frame.start).chain(frame.end.iter()) {
            if let FrameBound::Preceding(e) | FrameBound::Following(e) = bound {
                walk_expr(v, e);
            }
        }
    }
}

fn walk_func_call<V: RawVisitor + ?Sized>(v: &mut V, func: &FuncCall) {
    for arg in &func.args {
        walk_expr(v, arg);
    }
    for sort in &func.agg_order {
        walk_expr(v, &sort.expr);
    }
    if let Some(filter) = &func.agg_filter {
        walk_expr(v, filter);
    }
    if let Some(over) = &func.over {
        walk_window(v, over);
    }
}

fn walk_opt<V: RawVisitor + ?Sized>(v: &mut V, expr: Option<&RawExpr>) {
    if let Some(e) = expr {
        walk_expr(v, e);
    }
}

pub fn walk_expr<V: RawVisitor + ?Sized>(v: &mut V, expr: &RawExpr) {
    stack::maybe_grow(|| walk_expr_node(v, expr))
}

fn walk_expr_node<V: RawVisitor + ?Sized>(v: &mut V, expr: &RawExpr) {
    if v.visit_expr(expr) == Walk::Skip {
        return;
    }
    match expr {
        RawExpr::ColumnRef(_)
        | RawExpr::Const(..)
        | RawExpr::Param(..)
        | RawExpr::Rownum(_)
        | RawExpr::SetToDefault(_) => {}
        RawExpr::Op { left, right, .. } => {
            walk_opt(v, left.as_deref());
            walk_opt(v, right.as_deref());
        }
        RawExpr::Bool { args, .. }
        | RawExpr::Coalesce(args, _)
        | RawExpr::MinMax { args, .. }
        | RawExpr::Row(args, _)
        | RawExpr::Array(args, _)
        | RawExpr::GroupingFunc(args, _) => {
            for a in args {
                walk_expr(v, a);
            }
        }
        RawExpr::In { expr, list, .. } => {
            walk_expr(v, expr);
            for a in list {
                walk_expr(v, a);
            }
        }
        RawExpr::NullTest { arg, .. }
        | RawExpr::BoolTest { arg, .. }
        | RawExpr::TypeCast { arg, .. }
        | RawExpr::Collate { arg, .. } => walk_expr(v, arg),
        RawExpr::DistinctFrom { left, right, .. } | RawExpr::NullIf(left, right, _) => {
            walk_expr(v, left);
            walk_expr(v, right);
        }
        RawExpr::FuncCall(func) => walk_func_call(v, func),
        RawExpr::SubLink { test, subselect, .. } => {
            walk_opt(v, test.as_deref());
            walk_select(v, subselect);
        }
        RawExpr::Case {
            arg,
            whens,
            default,
            ..
        } => {
            walk_opt(v, arg.as_deref());
            for (cond, result) in whens {
                walk_expr(v, cond);
                walk_expr(v, result);
            }
            walk_opt(v, default.as_deref());
        }
        RawExpr::Indirection {
            arg, indirection, ..
        } => {
            walk_expr(v, arg);
            for ind in indirection {
                if let Indirection::Subscript { lower, upper, .. } = ind {
                    walk_opt(v, lower.as_deref());
                    walk_opt(v, upper.as_deref());
                }
            }
        }
    }
}

/// Rebuild `expr`. `f` sees every node before its children; returning
/// `Some` replaces the node without descending into it.
///
/// Sub-selects of sublinks are copied unchanged; only their test
/// expressions are mapped.
pub fn map_expr<F, E>(expr: &RawExpr, f: &mut F) -> Result<RawExpr, E>
where
    F: FnMut(&RawExpr) -> Result<Option<RawExpr>, E>,
{
    stack::maybe_grow(|| map_expr_node(expr, f))
}

fn map_expr_node<F, E>(expr: &RawExpr, f: &mut F) -> Result<RawExpr, E>
where
    F: FnMut(&RawExpr) -> Result<Option<RawExpr>, E>,
{
    if let Some(replacement) = f(expr)? {
        return Ok(replacement);
    }
    let boxed = |e: &RawExpr, f: &mut F| map_expr(e, f).map(Box::new);
    let list = |es: &[RawExpr], f: &mut F| es.iter().map(|e| map_expr(e, f)).collect::<Result<Vec<_>, E>>();

    Ok(match expr {
        RawExpr::ColumnRef(_)
        | RawExpr::Const(..)
        | RawExpr::Param(..)
        | RawExpr::Rownum(_)
        | RawExpr::SetToDefault(_) => expr.clone(),
        RawExpr::Op {
            name,
            left,
            right,
            loc,
        } => RawExpr::Op {
            name: name.clone(),
            left: left.as_deref().map(|e| boxed(e, f)).transpose()?,
            right: right.as_deref().map(|e| boxed(e, f)).transpose()?,
            loc: *loc,
        },
        RawExpr::Bool { op, args, loc } => RawExpr::Bool {
            op: *op,
            args: list(args, f)?,
            loc: *loc,
        },
        RawExpr::In {
            expr,
            list: items,
            negated,
            loc,
        } => RawExpr::In {
            expr: boxed(expr, f)?,
            list: list(items, f)?,
            negated: *negated,
            loc: *loc,
        },
        RawExpr::NullTest { arg, is_not, loc } => RawExpr::NullTest {
            arg: boxed(arg, f)?,
            is_not: *is_not,
            loc: *loc,
        },
        RawExpr::BoolTest { arg, kind, loc } => RawExpr::BoolTest {
            arg: boxed(arg, f)?,
            kind: *kind,
            loc: *loc,
        },
        RawExpr::DistinctFrom {
            left,
            right,
            negated,
            loc,
        } => RawExpr::DistinctFrom {
            left: boxed(left, f)?,
            right: boxed(right, f)?,
            negated: *negated,
            loc: *loc,
        },
        RawExpr::TypeCast {
            arg,
            type_name,
            loc,
        } => RawExpr::TypeCast {
            arg: boxed(arg, f)?,
            type_name: type_name.clone(),
            loc: *loc,
        },
        RawExpr::Collate {
            arg,
            collation,
            loc,
        } => RawExpr::Collate {
            arg: boxed(arg, f)?,
            collation: collation.clone(),
            loc: *loc,
        },
        RawExpr::FuncCall(func) => {
            let mut out = func.as_ref().clone();
            out.args = list(&func.args, f)?;
            for sort in &mut out.agg_order {
                sort.expr = map_expr(&sort.expr, f)?;
            }
            if let Some(filter) = &func.agg_filter {
                out.agg_filter = Some(boxed(filter, f)?);
            }
            if let Some(over) = &mut out.over {
                over.partition_by = list(&over.partition_by, f)?;
                for sort in &mut over.order_by {
                    sort.expr = map_expr(&sort.expr, f)?;
                }
            }
            RawExpr::FuncCall(Box::new(out))
        }
        RawExpr::SubLink {
            kind,
            test,
            subselect,
            loc,
        } => RawExpr::SubLink {
            kind: kind.clone(),
            test: test.as_deref().map(|e| boxed(e, f)).transpose()?,
            subselect: subselect.clone(),
            loc: *loc,
        },
        RawExpr::Case {
            arg,
            whens,
            default,
            loc,
        } => RawExpr::Case {
            arg: arg.as_deref().map(|e| boxed(e, f)).transpose()?,
            whens: whens
                .iter()
                .map(|(c, r)| Ok((map_expr(c, f)?, map_expr(r, f)?)))
                .collect::<Result<Vec<_>, E>>()?,
            default: default.as_deref().map(|e| boxed(e, f)).transpose()?,
            loc: *loc,
        },
        RawExpr::Coalesce(args, loc) => RawExpr::Coalesce(list(args, f)?, *loc),
        RawExpr::NullIf(left, right, loc) => RawExpr::NullIf(boxed(left, f)?, boxed(right, f)?, *loc),
        RawExpr::MinMax {
            greatest,
            args,
            loc,
        } => RawExpr::MinMax {
            greatest: *greatest,
            args: list(args, f)?,
            loc: *loc,
        },
        RawExpr::Row(args, loc) => RawExpr::Row(list(args, f)?, *loc),
        RawExpr::Array(args, loc) => RawExpr::Array(list(args, f)?, *loc),
        RawExpr::GroupingFunc(args, loc) => RawExpr::GroupingFunc(list(args, f)?, *loc),
        RawExpr::Indirection {
            arg,
            indirection,
            loc,
        } => {
            let mut mapped = Vec::with_capacity(indirection.len());
            for ind in indirection {
                mapped.push(match ind {
                    Indirection::Subscript {
                        lower,
                        upper,
                        is_slice,
                    } => Indirection::Subscript {
                        lower: lower.as_deref().map(|e| boxed(e, f)).transpose()?,
                        upper: upper.as_deref().map(|e| boxed(e, f)).transpose()?,
                        is_slice: *is_slice,
                    },
                    other => other.clone(),
                });
            }
            RawExpr::Indirection {
                arg: boxed(arg, f)?,
                indirection: mapped,
                loc: *loc,
            }
        }
    })
}

/// Split a condition into its top-level AND arms
pub fn conjuncts(expr: &RawExpr) -> Vec<&RawExpr> {
    match expr {
        RawExpr::Bool {
            op: BoolOp::And,
            args,
            ..
        } => args.iter().flat_map(conjuncts).collect(),
        other => vec![other],
    }
}

/// AND a list of conditions back together
pub fn and_all(mut exprs: Vec<RawExpr>) -> Option<RawExpr> {
    match exprs.len() {
        0 => None,
        1 => exprs.pop(),
        _ => Some(RawExpr::Bool {
            op: BoolOp::And,
            args: exprs,
            loc: Location::UNKNOWN,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Collect {
        relations: Vec<String>,
        columns: usize,
        depth: usize,
        max_depth: usize,
    }

    impl RawVisitor for Collect {
        fn visit_expr(&mut self, expr: &RawExpr) -> Walk {
            if matches!(expr, RawExpr::ColumnRef(_)) {
                self.columns += 1;
            }
            Walk::Continue
        }

        fn visit_range_var(&mut self, rv: &RangeVar) {
            self.relations.push(rv.name.clone());
        }

        fn enter_select(&mut self, _stmt: &SelectStmt) -> Walk {
            self.depth += 1;
            self.max_depth = self.max_depth.max(self.depth);
            Walk::Continue
        }

        fn leave_select(&mut self, _stmt: &SelectStmt) {
            self.depth -= 1;
        }
    }

    #[test]
    fn test_visitor_reaches_sublink_relations() {
        let inner = SelectStmt::simple(SimpleSelect {
            targets: vec![ResTarget::unnamed(RawExpr::column(&["b"]))],
            from: vec![FromItem::Relation(RangeVar::new("u"))],
            ..Default::default()
        });
        let outer = SelectStmt::simple(SimpleSelect {
            targets: vec![ResTarget::unnamed(RawExpr::column(&["a"]))],
            from: vec![FromItem::Relation(RangeVar::new("t"))],
            where_clause: Some(RawExpr::SubLink {
                kind: SubLinkKind::Exists,
                test: None,
                subselect: Box::new(inner),
                loc: Location::UNKNOWN,
            }),
            ..Default::default()
        });
        let mut v = Collect::default();
        walk_select(&mut v, &outer);
        assert_eq!(v.relations, vec!["t".to_string(), "u".to_string()]);
        assert_eq!(v.columns, 2);
        assert_eq!(v.max_depth, 2);
        assert_eq!(v.depth, 0);
    }

    #[test]
    fn test_map_expr_replaces_columns() {
        let expr = RawExpr::and(
            RawExpr::op("=", RawExpr::column(&["id"]), RawExpr::int(1)),
            RawExpr::op("=", RawExpr::column(&["pid"]), RawExpr::column(&["id"])),
        );
        let mapped = map_expr(&expr, &mut |e: &RawExpr| -> Result<_, ()> {
            Ok(match e {
                RawExpr::ColumnRef(c) => {
                    let name = c.dotted();
                    Some(RawExpr::column(&["t", name.as_str()]))
                }
                _ => None,
            })
        })
        .unwrap();
        let expected = RawExpr::and(
            RawExpr::op("=", RawExpr::column(&["t", "id"]), RawExpr::int(1)),
            RawExpr::op("=", RawExpr::column(&["t", "pid"]), RawExpr::column(&["t", "id"])),
        );
        assert_eq!(mapped, expected);
        // the input is untouched
        assert_eq!(conjuncts(&expr).len(), 2);
    }

    #[test]
    fn test_conjuncts_flatten_nested_ands() {
        let expr = RawExpr::and(
            RawExpr::and(RawExpr::boolean(true), RawExpr::int(1)),
            RawExpr::int(2),
        );
        assert_eq!(conjuncts(&expr).len(), 3);
        assert_eq!(and_all(vec![]), None);
        assert_eq!(and_all(vec![RawExpr::int(1)]), Some(RawExpr::int(1)));
    }
}
