//! Function, aggregate and window function calls

use tracing::trace;

use super::expr_kind::ExprKind;
use super::state::{error_at, Transformer};
use crate::catalog::{resolve_function, FuncLookupError, FunctionDef, FunctionKind};
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::query::walker::{walk_expr, Walk};
use crate::query::{AggKind, Aggref, CoercionForm, Expr, FuncExpr, SortExpr, WindowFunc};
use crate::syntax::{FuncCall, Location, NullsOrder, SortBy, SortDir, WindowDef};
use crate::types::{is_polymorphic, CoercionContext, Oid, UNKNOWN_OID};

fn sort_expr(sort: &SortBy, expr: Expr) -> SortExpr {
    let descending = sort.dir == SortDir::Desc;
    SortExpr {
        expr,
        descending,
        nulls_first: match sort.nulls {
            NullsOrder::First => true,
            NullsOrder::Last => false,
            NullsOrder::Default => descending,
        },
    }
}

fn wrong_object(message: String, loc: Location) -> Diagnostic {
    error_at(DiagnosticKind::WrongObjectType, message, loc)
}

fn not_implemented(message: &str, loc: Location) -> Diagnostic {
    error_at(DiagnosticKind::FeatureNotSupported, message, loc)
}

impl Transformer<'_> {
    pub(crate) fn transform_func_call(&mut self, func: &FuncCall) -> Result<Expr> {
        let name = func.func_name().to_string();
        if func.agg_within_group && func.agg_distinct {
            return Err(error_at(
                DiagnosticKind::SyntaxError,
                "cannot use DISTINCT with WITHIN GROUP",
                func.loc,
            ));
        }

        let args = self.transform_list(&func.args)?;
        // WITHIN GROUP ordering columns are the aggregated arguments
        let mut ordered = Vec::new();
        if func.agg_within_group {
            for sort in &func.agg_order {
                ordered.push(self.transform_expr(&sort.expr)?);
            }
        }
        let actual: Vec<Oid> = args.iter().chain(ordered.iter()).map(Expr::type_oid).collect();

        let def = self.lookup_function(func, &name, &actual)?;
        trace!(function = %name, oid = def.oid, "resolved function");
        self.check_call_decorations(func, &def)?;

        let result_type = def.result_type(self.catalog, &actual);
        if func.over.is_some() {
            return self.make_window_func(func, &def, args, result_type);
        }
        if def.is_aggregate() {
            return self.make_aggregate(func, &def, args, ordered, result_type);
        }

        if def.returns_set {
            let kind = self.pstate().expr_kind;
            if let Some(message) = kind.srf_error() {
                return Err(not_implemented(&message, func.loc));
            }
            if kind.srf_in_target() {
                self.pstate_mut().has_target_srfs = true;
            }
        }
        let args = self.coerce_call_args(args, &def, 0);
        Ok(Expr::Func(Box::new(FuncExpr {
            funcid: def.oid,
            name,
            result_type,
            result_collid: self.type_collation(result_type),
            args,
            returns_set: def.returns_set,
            variadic: func.variadic,
            format: CoercionForm::ExplicitCall,
            location: func.loc,
        })))
    }

    fn lookup_function(&self, func: &FuncCall, name: &str, actual: &[Oid]) -> Result<FunctionDef> {
        let lookup = if func.arg_names.iter().any(Option::is_some) {
            Err(FuncLookupError::NotFound)
        } else {
            resolve_function(self.catalog, self.coercion, name, actual, func.agg_within_group)
        };
        let err = match lookup {
            Ok(def) => return Ok(def.clone()),
            Err(err) => err,
        };

        let candidates = self.catalog.lookup_functions(name);
        let is_ordered = |f: &&FunctionDef| matches!(f.kind, FunctionKind::OrderedSet | FunctionKind::Hypothetical);
        if func.agg_within_group && !candidates.is_empty() && !candidates.iter().any(is_ordered) {
            let message = if candidates.iter().any(|f| f.is_aggregate()) {
                format!("{} is not an ordered-set aggregate, so it cannot have WITHIN GROUP", name)
            } else {
                format!("WITHIN GROUP specified, but {} is not an aggregate function", name)
            };
            return Err(wrong_object(message, func.loc));
        }
        if !func.agg_within_group && !candidates.is_empty() && candidates.iter().all(is_ordered) {
            return Err(wrong_object(
                format!("WITHIN GROUP is required for ordered-set aggregate {}", name),
                func.loc,
            ));
        }

        let signature = if func.agg_star {
            format!("{}(*)", name)
        } else {
            let types: Vec<String> = actual.iter().map(|t| self.type_name(*t, -1)).collect();
            format!("{}({})", name, types.join(", "))
        };
        Err(match err {
            FuncLookupError::NotFound => error_at(
                DiagnosticKind::UndefinedFunction,
                format!("function {} does not exist", signature),
                func.loc,
            )
            .with_help("No function matches the given name and argument types. You might need to add explicit type casts."),
            FuncLookupError::NotUnique => error_at(
                DiagnosticKind::UndefinedFunction,
                format!("function {} is not unique", signature),
                func.loc,
            )
            .with_help("Could not choose a best candidate function. You might need to add explicit type casts."),
        })
    }

    /// Reject aggregate-only and window-only decorations on functions that
    /// are not of that kind
    fn check_call_decorations(&self, func: &FuncCall, def: &FunctionDef) -> Result<()> {
        let name = def.name.as_str();
        let is_window = def.kind == FunctionKind::Window;
        if !def.is_aggregate() {
            let decoration = if func.agg_star {
                Some(format!("{}(*)", name))
            } else if func.agg_distinct {
                Some("DISTINCT".to_string())
            } else if !func.agg_order.is_empty() {
                Some("ORDER BY".to_string())
            } else if func.agg_filter.is_some() && !is_window {
                Some("FILTER".to_string())
            } else {
                None
            };
            if let Some(decoration) = decoration {
                return Err(wrong_object(
                    format!("{} specified, but {} is not an aggregate function", decoration, name),
                    func.loc,
                ));
            }
        }
        if is_window && func.over.is_none() {
            return Err(wrong_object(
                format!("window function {} requires an OVER clause", name),
                func.loc,
            ));
        }
        if func.over.is_some() && !is_window && !def.is_aggregate() {
            return Err(wrong_object(
                format!(
                    "OVER specified, but {} is not a window function nor an aggregate function",
                    name
                ),
                func.loc,
            ));
        }
        Ok(())
    }

    /// Coerce call arguments to the declared parameter types; `offset` is
    /// the parameter position of the first argument
    fn coerce_call_args(&self, args: Vec<Expr>, def: &FunctionDef, offset: usize) -> Vec<Expr> {
        args.into_iter()
            .enumerate()
            .map(|(i, arg)| {
                let param = def.args.get(i + offset).copied().or(def.variadic);
                match param {
                    Some(param) if !is_polymorphic(param) && param != arg.type_oid() => self
                        .coercion
                        .coerce(self.catalog, arg.clone(), param, -1, CoercionContext::Implicit)
                        .unwrap_or(arg),
                    _ if arg.type_oid() == UNKNOWN_OID => self.resolve_unknown(arg),
                    _ => arg,
                }
            })
            .collect()
    }

    fn transform_agg_filter(&mut self, func: &FuncCall) -> Result<Option<Expr>> {
        let Some(filter) = func.agg_filter.as_deref() else {
            return Ok(None);
        };
        let expr = self.with_expr_kind(ExprKind::Filter, |t| t.transform_expr(filter))?;
        self.coerce_to_boolean(expr, "FILTER").map(Some)
    }

    fn make_aggregate(
        &mut self,
        func: &FuncCall,
        def: &FunctionDef,
        args: Vec<Expr>,
        ordered: Vec<Expr>,
        result_type: Oid,
    ) -> Result<Expr> {
        let kind = match def.kind {
            FunctionKind::OrderedSet => AggKind::OrderedSet,
            FunctionKind::Hypothetical => AggKind::Hypothetical,
            _ => AggKind::Normal,
        };
        let (direct_args, args, order_by) = if kind == AggKind::Normal {
            let args = self.coerce_call_args(args, def, 0);
            let mut order_by = Vec::with_capacity(func.agg_order.len());
            for sort in &func.agg_order {
                let expr = self.transform_expr(&sort.expr)?;
                if func.agg_distinct && !args.iter().any(|a| a.strip_implicit() == expr.strip_implicit()) {
                    return Err(error_at(
                        DiagnosticKind::InvalidColumnReference,
                        "in an aggregate with DISTINCT, ORDER BY expressions must appear in argument list",
                        sort.expr.location(),
                    ));
                }
                order_by.push(sort_expr(sort, expr));
            }
            (Vec::new(), args, order_by)
        } else {
            let direct_count = args.len();
            let direct = self.coerce_call_args(args, def, 0);
            let aggregated = self.coerce_call_args(ordered, def, direct_count);
            let order_by = func
                .agg_order
                .iter()
                .zip(aggregated.iter())
                .map(|(sort, expr)| sort_expr(sort, expr.clone()))
                .collect();
            (direct, aggregated, order_by)
        };
        let filter = self.transform_agg_filter(func)?;

        let mut aggref = Aggref {
            aggfnoid: def.oid,
            aggname: def.name.clone(),
            aggtype: result_type,
            aggcollid: self.type_collation(result_type),
            direct_args,
            args,
            order_by,
            distinct: func.agg_distinct,
            filter,
            star: func.agg_star,
            variadic: func.variadic,
            kind,
            agglevelsup: 0,
            location: func.loc,
        };
        let scanned: Vec<&Expr> = aggref
            .args
            .iter()
            .chain(aggref.order_by.iter().map(|s| &s.expr))
            .chain(aggref.filter.iter())
            .collect();
        let level = self.check_agg_level(&aggref.direct_args, &scanned, true, func.loc)?;
        aggref.agglevelsup = level;
        Ok(Expr::Aggref(Box::new(aggref)))
    }

    fn make_window_func(
        &mut self,
        func: &FuncCall,
        def: &FunctionDef,
        args: Vec<Expr>,
        result_type: Oid,
    ) -> Result<Expr> {
        let name = def.name.as_str();
        if func.agg_distinct {
            return Err(not_implemented("DISTINCT is not implemented for window functions", func.loc));
        }
        if !func.agg_order.is_empty() && !func.agg_within_group {
            return Err(not_implemented(
                "aggregate ORDER BY is not implemented for window functions",
                func.loc,
            ));
        }
        if matches!(def.kind, FunctionKind::OrderedSet | FunctionKind::Hypothetical) {
            return Err(wrong_object(
                format!("OVER is not supported for ordered-set aggregate {}", name),
                func.loc,
            ));
        }
        if def.kind == FunctionKind::Window && func.agg_filter.is_some() {
            return Err(not_implemented(
                "FILTER is not implemented for non-aggregate window functions",
                func.loc,
            ));
        }
        for arg in &args {
            walk_expr(arg, 0, &mut |e, sub| match e {
                Expr::WindowFunc(w) if sub == 0 => Err(error_at(
                    DiagnosticKind::WindowingError,
                    "window function calls cannot be nested",
                    w.location,
                )),
                _ => Ok(Walk::Continue),
            })?;
        }
        if let Some(message) = self.pstate().expr_kind.window_error() {
            return Err(error_at(DiagnosticKind::WindowingError, message, func.loc));
        }

        let filter = self.transform_agg_filter(func)?;
        let winref = match func.over.as_deref() {
            Some(over) => self.window_ref(over)?,
            None => 0,
        };
        self.pstate_mut().has_window_funcs = true;
        let args = self.coerce_call_args(args, def, 0);
        Ok(Expr::WindowFunc(Box::new(WindowFunc {
            winfnoid: def.oid,
            name: name.to_string(),
            wintype: result_type,
            wincollid: self.type_collation(result_type),
            args,
            filter,
            winref,
            star: func.agg_star,
            is_agg: def.is_aggregate(),
            location: func.loc,
        })))
    }

    /// The 1-based window reference of an OVER clause, registering an inline
    /// specification unless an identical one already exists
    fn window_ref(&mut self, over: &WindowDef) -> Result<usize> {
        let defs = &self.pstate().windowdefs;
        if let Some(name) = &over.name {
            return defs
                .iter()
                .position(|d| d.name.as_deref() == Some(name.as_str()))
                .map(|i| i + 1)
                .ok_or_else(|| {
                    error_at(
                        DiagnosticKind::UndefinedObject,
                        format!("window \"{}\" does not exist", name),
                        over.loc,
                    )
                });
        }
        if let Some(i) = defs.iter().position(|d| d.name.is_none() && d == over) {
            return Ok(i + 1);
        }
        let defs = &mut self.pstate_mut().windowdefs;
        defs.push(over.clone());
        Ok(defs.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::analyzer::testing::{analyze, analyze_err};
    use crate::query::{AggKind, Expr};
    use crate::types::{FLOAT8_OID, INT8_OID, NUMERIC_OID};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_aggregate_call() {
        let query = analyze("SELECT count(*), sum(amount) FILTER (WHERE code > 0) FROM t");
        assert!(query.has_aggs);
        let Expr::Aggref(count) = &query.target_list[0].expr else {
            panic!("expected an aggregate");
        };
        assert!(count.star);
        assert_eq!(count.aggtype, INT8_OID);
        let Expr::Aggref(sum) = &query.target_list[1].expr else {
            panic!("expected an aggregate");
        };
        assert_eq!(sum.aggtype, NUMERIC_OID);
        assert!(sum.filter.is_some());
    }

    #[test]
    fn test_ordered_set_aggregate() {
        let query = analyze("SELECT percentile_cont(0.5) WITHIN GROUP (ORDER BY amount) FROM t");
        let Expr::Aggref(agg) = &query.target_list[0].expr else {
            panic!("expected an aggregate");
        };
        assert_eq!(agg.kind, AggKind::OrderedSet);
        assert_eq!(agg.direct_args.len(), 1);
        assert_eq!(agg.args.len(), 1);
        assert_eq!(agg.aggtype, FLOAT8_OID);

        let err = analyze_err("SELECT percentile_cont(0.5) FROM t");
        assert_eq!(err.message, "WITHIN GROUP is required for ordered-set aggregate percentile_cont");
        let err = analyze_err("SELECT sum(id) WITHIN GROUP (ORDER BY id) FROM t");
        assert_eq!(err.message, "sum is not an ordered-set aggregate, so it cannot have WITHIN GROUP");
    }

    #[test]
    fn test_call_decoration_errors() {
        let err = analyze_err("SELECT lower(DISTINCT name) FROM t");
        assert_eq!(err.message, "DISTINCT specified, but lower is not an aggregate function");
        let err = analyze_err("SELECT lower(name) OVER () FROM t");
        assert_eq!(
            err.message,
            "OVER specified, but lower is not a window function nor an aggregate function"
        );
        let err = analyze_err("SELECT row_number() FROM t");
        assert_eq!(err.message, "window function row_number requires an OVER clause");
        let err = analyze_err("SELECT no_such_fn(id) FROM t");
        assert_eq!(err.message, "function no_such_fn(integer) does not exist");
    }

    #[test]
    fn test_window_calls() {
        let query = analyze("SELECT row_number() OVER (ORDER BY id), sum(amount) OVER (ORDER BY id) FROM t");
        assert!(query.has_window_funcs);
        assert!(!query.has_aggs);
        // identical inline specifications share a window clause
        assert_eq!(query.window_clause.len(), 1);
        let Expr::WindowFunc(sum) = &query.target_list[1].expr else {
            panic!("expected a window function");
        };
        assert!(sum.is_agg);
        assert_eq!(sum.winref, 1);

        let err = analyze_err("SELECT rank() OVER w FROM t");
        assert_eq!(err.message, "window \"w\" does not exist");
        let err = analyze_err("SELECT count(DISTINCT id) OVER () FROM t");
        assert_eq!(err.message, "DISTINCT is not implemented for window functions");
        let err = analyze_err("SELECT id FROM t WHERE row_number() OVER () > 1");
        assert_eq!(err.message, "window functions are not allowed in WHERE");
    }

    #[test]
    fn test_set_returning_function_placement() {
        let query = analyze("SELECT generate_series(1, id) FROM t");
        assert!(query.has_target_srfs);
        let err = analyze_err("SELECT id FROM t WHERE generate_series(1, id) > 1");
        assert_eq!(err.message, "set-returning functions are not allowed in WHERE");
    }

    #[test]
    fn test_distinct_aggregate_order_by_must_be_argument() {
        analyze("SELECT string_agg(DISTINCT name, ',' ORDER BY name) FROM t");
        let err = analyze_err("SELECT string_agg(DISTINCT name, ',' ORDER BY id) FROM t");
        assert_eq!(
            err.message,
            "in an aggregate with DISTINCT, ORDER BY expressions must appear in argument list"
        );
    }
}
