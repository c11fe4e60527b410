//! Expression transformation
//!
//! Turns a raw expression tree into a typed [`Expr`]. Column references are
//! bound through the scope stack, operators and functions are resolved
//! against the catalog, and every implicit conversion the result relies on
//! is made explicit as a coercion node.

use tracing::trace;

use super::state::{error_at, ParseState, Transformer};
use crate::catalog::resolve_operator;
use crate::error::{DiagnosticKind, Result};
use crate::query::{
    CaseExpr, CaseWhen, Const, Datum, Expr, OpExpr, SubLink, SubLinkType, SubscriptingRef,
};
use crate::syntax::{BoolOp, ColumnRef, Indirection, Literal, Location, RawExpr, SelectStmt, SubLinkKind};
use crate::types::{
    CoercionContext, Oid, BOOL_OID, C_COLLATION_OID, DEFAULT_COLLATION_OID, INT4_OID, INT8_OID,
    NUMERIC_OID, POSIX_COLLATION_OID, RECORD_OID, TEXT_OID, UNDEFINED_OID, UNKNOWN_OID,
};

impl Transformer<'_> {
    /// Transform one raw expression in the current expression kind
    pub(crate) fn transform_expr(&mut self, raw: &RawExpr) -> Result<Expr> {
        self.guarded(|t| t.transform_expr_inner(raw))
    }

    fn transform_expr_inner(&mut self, raw: &RawExpr) -> Result<Expr> {
        match raw {
            RawExpr::ColumnRef(cref) => self.transform_column_ref(cref),
            RawExpr::Const(lit, loc) => Ok(Expr::Const(make_const(lit, *loc))),
            RawExpr::Param(id, loc) => Ok(Expr::Param {
                id: *id,
                paramtype: UNKNOWN_OID,
                location: *loc,
            }),
            RawExpr::Op {
                name,
                left,
                right,
                loc,
            } => {
                let left = left.as_deref().map(|l| self.transform_expr(l)).transpose()?;
                let Some(right) = right else {
                    return Err(error_at(
                        DiagnosticKind::FeatureNotSupported,
                        format!("postfix operator {} is not supported", name),
                        *loc,
                    ));
                };
                let right = self.transform_expr(right)?;
                self.make_op(name, left, right, *loc)
            }
            RawExpr::Bool { op, args, loc } => {
                let construct = match op {
                    BoolOp::And => "AND",
                    BoolOp::Or => "OR",
                    BoolOp::Not => "NOT",
                };
                let mut out = Vec::with_capacity(args.len());
                for arg in args {
                    let expr = self.transform_expr(arg)?;
                    out.push(self.coerce_to_boolean(expr, construct)?);
                }
                Ok(Expr::Bool {
                    op: *op,
                    args: out,
                    location: *loc,
                })
            }
            RawExpr::In {
                expr,
                list,
                negated,
                loc,
            } => self.transform_in_list(expr, list, *negated, *loc),
            RawExpr::NullTest { arg, is_not, loc } => {
                let arg = self.transform_expr(arg)?;
                Ok(Expr::NullTest {
                    arg: Box::new(arg),
                    is_not: *is_not,
                    location: *loc,
                })
            }
            RawExpr::BoolTest { arg, kind, loc } => {
                use crate::syntax::BoolTestKind::*;
                let construct = match kind {
                    IsTrue => "IS TRUE",
                    IsNotTrue => "IS NOT TRUE",
                    IsFalse => "IS FALSE",
                    IsNotFalse => "IS NOT FALSE",
                    IsUnknown => "IS UNKNOWN",
                    IsNotUnknown => "IS NOT UNKNOWN",
                };
                let arg = self.transform_expr(arg)?;
                let arg = self.coerce_to_boolean(arg, construct)?;
                Ok(Expr::BooleanTest {
                    arg: Box::new(arg),
                    kind: *kind,
                    location: *loc,
                })
            }
            RawExpr::DistinctFrom {
                left,
                right,
                negated,
                loc,
            } => {
                let left = self.transform_expr(left)?;
                let right = self.transform_expr(right)?;
                // resolved as equality, then recast
                let op = self.build_op("=", Some(left), right, *loc)?;
                Ok(Expr::Distinct {
                    args: op.args,
                    negated: *negated,
                    location: *loc,
                })
            }
            RawExpr::TypeCast {
                arg,
                type_name,
                loc,
            } => {
                let target = self.resolve_type_name(type_name)?;
                let arg = match arg.as_ref() {
                    // ARRAY[]::t[] takes its type from the cast
                    RawExpr::Array(elements, aloc) if elements.is_empty() => {
                        let element_type = self
                            .catalog
                            .type_by_oid(target.oid)
                            .and_then(|t| t.elem)
                            .unwrap_or(UNKNOWN_OID);
                        Expr::Array {
                            array_type: target.oid,
                            element_type,
                            elements: Vec::new(),
                            location: *aloc,
                        }
                    }
                    other => self.transform_expr(other)?,
                };
                self.coerce_or_error(arg, target.oid, target.typmod, CoercionContext::Explicit, *loc)
            }
            RawExpr::Collate {
                arg,
                collation,
                loc,
            } => self.transform_collate(arg, collation, *loc),
            RawExpr::FuncCall(func) => self.transform_func_call(func),
            RawExpr::SubLink {
                kind,
                test,
                subselect,
                loc,
            } => self.transform_sublink(kind, test.as_deref(), subselect, *loc),
            RawExpr::Case {
                arg,
                whens,
                default,
                loc,
            } => self.transform_case(arg.as_deref(), whens, default.as_deref(), *loc),
            RawExpr::Coalesce(args, loc) => {
                let args = self.transform_list(args)?;
                let (type_oid, args) = self.coerce_to_common(args, "COALESCE", *loc)?;
                Ok(Expr::Coalesce {
                    type_oid,
                    collid: self.type_collation(type_oid),
                    args,
                    location: *loc,
                })
            }
            RawExpr::NullIf(left, right, loc) => {
                let left = self.transform_expr(left)?;
                let right = self.transform_expr(right)?;
                let op = self.build_op("=", Some(left), right, *loc)?;
                let type_oid = op.args.first().map_or(UNKNOWN_OID, Expr::type_oid);
                Ok(Expr::NullIf {
                    type_oid,
                    args: op.args,
                    location: *loc,
                })
            }
            RawExpr::MinMax {
                greatest,
                args,
                loc,
            } => {
                let construct = if *greatest { "GREATEST" } else { "LEAST" };
                let args = self.transform_list(args)?;
                let (type_oid, args) = self.coerce_to_common(args, construct, *loc)?;
                Ok(Expr::MinMax {
                    greatest: *greatest,
                    type_oid,
                    collid: self.type_collation(type_oid),
                    args,
                    location: *loc,
                })
            }
            RawExpr::Row(args, loc) => {
                let mut out = Vec::with_capacity(args.len());
                for arg in args {
                    match arg {
                        RawExpr::ColumnRef(cref) if cref.is_star() => {
                            out.extend(self.expand_column_star(cref)?.into_iter().map(|(_, e)| e));
                        }
                        other => out.push(self.transform_expr(other)?),
                    }
                }
                let colnames = (1..=out.len()).map(|i| format!("f{}", i)).collect();
                Ok(Expr::Row {
                    args: out,
                    row_type: RECORD_OID,
                    colnames,
                    location: *loc,
                })
            }
            RawExpr::Array(elements, loc) => self.transform_array(elements, *loc),
            RawExpr::Indirection {
                arg,
                indirection,
                loc,
            } => {
                let base = self.transform_expr(arg)?;
                self.transform_indirection(base, indirection, *loc)
            }
            RawExpr::Rownum(loc) => Ok(Expr::Rownum(*loc)),
            RawExpr::GroupingFunc(args, loc) => self.transform_grouping_func(args, *loc),
            // INSERT and UPDATE handle a top-level DEFAULT before getting here
            RawExpr::SetToDefault(loc) => Err(error_at(
                DiagnosticKind::SyntaxError,
                "DEFAULT is not allowed in this context",
                *loc,
            )),
        }
    }

    pub(crate) fn transform_list(&mut self, raws: &[RawExpr]) -> Result<Vec<Expr>> {
        raws.iter().map(|r| self.transform_expr(r)).collect()
    }

    /// Build an operator node, coercing the operands to the types the
    /// resolved operator takes
    pub(crate) fn make_op(
        &mut self,
        name: &str,
        left: Option<Expr>,
        right: Expr,
        loc: Location,
    ) -> Result<Expr> {
        Ok(Expr::Op(Box::new(self.build_op(name, left, right, loc)?)))
    }

    fn build_op(&mut self, name: &str, left: Option<Expr>, right: Expr, loc: Location) -> Result<OpExpr> {
        let name = if name == "!=" { "<>" } else { name };
        let resolved = resolve_operator(
            self.catalog,
            self.coercion,
            name,
            left.as_ref().map(Expr::type_oid),
            right.type_oid(),
        )
        .map_err(|message| {
            let help = if message.starts_with("operator is not unique") {
                "Could not choose a best candidate operator. You might need to add explicit type casts."
            } else {
                "No operator matches the given name and argument types. You might need to add explicit type casts."
            };
            error_at(DiagnosticKind::UndefinedFunction, message, loc).with_help(help)
        })?;
        trace!(op = name, result = resolved.result_type, "resolved operator");

        let mut args = Vec::with_capacity(2);
        if let Some(left) = left {
            args.push(self.coerce_operand(left, resolved.left_type));
        }
        args.push(self.coerce_operand(right, resolved.right_type));
        Ok(OpExpr {
            name: name.to_string(),
            result_type: resolved.result_type,
            result_collid: self.type_collation(resolved.result_type),
            args,
            location: loc,
        })
    }

    fn coerce_operand(&self, expr: Expr, target: Option<Oid>) -> Expr {
        let Some(target) = target.filter(|t| *t != expr.type_oid()) else {
            return expr;
        };
        match self
            .coercion
            .coerce(self.catalog, expr.clone(), target, -1, CoercionContext::Implicit)
        {
            Some(coerced) => coerced,
            None => expr,
        }
    }

    /// Coerce a condition to boolean, naming `construct` on failure
    pub(crate) fn coerce_to_boolean(&self, expr: Expr, construct: &str) -> Result<Expr> {
        let loc = expr.location();
        let source = expr.type_oid();
        if source == BOOL_OID || source == UNDEFINED_OID {
            return Ok(expr);
        }
        if expr.returns_set() {
            return Err(error_at(
                DiagnosticKind::TypeMismatch,
                format!("argument of {} must not return a set", construct),
                loc,
            ));
        }
        self.coercion
            .coerce(self.catalog, expr, BOOL_OID, -1, CoercionContext::Assignment)
            .ok_or_else(|| {
                error_at(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "argument of {} must be type boolean, not type {}",
                        construct,
                        self.type_name(source, -1)
                    ),
                    loc,
                )
            })
    }

    /// Unknown-type literals become text; anything else is returned as is
    pub(crate) fn resolve_unknown(&self, expr: Expr) -> Expr {
        if expr.type_oid() != UNKNOWN_OID {
            return expr;
        }
        match self
            .coercion
            .coerce(self.catalog, expr.clone(), TEXT_OID, -1, CoercionContext::Implicit)
        {
            Some(text) => text,
            None => expr,
        }
    }

    /// Common type of the branches of `construct` (CASE, COALESCE, UNION, ...).
    /// Unknown literals do not vote; all-unknown resolves to text.
    pub(crate) fn select_common_type(&self, types: &[(Oid, Location)], construct: &str) -> Result<Oid> {
        let mut common: Option<Oid> = None;
        for &(next, loc) in types {
            if next == UNKNOWN_OID {
                continue;
            }
            common = match common {
                None => Some(next),
                Some(prev) => match self.coercion.common_type(self.catalog, &[prev, next]) {
                    Some(t) => Some(t),
                    None => {
                        return Err(error_at(
                            DiagnosticKind::TypeMismatch,
                            format!(
                                "{} types {} and {} cannot be matched",
                                construct,
                                self.type_name(prev, -1),
                                self.type_name(next, -1)
                            ),
                            loc,
                        ))
                    }
                },
            };
        }
        Ok(common.unwrap_or(TEXT_OID))
    }

    /// The typmod shared by every input of type `common`, else -1
    pub(crate) fn select_common_typmod(types: &[(Oid, i32)], common: Oid) -> i32 {
        let mut typmods = types.iter().map(|&(oid, typmod)| if oid == common { typmod } else { -1 });
        match typmods.next() {
            Some(first) if typmods.all(|t| t == first) => first,
            _ => -1,
        }
    }

    /// Coerce branch values to their common type
    fn coerce_to_common(&self, args: Vec<Expr>, construct: &str, loc: Location) -> Result<(Oid, Vec<Expr>)> {
        let types: Vec<_> = args.iter().map(|e| (e.type_oid(), e.location())).collect();
        let common = self.select_common_type(&types, construct)?;
        let mut out = Vec::with_capacity(args.len());
        for arg in args {
            out.push(self.coerce_to_common_type(arg, common, construct, loc)?);
        }
        Ok((common, out))
    }

    pub(crate) fn coerce_to_common_type(
        &self,
        expr: Expr,
        common: Oid,
        construct: &str,
        loc: Location,
    ) -> Result<Expr> {
        let source = expr.type_oid();
        self.coercion
            .coerce(self.catalog, expr, common, -1, CoercionContext::Implicit)
            .ok_or_else(|| {
                error_at(
                    DiagnosticKind::CannotCoerce,
                    format!(
                        "{} could not convert type {} to {}",
                        construct,
                        self.type_name(source, -1),
                        self.type_name(common, -1)
                    ),
                    loc,
                )
            })
    }

    /// `x IN (a, b)` is `x = a OR x = b`; `NOT IN` is `x <> a AND x <> b`
    fn transform_in_list(&mut self, expr: &RawExpr, list: &[RawExpr], negated: bool, loc: Location) -> Result<Expr> {
        let left = self.transform_expr(expr)?;
        let (op, combine) = if negated {
            ("<>", BoolOp::And)
        } else {
            ("=", BoolOp::Or)
        };
        let mut arms = Vec::with_capacity(list.len());
        for item in list {
            let right = self.transform_expr(item)?;
            arms.push(self.make_op(op, Some(left.clone()), right, loc)?);
        }
        if arms.len() == 1 {
            return Ok(arms.remove(0));
        }
        Ok(Expr::Bool {
            op: combine,
            args: arms,
            location: loc,
        })
    }

    fn transform_collate(&mut self, arg: &RawExpr, collation: &[String], loc: Location) -> Result<Expr> {
        let arg = self.transform_expr(arg)?;
        let arg = self.resolve_unknown(arg);
        let name = collation.last().map(String::as_str).unwrap_or_default();
        let collid = match name {
            "default" => DEFAULT_COLLATION_OID,
            "C" | "ucs_basic" => C_COLLATION_OID,
            "POSIX" => POSIX_COLLATION_OID,
            _ => {
                return Err(error_at(
                    DiagnosticKind::UndefinedObject,
                    format!("collation \"{}\" for encoding \"UTF8\" does not exist", collation.join(".")),
                    loc,
                ))
            }
        };
        let collatable = self
            .catalog
            .type_by_oid(arg.type_oid())
            .is_some_and(|t| t.collatable);
        if !collatable && arg.type_oid() != UNDEFINED_OID {
            return Err(error_at(
                DiagnosticKind::TypeMismatch,
                format!(
                    "collations are not supported by type {}",
                    self.type_name(arg.type_oid(), -1)
                ),
                loc,
            ));
        }
        Ok(Expr::Collate {
            arg: Box::new(arg),
            collid,
            location: loc,
        })
    }

    fn transform_sublink(
        &mut self,
        kind: &SubLinkKind,
        test: Option<&RawExpr>,
        subselect: &SelectStmt,
        loc: Location,
    ) -> Result<Expr> {
        if let Some(message) = self.pstate().expr_kind.sublink_error() {
            return Err(error_at(DiagnosticKind::FeatureNotSupported, message, loc));
        }
        self.pstate_mut().has_sublinks = true;
        let (query, _) = self.with_scope(ParseState::default(), |t| t.transform_select_stmt(subselect))?;
        let columns: Vec<(Oid, i32)> = query
            .visible_targets()
            .map(|te| (te.expr.type_oid(), te.expr.typmod()))
            .collect();

        let single_column = |what: &str| -> Result<Oid> {
            match columns.as_slice() {
                [(oid, _)] => Ok(*oid),
                _ => Err(error_at(
                    DiagnosticKind::SyntaxError,
                    format!("{} must return only one column", what),
                    loc,
                )),
            }
        };

        let (kind, testexpr, operator, result_type) = match kind {
            SubLinkKind::Exists => (SubLinkType::Exists, None, None, BOOL_OID),
            SubLinkKind::Expr => (SubLinkType::Expr, None, None, single_column("subquery")?),
            SubLinkKind::Array => {
                let elem = single_column("subquery")?;
                let array = self
                    .catalog
                    .type_by_oid(elem)
                    .and_then(|t| t.array)
                    .ok_or_else(|| {
                        error_at(
                            DiagnosticKind::UndefinedObject,
                            format!("could not find array type for data type {}", self.type_name(elem, -1)),
                            loc,
                        )
                    })?;
                (SubLinkType::Array, None, None, array)
            }
            SubLinkKind::Any(op) | SubLinkKind::All(op) => {
                let sublink_type = if matches!(kind, SubLinkKind::Any(_)) {
                    SubLinkType::Any
                } else {
                    SubLinkType::All
                };
                let test = test.ok_or_else(|| {
                    error_at(DiagnosticKind::SyntaxError, "ANY/ALL requires a test expression", loc)
                })?;
                let lefts = match test {
                    RawExpr::Row(args, _) => self.transform_list(args)?,
                    other => vec![self.transform_expr(other)?],
                };
                if lefts.len() < columns.len() {
                    return Err(error_at(DiagnosticKind::SyntaxError, "subquery has too many columns", loc));
                }
                if lefts.len() > columns.len() {
                    return Err(error_at(DiagnosticKind::SyntaxError, "subquery has too few columns", loc));
                }
                // the subquery's output columns appear as positional params
                let mut comparisons = Vec::with_capacity(lefts.len());
                for (i, (left, &(coltype, _))) in lefts.into_iter().zip(&columns).enumerate() {
                    let right = Expr::Param {
                        id: i as u32 + 1,
                        paramtype: coltype,
                        location: loc,
                    };
                    let cmp = self.make_op(op, Some(left), right, loc)?;
                    if cmp.type_oid() != BOOL_OID && cmp.type_oid() != UNDEFINED_OID {
                        return Err(error_at(
                            DiagnosticKind::TypeMismatch,
                            format!(
                                "operator {} must return type boolean, not type {}",
                                op,
                                self.type_name(cmp.type_oid(), -1)
                            ),
                            loc,
                        ));
                    }
                    comparisons.push(cmp);
                }
                (sublink_type, Expr::and(comparisons), Some(op.clone()), BOOL_OID)
            }
        };
        Ok(Expr::SubLink(Box::new(SubLink {
            kind,
            testexpr,
            operator,
            subselect: Box::new(query),
            result_type,
            location: loc,
        })))
    }

    fn transform_case(
        &mut self,
        arg: Option<&RawExpr>,
        whens: &[(RawExpr, RawExpr)],
        default: Option<&RawExpr>,
        loc: Location,
    ) -> Result<Expr> {
        let arg = match arg {
            Some(raw) => {
                let expr = self.transform_expr(raw)?;
                Some(self.resolve_unknown(expr))
            }
            None => None,
        };
        let placeholder = arg.as_ref().map(|a| Expr::CaseTest {
            type_oid: a.type_oid(),
            typmod: a.typmod(),
            collid: a.collation(),
        });

        let mut conds = Vec::with_capacity(whens.len());
        let mut results = Vec::with_capacity(whens.len() + 1);
        for (when, then) in whens {
            let when = self.transform_expr(when)?;
            let cond = match &placeholder {
                Some(test) => self.make_op("=", Some(test.clone()), when, loc)?,
                None => self.coerce_to_boolean(when, "CASE/WHEN")?,
            };
            conds.push(cond);
            results.push(self.transform_expr(then)?);
        }
        let default = match default {
            Some(raw) => Some(self.transform_expr(raw)?),
            None => None,
        };
        if let Some(d) = &default {
            results.push(d.clone());
        }

        let types: Vec<_> = results.iter().map(|e| (e.type_oid(), e.location())).collect();
        let casetype = self.select_common_type(&types, "CASE")?;
        let default = match default {
            Some(d) => self.coerce_to_common_type(d, casetype, "CASE", loc)?,
            None => Expr::Const(Const::null(casetype, -1, self.type_collation(casetype))),
        };
        let mut case_whens = Vec::with_capacity(conds.len());
        for (cond, result) in conds.into_iter().zip(results) {
            case_whens.push(CaseWhen {
                cond,
                result: self.coerce_to_common_type(result, casetype, "CASE", loc)?,
            });
        }
        Ok(Expr::Case(Box::new(CaseExpr {
            casetype,
            casecollid: self.type_collation(casetype),
            arg,
            whens: case_whens,
            default: Some(default),
            location: loc,
        })))
    }

    fn transform_array(&mut self, elements: &[RawExpr], loc: Location) -> Result<Expr> {
        if elements.is_empty() {
            return Err(error_at(
                DiagnosticKind::UndefinedObject,
                "cannot determine type of empty array",
                loc,
            )
            .with_help("Explicitly cast to the desired type, for example ARRAY[]::integer[]."));
        }
        let nested = elements.iter().all(|e| matches!(e, RawExpr::Array(..)));
        let elems = self.transform_list(elements)?;
        let (common, elems) = self.coerce_to_common(elems, "ARRAY", loc)?;

        // ARRAY[[1,2],[3,4]] is a two-dimensional array of the inner type
        let (array_type, element_type) = match self.catalog.type_by_oid(common) {
            Some(ty) if nested && ty.is_array() => (common, ty.elem.unwrap_or(UNKNOWN_OID)),
            Some(ty) => match ty.array {
                Some(array) => (array, common),
                None => {
                    return Err(error_at(
                        DiagnosticKind::UndefinedObject,
                        format!("could not find array type for data type {}", self.type_name(common, -1)),
                        loc,
                    ))
                }
            },
            None if common == UNDEFINED_OID => (UNDEFINED_OID, UNDEFINED_OID),
            None => {
                return Err(error_at(
                    DiagnosticKind::UndefinedObject,
                    format!("could not find array type for data type {}", self.type_name(common, -1)),
                    loc,
                ))
            }
        };
        Ok(Expr::Array {
            array_type,
            element_type,
            elements: elems,
            location: loc,
        })
    }

    /// Apply field selections and subscripts to an already-transformed base
    pub(crate) fn transform_indirection(
        &mut self,
        mut base: Expr,
        indirection: &[Indirection],
        loc: Location,
    ) -> Result<Expr> {
        let mut i = 0;
        while i < indirection.len() {
            match &indirection[i] {
                Indirection::Star => {
                    return Err(error_at(
                        DiagnosticKind::FeatureNotSupported,
                        "row expansion via \"*\" is not supported here",
                        loc,
                    ))
                }
                Indirection::Field(name) => {
                    base = self.select_field(base, name, loc)?;
                    i += 1;
                }
                Indirection::Subscript { .. } => {
                    let run = indirection[i..]
                        .iter()
                        .take_while(|ind| matches!(ind, Indirection::Subscript { .. }))
                        .count();
                    base = self.subscript(base, &indirection[i..i + run], None, loc)?;
                    i += run;
                }
            }
        }
        Ok(base)
    }

    /// Build a subscripting node over `container`; `assign` makes it a store
    pub(crate) fn subscript(
        &mut self,
        container: Expr,
        subscripts: &[Indirection],
        assign: Option<Expr>,
        loc: Location,
    ) -> Result<Expr> {
        let container_type = container.type_oid();
        let element_type = match self.catalog.type_by_oid(container_type) {
            Some(ty) if ty.is_array() => ty.elem.unwrap_or(UNKNOWN_OID),
            _ if container_type == UNDEFINED_OID => UNDEFINED_OID,
            _ => {
                return Err(error_at(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "cannot subscript type {} because it does not support subscripting",
                        self.type_name(container_type, -1)
                    ),
                    loc,
                ))
            }
        };
        let mut upper = Vec::with_capacity(subscripts.len());
        let mut lower = Vec::with_capacity(subscripts.len());
        let mut is_slice = false;
        for sub in subscripts {
            let Indirection::Subscript {
                lower: lo,
                upper: up,
                is_slice: slice,
            } = sub
            else {
                continue;
            };
            is_slice |= *slice;
            lower.push(self.transform_subscript(lo.as_deref())?);
            upper.push(self.transform_subscript(up.as_deref())?);
        }
        Ok(Expr::Subscript(Box::new(SubscriptingRef {
            container_type,
            element_type,
            typmod: container.typmod(),
            collid: container.collation(),
            upper,
            lower,
            is_slice,
            container,
            assign,
        })))
    }

    fn transform_subscript(&mut self, raw: Option<&RawExpr>) -> Result<Option<Expr>> {
        let Some(raw) = raw else {
            return Ok(None);
        };
        let expr = self.transform_expr(raw)?;
        let loc = expr.location();
        self.coercion
            .coerce(self.catalog, expr, INT4_OID, -1, CoercionContext::Assignment)
            .map(Some)
            .ok_or_else(|| error_at(DiagnosticKind::TypeMismatch, "array subscript must have type integer", loc))
    }

    /// `(expr).field`
    fn select_field(&mut self, base: Expr, name: &str, loc: Location) -> Result<Expr> {
        // whole-row reference to a range entry: go straight to the column
        if let Expr::Var(var) = &base {
            if var.varattno == 0 {
                let scope = &self.scopes[self.scope_index(var.levelsup)];
                let attno = scope
                    .rte(var.varno)
                    .and_then(|rte| rte.eref.colnames.iter().position(|c| c == name));
                if let Some(pos) = attno {
                    let (levels_up, rtindex, attno) = (var.levelsup, var.varno, pos as i32 + 1);
                    self.mark_var_for_select(levels_up, rtindex, attno);
                    return self.make_var(levels_up, rtindex, attno, loc);
                }
            }
        }
        if let Expr::Row { args, colnames, .. } = &base {
            if let Some(pos) = colnames.iter().position(|c| c == name) {
                return Ok(args[pos].clone());
            }
        }

        let type_oid = base.type_oid();
        if type_oid == UNDEFINED_OID {
            return Ok(base);
        }
        let catalog = self.catalog;
        let Some(ty) = catalog.type_by_oid(type_oid) else {
            return Err(self.not_composite(name, type_oid, loc));
        };
        if type_oid == RECORD_OID {
            return Err(error_at(
                DiagnosticKind::ColumnNotFound,
                format!("could not identify column \"{}\" in record data type", name),
                loc,
            ));
        }
        let Some(rel) = ty.relid.and_then(|relid| catalog.relation(relid)) else {
            return Err(self.not_composite(name, type_oid, loc));
        };
        let Some(attno) = rel.attnum(name) else {
            return Err(error_at(
                DiagnosticKind::ColumnNotFound,
                format!(
                    "column \"{}\" not found in data type {}",
                    name,
                    self.type_name(type_oid, -1)
                ),
                loc,
            ));
        };
        let Some(col) = rel.column(attno) else {
            return Err(self.not_composite(name, type_oid, loc));
        };
        Ok(Expr::FieldSelect {
            result_type: col.type_oid,
            typmod: col.typmod,
            collid: col.collation,
            fieldnum: attno,
            arg: Box::new(base),
        })
    }

    fn not_composite(&self, name: &str, type_oid: Oid, loc: Location) -> crate::error::Diagnostic {
        error_at(
            DiagnosticKind::WrongObjectType,
            format!(
                "column notation .{} applied to type {}, which is not a composite type",
                name,
                self.type_name(type_oid, -1)
            ),
            loc,
        )
    }

    /// Whether `cref` names a column visible from the current level without
    /// reporting an error
    pub(crate) fn column_ref_resolves(&mut self, cref: &ColumnRef) -> bool {
        let saved = self.warnings.len();
        let resolves = self.transform_column_ref(cref).is_ok();
        self.warnings.truncate(saved);
        resolves
    }
}

fn make_const(lit: &Literal, location: Location) -> Const {
    let (consttype, value) = match lit {
        Literal::Integer(v) if i32::try_from(*v).is_ok() => (INT4_OID, Datum::Int(*v)),
        Literal::Integer(v) => (INT8_OID, Datum::Int(*v)),
        Literal::Numeric(s) => (NUMERIC_OID, Datum::Numeric(s.clone())),
        Literal::String(s) => (UNKNOWN_OID, Datum::Text(s.clone())),
        Literal::Bool(b) => (BOOL_OID, Datum::Bool(*b)),
        Literal::Null => (UNKNOWN_OID, Datum::Null),
    };
    Const {
        consttype,
        consttypmod: -1,
        constcollid: 0,
        value,
        location,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{analyze, analyze_err};
    use crate::query::{CoercionForm, Query};
    use crate::types::{INT4_ARRAY_OID, VARCHAR_OID};
    use pretty_assertions::assert_eq;

    fn first_target(query: &Query) -> &Expr {
        &query.target_list[0].expr
    }

    #[test]
    fn test_literal_types() {
        let query = analyze("SELECT 1, 3000000000, 1.5, 'x', true, NULL");
        let types: Vec<Oid> = query.target_list.iter().map(|te| te.expr.type_oid()).collect();
        // unknown-typed outputs are resolved to text
        assert_eq!(types, vec![INT4_OID, INT8_OID, NUMERIC_OID, TEXT_OID, BOOL_OID, TEXT_OID]);
    }

    #[test]
    fn test_operator_coerces_operands() {
        let query = analyze("SELECT id + 1.5 FROM t");
        let Expr::Op(op) = first_target(&query) else {
            panic!("expected an operator");
        };
        assert_eq!(op.result_type, NUMERIC_OID);
        assert!(matches!(
            &op.args[0],
            Expr::Coerce {
                result_type: NUMERIC_OID,
                format: CoercionForm::ImplicitCast,
                ..
            }
        ));
    }

    #[test]
    fn test_operator_does_not_exist() {
        let err = analyze_err("SELECT id FROM t WHERE id = name");
        assert_eq!(err.kind, DiagnosticKind::UndefinedFunction);
        assert_eq!(err.message, "operator does not exist: integer = text");
        assert_eq!(
            err.help.as_deref(),
            Some("No operator matches the given name and argument types. You might need to add explicit type casts.")
        );
    }

    #[test]
    fn test_boolean_arguments() {
        let err = analyze_err("SELECT id FROM t WHERE id AND true");
        assert_eq!(err.message, "argument of AND must be type boolean, not type integer");
        let err = analyze_err("SELECT NOT name FROM t");
        assert_eq!(err.message, "argument of NOT must be type boolean, not type text");
    }

    #[test]
    fn test_in_list_expands_to_comparisons() {
        let query = analyze("SELECT id IN (1, 2) FROM t");
        assert!(matches!(first_target(&query), Expr::Bool { op: BoolOp::Or, args, .. } if args.len() == 2));
        let query = analyze("SELECT id NOT IN (1, 2) FROM t");
        assert!(matches!(first_target(&query), Expr::Bool { op: BoolOp::And, .. }));
    }

    #[test]
    fn test_cast() {
        let query = analyze("SELECT name::varchar(10) FROM t");
        let target = first_target(&query);
        assert_eq!(target.type_oid(), VARCHAR_OID);
        assert_eq!(target.typmod(), 14);

        let err = analyze_err("SELECT id::date FROM t");
        assert_eq!(err.kind, DiagnosticKind::CannotCoerce);
        assert_eq!(err.message, "cannot cast type integer to date");
    }

    #[test]
    fn test_case_common_type() {
        let query = analyze("SELECT CASE WHEN id > 0 THEN 1 ELSE 2.5 END FROM t");
        assert_eq!(first_target(&query).type_oid(), NUMERIC_OID);

        let err = analyze_err("SELECT CASE WHEN id > 0 THEN 1 ELSE name END FROM t");
        assert_eq!(err.message, "CASE types integer and text cannot be matched");

        let err = analyze_err("SELECT CASE WHEN id THEN 1 END FROM t");
        assert_eq!(err.message, "argument of CASE/WHEN must be type boolean, not type integer");
    }

    #[test]
    fn test_simple_case_compares_with_placeholder() {
        let query = analyze("SELECT CASE id WHEN 1 THEN 'one' END FROM t");
        let Expr::Case(case) = first_target(&query) else {
            panic!("expected CASE");
        };
        assert!(case.arg.is_some());
        let Expr::Op(op) = &case.whens[0].cond else {
            panic!("expected comparison");
        };
        assert!(matches!(op.args[0], Expr::CaseTest { type_oid: INT4_OID, .. }));
        assert_eq!(case.casetype, TEXT_OID);
    }

    #[test]
    fn test_coalesce_and_greatest() {
        let query = analyze("SELECT coalesce(parent_id, 0), greatest(id, amount) FROM t");
        assert_eq!(query.target_list[0].expr.type_oid(), INT4_OID);
        assert_eq!(query.target_list[1].expr.type_oid(), NUMERIC_OID);

        let err = analyze_err("SELECT coalesce(id, name) FROM t");
        assert_eq!(err.message, "COALESCE types integer and text cannot be matched");
    }

    #[test]
    fn test_arrays() {
        let query = analyze("SELECT ARRAY[id, 2] FROM t");
        assert_eq!(first_target(&query).type_oid(), INT4_ARRAY_OID);

        let query = analyze("SELECT ARRAY[]::integer[]");
        assert_eq!(first_target(&query).type_oid(), INT4_ARRAY_OID);

        let err = analyze_err("SELECT ARRAY[]");
        assert_eq!(err.message, "cannot determine type of empty array");

        let query = analyze("SELECT (ARRAY[id])[1] FROM t");
        assert_eq!(first_target(&query).type_oid(), INT4_OID);

        let err = analyze_err("SELECT (id)[1] FROM t");
        assert_eq!(
            err.message,
            "cannot subscript type integer because it does not support subscripting"
        );
    }

    #[test]
    fn test_scalar_sublink() {
        let query = analyze("SELECT (SELECT max(note) FROM u WHERE u.t_id = t.id) FROM t");
        assert!(query.has_sublinks);
        let Expr::SubLink(sublink) = first_target(&query) else {
            panic!("expected a sublink");
        };
        assert_eq!(sublink.kind, SubLinkType::Expr);
        assert_eq!(sublink.result_type, VARCHAR_OID);

        let err = analyze_err("SELECT (SELECT id, name FROM t)");
        assert_eq!(err.message, "subquery must return only one column");
    }

    #[test]
    fn test_any_sublink_column_counts() {
        let query = analyze("SELECT id FROM t WHERE id IN (SELECT t_id FROM u)");
        let Some(Expr::SubLink(sublink)) = &query.jointree.quals else {
            panic!("expected a sublink qual");
        };
        assert_eq!(sublink.kind, SubLinkType::Any);
        assert!(sublink.testexpr.is_some());

        let err = analyze_err("SELECT id FROM t WHERE id IN (SELECT t_id, id FROM u)");
        assert_eq!(err.message, "subquery has too many columns");
        let err = analyze_err("SELECT id FROM t WHERE (id, name) IN (SELECT t_id FROM u)");
        assert_eq!(err.message, "subquery has too few columns");
    }

    #[test]
    fn test_collate() {
        let query = analyze("SELECT name COLLATE \"C\" FROM t");
        assert_eq!(first_target(&query).collation(), C_COLLATION_OID);

        let err = analyze_err("SELECT name COLLATE \"xx\" FROM t");
        assert_eq!(err.message, "collation \"xx\" for encoding \"UTF8\" does not exist");
        let err = analyze_err("SELECT id COLLATE \"C\" FROM t");
        assert_eq!(err.message, "collations are not supported by type integer");
    }

    #[test]
    fn test_field_selection_from_whole_row() {
        let query = analyze("SELECT (t).name FROM t");
        let Expr::Var(var) = first_target(&query) else {
            panic!("expected a column");
        };
        assert_eq!(var.varattno, 3);
    }

    #[test]
    fn test_row_constructor_expands_star() {
        let query = analyze("SELECT ROW(1, 'x'), ROW(t.*, 0) FROM t");
        let Expr::Row { args, colnames, .. } = first_target(&query) else {
            panic!("expected a row constructor");
        };
        assert_eq!(args.len(), 2);
        assert_eq!(colnames, &vec!["f1".to_string(), "f2".to_string()]);

        let Expr::Row { args, .. } = &query.target_list[1].expr else {
            panic!("expected a row constructor");
        };
        let attnos: Vec<i32> = args.iter().filter_map(|e| e.as_var().map(|v| v.varattno)).collect();
        assert_eq!(attnos, vec![1, 2, 3, 4, 5]);
        assert_eq!(args.len(), 6);
        assert_eq!(query.target_list[1].expr.type_oid(), RECORD_OID);
    }

    #[test]
    fn test_default_outside_dml() {
        let err = analyze_err("SELECT id FROM t WHERE id = DEFAULT");
        assert_eq!(err.message, "DEFAULT is not allowed in this context");
    }
}
