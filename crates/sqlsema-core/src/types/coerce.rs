//! The coercion collaborator
//!
//! Analysis never decides type compatibility itself; it picks a
//! [`CoercionContext`] and asks a [`CoercionService`]. [`BuiltinCoercion`]
//! is a category-based implementation that is good enough for static
//! checking.

use super::{
    Oid, TypeCategory, TypeDef, ANY_OID, ANYARRAY_OID, ANYELEMENT_OID, BOOL_OID, DATE_OID,
    DEFAULT_COLLATION_OID, FLOAT4_OID, FLOAT8_OID, INT2_OID, INT4_OID, INT8_OID, INTERVAL_OID,
    NUMERIC_OID, RECORD_OID, TEXT_OID, TIMESTAMPTZ_OID, TIMESTAMP_OID, TIMETZ_OID, TIME_OID,
    UNDEFINED_OID, UNKNOWN_OID,
};
use crate::catalog::CatalogProvider;
use crate::query::{CoercionForm, Const, Datum, Expr};
use crate::syntax::Location;

/// How permissive a coercion may be
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CoercionContext {
    /// Operator and function arguments
    Implicit,
    /// Storing into a column (INSERT, UPDATE)
    Assignment,
    /// `CAST(x AS t)` / `x::t`
    Explicit,
}

/// Coerce-expression-to-type service consumed by the analyzer
pub trait CoercionService {
    /// Whether a value of type `from` may become `to` under `ctx`
    fn can_coerce(&self, catalog: &dyn CatalogProvider, from: Oid, to: Oid, ctx: CoercionContext)
        -> bool;

    /// Coerce `expr` to `target` with `typmod`, or `None` when not allowed
    fn coerce(
        &self,
        catalog: &dyn CatalogProvider,
        expr: Expr,
        target: Oid,
        typmod: i32,
        ctx: CoercionContext,
    ) -> Option<Expr>;

    /// The common type of a set of branch types (CASE, COALESCE, UNION, VALUES)
    fn common_type(&self, catalog: &dyn CatalogProvider, types: &[Oid]) -> Option<Oid>;

    /// A zero value of a type, used by relaxed assignment
    fn zero_value(&self, catalog: &dyn CatalogProvider, target: Oid, typmod: i32) -> Expr;
}

/// Category-driven coercion rules
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinCoercion;

/// Position in the numeric widening chain; implicit casts only go upward
fn numeric_rank(oid: Oid) -> Option<u8> {
    match oid {
        INT2_OID => Some(0),
        INT4_OID => Some(1),
        INT8_OID => Some(2),
        NUMERIC_OID => Some(3),
        FLOAT4_OID => Some(4),
        FLOAT8_OID => Some(5),
        _ => None,
    }
}

fn datetime_rank(oid: Oid) -> Option<u8> {
    match oid {
        DATE_OID => Some(0),
        TIMESTAMP_OID => Some(1),
        TIMESTAMPTZ_OID => Some(2),
        _ => None,
    }
}

fn category(ty: Option<&TypeDef>) -> TypeCategory {
    ty.map(|t| t.category).unwrap_or(TypeCategory::Unknown)
}

impl CoercionService for BuiltinCoercion {
    fn can_coerce(
        &self,
        catalog: &dyn CatalogProvider,
        from: Oid,
        to: Oid,
        ctx: CoercionContext,
    ) -> bool {
        if from == to || from == UNKNOWN_OID || from == UNDEFINED_OID || to == UNDEFINED_OID {
            return true;
        }
        if matches!(to, ANY_OID | ANYELEMENT_OID) {
            return true;
        }
        let from_ty = catalog.type_by_oid(from);
        let to_ty = catalog.type_by_oid(to);
        let (cf, ct) = (category(from_ty), category(to_ty));

        if to == ANYARRAY_OID {
            return cf == TypeCategory::Array;
        }
        if to == RECORD_OID {
            return cf == TypeCategory::Composite || from == RECORD_OID;
        }

        match (cf, ct) {
            (TypeCategory::Numeric, TypeCategory::Numeric) => {
                match (numeric_rank(from), numeric_rank(to)) {
                    (Some(a), Some(b)) if a < b => true,
                    _ => ctx >= CoercionContext::Assignment,
                }
            }
            (TypeCategory::String, TypeCategory::String) => true,
            (_, TypeCategory::String) => ctx >= CoercionContext::Assignment,
            (TypeCategory::String, _) => ctx == CoercionContext::Explicit,
            (TypeCategory::DateTime, TypeCategory::DateTime) => {
                match (datetime_rank(from), datetime_rank(to)) {
                    (Some(a), Some(b)) if a < b => true,
                    _ if from == TIME_OID && to == TIMETZ_OID => true,
                    _ => ctx >= CoercionContext::Assignment,
                }
            }
            (TypeCategory::Timespan, TypeCategory::Timespan) => true,
            (TypeCategory::Boolean, TypeCategory::Numeric)
            | (TypeCategory::Numeric, TypeCategory::Boolean) => {
                ctx == CoercionContext::Explicit && (from == INT4_OID || to == INT4_OID)
            }
            (TypeCategory::Array, TypeCategory::Array) => {
                match (from_ty.and_then(|t| t.elem), to_ty.and_then(|t| t.elem)) {
                    (Some(fe), Some(te)) => self.can_coerce(catalog, fe, te, ctx),
                    _ => false,
                }
            }
            (TypeCategory::Composite, TypeCategory::Composite) => false,
            _ => false,
        }
    }

    fn coerce(
        &self,
        catalog: &dyn CatalogProvider,
        expr: Expr,
        target: Oid,
        typmod: i32,
        ctx: CoercionContext,
    ) -> Option<Expr> {
        let from = expr.type_oid();
        let collid = if catalog.type_by_oid(target).is_some_and(|t| t.collatable) {
            DEFAULT_COLLATION_OID
        } else {
            0
        };
        if from == target {
            if typmod < 0 || expr.typmod() == typmod {
                return Some(expr);
            }
        } else if !self.can_coerce(catalog, from, target, ctx) {
            return None;
        }
        if matches!(target, ANY_OID | ANYELEMENT_OID | ANYARRAY_OID) {
            return Some(expr);
        }

        match expr {
            // Literals of unknown type take the target type directly
            Expr::Const(c) if c.consttype == UNKNOWN_OID => Some(Expr::Const(Const {
                consttype: target,
                consttypmod: typmod,
                constcollid: collid,
                ..c
            })),
            Expr::Param { id, location, .. } if from == UNKNOWN_OID => Some(Expr::Param {
                id,
                paramtype: target,
                location,
            }),
            other => {
                let location = other.location();
                let format = if ctx == CoercionContext::Explicit {
                    CoercionForm::ExplicitCast
                } else {
                    CoercionForm::ImplicitCast
                };
                Some(Expr::Coerce {
                    arg: Box::new(other),
                    result_type: target,
                    typmod,
                    collid,
                    format,
                    location,
                })
            }
        }
    }

    fn common_type(&self, catalog: &dyn CatalogProvider, types: &[Oid]) -> Option<Oid> {
        let mut known = types.iter().copied().filter(|t| *t != UNKNOWN_OID);
        let Some(mut ptype) = known.next() else {
            return Some(TEXT_OID);
        };
        let mut pcategory = category(catalog.type_by_oid(ptype));
        for ntype in known {
            if ntype == ptype || ntype == UNDEFINED_OID {
                continue;
            }
            let nty = catalog.type_by_oid(ntype);
            let ncategory = category(nty);
            if ncategory != pcategory {
                return None;
            }
            let npreferred = nty.is_some_and(|t| t.preferred);
            let pty = catalog.type_by_oid(ptype);
            let ppreferred = pty.is_some_and(|t| t.preferred);
            let up = self.can_coerce(catalog, ptype, ntype, CoercionContext::Implicit);
            let down = self.can_coerce(catalog, ntype, ptype, CoercionContext::Implicit);
            if (!ppreferred && up && !down) || (npreferred && !ppreferred && up) {
                ptype = ntype;
                pcategory = ncategory;
            } else if !up && !down {
                return None;
            }
        }
        Some(ptype)
    }

    fn zero_value(&self, catalog: &dyn CatalogProvider, target: Oid, typmod: i32) -> Expr {
        let ty = catalog.type_by_oid(target);
        let value = match (category(ty), target) {
            (TypeCategory::Numeric, INT2_OID | INT4_OID | INT8_OID) => Datum::Int(0),
            (TypeCategory::Numeric, _) => Datum::Numeric("0".to_string()),
            (TypeCategory::String, _) => Datum::Text(String::new()),
            (TypeCategory::Boolean, _) => Datum::Bool(false),
            (_, DATE_OID) => Datum::Text("1970-01-01".to_string()),
            (_, TIMESTAMP_OID | TIMESTAMPTZ_OID) => Datum::Text("1970-01-01 00:00:00".to_string()),
            (_, TIME_OID | TIMETZ_OID | INTERVAL_OID) => Datum::Text("00:00:00".to_string()),
            (TypeCategory::Array, _) => Datum::Text("{}".to_string()),
            _ => Datum::Null,
        };
        let collid = if ty.is_some_and(|t| t.collatable) {
            DEFAULT_COLLATION_OID
        } else {
            0
        };
        Expr::Const(Const {
            consttype: target,
            consttypmod: typmod,
            constcollid: collid,
            value,
            location: Location::UNKNOWN,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::{INT4_ARRAY_OID, INT8_ARRAY_OID, VARCHAR_OID};

    #[test]
    fn test_numeric_widening_is_implicit() {
        let catalog = Catalog::new();
        let c = BuiltinCoercion;
        assert!(c.can_coerce(&catalog, INT4_OID, INT8_OID, CoercionContext::Implicit));
        assert!(!c.can_coerce(&catalog, INT8_OID, INT4_OID, CoercionContext::Implicit));
        assert!(c.can_coerce(&catalog, INT8_OID, INT4_OID, CoercionContext::Assignment));
    }

    #[test]
    fn test_text_to_number_needs_explicit_cast() {
        let catalog = Catalog::new();
        let c = BuiltinCoercion;
        assert!(!c.can_coerce(&catalog, TEXT_OID, INT4_OID, CoercionContext::Assignment));
        assert!(c.can_coerce(&catalog, TEXT_OID, INT4_OID, CoercionContext::Explicit));
        assert!(c.can_coerce(&catalog, INT4_OID, VARCHAR_OID, CoercionContext::Assignment));
        assert!(!c.can_coerce(&catalog, BOOL_OID, INT4_OID, CoercionContext::Assignment));
    }

    #[test]
    fn test_arrays_coerce_by_element() {
        let catalog = Catalog::new();
        let c = BuiltinCoercion;
        assert!(c.can_coerce(&catalog, INT4_ARRAY_OID, INT8_ARRAY_OID, CoercionContext::Implicit));
        assert!(c.can_coerce(&catalog, INT4_ARRAY_OID, ANYARRAY_OID, CoercionContext::Implicit));
    }

    #[test]
    fn test_unknown_literal_takes_target_type() {
        let catalog = Catalog::new();
        let literal = Expr::Const(Const {
            consttype: UNKNOWN_OID,
            consttypmod: -1,
            constcollid: 0,
            value: Datum::Text("abc".to_string()),
            location: Location::UNKNOWN,
        });
        let coerced = BuiltinCoercion
            .coerce(&catalog, literal, VARCHAR_OID, 14, CoercionContext::Assignment)
            .unwrap();
        assert_eq!(coerced.type_oid(), VARCHAR_OID);
        assert_eq!(coerced.typmod(), 14);
    }

    #[test]
    fn test_common_type_prefers_wider_numeric() {
        let catalog = Catalog::new();
        let c = BuiltinCoercion;
        assert_eq!(c.common_type(&catalog, &[INT4_OID, UNKNOWN_OID, NUMERIC_OID]), Some(NUMERIC_OID));
        assert_eq!(c.common_type(&catalog, &[UNKNOWN_OID]), Some(TEXT_OID));
        assert_eq!(c.common_type(&catalog, &[INT4_OID, TEXT_OID]), None);
    }

    #[test]
    fn test_zero_values() {
        let catalog = Catalog::new();
        let zero = BuiltinCoercion.zero_value(&catalog, INT4_OID, -1);
        assert!(matches!(zero, Expr::Const(Const { value: Datum::Int(0), .. })));
    }
}
