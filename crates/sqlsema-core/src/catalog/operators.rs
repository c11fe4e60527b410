//! Builtin operator resolution
//!
//! Operators are not catalogued one by one; they are resolved by operator
//! family from the operand types.

use crate::types::{
    format_type, CoercionContext, CoercionService, Oid, TypeCategory, BOOL_OID, DATE_OID,
    INT4_OID, INTERVAL_OID, JSONB_OID, JSON_OID, TEXT_OID, TIMESTAMPTZ_OID, TIMESTAMP_OID,
    TIME_OID, UNDEFINED_OID, UNKNOWN_OID,
};

use super::CatalogProvider;

/// A resolved operator: its result type and the types its operands must be
/// coerced to (`None` for an absent operand of a prefix operator)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorResolution {
    pub result_type: Oid,
    pub left_type: Option<Oid>,
    pub right_type: Option<Oid>,
}

impl OperatorResolution {
    fn binary(result_type: Oid, left: Oid, right: Oid) -> Self {
        Self {
            result_type,
            left_type: Some(left),
            right_type: Some(right),
        }
    }
}

const COMPARISON: &[&str] = &["=", "<>", "!=", "<", "<=", ">", ">="];
const ARITHMETIC: &[&str] = &["+", "-", "*", "/", "%", "^"];
const PATTERN: &[&str] = &["~~", "!~~", "~~*", "!~~*", "~", "!~", "~*", "!~*"];
const CONTAINMENT: &[&str] = &["@>", "<@", "&&"];

fn category(catalog: &dyn CatalogProvider, oid: Oid) -> TypeCategory {
    catalog
        .type_by_oid(oid)
        .map(|t| t.category)
        .unwrap_or(TypeCategory::Unknown)
}

fn not_exist(catalog: &dyn CatalogProvider, name: &str, left: Option<Oid>, right: Oid) -> String {
    match left {
        Some(l) => format!(
            "operator does not exist: {} {} {}",
            format_type(catalog, l, -1),
            name,
            format_type(catalog, right, -1)
        ),
        None => format!(
            "operator does not exist: {} {}",
            name,
            format_type(catalog, right, -1)
        ),
    }
}

/// Resolve operator `name` applied to `left` (absent for prefix operators)
/// and `right`.
///
/// The error string is the user-facing message.
pub fn resolve_operator(
    catalog: &dyn CatalogProvider,
    coercion: &dyn CoercionService,
    name: &str,
    left: Option<Oid>,
    right: Oid,
) -> Result<OperatorResolution, String> {
    if left == Some(UNDEFINED_OID) || right == UNDEFINED_OID {
        return Ok(OperatorResolution {
            result_type: UNDEFINED_OID,
            left_type: left,
            right_type: Some(right),
        });
    }

    let Some(left) = left else {
        return match (name, category(catalog, right)) {
            ("-" | "+", TypeCategory::Numeric | TypeCategory::Timespan) => Ok(OperatorResolution {
                result_type: right,
                left_type: None,
                right_type: Some(right),
            }),
            ("-" | "+", TypeCategory::Unknown) => Ok(OperatorResolution {
                result_type: crate::types::NUMERIC_OID,
                left_type: None,
                right_type: Some(crate::types::NUMERIC_OID),
            }),
            _ => Err(not_exist(catalog, name, None, right)),
        };
    };

    if name == "||" {
        let (lc, rc) = (category(catalog, left), category(catalog, right));
        if lc == TypeCategory::Array && (right == left || rc == TypeCategory::Unknown) {
            return Ok(OperatorResolution::binary(left, left, left));
        }
        return Ok(OperatorResolution::binary(TEXT_OID, TEXT_OID, TEXT_OID));
    }

    if PATTERN.contains(&name) {
        let ok = |t: Oid| {
            t == UNKNOWN_OID || matches!(category(catalog, t), TypeCategory::String)
        };
        if ok(left) && ok(right) {
            return Ok(OperatorResolution::binary(BOOL_OID, TEXT_OID, TEXT_OID));
        }
        return Err(not_exist(catalog, name, Some(left), right));
    }

    if matches!(name, "->" | "->>") && matches!(left, JSON_OID | JSONB_OID) {
        let result = if name == "->" { left } else { TEXT_OID };
        let key = if right == UNKNOWN_OID { TEXT_OID } else { right };
        return Ok(OperatorResolution::binary(result, left, key));
    }

    if CONTAINMENT.contains(&name) {
        let common = coercion
            .common_type(catalog, &[left, right])
            .filter(|t| category(catalog, *t) == TypeCategory::Array);
        return match common {
            Some(t) => Ok(OperatorResolution::binary(BOOL_OID, t, t)),
            None => Err(not_exist(catalog, name, Some(left), right)),
        };
    }

    // date/time arithmetic with mixed operand types
    if matches!(name, "+" | "-") {
        let datetime = |t: Oid| matches!(t, DATE_OID | TIMESTAMP_OID | TIMESTAMPTZ_OID | TIME_OID);
        match (name, left, right) {
            ("-", DATE_OID, DATE_OID) => {
                return Ok(OperatorResolution::binary(INT4_OID, DATE_OID, DATE_OID))
            }
            ("-", l, r) if datetime(l) && l == r => {
                return Ok(OperatorResolution::binary(INTERVAL_OID, l, r))
            }
            (_, DATE_OID, INT4_OID) => {
                return Ok(OperatorResolution::binary(DATE_OID, DATE_OID, INT4_OID))
            }
            (_, l, INTERVAL_OID) if datetime(l) => {
                let result = if l == DATE_OID { TIMESTAMP_OID } else { l };
                return Ok(OperatorResolution::binary(result, l, INTERVAL_OID));
            }
            ("+", INTERVAL_OID, r) if datetime(r) => {
                let result = if r == DATE_OID { TIMESTAMP_OID } else { r };
                return Ok(OperatorResolution::binary(result, INTERVAL_OID, r));
            }
            _ => {}
        }
    }

    let is_comparison = COMPARISON.contains(&name);
    let is_arithmetic = ARITHMETIC.contains(&name);
    if !is_comparison && !is_arithmetic {
        return Err(not_exist(catalog, name, Some(left), right));
    }

    let Some(common) = coercion.common_type(catalog, &[left, right]) else {
        return Err(not_exist(catalog, name, Some(left), right));
    };
    // The operands must reach the common type implicitly
    for t in [left, right] {
        if !coercion.can_coerce(catalog, t, common, CoercionContext::Implicit) {
            return Err(not_exist(catalog, name, Some(left), right));
        }
    }
    if is_comparison {
        return Ok(OperatorResolution::binary(BOOL_OID, common, common));
    }
    match category(catalog, common) {
        TypeCategory::Numeric | TypeCategory::Timespan => {
            Ok(OperatorResolution::binary(common, common, common))
        }
        TypeCategory::String if left == UNKNOWN_OID && right == UNKNOWN_OID => Err(format!(
            "operator is not unique: unknown {name} unknown"
        )),
        _ => Err(not_exist(catalog, name, Some(left), right)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::{BuiltinCoercion, INT8_OID, NUMERIC_OID};

    fn resolve(name: &str, left: Oid, right: Oid) -> Result<OperatorResolution, String> {
        resolve_operator(&Catalog::new(), &BuiltinCoercion, name, Some(left), right)
    }

    #[test]
    fn test_comparison_uses_common_type() {
        let op = resolve("=", INT4_OID, INT8_OID).unwrap();
        assert_eq!(op.result_type, BOOL_OID);
        assert_eq!(op.left_type, Some(INT8_OID));
    }

    #[test]
    fn test_arithmetic_widens() {
        let op = resolve("+", INT4_OID, NUMERIC_OID).unwrap();
        assert_eq!(op.result_type, NUMERIC_OID);
    }

    #[test]
    fn test_mismatched_comparison_is_rejected() {
        let err = resolve("=", INT4_OID, TEXT_OID).unwrap_err();
        assert_eq!(err, "operator does not exist: integer = text");
    }

    #[test]
    fn test_date_arithmetic() {
        assert_eq!(resolve("-", DATE_OID, DATE_OID).unwrap().result_type, INT4_OID);
        assert_eq!(
            resolve("-", TIMESTAMP_OID, TIMESTAMP_OID).unwrap().result_type,
            INTERVAL_OID
        );
        assert_eq!(
            resolve("+", TIMESTAMPTZ_OID, INTERVAL_OID).unwrap().result_type,
            TIMESTAMPTZ_OID
        );
    }

    #[test]
    fn test_unknown_literal_compares_with_anything() {
        let op = resolve("=", INT4_OID, UNKNOWN_OID).unwrap();
        assert_eq!(op.right_type, Some(INT4_OID));
    }
}
