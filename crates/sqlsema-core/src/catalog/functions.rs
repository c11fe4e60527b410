//! Builtin function catalog and overload resolution

use std::fmt;

use crate::types::{
    CoercionContext, CoercionService, Oid, ANYARRAY_OID, ANYELEMENT_OID, ANY_OID, BOOL_OID,
    DATE_OID, FLOAT4_OID, FLOAT8_OID, INT2_OID, INT4_OID, INT8_OID, INTERVAL_OID, NUMERIC_OID,
    REGCLASS_OID, TEXT_OID, TIMESTAMPTZ_OID, TIMESTAMP_OID, UNKNOWN_OID,
};

use super::CatalogProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Normal,
    Aggregate,
    /// Aggregate taking direct arguments plus a WITHIN GROUP ordering
    OrderedSet,
    /// Ordered-set aggregate whose direct arguments mirror the ordering columns
    Hypothetical,
    Window,
}

/// How a function's result type is derived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnType {
    Fixed(Oid),
    /// Same type as the n-th actual argument
    SameAsArg(usize),
    /// Element type of the n-th (array) argument
    ElementOf(usize),
    /// Array of the n-th argument's type
    ArrayOf(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub oid: Oid,
    pub name: String,
    pub kind: FunctionKind,
    /// Declared argument types; for ordered-set aggregates the direct
    /// arguments come first
    pub args: Vec<Oid>,
    /// Element type of a trailing VARIADIC parameter
    pub variadic: Option<Oid>,
    pub ret: ReturnType,
    pub returns_set: bool,
    /// Number of direct arguments of an ordered-set aggregate
    pub num_direct_args: usize,
}

impl FunctionDef {
    fn new(oid: Oid, name: &str, kind: FunctionKind, args: &[Oid], ret: ReturnType) -> Self {
        Self {
            oid,
            name: name.to_string(),
            kind,
            args: args.to_vec(),
            variadic: None,
            ret,
            returns_set: false,
            num_direct_args: 0,
        }
    }

    fn variadic(mut self, elem: Oid) -> Self {
        self.variadic = Some(elem);
        self
    }

    fn set_returning(mut self) -> Self {
        self.returns_set = true;
        self
    }

    fn direct_args(mut self, n: usize) -> Self {
        self.num_direct_args = n;
        self
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(
            self.kind,
            FunctionKind::Aggregate | FunctionKind::OrderedSet | FunctionKind::Hypothetical
        )
    }

    fn accepts_arity(&self, n: usize) -> bool {
        match self.variadic {
            Some(_) => n >= self.args.len(),
            None => n == self.args.len(),
        }
    }

    fn param_type(&self, i: usize) -> Oid {
        self.args
            .get(i)
            .copied()
            .or(self.variadic)
            .unwrap_or(ANY_OID)
    }

    /// Result type for concrete argument types
    pub fn result_type(&self, catalog: &dyn CatalogProvider, actual: &[Oid]) -> Oid {
        let arg = |i: usize| actual.get(i).copied().unwrap_or(UNKNOWN_OID);
        match self.ret {
            ReturnType::Fixed(oid) => oid,
            ReturnType::SameAsArg(i) => match arg(i) {
                UNKNOWN_OID => TEXT_OID,
                oid => oid,
            },
            ReturnType::ElementOf(i) => catalog
                .type_by_oid(arg(i))
                .and_then(|t| t.elem)
                .unwrap_or(UNKNOWN_OID),
            ReturnType::ArrayOf(i) => {
                let elem = match arg(i) {
                    UNKNOWN_OID => TEXT_OID,
                    oid => oid,
                };
                catalog
                    .type_by_oid(elem)
                    .and_then(|t| t.array)
                    .unwrap_or(ANYARRAY_OID)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuncLookupError {
    NotFound,
    NotUnique,
}

impl fmt::Display for FuncLookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FuncLookupError::NotFound => f.write_str("function does not exist"),
            FuncLookupError::NotUnique => f.write_str("function is not unique"),
        }
    }
}

/// Pick the overload of `name` best matching `actual` argument types.
///
/// A candidate must accept the argument count and every argument must be
/// implicitly coercible to its parameter. Among the survivors the one with
/// the most exact type matches wins; a tie is an ambiguity. Ordered-set and
/// hypothetical-set aggregates are candidates only for `WITHIN GROUP` calls,
/// and only they are.
pub fn resolve_function<'c>(
    catalog: &'c dyn CatalogProvider,
    coercion: &dyn CoercionService,
    name: &str,
    actual: &[Oid],
    within_group: bool,
) -> Result<&'c FunctionDef, FuncLookupError> {
    let mut best: Option<(&FunctionDef, usize)> = None;
    let mut tied = false;
    for func in catalog.lookup_functions(name) {
        let ordered = matches!(func.kind, FunctionKind::OrderedSet | FunctionKind::Hypothetical);
        if ordered != within_group || !func.accepts_arity(actual.len()) {
            continue;
        }
        let mut exact = 0;
        let mut ok = true;
        for (i, &arg) in actual.iter().enumerate() {
            let param = func.param_type(i);
            if arg == param {
                exact += 2;
            } else if arg == UNKNOWN_OID {
                // unknown literals favour text-like parameters
                if param == TEXT_OID {
                    exact += 1;
                }
            } else if !coercion.can_coerce(catalog, arg, param, CoercionContext::Implicit) {
                ok = false;
                break;
            }
        }
        if !ok {
            continue;
        }
        match best {
            Some((_, score)) if score > exact => {}
            Some((_, score)) if score == exact => tied = true,
            _ => {
                best = Some((func, exact));
                tied = false;
            }
        }
    }
    match best {
        Some(_) if tied => Err(FuncLookupError::NotUnique),
        Some((func, _)) => Ok(func),
        None => Err(FuncLookupError::NotFound),
    }
}

/// The builtin function table
pub fn builtin_functions() -> Vec<FunctionDef> {
    use FunctionKind::*;
    use ReturnType::*;

    let mut next = 5000;
    let mut oid = move || {
        next += 1;
        next
    };
    let mut funcs = Vec::new();
    let mut add = |f: FunctionDef| funcs.push(f);

    // Aggregates
    add(FunctionDef::new(oid(), "count", Aggregate, &[], Fixed(INT8_OID)));
    add(FunctionDef::new(oid(), "count", Aggregate, &[ANY_OID], Fixed(INT8_OID)));
    for (arg, ret) in [
        (INT2_OID, INT8_OID),
        (INT4_OID, INT8_OID),
        (INT8_OID, NUMERIC_OID),
        (NUMERIC_OID, NUMERIC_OID),
        (FLOAT4_OID, FLOAT4_OID),
        (FLOAT8_OID, FLOAT8_OID),
        (INTERVAL_OID, INTERVAL_OID),
    ] {
        add(FunctionDef::new(oid(), "sum", Aggregate, &[arg], Fixed(ret)));
    }
    for (arg, ret) in [
        (INT2_OID, NUMERIC_OID),
        (INT4_OID, NUMERIC_OID),
        (INT8_OID, NUMERIC_OID),
        (NUMERIC_OID, NUMERIC_OID),
        (FLOAT8_OID, FLOAT8_OID),
        (INTERVAL_OID, INTERVAL_OID),
    ] {
        add(FunctionDef::new(oid(), "avg", Aggregate, &[arg], Fixed(ret)));
    }
    for name in ["min", "max"] {
        add(FunctionDef::new(oid(), name, Aggregate, &[ANYELEMENT_OID], SameAsArg(0)));
    }
    add(FunctionDef::new(oid(), "array_agg", Aggregate, &[ANYELEMENT_OID], ArrayOf(0)));
    add(FunctionDef::new(oid(), "string_agg", Aggregate, &[TEXT_OID, TEXT_OID], Fixed(TEXT_OID)));
    for name in ["bool_and", "bool_or", "every"] {
        add(FunctionDef::new(oid(), name, Aggregate, &[BOOL_OID], Fixed(BOOL_OID)));
    }
    for name in ["stddev", "variance", "stddev_samp", "var_samp"] {
        add(FunctionDef::new(oid(), name, Aggregate, &[NUMERIC_OID], Fixed(NUMERIC_OID)));
        add(FunctionDef::new(oid(), name, Aggregate, &[FLOAT8_OID], Fixed(FLOAT8_OID)));
    }

    // Ordered-set aggregates: direct arguments first
    add(FunctionDef::new(oid(), "percentile_cont", OrderedSet, &[FLOAT8_OID, FLOAT8_OID], Fixed(FLOAT8_OID)).direct_args(1));
    add(FunctionDef::new(oid(), "percentile_cont", OrderedSet, &[FLOAT8_OID, INTERVAL_OID], Fixed(INTERVAL_OID)).direct_args(1));
    add(FunctionDef::new(oid(), "percentile_disc", OrderedSet, &[FLOAT8_OID, ANYELEMENT_OID], SameAsArg(1)).direct_args(1));
    add(FunctionDef::new(oid(), "mode", OrderedSet, &[ANYELEMENT_OID], SameAsArg(0)));

    // Hypothetical-set aggregates
    for (name, ret) in [
        ("rank", INT8_OID),
        ("dense_rank", INT8_OID),
        ("percent_rank", FLOAT8_OID),
        ("cume_dist", FLOAT8_OID),
    ] {
        add(FunctionDef::new(oid(), name, Hypothetical, &[], Fixed(ret)).variadic(ANY_OID));
    }

    // Window functions
    for (name, ret) in [
        ("row_number", INT8_OID),
        ("rank", INT8_OID),
        ("dense_rank", INT8_OID),
        ("percent_rank", FLOAT8_OID),
        ("cume_dist", FLOAT8_OID),
    ] {
        add(FunctionDef::new(oid(), name, Window, &[], Fixed(ret)));
    }
    add(FunctionDef::new(oid(), "ntile", Window, &[INT4_OID], Fixed(INT4_OID)));
    for name in ["lag", "lead"] {
        add(FunctionDef::new(oid(), name, Window, &[ANYELEMENT_OID], SameAsArg(0)));
        add(FunctionDef::new(oid(), name, Window, &[ANYELEMENT_OID, INT4_OID], SameAsArg(0)));
        add(FunctionDef::new(oid(), name, Window, &[ANYELEMENT_OID, INT4_OID, ANYELEMENT_OID], SameAsArg(0)));
    }
    for name in ["first_value", "last_value"] {
        add(FunctionDef::new(oid(), name, Window, &[ANYELEMENT_OID], SameAsArg(0)));
    }
    add(FunctionDef::new(oid(), "nth_value", Window, &[ANYELEMENT_OID, INT4_OID], SameAsArg(0)));

    // Set-returning functions
    add(FunctionDef::new(oid(), "generate_series", Normal, &[INT4_OID, INT4_OID], Fixed(INT4_OID)).set_returning());
    add(FunctionDef::new(oid(), "generate_series", Normal, &[INT4_OID, INT4_OID, INT4_OID], Fixed(INT4_OID)).set_returning());
    add(FunctionDef::new(oid(), "generate_series", Normal, &[INT8_OID, INT8_OID], Fixed(INT8_OID)).set_returning());
    add(FunctionDef::new(oid(), "generate_series", Normal, &[TIMESTAMP_OID, TIMESTAMP_OID, INTERVAL_OID], Fixed(TIMESTAMP_OID)).set_returning());
    add(FunctionDef::new(oid(), "unnest", Normal, &[ANYARRAY_OID], ElementOf(0)).set_returning());

    // Scalar functions
    for name in ["lower", "upper", "initcap", "md5"] {
        add(FunctionDef::new(oid(), name, Normal, &[TEXT_OID], Fixed(TEXT_OID)));
    }
    for name in ["length", "char_length"] {
        add(FunctionDef::new(oid(), name, Normal, &[TEXT_OID], Fixed(INT4_OID)));
    }
    for ty in [INT4_OID, INT8_OID, NUMERIC_OID, FLOAT8_OID] {
        add(FunctionDef::new(oid(), "abs", Normal, &[ty], Fixed(ty)));
    }
    for name in ["ceil", "floor"] {
        add(FunctionDef::new(oid(), name, Normal, &[FLOAT8_OID], Fixed(FLOAT8_OID)));
        add(FunctionDef::new(oid(), name, Normal, &[NUMERIC_OID], Fixed(NUMERIC_OID)));
    }
    add(FunctionDef::new(oid(), "round", Normal, &[FLOAT8_OID], Fixed(FLOAT8_OID)));
    add(FunctionDef::new(oid(), "round", Normal, &[NUMERIC_OID], Fixed(NUMERIC_OID)));
    add(FunctionDef::new(oid(), "round", Normal, &[NUMERIC_OID, INT4_OID], Fixed(NUMERIC_OID)));
    add(FunctionDef::new(oid(), "now", Normal, &[], Fixed(TIMESTAMPTZ_OID)));
    add(FunctionDef::new(oid(), "current_timestamp", Normal, &[], Fixed(TIMESTAMPTZ_OID)));
    add(FunctionDef::new(oid(), "current_date", Normal, &[], Fixed(DATE_OID)));
    add(FunctionDef::new(oid(), "localtimestamp", Normal, &[], Fixed(TIMESTAMP_OID)));
    for ty in [TIMESTAMP_OID, TIMESTAMPTZ_OID, INTERVAL_OID, DATE_OID] {
        add(FunctionDef::new(oid(), "date_part", Normal, &[TEXT_OID, ty], Fixed(FLOAT8_OID)));
    }
    add(FunctionDef::new(oid(), "date_trunc", Normal, &[TEXT_OID, TIMESTAMP_OID], Fixed(TIMESTAMP_OID)));
    add(FunctionDef::new(oid(), "date_trunc", Normal, &[TEXT_OID, TIMESTAMPTZ_OID], Fixed(TIMESTAMPTZ_OID)));
    for name in ["btrim", "ltrim", "rtrim"] {
        add(FunctionDef::new(oid(), name, Normal, &[TEXT_OID], Fixed(TEXT_OID)));
        add(FunctionDef::new(oid(), name, Normal, &[TEXT_OID, TEXT_OID], Fixed(TEXT_OID)));
    }
    add(FunctionDef::new(oid(), "substring", Normal, &[TEXT_OID, INT4_OID], Fixed(TEXT_OID)));
    add(FunctionDef::new(oid(), "substring", Normal, &[TEXT_OID, INT4_OID, INT4_OID], Fixed(TEXT_OID)));
    add(FunctionDef::new(oid(), "substr", Normal, &[TEXT_OID, INT4_OID], Fixed(TEXT_OID)));
    add(FunctionDef::new(oid(), "substr", Normal, &[TEXT_OID, INT4_OID, INT4_OID], Fixed(TEXT_OID)));
    add(FunctionDef::new(oid(), "position", Normal, &[TEXT_OID, TEXT_OID], Fixed(INT4_OID)));
    add(FunctionDef::new(oid(), "strpos", Normal, &[TEXT_OID, TEXT_OID], Fixed(INT4_OID)));
    add(FunctionDef::new(oid(), "replace", Normal, &[TEXT_OID, TEXT_OID, TEXT_OID], Fixed(TEXT_OID)));
    add(FunctionDef::new(oid(), "timezone", Normal, &[TEXT_OID, TIMESTAMPTZ_OID], Fixed(TIMESTAMP_OID)));
    add(FunctionDef::new(oid(), "timezone", Normal, &[TEXT_OID, TIMESTAMP_OID], Fixed(TIMESTAMPTZ_OID)));
    add(FunctionDef::new(oid(), "concat", Normal, &[], Fixed(TEXT_OID)).variadic(ANY_OID));
    add(FunctionDef::new(oid(), "nextval", Normal, &[REGCLASS_OID], Fixed(INT8_OID)));
    add(FunctionDef::new(oid(), "random", Normal, &[], Fixed(FLOAT8_OID)));
    add(FunctionDef::new(oid(), "array_length", Normal, &[ANYARRAY_OID, INT4_OID], Fixed(INT4_OID)));
    add(FunctionDef::new(oid(), "to_char", Normal, &[TIMESTAMPTZ_OID, TEXT_OID], Fixed(TEXT_OID)));
    add(FunctionDef::new(oid(), "to_char", Normal, &[NUMERIC_OID, TEXT_OID], Fixed(TEXT_OID)));

    funcs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::{BuiltinCoercion, INT4_ARRAY_OID};

    #[test]
    fn test_sum_overloads_pick_exact_match() {
        let catalog = Catalog::new();
        let sum = resolve_function(&catalog, &BuiltinCoercion, "sum", &[INT4_OID], false).unwrap();
        assert_eq!(sum.result_type(&catalog, &[INT4_OID]), INT8_OID);

        let sum = resolve_function(&catalog, &BuiltinCoercion, "sum", &[NUMERIC_OID], false).unwrap();
        assert_eq!(sum.result_type(&catalog, &[NUMERIC_OID]), NUMERIC_OID);
    }

    #[test]
    fn test_polymorphic_results() {
        let catalog = Catalog::new();
        let unnest = resolve_function(&catalog, &BuiltinCoercion, "unnest", &[INT4_ARRAY_OID], false).unwrap();
        assert!(unnest.returns_set);
        assert_eq!(unnest.result_type(&catalog, &[INT4_ARRAY_OID]), INT4_OID);

        let agg = resolve_function(&catalog, &BuiltinCoercion, "array_agg", &[INT4_OID], false).unwrap();
        assert_eq!(agg.result_type(&catalog, &[INT4_OID]), INT4_ARRAY_OID);
    }

    #[test]
    fn test_no_matching_overload() {
        let catalog = Catalog::new();
        assert_eq!(
            resolve_function(&catalog, &BuiltinCoercion, "lower", &[BOOL_OID], false),
            Err(FuncLookupError::NotFound)
        );
        assert_eq!(
            resolve_function(&catalog, &BuiltinCoercion, "no_such_fn", &[], false),
            Err(FuncLookupError::NotFound)
        );
    }

    #[test]
    fn test_within_group_selects_ordered_set_candidates() {
        let catalog = Catalog::new();
        let rank = resolve_function(&catalog, &BuiltinCoercion, "rank", &[INT4_OID], true).unwrap();
        assert_eq!(rank.kind, FunctionKind::Hypothetical);
        let rank = resolve_function(&catalog, &BuiltinCoercion, "rank", &[], false).unwrap();
        assert_eq!(rank.kind, FunctionKind::Window);
    }

    #[test]
    fn test_window_and_aggregate_kinds_share_names() {
        let catalog = Catalog::new();
        let kinds: Vec<_> = catalog
            .lookup_functions("rank")
            .iter()
            .map(|f| f.kind)
            .collect();
        assert!(kinds.contains(&FunctionKind::Window));
        assert!(kinds.contains(&FunctionKind::Hypothetical));
    }
}
