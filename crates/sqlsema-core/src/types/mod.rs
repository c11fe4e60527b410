//! SQL type system
//!
//! Types are identified by OID. The builtin set mirrors the PostgreSQL
//! catalog closely enough that type modifiers, array types and categories
//! behave the same way; user-defined enum and composite types are allocated
//! by the catalog.

mod coerce;
mod typmod;

pub use coerce::{BuiltinCoercion, CoercionContext, CoercionService};
pub use typmod::{
    format_type, numeric_precision_scale, typmod_in, typmod_out, TypmodRule,
    NUMERIC_MAX_PRECISION,
};

use serde::{Deserialize, Serialize};

/// Object identifier
pub type Oid = u32;

pub const INVALID_OID: Oid = 0;

pub const BOOL_OID: Oid = 16;
pub const BYTEA_OID: Oid = 17;
pub const CHAR_OID: Oid = 18;
pub const NAME_OID: Oid = 19;
pub const INT8_OID: Oid = 20;
pub const INT2_OID: Oid = 21;
pub const INT4_OID: Oid = 23;
pub const TEXT_OID: Oid = 25;
pub const OID_OID: Oid = 26;
pub const TID_OID: Oid = 27;
pub const XID_OID: Oid = 28;
pub const CID_OID: Oid = 29;
pub const JSON_OID: Oid = 114;
pub const FLOAT4_OID: Oid = 700;
pub const FLOAT8_OID: Oid = 701;
pub const UNKNOWN_OID: Oid = 705;
pub const BPCHAR_OID: Oid = 1042;
pub const VARCHAR_OID: Oid = 1043;
pub const DATE_OID: Oid = 1082;
pub const TIME_OID: Oid = 1083;
pub const TIMESTAMP_OID: Oid = 1114;
pub const TIMESTAMPTZ_OID: Oid = 1184;
pub const INTERVAL_OID: Oid = 1186;
pub const TIMETZ_OID: Oid = 1266;
pub const NUMERIC_OID: Oid = 1700;
pub const REGCLASS_OID: Oid = 2205;
pub const RECORD_OID: Oid = 2249;
pub const ANY_OID: Oid = 2276;
pub const ANYARRAY_OID: Oid = 2277;
pub const VOID_OID: Oid = 2278;
pub const ANYELEMENT_OID: Oid = 2283;
pub const UUID_OID: Oid = 2950;
pub const JSONB_OID: Oid = 3802;
/// Placeholder returned for unresolved type names in undefined-tolerant mode
pub const UNDEFINED_OID: Oid = 4408;

pub const BOOL_ARRAY_OID: Oid = 1000;
pub const BYTEA_ARRAY_OID: Oid = 1001;
pub const INT2_ARRAY_OID: Oid = 1005;
pub const INT4_ARRAY_OID: Oid = 1007;
pub const TEXT_ARRAY_OID: Oid = 1009;
pub const BPCHAR_ARRAY_OID: Oid = 1014;
pub const VARCHAR_ARRAY_OID: Oid = 1015;
pub const INT8_ARRAY_OID: Oid = 1016;
pub const FLOAT4_ARRAY_OID: Oid = 1021;
pub const FLOAT8_ARRAY_OID: Oid = 1022;
pub const TIMESTAMP_ARRAY_OID: Oid = 1115;
pub const DATE_ARRAY_OID: Oid = 1182;
pub const TIME_ARRAY_OID: Oid = 1183;
pub const TIMESTAMPTZ_ARRAY_OID: Oid = 1185;
pub const INTERVAL_ARRAY_OID: Oid = 1187;
pub const NUMERIC_ARRAY_OID: Oid = 1231;
pub const UUID_ARRAY_OID: Oid = 2951;
pub const JSON_ARRAY_OID: Oid = 199;
pub const JSONB_ARRAY_OID: Oid = 3807;

pub const DEFAULT_COLLATION_OID: Oid = 100;
pub const C_COLLATION_OID: Oid = 950;
pub const POSIX_COLLATION_OID: Oid = 951;

/// First OID handed out to user-defined objects
pub const FIRST_NORMAL_OID: Oid = 16384;

/// Type category, used to drive implicit coercion decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCategory {
    Boolean,
    Numeric,
    String,
    DateTime,
    Timespan,
    Array,
    Composite,
    Enum,
    UserDefined,
    Pseudo,
    Unknown,
}

/// How a type is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeKind {
    Base,
    Composite,
    Enum,
    Domain,
    Pseudo,
    /// Declared but not yet defined (`CREATE TYPE x;`)
    Shell,
}

/// Catalog entry for a type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDef {
    pub oid: Oid,
    pub name: String,
    pub schema: String,
    pub kind: TypeKind,
    pub category: TypeCategory,
    /// Preferred type within its category
    pub preferred: bool,
    /// Element type, for array types
    pub elem: Option<Oid>,
    /// Array type whose element is this type
    pub array: Option<Oid>,
    /// Relation backing a composite type
    pub relid: Option<Oid>,
    /// Type modifier input/output routine
    pub typmod: Option<TypmodRule>,
    pub collatable: bool,
    /// Enum labels
    pub labels: Vec<String>,
}

impl TypeDef {
    pub fn base(oid: Oid, name: &str, category: TypeCategory) -> Self {
        Self {
            oid,
            name: name.to_string(),
            schema: "pg_catalog".to_string(),
            kind: TypeKind::Base,
            category,
            preferred: false,
            elem: None,
            array: None,
            relid: None,
            typmod: None,
            collatable: false,
            labels: Vec::new(),
        }
    }

    fn preferred(mut self) -> Self {
        self.preferred = true;
        self
    }

    fn collatable(mut self) -> Self {
        self.collatable = true;
        self
    }

    fn with_array(mut self, array: Oid) -> Self {
        self.array = Some(array);
        self
    }

    fn with_typmod(mut self, rule: TypmodRule) -> Self {
        self.typmod = Some(rule);
        self
    }

    fn pseudo(oid: Oid, name: &str) -> Self {
        let mut def = Self::base(oid, name, TypeCategory::Pseudo);
        def.kind = TypeKind::Pseudo;
        def
    }

    /// The array type for an element type
    pub fn array_of(oid: Oid, elem: &TypeDef) -> Self {
        let mut def = Self::base(oid, &format!("_{}", elem.name), TypeCategory::Array);
        def.schema = elem.schema.clone();
        def.elem = Some(elem.oid);
        def.typmod = elem.typmod;
        def.collatable = elem.collatable;
        def
    }

    pub fn is_array(&self) -> bool {
        self.elem.is_some() && self.category == TypeCategory::Array
    }
}

/// The builtin type table, element types before their arrays
pub fn builtin_types() -> Vec<TypeDef> {
    use TypeCategory::*;

    let elements = vec![
        TypeDef::base(BOOL_OID, "bool", Boolean)
            .preferred()
            .with_array(BOOL_ARRAY_OID),
        TypeDef::base(BYTEA_OID, "bytea", UserDefined).with_array(BYTEA_ARRAY_OID),
        TypeDef::base(CHAR_OID, "char", String).collatable(),
        TypeDef::base(NAME_OID, "name", String).collatable(),
        TypeDef::base(INT8_OID, "int8", Numeric).with_array(INT8_ARRAY_OID),
        TypeDef::base(INT2_OID, "int2", Numeric).with_array(INT2_ARRAY_OID),
        TypeDef::base(INT4_OID, "int4", Numeric).with_array(INT4_ARRAY_OID),
        TypeDef::base(TEXT_OID, "text", String)
            .preferred()
            .collatable()
            .with_array(TEXT_ARRAY_OID),
        TypeDef::base(OID_OID, "oid", Numeric),
        TypeDef::base(TID_OID, "tid", UserDefined),
        TypeDef::base(XID_OID, "xid", UserDefined),
        TypeDef::base(CID_OID, "cid", UserDefined),
        TypeDef::base(JSON_OID, "json", UserDefined).with_array(JSON_ARRAY_OID),
        TypeDef::base(FLOAT4_OID, "float4", Numeric).with_array(FLOAT4_ARRAY_OID),
        TypeDef::base(FLOAT8_OID, "float8", Numeric)
            .preferred()
            .with_array(FLOAT8_ARRAY_OID),
        TypeDef::base(BPCHAR_OID, "bpchar", String)
            .collatable()
            .with_array(BPCHAR_ARRAY_OID)
            .with_typmod(TypmodRule::CharLength),
        TypeDef::base(VARCHAR_OID, "varchar", String)
            .collatable()
            .with_array(VARCHAR_ARRAY_OID)
            .with_typmod(TypmodRule::CharLength),
        TypeDef::base(DATE_OID, "date", DateTime).with_array(DATE_ARRAY_OID),
        TypeDef::base(TIME_OID, "time", DateTime)
            .with_array(TIME_ARRAY_OID)
            .with_typmod(TypmodRule::TimePrecision),
        TypeDef::base(TIMESTAMP_OID, "timestamp", DateTime)
            .with_array(TIMESTAMP_ARRAY_OID)
            .with_typmod(TypmodRule::TimePrecision),
        TypeDef::base(TIMESTAMPTZ_OID, "timestamptz", DateTime)
            .preferred()
            .with_array(TIMESTAMPTZ_ARRAY_OID)
            .with_typmod(TypmodRule::TimePrecision),
        TypeDef::base(INTERVAL_OID, "interval", Timespan)
            .preferred()
            .with_array(INTERVAL_ARRAY_OID)
            .with_typmod(TypmodRule::TimePrecision),
        TypeDef::base(TIMETZ_OID, "timetz", DateTime).with_typmod(TypmodRule::TimePrecision),
        TypeDef::base(NUMERIC_OID, "numeric", Numeric)
            .with_array(NUMERIC_ARRAY_OID)
            .with_typmod(TypmodRule::Numeric),
        TypeDef::base(REGCLASS_OID, "regclass", Numeric),
        TypeDef::base(UUID_OID, "uuid", UserDefined).with_array(UUID_ARRAY_OID),
        TypeDef::base(JSONB_OID, "jsonb", UserDefined).with_array(JSONB_ARRAY_OID),
    ];

    let arrays: Vec<TypeDef> = elements
        .iter()
        .filter_map(|elem| elem.array.map(|array| TypeDef::array_of(array, elem)))
        .collect();
    let mut types = elements;
    types.extend(arrays);

    let mut unknown = TypeDef::pseudo(UNKNOWN_OID, "unknown");
    unknown.category = Unknown;
    types.push(unknown);
    types.push(TypeDef::pseudo(RECORD_OID, "record"));
    types.push(TypeDef::pseudo(ANY_OID, "any"));
    types.push(TypeDef::pseudo(ANYARRAY_OID, "anyarray"));
    types.push(TypeDef::pseudo(ANYELEMENT_OID, "anyelement"));
    types.push(TypeDef::pseudo(VOID_OID, "void"));
    types.push(TypeDef::pseudo(UNDEFINED_OID, "undefined"));
    types
}

/// Map SQL-standard spellings to catalog type names
pub fn canonical_type_name(name: &str) -> &str {
    match name {
        "int" | "integer" | "serial" | "serial4" => "int4",
        "smallint" | "smallserial" | "serial2" => "int2",
        "bigint" | "bigserial" | "serial8" => "int8",
        "real" => "float4",
        "double precision" | "float" => "float8",
        "decimal" | "dec" | "number" => "numeric",
        "boolean" => "bool",
        "character varying" | "varchar2" | "nvarchar2" => "varchar",
        "character" | "char" | "nchar" => "bpchar",
        "timestamp with time zone" => "timestamptz",
        "timestamp without time zone" => "timestamp",
        "time with time zone" => "timetz",
        "time without time zone" => "time",
        other => other,
    }
}

/// Whether an OID is one of the polymorphic pseudo types
pub fn is_polymorphic(oid: Oid) -> bool {
    matches!(oid, ANY_OID | ANYARRAY_OID | ANYELEMENT_OID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_arrays_point_back_to_elements() {
        let types = builtin_types();
        let int4_array = types.iter().find(|t| t.oid == INT4_ARRAY_OID).unwrap();
        assert_eq!(int4_array.elem, Some(INT4_OID));
        assert_eq!(int4_array.name, "_int4");
        assert!(int4_array.is_array());

        let int4 = types.iter().find(|t| t.oid == INT4_OID).unwrap();
        assert_eq!(int4.array, Some(INT4_ARRAY_OID));
    }

    #[test]
    fn test_oids_are_unique() {
        let types = builtin_types();
        let mut oids: Vec<_> = types.iter().map(|t| t.oid).collect();
        oids.sort_unstable();
        oids.dedup();
        assert_eq!(oids.len(), types.len());
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_type_name("integer"), "int4");
        assert_eq!(canonical_type_name("character varying"), "varchar");
        assert_eq!(canonical_type_name("mood"), "mood");
    }
}
