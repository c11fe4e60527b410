//! Type modifier input/output routines

use serde::{Deserialize, Serialize};

use super::{Oid, TypeDef};
use crate::catalog::CatalogProvider;

/// Varlena header size folded into length-style modifiers
const VARHDRSZ: i32 = 4;

pub const NUMERIC_MAX_PRECISION: i32 = 1000;

/// Largest declared length for character types
const MAX_ATTR_SIZE: i32 = 10 * 1024 * 1024;

const MAX_TIME_PRECISION: i32 = 6;

/// Which modifier routine a type uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypmodRule {
    /// `numeric(p[,s])`
    Numeric,
    /// `varchar(n)`, `char(n)`
    CharLength,
    /// `time(p)`, `timestamp(p)`, `interval(p)`
    TimePrecision,
}

/// Run a type's modifier input routine on already-evaluated integer modifiers
pub fn typmod_in(ty: &TypeDef, mods: &[i32]) -> Result<i32, String> {
    let Some(rule) = ty.typmod else {
        return Err(format!("type modifier is not allowed for type \"{}\"", ty.name));
    };
    match rule {
        TypmodRule::Numeric => numeric_typmod_in(mods),
        TypmodRule::CharLength => char_typmod_in(&ty.name, mods),
        TypmodRule::TimePrecision => time_typmod_in(&ty.name, mods),
    }
}

fn numeric_typmod_in(mods: &[i32]) -> Result<i32, String> {
    match *mods {
        [precision, scale] => {
            if !(1..=NUMERIC_MAX_PRECISION).contains(&precision) {
                return Err(format!(
                    "NUMERIC precision {} must be between 1 and {}",
                    precision, NUMERIC_MAX_PRECISION
                ));
            }
            if scale < 0 || scale > precision {
                return Err(format!(
                    "NUMERIC scale {} must be between 0 and precision {}",
                    scale, precision
                ));
            }
            Ok(((precision << 16) | scale) + VARHDRSZ)
        }
        [precision] => {
            if !(1..=NUMERIC_MAX_PRECISION).contains(&precision) {
                return Err(format!(
                    "NUMERIC precision {} must be between 1 and {}",
                    precision, NUMERIC_MAX_PRECISION
                ));
            }
            Ok((precision << 16) + VARHDRSZ)
        }
        _ => Err("invalid NUMERIC type modifier".to_string()),
    }
}

fn char_typmod_in(name: &str, mods: &[i32]) -> Result<i32, String> {
    let [length] = *mods else {
        return Err("invalid type modifier".to_string());
    };
    let display = if name == "bpchar" { "char" } else { name };
    if length < 1 {
        return Err(format!("length for type {} must be at least 1", display));
    }
    if length > MAX_ATTR_SIZE {
        return Err(format!(
            "length for type {} cannot exceed {}",
            display, MAX_ATTR_SIZE
        ));
    }
    Ok(length + VARHDRSZ)
}

fn time_typmod_in(name: &str, mods: &[i32]) -> Result<i32, String> {
    let [precision] = *mods else {
        return Err("invalid type modifier".to_string());
    };
    if !(0..=MAX_TIME_PRECISION).contains(&precision) {
        return Err(format!(
            "{}({}) precision must be between 0 and {}",
            name.to_uppercase(),
            precision,
            MAX_TIME_PRECISION
        ));
    }
    Ok(precision)
}

/// Render a modifier the way the type's output routine does: `(p,s)`, `(n)`, `(p)`
pub fn typmod_out(rule: TypmodRule, typmod: i32) -> String {
    if typmod < 0 {
        return String::new();
    }
    match rule {
        TypmodRule::Numeric => {
            let tmp = typmod - VARHDRSZ;
            format!("({},{})", (tmp >> 16) & 0xffff, tmp & 0xffff)
        }
        TypmodRule::CharLength => format!("({})", typmod - VARHDRSZ),
        TypmodRule::TimePrecision => format!("({})", typmod),
    }
}

/// Decode a numeric modifier into `(precision, scale)`
pub fn numeric_precision_scale(typmod: i32) -> Option<(i32, i32)> {
    if typmod < VARHDRSZ {
        return None;
    }
    let tmp = typmod - VARHDRSZ;
    Some(((tmp >> 16) & 0xffff, tmp & 0xffff))
}

/// Render a type and modifier as SQL
pub fn format_type(catalog: &dyn CatalogProvider, oid: Oid, typmod: i32) -> String {
    let Some(ty) = catalog.type_by_oid(oid) else {
        return "???".to_string();
    };
    if let Some(elem) = ty.elem.filter(|_| ty.is_array()) {
        return format!("{}[]", format_type(catalog, elem, typmod));
    }
    let mods = match ty.typmod {
        Some(rule) => typmod_out(rule, typmod),
        None => String::new(),
    };
    let qualified = |name: &str| {
        if ty.schema == "pg_catalog" || ty.schema == "public" {
            name.to_string()
        } else {
            format!("{}.{}", ty.schema, name)
        }
    };
    match ty.name.as_str() {
        "int2" => "smallint".to_string(),
        "int4" => "integer".to_string(),
        "int8" => "bigint".to_string(),
        "float4" => "real".to_string(),
        "float8" => "double precision".to_string(),
        "bool" => "boolean".to_string(),
        "varchar" => format!("character varying{mods}"),
        "bpchar" => format!("character{mods}"),
        "numeric" => format!("numeric{mods}"),
        "timestamp" => format!("timestamp{mods} without time zone"),
        "timestamptz" => format!("timestamp{mods} with time zone"),
        "time" => format!("time{mods} without time zone"),
        "timetz" => format!("time{mods} with time zone"),
        "interval" => format!("interval{mods}"),
        other => format!("{}{}", qualified(other), mods),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::types::{NUMERIC_OID, TIMESTAMP_OID, VARCHAR_ARRAY_OID, VARCHAR_OID};
    use pretty_assertions::assert_eq;

    fn builtin(oid: Oid) -> TypeDef {
        crate::types::builtin_types()
            .into_iter()
            .find(|t| t.oid == oid)
            .unwrap()
    }

    #[test]
    fn test_numeric_typmod_round_trip() {
        let numeric = builtin(NUMERIC_OID);
        let typmod = typmod_in(&numeric, &[10, 2]).unwrap();
        assert_eq!(typmod, ((10 << 16) | 2) + 4);
        assert_eq!(numeric_precision_scale(typmod), Some((10, 2)));
        assert_eq!(typmod_out(TypmodRule::Numeric, typmod), "(10,2)");
    }

    #[test]
    fn test_numeric_bounds() {
        let numeric = builtin(NUMERIC_OID);
        assert!(typmod_in(&numeric, &[0]).is_err());
        assert!(typmod_in(&numeric, &[1001]).is_err());
        assert!(typmod_in(&numeric, &[5, 6]).is_err());
        assert!(typmod_in(&numeric, &[1, 2, 3]).is_err());
    }

    #[test]
    fn test_varchar_length() {
        let varchar = builtin(VARCHAR_OID);
        assert_eq!(typmod_in(&varchar, &[20]), Ok(24));
        assert_eq!(
            typmod_in(&varchar, &[0]),
            Err("length for type varchar must be at least 1".to_string())
        );
        assert!(typmod_in(&varchar, &[10_485_761]).is_err());
    }

    #[test]
    fn test_timestamp_precision() {
        let ts = builtin(TIMESTAMP_OID);
        assert_eq!(typmod_in(&ts, &[3]), Ok(3));
        assert!(typmod_in(&ts, &[7]).is_err());
    }

    #[test]
    fn test_modifier_not_allowed() {
        let int4 = builtin(crate::types::INT4_OID);
        assert_eq!(
            typmod_in(&int4, &[4]),
            Err("type modifier is not allowed for type \"int4\"".to_string())
        );
    }

    #[test]
    fn test_format_type() {
        let catalog = Catalog::new();
        assert_eq!(format_type(&catalog, NUMERIC_OID, ((10 << 16) | 2) + 4), "numeric(10,2)");
        assert_eq!(format_type(&catalog, VARCHAR_ARRAY_OID, 14), "character varying(10)[]");
        assert_eq!(
            format_type(&catalog, TIMESTAMP_OID, 3),
            "timestamp(3) without time zone"
        );
        assert_eq!(format_type(&catalog, crate::types::INT4_OID, -1), "integer");
    }
}
