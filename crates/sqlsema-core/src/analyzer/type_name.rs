//! Type-name resolution: qualified names, package members, `%TYPE`,
//! `%ROWTYPE`, array bounds and type modifiers

use serde::Serialize;
use tracing::debug;

use super::state::{error_at, Transformer};
use crate::catalog::{LockMode, PackageMember, QualifiedName, RelKind};
use crate::dialect::SqlDialect;
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::syntax::lower::parse_sql;
use crate::syntax::{Literal, RawExpr, RawStmt, SelectBody, TypeName};
use crate::types::{canonical_type_name, typmod_in, Oid, TypeDef, TypeKind, UNDEFINED_OID};

/// A resolved type reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedType {
    pub oid: Oid,
    pub typmod: i32,
    pub collation: Oid,
}

/// Parse a type written as text, e.g. `numeric(10,2)` or `t.col%TYPE`
pub(crate) fn type_name_from_str(text: &str) -> Result<TypeName> {
    let invalid = || {
        Diagnostic::error(
            DiagnosticKind::SyntaxError,
            format!("invalid type name \"{}\"", text),
        )
    };
    let trimmed = text.trim();
    let (base, pct_type, pct_rowtype) = match pct_suffix(trimmed, "%rowtype") {
        Some(base) => (base, false, true),
        None => match pct_suffix(trimmed, "%type") {
            Some(base) => (base, true, false),
            None => (trimmed, false, false),
        },
    };
    let lowered = parse_sql(&format!("SELECT NULL::{}", base), SqlDialect::PostgreSQL)
        .map_err(|_| invalid())?;
    let [RawStmt::Select(stmt)] = lowered.statements.as_slice() else {
        return Err(invalid());
    };
    let SelectBody::Simple(select) = &stmt.body else {
        return Err(invalid());
    };
    match select.targets.as_slice() {
        [target] => match &target.val {
            RawExpr::TypeCast { type_name, .. } => Ok(TypeName {
                pct_type,
                pct_rowtype,
                ..type_name.clone()
            }),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

fn pct_suffix<'t>(text: &'t str, suffix: &str) -> Option<&'t str> {
    let n = text.len().checked_sub(suffix.len())?;
    (text.is_char_boundary(n) && text[n..].eq_ignore_ascii_case(suffix)).then(|| text[..n].trim_end())
}

impl Transformer<'_> {
    pub fn resolve_type_name(&mut self, type_name: &TypeName) -> Result<ResolvedType> {
        self.guarded(|t| t.resolve_type_name_inner(type_name))
    }

    fn resolve_type_name_inner(&mut self, type_name: &TypeName) -> Result<ResolvedType> {
        let (mut oid, mut typmod) = if type_name.pct_rowtype {
            (self.lookup_rowtype(type_name)?, -1)
        } else if type_name.pct_type {
            self.lookup_pct_type(type_name)?
        } else {
            match self.lookup_named_type(type_name)? {
                Some(found) => found,
                None if self.options.undefined_types => {
                    return Ok(self.undefined_type(type_name));
                }
                None => {
                    return Err(error_at(
                        DiagnosticKind::UndefinedObject,
                        format!("type \"{}\" does not exist", type_name.dotted()),
                        type_name.loc,
                    ))
                }
            }
        };

        if oid == UNDEFINED_OID {
            return Ok(ResolvedType {
                oid,
                typmod: -1,
                collation: 0,
            });
        }

        let def = self.catalog.type_by_oid(oid).cloned().ok_or_else(|| {
            error_at(
                DiagnosticKind::UndefinedObject,
                format!("cache lookup failed for type {}", oid),
                type_name.loc,
            )
        })?;
        if def.kind == TypeKind::Shell {
            return Err(error_at(
                DiagnosticKind::UndefinedObject,
                format!("type \"{}\" is only a shell", type_name.dotted()),
                type_name.loc,
            ));
        }

        if !type_name.typmods.is_empty() {
            typmod = self.evaluate_typmods(type_name, &def)?;
        }

        if !type_name.array_bounds.is_empty() && !def.is_array() {
            oid = def.array.ok_or_else(|| {
                error_at(
                    DiagnosticKind::UndefinedObject,
                    format!(
                        "could not find array type for data type {}",
                        self.type_name(def.oid, -1)
                    ),
                    type_name.loc,
                )
            })?;
        }

        debug!(name = %type_name.dotted(), oid, typmod, "resolved type name");
        Ok(ResolvedType {
            oid,
            typmod,
            collation: self.type_collation(oid),
        })
    }

    fn undefined_type(&mut self, type_name: &TypeName) -> ResolvedType {
        let name = type_name.dotted();
        self.warn(
            Diagnostic::warning(
                DiagnosticKind::UndefinedObject,
                format!("Type {} does not exist.", name),
            )
            .at(type_name.loc.span()),
        );
        if !self.type_deps.contains(&name) {
            self.type_deps.push(name);
        }
        ResolvedType {
            oid: UNDEFINED_OID,
            typmod: -1,
            collation: 0,
        }
    }

    /// Plain and qualified names: `t`, `schema.t`, `package.t`, `schema.package.t`
    fn lookup_named_type(&self, type_name: &TypeName) -> Result<Option<(Oid, i32)>> {
        let names = &type_name.names;
        let found = match names.as_slice() {
            [name] => {
                let canonical = canonical_type_name(name);
                match self.catalog.lookup_type(&QualifiedName::new(canonical)) {
                    Some(ty) => Some((ty.oid, -1)),
                    None => self
                        .options
                        .current_package
                        .as_deref()
                        .and_then(|pkg| self.package_type(None, pkg, name)),
                }
            }
            [first, name] => {
                if self.catalog.schema_exists(first) {
                    self.catalog
                        .lookup_type(&QualifiedName::with_schema(first, canonical_type_name(name)))
                        .map(|ty| (ty.oid, -1))
                        .or_else(|| self.package_type(None, first, name))
                } else {
                    self.package_type(None, first, name)
                }
            }
            [schema, package, name] => self.package_type(Some(schema), package, name),
            _ => {
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    format!(
                        "improper qualified name (too many dotted names): {}",
                        type_name.dotted()
                    ),
                    type_name.loc,
                ))
            }
        };
        Ok(found)
    }

    fn package_member<'p>(
        &'p self,
        schema: Option<&str>,
        package: &str,
        member: &str,
        variables: bool,
    ) -> Option<&'p PackageMember> {
        let name = match schema {
            Some(s) => QualifiedName::with_schema(s, package),
            None => QualifiedName::new(package),
        };
        let pkg = self.catalog.lookup_package(&name)?;
        let (public, private) = if variables {
            (&pkg.public_variables, &pkg.private_variables)
        } else {
            (&pkg.public_types, &pkg.private_types)
        };
        public.get(member).or_else(|| {
            let own = self.options.current_package.as_deref() == Some(pkg.name.as_str());
            if own {
                private.get(member)
            } else {
                None
            }
        })
    }

    fn package_type(&self, schema: Option<&String>, package: &str, name: &str) -> Option<(Oid, i32)> {
        self.package_member(schema.map(String::as_str), package, name, false)
            .map(|m| (m.type_oid, m.typmod))
    }

    fn package_variable(&self, schema: Option<&str>, package: &str, name: &str) -> Option<(Oid, i32)> {
        self.package_member(schema, package, name, true)
            .map(|m| (m.type_oid, m.typmod))
    }

    fn lookup_rowtype(&self, type_name: &TypeName) -> Result<Oid> {
        let qualified = match type_name.names.as_slice() {
            [name] => QualifiedName::new(name),
            [schema, name] => QualifiedName::with_schema(schema, name),
            _ => {
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    format!(
                        "improper %ROWTYPE reference (too many dotted names): {}",
                        type_name.dotted()
                    ),
                    type_name.loc,
                ))
            }
        };
        match self.catalog.open_relation(&qualified, LockMode::AccessShare) {
            Some(rel) if matches!(rel.kind, RelKind::Table | RelKind::MatView) => Ok(rel.rowtype),
            _ => Err(error_at(
                DiagnosticKind::TableNotFound,
                format!(
                    "relation \"{}\" referenced by %ROWTYPE does not exist",
                    type_name.dotted()
                ),
                type_name.loc,
            )),
        }
    }

    /// `%TYPE`: the type of a table column or a package variable
    fn lookup_pct_type(&self, type_name: &TypeName) -> Result<(Oid, i32)> {
        let dotted = type_name.dotted();
        let loc = type_name.loc;
        let (relation, column, package) = match type_name.names.as_slice() {
            [name] => {
                let variable = self
                    .options
                    .current_package
                    .as_deref()
                    .and_then(|pkg| self.package_variable(None, pkg, name));
                return variable.ok_or_else(|| {
                    error_at(
                        DiagnosticKind::SyntaxError,
                        format!("improper %TYPE reference (too few dotted names): {}", dotted),
                        loc,
                    )
                });
            }
            [rel, col] => (QualifiedName::new(rel), col, (None, rel.as_str())),
            [schema, rel, col] => (
                QualifiedName::with_schema(schema, rel),
                col,
                (Some(schema.as_str()), rel.as_str()),
            ),
            _ => {
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    format!("improper %TYPE reference (too many dotted names): {}", dotted),
                    loc,
                ))
            }
        };

        let Some(rel) = self.catalog.open_relation(&relation, LockMode::AccessShare) else {
            return self
                .package_variable(package.0, package.1, column)
                .ok_or_else(|| {
                    error_at(
                        DiagnosticKind::TableNotFound,
                        format!("relation \"{}\" does not exist", relation),
                        loc,
                    )
                });
        };
        let col = rel
            .attnum(column)
            .and_then(|attno| rel.column(attno))
            .ok_or_else(|| {
                error_at(
                    DiagnosticKind::ColumnNotFound,
                    format!(
                        "column \"{}\" of relation \"{}\" does not exist",
                        column, relation.name
                    ),
                    loc,
                )
            })?;
        Ok((col.type_oid, col.typmod))
    }

    /// Run the type's modifier input routine over the written modifiers
    fn evaluate_typmods(&self, type_name: &TypeName, def: &TypeDef) -> Result<i32> {
        if def.typmod.is_none() {
            return Err(error_at(
                DiagnosticKind::SyntaxError,
                format!("type modifier is not allowed for type \"{}\"", type_name.dotted()),
                type_name.loc,
            ));
        }
        let mut mods = Vec::with_capacity(type_name.typmods.len());
        for raw in &type_name.typmods {
            let value = match raw {
                RawExpr::Const(Literal::Integer(n), _) => i32::try_from(*n).ok(),
                RawExpr::Const(Literal::String(s) | Literal::Numeric(s), _) => s.trim().parse().ok(),
                RawExpr::ColumnRef(c) if c.fields.len() == 1 => None,
                other => {
                    return Err(error_at(
                        DiagnosticKind::SyntaxError,
                        "type modifiers must be simple constants or identifiers",
                        other.location(),
                    ))
                }
            };
            let Some(value) = value else {
                return Err(error_at(
                    DiagnosticKind::InvalidParameterValue,
                    "invalid type modifier",
                    raw.location(),
                ));
            };
            mods.push(value);
        }
        typmod_in(def, &mods).map_err(|message| {
            error_at(DiagnosticKind::InvalidParameterValue, message, type_name.loc)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerOptions;
    use crate::catalog::{Catalog, ColumnDef, PackageDef, PackageMember};
    use crate::types::{
        numeric_precision_scale, BuiltinCoercion, INT4_ARRAY_OID, INT4_OID, NUMERIC_OID,
        TEXT_OID, VARCHAR_OID,
    };
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.create_relation(
            &QualifiedName::new("users"),
            RelKind::Table,
            vec![
                ColumnDef::new("id", INT4_OID, -1),
                ColumnDef::new("name", VARCHAR_OID, 54).collatable(),
            ],
        );
        catalog.create_relation(
            &QualifiedName::new("user_names"),
            RelKind::View,
            vec![ColumnDef::new("name", TEXT_OID, -1)],
        );
        catalog.create_shell_type(&QualifiedName::new("later"));
        let mut pkg = PackageDef::new("public", "pkg");
        pkg.public_types.insert(
            "money_t".to_string(),
            PackageMember {
                type_oid: NUMERIC_OID,
                typmod: -1,
            },
        );
        pkg.private_types.insert(
            "secret_t".to_string(),
            PackageMember {
                type_oid: TEXT_OID,
                typmod: -1,
            },
        );
        pkg.public_variables.insert(
            "counter".to_string(),
            PackageMember {
                type_oid: INT4_OID,
                typmod: -1,
            },
        );
        catalog.add_package(pkg);
        catalog
    }

    fn resolve_with(options: &AnalyzerOptions, text: &str) -> (Result<ResolvedType>, Vec<Diagnostic>) {
        let catalog = catalog();
        let mut t = Transformer::new(&catalog, &BuiltinCoercion, options);
        let result = type_name_from_str(text).and_then(|tn| t.resolve_type_name(&tn));
        (result, t.warnings)
    }

    fn resolve(text: &str) -> Result<ResolvedType> {
        resolve_with(&AnalyzerOptions::default(), text).0
    }

    #[test]
    fn test_numeric_typmod_round_trip() {
        let resolved = resolve("numeric(10,2)").unwrap();
        assert_eq!(resolved.oid, NUMERIC_OID);
        assert_eq!(numeric_precision_scale(resolved.typmod), Some((10, 2)));
    }

    #[test]
    fn test_array_bounds_wrap_element_type() {
        let resolved = resolve("integer[]").unwrap();
        assert_eq!(resolved.oid, INT4_ARRAY_OID);
    }

    #[test]
    fn test_pct_type_of_column() {
        let resolved = resolve("users.name%TYPE").unwrap();
        assert_eq!(resolved.oid, VARCHAR_OID);
        assert_eq!(resolved.typmod, 54);

        let err = resolve("users.missing%TYPE").unwrap_err();
        assert_eq!(err.message, "column \"missing\" of relation \"users\" does not exist");

        let err = resolve("name%TYPE").unwrap_err();
        assert_eq!(err.message, "improper %TYPE reference (too few dotted names): name");
    }

    #[test]
    fn test_pct_rowtype_rejects_views() {
        assert!(resolve("users%ROWTYPE").is_ok());
        let err = resolve("user_names%ROWTYPE").unwrap_err();
        assert_eq!(
            err.message,
            "relation \"user_names\" referenced by %ROWTYPE does not exist"
        );
    }

    #[test]
    fn test_shell_type_is_rejected() {
        let err = resolve("later").unwrap_err();
        assert_eq!(err.message, "type \"later\" is only a shell");
    }

    #[test]
    fn test_modifier_on_plain_type() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = Transformer::new(&catalog, &BuiltinCoercion, &options);
        let type_name = TypeName {
            typmods: vec![RawExpr::int(3)],
            ..TypeName::new("text")
        };
        let err = t.resolve_type_name(&type_name).unwrap_err();
        assert_eq!(err.message, "type modifier is not allowed for type \"text\"");
        assert_eq!(err.kind, DiagnosticKind::SyntaxError);
    }

    #[test]
    fn test_package_members_public_before_private() {
        assert_eq!(resolve("pkg.money_t").unwrap().oid, NUMERIC_OID);
        assert!(resolve("pkg.secret_t").is_err());

        let options = AnalyzerOptions {
            current_package: Some("pkg".to_string()),
            ..Default::default()
        };
        assert_eq!(resolve_with(&options, "pkg.secret_t").0.unwrap().oid, TEXT_OID);
        assert_eq!(resolve_with(&options, "counter%TYPE").0.unwrap().oid, INT4_OID);
    }

    #[test]
    fn test_undefined_type_modes() {
        let err = resolve("nosuchtype").unwrap_err();
        assert_eq!(err.message, "type \"nosuchtype\" does not exist");

        let options = AnalyzerOptions {
            undefined_types: true,
            ..Default::default()
        };
        let (result, warnings) = resolve_with(&options, "nosuchtype");
        assert_eq!(result.unwrap().oid, UNDEFINED_OID);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Type nosuchtype does not exist.");
    }
}
