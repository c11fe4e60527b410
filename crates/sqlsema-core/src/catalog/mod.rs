//! Catalog collaborator
//!
//! Analysis consults the catalog only through [`CatalogProvider`]. The
//! in-memory [`Catalog`] implements it and is usually populated from DDL by
//! [`SchemaBuilder`].

mod builder;
mod functions;
mod memory;
mod operators;

pub use builder::{split_sql_statements, SchemaBuilder};
pub use functions::{
    builtin_functions, resolve_function, FuncLookupError, FunctionDef, FunctionKind, ReturnType,
};
pub use memory::{
    Catalog, ColumnDef, ConstraintDef, ConstraintKind, DefaultValue, IdentityKind, PackageDef,
    PackageMember, RelationDef,
};
pub use operators::{resolve_operator, OperatorResolution};

use serde::{Deserialize, Serialize};

use crate::types::{Oid, TypeDef};

/// Qualified name (schema.object or just object)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Parse from a dotted name like "schema.table" or just "table"
    pub fn parse(s: &str) -> Self {
        if let Some((schema, name)) = s.split_once('.') {
            Self::with_schema(schema, name)
        } else {
            Self::new(s)
        }
    }
}

impl std::fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}.{}", schema, self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Relation lock strength requested when a relation is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LockMode {
    /// Plain reads
    AccessShare,
    /// Rows will be locked with FOR UPDATE / FOR SHARE
    RowShare,
    /// DML target
    RowExclusive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelKind {
    Table,
    View,
    MatView,
    Foreign,
    CompositeType,
}

impl RelKind {
    /// Whether the relation has physical tuples, and so system columns
    pub fn has_storage(&self) -> bool {
        matches!(self, RelKind::Table | RelKind::MatView)
    }
}

/// Read-only catalog lookups used by analysis
pub trait CatalogProvider {
    /// Schema that unqualified relation and type names resolve in
    fn default_schema(&self) -> &str;

    /// Open a relation, requesting `lock`
    fn open_relation(&self, name: &QualifiedName, lock: LockMode) -> Option<&RelationDef>;

    fn relation(&self, oid: Oid) -> Option<&RelationDef>;

    fn lookup_type(&self, name: &QualifiedName) -> Option<&TypeDef>;

    fn type_by_oid(&self, oid: Oid) -> Option<&TypeDef>;

    /// Every overload of a function name
    fn lookup_functions(&self, name: &str) -> Vec<&FunctionDef>;

    /// The primary-key constraint proving every column of `relid` functionally
    /// dependent on the grouped attribute numbers, if there is one
    fn functional_dependency(&self, relid: Oid, grouped: &[i32]) -> Option<Oid>;

    fn lookup_package(&self, name: &QualifiedName) -> Option<&PackageDef>;

    fn schema_exists(&self, name: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_name_parse() {
        let name = QualifiedName::parse("users");
        assert_eq!(name.schema, None);
        assert_eq!(name.name, "users");

        let name = QualifiedName::parse("public.users");
        assert_eq!(name.schema, Some("public".to_string()));
        assert_eq!(name.to_string(), "public.users");
    }
}
