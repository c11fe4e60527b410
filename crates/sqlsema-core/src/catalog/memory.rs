//! In-memory catalog - stores relations, types, functions and packages

use indexmap::IndexMap;
use serde::Serialize;
use tracing::debug;

use super::functions::{builtin_functions, FunctionDef};
use super::{CatalogProvider, LockMode, QualifiedName, RelKind};
use crate::types::{
    builtin_types, Oid, TypeCategory, TypeDef, TypeKind, DEFAULT_COLLATION_OID, FIRST_NORMAL_OID,
    INVALID_OID,
};

/// Schema catalog - holds all relation, type and package information
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    /// Default schema name (e.g., "public" for PostgreSQL)
    pub default_schema: String,
    pub schemas: Vec<String>,
    relations: IndexMap<Oid, RelationDef>,
    #[serde(skip)]
    relation_names: IndexMap<(String, String), Oid>,
    #[serde(skip)]
    types: IndexMap<Oid, TypeDef>,
    #[serde(skip)]
    type_names: IndexMap<(String, String), Oid>,
    #[serde(skip)]
    functions: IndexMap<String, Vec<FunctionDef>>,
    packages: IndexMap<String, PackageDef>,
    next_oid: Oid,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Catalog {
    pub fn new() -> Self {
        let mut catalog = Self {
            default_schema: "public".to_string(),
            schemas: vec!["pg_catalog".to_string(), "public".to_string()],
            relations: IndexMap::new(),
            relation_names: IndexMap::new(),
            types: IndexMap::new(),
            type_names: IndexMap::new(),
            functions: IndexMap::new(),
            packages: IndexMap::new(),
            next_oid: FIRST_NORMAL_OID,
        };
        for ty in builtin_types() {
            catalog.register_type(ty);
        }
        for func in builtin_functions() {
            catalog.register_function(func);
        }
        catalog
    }

    pub fn allocate_oid(&mut self) -> Oid {
        let oid = self.next_oid;
        self.next_oid += 1;
        oid
    }

    fn schema_of(&self, name: &QualifiedName) -> String {
        name.schema
            .clone()
            .unwrap_or_else(|| self.default_schema.clone())
    }

    /// Create the schema if it does not exist yet
    pub fn ensure_schema(&mut self, name: &str) {
        if !self.schemas.iter().any(|s| s == name) {
            self.schemas.push(name.to_string());
        }
    }

    pub fn register_type(&mut self, ty: TypeDef) {
        self.type_names
            .insert((ty.schema.clone(), ty.name.clone()), ty.oid);
        self.types.insert(ty.oid, ty);
    }

    pub fn register_function(&mut self, func: FunctionDef) {
        self.functions
            .entry(func.name.clone())
            .or_default()
            .push(func);
    }

    /// Allocate a user type with its array type; returns the element type's OID
    fn create_type(&mut self, name: &QualifiedName, build: impl FnOnce(Oid, &str) -> TypeDef) -> Oid {
        let schema = self.schema_of(name);
        self.ensure_schema(&schema);
        let oid = self.allocate_oid();
        let array_oid = self.allocate_oid();
        let mut ty = build(oid, &name.name);
        ty.schema = schema;
        ty.array = Some(array_oid);
        let array = TypeDef::array_of(array_oid, &ty);
        self.register_type(ty);
        self.register_type(array);
        oid
    }

    /// `CREATE TYPE name AS ENUM (...)`
    pub fn create_enum_type(&mut self, name: &QualifiedName, labels: Vec<String>) -> Oid {
        debug!(name = %name, labels = labels.len(), "creating enum type");
        self.create_type(name, |oid, n| {
            let mut ty = TypeDef::base(oid, n, TypeCategory::Enum);
            ty.kind = TypeKind::Enum;
            ty.labels = labels;
            ty
        })
    }

    /// `CREATE TYPE name;`
    pub fn create_shell_type(&mut self, name: &QualifiedName) -> Oid {
        let schema = self.schema_of(name);
        self.ensure_schema(&schema);
        let oid = self.allocate_oid();
        let mut ty = TypeDef::base(oid, &name.name, TypeCategory::UserDefined);
        ty.kind = TypeKind::Shell;
        ty.schema = schema;
        self.register_type(ty);
        oid
    }

    /// Create a relation and its row type. Returns the relation OID.
    pub fn create_relation(
        &mut self,
        name: &QualifiedName,
        kind: RelKind,
        columns: Vec<ColumnDef>,
    ) -> Oid {
        let schema = self.schema_of(name);
        self.ensure_schema(&schema);
        let relid = self.allocate_oid();
        let rowtype = self.create_type(name, |oid, n| {
            let mut ty = TypeDef::base(oid, n, TypeCategory::Composite);
            ty.kind = TypeKind::Composite;
            ty.relid = Some(relid);
            ty
        });
        debug!(name = %name, relid, ?kind, columns = columns.len(), "creating relation");
        let rel = RelationDef {
            oid: relid,
            name: QualifiedName::with_schema(schema.clone(), name.name.clone()),
            kind,
            columns,
            rowtype,
            constraints: Vec::new(),
        };
        self.relation_names
            .insert((schema, name.name.clone()), relid);
        self.relations.insert(relid, rel);
        relid
    }

    /// `CREATE TYPE name AS (...)`: a composite type backed by a relation
    pub fn create_composite_type(&mut self, name: &QualifiedName, columns: Vec<ColumnDef>) -> Oid {
        let relid = self.create_relation(name, RelKind::CompositeType, columns);
        self.relations
            .get(&relid)
            .map(|r| r.rowtype)
            .unwrap_or(INVALID_OID)
    }

    pub fn relation_mut(&mut self, oid: Oid) -> Option<&mut RelationDef> {
        self.relations.get_mut(&oid)
    }

    pub fn find_relation(&self, name: &QualifiedName) -> Option<&RelationDef> {
        let key = (self.schema_of(name), name.name.clone());
        self.relation_names
            .get(&key)
            .and_then(|oid| self.relations.get(oid))
    }

    /// Check if a relation exists
    pub fn relation_exists(&self, name: &QualifiedName) -> bool {
        self.find_relation(name).is_some()
    }

    pub fn rename_relation(&mut self, oid: Oid, new_name: &str) {
        let Some(rel) = self.relations.get_mut(&oid) else {
            return;
        };
        let schema = rel.name.schema.clone().unwrap_or_default();
        self.relation_names
            .shift_remove(&(schema.clone(), rel.name.name.clone()));
        rel.name.name = new_name.to_string();
        self.relation_names
            .insert((schema, new_name.to_string()), oid);
    }

    /// Add a constraint and return its OID
    pub fn add_constraint(
        &mut self,
        relid: Oid,
        name: Option<String>,
        kind: ConstraintKind,
        columns: Vec<String>,
    ) -> Option<Oid> {
        let oid = self.allocate_oid();
        let rel = self.relations.get_mut(&relid)?;
        let name = name.unwrap_or_else(|| {
            let suffix = match kind {
                ConstraintKind::PrimaryKey => "pkey".to_string(),
                ConstraintKind::Unique => format!("{}_key", columns.join("_")),
                ConstraintKind::ForeignKey { .. } => format!("{}_fkey", columns.join("_")),
                ConstraintKind::Check(_) => "check".to_string(),
            };
            format!("{}_{}", rel.name.name, suffix)
        });
        if kind == ConstraintKind::PrimaryKey {
            for col in rel.columns.iter_mut().filter(|c| columns.contains(&c.name)) {
                col.not_null = true;
            }
        }
        rel.constraints.push(ConstraintDef {
            oid,
            name,
            kind,
            columns,
        });
        Some(oid)
    }

    pub fn add_package(&mut self, mut package: PackageDef) -> Oid {
        let oid = self.allocate_oid();
        package.oid = oid;
        self.packages.insert(package.name.clone(), package);
        oid
    }

    pub fn relations(&self) -> impl Iterator<Item = &RelationDef> {
        self.relations.values()
    }

    /// User-defined types (OIDs at or above the first normal OID)
    pub fn user_types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values().filter(|t| t.oid >= FIRST_NORMAL_OID)
    }

    /// Get all relation names (for typo suggestions)
    pub fn relation_names(&self) -> Vec<QualifiedName> {
        self.relations.values().map(|r| r.name.clone()).collect()
    }
}

impl CatalogProvider for Catalog {
    fn default_schema(&self) -> &str {
        &self.default_schema
    }

    fn open_relation(&self, name: &QualifiedName, lock: LockMode) -> Option<&RelationDef> {
        let rel = self.find_relation(name)?;
        debug!(relation = %rel.name, ?lock, "opening relation");
        Some(rel)
    }

    fn relation(&self, oid: Oid) -> Option<&RelationDef> {
        self.relations.get(&oid)
    }

    fn lookup_type(&self, name: &QualifiedName) -> Option<&TypeDef> {
        let oid = match &name.schema {
            Some(schema) => self.type_names.get(&(schema.clone(), name.name.clone())),
            None => self
                .type_names
                .get(&(self.default_schema.clone(), name.name.clone()))
                .or_else(|| {
                    self.type_names
                        .get(&("pg_catalog".to_string(), name.name.clone()))
                }),
        }?;
        self.types.get(oid)
    }

    fn type_by_oid(&self, oid: Oid) -> Option<&TypeDef> {
        self.types.get(&oid)
    }

    fn lookup_functions(&self, name: &str) -> Vec<&FunctionDef> {
        self.functions
            .get(name)
            .map(|fs| fs.iter().collect())
            .unwrap_or_default()
    }

    fn functional_dependency(&self, relid: Oid, grouped: &[i32]) -> Option<Oid> {
        let rel = self.relations.get(&relid)?;
        rel.constraints
            .iter()
            .filter(|c| c.kind == ConstraintKind::PrimaryKey)
            .find(|c| {
                c.columns
                    .iter()
                    .all(|col| rel.attnum(col).is_some_and(|n| grouped.contains(&n)))
            })
            .map(|c| c.oid)
    }

    fn lookup_package(&self, name: &QualifiedName) -> Option<&PackageDef> {
        let pkg = self.packages.get(&name.name)?;
        match &name.schema {
            Some(schema) if *schema != pkg.schema => None,
            _ => Some(pkg),
        }
    }

    fn schema_exists(&self, name: &str) -> bool {
        self.schemas.iter().any(|s| s == name)
    }
}

/// Relation definition (table, view, materialized view, foreign table or
/// the relation behind a composite type)
#[derive(Debug, Clone, Serialize)]
pub struct RelationDef {
    pub oid: Oid,
    pub name: QualifiedName,
    pub kind: RelKind,
    /// Physical column order; dropped columns keep their slot
    pub columns: Vec<ColumnDef>,
    /// Composite type of the relation's rows
    pub rowtype: Oid,
    pub constraints: Vec<ConstraintDef>,
}

impl RelationDef {
    /// 1-based attribute number of a live column
    pub fn attnum(&self, name: &str) -> Option<i32> {
        self.columns
            .iter()
            .position(|c| !c.dropped && c.name == name)
            .map(|i| i as i32 + 1)
    }

    /// Column by 1-based attribute number, dropped ones included
    pub fn column(&self, attno: i32) -> Option<&ColumnDef> {
        usize::try_from(attno)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| self.columns.get(i))
    }

    /// Check if a column exists
    pub fn column_exists(&self, name: &str) -> bool {
        self.attnum(name).is_some()
    }

    pub fn live_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| !c.dropped)
    }

    pub fn primary_key(&self) -> Option<&ConstraintDef> {
        self.constraints
            .iter()
            .find(|c| c.kind == ConstraintKind::PrimaryKey)
    }

    /// Mark a column dropped, keeping its attribute number
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(col) = self
            .columns
            .iter_mut()
            .find(|c| !c.dropped && c.name == name)
        else {
            return false;
        };
        col.dropped = true;
        col.type_oid = INVALID_OID;
        true
    }
}

/// Column definition
#[derive(Debug, Clone, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub type_oid: Oid,
    pub typmod: i32,
    pub collation: Oid,
    pub not_null: bool,
    pub dropped: bool,
    /// Generation expression of a stored generated column
    pub generated: Option<String>,
    pub default: Option<DefaultValue>,
    pub identity: Option<IdentityKind>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_oid: Oid, typmod: i32) -> Self {
        Self {
            name: name.into(),
            type_oid,
            typmod,
            collation: INVALID_OID,
            not_null: false,
            dropped: false,
            generated: None,
            default: None,
            identity: None,
        }
    }

    /// Give the column the default collation, for collatable types
    pub fn collatable(mut self) -> Self {
        self.collation = DEFAULT_COLLATION_OID;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Default value for a column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DefaultValue {
    Literal(String),
    Expression(String),
    CurrentTimestamp,
    Null,
    NextVal(String), // For sequences/SERIAL
}

/// Identity column kind (GENERATED ... AS IDENTITY)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IdentityKind {
    Always,
    ByDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ConstraintKind {
    PrimaryKey,
    Unique,
    ForeignKey {
        references: QualifiedName,
        referred_columns: Vec<String>,
    },
    Check(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ConstraintDef {
    pub oid: Oid,
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
}

/// A type or variable declared in a package
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageMember {
    pub type_oid: Oid,
    pub typmod: i32,
}

/// A compiled package: its public and private types, and its variables
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackageDef {
    pub oid: Oid,
    pub name: String,
    pub schema: String,
    pub public_types: IndexMap<String, PackageMember>,
    pub private_types: IndexMap<String, PackageMember>,
    pub public_variables: IndexMap<String, PackageMember>,
    pub private_variables: IndexMap<String, PackageMember>,
}

impl PackageDef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: schema.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{INT4_OID, TEXT_OID};

    fn users(catalog: &mut Catalog) -> Oid {
        catalog.create_relation(
            &QualifiedName::new("users"),
            RelKind::Table,
            vec![
                ColumnDef::new("id", INT4_OID, -1),
                ColumnDef::new("name", TEXT_OID, -1).collatable(),
            ],
        )
    }

    #[test]
    fn test_catalog_add_relation() {
        let mut catalog = Catalog::new();
        let oid = users(&mut catalog);
        assert!(oid >= FIRST_NORMAL_OID);
        assert!(catalog.relation_exists(&QualifiedName::new("users")));
        assert!(catalog.relation_exists(&QualifiedName::with_schema("public", "users")));

        let rel = catalog.relation(oid).unwrap();
        let rowtype = catalog.type_by_oid(rel.rowtype).unwrap();
        assert_eq!(rowtype.relid, Some(oid));
        assert!(rowtype.array.is_some());
    }

    #[test]
    fn test_dropped_column_keeps_attnum() {
        let mut catalog = Catalog::new();
        let oid = users(&mut catalog);
        let rel = catalog.relation_mut(oid).unwrap();
        assert!(rel.drop_column("id"));
        assert_eq!(rel.attnum("id"), None);
        assert_eq!(rel.attnum("name"), Some(2));
        assert_eq!(rel.columns.len(), 2);
    }

    #[test]
    fn test_functional_dependency_requires_whole_primary_key() {
        let mut catalog = Catalog::new();
        let oid = users(&mut catalog);
        let pk = catalog
            .add_constraint(oid, None, ConstraintKind::PrimaryKey, vec!["id".to_string()])
            .unwrap();
        assert_eq!(catalog.functional_dependency(oid, &[1]), Some(pk));
        assert_eq!(catalog.functional_dependency(oid, &[2]), None);
        assert_eq!(catalog.relation(oid).unwrap().constraints[0].name, "users_pkey");
    }

    #[test]
    fn test_builtin_type_lookup_falls_back_to_pg_catalog() {
        let catalog = Catalog::new();
        let int4 = catalog.lookup_type(&QualifiedName::new("int4")).unwrap();
        assert_eq!(int4.oid, INT4_OID);
        assert!(catalog
            .lookup_type(&QualifiedName::with_schema("public", "int4"))
            .is_none());
    }
}
