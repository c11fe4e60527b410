//! Schema builder - converts DDL into catalog entries
//!
//! Column types go through the same type-name resolution as casts in
//! queries, so `numeric(10,2)`, `varchar(20)[]` and `t.col%TYPE` all carry
//! their typmods into the catalog. View columns are derived by analysing the
//! view's query against the catalog built so far.

use sqlparser::ast::{
    AlterTableOperation, ColumnDef as AstColumnDef, ColumnOption, ColumnOptionDef, GeneratedAs, Ident,
    ObjectName, Statement, TableConstraint, UserDefinedTypeRepresentation, ViewColumnDef,
};
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use super::{
    Catalog, CatalogProvider, ColumnDef, ConstraintKind, DefaultValue, IdentityKind, QualifiedName,
    RelKind,
};
use crate::analyzer::{Analyzer, AnalyzerOptions};
use crate::dialect::SqlDialect;
use crate::error::{Diagnostic, DiagnosticKind, Severity};
use crate::syntax::lower::{fold_ident, lower_data_type, truncate_identifier};
use crate::types::{Oid, UNDEFINED_OID};

/// A constraint waiting for its relation to exist
struct PendingConstraint {
    name: Option<String>,
    kind: ConstraintKind,
    columns: Vec<String>,
}

/// Builder for constructing a Catalog from SQL schema definitions
pub struct SchemaBuilder {
    catalog: Catalog,
    diagnostics: Vec<Diagnostic>,
    dialect: SqlDialect,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self {
            catalog: Catalog::new(),
            diagnostics: Vec::new(),
            dialect: SqlDialect::default(),
        }
    }

    /// Dialect used to parse the DDL and analyse view queries
    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Parse SQL schema definitions and build the catalog
    pub fn parse(&mut self, sql: &str) -> Result<(), Vec<Diagnostic>> {
        let dialect = self.dialect.parser_dialect();

        // Try parsing the entire SQL first (fast path)
        match Parser::parse_sql(dialect.as_ref(), sql) {
            Ok(statements) => {
                for stmt in statements {
                    self.process_statement(&stmt);
                }
            }
            Err(_) => {
                // Fall back to statement-by-statement parsing to skip unsupported syntax
                self.parse_statements_individually(sql);
            }
        }

        if self.diagnostics.iter().any(|d| d.severity == Severity::Error) {
            Err(std::mem::take(&mut self.diagnostics))
        } else {
            Ok(())
        }
    }

    /// Parse statements one at a time, skipping those that fail to parse
    /// (functions, triggers, domains and the like). A bare `CREATE TYPE name`
    /// becomes a shell type.
    fn parse_statements_individually(&mut self, sql: &str) {
        let dialect = self.dialect.parser_dialect();

        for raw_stmt in split_sql_statements(sql) {
            let trimmed = raw_stmt.trim();
            if trimmed.is_empty() {
                continue;
            }

            match Parser::parse_sql(dialect.as_ref(), trimmed) {
                Ok(stmts) => {
                    for stmt in stmts {
                        self.process_statement(&stmt);
                    }
                }
                Err(e) => match shell_type_name(trimmed) {
                    Some(name) => {
                        self.catalog.create_shell_type(&name);
                    }
                    None => debug!(error = %e, "skipping unparseable schema statement"),
                },
            }
        }
    }

    fn process_statement(&mut self, stmt: &Statement) {
        match stmt {
            Statement::CreateTable(create) => {
                self.process_create_table(create);
            }
            Statement::CreateType {
                name,
                representation,
            } => {
                self.process_create_type(name, representation);
            }
            Statement::CreateView {
                name,
                columns,
                query,
                materialized,
                ..
            } => {
                self.process_create_view(name, columns, query, *materialized);
            }
            Statement::AlterTable {
                name, operations, ..
            } => {
                self.process_alter_table(name, operations);
            }
            Statement::CreateSchema { schema_name, .. } => {
                let name = schema_name.to_string();
                let name = name.trim_matches('"').to_lowercase();
                self.catalog.ensure_schema(&name);
            }
            _ => {}
        }
    }

    fn process_create_table(&mut self, create: &sqlparser::ast::CreateTable) {
        let name = self.object_name(&create.name);
        if self.catalog.relation_exists(&name) {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticKind::DuplicateAlias,
                format!("relation \"{}\" already exists", name),
            ));
            return;
        }

        let mut columns = Vec::with_capacity(create.columns.len());
        let mut pending = Vec::new();
        for column in &create.columns {
            columns.push(self.column_def(&name, column, &mut pending));
        }
        for constraint in &create.constraints {
            if let Some(c) = self.table_constraint(constraint) {
                pending.push(c);
            }
        }

        let kind = if create.external {
            RelKind::Foreign
        } else {
            RelKind::Table
        };
        let relid = self.catalog.create_relation(&name, kind, columns);
        self.add_constraints(relid, pending);
    }

    /// Build a column from its definition; constraints written on the column
    /// are queued in `pending`
    fn column_def(
        &mut self,
        table: &QualifiedName,
        column: &AstColumnDef,
        pending: &mut Vec<PendingConstraint>,
    ) -> ColumnDef {
        let col_name = self.ident(&column.name);
        let (oid, typmod, collation, serial) = self.column_type(&column.data_type);
        let mut col = ColumnDef::new(&col_name, oid, typmod);
        col.collation = collation;
        if serial {
            col.not_null = true;
            col.default = Some(DefaultValue::NextVal(format!(
                "nextval('{}_{}_seq'::regclass)",
                table.name, col_name
            )));
        }

        for option in &column.options {
            self.process_column_option(&mut col, option, pending);
        }
        col
    }

    /// Resolve a column's data type. Unknown names become the UNDEFINED
    /// placeholder with a warning rather than failing the whole table.
    fn column_type(&mut self, data_type: &sqlparser::ast::DataType) -> (Oid, i32, Oid, bool) {
        let type_name = match lower_data_type(data_type) {
            Ok(type_name) => type_name,
            Err(diagnostic) => {
                self.diagnostics.push(diagnostic);
                return (UNDEFINED_OID, -1, 0, false);
            }
        };
        let serial = matches!(
            type_name.names.as_slice(),
            [n] if matches!(n.as_str(), "serial" | "serial2" | "serial4" | "serial8" | "smallserial" | "bigserial")
        );

        let options = AnalyzerOptions {
            dialect: self.dialect,
            undefined_types: true,
            ..Default::default()
        };
        let (result, warnings) = Analyzer::new(&self.catalog)
            .with_options(options)
            .resolve_type_name(&type_name);
        self.diagnostics.extend(warnings);
        match result {
            Ok(resolved) => (resolved.oid, resolved.typmod, resolved.collation, serial),
            Err(diagnostic) => {
                self.diagnostics.push(diagnostic);
                (UNDEFINED_OID, -1, 0, serial)
            }
        }
    }

    fn process_create_view(
        &mut self,
        name: &ObjectName,
        columns: &[ViewColumnDef],
        query: &sqlparser::ast::Query,
        materialized: bool,
    ) {
        let qualified = self.object_name(name);
        let options = AnalyzerOptions {
            dialect: self.dialect,
            ..Default::default()
        };
        let analysis = Analyzer::new(&self.catalog)
            .with_options(options)
            .analyze_queries(&query.to_string());

        let Some(analysed) = analysis.queries.first() else {
            // The view's query did not analyse; keep going without it
            for diagnostic in analysis.diagnostics.into_iter().filter(Diagnostic::is_error) {
                warn!(view = %qualified, "{}", diagnostic.message);
                self.diagnostics.push(
                    Diagnostic::warning(
                        diagnostic.kind,
                        format!("view \"{}\" skipped: {}", qualified, diagnostic.message),
                    )
                    .with_help("Ensure the relations the view reads are defined before it"),
                );
            }
            return;
        };

        let outputs: Vec<_> = analysed.target_list.iter().filter(|te| !te.resjunk).collect();
        if columns.len() > outputs.len() {
            self.diagnostics.push(Diagnostic::error(
                DiagnosticKind::SyntaxError,
                format!(
                    "CREATE VIEW \"{}\" specifies more column names than columns",
                    qualified
                ),
            ));
            return;
        }

        let mut column_defs = Vec::with_capacity(outputs.len());
        for (i, te) in outputs.iter().enumerate() {
            let col_name = match columns.get(i) {
                Some(c) => self.ident(&c.name),
                None => te.resname.clone().unwrap_or_else(|| "?column?".to_string()),
            };
            let mut col = ColumnDef::new(col_name, te.expr.type_oid(), te.expr.typmod());
            col.collation = te.expr.collation();
            column_defs.push(col);
        }

        let kind = if materialized {
            RelKind::MatView
        } else {
            RelKind::View
        };
        self.catalog.create_relation(&qualified, kind, column_defs);
    }

    fn process_alter_table(&mut self, name: &ObjectName, operations: &[AlterTableOperation]) {
        let table_name = self.object_name(name);

        let Some(relid) = self.catalog.find_relation(&table_name).map(|r| r.oid) else {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::TableNotFound,
                    format!(
                        "ALTER TABLE references table '{}' which was not found in schema",
                        table_name
                    ),
                )
                .with_help("Ensure the CREATE TABLE statement appears before ALTER TABLE"),
            );
            return;
        };

        for operation in operations {
            match operation {
                AlterTableOperation::AddColumn { column_def, .. } => {
                    let mut pending = Vec::new();
                    let col = self.column_def(&table_name, column_def, &mut pending);
                    if let Some(rel) = self.catalog.relation_mut(relid) {
                        rel.columns.push(col);
                    }
                    self.add_constraints(relid, pending);
                }
                AlterTableOperation::DropColumn { column_name, .. } => {
                    let column = self.ident(column_name);
                    let dropped = self
                        .catalog
                        .relation_mut(relid)
                        .is_some_and(|rel| rel.drop_column(&column));
                    if !dropped {
                        self.diagnostics.push(Diagnostic::warning(
                            DiagnosticKind::ColumnNotFound,
                            format!(
                                "column \"{}\" of relation \"{}\" does not exist",
                                column, table_name.name
                            ),
                        ));
                    }
                }
                AlterTableOperation::RenameColumn {
                    old_column_name,
                    new_column_name,
                } => {
                    let old = self.ident(old_column_name);
                    let new = self.ident(new_column_name);
                    if let Some(col) = self.catalog.relation_mut(relid).and_then(|rel| {
                        rel.columns
                            .iter_mut()
                            .find(|c| !c.dropped && c.name == old)
                    }) {
                        col.name = new;
                    }
                }
                AlterTableOperation::RenameTable {
                    table_name: new_name,
                } => {
                    let new_qualified = self.object_name(new_name);
                    self.catalog.rename_relation(relid, &new_qualified.name);
                }
                AlterTableOperation::AddConstraint(constraint) => {
                    if let Some(c) = self.table_constraint(constraint) {
                        self.add_constraints(relid, vec![c]);
                    }
                }
                _ => {
                    // Other ALTER TABLE operations - not yet supported
                }
            }
        }
    }

    fn process_create_type(
        &mut self,
        name: &ObjectName,
        representation: &UserDefinedTypeRepresentation,
    ) {
        let qualified = self.object_name(name);
        match representation {
            UserDefinedTypeRepresentation::Enum { labels } => {
                let labels = labels.iter().map(|l| l.value.clone()).collect();
                self.catalog.create_enum_type(&qualified, labels);
            }
            UserDefinedTypeRepresentation::Composite { attributes } => {
                let mut columns = Vec::with_capacity(attributes.len());
                for attr in attributes {
                    let attr_name = self.ident(&attr.name);
                    let (oid, typmod, collation, _) = self.column_type(&attr.data_type);
                    let mut col = ColumnDef::new(attr_name, oid, typmod);
                    col.collation = collation;
                    columns.push(col);
                }
                self.catalog.create_composite_type(&qualified, columns);
            }
            #[allow(unreachable_patterns)]
            _ => {
                // Range and base types - not yet supported
            }
        }
    }

    /// Process a column option (NOT NULL, DEFAULT, PRIMARY KEY, etc.)
    fn process_column_option(
        &mut self,
        col: &mut ColumnDef,
        option: &ColumnOptionDef,
        pending: &mut Vec<PendingConstraint>,
    ) {
        let constraint_name = option.name.as_ref().map(|n| self.ident(n));
        match &option.option {
            ColumnOption::Null => {
                col.not_null = false;
            }
            ColumnOption::NotNull => {
                col.not_null = true;
            }
            ColumnOption::Default(expr) => {
                col.default = Some(expr_to_default(expr));
            }
            ColumnOption::Unique { is_primary, .. } => {
                let kind = if *is_primary {
                    col.not_null = true;
                    ConstraintKind::PrimaryKey
                } else {
                    ConstraintKind::Unique
                };
                pending.push(PendingConstraint {
                    name: constraint_name,
                    kind,
                    columns: vec![col.name.clone()],
                });
            }
            ColumnOption::ForeignKey {
                foreign_table,
                referred_columns,
                ..
            } => {
                pending.push(PendingConstraint {
                    name: constraint_name,
                    kind: ConstraintKind::ForeignKey {
                        references: self.object_name(foreign_table),
                        referred_columns: referred_columns.iter().map(fold_ident).collect(),
                    },
                    columns: vec![col.name.clone()],
                });
            }
            ColumnOption::Check(expr) => {
                pending.push(PendingConstraint {
                    name: constraint_name,
                    kind: ConstraintKind::Check(expr.to_string()),
                    columns: vec![col.name.clone()],
                });
            }
            ColumnOption::Generated {
                generated_as,
                generation_expr,
                ..
            } => match generation_expr {
                Some(expr) => col.generated = Some(expr.to_string()),
                None => {
                    let kind = match generated_as {
                        GeneratedAs::Always => IdentityKind::Always,
                        GeneratedAs::ByDefault => IdentityKind::ByDefault,
                        _ => return,
                    };
                    col.identity = Some(kind);
                    col.not_null = true; // IDENTITY columns are implicitly NOT NULL
                }
            },
            _ => {}
        }
    }

    /// Process a table constraint (PRIMARY KEY, FOREIGN KEY, UNIQUE, CHECK)
    fn table_constraint(&mut self, constraint: &TableConstraint) -> Option<PendingConstraint> {
        let (name, kind, columns) = match constraint {
            TableConstraint::PrimaryKey { columns, name, .. } => {
                (name, ConstraintKind::PrimaryKey, columns.as_slice())
            }
            TableConstraint::Unique { columns, name, .. } => {
                (name, ConstraintKind::Unique, columns.as_slice())
            }
            TableConstraint::ForeignKey {
                columns,
                foreign_table,
                referred_columns,
                name,
                ..
            } => (
                name,
                ConstraintKind::ForeignKey {
                    references: self.object_name(foreign_table),
                    referred_columns: referred_columns.iter().map(fold_ident).collect(),
                },
                columns.as_slice(),
            ),
            TableConstraint::Check { name, expr, .. } => {
                (name, ConstraintKind::Check(expr.to_string()), &[][..])
            }
            _ => return None,
        };
        Some(PendingConstraint {
            name: name.as_ref().map(|n| self.ident(n)),
            kind,
            columns: columns.iter().map(|c| self.ident(c)).collect(),
        })
    }

    fn add_constraints(&mut self, relid: Oid, pending: Vec<PendingConstraint>) {
        for c in pending {
            let exists = self.catalog.relation(relid).is_some_and(|rel| {
                c.columns.iter().all(|col| rel.column_exists(col))
            });
            if !exists {
                self.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::ColumnNotFound,
                    format!(
                        "constraint on columns ({}) references a column that does not exist",
                        c.columns.join(", ")
                    ),
                ));
                continue;
            }
            self.catalog.add_constraint(relid, c.name, c.kind, c.columns);
        }
    }

    /// Fold an identifier, truncating it with a warning when it is too long
    fn ident(&mut self, ident: &Ident) -> String {
        let name = fold_ident(ident);
        match truncate_identifier(&name) {
            Some(short) => {
                self.diagnostics.push(Diagnostic::warning(
                    DiagnosticKind::NameTooLong,
                    format!("identifier \"{}\" will be truncated to \"{}\"", name, short),
                ));
                short
            }
            None => name,
        }
    }

    /// Convert sqlparser ObjectName to our QualifiedName
    fn object_name(&mut self, name: &ObjectName) -> QualifiedName {
        match name.0.as_slice() {
            [table] => QualifiedName::new(self.ident(table)),
            [schema, table] | [_, schema, table] => {
                QualifiedName::with_schema(self.ident(schema), self.ident(table))
            }
            _ => QualifiedName::new(name.to_string()),
        }
    }

    /// Consume the builder and return the catalog
    pub fn build(self) -> (Catalog, Vec<Diagnostic>) {
        (self.catalog, self.diagnostics)
    }

    /// Get a reference to the current catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// `CREATE TYPE name` with no body
fn shell_type_name(stmt: &str) -> Option<QualifiedName> {
    let words: Vec<&str> = stmt.split_whitespace().collect();
    match words.as_slice() {
        [create, ty, name]
            if create.eq_ignore_ascii_case("create") && ty.eq_ignore_ascii_case("type") =>
        {
            Some(QualifiedName::parse(&name.to_lowercase()))
        }
        _ => None,
    }
}

/// Convert expression to DefaultValue
fn expr_to_default(expr: &sqlparser::ast::Expr) -> DefaultValue {
    match expr {
        sqlparser::ast::Expr::Value(v) => match v {
            sqlparser::ast::Value::Null => DefaultValue::Null,
            _ => DefaultValue::Literal(v.to_string()),
        },
        sqlparser::ast::Expr::Function(f) => {
            let func_name = f.name.to_string().to_lowercase();
            if func_name.contains("now") || func_name.contains("current_timestamp") {
                DefaultValue::CurrentTimestamp
            } else if func_name.contains("nextval") {
                DefaultValue::NextVal(f.to_string())
            } else {
                DefaultValue::Expression(f.to_string())
            }
        }
        _ => DefaultValue::Expression(expr.to_string()),
    }
}

/// Split SQL text into individual statements by semicolons,
/// respecting string literals, quoted identifiers, comments and
/// dollar-quoted strings.
pub fn split_sql_statements(sql: &str) -> Vec<&str> {
    let mut statements = Vec::new();
    let mut start = 0;
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut i = 0;

    while i < len {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                // Skip quoted text; a doubled quote is an escaped one
                i += 1;
                while i < len {
                    if bytes[i] == quote {
                        i += 1;
                        if i < len && bytes[i] == quote {
                            i += 1;
                        } else {
                            break;
                        }
                    } else {
                        i += 1;
                    }
                }
            }
            b'$' => {
                // $$...$$ or $tag$...$tag$
                if let Some(tag_end) = find_dollar_tag_end(sql, i) {
                    let tag = &sql[i..=tag_end];
                    i = tag_end + 1;
                    if let Some(close_pos) = sql[i..].find(tag) {
                        i += close_pos + tag.len();
                    } else {
                        i = len; // unterminated, consume rest
                    }
                } else {
                    i += 1;
                }
            }
            b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
                i += 2;
                while i + 1 < len {
                    if bytes[i] == b'*' && bytes[i + 1] == b'/' {
                        i += 2;
                        break;
                    }
                    i += 1;
                }
            }
            b';' => {
                let stmt = &sql[start..i];
                if !stmt.trim().is_empty() {
                    statements.push(stmt);
                }
                start = i + 1;
                i += 1;
            }
            _ => {
                i += 1;
            }
        }
    }

    let last = &sql[start..];
    if !last.trim().is_empty() {
        statements.push(last);
    }

    statements
}

/// Index of the closing `$` of a dollar-quote tag starting at `start`
fn find_dollar_tag_end(sql: &str, start: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut i = start + 1;
    if i < len && bytes[i] == b'$' {
        return Some(i);
    }
    while i < len && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
        i += 1;
    }
    if i < len && bytes[i] == b'$' {
        Some(i)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogProvider;
    use crate::types::{
        numeric_precision_scale, DEFAULT_COLLATION_OID, INT4_OID, INT8_OID, NUMERIC_OID, TEXT_OID,
        VARCHAR_OID,
    };
    use pretty_assertions::assert_eq;

    fn build(sql: &str) -> (Catalog, Vec<Diagnostic>) {
        let mut builder = SchemaBuilder::new();
        builder.parse(sql).unwrap();
        builder.build()
    }

    fn column_types(catalog: &Catalog, table: &str) -> Vec<(String, Oid, i32)> {
        catalog
            .find_relation(&QualifiedName::new(table))
            .unwrap()
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.type_oid, c.typmod))
            .collect()
    }

    #[test]
    fn test_parse_simple_table() {
        let (catalog, _) = build(
            r#"
            CREATE TABLE users (
                id SERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email TEXT UNIQUE,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        );

        let table = catalog.find_relation(&QualifiedName::new("users")).unwrap();
        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.kind, RelKind::Table);

        let id = &table.columns[0];
        assert_eq!(id.type_oid, INT4_OID);
        assert!(id.not_null);
        assert!(matches!(id.default, Some(DefaultValue::NextVal(_))));
        assert_eq!(table.primary_key().unwrap().columns, vec!["id".to_string()]);

        let name = &table.columns[1];
        assert_eq!(name.type_oid, VARCHAR_OID);
        assert_eq!(name.typmod, 104);
        assert_eq!(name.collation, DEFAULT_COLLATION_OID);
        assert!(name.not_null);

        assert!(!table.columns[2].not_null);
        assert_eq!(table.constraints.len(), 2);
    }

    #[test]
    fn test_numeric_column_keeps_precision_and_scale() {
        let (catalog, _) = build("CREATE TABLE orders (id bigint, total DECIMAL(10, 2), tags text[]);");
        let cols = column_types(&catalog, "orders");
        assert_eq!(cols[0].1, INT8_OID);
        assert_eq!(cols[1].1, NUMERIC_OID);
        assert_eq!(numeric_precision_scale(cols[1].2), Some((10, 2)));
        let tags = catalog.type_by_oid(cols[2].1).unwrap();
        assert!(tags.is_array());
    }

    #[test]
    fn test_table_constraints_become_catalog_constraints() {
        let (catalog, _) = build(
            r#"
            CREATE TABLE users (id int, email text);
            CREATE TABLE orders (
                id int,
                user_id int NOT NULL REFERENCES users(id),
                CONSTRAINT orders_pk PRIMARY KEY (id),
                CHECK (id > 0)
            );
        "#,
        );
        let orders = catalog.find_relation(&QualifiedName::new("orders")).unwrap();
        let names: Vec<&str> = orders.constraints.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["orders_user_id_fkey", "orders_pk", "orders_check"]);
        assert_eq!(
            catalog.functional_dependency(orders.oid, &[1]),
            Some(orders.constraints[1].oid)
        );
    }

    #[test]
    fn test_alter_table_drop_column_keeps_slot() {
        let (catalog, _) = build(
            r#"
            CREATE TABLE t (a int, b int, c text);
            ALTER TABLE t DROP COLUMN b;
            ALTER TABLE t ADD COLUMN d numeric(4, 1);
            ALTER TABLE t RENAME COLUMN c TO label;
        "#,
        );
        let rel = catalog.find_relation(&QualifiedName::new("t")).unwrap();
        assert_eq!(rel.columns.len(), 4);
        assert!(rel.columns[1].dropped);
        assert_eq!(rel.attnum("label"), Some(3));
        assert_eq!(rel.attnum("d"), Some(4));
        assert_eq!(rel.attnum("b"), None);
    }

    #[test]
    fn test_alter_missing_table_warns() {
        let (_, diagnostics) = build("ALTER TABLE nope ADD COLUMN x int;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
        assert_eq!(diagnostics[0].kind, DiagnosticKind::TableNotFound);
    }

    #[test]
    fn test_view_columns_come_from_analysis() {
        let (catalog, _) = build(
            r#"
            CREATE TABLE users (id int, name varchar(20), active boolean);
            CREATE VIEW active_users AS SELECT id, upper(name) AS shout FROM users WHERE active;
            CREATE MATERIALIZED VIEW user_ids (uid) AS SELECT id FROM users;
        "#,
        );
        let view = catalog.find_relation(&QualifiedName::new("active_users")).unwrap();
        assert_eq!(view.kind, RelKind::View);
        let cols: Vec<(&str, Oid)> = view.columns.iter().map(|c| (c.name.as_str(), c.type_oid)).collect();
        assert_eq!(cols, vec![("id", INT4_OID), ("shout", TEXT_OID)]);

        let mv = catalog.find_relation(&QualifiedName::new("user_ids")).unwrap();
        assert_eq!(mv.kind, RelKind::MatView);
        assert_eq!(mv.columns[0].name, "uid");
    }

    #[test]
    fn test_view_over_missing_table_is_skipped() {
        let (catalog, diagnostics) = build("CREATE VIEW v AS SELECT id FROM nowhere;");
        assert!(!catalog.relation_exists(&QualifiedName::new("v")));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].severity, Severity::Warning);
    }

    #[test]
    fn test_types_enum_composite_and_shell() {
        let sql = r#"
            CREATE TYPE mood AS ENUM ('sad', 'ok', 'happy');
            CREATE TYPE pair AS (x int, y text);
            CREATE TYPE later;
            CREATE TABLE feelings (m mood, p pair);
        "#;
        let (catalog, diagnostics) = build(sql);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        let mood = catalog.lookup_type(&QualifiedName::new("mood")).unwrap();
        assert_eq!(mood.labels, vec!["sad", "ok", "happy"]);
        let pair = catalog.lookup_type(&QualifiedName::new("pair")).unwrap();
        assert!(pair.relid.is_some());
        assert!(catalog.lookup_type(&QualifiedName::new("later")).is_some());
        let cols = column_types(&catalog, "feelings");
        assert_eq!(cols[0].1, mood.oid);
    }

    #[test]
    fn test_unknown_column_type_is_tolerated() {
        let (catalog, diagnostics) = build("CREATE TABLE t (g geometry);");
        assert_eq!(column_types(&catalog, "t")[0].1, UNDEFINED_OID);
        assert_eq!(diagnostics[0].message, "Type geometry does not exist.");
    }

    #[test]
    fn test_long_identifiers_are_truncated() {
        let long = "c".repeat(70);
        let (catalog, diagnostics) = build(&format!("CREATE TABLE t ({} int);", long));
        assert_eq!(column_types(&catalog, "t")[0].0, long[..63].to_string());
        assert_eq!(diagnostics[0].kind, DiagnosticKind::NameTooLong);
    }

    #[test]
    fn test_duplicate_table_is_an_error() {
        let mut builder = SchemaBuilder::new();
        let errors = builder
            .parse("CREATE TABLE t (a int); CREATE TABLE t (b int);")
            .unwrap_err();
        assert_eq!(errors[0].message, "relation \"t\" already exists");
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        assert_eq!(split_sql_statements(sql).len(), 2);

        let sql = "SELECT 'hello; world'; CREATE TABLE \"odd;name\" (id INT);";
        let stmts = split_sql_statements(sql);
        assert_eq!(stmts.len(), 2);
        assert!(stmts[0].contains("hello; world"));
    }

    #[test]
    fn test_parse_with_functions_and_unsupported_statements() {
        let sql = r#"
            CREATE OR REPLACE PROCEDURAL LANGUAGE plpgsql;

            CREATE TABLE actor (
                actor_id integer DEFAULT nextval('actor_actor_id_seq'::regclass) NOT NULL,
                first_name character varying(45) NOT NULL,
                last_update timestamp without time zone DEFAULT now() NOT NULL
            );

            ALTER TABLE public.actor OWNER TO postgres;

            CREATE FUNCTION update_timestamp() RETURNS TRIGGER AS $$
            BEGIN
                NEW.updated_at = NOW();
                RETURN NEW;
            END;
            $$ LANGUAGE plpgsql;

            CREATE TABLE category (
                category_id integer NOT NULL,
                name character varying(25) NOT NULL
            );
        "#;

        let (catalog, _) = build(sql);
        assert!(catalog.relation_exists(&QualifiedName::new("actor")));
        assert!(catalog.relation_exists(&QualifiedName::new("category")));
        let actor = catalog.find_relation(&QualifiedName::new("actor")).unwrap();
        assert_eq!(actor.columns[2].default, Some(DefaultValue::CurrentTimestamp));
    }
}
