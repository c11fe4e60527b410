// Integration tests for the SQL analyzer
use pretty_assertions::assert_eq;
use sqlsema_core::catalog::RelKind;
use sqlsema_core::error::DiagnosticKind;
use sqlsema_core::query::{CommandType, RteKind};
use sqlsema_core::{Analyzer, AnalyzerOptions, Catalog, QualifiedName, SchemaBuilder, SqlDialect};

fn setup_catalog() -> Catalog {
    let schema_sql = r#"
            CREATE TABLE users (
                id SERIAL PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                email TEXT
            );

            CREATE TABLE orders (
                id SERIAL PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id),
                total DECIMAL(10, 2)
            );

            CREATE VIEW big_orders AS
                SELECT o.id, u.name AS customer, o.total
                FROM orders o JOIN users u ON u.id = o.user_id
                WHERE o.total > 100;
        "#;

    let mut builder = SchemaBuilder::new();
    builder.parse(schema_sql).unwrap();
    let (catalog, _) = builder.build();
    catalog
}

fn errors(sql: &str) -> Vec<DiagnosticKind> {
    let catalog = setup_catalog();
    let analyzer = Analyzer::new(&catalog);
    analyzer
        .analyze(sql)
        .into_iter()
        .filter(|d| d.is_error())
        .map(|d| d.kind)
        .collect()
}

fn assert_valid(sql: &str) {
    let catalog = setup_catalog();
    let analyzer = Analyzer::new(&catalog);
    let diagnostics = analyzer.analyze(sql);
    assert!(diagnostics.is_empty(), "Expected no errors for {}: {:?}", sql, diagnostics);
}

#[test]
fn test_valid_select() {
    assert_valid("SELECT id, name FROM users");
}

#[test]
fn test_table_not_found() {
    assert_eq!(errors("SELECT * FROM nonexistent"), vec![DiagnosticKind::TableNotFound]);
}

#[test]
fn test_column_not_found() {
    assert_eq!(errors("SELECT nonexistent_column FROM users"), vec![DiagnosticKind::ColumnNotFound]);
}

#[test]
fn test_column_not_found_qualified() {
    let catalog = setup_catalog();
    let analyzer = Analyzer::new(&catalog);

    let diagnostics = analyzer.analyze("SELECT u.nonexistent FROM users u");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::ColumnNotFound);
    assert_eq!(diagnostics[0].message, "column u.nonexistent does not exist");
}

#[test]
fn test_table_alias_not_found() {
    // The table is only visible under its alias
    let catalog = setup_catalog();
    let analyzer = Analyzer::new(&catalog);

    let diagnostics = analyzer.analyze("SELECT users.id FROM users u");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::TableNotFound);
    assert_eq!(
        diagnostics[0].help.as_deref(),
        Some("Perhaps you meant to reference the table alias \"u\".")
    );
}

#[test]
fn test_ambiguous_column() {
    assert_eq!(
        errors("SELECT id FROM users JOIN orders ON users.id = orders.user_id"),
        vec![DiagnosticKind::AmbiguousColumn]
    );
    assert_valid("SELECT users.id, orders.id FROM users JOIN orders ON users.id = orders.user_id");
}

#[test]
fn test_parse_error() {
    assert_eq!(errors("SELEC * FROM users"), vec![DiagnosticKind::ParseError]);
}

#[test]
fn test_join_condition_column_not_found() {
    assert_eq!(
        errors("SELECT u.id FROM users u JOIN orders o ON u.id = o.customer_id"),
        vec![DiagnosticKind::ColumnNotFound]
    );
}

#[test]
fn test_error_has_span() {
    let catalog = setup_catalog();
    let analyzer = Analyzer::new(&catalog);

    let sql = "SELECT id,\n       missing\nFROM users";
    let diagnostics = analyzer.analyze(sql);
    let span = diagnostics[0].span.expect("span");
    assert!(sql[span.offset..].starts_with("missing"));
    assert_eq!((span.line, span.column), (2, 8));
}

#[test]
fn test_insert_valid() {
    assert_valid("INSERT INTO users (name, email) VALUES ('a', 'a@example.com')");
    // the source table needs an alias, or RETURNING is read as one
    assert_valid("INSERT INTO orders (user_id, total) SELECT id, 10 FROM users u RETURNING id");
    assert_valid("INSERT INTO orders (user_id, total) VALUES (1, 10) RETURNING id, total");
    assert_eq!(
        errors("INSERT INTO orders (user_id, total) VALUES (1, 10) RETURNING nope"),
        vec![DiagnosticKind::ColumnNotFound]
    );
}

#[test]
fn test_insert_errors() {
    assert_eq!(errors("INSERT INTO missing (id) VALUES (1)"), vec![DiagnosticKind::TableNotFound]);
    assert_eq!(
        errors("INSERT INTO users (nickname) VALUES ('x')"),
        vec![DiagnosticKind::ColumnNotFound]
    );
    assert_eq!(
        errors("INSERT INTO users (name) VALUES ('a', 'b')"),
        vec![DiagnosticKind::ColumnCountMismatch]
    );
    assert_eq!(
        errors("INSERT INTO users (name, email) VALUES ('a')"),
        vec![DiagnosticKind::ColumnCountMismatch]
    );
}

#[test]
fn test_update_and_delete() {
    assert_valid("UPDATE users SET name = 'b' WHERE id = 1");
    assert_valid("DELETE FROM orders WHERE user_id IN (SELECT id FROM users WHERE email IS NULL)");

    assert_eq!(errors("UPDATE missing SET a = 1"), vec![DiagnosticKind::TableNotFound]);
    assert_eq!(errors("UPDATE users SET nickname = 'x'"), vec![DiagnosticKind::ColumnNotFound]);
    assert_eq!(errors("UPDATE users SET name = 'x' WHERE age > 3"), vec![DiagnosticKind::ColumnNotFound]);
    assert_eq!(errors("DELETE FROM missing"), vec![DiagnosticKind::TableNotFound]);
    assert_eq!(errors("DELETE FROM users WHERE age > 3"), vec![DiagnosticKind::ColumnNotFound]);
}

#[test]
fn test_statement_kinds() {
    let catalog = setup_catalog();
    let analysis = Analyzer::new(&catalog).analyze_queries(
        "SELECT 1; INSERT INTO users (name) VALUES ('x'); UPDATE users SET email = NULL; DELETE FROM users;",
    );
    let commands: Vec<CommandType> = analysis.queries.iter().map(|q| q.command).collect();
    assert_eq!(
        commands,
        vec![CommandType::Select, CommandType::Insert, CommandType::Update, CommandType::Delete]
    );
    assert!(!analysis.has_errors());
}

#[test]
fn test_subqueries() {
    assert_valid("SELECT name FROM users WHERE id IN (SELECT user_id FROM orders WHERE total > 10)");
    assert_valid("SELECT name FROM users u WHERE EXISTS (SELECT 1 FROM orders o WHERE o.user_id = u.id)");
    assert_valid("SELECT name, (SELECT count(*) FROM orders o WHERE o.user_id = u.id) AS n FROM users u");
    assert_eq!(
        errors("SELECT name FROM users WHERE id IN (SELECT customer FROM orders)"),
        vec![DiagnosticKind::ColumnNotFound]
    );
}

#[test]
fn test_subquery_scope_isolation() {
    // Inner FROM items are not visible to the outer query
    assert_eq!(
        errors("SELECT total FROM users WHERE EXISTS (SELECT 1 FROM orders)"),
        vec![DiagnosticKind::ColumnNotFound]
    );
}

#[test]
fn test_deeply_nested_subquery() {
    assert_valid(
        "SELECT name FROM users u WHERE id IN (\
            SELECT user_id FROM orders o WHERE total > (\
                SELECT avg(total) FROM orders o2 WHERE o2.user_id = u.id))",
    );
}

#[test]
fn test_cte() {
    assert_valid(
        "WITH spenders AS (SELECT user_id, sum(total) AS spent FROM orders GROUP BY user_id) \
         SELECT u.name, s.spent FROM users u JOIN spenders s ON s.user_id = u.id",
    );
    assert_eq!(
        errors("WITH s AS (SELECT user_id FROM orders) SELECT total FROM s"),
        vec![DiagnosticKind::ColumnNotFound]
    );
    assert_eq!(
        errors("WITH s AS (SELECT user_id FROM orders) SELECT * FROM t"),
        vec![DiagnosticKind::TableNotFound]
    );
}

#[test]
fn test_multiple_ctes_with_dependencies() {
    assert_valid(
        "WITH a AS (SELECT id FROM users), b AS (SELECT id FROM a WHERE id > 1) SELECT * FROM b",
    );
    // A CTE cannot see a later sibling
    assert_eq!(
        errors("WITH a AS (SELECT id FROM b), b AS (SELECT id FROM users) SELECT * FROM a"),
        vec![DiagnosticKind::TableNotFound]
    );
}

#[test]
fn test_recursive_cte() {
    assert_valid(
        "WITH RECURSIVE n(i) AS (SELECT 1 UNION ALL SELECT i + 1 FROM n WHERE i < 10) SELECT i FROM n",
    );
}

#[test]
fn test_derived_tables() {
    assert_valid("SELECT sub.name FROM (SELECT id, name FROM users) sub");
    assert_valid(
        "SELECT s.user_id, s.total_amount FROM (\
            SELECT user_id, sum(total) AS total_amount FROM orders GROUP BY user_id) AS s",
    );
    assert_eq!(
        errors("SELECT sub.email FROM (SELECT id, name FROM users) sub"),
        vec![DiagnosticKind::ColumnNotFound]
    );
}

#[test]
fn test_views_resolve_like_tables() {
    let catalog = setup_catalog();
    let view = catalog.find_relation(&QualifiedName::new("big_orders")).unwrap();
    assert_eq!(view.kind, RelKind::View);
    let names: Vec<&str> = view.live_columns().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "customer", "total"]);

    assert_valid("SELECT customer, total FROM big_orders WHERE id > 3");
    assert_eq!(errors("SELECT user_id FROM big_orders"), vec![DiagnosticKind::ColumnNotFound]);
}

#[test]
fn test_join_forms() {
    assert_valid(
        "SELECT u.name, o.total FROM users u \
         JOIN orders o ON o.user_id = u.id \
         LEFT JOIN orders o2 ON o2.user_id = u.id AND o2.id <> o.id \
         CROSS JOIN users u2",
    );
    assert_valid("SELECT u1.name, u2.name FROM users u1 JOIN users u2 ON u1.id = u2.id");
    // NATURAL merges the shared id column
    assert_valid("SELECT id, name, total FROM users NATURAL JOIN orders");
    assert_valid("SELECT id FROM users JOIN orders USING (id)");
}

#[test]
fn test_join_result_columns() {
    let catalog = setup_catalog();
    let analysis = Analyzer::new(&catalog).analyze_queries("SELECT * FROM users JOIN orders USING (id)");
    let query = &analysis.queries[0];
    let names: Vec<_> = query.target_list.iter().filter_map(|te| te.resname.clone()).collect();
    assert_eq!(names, vec!["id", "name", "email", "user_id", "total"]);
    assert!(query.rtable.iter().any(|rte| matches!(rte.kind, RteKind::Join { .. })));
}

#[test]
fn test_union_column_count_validation() {
    assert_valid("SELECT id FROM users UNION SELECT user_id FROM orders");
    assert_eq!(
        errors("SELECT id, name FROM users UNION SELECT id FROM orders"),
        vec![DiagnosticKind::SyntaxError]
    );
}

#[test]
fn test_error_message_suggestion_typo() {
    let catalog = setup_catalog();
    let analyzer = Analyzer::new(&catalog);

    let diagnostics = analyzer.analyze("SELECT emial FROM users");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].help.as_deref(), Some("Did you mean 'email'?"));
}

#[test]
fn test_type_errors() {
    assert_eq!(errors("SELECT name + 1 FROM users"), vec![DiagnosticKind::UndefinedFunction]);
    assert_eq!(errors("SELECT nosuchfunc(id) FROM users"), vec![DiagnosticKind::UndefinedFunction]);
    assert_valid("SELECT upper(name), length(email), total * 2 FROM users, orders");
}

#[test]
fn test_hierarchical_query_needs_oracle_dialect() {
    let sql = "SELECT id, level FROM users START WITH id = 1 CONNECT BY PRIOR id = id + 1";
    let catalog = setup_catalog();

    let options = AnalyzerOptions {
        dialect: SqlDialect::Oracle,
        ..Default::default()
    };
    let diagnostics = Analyzer::new(&catalog).with_options(options).analyze(sql);
    assert!(diagnostics.is_empty(), "{:?}", diagnostics);

    assert!(!errors(sql).is_empty());
}
