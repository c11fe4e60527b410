// End-to-end checks of the analyzer's core guarantees, each against a
// catalog built from DDL
use pretty_assertions::assert_eq;
use sqlsema_core::catalog::{CatalogProvider, QualifiedName};
use sqlsema_core::query::walker::{walk_expr, Walk};
use sqlsema_core::query::{expand_grouping_sets, Expr, JoinTreeNode, Query, RteKind, SetOperationTree};
use sqlsema_core::types::{format_type, typmod_out, TypmodRule, NUMERIC_OID};
use sqlsema_core::{
    parse_type_string, Analyzer, AnalyzerOptions, Catalog, Diagnostic, DiagnosticKind, SchemaBuilder,
    SqlDialect,
};

const SCHEMA: &str = r#"
    CREATE TABLE dept (
        id integer PRIMARY KEY,
        name text NOT NULL
    );

    CREATE TABLE emp (
        id integer PRIMARY KEY,
        dept_id integer REFERENCES dept(id),
        manager_id integer,
        name varchar(40),
        salary numeric(10, 2)
    );

    CREATE TABLE wide (a int, b int, c int, d text);
    ALTER TABLE wide DROP COLUMN b;
"#;

fn catalog() -> Catalog {
    let mut builder = SchemaBuilder::new();
    builder.parse(SCHEMA).unwrap();
    builder.build().0
}

fn analyze_with(options: AnalyzerOptions, sql: &str) -> Result<Query, Diagnostic> {
    let catalog = catalog();
    let analysis = Analyzer::new(&catalog).with_options(options).analyze_queries(sql);
    match analysis.diagnostics.into_iter().find(Diagnostic::is_error) {
        Some(err) => Err(err),
        None => Ok(analysis.queries.into_iter().next().expect("one query")),
    }
}

fn analyze(sql: &str) -> Query {
    analyze_with(AnalyzerOptions::default(), sql).unwrap_or_else(|e| panic!("{}: {}", sql, e.message))
}

fn analyze_err(sql: &str) -> Diagnostic {
    analyze_with(AnalyzerOptions::default(), sql).expect_err(sql)
}

/// Output names of the query's grouping sets after expansion
fn grouping_sets(query: &Query) -> Vec<Vec<String>> {
    let sets = expand_grouping_sets(&query.grouping_sets, 4096).expect("within limit");
    sets.iter()
        .map(|set| {
            set.iter()
                .map(|sgref| {
                    query
                        .target_list
                        .iter()
                        .find(|te| te.ressortgroupref == *sgref)
                        .and_then(|te| te.resname.clone())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

#[test]
fn test_outer_reference_levels_up_matches_nesting() {
    let query = analyze(
        "SELECT id FROM emp WHERE EXISTS (\
            SELECT 1 FROM dept WHERE EXISTS (\
                SELECT 1 FROM emp AS e2 WHERE e2.manager_id = emp.id AND dept.id = e2.dept_id))",
    );
    let quals = query.jointree.quals.as_ref().expect("WHERE clause");

    // (levelsup, depth of the subquery the Var sits in, attno)
    let mut vars = Vec::new();
    walk_expr(quals, 0, &mut |node: &Expr, depth| -> Result<Walk, ()> {
        if let Expr::Var(v) = node {
            vars.push((v.levelsup, depth, v.varattno));
        }
        Ok(Walk::Continue)
    })
    .unwrap();
    vars.sort();
    assert_eq!(
        vars,
        vec![
            (0, 2, 2), // e2.dept_id
            (0, 2, 3), // e2.manager_id
            (1, 2, 1), // dept.id, one level out
            (2, 2, 1), // emp.id, two levels out
        ]
    );
}

#[test]
fn test_ambiguity_is_always_rejected() {
    let cases = [
        ("SELECT id FROM emp JOIN dept ON dept.id = emp.dept_id", DiagnosticKind::AmbiguousColumn),
        ("SELECT name FROM emp, dept", DiagnosticKind::AmbiguousColumn),
        ("SELECT 1 FROM emp, dept AS emp", DiagnosticKind::DuplicateAlias),
        (
            "SELECT id FROM emp WHERE EXISTS (SELECT id FROM dept, emp AS e WHERE e.id = 1)",
            DiagnosticKind::AmbiguousColumn,
        ),
        ("SELECT id AS x, name AS x FROM emp ORDER BY x", DiagnosticKind::AmbiguousColumn),
    ];
    for (sql, kind) in cases {
        let err = analyze_err(sql);
        assert_eq!(err.kind, kind, "{}: {}", sql, err.message);
    }

    // Qualification or a merged USING column resolves it
    analyze("SELECT emp.id FROM emp JOIN dept ON dept.id = emp.dept_id");
    analyze("SELECT id FROM emp JOIN dept USING (id)");
}

#[test]
fn test_cube_expands_to_every_subset() {
    let query = analyze("SELECT dept_id, manager_id, count(*) FROM emp GROUP BY CUBE (dept_id, manager_id)");
    assert_eq!(
        grouping_sets(&query),
        vec![
            vec![],
            vec!["dept_id".to_string()],
            vec!["manager_id".to_string()],
            vec!["dept_id".to_string(), "manager_id".to_string()],
        ]
    );
}

#[test]
fn test_rollup_expands_to_prefixes() {
    let query = analyze(
        "SELECT dept_id, manager_id, name, count(*) FROM emp GROUP BY ROLLUP (dept_id, manager_id, name)",
    );
    let sets = grouping_sets(&query);
    assert_eq!(sets.len(), 4);
    assert_eq!(sets[0], Vec::<String>::new());
    assert_eq!(sets[3], vec!["dept_id", "manager_id", "name"]);

    // A column repeated inside one set appears once
    let query = analyze("SELECT dept_id, count(*) FROM emp GROUP BY ROLLUP (dept_id, dept_id)");
    assert_eq!(
        grouping_sets(&query),
        vec![vec![], vec!["dept_id".to_string()], vec!["dept_id".to_string()]]
    );
}

#[test]
fn test_nested_aggregates() {
    let err = analyze_err("SELECT sum(sum(salary)) FROM emp");
    assert_eq!(err.kind, DiagnosticKind::GroupingError);
    assert_eq!(err.message, "aggregate function calls cannot be nested");

    // The inner aggregate belongs to the subquery, so nothing is nested
    let query = analyze("SELECT sum((SELECT max(id) FROM dept)) FROM emp");
    assert!(query.has_aggs);
}

#[test]
fn test_ungrouped_columns_are_rejected() {
    let err = analyze_err("SELECT dept_id, name FROM emp GROUP BY dept_id");
    assert_eq!(err.kind, DiagnosticKind::GroupingError);
    assert_eq!(
        err.message,
        "column \"emp.name\" must appear in the GROUP BY clause or be used in an aggregate function"
    );

    analyze("SELECT dept_id, count(name) FROM emp GROUP BY dept_id");
    // Grouping by the primary key covers the other columns
    let query = analyze("SELECT id, name, salary FROM emp GROUP BY id");
    assert_eq!(query.constraint_deps.len(), 1);
}

#[test]
fn test_star_skips_dropped_columns() {
    let query = analyze("SELECT * FROM wide");
    let out: Vec<(String, i32)> = query
        .target_list
        .iter()
        .map(|te| {
            (
                te.resname.clone().unwrap_or_default(),
                te.expr.as_var().map_or(0, |v| v.varattno),
            )
        })
        .collect();
    assert_eq!(
        out,
        vec![("a".to_string(), 1), ("c".to_string(), 3), ("d".to_string(), 4)]
    );
    assert_eq!(query.rtable[0].eref.colnames, vec!["a", "", "c", "d"]);

    let err = analyze_err("SELECT b FROM wide");
    assert_eq!(err.kind, DiagnosticKind::ColumnNotFound);
}

#[test]
fn test_hierarchical_query_rewrite() {
    let options = AnalyzerOptions {
        dialect: SqlDialect::Oracle,
        ..Default::default()
    };
    let query = analyze_with(
        options,
        "SELECT name, level FROM emp START WITH manager_id IS NULL CONNECT BY PRIOR id = manager_id",
    )
    .unwrap_or_else(|e| panic!("{}", e.message));

    // The outer query reads only the recursive working table
    assert!(query.has_recursive);
    assert_eq!(query.rtable.len(), 1);
    let rte = &query.rtable[0];
    assert!(rte.sw_converted);
    assert_eq!(rte.eref.aliasname, "tmp_result");
    assert!(matches!(&rte.kind, RteKind::Cte { name, .. } if name == "tmp_result"));

    let cte = &query.cte_list[0];
    assert!(cte.recursive);
    assert_eq!(
        cte.colnames[cte.colnames.len() - 4..],
        ["level", "connect_by_isleaf", "connect_by_iscycle", "rownum"]
    );

    // Its body is seed UNION ALL (tmp_result JOIN emp)
    let op = cte.query.set_operations.as_ref().expect("set operation body");
    assert!(op.all);
    let SetOperationTree::RangeTblRef(step_idx) = &op.rarg else {
        panic!("expected a leaf step arm");
    };
    let RteKind::Subquery { query: step } = &cte.query.rtable[step_idx - 1].kind else {
        panic!("step arm is not a subquery");
    };
    let [JoinTreeNode::Join(join)] = step.jointree.fromlist.as_slice() else {
        panic!("expected a join in the step arm");
    };
    let JoinTreeNode::RangeTblRef(left) = &join.larg else {
        panic!("expected the working table on the left");
    };
    assert!(matches!(&step.rtable[left - 1].kind, RteKind::Cte { self_reference: true, .. }));

    // Without the A-compatible dialect the clause is not accepted
    assert!(analyze_with(
        AnalyzerOptions::default(),
        "SELECT name FROM emp START WITH manager_id IS NULL CONNECT BY PRIOR id = manager_id"
    )
    .is_err());
}

#[test]
fn test_numeric_typmod_round_trip() {
    let catalog = catalog();
    let resolved = parse_type_string(&catalog, "numeric(10,2)").unwrap();
    assert_eq!(resolved.oid, NUMERIC_OID);
    assert_eq!(typmod_out(TypmodRule::Numeric, resolved.typmod), "(10,2)");
    assert_eq!(format_type(&catalog, resolved.oid, resolved.typmod), "numeric(10,2)");

    // The DDL path produces the same modifier
    let emp = catalog.find_relation(&QualifiedName::new("emp")).unwrap();
    let salary = &emp.columns[emp.attnum("salary").unwrap() as usize - 1];
    assert_eq!((salary.type_oid, salary.typmod), (resolved.oid, resolved.typmod));
    assert_eq!(catalog.type_by_oid(salary.type_oid).unwrap().name, "numeric");

    let err = parse_type_string(&catalog, "numeric(2000)").unwrap_err();
    assert_eq!(err.kind, DiagnosticKind::InvalidParameterValue);
}
