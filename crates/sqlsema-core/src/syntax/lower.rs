//! Lowering of `sqlparser` ASTs into the raw syntax tree
//!
//! The grammar crate does the tokenizing and parsing; this module folds
//! identifiers, desugars the handful of constructs the analyzer does not see
//! directly (BETWEEN, LIKE, EXTRACT and friends) and attaches byte-offset
//! locations to every node it can.

use std::collections::BTreeSet;

use sqlparser::ast::{
    self, ArrayElemTypeDef, CharacterLength, DataType, ExactNumberInfo, FunctionArg,
    FunctionArgExpr, FunctionArgumentClause, FunctionArguments, GroupByExpr, JoinConstraint,
    JoinOperator, ObjectName, SelectItem, SetExpr, SetOperator, SetQuantifier, Spanned,
    Statement, TableFactor, TableWithJoins, TimezoneInfo, TrimWhereField, WindowFrameBound,
    WindowType,
};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use tracing::debug;

use super::scan::{
    strip_assignment_subscripts, strip_hierarchy_keywords, Condition, HierarchyClause, LineIndex,
    ScanMarks,
};
use super::*;
use crate::dialect::SqlDialect;
use crate::error::{Diagnostic, DiagnosticKind, Result, Span};
use crate::stack;

/// Longest identifier kept verbatim, in bytes
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Output of [`parse_sql`]
#[derive(Debug, Clone, Default)]
pub struct Lowered {
    pub statements: Vec<RawStmt>,
    /// Identifier truncation notices and similar
    pub warnings: Vec<Diagnostic>,
}

/// Parse `sql` and lower every statement into the raw tree
pub fn parse_sql(sql: &str, dialect: SqlDialect) -> Result<Lowered> {
    let (text, subscripts) = strip_assignment_subscripts(sql);
    let (text, mut marks) = if dialect.supports_hierarchical_queries() {
        strip_hierarchy_keywords(&text)
    } else {
        (text, ScanMarks::default())
    };
    marks.subscripts = subscripts;

    let parser_dialect = dialect.parser_dialect();
    let statements = Parser::parse_sql(parser_dialect.as_ref(), &text)
        .map_err(|e| Diagnostic::error(DiagnosticKind::ParseError, format!("Parse error: {}", e)))?;
    debug!(count = statements.len(), %dialect, "parsed statements");

    let mut lowerer = Lowerer::new(&text, dialect, marks);
    let mut out = Vec::with_capacity(statements.len());
    for stmt in &statements {
        out.push(lowerer.statement(stmt)?);
    }
    Ok(Lowered {
        statements: out,
        warnings: lowerer.warnings,
    })
}

/// Lower a data type outside of any statement (column definitions)
pub fn lower_data_type(data_type: &DataType) -> Result<TypeName> {
    Lowerer::new("", SqlDialect::default(), ScanMarks::default()).data_type(data_type)
}

/// Fold an identifier the way the lowering does: unquoted names go to lower case
pub fn fold_ident(ident: &ast::Ident) -> String {
    if ident.quote_style.is_some() {
        ident.value.clone()
    } else {
        ident.value.to_lowercase()
    }
}

fn unsupported(what: impl std::fmt::Display) -> Diagnostic {
    Diagnostic::error(
        DiagnosticKind::FeatureNotSupported,
        format!("{} is not supported", what),
    )
}

/// Truncate to at most [`MAX_IDENTIFIER_LENGTH`] bytes on a char boundary
pub fn truncate_identifier(name: &str) -> Option<String> {
    if name.len() <= MAX_IDENTIFIER_LENGTH {
        return None;
    }
    let mut end = MAX_IDENTIFIER_LENGTH;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    Some(name[..end].to_string())
}

struct Lowerer<'a> {
    sql: &'a str,
    index: LineIndex,
    dialect: SqlDialect,
    marks: ScanMarks,
    /// Entries of `marks.prior` already attached to a column reference
    prior_used: BTreeSet<usize>,
    warnings: Vec<Diagnostic>,
}

impl<'a> Lowerer<'a> {
    fn new(sql: &'a str, dialect: SqlDialect, marks: ScanMarks) -> Self {
        Self {
            sql,
            index: LineIndex::new(sql),
            dialect,
            marks,
            prior_used: BTreeSet::new(),
            warnings: Vec::new(),
        }
    }

    fn location(&self, span: sqlparser::tokenizer::Span) -> Location {
        let Some(mut s) = Span::from_sqlparser(&span) else {
            return Location::UNKNOWN;
        };
        if let Some(offset) = self.index.offset(self.sql, s.line, s.column) {
            s.offset = offset;
        }
        Location(Some(s))
    }

    fn loc_of(&self, node: &impl Spanned) -> Location {
        self.location(node.span())
    }

    /// Location of an expression. Operator chains have no depth limit in the
    /// parser, so they are flattened with a worklist instead of going
    /// through the recursive `Spanned` impl.
    fn expr_loc(&self, expr: &ast::Expr) -> Location {
        let mut span = sqlparser::tokenizer::Span::empty();
        let mut pending = vec![expr];
        while let Some(node) = pending.pop() {
            match node {
                ast::Expr::BinaryOp { left, right, .. } => {
                    pending.push(left);
                    pending.push(right);
                }
                ast::Expr::Nested(inner) | ast::Expr::UnaryOp { expr: inner, .. } => {
                    pending.push(inner)
                }
                other => span = span.union(&other.span()),
            }
        }
        self.location(span)
    }

    /// Location of a query's leading keyword
    fn query_loc(&self, query: &ast::Query) -> Location {
        if let Some(with) = &query.with {
            return self.location(with.with_token.0.span);
        }
        let mut body = query.body.as_ref();
        loop {
            match body {
                SetExpr::Select(select) => return self.location(select.select_token.0.span),
                SetExpr::Query(inner) => return self.query_loc(inner),
                SetExpr::SetOperation { left, .. } => body = left,
                other => return self.loc_of(other),
            }
        }
    }

    fn ident(&mut self, ident: &ast::Ident) -> String {
        let name = fold_ident(ident);
        match truncate_identifier(&name) {
            Some(short) => {
                let loc = self.location(ident.span);
                self.warnings.push(
                    Diagnostic::warning(
                        DiagnosticKind::NameTooLong,
                        format!("identifier \"{}\" will be truncated to \"{}\"", name, short),
                    )
                    .at(loc.span()),
                );
                short
            }
            None => name,
        }
    }

    fn object_name(&mut self, name: &ObjectName) -> Vec<String> {
        name.0.iter().map(|i| self.ident(i)).collect()
    }

    fn range_var(&mut self, name: &ObjectName, alias: Option<Alias>) -> Result<RangeVar> {
        let mut parts = self.object_name(name);
        let loc = name
            .0
            .last()
            .map(|i| self.location(i.span))
            .unwrap_or_default();
        let rel = parts
            .pop()
            .ok_or_else(|| Diagnostic::error(DiagnosticKind::SyntaxError, "empty relation name"))?;
        let schema = match parts.len() {
            0 => None,
            1 => parts.pop(),
            _ => {
                return Err(Diagnostic::error(
                    DiagnosticKind::SyntaxError,
                    format!("improper qualified name (too many dotted names): {}", name),
                )
                .at(loc.span()))
            }
        };
        Ok(RangeVar {
            schema,
            name: rel,
            alias,
            inh: true,
            loc,
        })
    }

    fn alias(&mut self, alias: &ast::TableAlias) -> Alias {
        Alias {
            name: self.ident(&alias.name),
            columns: alias.columns.iter().map(|c| self.ident(&c.name)).collect(),
        }
    }

    // ---- statements ----

    fn statement(&mut self, stmt: &Statement) -> Result<RawStmt> {
        match stmt {
            Statement::Query(query) => self.top_query(query),
            Statement::Insert(insert) => Ok(RawStmt::Insert(Box::new(self.insert(insert, None)?))),
            Statement::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                ..
            } => {
                let update = self.update(
                    table,
                    assignments,
                    from.as_ref(),
                    selection.as_ref(),
                    returning.as_deref(),
                    None,
                )?;
                Ok(RawStmt::Update(Box::new(update)))
            }
            Statement::Delete(delete) => Ok(RawStmt::Delete(Box::new(self.delete(delete, None)?))),
            Statement::Merge {
                table,
                source,
                on,
                clauses,
                ..
            } => {
                let merge = self.merge(table, source, on, clauses, None)?;
                Ok(RawStmt::Merge(Box::new(merge)))
            }
            other => Err(unsupported(format!(
                "statement \"{}\"",
                other.to_string().split_whitespace().next().unwrap_or_default()
            ))),
        }
    }

    /// A query statement, which is also how `WITH ... INSERT/UPDATE/DELETE` arrives
    fn top_query(&mut self, query: &ast::Query) -> Result<RawStmt> {
        let dml = matches!(
            query.body.as_ref(),
            SetExpr::Insert(_) | SetExpr::Update(_)
        );
        if !dml {
            return Ok(RawStmt::Select(Box::new(self.query(query)?)));
        }
        let with = match &query.with {
            Some(with) => Some(self.with_clause(with)?),
            None => None,
        };
        match query.body.as_ref() {
            SetExpr::Insert(Statement::Insert(insert)) => {
                Ok(RawStmt::Insert(Box::new(self.insert(insert, with)?)))
            }
            SetExpr::Update(Statement::Update {
                table,
                assignments,
                from,
                selection,
                returning,
                ..
            }) => {
                let update = self.update(
                    table,
                    assignments,
                    from.as_ref(),
                    selection.as_ref(),
                    returning.as_deref(),
                    with,
                )?;
                Ok(RawStmt::Update(Box::new(update)))
            }
            _ => Err(unsupported("this data-modifying statement")),
        }
    }

    fn insert(&mut self, insert: &ast::Insert, with: Option<WithClause>) -> Result<InsertStmt> {
        if insert.on.is_some() {
            return Err(unsupported("INSERT ... ON CONFLICT"));
        }
        let alias = insert.table_alias.as_ref().map(|a| Alias::new(self.ident(a)));
        let relation = self.range_var(&insert.table_name, alias)?;
        let columns = insert
            .columns
            .iter()
            .map(|c| self.insert_column(c))
            .collect();
        let source = match &insert.source {
            Some(q) => Some(Box::new(self.query(q)?)),
            None => None,
        };
        let returning = match &insert.returning {
            Some(items) => self.targets(items)?,
            None => Vec::new(),
        };
        Ok(InsertStmt {
            loc: relation.loc,
            relation,
            columns,
            source,
            returning,
            with,
        })
    }

    fn insert_column(&mut self, ident: &ast::Ident) -> ResTarget {
        let loc = self.location(ident.span);
        ResTarget {
            name: Some(self.ident(ident)),
            indirection: Vec::new(),
            val: RawExpr::Const(Literal::Null, loc),
            loc,
        }
    }

    fn dml_relation(&mut self, table: &TableWithJoins) -> Result<RangeVar> {
        if !table.joins.is_empty() {
            return Err(unsupported("a join as the target relation"));
        }
        match &table.relation {
            TableFactor::Table { name, alias, .. } => {
                let alias = alias.as_ref().map(|a| self.alias(a));
                self.range_var(name, alias)
            }
            other => Err(unsupported(format!("\"{}\" as the target relation", other))),
        }
    }

    fn update(
        &mut self,
        table: &TableWithJoins,
        assignments: &[ast::Assignment],
        from: Option<&TableWithJoins>,
        selection: Option<&ast::Expr>,
        returning: Option<&[SelectItem]>,
        with: Option<WithClause>,
    ) -> Result<UpdateStmt> {
        let relation = self.dml_relation(table)?;
        let targets = self.assignments(assignments)?;
        let from = match from {
            Some(twj) => vec![self.table_with_joins(twj)?],
            None => Vec::new(),
        };
        let where_clause = selection.map(|e| self.expr(e)).transpose()?;
        let returning = match returning {
            Some(items) => self.targets(items)?,
            None => Vec::new(),
        };
        Ok(UpdateStmt {
            loc: relation.loc,
            relation,
            targets,
            from,
            where_clause,
            returning,
            with,
        })
    }

    fn assignments(&mut self, assignments: &[ast::Assignment]) -> Result<Vec<ResTarget>> {
        let mut out = Vec::new();
        for assignment in assignments {
            match &assignment.target {
                ast::AssignmentTarget::ColumnName(name) => {
                    out.push(self.assignment_target(name, &assignment.value)?);
                }
                ast::AssignmentTarget::Tuple(names) => {
                    // (a, b) = (x, y) assigns column by column
                    let ast::Expr::Tuple(values) = &assignment.value else {
                        return Err(unsupported("multiple-column assignment from a subquery"));
                    };
                    if values.len() != names.len() {
                        return Err(Diagnostic::error(
                            DiagnosticKind::SyntaxError,
                            "number of columns does not match number of values",
                        )
                        .at(self.expr_loc(&assignment.value).span()));
                    }
                    for (name, value) in names.iter().zip(values) {
                        out.push(self.assignment_target(name, value)?);
                    }
                }
            }
        }
        Ok(out)
    }

    fn assignment_target(&mut self, name: &ObjectName, value: &ast::Expr) -> Result<ResTarget> {
        let mut parts = self.object_name(name).into_iter();
        let column = parts
            .next()
            .ok_or_else(|| Diagnostic::error(DiagnosticKind::SyntaxError, "empty column name"))?;
        let loc = name
            .0
            .first()
            .map(|i| self.location(i.span))
            .unwrap_or_default();

        // subscripts were lifted out by the pre-pass; put them back between
        // the field names they followed
        let subscripts = loc
            .span()
            .and_then(|span| self.marks.subscripts.get(&span.offset))
            .cloned()
            .unwrap_or_default();
        let mut subscripts = subscripts.into_iter().peekable();
        let mut indirection = Vec::new();
        let mut position = 1;
        loop {
            while let Some(mark) = subscripts.next_if(|m| m.position == position) {
                indirection.push(Indirection::Subscript {
                    lower: mark.lower.map(|c| self.isolated_expr(&c).map(Box::new)).transpose()?,
                    upper: mark.upper.map(|c| self.isolated_expr(&c).map(Box::new)).transpose()?,
                    is_slice: mark.is_slice,
                });
            }
            match parts.next() {
                Some(field) => indirection.push(Indirection::Field(field)),
                None => break,
            }
            position += 1;
        }

        Ok(ResTarget {
            name: Some(column),
            indirection,
            val: self.expr(value)?,
            loc,
        })
    }

    fn delete(&mut self, delete: &ast::Delete, with: Option<WithClause>) -> Result<DeleteStmt> {
        let tables = match &delete.from {
            ast::FromTable::WithFromKeyword(tables) | ast::FromTable::WithoutKeyword(tables) => {
                tables
            }
        };
        let [table] = tables.as_slice() else {
            return Err(unsupported("DELETE from more than one relation"));
        };
        let relation = self.dml_relation(table)?;
        let using = match &delete.using {
            Some(items) => items
                .iter()
                .map(|t| self.table_with_joins(t))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };
        let where_clause = delete.selection.as_ref().map(|e| self.expr(e)).transpose()?;
        let returning = match &delete.returning {
            Some(items) => self.targets(items)?,
            None => Vec::new(),
        };
        Ok(DeleteStmt {
            loc: relation.loc,
            relation,
            using,
            where_clause,
            returning,
            with,
        })
    }

    fn merge(
        &mut self,
        table: &TableFactor,
        source: &TableFactor,
        on: &ast::Expr,
        clauses: &[ast::MergeClause],
        with: Option<WithClause>,
    ) -> Result<MergeStmt> {
        let target = match table {
            TableFactor::Table { name, alias, .. } => {
                let alias = alias.as_ref().map(|a| self.alias(a));
                self.range_var(name, alias)?
            }
            other => return Err(unsupported(format!("\"{}\" as the MERGE target", other))),
        };
        let source = self.table_factor(source)?;
        let on = self.expr(on)?;
        let mut whens = Vec::with_capacity(clauses.len());
        for clause in clauses {
            let matched = match clause.clause_kind {
                ast::MergeClauseKind::Matched => true,
                ast::MergeClauseKind::NotMatched | ast::MergeClauseKind::NotMatchedByTarget => {
                    false
                }
                ast::MergeClauseKind::NotMatchedBySource => {
                    return Err(unsupported("WHEN NOT MATCHED BY SOURCE"))
                }
            };
            let condition = clause.predicate.as_ref().map(|e| self.expr(e)).transpose()?;
            let action = match &clause.action {
                ast::MergeAction::Update { assignments } => {
                    MergeAction::Update(self.assignments(assignments)?)
                }
                ast::MergeAction::Delete => MergeAction::Delete,
                ast::MergeAction::Insert(insert) => {
                    let columns = insert.columns.iter().map(|c| self.insert_column(c)).collect();
                    let values = match &insert.kind {
                        ast::MergeInsertKind::Values(values) => match values.rows.as_slice() {
                            [row] => Some(self.exprs(row)?),
                            _ => {
                                return Err(Diagnostic::error(
                                    DiagnosticKind::SyntaxError,
                                    "MERGE INSERT accepts exactly one VALUES row",
                                ))
                            }
                        },
                        ast::MergeInsertKind::Row => None,
                    };
                    MergeAction::Insert { columns, values }
                }
            };
            whens.push(MergeWhen {
                matched,
                condition,
                action,
                loc: Location::UNKNOWN,
            });
        }
        Ok(MergeStmt {
            loc: target.loc,
            target,
            source,
            on,
            clauses: whens,
            with,
        })
    }

    // ---- queries ----

    fn with_clause(&mut self, with: &ast::With) -> Result<WithClause> {
        let mut ctes = Vec::with_capacity(with.cte_tables.len());
        for cte in &with.cte_tables {
            let loc = self.location(cte.alias.name.span);
            ctes.push(CommonTableExpr {
                name: self.ident(&cte.alias.name),
                columns: cte.alias.columns.iter().map(|c| self.ident(&c.name)).collect(),
                query: Box::new(self.query(&cte.query)?),
                loc,
            });
        }
        Ok(WithClause {
            recursive: with.recursive,
            ctes,
            loc: Location::UNKNOWN,
        })
    }

    fn query(&mut self, query: &ast::Query) -> Result<SelectStmt> {
        stack::maybe_grow(|| self.query_node(query))
    }

    fn query_node(&mut self, query: &ast::Query) -> Result<SelectStmt> {
        let with = match &query.with {
            Some(with) => Some(self.with_clause(with)?),
            None => None,
        };
        let mut body = self.set_expr(&query.body)?;

        let mut order_by = match &query.order_by {
            Some(order_by) => self.sort_list(&order_by.exprs)?,
            None => Vec::new(),
        };
        let siblings = query
            .order_by
            .as_ref()
            .and_then(|o| o.exprs.first())
            .and_then(|first| self.expr_loc(&first.expr).span())
            .map(|span| span.offset)
            .is_some_and(|offset| self.marks.siblings.contains(&offset));
        if siblings {
            match &mut body {
                SelectBody::Simple(select) if select.start_with.is_some() => {
                    if let Some(sw) = select.start_with.as_mut() {
                        sw.siblings_order = std::mem::take(&mut order_by);
                    }
                }
                _ => {
                    return Err(Diagnostic::error(
                        DiagnosticKind::SyntaxError,
                        "ORDER SIBLINGS BY clause can only be used together with START WITH/CONNECT BY",
                    ))
                }
            }
        }

        let mut limit = query.limit.as_ref().map(|e| self.expr(e)).transpose()?;
        if let Some(fetch) = &query.fetch {
            if fetch.with_ties || fetch.percent {
                return Err(unsupported("FETCH ... WITH TIES / PERCENT"));
            }
            limit = match &fetch.quantity {
                Some(q) => Some(self.expr(q)?),
                None => Some(RawExpr::int(1)),
            };
        }
        let offset = query
            .offset
            .as_ref()
            .map(|o| self.expr(&o.value))
            .transpose()?;

        let mut locking = Vec::with_capacity(query.locks.len());
        for lock in &query.locks {
            let strength = match lock.lock_type {
                ast::LockType::Share => LockStrength::Share,
                ast::LockType::Update => LockStrength::Update,
            };
            let rels = match &lock.of {
                Some(name) => self.object_name(name).into_iter().last().into_iter().collect(),
                None => Vec::new(),
            };
            locking.push(LockingClause {
                strength,
                rels,
                loc: Location::UNKNOWN,
            });
        }

        Ok(SelectStmt {
            with,
            body,
            order_by,
            limit,
            offset,
            locking,
            loc: self.query_loc(query),
        })
    }

    fn set_expr(&mut self, body: &SetExpr) -> Result<SelectBody> {
        match body {
            SetExpr::Select(select) => Ok(SelectBody::Simple(Box::new(self.select(select)?))),
            SetExpr::Values(values) => {
                let rows = values
                    .rows
                    .iter()
                    .map(|row| self.exprs(row))
                    .collect::<Result<Vec<_>>>()?;
                Ok(SelectBody::Values(rows))
            }
            SetExpr::Query(inner) => {
                let stmt = self.query(inner)?;
                let decorated = stmt.with.is_some()
                    || !stmt.order_by.is_empty()
                    || stmt.limit.is_some()
                    || stmt.offset.is_some()
                    || !stmt.locking.is_empty();
                if decorated {
                    // keep the parenthesized query as a set-operation-free subquery
                    Ok(SelectBody::Simple(Box::new(SimpleSelect {
                        targets: vec![ResTarget::unnamed(RawExpr::column(&["*"]))],
                        from: vec![FromItem::Subselect {
                            lateral: false,
                            query: Box::new(stmt),
                            alias: Some(Alias::new("unnamed_subquery")),
                            loc: Location::UNKNOWN,
                        }],
                        ..Default::default()
                    })))
                } else {
                    Ok(stmt.body)
                }
            }
            SetExpr::SetOperation {
                op,
                set_quantifier,
                left,
                right,
            } => {
                let op = match op {
                    SetOperator::Union => SetOpKind::Union,
                    SetOperator::Intersect => SetOpKind::Intersect,
                    _ => SetOpKind::Except,
                };
                let all = match set_quantifier {
                    SetQuantifier::All => true,
                    SetQuantifier::Distinct | SetQuantifier::None => false,
                    other => return Err(unsupported(format!("{} {}", op, other))),
                };
                Ok(SelectBody::SetOp {
                    op,
                    all,
                    left: Box::new(self.set_operand(left)?),
                    right: Box::new(self.set_operand(right)?),
                })
            }
            other => Err(unsupported(format!("\"{}\" as a query body", other))),
        }
    }

    fn set_operand(&mut self, operand: &SetExpr) -> Result<SelectStmt> {
        match operand {
            SetExpr::Query(q) => self.query(q),
            other => Ok(SelectStmt {
                with: None,
                body: self.set_expr(other)?,
                order_by: Vec::new(),
                limit: None,
                offset: None,
                locking: Vec::new(),
                loc: Location::UNKNOWN,
            }),
        }
    }

    fn select(&mut self, select: &ast::Select) -> Result<SimpleSelect> {
        if select.top.is_some() {
            return Err(unsupported("TOP"));
        }
        if select.into.is_some() {
            return Err(unsupported("SELECT INTO"));
        }
        if select.qualify.is_some() {
            return Err(unsupported("QUALIFY"));
        }

        let distinct = match &select.distinct {
            None => None,
            Some(ast::Distinct::Distinct) => Some(Vec::new()),
            Some(ast::Distinct::On(exprs)) => Some(self.exprs(exprs)?),
        };
        let targets = self.targets(&select.projection)?;
        let from = select
            .from
            .iter()
            .map(|t| self.table_with_joins(t))
            .collect::<Result<Vec<_>>>()?;
        let where_clause = select.selection.as_ref().map(|e| self.expr(e)).transpose()?;

        let group_by = match &select.group_by {
            GroupByExpr::All(_) => return Err(unsupported("GROUP BY ALL")),
            GroupByExpr::Expressions(exprs, modifiers) => {
                if !modifiers.is_empty() {
                    return Err(unsupported("GROUP BY modifiers"));
                }
                exprs
                    .iter()
                    .map(|e| self.group_item(e))
                    .collect::<Result<Vec<_>>>()?
            }
        };
        let having = select.having.as_ref().map(|e| self.expr(e)).transpose()?;

        let mut windows = Vec::with_capacity(select.named_window.len());
        for ast::NamedWindowDefinition(name, def) in &select.named_window {
            let loc = self.location(name.span);
            let mut window = match def {
                ast::NamedWindowExpr::WindowSpec(spec) => self.window_spec(spec)?,
                ast::NamedWindowExpr::NamedWindow(base) => WindowDef {
                    name: None,
                    refname: Some(self.ident(base)),
                    partition_by: Vec::new(),
                    order_by: Vec::new(),
                    frame: None,
                    loc,
                },
            };
            window.name = Some(self.ident(name));
            window.loc = loc;
            windows.push(window);
        }

        if select.connect_by.is_some() {
            return Err(unsupported(format!(
                "START WITH/CONNECT BY in the {} dialect",
                self.dialect
            )));
        }
        let clause = self
            .location(select.select_token.0.span)
            .span()
            .and_then(|span| self.marks.clauses.get(&span.offset))
            .cloned();
        let start_with = clause.map(|c| self.hierarchy_clause(&c)).transpose()?;

        Ok(SimpleSelect {
            distinct,
            targets,
            from,
            where_clause,
            group_by,
            having,
            windows,
            start_with,
        })
    }

    fn hierarchy_clause(&mut self, clause: &HierarchyClause) -> Result<StartWithClause> {
        if clause.repeated {
            return Err(Diagnostic::error(
                DiagnosticKind::SyntaxError,
                "multiple START WITH or CONNECT BY clauses not allowed",
            ));
        }
        let Some(connect_by) = &clause.connect_by else {
            return Err(Diagnostic::error(
                DiagnosticKind::SyntaxError,
                "START WITH requires a CONNECT BY clause",
            ));
        };
        let connect = self.condition(connect_by)?;
        let start_with = clause
            .start_with
            .as_ref()
            .map(|c| self.condition(c))
            .transpose()?;
        let loc = connect.location();
        Ok(StartWithClause {
            start_with,
            connect_by: connect,
            nocycle: clause.nocycle,
            siblings_order: Vec::new(),
            loc,
        })
    }

    /// Parse and lower an expression lifted out by the pre-pass
    fn isolated_expr(&mut self, isolated: &Condition) -> Result<RawExpr> {
        let dialect = self.dialect.parser_dialect();
        let parsed = Parser::new(dialect.as_ref())
            .try_with_sql(&isolated.text)
            .and_then(|mut parser| {
                let expr = parser.parse_expr()?;
                parser.expect_token(&Token::EOF)?;
                Ok(expr)
            })
            .map_err(|e| Diagnostic::error(DiagnosticKind::ParseError, format!("Parse error: {}", e)))?;
        self.expr(&parsed)
    }

    /// Parse and lower one lifted START WITH / CONNECT BY condition
    fn condition(&mut self, condition: &Condition) -> Result<RawExpr> {
        let expr = self.isolated_expr(condition)?;
        if self
            .marks
            .prior
            .range(condition.range.clone())
            .any(|offset| !self.prior_used.contains(offset))
        {
            return Err(unsupported("PRIOR applied to anything but a column reference"));
        }
        Ok(expr)
    }

    /// Whether a blanked `PRIOR` stood right before the column reference at `loc`
    fn take_prior(&mut self, loc: Location) -> bool {
        match loc.span() {
            Some(span) if self.marks.prior.contains(&span.offset) => {
                self.prior_used.insert(span.offset);
                true
            }
            _ => false,
        }
    }

    fn targets(&mut self, items: &[SelectItem]) -> Result<Vec<ResTarget>> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let target = match item {
                SelectItem::UnnamedExpr(expr) => ResTarget {
                    name: None,
                    indirection: Vec::new(),
                    loc: self.expr_loc(expr),
                    val: self.expr(expr)?,
                },
                SelectItem::ExprWithAlias { expr, alias } => ResTarget {
                    name: Some(self.ident(alias)),
                    indirection: Vec::new(),
                    loc: self.expr_loc(expr),
                    val: self.expr(expr)?,
                },
                SelectItem::QualifiedWildcard(name, _) => {
                    let mut fields: Vec<ColumnField> =
                        self.object_name(name).into_iter().map(ColumnField::Name).collect();
                    fields.push(ColumnField::Star);
                    let loc = name
                        .0
                        .first()
                        .map(|i| self.location(i.span))
                        .unwrap_or_default();
                    ResTarget {
                        name: None,
                        indirection: Vec::new(),
                        val: RawExpr::ColumnRef(ColumnRef {
                            fields,
                            prior: false,
                            loc,
                        }),
                        loc,
                    }
                }
                SelectItem::Wildcard(_) => ResTarget::unnamed(RawExpr::column(&["*"])),
            };
            out.push(target);
        }
        Ok(out)
    }

    fn group_item(&mut self, expr: &ast::Expr) -> Result<GroupItem> {
        match expr {
            ast::Expr::Rollup(sets) => Ok(GroupItem::Rollup(self.grouping_sublists(sets)?)),
            ast::Expr::Cube(sets) => Ok(GroupItem::Cube(self.grouping_sublists(sets)?)),
            ast::Expr::GroupingSets(sets) => Ok(GroupItem::Sets(self.grouping_sublists(sets)?)),
            ast::Expr::Tuple(items) if items.is_empty() => Ok(GroupItem::Empty),
            other => Ok(GroupItem::Expr(self.expr(other)?)),
        }
    }

    fn grouping_sublists(&mut self, sets: &[Vec<ast::Expr>]) -> Result<Vec<GroupItem>> {
        sets.iter()
            .map(|set| match set.as_slice() {
                [] => Ok(GroupItem::Empty),
                [single @ (ast::Expr::Rollup(_) | ast::Expr::Cube(_) | ast::Expr::GroupingSets(_))] => {
                    self.group_item(single)
                }
                [ast::Expr::Tuple(items)] if items.is_empty() => Ok(GroupItem::Empty),
                items => Ok(GroupItem::Simple(self.exprs(items)?)),
            })
            .collect()
    }

    fn sort_list(&mut self, exprs: &[ast::OrderByExpr]) -> Result<Vec<SortBy>> {
        exprs.iter().map(|o| self.sort_by(o)).collect()
    }

    fn sort_by(&mut self, order: &ast::OrderByExpr) -> Result<SortBy> {
        Ok(SortBy {
            loc: self.expr_loc(&order.expr),
            expr: self.expr(&order.expr)?,
            dir: match order.asc {
                None => SortDir::Default,
                Some(true) => SortDir::Asc,
                Some(false) => SortDir::Desc,
            },
            nulls: match order.nulls_first {
                None => NullsOrder::Default,
                Some(true) => NullsOrder::First,
                Some(false) => NullsOrder::Last,
            },
        })
    }

    fn window_spec(&mut self, spec: &ast::WindowSpec) -> Result<WindowDef> {
        let frame = match &spec.window_frame {
            Some(frame) => Some(FrameSpec {
                units: match frame.units {
                    ast::WindowFrameUnits::Rows => FrameUnits::Rows,
                    ast::WindowFrameUnits::Range => FrameUnits::Range,
                    ast::WindowFrameUnits::Groups => FrameUnits::Groups,
                },
                start: self.frame_bound(&frame.start_bound)?,
                end: frame
                    .end_bound
                    .as_ref()
                    .map(|b| self.frame_bound(b))
                    .transpose()?,
            }),
            None => None,
        };
        Ok(WindowDef {
            name: None,
            refname: spec.window_name.as_ref().map(|n| self.ident(n)),
            partition_by: self.exprs(&spec.partition_by)?,
            order_by: self.sort_list(&spec.order_by)?,
            frame,
            loc: Location::UNKNOWN,
        })
    }

    fn frame_bound(&mut self, bound: &WindowFrameBound) -> Result<FrameBound> {
        Ok(match bound {
            WindowFrameBound::CurrentRow => FrameBound::CurrentRow,
            WindowFrameBound::Preceding(None) => FrameBound::UnboundedPreceding,
            WindowFrameBound::Preceding(Some(e)) => FrameBound::Preceding(Box::new(self.expr(e)?)),
            WindowFrameBound::Following(None) => FrameBound::UnboundedFollowing,
            WindowFrameBound::Following(Some(e)) => FrameBound::Following(Box::new(self.expr(e)?)),
        })
    }

    // ---- FROM ----

    fn table_with_joins(&mut self, twj: &TableWithJoins) -> Result<FromItem> {
        let mut item = self.table_factor(&twj.relation)?;
        for join in &twj.joins {
            let right = self.table_factor(&join.relation)?;
            let (kind, constraint) = match &join.join_operator {
                JoinOperator::Inner(c) => (JoinKind::Inner, Some(c)),
                JoinOperator::LeftOuter(c) => (JoinKind::Left, Some(c)),
                JoinOperator::RightOuter(c) => (JoinKind::Right, Some(c)),
                JoinOperator::FullOuter(c) => (JoinKind::Full, Some(c)),
                JoinOperator::CrossJoin => (JoinKind::Inner, None),
                other => return Err(unsupported(format!("join type {:?}", other))),
            };
            let mut natural = false;
            let mut using = Vec::new();
            let mut quals = None;
            match constraint {
                Some(JoinConstraint::On(e)) => quals = Some(self.expr(e)?),
                Some(JoinConstraint::Using(cols)) => {
                    using = cols.iter().map(|c| self.ident(c)).collect();
                }
                Some(JoinConstraint::Natural) => natural = true,
                Some(JoinConstraint::None) | None => {}
            }
            let loc = right.location();
            item = FromItem::Join(Box::new(JoinExpr {
                kind,
                natural,
                left: item,
                right,
                using,
                quals,
                alias: None,
                loc,
            }));
        }
        Ok(item)
    }

    fn table_factor(&mut self, factor: &TableFactor) -> Result<FromItem> {
        match factor {
            TableFactor::Table {
                name,
                alias,
                args,
                with_ordinality,
                ..
            } => {
                let alias = alias.as_ref().map(|a| self.alias(a));
                match args {
                    None => Ok(FromItem::Relation(self.range_var(name, alias)?)),
                    Some(table_args) => {
                        let mut func = self.func_call_args(name, &table_args.args)?;
                        func.loc = name
                            .0
                            .last()
                            .map(|i| self.location(i.span))
                            .unwrap_or_default();
                        Ok(FromItem::Function {
                            lateral: false,
                            loc: func.loc,
                            func: Box::new(func),
                            ordinality: *with_ordinality,
                            alias,
                        })
                    }
                }
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
                ..
            } => Ok(FromItem::Subselect {
                lateral: *lateral,
                loc: self.query_loc(subquery),
                query: Box::new(self.query(subquery)?),
                alias: alias.as_ref().map(|a| self.alias(a)),
            }),
            TableFactor::Function {
                lateral,
                name,
                args,
                alias,
                ..
            } => {
                let mut func = self.func_call_args(name, args)?;
                func.loc = name
                    .0
                    .last()
                    .map(|i| self.location(i.span))
                    .unwrap_or_default();
                Ok(FromItem::Function {
                    lateral: *lateral,
                    loc: func.loc,
                    func: Box::new(func),
                    ordinality: false,
                    alias: alias.as_ref().map(|a| self.alias(a)),
                })
            }
            TableFactor::UNNEST {
                alias,
                array_exprs,
                with_ordinality,
                ..
            } => {
                let func = FuncCall::new("unnest", self.exprs(array_exprs)?);
                Ok(FromItem::Function {
                    lateral: false,
                    loc: Location::UNKNOWN,
                    func: Box::new(func),
                    ordinality: *with_ordinality,
                    alias: alias.as_ref().map(|a| self.alias(a)),
                })
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
                ..
            } => {
                let item = self.table_with_joins(table_with_joins)?;
                match (item, alias) {
                    (FromItem::Join(mut join), Some(alias)) => {
                        join.alias = Some(self.alias(alias));
                        Ok(FromItem::Join(join))
                    }
                    (item, None) => Ok(item),
                    (_, Some(_)) => Err(unsupported("an alias on a parenthesized relation")),
                }
            }
            other => Err(unsupported(format!("\"{}\" in FROM", other))),
        }
    }

    // ---- expressions ----

    fn exprs(&mut self, exprs: &[ast::Expr]) -> Result<Vec<RawExpr>> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn boxed(&mut self, expr: &ast::Expr) -> Result<Box<RawExpr>> {
        Ok(Box::new(self.expr(expr)?))
    }

    fn call(&mut self, name: &str, args: Vec<RawExpr>, loc: Location) -> RawExpr {
        let mut func = FuncCall::new(name, args);
        func.loc = loc;
        RawExpr::FuncCall(Box::new(func))
    }

    fn expr(&mut self, expr: &ast::Expr) -> Result<RawExpr> {
        stack::maybe_grow(|| self.expr_node(expr))
    }

    fn expr_node(&mut self, expr: &ast::Expr) -> Result<RawExpr> {
        use ast::Expr as E;

        let loc = self.expr_loc(expr);
        let out = match expr {
            E::Identifier(ident) => {
                let name = self.ident(ident);
                if ident.quote_style.is_none() {
                    if name == "rownum" && self.dialect.supports_rownum() {
                        return Ok(RawExpr::Rownum(loc));
                    }
                    if name == "default" {
                        return Ok(RawExpr::SetToDefault(loc));
                    }
                }
                RawExpr::ColumnRef(ColumnRef {
                    fields: vec![ColumnField::Name(name)],
                    prior: self.take_prior(loc),
                    loc,
                })
            }
            E::CompoundIdentifier(idents) => RawExpr::ColumnRef(ColumnRef {
                fields: idents
                    .iter()
                    .map(|i| ColumnField::Name(self.ident(i)))
                    .collect(),
                prior: self.take_prior(loc),
                loc,
            }),
            E::Wildcard(..) => RawExpr::column(&["*"]),
            E::QualifiedWildcard(name, ..) => {
                let mut fields: Vec<ColumnField> =
                    self.object_name(name).into_iter().map(ColumnField::Name).collect();
                fields.push(ColumnField::Star);
                RawExpr::ColumnRef(ColumnRef {
                    fields,
                    prior: false,
                    loc,
                })
            }
            E::CompositeAccess { expr, key } => RawExpr::Indirection {
                arg: self.boxed(expr)?,
                indirection: vec![Indirection::Field(self.ident(key))],
                loc,
            },
            E::Value(value) => self.value(value, loc)?,
            E::Nested(inner) => self.expr(inner)?,
            E::BinaryOp { left, op, right } => match op {
                ast::BinaryOperator::And | ast::BinaryOperator::Or => RawExpr::Bool {
                    op: if matches!(op, ast::BinaryOperator::And) {
                        BoolOp::And
                    } else {
                        BoolOp::Or
                    },
                    args: vec![self.expr(left)?, self.expr(right)?],
                    loc,
                },
                other => RawExpr::Op {
                    name: other.to_string(),
                    left: Some(self.boxed(left)?),
                    right: Some(self.boxed(right)?),
                    loc,
                },
            },
            E::UnaryOp { op, expr: operand } => match op {
                ast::UnaryOperator::Not => RawExpr::Bool {
                    op: BoolOp::Not,
                    args: vec![self.expr(operand)?],
                    loc,
                },
                ast::UnaryOperator::Plus => self.expr(operand)?,
                ast::UnaryOperator::Minus => match operand.as_ref() {
                    E::Value(ast::Value::Number(n, _)) => {
                        self.number(&format!("-{}", n), loc)
                    }
                    _ => RawExpr::Op {
                        name: "-".to_string(),
                        left: None,
                        right: Some(self.boxed(operand)?),
                        loc,
                    },
                },
                other => RawExpr::Op {
                    name: other.to_string(),
                    left: None,
                    right: Some(self.boxed(operand)?),
                    loc,
                },
            },
            E::IsNull(arg) | E::IsNotNull(arg) => RawExpr::NullTest {
                is_not: matches!(expr, E::IsNotNull(_)),
                arg: self.boxed(arg)?,
                loc,
            },
            E::IsTrue(arg)
            | E::IsNotTrue(arg)
            | E::IsFalse(arg)
            | E::IsNotFalse(arg)
            | E::IsUnknown(arg)
            | E::IsNotUnknown(arg) => {
                let kind = match expr {
                    E::IsTrue(_) => BoolTestKind::IsTrue,
                    E::IsNotTrue(_) => BoolTestKind::IsNotTrue,
                    E::IsFalse(_) => BoolTestKind::IsFalse,
                    E::IsNotFalse(_) => BoolTestKind::IsNotFalse,
                    E::IsUnknown(_) => BoolTestKind::IsUnknown,
                    _ => BoolTestKind::IsNotUnknown,
                };
                RawExpr::BoolTest {
                    arg: self.boxed(arg)?,
                    kind,
                    loc,
                }
            }
            E::IsDistinctFrom(a, b) | E::IsNotDistinctFrom(a, b) => RawExpr::DistinctFrom {
                negated: matches!(expr, E::IsNotDistinctFrom(..)),
                left: self.boxed(a)?,
                right: self.boxed(b)?,
                loc,
            },
            E::InList {
                expr: test,
                list,
                negated,
            } => RawExpr::In {
                expr: self.boxed(test)?,
                list: self.exprs(list)?,
                negated: *negated,
                loc,
            },
            E::InSubquery {
                expr: test,
                subquery,
                negated,
            } => {
                let sublink = RawExpr::SubLink {
                    kind: SubLinkKind::Any("=".to_string()),
                    test: Some(self.boxed(test)?),
                    subselect: Box::new(self.query(subquery)?),
                    loc,
                };
                negate_if(*negated, sublink, loc)
            }
            E::Between {
                expr: test,
                negated,
                low,
                high,
            } => {
                let value = self.expr(test)?;
                let (low, high) = (self.expr(low)?, self.expr(high)?);
                if *negated {
                    RawExpr::Bool {
                        op: BoolOp::Or,
                        args: vec![
                            RawExpr::op("<", value.clone(), low),
                            RawExpr::op(">", value, high),
                        ],
                        loc,
                    }
                } else {
                    RawExpr::Bool {
                        op: BoolOp::And,
                        args: vec![
                            RawExpr::op(">=", value.clone(), low),
                            RawExpr::op("<=", value, high),
                        ],
                        loc,
                    }
                }
            }
            E::Like {
                negated,
                expr: value,
                pattern,
                escape_char,
                ..
            }
            | E::ILike {
                negated,
                expr: value,
                pattern,
                escape_char,
                ..
            } => {
                if escape_char.is_some() {
                    return Err(unsupported("LIKE ... ESCAPE"));
                }
                let name = match (matches!(expr, E::ILike { .. }), *negated) {
                    (false, false) => "~~",
                    (false, true) => "!~~",
                    (true, false) => "~~*",
                    (true, true) => "!~~*",
                };
                RawExpr::Op {
                    name: name.to_string(),
                    left: Some(self.boxed(value)?),
                    right: Some(self.boxed(pattern)?),
                    loc,
                }
            }
            E::SimilarTo {
                negated,
                expr: value,
                pattern,
                ..
            } => RawExpr::Op {
                name: if *negated { "!~" } else { "~" }.to_string(),
                left: Some(self.boxed(value)?),
                right: Some(self.boxed(pattern)?),
                loc,
            },
            E::AnyOp {
                left,
                compare_op,
                right,
                ..
            }
            | E::AllOp {
                left,
                compare_op,
                right,
                ..
            } => {
                let any = matches!(expr, E::AnyOp { .. });
                let op = compare_op.to_string();
                match right.as_ref() {
                    E::Subquery(query) => RawExpr::SubLink {
                        kind: if any {
                            SubLinkKind::Any(op)
                        } else {
                            SubLinkKind::All(op)
                        },
                        test: Some(self.boxed(left)?),
                        subselect: Box::new(self.query(query)?),
                        loc,
                    },
                    array => RawExpr::Op {
                        name: format!("{} {}", op, if any { "ANY" } else { "ALL" }),
                        left: Some(self.boxed(left)?),
                        right: Some(self.boxed(array)?),
                        loc,
                    },
                }
            }
            E::Exists { subquery, negated } => {
                let sublink = RawExpr::SubLink {
                    kind: SubLinkKind::Exists,
                    test: None,
                    subselect: Box::new(self.query(subquery)?),
                    loc,
                };
                negate_if(*negated, sublink, loc)
            }
            E::Subquery(query) => RawExpr::SubLink {
                kind: SubLinkKind::Expr,
                test: None,
                subselect: Box::new(self.query(query)?),
                loc,
            },
            E::Function(func) => self.function(func, loc)?,
            E::Case {
                operand,
                conditions,
                results,
                else_result,
                ..
            } => {
                let arg = operand.as_ref().map(|o| self.boxed(o)).transpose()?;
                let mut whens = Vec::with_capacity(conditions.len());
                for (cond, result) in conditions.iter().zip(results) {
                    whens.push((self.expr(cond)?, self.expr(result)?));
                }
                RawExpr::Case {
                    arg,
                    whens,
                    default: else_result.as_ref().map(|e| self.boxed(e)).transpose()?,
                    loc,
                }
            }
            E::Cast {
                expr: value,
                data_type,
                format,
                ..
            } => {
                if format.is_some() {
                    return Err(unsupported("CAST ... FORMAT"));
                }
                let mut type_name = self.data_type(data_type)?;
                type_name.loc = loc;
                RawExpr::TypeCast {
                    arg: self.boxed(value)?,
                    type_name,
                    loc,
                }
            }
            E::TypedString { data_type, value } => RawExpr::TypeCast {
                arg: Box::new(RawExpr::Const(Literal::String(value.clone()), loc)),
                type_name: self.data_type(data_type)?,
                loc,
            },
            E::Interval(interval) => {
                let mut value = self.expr(&interval.value)?;
                if let (RawExpr::Const(Literal::String(s), _), Some(field)) =
                    (&mut value, &interval.leading_field)
                {
                    // INTERVAL '3' DAY means '3 day'
                    if !s.chars().any(|c| c.is_ascii_alphabetic()) {
                        *s = format!("{} {}", s, field.to_string().to_lowercase());
                    }
                }
                RawExpr::TypeCast {
                    arg: Box::new(value),
                    type_name: TypeName::new("interval"),
                    loc,
                }
            }
            E::Extract { field, expr: value, .. } => {
                let part = RawExpr::Const(Literal::String(field.to_string().to_lowercase()), loc);
                let value = self.expr(value)?;
                self.call("date_part", vec![part, value], loc)
            }
            E::Substring {
                expr: value,
                substring_from,
                substring_for,
                ..
            } => {
                let mut args = vec![self.expr(value)?];
                args.push(match substring_from {
                    Some(from) => self.expr(from)?,
                    None => RawExpr::int(1),
                });
                if let Some(len) = substring_for {
                    args.push(self.expr(len)?);
                }
                self.call("substring", args, loc)
            }
            E::Trim {
                expr: value,
                trim_where,
                trim_what,
                trim_characters,
                ..
            } => {
                if trim_characters.is_some() {
                    return Err(unsupported("TRIM with a character list"));
                }
                let name = match trim_where {
                    Some(TrimWhereField::Leading) => "ltrim",
                    Some(TrimWhereField::Trailing) => "rtrim",
                    Some(TrimWhereField::Both) | None => "btrim",
                };
                let mut args = vec![self.expr(value)?];
                if let Some(what) = trim_what {
                    args.push(self.expr(what)?);
                }
                self.call(name, args, loc)
            }
            E::Position { expr: needle, r#in } => {
                let args = vec![self.expr(r#in)?, self.expr(needle)?];
                self.call("strpos", args, loc)
            }
            E::AtTimeZone {
                timestamp,
                time_zone,
            } => {
                let args = vec![self.expr(time_zone)?, self.expr(timestamp)?];
                self.call("timezone", args, loc)
            }
            E::Ceil { expr: value, .. } | E::Floor { expr: value, .. } => {
                let name = if matches!(expr, E::Ceil { .. }) {
                    "ceil"
                } else {
                    "floor"
                };
                let args = vec![self.expr(value)?];
                self.call(name, args, loc)
            }
            E::Collate { expr: value, collation } => RawExpr::Collate {
                arg: self.boxed(value)?,
                collation: self.object_name(collation),
                loc,
            },
            E::Tuple(items) => RawExpr::Row(self.exprs(items)?, loc),
            E::Array(array) => RawExpr::Array(self.exprs(&array.elem)?, loc),
            E::Subscript { expr: base, subscript } => {
                let step = self.subscript(subscript)?;
                match self.expr(base)? {
                    RawExpr::Indirection {
                        arg,
                        mut indirection,
                        loc: base_loc,
                    } => {
                        indirection.push(step);
                        RawExpr::Indirection {
                            arg,
                            indirection,
                            loc: base_loc,
                        }
                    }
                    other => RawExpr::Indirection {
                        arg: Box::new(other),
                        indirection: vec![step],
                        loc,
                    },
                }
            }
            other => return Err(unsupported(format!("expression \"{}\"", other)).at(loc.span())),
        };
        Ok(out)
    }

    fn subscript(&mut self, subscript: &ast::Subscript) -> Result<Indirection> {
        match subscript {
            ast::Subscript::Index { index } => Ok(Indirection::Subscript {
                lower: None,
                upper: Some(self.boxed(index)?),
                is_slice: false,
            }),
            ast::Subscript::Slice {
                lower_bound,
                upper_bound,
                stride,
            } => {
                if stride.is_some() {
                    return Err(unsupported("array slice stride"));
                }
                Ok(Indirection::Subscript {
                    lower: lower_bound.as_ref().map(|e| self.boxed(e)).transpose()?,
                    upper: upper_bound.as_ref().map(|e| self.boxed(e)).transpose()?,
                    is_slice: true,
                })
            }
        }
    }

    fn number(&self, text: &str, loc: Location) -> RawExpr {
        let integral = !text.contains(['.', 'e', 'E']);
        match text.parse::<i64>() {
            Ok(n) if integral => RawExpr::Const(Literal::Integer(n), loc),
            _ => RawExpr::Const(Literal::Numeric(text.to_string()), loc),
        }
    }

    fn value(&mut self, value: &ast::Value, loc: Location) -> Result<RawExpr> {
        use ast::Value as V;
        Ok(match value {
            V::Number(n, _) => self.number(n, loc),
            V::SingleQuotedString(s)
            | V::EscapedStringLiteral(s)
            | V::NationalStringLiteral(s)
            | V::DoubleQuotedString(s) => RawExpr::Const(Literal::String(s.clone()), loc),
            V::DollarQuotedString(s) => RawExpr::Const(Literal::String(s.value.clone()), loc),
            V::Boolean(b) => RawExpr::Const(Literal::Bool(*b), loc),
            V::Null => RawExpr::Const(Literal::Null, loc),
            V::Placeholder(p) => {
                let n = p
                    .strip_prefix('$')
                    .and_then(|n| n.parse::<u32>().ok())
                    .ok_or_else(|| unsupported(format!("parameter placeholder \"{}\"", p)))?;
                RawExpr::Param(n, loc)
            }
            other => return Err(unsupported(format!("literal {}", other))),
        })
    }

    /// Arguments of a call written as `name(args)` in FROM
    fn func_call_args(&mut self, name: &ObjectName, args: &[FunctionArg]) -> Result<FuncCall> {
        let mut func = FuncCall::new("", Vec::new());
        func.name = self.object_name(name);
        func.arg_names.clear();
        for arg in args {
            self.push_arg(&mut func, arg)?;
        }
        Ok(func)
    }

    fn push_arg(&mut self, func: &mut FuncCall, arg: &FunctionArg) -> Result<()> {
        let (name, value) = match arg {
            FunctionArg::Named { name, arg, .. } => (Some(self.ident(name)), arg),
            FunctionArg::Unnamed(arg) => (None, arg),
            other => return Err(unsupported(format!("function argument \"{}\"", other))),
        };
        match value {
            FunctionArgExpr::Expr(e) => {
                func.args.push(self.expr(e)?);
                func.arg_names.push(name);
            }
            FunctionArgExpr::Wildcard => func.agg_star = true,
            FunctionArgExpr::QualifiedWildcard(prefix) => {
                let mut fields: Vec<ColumnField> =
                    self.object_name(prefix).into_iter().map(ColumnField::Name).collect();
                fields.push(ColumnField::Star);
                func.args.push(RawExpr::ColumnRef(ColumnRef {
                    fields,
                    prior: false,
                    loc: Location::UNKNOWN,
                }));
                func.arg_names.push(name);
            }
        }
        Ok(())
    }

    fn function(&mut self, f: &ast::Function, loc: Location) -> Result<RawExpr> {
        let name = self.object_name(&f.name);
        let single = match name.as_slice() {
            [n] => Some(n.as_str()),
            _ => None,
        };

        if let (Some("array"), FunctionArguments::Subquery(query)) = (single, &f.args) {
            return Ok(RawExpr::SubLink {
                kind: SubLinkKind::Array,
                test: None,
                subselect: Box::new(self.query(query)?),
                loc,
            });
        }

        let mut func = FuncCall::new("", Vec::new());
        func.name = name.clone();
        func.arg_names.clear();
        func.loc = loc;
        match &f.args {
            FunctionArguments::None => {}
            FunctionArguments::Subquery(_) => {
                return Err(unsupported(format!("subquery argument to {}", f.name)))
            }
            FunctionArguments::List(list) => {
                func.agg_distinct = matches!(
                    list.duplicate_treatment,
                    Some(ast::DuplicateTreatment::Distinct)
                );
                for arg in &list.args {
                    self.push_arg(&mut func, arg)?;
                }
                for clause in &list.clauses {
                    match clause {
                        FunctionArgumentClause::OrderBy(order) => {
                            func.agg_order = self.sort_list(order)?;
                        }
                        other => {
                            return Err(unsupported(format!("function argument clause {:?}", other)))
                        }
                    }
                }
            }
        }

        if !f.within_group.is_empty() {
            func.agg_within_group = true;
            func.agg_order = self.sort_list(&f.within_group)?;
        }
        if let Some(filter) = &f.filter {
            func.agg_filter = Some(self.boxed(filter)?);
        }
        if let Some(over) = &f.over {
            let mut window = match over {
                WindowType::NamedWindow(name) => WindowDef {
                    name: Some(self.ident(name)),
                    refname: None,
                    partition_by: Vec::new(),
                    order_by: Vec::new(),
                    frame: None,
                    loc,
                },
                WindowType::WindowSpec(spec) => self.window_spec(spec)?,
            };
            window.loc = loc;
            func.over = Some(Box::new(window));
        }

        // SQL-level special forms that share the call syntax
        let plain = func.over.is_none()
            && func.agg_filter.is_none()
            && func.agg_order.is_empty()
            && !func.agg_star
            && !func.agg_distinct
            && func.arg_names.iter().all(Option::is_none);
        if plain {
            match single {
                Some("coalesce") => return Ok(RawExpr::Coalesce(func.args, loc)),
                Some("nullif") if func.args.len() == 2 => {
                    let right = func.args.pop();
                    let left = func.args.pop();
                    if let (Some(left), Some(right)) = (left, right) {
                        return Ok(RawExpr::NullIf(Box::new(left), Box::new(right), loc));
                    }
                }
                Some(kind @ ("greatest" | "least")) => {
                    return Ok(RawExpr::MinMax {
                        greatest: kind == "greatest",
                        args: func.args,
                        loc,
                    })
                }
                Some("grouping") => return Ok(RawExpr::GroupingFunc(func.args, loc)),
                Some("row") if f.name.0.iter().all(|i| i.quote_style.is_none()) => {
                    return Ok(RawExpr::Row(func.args, loc))
                }
                _ => {}
            }
        }
        Ok(RawExpr::FuncCall(Box::new(func)))
    }

    // ---- types ----

    fn data_type(&mut self, data_type: &DataType) -> Result<TypeName> {
        let numeric_mods = |info: &ExactNumberInfo| match info {
            ExactNumberInfo::None => Vec::new(),
            ExactNumberInfo::Precision(p) => vec![RawExpr::int(*p as i64)],
            ExactNumberInfo::PrecisionAndScale(p, s) => {
                vec![RawExpr::int(*p as i64), RawExpr::int(*s as i64)]
            }
        };
        let length_mods = |len: &Option<CharacterLength>| match len {
            Some(CharacterLength::IntegerLength { length, .. }) => {
                vec![RawExpr::int(*length as i64)]
            }
            _ => Vec::new(),
        };
        let precision_mods = |p: &Option<u64>| p.map(|p| vec![RawExpr::int(p as i64)]).unwrap_or_default();
        let with_tz = |tz: &TimezoneInfo| matches!(tz, TimezoneInfo::WithTimeZone | TimezoneInfo::Tz);

        let typed = |name: &str, typmods: Vec<RawExpr>| TypeName {
            names: vec![name.to_string()],
            typmods,
            ..Default::default()
        };

        Ok(match data_type {
            DataType::Numeric(info) | DataType::Decimal(info) | DataType::Dec(info) => {
                typed("numeric", numeric_mods(info))
            }
            DataType::Varchar(len) | DataType::CharacterVarying(len) | DataType::CharVarying(len) => {
                typed("varchar", length_mods(len))
            }
            DataType::Char(len) | DataType::Character(len) => {
                let mods = length_mods(len);
                // bare CHAR is CHAR(1)
                typed("bpchar", if mods.is_empty() { vec![RawExpr::int(1)] } else { mods })
            }
            DataType::Float(Some(p)) => typed(if *p <= 24 { "float4" } else { "float8" }, Vec::new()),
            DataType::Timestamp(p, tz) => typed(
                if with_tz(tz) { "timestamptz" } else { "timestamp" },
                precision_mods(p),
            ),
            DataType::Time(p, tz) => {
                typed(if with_tz(tz) { "timetz" } else { "time" }, precision_mods(p))
            }
            DataType::Array(elem) => {
                let (inner, bound) = match elem {
                    ArrayElemTypeDef::SquareBracket(inner, size) => {
                        (inner, size.map(|s| s as i32).unwrap_or(-1))
                    }
                    ArrayElemTypeDef::AngleBracket(inner) => (inner, -1),
                    _ => return Err(unsupported("ARRAY without element type")),
                };
                let mut type_name = self.data_type(inner)?;
                type_name.array_bounds.push(bound);
                type_name
            }
            DataType::Custom(name, mods) => {
                let mut names = self.object_name(name);
                // name%TYPE / name%ROWTYPE reach here only from type strings
                let mut type_name = TypeName::default();
                if let Some(last) = names.last_mut() {
                    if let Some(base) = strip_suffix_ci(last, "%rowtype") {
                        *last = base;
                        type_name.pct_rowtype = true;
                    } else if let Some(base) = strip_suffix_ci(last, "%type") {
                        *last = base;
                        type_name.pct_type = true;
                    }
                }
                type_name.names = names;
                type_name.typmods = mods
                    .iter()
                    .map(|m| match m.trim().parse::<i64>() {
                        Ok(n) => RawExpr::int(n),
                        Err(_) => RawExpr::string(m.trim()),
                    })
                    .collect();
                type_name
            }
            other => {
                let text = other.to_string().to_lowercase();
                let base = text.split('(').next().unwrap_or_default().trim().to_string();
                typed(&base, Vec::new())
            }
        })
    }
}

fn strip_suffix_ci(name: &str, suffix: &str) -> Option<String> {
    let n = name.len().checked_sub(suffix.len())?;
    if name.is_char_boundary(n) && name[n..].eq_ignore_ascii_case(suffix) {
        Some(name[..n].to_string())
    } else {
        None
    }
}

fn negate_if(negated: bool, expr: RawExpr, loc: Location) -> RawExpr {
    if negated {
        RawExpr::Bool {
            op: BoolOp::Not,
            args: vec![expr],
            loc,
        }
    } else {
        expr
    }
}
