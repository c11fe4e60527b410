//! WITH clause analysis
//!
//! Items of a plain WITH become visible one by one, so each sees only the
//! items before it. In WITH RECURSIVE every item is visible from the start
//! and the items are analysed in dependency order.

use std::collections::BTreeSet;

use tracing::debug;

use super::state::{error_at, CteEntry, CteState, ParseState, Transformer};
use crate::error::{DiagnosticKind, Result};
use crate::query::walker::{walk_query, Walk};
use crate::query::{Expr, Query, RteKind};
use crate::syntax::visit::{walk_select, RawVisitor};
use crate::syntax::{Location, RangeVar, SelectBody, SelectStmt, SetOpKind, WithClause};

/// Collects the WITH item names a raw statement refers to, ignoring names
/// shadowed by a nested WITH
struct CteReferences<'n> {
    names: &'n [String],
    shadowed: Vec<Vec<String>>,
    found: BTreeSet<usize>,
}

impl RawVisitor for CteReferences<'_> {
    fn enter_select(&mut self, stmt: &SelectStmt) -> Walk {
        let inner = stmt
            .with
            .iter()
            .flat_map(|w| w.ctes.iter().map(|c| c.name.clone()))
            .collect();
        self.shadowed.push(inner);
        Walk::Continue
    }

    fn leave_select(&mut self, _stmt: &SelectStmt) {
        self.shadowed.pop();
    }

    fn visit_range_var(&mut self, rv: &RangeVar) {
        if rv.schema.is_some() || self.shadowed.iter().flatten().any(|n| *n == rv.name) {
            return;
        }
        if let Some(i) = self.names.iter().position(|n| *n == rv.name) {
            self.found.insert(i);
        }
    }
}

fn references(names: &[String], stmt: &SelectStmt) -> BTreeSet<usize> {
    let mut visitor = CteReferences {
        names,
        shadowed: Vec::new(),
        found: BTreeSet::new(),
    };
    walk_select(&mut visitor, stmt);
    visitor.found
}

/// Self references to `name` anywhere in an analyzed query
fn count_self_references(query: &Query, name: &str) -> usize {
    fn in_range_tables(query: &Query, name: &str) -> usize {
        let mut count = 0;
        for rte in &query.rtable {
            match &rte.kind {
                RteKind::Cte {
                    name: n,
                    self_reference: true,
                    ..
                } if n == name => count += 1,
                RteKind::Subquery { query } => count += in_range_tables(query, name),
                _ => {}
            }
        }
        count + query.cte_list.iter().map(|c| in_range_tables(&c.query, name)).sum::<usize>()
    }

    let mut count = in_range_tables(query, name);
    let _ = walk_query(query, 0, &mut |e: &Expr, _| -> std::result::Result<Walk, ()> {
        match e {
            Expr::SubLink(sublink) => {
                count += count_self_references(&sublink.subselect, name);
                Ok(Walk::Skip)
            }
            _ => Ok(Walk::Continue),
        }
    });
    count
}

impl Transformer<'_> {
    /// Register and analyse the items of a WITH clause on the current level
    pub(crate) fn transform_with_clause(&mut self, with: &WithClause) -> Result<()> {
        for (i, cte) in with.ctes.iter().enumerate() {
            if with.ctes[..i].iter().any(|c| c.name == cte.name) {
                return Err(error_at(
                    DiagnosticKind::DuplicateAlias,
                    format!("WITH query name \"{}\" specified more than once", cte.name),
                    cte.loc,
                ));
            }
        }

        let base = self.pstate().ctes.len();
        for cte in &with.ctes {
            let mut entry = CteEntry::new(cte.name.clone(), cte.columns.clone(), cte.query.clone(), cte.loc);
            entry.visible = with.recursive;
            self.pstate_mut().ctes.push(entry);
        }

        if with.recursive {
            for i in self.recursive_order(with)? {
                self.analyze_cte(base + i)?;
            }
        } else {
            for i in 0..with.ctes.len() {
                self.analyze_cte(base + i)?;
                self.pstate_mut().ctes[base + i].visible = true;
            }
        }
        Ok(())
    }

    /// Order the items of a WITH RECURSIVE so that every item comes after
    /// the items it references, marking self-referencing items recursive
    fn recursive_order(&mut self, with: &WithClause) -> Result<Vec<usize>> {
        let names: Vec<String> = with.ctes.iter().map(|c| c.name.clone()).collect();
        let mut deps: Vec<BTreeSet<usize>> = with
            .ctes
            .iter()
            .map(|c| references(&names, &c.query))
            .collect();
        let base = self.pstate().ctes.len() - names.len();
        for (i, dep) in deps.iter_mut().enumerate() {
            if dep.remove(&i) {
                self.pstate_mut().ctes[base + i].recursive = true;
            }
        }

        let mut order = Vec::with_capacity(names.len());
        let mut done = vec![false; names.len()];
        while order.len() < names.len() {
            let next = (0..names.len()).find(|&i| !done[i] && deps[i].iter().all(|&d| done[d]));
            let Some(i) = next else {
                let stuck = (0..names.len()).find(|&i| !done[i]).unwrap_or_default();
                return Err(error_at(
                    DiagnosticKind::FeatureNotSupported,
                    "mutual recursion between WITH items is not implemented",
                    with.ctes[stuck].loc,
                ));
            };
            done[i] = true;
            order.push(i);
        }
        debug!(?order, "ordered recursive WITH items");
        Ok(order)
    }

    fn analyze_cte(&mut self, idx: usize) -> Result<()> {
        let scope_idx = self.scopes.len() - 1;
        let (raw, recursive) = {
            let entry = &self.pstate().ctes[idx];
            (entry.raw.clone(), entry.recursive)
        };
        debug!(cte = %self.pstate().ctes[idx].name, recursive, "analyzing WITH item");

        let query = if recursive {
            self.analyze_recursive_cte(scope_idx, idx, &raw)?
        } else {
            let query = self.analyze_cte_body(scope_idx, idx, &raw)?;
            self.set_cte_columns(idx, &query, raw.loc)?;
            query
        };
        let entry = &mut self.pstate_mut().ctes[idx];
        entry.query = Some(query);
        entry.state = CteState::Done;
        Ok(())
    }

    fn analyze_cte_body(&mut self, scope_idx: usize, idx: usize, stmt: &SelectStmt) -> Result<Query> {
        let scope = ParseState {
            parent_cte: Some((scope_idx, idx)),
            ..Default::default()
        };
        let (query, _) = self.with_scope(scope, |t| t.transform_select_stmt(stmt))?;
        Ok(query)
    }

    fn analyze_recursive_cte(&mut self, scope_idx: usize, idx: usize, raw: &SelectStmt) -> Result<Query> {
        let name = self.pstate().ctes[idx].name.clone();
        let not_implemented = |what: &str| {
            error_at(
                DiagnosticKind::FeatureNotSupported,
                format!("{} in a recursive query is not implemented", what),
                raw.loc,
            )
        };
        let SelectBody::SetOp {
            op: SetOpKind::Union,
            left,
            ..
        } = &raw.body
        else {
            return Err(error_at(
                DiagnosticKind::InvalidRecursion,
                format!(
                    "recursive query \"{}\" does not have the form non-recursive-term UNION [ALL] recursive-term",
                    name
                ),
                raw.loc,
            ));
        };
        if !raw.order_by.is_empty() {
            return Err(not_implemented("ORDER BY"));
        }
        if raw.offset.is_some() {
            return Err(not_implemented("OFFSET"));
        }
        if raw.limit.is_some() {
            return Err(not_implemented("LIMIT"));
        }
        if !raw.locking.is_empty() {
            return Err(not_implemented("FOR UPDATE/SHARE"));
        }

        // the non-recursive term alone fixes the item's column types
        self.pstate_mut().ctes[idx].state = CteState::NonRecursiveTerm;
        let seed = self.analyze_cte_body(scope_idx, idx, left)?;
        self.set_cte_columns(idx, &seed, raw.loc)?;

        self.pstate_mut().ctes[idx].state = CteState::RecursiveTerm;
        let query = self.analyze_cte_body(scope_idx, idx, raw)?;

        if count_self_references(&query, &name) > 1 {
            return Err(error_at(
                DiagnosticKind::InvalidRecursion,
                format!("recursive reference to query \"{}\" must not appear more than once", name),
                raw.loc,
            ));
        }
        let entry = &self.pstate().ctes[idx];
        for (i, te) in query.visible_targets().enumerate() {
            let (Some(&seed_type), Some(&seed_typmod)) = (entry.coltypes.get(i), entry.coltypmods.get(i)) else {
                break;
            };
            let (overall, overall_typmod) = (te.expr.type_oid(), te.expr.typmod());
            if seed_type != overall || seed_typmod != overall_typmod {
                return Err(error_at(
                    DiagnosticKind::TypeMismatch,
                    format!(
                        "recursive query \"{}\" column {} has type {} in non-recursive term but type {} overall",
                        name,
                        i + 1,
                        self.type_name(seed_type, seed_typmod),
                        self.type_name(overall, overall_typmod)
                    ),
                    te.expr.location(),
                )
                .with_help("Cast the output of the non-recursive term to the correct type."));
            }
        }
        Ok(query)
    }

    /// Record the output shape of a WITH item, applying its column aliases
    fn set_cte_columns(&mut self, idx: usize, query: &Query, loc: Location) -> Result<()> {
        let entry = &mut self.pstate_mut().ctes[idx];
        entry.colnames.clear();
        entry.coltypes.clear();
        entry.coltypmods.clear();
        entry.colcollations.clear();
        for te in query.visible_targets() {
            entry
                .colnames
                .push(te.resname.clone().unwrap_or_else(|| "?column?".to_string()));
            entry.coltypes.push(te.expr.type_oid());
            entry.coltypmods.push(te.expr.typmod());
            entry.colcollations.push(te.expr.collation());
        }
        if entry.aliascolnames.len() > entry.colnames.len() {
            return Err(error_at(
                DiagnosticKind::InvalidColumnReference,
                format!(
                    "table \"{}\" has {} columns available but {} columns specified",
                    entry.name,
                    entry.colnames.len(),
                    entry.aliascolnames.len()
                ),
                loc,
            ));
        }
        for (name, alias) in entry.colnames.iter_mut().zip(&entry.aliascolnames) {
            *name = alias.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{analyze, analyze_err};
    use crate::syntax::{CommonTableExpr, FromItem, SimpleSelect};
    use crate::types::{INT4_OID, TEXT_OID};
    use pretty_assertions::assert_eq;

    fn select_from(table: &str) -> Box<SelectStmt> {
        Box::new(SelectStmt::simple(SimpleSelect {
            from: vec![FromItem::Relation(RangeVar::new(table))],
            ..Default::default()
        }))
    }

    #[test]
    fn test_references_ignore_shadowing_with() {
        let names = vec!["a".to_string(), "b".to_string()];
        let mut stmt = SelectStmt::simple(SimpleSelect {
            from: vec![
                FromItem::Relation(RangeVar::new("a")),
                FromItem::Subselect {
                    lateral: false,
                    query: select_from("b"),
                    alias: None,
                    loc: Location::UNKNOWN,
                },
            ],
            ..Default::default()
        });
        assert_eq!(references(&names, &stmt), BTreeSet::from([0, 1]));

        stmt.with = Some(WithClause {
            recursive: false,
            ctes: vec![CommonTableExpr {
                name: "a".to_string(),
                columns: Vec::new(),
                query: select_from("t"),
                loc: Location::UNKNOWN,
            }],
            loc: Location::UNKNOWN,
        });
        assert_eq!(references(&names, &stmt), BTreeSet::from([1]));
    }

    #[test]
    fn test_items_see_only_earlier_items() {
        let query = analyze("WITH a AS (SELECT 1 AS x), b AS (SELECT x FROM a) SELECT * FROM b");
        assert_eq!(query.cte_list.len(), 2);
        assert_eq!(query.cte_list[0].refcount, 1);
        assert_eq!(query.cte_list[1].colnames, vec!["x"]);

        let err = analyze_err("WITH b AS (SELECT x FROM a), a AS (SELECT 1 AS x) SELECT * FROM b");
        assert_eq!(err.message, "relation \"a\" does not exist");
        assert_eq!(
            err.detail.as_deref(),
            Some("There is a WITH item named \"a\", but it cannot be referenced from this part of the query.")
        );
    }

    #[test]
    fn test_recursive_item() {
        let query = analyze(
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM r WHERE n < 10) SELECT n FROM r",
        );
        assert!(query.has_recursive);
        let cte = &query.cte_list[0];
        assert!(cte.recursive);
        assert_eq!(cte.colnames, vec!["n"]);
        assert_eq!(cte.coltypes, vec![INT4_OID]);
        // the self reference is not counted
        assert_eq!(cte.refcount, 1);
        assert_eq!(count_self_references(&cte.query, "r"), 1);
    }

    #[test]
    fn test_recursive_items_in_dependency_order() {
        let query = analyze(
            "WITH RECURSIVE a AS (SELECT name FROM b), b AS (SELECT name FROM t) SELECT * FROM a",
        );
        assert_eq!(query.cte_list[0].coltypes, vec![TEXT_OID]);
    }

    #[test]
    fn test_recursive_errors() {
        let err = analyze_err("WITH RECURSIVE r AS (SELECT * FROM r) SELECT * FROM r");
        assert_eq!(
            err.message,
            "recursive query \"r\" does not have the form non-recursive-term UNION [ALL] recursive-term"
        );

        let err = analyze_err(
            "WITH RECURSIVE r(n) AS (SELECT n FROM r UNION SELECT 1) SELECT * FROM r",
        );
        assert_eq!(
            err.message,
            "recursive reference to query \"r\" must not appear within its non-recursive term"
        );

        let err = analyze_err(
            "WITH RECURSIVE a AS (SELECT 1 UNION SELECT * FROM b), b AS (SELECT 1 UNION SELECT * FROM a) SELECT * FROM a",
        );
        assert_eq!(err.message, "mutual recursion between WITH items is not implemented");

        let err = analyze_err(
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT r.n FROM r, r AS r2) SELECT * FROM r",
        );
        assert_eq!(err.message, "recursive reference to query \"r\" must not appear more than once");
    }

    #[test]
    fn test_recursive_type_mismatch() {
        let err = analyze_err(
            "WITH RECURSIVE r(n) AS (SELECT 1 UNION ALL SELECT n::bigint + 1 FROM r) SELECT * FROM r",
        );
        assert_eq!(
            err.message,
            "recursive query \"r\" column 1 has type integer in non-recursive term but type bigint overall"
        );
        assert_eq!(
            err.help.as_deref(),
            Some("Cast the output of the non-recursive term to the correct type.")
        );
    }

    #[test]
    fn test_alias_list_too_long() {
        let err = analyze_err("WITH a(x, y) AS (SELECT 1) SELECT * FROM a");
        assert_eq!(err.message, "table \"a\" has 1 columns available but 2 columns specified");

        let err = analyze_err("WITH a AS (SELECT 1), a AS (SELECT 2) SELECT * FROM a");
        assert_eq!(err.message, "WITH query name \"a\" specified more than once");
    }
}
