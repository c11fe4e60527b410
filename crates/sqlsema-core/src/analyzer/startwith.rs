//! START WITH / CONNECT BY rewriting
//!
//! A hierarchical SELECT is rewritten into a recursive WITH item over the
//! FROM items it walks:
//!
//! ```text
//! WITH RECURSIVE tmp_result AS (
//!     SELECT t.a AS "t@a", ... FROM t WHERE <start with>
//!     UNION ALL
//!     SELECT t.a AS "t@a", ... FROM tmp_result JOIN t ON <connect by>
//! )
//! ```
//!
//! The FROM items are then replaced by one reference to `tmp_result`,
//! which carries the original relation names so later clauses keep
//! resolving `t.a` and `a` to the `t@a` column. The raw trees are never
//! modified; every rewrite builds new expressions.

use tracing::debug;

use super::expr_kind::ExprKind;
use super::state::{error_at, CteEntry, NamespaceItem, Transformer};
use crate::error::{DiagnosticKind, Result};
use crate::query::walker::Walk;
use crate::query::{ConnectByType, Const, Expr, JoinTreeNode, RangeTblEntry, RteKind, StartWithOptions, TargetEntry};
use crate::syntax::lower::MAX_IDENTIFIER_LENGTH;
use crate::syntax::visit::{and_all, conjuncts, map_expr, walk_expr, RawVisitor};
use crate::syntax::{
    Alias, ColumnField, ColumnRef, CommonTableExpr, FromItem, JoinExpr, JoinKind, Location, RangeVar, RawExpr,
    ResTarget, SelectBody, SelectStmt, SetOpKind, SimpleSelect, StartWithClause, WithClause,
};
use crate::types::{INT4_OID, INVALID_OID};

/// Name of the working table of a rewritten hierarchical query
pub(crate) const WORK_TABLE: &str = "tmp_result";

/// Output columns every rewritten query carries after the dummy columns
pub(crate) const PSEUDO_COLUMNS: [&str; 4] = ["level", "connect_by_isleaf", "connect_by_iscycle", "rownum"];

/// One FROM item taking part in the rewrite
#[derive(Debug)]
struct HierarchyRel {
    refname: String,
    item: FromItem,
    /// Column names in attribute order; dropped columns are empty
    columns: Vec<String>,
}

fn is_pseudo_ref(expr: &RawExpr) -> bool {
    match expr {
        RawExpr::Rownum(_) => true,
        RawExpr::ColumnRef(cref) => matches!(cref.fields.as_slice(), [ColumnField::Name(n)] if n == "level"),
        _ => false,
    }
}

fn unsupported_connect_by(loc: Location) -> crate::error::Diagnostic {
    error_at(
        DiagnosticKind::FeatureNotSupported,
        "Unsupported expression found in CONNECT BY clause.",
        loc,
    )
}

/// What a CONNECT BY conjunct mentions
#[derive(Default)]
struct Mentions {
    pseudo: bool,
    prior: bool,
    columns: usize,
}

impl RawVisitor for Mentions {
    fn visit_expr(&mut self, expr: &RawExpr) -> Walk {
        if is_pseudo_ref(expr) {
            self.pseudo = true;
        }
        match expr {
            RawExpr::ColumnRef(cref) => {
                self.columns += 1;
                self.prior |= cref.prior;
                Walk::Continue
            }
            // sub-selects are separate queries
            RawExpr::SubLink { .. } => Walk::Skip,
            _ => Walk::Continue,
        }
    }
}

fn mentions(expr: &RawExpr) -> Mentions {
    let mut m = Mentions::default();
    walk_expr(&mut m, expr);
    m
}

/// Derives the connect-by type. A LEVEL or ROWNUM inside CONNECT BY makes
/// the query level- or rownum-driven; START WITH comparing one of them as
/// a left operand makes it mixed. Later mentions override earlier ones.
struct ConnectByClassifier {
    in_connect_by: bool,
    kind: ConnectByType,
}

impl RawVisitor for ConnectByClassifier {
    fn visit_expr(&mut self, expr: &RawExpr) -> Walk {
        match expr {
            RawExpr::Op { left: Some(left), .. } if !self.in_connect_by && is_pseudo_ref(left) => {
                self.kind = ConnectByType::MixedLevel;
                Walk::Skip
            }
            RawExpr::Rownum(_) if self.in_connect_by => {
                self.kind = ConnectByType::Rownum;
                Walk::Continue
            }
            e if self.in_connect_by && is_pseudo_ref(e) => {
                self.kind = ConnectByType::Level;
                Walk::Continue
            }
            RawExpr::SubLink { .. } => Walk::Skip,
            _ => Walk::Continue,
        }
    }
}

/// Working state of one rewrite
struct HierarchyRewrite<'r> {
    rels: &'r [HierarchyRel],
    /// Dummy names of every column reached through PRIOR, first use first
    prior_names: Vec<String>,
}

impl<'r> HierarchyRewrite<'r> {
    fn new(rels: &'r [HierarchyRel]) -> Self {
        Self {
            rels,
            prior_names: Vec::new(),
        }
    }

    fn dummy_name(rel: &str, col: &str) -> Result<String> {
        let name = format!("{}@{}", rel, col);
        if name.len() > MAX_IDENTIFIER_LENGTH {
            return Err(error_at(
                DiagnosticKind::NameTooLong,
                format!(
                    "Exceed maximum StartWithDummayColname length {}, relname {}, column {}.",
                    name.len(),
                    rel,
                    col
                ),
                Location::UNKNOWN,
            ));
        }
        Ok(name)
    }

    /// The single item owning an unqualified column
    fn owner(&self, col: &str, loc: Location) -> Result<Option<&'r HierarchyRel>> {
        let mut found = None;
        for rel in self.rels {
            if rel.columns.iter().any(|c| c == col) {
                if found.is_some() {
                    return Err(error_at(
                        DiagnosticKind::AmbiguousColumn,
                        format!("column reference \"{}\" is ambiguous.", col),
                        loc,
                    ));
                }
                found = Some(rel);
            }
        }
        Ok(found)
    }

    /// Qualify a column reference with its owning item. In CONNECT BY a
    /// PRIOR reference becomes a reference to the working table's dummy
    /// column. References no item owns are left alone; they may belong to
    /// an outer query.
    fn qualify_ref(&mut self, cref: &ColumnRef, in_connect_by: bool) -> Result<Option<ColumnRef>> {
        if cref.is_star() {
            return Ok(None);
        }
        let names: Vec<&str> = cref
            .fields
            .iter()
            .filter_map(|f| match f {
                ColumnField::Name(n) => Some(n.as_str()),
                ColumnField::Star => None,
            })
            .collect();
        let owned = match names.as_slice() {
            [col] => self.owner(col, cref.loc)?.map(|rel| (rel.refname.as_str(), *col)),
            [rel, col] => self
                .rels
                .iter()
                .find(|r| r.refname == *rel)
                .map(|r| (r.refname.as_str(), *col)),
            _ => None,
        };

        let Some((rel, col)) = owned else {
            if cref.prior && in_connect_by {
                return Err(error_at(
                    DiagnosticKind::ColumnNotFound,
                    format!("column {} does not exist", cref.dotted()),
                    cref.loc,
                ));
            }
            return Ok(None);
        };

        if cref.prior && in_connect_by {
            let dummy = Self::dummy_name(rel, col)?;
            if !self.prior_names.contains(&dummy) {
                self.prior_names.push(dummy.clone());
            }
            let mut working = ColumnRef::new(&[WORK_TABLE, dummy.as_str()]);
            working.loc = cref.loc;
            return Ok(Some(working));
        }
        let mut qualified = ColumnRef::new(&[rel, col]);
        qualified.prior = cref.prior;
        qualified.loc = cref.loc;
        Ok(Some(qualified))
    }

    fn qualify(&mut self, expr: &RawExpr, in_connect_by: bool) -> Result<RawExpr> {
        map_expr(expr, &mut |e| match e {
            RawExpr::ColumnRef(cref) => Ok(self.qualify_ref(cref, in_connect_by)?.map(RawExpr::ColumnRef)),
            _ => Ok(None),
        })
    }

    /// Split CONNECT BY into the LEVEL/ROWNUM conjuncts and the rest, both
    /// qualified
    fn split_connect_by(&mut self, connect_by: &RawExpr) -> Result<(Vec<RawExpr>, Vec<RawExpr>)> {
        if is_pseudo_ref(connect_by) {
            return Err(unsupported_connect_by(connect_by.location()));
        }
        let mut level = Vec::new();
        let mut other = Vec::new();
        for conjunct in conjuncts(connect_by) {
            if is_pseudo_ref(conjunct) {
                return Err(unsupported_connect_by(conjunct.location()));
            }
            let m = mentions(conjunct);
            if m.pseudo && m.prior {
                return Err(error_at(
                    DiagnosticKind::FeatureNotSupported,
                    "column specified by prior cannot concide with ROWNUM/LEVEL.",
                    conjunct.location(),
                ));
            }
            let qualified = self.qualify(conjunct, true)?;
            if m.pseudo {
                level.push(qualified);
            } else {
                other.push(qualified);
            }
        }
        Ok((level, other))
    }

    /// `rel.col AS "rel@col"` for every live column of every item
    fn projection(&self) -> Result<Vec<ResTarget>> {
        let mut targets = Vec::new();
        for rel in self.rels {
            for col in rel.columns.iter().filter(|c| !c.is_empty()) {
                let name = Self::dummy_name(&rel.refname, col)?;
                targets.push(ResTarget::named(name, RawExpr::column(&[rel.refname.as_str(), col.as_str()])));
            }
        }
        Ok(targets)
    }

    /// The items of the step branch, cross-joined left to right. `quals`
    /// goes on the last join.
    fn joined_items(&self, quals: Option<RawExpr>) -> FromItem {
        let mut items = self.rels.iter().map(|r| r.item.clone());
        let first = items.next().unwrap_or_else(|| FromItem::Relation(RangeVar::new(WORK_TABLE)));
        let rest: Vec<FromItem> = items.collect();
        let last = rest.len();
        let mut quals = quals;
        rest.into_iter().enumerate().fold(first, |left, (i, right)| {
            let on = if i + 1 == last { quals.take() } else { None };
            inner_join(left, right, on)
        })
    }
}

fn inner_join(left: FromItem, right: FromItem, quals: Option<RawExpr>) -> FromItem {
    FromItem::Join(Box::new(JoinExpr {
        kind: JoinKind::Inner,
        natural: false,
        left,
        right,
        using: Vec::new(),
        quals: Some(quals.unwrap_or_else(|| RawExpr::boolean(true))),
        alias: None,
        loc: Location::UNKNOWN,
    }))
}

/// The WHERE conjuncts that can be pushed into the branches of a
/// multi-item rewrite: those with more than one column reference
fn join_conditions(where_clause: &RawExpr) -> Option<RawExpr> {
    and_all(
        conjuncts(where_clause)
            .into_iter()
            .filter(|c| mentions(c).columns > 1)
            .cloned()
            .collect(),
    )
}

/// Append the pseudo columns to a finished WITH item, once
fn add_pseudo_columns(entry: &mut CteEntry) {
    let Some(query) = entry.query.as_mut() else { return };
    if query.target_list.iter().any(|te| te.pseudo) {
        return;
    }
    for name in PSEUDO_COLUMNS {
        let resno = query.target_list.len() + 1;
        let mut te = TargetEntry::new(
            Expr::Const(Const::null(INT4_OID, -1, INVALID_OID)),
            resno,
            Some(name.to_string()),
            false,
        );
        te.pseudo = true;
        query.target_list.push(te);
        entry.colnames.push(name.to_string());
        entry.coltypes.push(INT4_OID);
        entry.coltypmods.push(-1);
        entry.colcollations.push(INVALID_OID);
    }
}

impl Transformer<'_> {
    /// Rewrite the FROM list of a hierarchical SELECT into one reference
    /// to a recursive WITH item and make it the level's only FROM entry
    pub(crate) fn transform_start_with(
        &mut self,
        from: &[FromItem],
        where_clause: Option<&RawExpr>,
        clause: &StartWithClause,
    ) -> Result<()> {
        let rels = self.hierarchy_rels(from, clause.loc)?;
        let mut rewrite = HierarchyRewrite::new(&rels);

        let start_with = clause
            .start_with
            .as_ref()
            .map(|e| rewrite.qualify(e, false))
            .transpose()?;
        let (level_quals, other_quals) = rewrite.split_connect_by(&clause.connect_by)?;
        if start_with.is_some() && rewrite.prior_names.is_empty() {
            return Err(error_at(
                DiagnosticKind::SyntaxError,
                "START WITH CONNECT BY clause must have at least one prior key",
                clause.loc,
            ));
        }

        let mut classifier = ConnectByClassifier {
            in_connect_by: false,
            kind: ConnectByType::Prior,
        };
        if let Some(sw) = &start_with {
            walk_expr(&mut classifier, sw);
        }
        classifier.in_connect_by = true;
        for e in level_quals.iter().chain(&other_quals) {
            walk_expr(&mut classifier, e);
        }

        let pushed = match where_clause {
            Some(w) if rels.len() > 1 => join_conditions(&rewrite.qualify(w, false)?),
            _ => None,
        };
        let projection = rewrite.projection()?;
        let other_quals = and_all(other_quals);

        let seed = SelectStmt::simple(SimpleSelect {
            targets: projection.clone(),
            from: rels.iter().map(|r| r.item.clone()).collect(),
            where_clause: and_all(start_with.into_iter().chain(pushed.clone()).collect()),
            ..Default::default()
        });
        let step = SelectStmt::simple(SimpleSelect {
            targets: projection,
            from: vec![inner_join(
                FromItem::Relation(RangeVar::new(WORK_TABLE)),
                rewrite.joined_items(pushed),
                other_quals.clone(),
            )],
            ..Default::default()
        });
        let with = WithClause {
            recursive: true,
            ctes: vec![CommonTableExpr {
                name: WORK_TABLE.to_string(),
                columns: Vec::new(),
                query: Box::new(SelectStmt {
                    body: SelectBody::SetOp {
                        op: SetOpKind::Union,
                        all: true,
                        left: Box::new(seed),
                        right: Box::new(step),
                    },
                    ..SelectStmt::simple(SimpleSelect::default())
                }),
                loc: clause.loc,
            }],
            loc: clause.loc,
        };
        debug!(
            rels = rels.len(),
            prior_keys = ?rewrite.prior_names,
            level_quals = level_quals.len(),
            "rewriting hierarchical query"
        );

        let saved = std::mem::replace(&mut self.pstate_mut().suppress_hierarchy, true);
        let analyzed = self.transform_with_clause(&with);
        self.pstate_mut().suppress_hierarchy = saved;
        analyzed?;

        let idx = self.pstate().ctes.len() - 1;
        let entry = &mut self.pstate_mut().ctes[idx];
        add_pseudo_columns(entry);
        let prior_key_index = rewrite
            .prior_names
            .iter()
            .filter_map(|name| entry.colnames.iter().position(|c| c == name))
            .collect();
        entry.sw_options = Some(StartWithOptions {
            siblings_order: clause.siblings_order.clone(),
            connect_by_type: classifier.kind,
            level_quals: None,
            other_quals,
            nocycle: clause.nocycle,
            prior_key_index,
        });

        let rtindex = self.add_cte_rte(&RangeVar::new(WORK_TABLE), 0, idx)?;
        if let Some(rte) = self.pstate_mut().rte_mut(rtindex) {
            rte.sw_converted = true;
            rte.origin_names = rels.iter().map(|r| r.refname.clone()).collect();
        }
        let pstate = self.pstate_mut();
        pstate.joinlist.push(JoinTreeNode::RangeTblRef(rtindex));
        pstate.namespace.push(NamespaceItem::new(rtindex));

        if let Some(raw) = and_all(level_quals) {
            let saved = std::mem::replace(&mut self.pstate_mut().suppress_hierarchy, true);
            let analyzed = self.transform_where_clause(&raw, ExprKind::Where, "CONNECT BY");
            self.pstate_mut().suppress_hierarchy = saved;
            let quals = analyzed?;
            if let Some(options) = self.pstate_mut().ctes[idx].sw_options.as_mut() {
                options.level_quals = Some(quals);
            }
        }
        Ok(())
    }

    /// Check the FROM items, name unaliased subqueries and learn each
    /// item's reference name and columns. The items are analysed once on
    /// this level and the resulting entries discarded again.
    fn hierarchy_rels(&mut self, from: &[FromItem], loc: Location) -> Result<Vec<HierarchyRel>> {
        let mut items = Vec::with_capacity(from.len());
        for item in from {
            match item {
                FromItem::Relation(_) => items.push(item.clone()),
                FromItem::Subselect {
                    lateral,
                    query,
                    alias: None,
                    loc,
                } => items.push(FromItem::Subselect {
                    lateral: *lateral,
                    query: query.clone(),
                    alias: Some(Alias::new(self.next_sw_subquery_name())),
                    loc: *loc,
                }),
                FromItem::Subselect { .. } => items.push(item.clone()),
                FromItem::Function { loc, .. } => return Err(not_rewritable(*loc)),
                FromItem::Join(join) => return Err(not_rewritable(join.loc)),
            }
        }
        if items.is_empty() {
            return Err(not_rewritable(loc));
        }

        let (rtable_len, joinlist_len, namespace_len) = {
            let pstate = self.pstate();
            (pstate.rtable.len(), pstate.joinlist.len(), pstate.namespace.len())
        };
        let warnings = self.warnings.len();
        self.transform_from_clause(&items)?;
        let pstate = self.pstate_mut();
        let probed: Vec<RangeTblEntry> = pstate.rtable.drain(rtable_len..).collect();
        pstate.joinlist.truncate(joinlist_len);
        pstate.namespace.truncate(namespace_len);
        self.warnings.truncate(warnings);

        // the branches reference the same WITH items again
        for rte in &probed {
            if let RteKind::Cte { name, levels_up, .. } = &rte.kind {
                let scope = self.scope_index(*levels_up);
                if let Some(cte) = self.scopes[scope].ctes.iter_mut().find(|c| c.visible && c.name == *name) {
                    cte.refcount = cte.refcount.saturating_sub(1);
                }
            }
        }

        Ok(items
            .into_iter()
            .zip(probed)
            .map(|(item, rte)| HierarchyRel {
                refname: rte.eref.aliasname,
                item,
                columns: rte.eref.colnames,
            })
            .collect())
    }
}

fn not_rewritable(loc: Location) -> crate::error::Diagnostic {
    error_at(
        DiagnosticKind::FeatureNotSupported,
        "START WITH/CONNECT BY can only rewrite tables and subqueries in the FROM clause",
        loc,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::testing::{analyze_oracle, analyze_oracle_err};
    use crate::query::{Query, SetOperationTree};
    use pretty_assertions::assert_eq;

    fn rte_names(query: &Query) -> Vec<String> {
        query.rtable.iter().map(|rte| rte.eref.aliasname.clone()).collect()
    }

    fn relation_count(query: &Query, relname: &str) -> usize {
        query
            .rtable
            .iter()
            .filter(|rte| matches!(&rte.kind, RteKind::Relation { relname: r, .. } if r == relname))
            .count()
    }

    #[test]
    fn test_rewrite_shape() {
        let query = analyze_oracle("SELECT * FROM t START WITH id = 1 CONNECT BY PRIOR id = parent_id");
        assert!(query.has_recursive);
        assert_eq!(query.cte_list.len(), 1);
        let cte = &query.cte_list[0];
        assert_eq!(cte.name, WORK_TABLE);
        assert!(cte.recursive);

        // outer level: one converted reference, no direct use of t
        assert_eq!(rte_names(&query), vec![WORK_TABLE]);
        assert_eq!(relation_count(&query, "t"), 0);
        assert!(query.rtable[0].sw_converted);
        assert_eq!(query.rtable[0].origin_names, vec!["t"]);

        let body = &cte.query;
        let op = body.set_operations.as_ref().expect("UNION ALL body");
        assert!(op.all);
        let (SetOperationTree::RangeTblRef(seed_idx), SetOperationTree::RangeTblRef(step_idx)) =
            (&op.larg, &op.rarg)
        else {
            panic!("expected two leaf arms");
        };
        let RteKind::Subquery { query: seed } = &body.rtable[seed_idx - 1].kind else {
            panic!("seed arm is not a subquery");
        };
        let RteKind::Subquery { query: step } = &body.rtable[step_idx - 1].kind else {
            panic!("step arm is not a subquery");
        };
        assert!(!seed
            .rtable
            .iter()
            .any(|rte| matches!(&rte.kind, RteKind::Cte { self_reference: true, .. })));
        assert_eq!(relation_count(seed, "t"), 1);

        // step arm: tmp_result JOIN t, working table on the left
        let self_refs: Vec<usize> = step
            .rtable
            .iter()
            .enumerate()
            .filter(|(_, rte)| matches!(&rte.kind, RteKind::Cte { self_reference: true, .. }))
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(self_refs.len(), 1);
        let [JoinTreeNode::Join(join)] = step.jointree.fromlist.as_slice() else {
            panic!("expected one join in the step arm");
        };
        assert_eq!(join.larg, JoinTreeNode::RangeTblRef(self_refs[0]));
        let JoinTreeNode::RangeTblRef(right) = &join.rarg else {
            panic!("expected t on the right");
        };
        assert_eq!(step.rtable[right - 1].relid(), query_relid(seed));
    }

    fn query_relid(query: &Query) -> Option<crate::types::Oid> {
        query.rtable.iter().find_map(|rte| rte.relid())
    }

    #[test]
    fn test_dummy_columns_and_options() {
        let query = analyze_oracle(
            "SELECT id, level FROM t START WITH parent_id IS NULL CONNECT BY NOCYCLE PRIOR id = parent_id AND level <= 3",
        );
        let cte = &query.cte_list[0];
        assert_eq!(
            cte.colnames,
            vec![
                "t@id",
                "t@code",
                "t@name",
                "t@parent_id",
                "t@amount",
                "level",
                "connect_by_isleaf",
                "connect_by_iscycle",
                "rownum"
            ]
        );
        assert_eq!(cte.coltypes[5..], [INT4_OID; 4]);
        assert_eq!(cte.query.target_list.iter().filter(|te| te.pseudo).count(), 4);

        let options = cte.sw_options.as_ref().expect("rewrite options");
        assert!(options.nocycle);
        assert_eq!(options.prior_key_index, vec![0]);
        assert_eq!(options.connect_by_type, ConnectByType::Level);
        assert!(options.level_quals.is_some());
        assert!(options.other_quals.is_some());

        // id maps to t@id, level to the pseudo column
        let names: Vec<_> = query.target_list.iter().map(|te| te.resname.clone()).collect();
        assert_eq!(names, vec![Some("id".to_string()), Some("level".to_string())]);
        let attnos: Vec<i32> = query
            .target_list
            .iter()
            .map(|te| te.expr.as_var().map_or(0, |v| v.varattno))
            .collect();
        assert_eq!(attnos, vec![1, 6]);
    }

    #[test]
    fn test_star_strips_dummy_prefix() {
        let query = analyze_oracle("SELECT * FROM t START WITH id = 1 CONNECT BY PRIOR id = parent_id");
        let names: Vec<_> = query.target_list.iter().filter_map(|te| te.resname.clone()).collect();
        assert_eq!(names, vec!["id", "code", "name", "parent_id", "amount"]);
    }

    #[test]
    fn test_outer_where_resolves_through_rewrite() {
        let query = analyze_oracle(
            "SELECT t.name FROM t WHERE t.amount > 0 START WITH id = 1 CONNECT BY PRIOR id = parent_id",
        );
        assert!(query.jointree.quals.is_some());
        assert_eq!(query.target_list[0].expr.as_var().map(|v| v.varattno), Some(3));
    }

    #[test]
    fn test_multiple_items_and_subquery_names() {
        let query = analyze_oracle(
            "SELECT note FROM t, (SELECT t_id, note FROM u) WHERE t.id = t_id \
             START WITH t.id = 1 CONNECT BY PRIOR t.id = t.parent_id",
        );
        let cte = &query.cte_list[0];
        assert!(cte.colnames.contains(&"sw_subquery_1@note".to_string()));
        assert_eq!(query.rtable[0].origin_names, vec!["t", "sw_subquery_1"]);
        assert_eq!(query.rtable.len(), 1);
    }

    #[test]
    fn test_level_quals_only() {
        let query = analyze_oracle("SELECT level FROM t START WITH id = 1 CONNECT BY PRIOR id = parent_id AND ROWNUM < 5");
        let options = query.cte_list[0].sw_options.as_ref().expect("rewrite options");
        assert_eq!(options.connect_by_type, ConnectByType::Rownum);
        assert!(matches!(
            options.level_quals.as_ref(),
            Some(Expr::Op(op)) if matches!(op.args.first(), Some(Expr::Rownum(_)))
        ));
    }

    #[test]
    fn test_start_with_level_is_mixed() {
        let query = analyze_oracle("SELECT id FROM t START WITH ROWNUM = 1 CONNECT BY PRIOR id = parent_id");
        let options = query.cte_list[0].sw_options.as_ref().expect("rewrite options");
        assert_eq!(options.connect_by_type, ConnectByType::MixedLevel);
    }

    #[test]
    fn test_rewrite_errors() {
        let err = analyze_oracle_err("SELECT * FROM t START WITH id = 1 CONNECT BY id = parent_id");
        assert_eq!(err.message, "START WITH CONNECT BY clause must have at least one prior key");

        let err = analyze_oracle_err("SELECT * FROM t START WITH id = 1 CONNECT BY PRIOR id = level");
        assert_eq!(err.message, "column specified by prior cannot concide with ROWNUM/LEVEL.");

        let err = analyze_oracle_err("SELECT * FROM t START WITH id = 1 CONNECT BY level");
        assert_eq!(err.message, "Unsupported expression found in CONNECT BY clause.");

        let err = analyze_oracle_err(
            "SELECT * FROM t JOIN u ON t.id = u.t_id START WITH t.id = 1 CONNECT BY PRIOR t.id = t.parent_id",
        );
        assert_eq!(
            err.message,
            "START WITH/CONNECT BY can only rewrite tables and subqueries in the FROM clause"
        );

        let err = analyze_oracle_err(
            "SELECT * FROM t, t AS t2 START WITH id = 1 CONNECT BY PRIOR id = parent_id",
        );
        assert_eq!(err.message, "column reference \"id\" is ambiguous.");

        let err = analyze_oracle_err("SELECT * FROM t START WITH PRIOR id = 1 CONNECT BY PRIOR id = parent_id");
        assert_eq!(err.message, "PRIOR can only be used in a CONNECT BY clause");
    }

    #[test]
    fn test_dummy_name_length() {
        let long = "c".repeat(60);
        let err = HierarchyRewrite::dummy_name("tab", &long).unwrap_err();
        assert_eq!(
            err.message,
            format!("Exceed maximum StartWithDummayColname length 64, relname tab, column {}.", long)
        );
        assert_eq!(HierarchyRewrite::dummy_name("t", "id").unwrap(), "t@id");
    }

    #[test]
    fn test_join_conditions_keep_multi_column_conjuncts() {
        let w = RawExpr::and(
            RawExpr::op("=", RawExpr::column(&["t", "id"]), RawExpr::column(&["u", "t_id"])),
            RawExpr::op("=", RawExpr::column(&["t", "code"]), RawExpr::int(3)),
        );
        let pushed = join_conditions(&w).expect("one join condition");
        assert_eq!(
            pushed,
            RawExpr::op("=", RawExpr::column(&["t", "id"]), RawExpr::column(&["u", "t_id"]))
        );
    }
}
