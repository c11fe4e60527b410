//! FROM-clause processing
//!
//! Every FROM item becomes one or more range entries in the current level's
//! range table. Building an entry never makes it visible: the caller decides
//! when its namespace items join the level's namespace, which is what gives
//! JOIN/ON and LATERAL their scoping.

use tracing::debug;

use super::expr_kind::ExprKind;
use super::state::{error_at, CteState, NamespaceItem, ParseState, Transformer};
use crate::catalog::{LockMode, QualifiedName, RelKind};
use crate::error::{Diagnostic, DiagnosticKind, Result};
use crate::query::walker::contain_vars_of_level;
use crate::query::{
    Alias, Expr, JoinExpr, JoinTreeNode, JoinType, Query, RangeFunction, RangeTblEntry, RteKind,
    Var, ACL_SELECT,
};
use crate::syntax::{self, FromItem, JoinKind, Location, LockStrength, RangeVar};
use crate::types::{
    CoercionContext, Oid, CID_OID, INT8_OID, INVALID_OID, OID_OID, RECORD_OID, TID_OID, XID_OID,
};

/// Largest number of output columns of a join
const MAX_JOIN_COLUMNS: usize = 32767;

/// System columns of relations with storage: name, attribute number, type
pub(crate) const SYSTEM_COLUMNS: &[(&str, i32, Oid)] = &[
    ("ctid", -1, TID_OID),
    ("xmin", -3, XID_OID),
    ("cmin", -4, CID_OID),
    ("xmax", -5, XID_OID),
    ("cmax", -6, CID_OID),
    ("tableoid", -7, OID_OID),
];

/// A transformed FROM item
pub(crate) struct FromResult {
    pub node: JoinTreeNode,
    /// The entry at the top of the item (the join entry for a join)
    pub rtindex: usize,
    pub namespace: Vec<NamespaceItem>,
}

impl FromResult {
    fn leaf(rtindex: usize, item: NamespaceItem) -> Self {
        Self {
            node: JoinTreeNode::RangeTblRef(rtindex),
            rtindex,
            namespace: vec![item],
        }
    }
}

/// Replace the live column names of `eref` with user-written aliases
fn apply_column_aliases(eref: &mut Alias, aliases: &[String], loc: Location) -> Result<()> {
    let live = eref.colnames.iter().filter(|c| !c.is_empty()).count();
    if aliases.len() > live {
        return Err(error_at(
            DiagnosticKind::InvalidColumnReference,
            format!(
                "table \"{}\" has {} columns available but {} columns specified",
                eref.aliasname,
                live,
                aliases.len()
            ),
            loc,
        ));
    }
    let mut aliases = aliases.iter();
    for name in eref.colnames.iter_mut().filter(|c| !c.is_empty()) {
        match aliases.next() {
            Some(alias) => *name = alias.clone(),
            None => break,
        }
    }
    Ok(())
}

impl Transformer<'_> {
    /// Process a FROM list into the current level's join list and namespace
    pub(crate) fn transform_from_clause(&mut self, items: &[FromItem]) -> Result<()> {
        for item in items {
            let from = self.transform_from_item(item)?;
            let existing = self.pstate().namespace.clone();
            self.check_namespace_conflicts(&existing, &from.namespace, item.location())?;
            let pstate = self.pstate_mut();
            // later items may see this one only through LATERAL
            pstate
                .namespace
                .extend(from.namespace.into_iter().map(|ns| NamespaceItem {
                    lateral_only: true,
                    lateral_ok: true,
                    ..ns
                }));
            pstate.joinlist.push(from.node);
        }
        for ns in &mut self.pstate_mut().namespace {
            ns.lateral_only = false;
            ns.lateral_ok = true;
        }
        Ok(())
    }

    /// Two visible entries may share a name only when both are unaliased
    /// base relations with different OIDs
    pub(crate) fn check_namespace_conflicts(
        &self,
        first: &[NamespaceItem],
        second: &[NamespaceItem],
        loc: Location,
    ) -> Result<()> {
        let pstate = self.pstate();
        for a in first.iter().filter(|ns| ns.rel_visible) {
            let Some(rte1) = pstate.rte(a.rtindex) else { continue };
            for b in second.iter().filter(|ns| ns.rel_visible) {
                let Some(rte2) = pstate.rte(b.rtindex) else { continue };
                if rte1.eref.aliasname != rte2.eref.aliasname {
                    continue;
                }
                let distinct_tables = rte1.alias.is_none()
                    && rte2.alias.is_none()
                    && matches!((rte1.relid(), rte2.relid()), (Some(x), Some(y)) if x != y);
                if distinct_tables {
                    continue;
                }
                return Err(error_at(
                    DiagnosticKind::DuplicateAlias,
                    format!(
                        "table name \"{}\" specified more than once",
                        rte1.eref.aliasname
                    ),
                    loc,
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn transform_from_item(&mut self, item: &FromItem) -> Result<FromResult> {
        self.guarded(|t| match item {
            FromItem::Relation(rv) => {
                let cte = match rv.schema {
                    None => t.scan_cte(&rv.name),
                    Some(_) => None,
                };
                let rtindex = match cte {
                    Some((levels_up, idx)) => t.add_cte_rte(rv, levels_up, idx)?,
                    None => {
                        let refname = rv.alias.as_ref().map_or(rv.name.as_str(), |a| a.name.as_str());
                        let lock = match t.locked_strength(Some(refname)) {
                            Some(_) => LockMode::RowShare,
                            None => LockMode::AccessShare,
                        };
                        t.add_relation_rte(rv, lock)?
                    }
                };
                Ok(FromResult::leaf(rtindex, NamespaceItem::new(rtindex)))
            }
            FromItem::Subselect {
                lateral,
                query,
                alias,
                loc,
            } => {
                let locked = t.locked_strength(alias.as_ref().map(|a| a.name.as_str()));
                t.pstate_mut().lateral_active = *lateral;
                let analyzed = t.with_expr_kind(ExprKind::FromSubselect, |t| {
                    t.with_scope(
                        ParseState {
                            locked_from_parent: locked,
                            ..Default::default()
                        },
                        |t| t.transform_select_stmt(query),
                    )
                });
                t.pstate_mut().lateral_active = false;
                let (subquery, _) = analyzed?;
                let rtindex = t.add_subquery_rte(subquery, alias.as_ref(), *lateral, *loc)?;
                let item = match alias {
                    Some(_) => NamespaceItem::new(rtindex),
                    None => NamespaceItem::columns_only(rtindex),
                };
                Ok(FromResult::leaf(rtindex, item))
            }
            FromItem::Function {
                lateral,
                func,
                ordinality,
                alias,
                loc,
            } => {
                // functions in FROM may always refer to earlier FROM items
                t.pstate_mut().lateral_active = true;
                let result = t.with_expr_kind(ExprKind::FromFunction, |t| t.transform_func_call(func));
                t.pstate_mut().lateral_active = false;
                let expr = result?;
                let rtindex =
                    t.add_function_rte(expr, func.func_name(), alias.as_ref(), *ordinality, *lateral, *loc)?;
                Ok(FromResult::leaf(rtindex, NamespaceItem::new(rtindex)))
            }
            FromItem::Join(join) => t.transform_join(join),
        })
    }

    /// Strongest row lock requested for the entry named `refname`
    pub(crate) fn locked_strength(&self, refname: Option<&str>) -> Option<LockStrength> {
        let pstate = self.pstate();
        let local = pstate
            .locking
            .iter()
            .filter(|lc| {
                lc.rels.is_empty() || refname.is_some_and(|r| lc.rels.iter().any(|n| n == r))
            })
            .map(|lc| lc.strength)
            .max();
        local.max(pstate.locked_from_parent)
    }

    /// Find a visible WITH item by name, searching outward
    pub(crate) fn scan_cte(&self, name: &str) -> Option<(usize, usize)> {
        (0..self.scopes.len()).find_map(|levels_up| {
            self.scopes[self.scope_index(levels_up)]
                .ctes
                .iter()
                .position(|c| c.visible && c.name == name)
                .map(|idx| (levels_up, idx))
        })
    }

    /// Open a base relation and append its range entry
    pub(crate) fn add_relation_rte(&mut self, rv: &RangeVar, lock: LockMode) -> Result<usize> {
        let name = match &rv.schema {
            Some(schema) => QualifiedName::with_schema(schema, &rv.name),
            None => QualifiedName::new(&rv.name),
        };
        let catalog = self.catalog;
        let Some(rel) = catalog.open_relation(&name, lock) else {
            return Err(self.relation_missing(rv, &name));
        };
        if rel.kind == RelKind::CompositeType {
            return Err(error_at(
                DiagnosticKind::WrongObjectType,
                format!("\"{}\" is a composite type", name),
                rv.loc,
            ));
        }
        debug!(relation = %name, relid = rel.oid, ?lock, "opened relation");

        let colnames = rel
            .columns
            .iter()
            .map(|c| if c.dropped { String::new() } else { c.name.clone() })
            .collect();
        let refname = rv.alias.as_ref().map_or(rv.name.as_str(), |a| a.name.as_str());
        let mut eref = Alias::new(refname, colnames);
        if let Some(alias) = &rv.alias {
            apply_column_aliases(&mut eref, &alias.columns, rv.loc)?;
        }
        let mut rte = RangeTblEntry::new(
            RteKind::Relation {
                relid: rel.oid,
                relname: rel.name.name.clone(),
                relkind: rel.kind,
                lock,
            },
            rv.alias.as_ref().map(Alias::from),
            eref,
        );
        rte.inh = rv.inh;
        rte.required_perms = ACL_SELECT;
        Ok(self.pstate_mut().add_rte(rte))
    }

    fn relation_missing(&self, rv: &RangeVar, name: &QualifiedName) -> Diagnostic {
        let err = error_at(
            DiagnosticKind::TableNotFound,
            format!("relation \"{}\" does not exist", name),
            rv.loc,
        );
        let hidden_cte = rv.schema.is_none()
            && self
                .scopes
                .iter()
                .any(|s| s.ctes.iter().any(|c| !c.visible && c.name == rv.name));
        if hidden_cte {
            err.with_detail(format!(
                "There is a WITH item named \"{}\", but it cannot be referenced from this part of the query.",
                rv.name
            ))
            .with_help("Use WITH RECURSIVE, or re-order the WITH items to remove forward references.")
        } else {
            err
        }
    }

    /// Reference the WITH item `idx` of the level `levels_up` out
    pub(crate) fn add_cte_rte(&mut self, rv: &RangeVar, levels_up: usize, idx: usize) -> Result<usize> {
        let scope_idx = self.scope_index(levels_up);
        let cte = &mut self.scopes[scope_idx].ctes[idx];
        let self_reference = match cte.state {
            CteState::Done => false,
            CteState::RecursiveTerm => true,
            CteState::NonRecursiveTerm => {
                return Err(error_at(
                    DiagnosticKind::InvalidRecursion,
                    format!(
                        "recursive reference to query \"{}\" must not appear within its non-recursive term",
                        cte.name
                    ),
                    rv.loc,
                ))
            }
            CteState::Pending => {
                return Err(error_at(
                    DiagnosticKind::FeatureNotSupported,
                    "mutual recursion between WITH items is not implemented",
                    rv.loc,
                ))
            }
        };
        if !self_reference {
            cte.refcount += 1;
        }
        let kind = RteKind::Cte {
            name: cte.name.clone(),
            levels_up,
            self_reference,
            coltypes: cte.coltypes.clone(),
            coltypmods: cte.coltypmods.clone(),
            colcollations: cte.colcollations.clone(),
        };
        let refname = rv.alias.as_ref().map_or(rv.name.as_str(), |a| a.name.as_str());
        let mut eref = Alias::new(refname, cte.colnames.clone());
        debug!(cte = %cte.name, levels_up, self_reference, "referencing WITH item");
        if let Some(alias) = &rv.alias {
            apply_column_aliases(&mut eref, &alias.columns, rv.loc)?;
        }
        let rte = RangeTblEntry::new(kind, rv.alias.as_ref().map(Alias::from), eref);
        Ok(self.pstate_mut().add_rte(rte))
    }

    /// Append a range entry for an analyzed sub-SELECT
    pub(crate) fn add_subquery_rte(
        &mut self,
        query: Query,
        alias: Option<&syntax::Alias>,
        lateral: bool,
        loc: Location,
    ) -> Result<usize> {
        let colnames = query
            .visible_targets()
            .map(|te| te.resname.clone().unwrap_or_else(|| "?column?".to_string()))
            .collect();
        let refname = alias.map_or("unnamed_subquery", |a| a.name.as_str());
        let mut eref = Alias::new(refname, colnames);
        if let Some(alias) = alias {
            apply_column_aliases(&mut eref, &alias.columns, loc)?;
        }
        let sw_sub_exist = query.cte_list.iter().any(|c| c.sw_options.is_some());
        let mut rte = RangeTblEntry::new(
            RteKind::Subquery {
                query: Box::new(query),
            },
            alias.map(Alias::from),
            eref,
        );
        rte.lateral = lateral;
        rte.sw_sub_exist = sw_sub_exist;
        Ok(self.pstate_mut().add_rte(rte))
    }

    fn add_function_rte(
        &mut self,
        expr: Expr,
        funcname: &str,
        alias: Option<&syntax::Alias>,
        ordinality: bool,
        lateral: bool,
        loc: Location,
    ) -> Result<usize> {
        let rettype = expr.type_oid();
        let catalog = self.catalog;
        let composite = catalog
            .type_by_oid(rettype)
            .and_then(|ty| ty.relid)
            .and_then(|relid| catalog.relation(relid));
        let refname = alias.map_or(funcname, |a| a.name.as_str());

        let mut func = RangeFunction {
            expr,
            colnames: Vec::new(),
            coltypes: Vec::new(),
            coltypmods: Vec::new(),
            colcollations: Vec::new(),
        };
        match composite {
            Some(rel) => {
                for col in &rel.columns {
                    func.colnames.push(if col.dropped { String::new() } else { col.name.clone() });
                    func.coltypes.push(col.type_oid);
                    func.coltypmods.push(col.typmod);
                    func.colcollations.push(col.collation);
                }
            }
            None if rettype == RECORD_OID => {
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    "a column definition list is required for functions returning \"record\"",
                    loc,
                ))
            }
            None => {
                func.colnames.push(refname.to_string());
                func.coltypes.push(rettype);
                func.coltypmods.push(func.expr.typmod());
                func.colcollations.push(func.expr.collation());
            }
        }

        let mut colnames = func.colnames.clone();
        if ordinality {
            colnames.push("ordinality".to_string());
        }
        let mut eref = Alias::new(refname, colnames);
        if let Some(alias) = alias {
            apply_column_aliases(&mut eref, &alias.columns, loc)?;
        }
        let references_earlier = contain_vars_of_level(&func.expr, 0);
        let mut rte = RangeTblEntry::new(
            RteKind::Function {
                functions: vec![func],
                ordinality,
            },
            alias.map(Alias::from),
            eref,
        );
        rte.lateral = lateral || references_earlier;
        Ok(self.pstate_mut().add_rte(rte))
    }

    /// Append a VALUES entry; the lists are already coerced to `coltypes`
    pub(crate) fn add_values_rte(
        &mut self,
        lists: Vec<Vec<Expr>>,
        coltypes: Vec<Oid>,
        coltypmods: Vec<i32>,
        colcollations: Vec<Oid>,
        lateral: bool,
    ) -> usize {
        let colnames = (1..=coltypes.len()).map(|i| format!("column{}", i)).collect();
        let mut rte = RangeTblEntry::new(
            RteKind::Values {
                lists,
                coltypes,
                coltypmods,
                colcollations,
            },
            None,
            Alias::new("*VALUES*", colnames),
        );
        rte.lateral = lateral;
        self.pstate_mut().add_rte(rte)
    }

    fn transform_join(&mut self, join: &syntax::JoinExpr) -> Result<FromResult> {
        let left = self.transform_from_item(&join.left)?;

        // the right side sees the left side only through LATERAL, and not at
        // all from the nullable side of a RIGHT or FULL join
        let lateral_ok = matches!(join.kind, JoinKind::Inner | JoinKind::Left);
        let saved = self.pstate().namespace.len();
        self.pstate_mut()
            .namespace
            .extend(left.namespace.iter().map(|ns| NamespaceItem {
                lateral_only: true,
                lateral_ok,
                ..*ns
            }));
        let right = self.transform_from_item(&join.right);
        self.pstate_mut().namespace.truncate(saved);
        let right = right?;
        self.check_namespace_conflicts(&left.namespace, &right.namespace, join.loc)?;

        let jointype = match join.kind {
            JoinKind::Inner => JoinType::Inner,
            JoinKind::Left => JoinType::Left,
            JoinKind::Right => JoinType::Right,
            JoinKind::Full => JoinType::Full,
        };
        let lcols = self.node_columns(left.rtindex);
        let rcols = self.node_columns(right.rtindex);
        let using: Vec<String> = if join.natural {
            lcols
                .iter()
                .filter(|(name, _)| rcols.iter().any(|(r, _)| r == name))
                .map(|(name, _)| name.clone())
                .collect()
        } else {
            join.using.clone()
        };

        let mut colnames = Vec::new();
        let mut alias_vars = Vec::new();
        let mut left_cols = Vec::new();
        let mut right_cols = Vec::new();
        let mut using_quals = Vec::new();
        for (i, name) in using.iter().enumerate() {
            if using[..i].contains(name) {
                return Err(error_at(
                    DiagnosticKind::DuplicateColumn,
                    format!("column name \"{}\" appears more than once in USING clause", name),
                    join.loc,
                ));
            }
            let lattno = using_column(&lcols, name, "left", join.loc)?;
            let rattno = using_column(&rcols, name, "right", join.loc)?;
            let lvar = self.make_var(0, left.rtindex, lattno, join.loc)?;
            let rvar = self.make_var(0, right.rtindex, rattno, join.loc)?;
            self.mark_var_for_select(0, left.rtindex, lattno);
            self.mark_var_for_select(0, right.rtindex, rattno);

            let (ltype, rtype) = (lvar.type_oid(), rvar.type_oid());
            let common = self
                .coercion
                .common_type(self.catalog, &[ltype, rtype])
                .ok_or_else(|| {
                    error_at(
                        DiagnosticKind::TypeMismatch,
                        format!(
                            "JOIN/USING types {} and {} cannot be matched",
                            self.type_name(ltype, -1),
                            self.type_name(rtype, -1)
                        ),
                        join.loc,
                    )
                })?;
            using_quals.push(self.make_op("=", Some(lvar.clone()), rvar.clone(), join.loc)?);
            let lmerged = self.coerce_or_error(lvar, common, -1, CoercionContext::Implicit, join.loc)?;
            let rmerged = self.coerce_or_error(rvar, common, -1, CoercionContext::Implicit, join.loc)?;
            let merged = match jointype {
                JoinType::Inner | JoinType::Left => lmerged,
                JoinType::Right => rmerged,
                JoinType::Full => Expr::Coalesce {
                    type_oid: common,
                    collid: self.type_collation(common),
                    args: vec![lmerged, rmerged],
                    location: join.loc,
                },
            };
            colnames.push(name.clone());
            alias_vars.push(merged);
            left_cols.push(lattno);
            right_cols.push(rattno);
        }

        let merged_cols = using.len();
        for (name, attno) in &lcols {
            if left_cols[..merged_cols].contains(attno) {
                continue;
            }
            colnames.push(name.clone());
            alias_vars.push(self.make_var(0, left.rtindex, *attno, join.loc)?);
            left_cols.push(*attno);
            right_cols.push(0);
        }
        for (name, attno) in &rcols {
            if right_cols[..merged_cols].contains(attno) {
                continue;
            }
            colnames.push(name.clone());
            alias_vars.push(self.make_var(0, right.rtindex, *attno, join.loc)?);
            left_cols.push(0);
            right_cols.push(*attno);
        }
        if colnames.len() > MAX_JOIN_COLUMNS {
            return Err(error_at(
                DiagnosticKind::ProgramLimitExceeded,
                format!("joins can have at most {} columns", MAX_JOIN_COLUMNS),
                join.loc,
            ));
        }

        let quals = match &join.quals {
            Some(on) => {
                // ON sees exactly the two inputs plus outer levels
                let on_namespace = left
                    .namespace
                    .iter()
                    .chain(&right.namespace)
                    .map(|ns| NamespaceItem {
                        lateral_only: false,
                        lateral_ok: true,
                        ..*ns
                    })
                    .collect();
                let saved = std::mem::replace(&mut self.pstate_mut().namespace, on_namespace);
                let result = self.transform_where_clause(on, ExprKind::JoinOn, "JOIN/ON");
                self.pstate_mut().namespace = saved;
                Some(result?)
            }
            None => Expr::and(using_quals),
        };

        let alias_name = join.alias.as_ref().map(|a| a.name.clone());
        let mut eref = Alias::new(alias_name.as_deref().unwrap_or("unnamed_join"), colnames);
        if let Some(alias) = &join.alias {
            if alias.columns.len() > eref.colnames.len() {
                return Err(error_at(
                    DiagnosticKind::SyntaxError,
                    format!("column alias list for \"{}\" has too many entries", alias.name),
                    join.loc,
                ));
            }
            for (col, name) in eref.colnames.iter_mut().zip(&alias.columns) {
                *col = name.clone();
            }
        }
        let rte = RangeTblEntry::new(
            RteKind::Join {
                jointype,
                merged_cols,
                alias_vars,
                left_cols,
                right_cols,
            },
            join.alias.as_ref().map(Alias::from),
            eref,
        );
        let rtindex = self.pstate_mut().add_rte(rte);
        self.pstate_mut()
            .join_members
            .insert(rtindex, [left.rtindex, right.rtindex]);

        // an aliased join hides its inputs; otherwise they stay visible as
        // relation names but not for unqualified columns
        let mut namespace: Vec<NamespaceItem> = match join.alias {
            Some(_) => Vec::new(),
            None => left
                .namespace
                .into_iter()
                .chain(right.namespace)
                .map(|ns| NamespaceItem {
                    cols_visible: false,
                    ..ns
                })
                .collect(),
        };
        namespace.push(NamespaceItem {
            rtindex,
            rel_visible: join.alias.is_some(),
            cols_visible: true,
            lateral_only: false,
            lateral_ok: true,
        });

        let node = JoinTreeNode::Join(Box::new(JoinExpr {
            jointype,
            natural: join.natural,
            larg: left.node,
            rarg: right.node,
            using,
            quals,
            alias: alias_name,
            rtindex,
        }));
        Ok(FromResult {
            node,
            rtindex,
            namespace,
        })
    }

    /// Live (name, attribute number) pairs of an entry of the current level
    pub(crate) fn node_columns(&self, rtindex: usize) -> Vec<(String, i32)> {
        self.pstate()
            .rte(rtindex)
            .map(|rte| {
                rte.eref
                    .colnames
                    .iter()
                    .enumerate()
                    .filter(|(_, name)| !name.is_empty())
                    .map(|(i, name)| (name.clone(), i as i32 + 1))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Type, typmod and collation of column `attno` of an entry of scope `scope_idx`
    pub(crate) fn rte_column_type(
        &self,
        scope_idx: usize,
        rtindex: usize,
        attno: i32,
    ) -> Option<(Oid, i32, Oid)> {
        let rte = self.scopes.get(scope_idx)?.rte(rtindex)?;
        if attno < 0 {
            return match rte.kind {
                RteKind::Relation { .. } => SYSTEM_COLUMNS
                    .iter()
                    .find(|(_, n, _)| *n == attno)
                    .map(|(_, _, ty)| (*ty, -1, INVALID_OID)),
                _ => None,
            };
        }
        let index = usize::try_from(attno).ok()?.checked_sub(1)?;
        match &rte.kind {
            RteKind::Relation { relid, .. } => {
                let col = self.catalog.relation(*relid)?.column(attno)?;
                Some((col.type_oid, col.typmod, col.collation))
            }
            RteKind::Subquery { query } => {
                let te = query.visible_targets().nth(index)?;
                Some((te.expr.type_oid(), te.expr.typmod(), te.expr.collation()))
            }
            RteKind::Join { alias_vars, .. } => {
                let e = alias_vars.get(index)?;
                Some((e.type_oid(), e.typmod(), e.collation()))
            }
            RteKind::Function {
                functions,
                ordinality,
            } => {
                let mut offset = index;
                for func in functions {
                    if offset < func.coltypes.len() {
                        return Some((
                            func.coltypes[offset],
                            func.coltypmods[offset],
                            func.colcollations[offset],
                        ));
                    }
                    offset -= func.coltypes.len();
                }
                (*ordinality && offset == 0).then_some((INT8_OID, -1, INVALID_OID))
            }
            RteKind::Values {
                coltypes,
                coltypmods,
                colcollations,
                ..
            }
            | RteKind::Cte {
                coltypes,
                coltypmods,
                colcollations,
                ..
            } => Some((
                *coltypes.get(index)?,
                *coltypmods.get(index)?,
                *colcollations.get(index)?,
            )),
            RteKind::Result => None,
        }
    }

    /// A Var for column `attno` of entry `rtindex`, `levels_up` levels out
    pub(crate) fn make_var(
        &self,
        levels_up: usize,
        rtindex: usize,
        attno: i32,
        loc: Location,
    ) -> Result<Expr> {
        let (vartype, vartypmod, varcollid) = self
            .rte_column_type(self.scope_index(levels_up), rtindex, attno)
            .ok_or_else(|| {
                error_at(
                    DiagnosticKind::InvalidColumnReference,
                    format!("invalid attribute number {} for range entry {}", attno, rtindex),
                    loc,
                )
            })?;
        Ok(Expr::Var(Var {
            varno: rtindex,
            varattno: attno,
            vartype,
            vartypmod,
            varcollid,
            levelsup: levels_up,
            location: loc,
        }))
    }

    /// A whole-row Var (attribute 0)
    pub(crate) fn make_whole_row_var(
        &self,
        levels_up: usize,
        rtindex: usize,
        loc: Location,
    ) -> Result<Expr> {
        let rte = self.scopes[self.scope_index(levels_up)]
            .rte(rtindex)
            .ok_or_else(|| {
                error_at(
                    DiagnosticKind::InvalidColumnReference,
                    format!("invalid range entry {}", rtindex),
                    loc,
                )
            })?;
        let vartype = match &rte.kind {
            RteKind::Relation { relid, .. } => self
                .catalog
                .relation(*relid)
                .map_or(RECORD_OID, |rel| rel.rowtype),
            RteKind::Function {
                functions,
                ordinality: false,
            } if functions.len() == 1 => {
                let ty = functions[0].expr.type_oid();
                match self.catalog.type_by_oid(ty).and_then(|t| t.relid) {
                    Some(_) => ty,
                    None => RECORD_OID,
                }
            }
            _ => RECORD_OID,
        };
        Ok(Expr::Var(Var {
            varno: rtindex,
            varattno: 0,
            vartype,
            vartypmod: -1,
            varcollid: INVALID_OID,
            levelsup: levels_up,
            location: loc,
        }))
    }

    /// (name, Var) for every live column of an entry, in column order
    pub(crate) fn expand_rte_vars(
        &self,
        levels_up: usize,
        rtindex: usize,
        loc: Location,
    ) -> Result<Vec<(String, Expr)>> {
        let scope = &self.scopes[self.scope_index(levels_up)];
        let Some(rte) = scope.rte(rtindex) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::with_capacity(rte.eref.colnames.len());
        for (i, name) in rte.eref.colnames.iter().enumerate() {
            if name.is_empty() {
                continue;
            }
            out.push((name.clone(), self.make_var(levels_up, rtindex, i as i32 + 1, loc)?));
        }
        Ok(out)
    }

    /// Coerce `expr`, failing with the standard cast message
    pub(crate) fn coerce_or_error(
        &self,
        expr: Expr,
        target: Oid,
        typmod: i32,
        ctx: CoercionContext,
        loc: Location,
    ) -> Result<Expr> {
        let source = expr.type_oid();
        self.coercion
            .coerce(self.catalog, expr, target, typmod, ctx)
            .ok_or_else(|| {
                error_at(
                    DiagnosticKind::CannotCoerce,
                    format!(
                        "cannot cast type {} to {}",
                        self.type_name(source, -1),
                        self.type_name(target, typmod)
                    ),
                    loc,
                )
            })
    }
}

fn using_column(cols: &[(String, i32)], name: &str, side: &str, loc: Location) -> Result<i32> {
    let mut found = cols.iter().filter(|(n, _)| n == name);
    match (found.next(), found.next()) {
        (Some((_, attno)), None) => Ok(*attno),
        (Some(_), Some(_)) => Err(error_at(
            DiagnosticKind::AmbiguousColumn,
            format!("common column name \"{}\" appears more than once in {} table", name, side),
            loc,
        )),
        (None, _) => Err(error_at(
            DiagnosticKind::ColumnNotFound,
            format!("column \"{}\" specified in USING clause does not exist in {} table", name, side),
            loc,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::state::CteEntry;
    use crate::analyzer::AnalyzerOptions;
    use crate::catalog::{Catalog, ColumnDef};
    use crate::syntax::{LockingClause, SelectStmt, SimpleSelect};
    use crate::types::{BuiltinCoercion, INT4_OID, INT8_OID, TEXT_OID};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut catalog = Catalog::new();
        catalog.create_relation(
            &QualifiedName::new("t"),
            RelKind::Table,
            vec![
                ColumnDef::new("a", INT4_OID, -1),
                ColumnDef::new("b", TEXT_OID, -1),
                ColumnDef::new("c", INT4_OID, -1),
            ],
        );
        catalog.create_relation(
            &QualifiedName::new("u"),
            RelKind::Table,
            vec![ColumnDef::new("a", INT8_OID, -1), ColumnDef::new("d", TEXT_OID, -1)],
        );
        catalog.ensure_schema("other");
        catalog.create_relation(
            &QualifiedName::with_schema("other", "t"),
            RelKind::Table,
            vec![ColumnDef::new("x", INT4_OID, -1)],
        );
        catalog
    }

    fn relation(name: &str) -> FromItem {
        FromItem::Relation(RangeVar::new(name))
    }

    fn join(kind: JoinKind, left: FromItem, right: FromItem, using: &[&str]) -> FromItem {
        FromItem::Join(Box::new(syntax::JoinExpr {
            kind,
            natural: false,
            left,
            right,
            using: using.iter().map(|s| s.to_string()).collect(),
            quals: None,
            alias: None,
            loc: Location::UNKNOWN,
        }))
    }

    fn from(catalog: &Catalog, items: &[FromItem]) -> Result<ParseState> {
        let options = AnalyzerOptions::default();
        let mut t = Transformer::new(catalog, &BuiltinCoercion, &options);
        t.transform_from_clause(items)?;
        Ok(t.scopes.remove(0))
    }

    #[test]
    fn test_dropped_column_keeps_its_slot() {
        let mut catalog = catalog();
        let relid = catalog.find_relation(&QualifiedName::new("t")).unwrap().oid;
        catalog.relation_mut(relid).unwrap().drop_column("b");

        let pstate = from(&catalog, &[relation("t")]).unwrap();
        let rte = pstate.rte(1).unwrap();
        assert_eq!(rte.eref.colnames, vec!["a", "", "c"]);
        assert_eq!(rte.required_perms, ACL_SELECT);
    }

    #[test]
    fn test_column_aliases_skip_dropped_columns() {
        let mut catalog = catalog();
        let relid = catalog.find_relation(&QualifiedName::new("t")).unwrap().oid;
        catalog.relation_mut(relid).unwrap().drop_column("a");

        let mut rv = RangeVar::new("t").with_alias("x");
        rv.alias.as_mut().unwrap().columns = vec!["p".to_string(), "q".to_string()];
        let pstate = from(&catalog, &[FromItem::Relation(rv.clone())]).unwrap();
        assert_eq!(pstate.rte(1).unwrap().eref.colnames, vec!["", "p", "q"]);

        rv.alias.as_mut().unwrap().columns.push("r".to_string());
        let err = from(&catalog, &[FromItem::Relation(rv)]).unwrap_err();
        assert_eq!(err.message, "table \"x\" has 2 columns available but 3 columns specified");
    }

    #[test]
    fn test_duplicate_table_names() {
        let catalog = catalog();
        let err = from(&catalog, &[relation("t"), relation("t")]).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::DuplicateAlias);
        assert_eq!(err.message, "table name \"t\" specified more than once");

        // unaliased relations with different OIDs may share a name
        let mut other = RangeVar::new("t");
        other.schema = Some("other".to_string());
        assert!(from(&catalog, &[relation("t"), FromItem::Relation(other)]).is_ok());

        let aliased = FromItem::Relation(RangeVar::new("u").with_alias("t"));
        assert!(from(&catalog, &[relation("t"), aliased]).is_err());
    }

    #[test]
    fn test_missing_relation() {
        let err = from(&catalog(), &[relation("nope")]).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TableNotFound);
        assert_eq!(err.message, "relation \"nope\" does not exist");
        assert_eq!(err.detail, None);
    }

    #[test]
    fn test_forward_cte_reference_hint() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = Transformer::new(&catalog, &BuiltinCoercion, &options);
        t.pstate_mut().ctes.push(CteEntry::new(
            "later".to_string(),
            Vec::new(),
            Box::new(SelectStmt::simple(SimpleSelect::default())),
            Location::UNKNOWN,
        ));
        let err = t.transform_from_clause(&[relation("later")]).unwrap_err();
        assert_eq!(err.message, "relation \"later\" does not exist");
        assert_eq!(
            err.detail.as_deref(),
            Some("There is a WITH item named \"later\", but it cannot be referenced from this part of the query.")
        );
        assert_eq!(
            err.help.as_deref(),
            Some("Use WITH RECURSIVE, or re-order the WITH items to remove forward references.")
        );
    }

    #[test]
    fn test_locking_clause_requests_row_share() {
        let catalog = catalog();
        let options = AnalyzerOptions::default();
        let mut t = Transformer::new(&catalog, &BuiltinCoercion, &options);
        t.pstate_mut().locking.push(LockingClause {
            strength: LockStrength::Update,
            rels: vec!["u".to_string()],
            loc: Location::UNKNOWN,
        });
        t.transform_from_clause(&[relation("t"), relation("u")]).unwrap();
        let lock = |i: usize| match t.pstate().rte(i).map(|r| &r.kind) {
            Some(RteKind::Relation { lock, .. }) => Some(*lock),
            _ => None,
        };
        assert_eq!(lock(1), Some(LockMode::AccessShare));
        assert_eq!(lock(2), Some(LockMode::RowShare));
    }

    #[test]
    fn test_using_join_merges_common_columns() {
        let pstate = from(&catalog(), &[join(JoinKind::Inner, relation("t"), relation("u"), &["a"])]).unwrap();
        let rte = pstate.rte(3).unwrap();
        assert_eq!(rte.eref.aliasname, "unnamed_join");
        assert_eq!(rte.eref.colnames, vec!["a", "b", "c", "d"]);
        let RteKind::Join {
            merged_cols,
            alias_vars,
            left_cols,
            right_cols,
            ..
        } = &rte.kind
        else {
            panic!("expected a join entry");
        };
        assert_eq!(*merged_cols, 1);
        assert_eq!(left_cols, &vec![1, 2, 3, 0]);
        assert_eq!(right_cols, &vec![1, 0, 0, 2]);
        // int4 and int8 merge as int8
        assert_eq!(alias_vars[0].type_oid(), INT8_OID);

        // the inputs stay visible as relation names only
        let visible: Vec<_> = pstate
            .namespace
            .iter()
            .map(|ns| (ns.rtindex, ns.rel_visible, ns.cols_visible))
            .collect();
        assert_eq!(visible, vec![(1, true, false), (2, true, false), (3, false, true)]);
        assert_eq!(pstate.join_members.get(&3), Some(&[1, 2]));
    }

    #[test]
    fn test_full_join_merges_through_coalesce() {
        let pstate = from(&catalog(), &[join(JoinKind::Full, relation("t"), relation("u"), &["a"])]).unwrap();
        let RteKind::Join { alias_vars, .. } = &pstate.rte(3).unwrap().kind else {
            panic!("expected a join entry");
        };
        assert!(matches!(&alias_vars[0], Expr::Coalesce { args, .. } if args.len() == 2));
    }

    #[test]
    fn test_using_errors() {
        let catalog = catalog();
        let err = from(&catalog, &[join(JoinKind::Inner, relation("t"), relation("u"), &["b"])]).unwrap_err();
        assert_eq!(
            err.message,
            "column \"b\" specified in USING clause does not exist in right table"
        );

        let err = from(&catalog, &[join(JoinKind::Inner, relation("t"), relation("u"), &["a", "a"])]).unwrap_err();
        assert_eq!(err.message, "column name \"a\" appears more than once in USING clause");
    }

    #[test]
    fn test_aliased_join_hides_inputs() {
        let mut item = join(JoinKind::Left, relation("t"), relation("u"), &["a"]);
        if let FromItem::Join(j) = &mut item {
            j.alias = Some(syntax::Alias::new("j"));
        }
        let pstate = from(&catalog(), &[item]).unwrap();
        assert_eq!(pstate.namespace.len(), 1);
        assert!(pstate.namespace[0].rel_visible);
        assert_eq!(pstate.rte(3).unwrap().refname(), "j");
    }
}
