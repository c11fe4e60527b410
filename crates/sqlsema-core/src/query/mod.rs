//! Analyzed query model
//!
//! The output of analysis: a [`Query`] with a flat range table, a resolved
//! target list and qualification trees in which every column reference is a
//! [`Var`] addressing `(range-table index, attribute number, levels up)`.
//! Range-table indexes are 1-based, as are attribute numbers; attribute 0
//! is a whole-row reference and negative numbers are system columns.

pub mod walker;

use std::collections::BTreeSet;

use crate::catalog::LockMode;
pub use crate::catalog::RelKind;
use crate::syntax::{self, Location, RawExpr};
use crate::types::{Oid, BOOL_OID, INT4_OID, INVALID_OID, RECORD_OID, TEXT_OID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Select,
    Insert,
    Update,
    Delete,
    Merge,
    /// MERGE ... DO NOTHING
    Nothing,
}

/// Required-permission bits recorded on range entries
pub const ACL_INSERT: u32 = 1 << 0;
pub const ACL_SELECT: u32 = 1 << 1;
pub const ACL_UPDATE: u32 = 1 << 2;
pub const ACL_DELETE: u32 = 1 << 3;
/// Row-level lock privilege (`FOR UPDATE/SHARE`)
pub const ACL_SELECT_FOR_UPDATE: u32 = ACL_UPDATE;

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub command: CommandType,
    pub rtable: Vec<RangeTblEntry>,
    pub jointree: FromExpr,
    pub target_list: Vec<TargetEntry>,
    pub result_relation: Option<usize>,
    pub returning_list: Vec<TargetEntry>,
    pub group_clause: Vec<SortGroupClause>,
    pub grouping_sets: Vec<GroupingSet>,
    pub having_qual: Option<Expr>,
    pub window_clause: Vec<WindowClause>,
    pub distinct_clause: Vec<SortGroupClause>,
    pub has_distinct_on: bool,
    pub sort_clause: Vec<SortGroupClause>,
    pub limit_count: Option<Expr>,
    pub limit_offset: Option<Expr>,
    pub row_marks: Vec<RowMarkClause>,
    pub set_operations: Option<SetOperationStmt>,
    pub cte_list: Vec<CommonTableExpr>,
    pub has_recursive: bool,
    pub has_aggs: bool,
    pub has_window_funcs: bool,
    pub has_target_srfs: bool,
    pub has_sublinks: bool,
    pub has_for_update: bool,
    /// Constraints the query's validity depends on (functional dependencies)
    pub constraint_deps: Vec<Oid>,
    pub merge_action_list: Vec<MergeAction>,
    pub merge_join_condition: Option<Expr>,
}

impl Query {
    pub fn new(command: CommandType) -> Self {
        Self {
            command,
            rtable: Vec::new(),
            jointree: FromExpr::default(),
            target_list: Vec::new(),
            result_relation: None,
            returning_list: Vec::new(),
            group_clause: Vec::new(),
            grouping_sets: Vec::new(),
            having_qual: None,
            window_clause: Vec::new(),
            distinct_clause: Vec::new(),
            has_distinct_on: false,
            sort_clause: Vec::new(),
            limit_count: None,
            limit_offset: None,
            row_marks: Vec::new(),
            set_operations: None,
            cte_list: Vec::new(),
            has_recursive: false,
            has_aggs: false,
            has_window_funcs: false,
            has_target_srfs: false,
            has_sublinks: false,
            has_for_update: false,
            constraint_deps: Vec::new(),
            merge_action_list: Vec::new(),
            merge_join_condition: None,
        }
    }

    /// 1-based range-table access
    pub fn rte(&self, rtindex: usize) -> Option<&RangeTblEntry> {
        rtindex.checked_sub(1).and_then(|i| self.rtable.get(i))
    }

    /// Target entries that are not resjunk
    pub fn visible_targets(&self) -> impl Iterator<Item = &TargetEntry> {
        self.target_list.iter().filter(|te| !te.resjunk)
    }

    pub fn find_cte(&self, name: &str) -> Option<&CommonTableExpr> {
        self.cte_list.iter().find(|c| c.name == name)
    }
}

/// The join tree of one query level
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FromExpr {
    pub fromlist: Vec<JoinTreeNode>,
    pub quals: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinTreeNode {
    RangeTblRef(usize),
    Join(Box<JoinExpr>),
}

impl JoinTreeNode {
    /// Every range-table index reachable below this node, joins included
    pub fn rtindexes(&self, out: &mut Vec<usize>) {
        match self {
            JoinTreeNode::RangeTblRef(i) => out.push(*i),
            JoinTreeNode::Join(j) => {
                j.larg.rtindexes(out);
                j.rarg.rtindexes(out);
                out.push(j.rtindex);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinExpr {
    pub jointype: JoinType,
    pub natural: bool,
    pub larg: JoinTreeNode,
    pub rarg: JoinTreeNode,
    pub using: Vec<String>,
    pub quals: Option<Expr>,
    pub alias: Option<String>,
    /// Range-table index of the join's own entry
    pub rtindex: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alias {
    pub aliasname: String,
    pub colnames: Vec<String>,
}

impl Alias {
    pub fn new(aliasname: impl Into<String>, colnames: Vec<String>) -> Self {
        Self {
            aliasname: aliasname.into(),
            colnames,
        }
    }
}

impl From<&syntax::Alias> for Alias {
    fn from(alias: &syntax::Alias) -> Self {
        Self::new(alias.name.clone(), alias.columns.clone())
    }
}

/// A function in a FROM-clause function entry
#[derive(Debug, Clone, PartialEq)]
pub struct RangeFunction {
    pub expr: Expr,
    pub colnames: Vec<String>,
    pub coltypes: Vec<Oid>,
    pub coltypmods: Vec<i32>,
    pub colcollations: Vec<Oid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RteKind {
    Relation {
        relid: Oid,
        relname: String,
        relkind: RelKind,
        lock: LockMode,
    },
    Subquery {
        query: Box<Query>,
    },
    Join {
        jointype: JoinType,
        /// Number of leading merged (USING/NATURAL) columns
        merged_cols: usize,
        /// One expression per join output column
        alias_vars: Vec<Expr>,
        /// Input column numbers of each side, 0 for a merged column absent on that side
        left_cols: Vec<i32>,
        right_cols: Vec<i32>,
    },
    Function {
        functions: Vec<RangeFunction>,
        ordinality: bool,
    },
    Values {
        lists: Vec<Vec<Expr>>,
        coltypes: Vec<Oid>,
        coltypmods: Vec<i32>,
        colcollations: Vec<Oid>,
    },
    Cte {
        name: String,
        levels_up: usize,
        self_reference: bool,
        coltypes: Vec<Oid>,
        coltypmods: Vec<i32>,
        colcollations: Vec<Oid>,
    },
    Result,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RangeTblEntry {
    pub kind: RteKind,
    /// User-written alias
    pub alias: Option<Alias>,
    /// Effective alias and column names; dropped columns are empty strings
    pub eref: Alias,
    pub lateral: bool,
    pub inh: bool,
    pub in_from_cl: bool,
    pub required_perms: u32,
    pub selected_cols: BTreeSet<i32>,
    pub inserted_cols: BTreeSet<i32>,
    pub updated_cols: BTreeSet<i32>,
    /// The CTE entry that replaced hierarchical-query inputs
    pub sw_converted: bool,
    /// A subquery whose output was produced by a hierarchical rewrite
    pub sw_sub_exist: bool,
    /// For a converted entry: reference names of the entries it replaced
    pub origin_names: Vec<String>,
}

impl RangeTblEntry {
    pub fn new(kind: RteKind, alias: Option<Alias>, eref: Alias) -> Self {
        Self {
            kind,
            alias,
            eref,
            lateral: false,
            inh: false,
            in_from_cl: true,
            required_perms: 0,
            selected_cols: BTreeSet::new(),
            inserted_cols: BTreeSet::new(),
            updated_cols: BTreeSet::new(),
            sw_converted: false,
            sw_sub_exist: false,
            origin_names: Vec::new(),
        }
    }

    /// The name references must use: the alias if given, else the effective name
    pub fn refname(&self) -> &str {
        self.alias
            .as_ref()
            .map(|a| a.aliasname.as_str())
            .unwrap_or(self.eref.aliasname.as_str())
    }

    pub fn relid(&self) -> Option<Oid> {
        match &self.kind {
            RteKind::Relation { relid, .. } => Some(*relid),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self.kind, RteKind::Relation { .. })
    }

    pub fn is_join(&self) -> bool {
        matches!(self.kind, RteKind::Join { .. })
    }

    pub fn cte_name(&self) -> Option<&str> {
        match &self.kind {
            RteKind::Cte { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }
}

/// One output column of a target list
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEntry {
    pub expr: Expr,
    /// 1-based output position
    pub resno: usize,
    pub resname: Option<String>,
    /// Nonzero when referenced by a sort, group or distinct clause
    pub ressortgroupref: usize,
    /// Originating base relation, if the column is a simple reference to one
    pub resorigtbl: Oid,
    pub resorigcol: i32,
    pub resjunk: bool,
    /// Pseudo column appended by a hierarchical rewrite
    pub pseudo: bool,
}

impl TargetEntry {
    pub fn new(expr: Expr, resno: usize, resname: Option<String>, resjunk: bool) -> Self {
        Self {
            expr,
            resno,
            resname,
            ressortgroupref: 0,
            resorigtbl: INVALID_OID,
            resorigcol: 0,
            resjunk,
            pseudo: false,
        }
    }
}

/// An entry of ORDER BY, GROUP BY, DISTINCT or a window's PARTITION/ORDER BY,
/// pointing at a target entry through `tle_sort_group_ref`
#[derive(Debug, Clone, PartialEq)]
pub struct SortGroupClause {
    pub tle_sort_group_ref: usize,
    pub eqop: String,
    pub sortop: Option<String>,
    pub nulls_first: bool,
    pub hashable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupingSet {
    Empty,
    /// Sort-group references of a plain column list
    Simple(Vec<usize>),
    Rollup(Vec<GroupingSet>),
    Cube(Vec<GroupingSet>),
    Sets(Vec<GroupingSet>),
}

impl GroupingSet {
    fn content(&self) -> Vec<usize> {
        match self {
            GroupingSet::Simple(refs) => refs.clone(),
            _ => Vec::new(),
        }
    }

    /// Expand a single grouping-set item into concrete column lists, or `None`
    /// when the expansion would exceed `limit`
    pub fn expand(&self, limit: usize) -> Option<Vec<Vec<usize>>> {
        match self {
            GroupingSet::Empty => Some(vec![Vec::new()]),
            GroupingSet::Simple(refs) => Some(vec![refs.clone()]),
            GroupingSet::Rollup(items) => {
                let mut result = Vec::with_capacity(items.len() + 1);
                for n in (0..=items.len()).rev() {
                    result.push(items[..n].iter().flat_map(GroupingSet::content).collect());
                }
                Some(result)
            }
            GroupingSet::Cube(items) => {
                // 2^n subsets; refuse before the shift overflows
                if items.len() >= usize::BITS as usize - 1 || (1usize << items.len()) > limit {
                    return None;
                }
                let count = 1usize << items.len();
                let mut result = Vec::with_capacity(count);
                for mask in 0..count {
                    let mut set = Vec::new();
                    for (i, item) in items.iter().enumerate() {
                        if mask & (1 << i) != 0 {
                            set.extend(item.content());
                        }
                    }
                    result.push(set);
                }
                Some(result)
            }
            GroupingSet::Sets(items) => {
                let mut result = Vec::new();
                for item in items {
                    result.extend(item.expand(limit)?);
                    if result.len() > limit {
                        return None;
                    }
                }
                Some(result)
            }
        }
    }
}

/// Expand a GROUP BY clause's grouping sets into concrete column lists.
///
/// Multiple grouping-set items combine as a cross product; duplicates are
/// removed within each combination but not across combinations. The result is
/// stably sorted by cardinality. `None` means the expansion exceeded `limit`.
pub fn expand_grouping_sets(sets: &[GroupingSet], limit: usize) -> Option<Vec<Vec<usize>>> {
    let mut expanded = Vec::with_capacity(sets.len());
    for set in sets {
        expanded.push(set.expand(limit)?);
    }

    let mut result: Vec<Vec<usize>> = match expanded.first() {
        Some(first) => first.iter().map(|set| union_refs(&[], set)).collect(),
        None => return Some(vec![Vec::new()]),
    };
    for next in expanded.iter().skip(1) {
        if result.len().saturating_mul(next.len()) > limit {
            return None;
        }
        let mut product = Vec::with_capacity(result.len() * next.len());
        for left in &result {
            for right in next {
                product.push(union_refs(left, right));
            }
        }
        result = product;
    }

    if result.len() > limit {
        return None;
    }
    result.sort_by_key(Vec::len);
    Some(result)
}

/// `left` followed by the members of `right` it does not already hold
fn union_refs(left: &[usize], right: &[usize]) -> Vec<usize> {
    let mut combined = left.to_vec();
    for r in right {
        if !combined.contains(r) {
            combined.push(*r);
        }
    }
    combined
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFrame {
    pub units: syntax::FrameUnits,
    pub start: FrameBoundKind,
    pub start_offset: Option<Expr>,
    pub end: FrameBoundKind,
    pub end_offset: Option<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameBoundKind {
    UnboundedPreceding,
    Preceding,
    CurrentRow,
    Following,
    UnboundedFollowing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowClause {
    pub name: Option<String>,
    pub refname: Option<String>,
    pub partition_clause: Vec<SortGroupClause>,
    pub order_clause: Vec<SortGroupClause>,
    pub frame: Option<WindowFrame>,
    /// 1-based reference used by window functions
    pub winref: usize,
    /// Copied from a base window with `OVER (w ...)`
    pub copied_order: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowMarkClause {
    pub rti: usize,
    pub strength: syntax::LockStrength,
    /// Inherited from a parent query's locking clause
    pub pushed_down: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SetOperationTree {
    RangeTblRef(usize),
    SetOp(Box<SetOperationStmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetOperationStmt {
    pub op: syntax::SetOpKind,
    pub all: bool,
    pub larg: SetOperationTree,
    pub rarg: SetOperationTree,
    pub col_types: Vec<Oid>,
    pub col_typmods: Vec<i32>,
    pub col_collations: Vec<Oid>,
}

/// How a hierarchical CTE's CONNECT BY was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectByType {
    Prior,
    Level,
    Rownum,
    MixedLevel,
}

/// Metadata a hierarchical rewrite attaches to its CTE
#[derive(Debug, Clone, PartialEq)]
pub struct StartWithOptions {
    pub siblings_order: Vec<syntax::SortBy>,
    pub connect_by_type: ConnectByType,
    /// LEVEL / ROWNUM conjuncts of CONNECT BY, analyzed against the outer query
    pub level_quals: Option<Expr>,
    /// Remaining CONNECT BY conjuncts, in raw form
    pub other_quals: Option<RawExpr>,
    pub nocycle: bool,
    /// Output positions (0-based) of prior-key columns
    pub prior_key_index: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    pub name: String,
    pub aliascolnames: Vec<String>,
    pub query: Box<Query>,
    pub recursive: bool,
    /// Number of non-self references
    pub refcount: usize,
    pub colnames: Vec<String>,
    pub coltypes: Vec<Oid>,
    pub coltypmods: Vec<i32>,
    pub colcollations: Vec<Oid>,
    pub sw_options: Option<StartWithOptions>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeAction {
    pub matched: bool,
    pub command: CommandType,
    pub qual: Option<Expr>,
    pub target_list: Vec<TargetEntry>,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// A resolved column reference
#[derive(Debug, Clone, PartialEq)]
pub struct Var {
    pub varno: usize,
    pub varattno: i32,
    pub vartype: Oid,
    pub vartypmod: i32,
    pub varcollid: Oid,
    pub levelsup: usize,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Datum {
    Null,
    Bool(bool),
    Int(i64),
    Numeric(String),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Const {
    pub consttype: Oid,
    pub consttypmod: i32,
    pub constcollid: Oid,
    pub value: Datum,
    pub location: Location,
}

impl Const {
    pub fn int4(value: i64) -> Self {
        Self {
            consttype: INT4_OID,
            consttypmod: -1,
            constcollid: INVALID_OID,
            value: Datum::Int(value),
            location: Location::UNKNOWN,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self {
            consttype: BOOL_OID,
            consttypmod: -1,
            constcollid: INVALID_OID,
            value: Datum::Bool(value),
            location: Location::UNKNOWN,
        }
    }

    pub fn null(consttype: Oid, consttypmod: i32, constcollid: Oid) -> Self {
        Self {
            consttype,
            consttypmod,
            constcollid,
            value: Datum::Null,
            location: Location::UNKNOWN,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value == Datum::Null
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggKind {
    Normal,
    OrderedSet,
    Hypothetical,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortExpr {
    pub expr: Expr,
    pub descending: bool,
    pub nulls_first: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggref {
    pub aggfnoid: Oid,
    pub aggname: String,
    pub aggtype: Oid,
    pub aggcollid: Oid,
    /// Ordered-set direct arguments
    pub direct_args: Vec<Expr>,
    pub args: Vec<Expr>,
    pub order_by: Vec<SortExpr>,
    pub distinct: bool,
    pub filter: Option<Expr>,
    pub star: bool,
    pub variadic: bool,
    pub kind: AggKind,
    pub agglevelsup: usize,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupingFunc {
    pub args: Vec<Expr>,
    /// Sort-group references of the matched grouping items
    pub refs: Vec<usize>,
    pub agglevelsup: usize,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowFunc {
    pub winfnoid: Oid,
    pub name: String,
    pub wintype: Oid,
    pub wincollid: Oid,
    pub args: Vec<Expr>,
    pub filter: Option<Expr>,
    pub winref: usize,
    pub star: bool,
    /// A plain aggregate used as a window function
    pub is_agg: bool,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionForm {
    ExplicitCall,
    ExplicitCast,
    ImplicitCast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncExpr {
    pub funcid: Oid,
    pub name: String,
    pub result_type: Oid,
    pub result_collid: Oid,
    pub args: Vec<Expr>,
    pub returns_set: bool,
    pub variadic: bool,
    pub format: CoercionForm,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpExpr {
    pub name: String,
    pub result_type: Oid,
    pub result_collid: Oid,
    pub args: Vec<Expr>,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubLinkType {
    Exists,
    Any,
    All,
    Expr,
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubLink {
    pub kind: SubLinkType,
    pub testexpr: Option<Expr>,
    pub operator: Option<String>,
    pub subselect: Box<Query>,
    pub result_type: Oid,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseWhen {
    pub cond: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub casetype: Oid,
    pub casecollid: Oid,
    pub arg: Option<Expr>,
    pub whens: Vec<CaseWhen>,
    pub default: Option<Expr>,
    pub location: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptingRef {
    pub container_type: Oid,
    pub element_type: Oid,
    pub typmod: i32,
    pub collid: Oid,
    pub upper: Vec<Option<Expr>>,
    pub lower: Vec<Option<Expr>>,
    pub is_slice: bool,
    pub container: Expr,
    /// The source value for an assignment
    pub assign: Option<Expr>,
}

impl SubscriptingRef {
    pub fn result_type(&self) -> Oid {
        if self.assign.is_some() || self.is_slice {
            self.container_type
        } else {
            self.element_type
        }
    }
}

/// Boolean connective of analyzed expressions
pub use syntax::BoolOp;
pub use syntax::BoolTestKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var(Var),
    Const(Const),
    Param {
        id: u32,
        paramtype: Oid,
        location: Location,
    },
    Aggref(Box<Aggref>),
    GroupingFunc(Box<GroupingFunc>),
    WindowFunc(Box<WindowFunc>),
    Func(Box<FuncExpr>),
    Op(Box<OpExpr>),
    Bool {
        op: BoolOp,
        args: Vec<Expr>,
        location: Location,
    },
    NullTest {
        arg: Box<Expr>,
        is_not: bool,
        location: Location,
    },
    BooleanTest {
        arg: Box<Expr>,
        kind: BoolTestKind,
        location: Location,
    },
    /// `IS [NOT] DISTINCT FROM`
    Distinct {
        args: Vec<Expr>,
        negated: bool,
        location: Location,
    },
    SubLink(Box<SubLink>),
    Case(Box<CaseExpr>),
    /// Placeholder for the CASE operand, or the prior value in an assignment
    CaseTest {
        type_oid: Oid,
        typmod: i32,
        collid: Oid,
    },
    Coalesce {
        type_oid: Oid,
        collid: Oid,
        args: Vec<Expr>,
        location: Location,
    },
    NullIf {
        type_oid: Oid,
        args: Vec<Expr>,
        location: Location,
    },
    MinMax {
        greatest: bool,
        type_oid: Oid,
        collid: Oid,
        args: Vec<Expr>,
        location: Location,
    },
    Row {
        args: Vec<Expr>,
        row_type: Oid,
        colnames: Vec<String>,
        location: Location,
    },
    Array {
        array_type: Oid,
        element_type: Oid,
        elements: Vec<Expr>,
        location: Location,
    },
    /// Type coercion chosen by the coercion service
    Coerce {
        arg: Box<Expr>,
        result_type: Oid,
        typmod: i32,
        collid: Oid,
        format: CoercionForm,
        location: Location,
    },
    Collate {
        arg: Box<Expr>,
        collid: Oid,
        location: Location,
    },
    FieldSelect {
        arg: Box<Expr>,
        fieldnum: i32,
        result_type: Oid,
        typmod: i32,
        collid: Oid,
    },
    FieldStore {
        arg: Box<Expr>,
        newvals: Vec<Expr>,
        fieldnums: Vec<i32>,
        result_type: Oid,
    },
    Subscript(Box<SubscriptingRef>),
    SetToDefault {
        type_oid: Oid,
        typmod: i32,
        collid: Oid,
        location: Location,
    },
    /// The ROWNUM pseudo column
    Rownum(Location),
}

impl Expr {
    pub fn type_oid(&self) -> Oid {
        match self {
            Expr::Var(v) => v.vartype,
            Expr::Const(c) => c.consttype,
            Expr::Param { paramtype, .. } => *paramtype,
            Expr::Aggref(a) => a.aggtype,
            Expr::GroupingFunc(_) => INT4_OID,
            Expr::WindowFunc(w) => w.wintype,
            Expr::Func(f) => f.result_type,
            Expr::Op(o) => o.result_type,
            Expr::Bool { .. }
            | Expr::NullTest { .. }
            | Expr::BooleanTest { .. }
            | Expr::Distinct { .. } => BOOL_OID,
            Expr::SubLink(s) => s.result_type,
            Expr::Case(c) => c.casetype,
            Expr::CaseTest { type_oid, .. }
            | Expr::Coalesce { type_oid, .. }
            | Expr::NullIf { type_oid, .. }
            | Expr::MinMax { type_oid, .. }
            | Expr::SetToDefault { type_oid, .. } => *type_oid,
            Expr::Row { row_type, .. } => *row_type,
            Expr::Array { array_type, .. } => *array_type,
            Expr::Coerce { result_type, .. }
            | Expr::FieldSelect { result_type, .. }
            | Expr::FieldStore { result_type, .. } => *result_type,
            Expr::Collate { arg, .. } => arg.type_oid(),
            Expr::Subscript(s) => s.result_type(),
            Expr::Rownum(_) => INT4_OID,
        }
    }

    pub fn typmod(&self) -> i32 {
        match self {
            Expr::Var(v) => v.vartypmod,
            Expr::Const(c) => c.consttypmod,
            Expr::CaseTest { typmod, .. }
            | Expr::Coerce { typmod, .. }
            | Expr::FieldSelect { typmod, .. }
            | Expr::SetToDefault { typmod, .. } => *typmod,
            Expr::Collate { arg, .. } => arg.typmod(),
            Expr::Subscript(s) if !s.is_slice && s.assign.is_none() => s.typmod,
            _ => -1,
        }
    }

    pub fn collation(&self) -> Oid {
        match self {
            Expr::Var(v) => v.varcollid,
            Expr::Const(c) => c.constcollid,
            Expr::Aggref(a) => a.aggcollid,
            Expr::WindowFunc(w) => w.wincollid,
            Expr::Func(f) => f.result_collid,
            Expr::Op(o) => o.result_collid,
            Expr::Case(c) => c.casecollid,
            Expr::CaseTest { collid, .. }
            | Expr::Coalesce { collid, .. }
            | Expr::MinMax { collid, .. }
            | Expr::Coerce { collid, .. }
            | Expr::Collate { collid, .. }
            | Expr::FieldSelect { collid, .. }
            | Expr::SetToDefault { collid, .. } => *collid,
            Expr::NullIf { args, .. } => args.first().map(Expr::collation).unwrap_or(INVALID_OID),
            Expr::Subscript(s) => s.collid,
            _ => INVALID_OID,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            Expr::Var(v) => v.location,
            Expr::Const(c) => c.location,
            Expr::Aggref(a) => a.location,
            Expr::GroupingFunc(g) => g.location,
            Expr::WindowFunc(w) => w.location,
            Expr::Func(f) => f.location,
            Expr::Op(o) => o.location,
            Expr::SubLink(s) => s.location,
            Expr::Case(c) => c.location,
            Expr::Param { location, .. }
            | Expr::Bool { location, .. }
            | Expr::NullTest { location, .. }
            | Expr::BooleanTest { location, .. }
            | Expr::Distinct { location, .. }
            | Expr::Coalesce { location, .. }
            | Expr::NullIf { location, .. }
            | Expr::MinMax { location, .. }
            | Expr::Row { location, .. }
            | Expr::Array { location, .. }
            | Expr::Coerce { location, .. }
            | Expr::Collate { location, .. }
            | Expr::SetToDefault { location, .. } => *location,
            Expr::Rownum(location) => *location,
            Expr::FieldSelect { arg, .. } | Expr::FieldStore { arg, .. } => arg.location(),
            Expr::Subscript(s) => s.container.location(),
            Expr::CaseTest { .. } => Location::UNKNOWN,
        }
    }

    pub fn returns_set(&self) -> bool {
        matches!(self, Expr::Func(f) if f.returns_set)
    }

    pub fn is_unknown_literal(&self) -> bool {
        matches!(self, Expr::Const(c) if c.consttype == crate::types::UNKNOWN_OID)
    }

    pub fn and(args: Vec<Expr>) -> Option<Expr> {
        match args.len() {
            0 => None,
            1 => args.into_iter().next(),
            _ => Some(Expr::Bool {
                op: BoolOp::And,
                args,
                location: Location::UNKNOWN,
            }),
        }
    }

    /// A row of type `record`
    pub fn record(args: Vec<Expr>, colnames: Vec<String>) -> Expr {
        Expr::Row {
            args,
            row_type: RECORD_OID,
            colnames,
            location: Location::UNKNOWN,
        }
    }

    pub fn text(value: &str) -> Expr {
        Expr::Const(Const {
            consttype: TEXT_OID,
            consttypmod: -1,
            constcollid: crate::types::DEFAULT_COLLATION_OID,
            value: Datum::Text(value.to_string()),
            location: Location::UNKNOWN,
        })
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self {
            Expr::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Strip implicit coercions
    pub fn strip_implicit(&self) -> &Expr {
        match self {
            Expr::Coerce {
                arg,
                format: CoercionForm::ImplicitCast,
                ..
            } => arg.strip_implicit(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn simple(r: usize) -> GroupingSet {
        GroupingSet::Simple(vec![r])
    }

    #[test]
    fn test_cube_expands_to_all_subsets_by_size() {
        let sets = expand_grouping_sets(&[GroupingSet::Cube(vec![simple(1), simple(2)])], 4096);
        assert_eq!(sets, Some(vec![vec![], vec![1], vec![2], vec![1, 2]]));
    }

    #[test]
    fn test_rollup_expands_to_prefixes() {
        let sets = expand_grouping_sets(
            &[GroupingSet::Rollup(vec![simple(1), simple(2), simple(3)])],
            4096,
        );
        assert_eq!(sets, Some(vec![vec![], vec![1], vec![1, 2], vec![1, 2, 3]]));
    }

    #[test]
    fn test_cross_product_dedups_within_combinations() {
        let sets = expand_grouping_sets(
            &[
                GroupingSet::Simple(vec![1]),
                GroupingSet::Sets(vec![simple(1), simple(2)]),
            ],
            4096,
        );
        assert_eq!(sets, Some(vec![vec![1], vec![1, 2]]));
    }

    #[test]
    fn test_single_item_dedups_each_set() {
        let sets = expand_grouping_sets(&[GroupingSet::Rollup(vec![simple(1), simple(1)])], 4096);
        assert_eq!(sets, Some(vec![vec![], vec![1], vec![1]]));
    }

    #[test]
    fn test_expansion_cap() {
        let items: Vec<_> = (1..=13).map(simple).collect();
        assert_eq!(expand_grouping_sets(&[GroupingSet::Cube(items)], 4096), None);
    }

    #[test]
    fn test_empty_group_by_is_one_empty_set() {
        assert_eq!(expand_grouping_sets(&[], 4096), Some(vec![vec![]]));
    }
}
