//! Raw syntax tree
//!
//! This is the grammar-level input of the analyzer: names are still
//! unresolved strings, stars are unexpanded and every fallible node carries
//! a [`Location`]. Trees are produced by lowering `sqlparser` ASTs
//! (see [`lower`]) or built directly.

pub mod lower;
pub mod scan;
pub mod visit;

use crate::error::Span;

/// Source position of a node, or unknown for synthesized nodes.
///
/// Locations never take part in equality: two lexically identical
/// expressions at different positions compare equal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Location(pub Option<Span>);

impl Location {
    pub const UNKNOWN: Location = Location(None);

    pub fn span(&self) -> Option<Span> {
        self.0
    }
}

impl PartialEq for Location {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for Location {}

impl From<Span> for Location {
    fn from(span: Span) -> Self {
        Location(Some(span))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawStmt {
    Select(Box<SelectStmt>),
    Insert(Box<InsertStmt>),
    Update(Box<UpdateStmt>),
    Delete(Box<DeleteStmt>),
    Merge(Box<MergeStmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub with: Option<WithClause>,
    pub body: SelectBody,
    pub order_by: Vec<SortBy>,
    pub limit: Option<RawExpr>,
    pub offset: Option<RawExpr>,
    pub locking: Vec<LockingClause>,
    pub loc: Location,
}

impl SelectStmt {
    pub fn simple(select: SimpleSelect) -> Self {
        Self {
            with: None,
            body: SelectBody::Simple(Box::new(select)),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            locking: Vec::new(),
            loc: Location::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectBody {
    Simple(Box<SimpleSelect>),
    Values(Vec<Vec<RawExpr>>),
    SetOp {
        op: SetOpKind,
        all: bool,
        left: Box<SelectStmt>,
        right: Box<SelectStmt>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    Intersect,
    Except,
}

impl std::fmt::Display for SetOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SetOpKind::Union => f.write_str("UNION"),
            SetOpKind::Intersect => f.write_str("INTERSECT"),
            SetOpKind::Except => f.write_str("EXCEPT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimpleSelect {
    /// `None` for no DISTINCT, an empty list for plain DISTINCT, otherwise DISTINCT ON
    pub distinct: Option<Vec<RawExpr>>,
    pub targets: Vec<ResTarget>,
    pub from: Vec<FromItem>,
    pub where_clause: Option<RawExpr>,
    pub group_by: Vec<GroupItem>,
    pub having: Option<RawExpr>,
    pub windows: Vec<WindowDef>,
    pub start_with: Option<StartWithClause>,
}

/// `START WITH ... CONNECT BY [NOCYCLE] ... [ORDER SIBLINGS BY ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct StartWithClause {
    pub start_with: Option<RawExpr>,
    pub connect_by: RawExpr,
    pub nocycle: bool,
    pub siblings_order: Vec<SortBy>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithClause {
    pub recursive: bool,
    pub ctes: Vec<CommonTableExpr>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommonTableExpr {
    pub name: String,
    pub columns: Vec<String>,
    pub query: Box<SelectStmt>,
    pub loc: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Default,
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullsOrder {
    #[default]
    Default,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortBy {
    pub expr: RawExpr,
    pub dir: SortDir,
    pub nulls: NullsOrder,
    pub loc: Location,
}

impl SortBy {
    pub fn new(expr: RawExpr) -> Self {
        Self {
            expr,
            dir: SortDir::Default,
            nulls: NullsOrder::Default,
            loc: Location::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LockStrength {
    Share,
    Update,
}

/// `FOR UPDATE / FOR SHARE [OF rel, ...]`
#[derive(Debug, Clone, PartialEq)]
pub struct LockingClause {
    pub strength: LockStrength,
    /// Empty means every relation of the query level
    pub rels: Vec<String>,
    pub loc: Location,
}

/// A select-list entry, INSERT column or UPDATE SET item
#[derive(Debug, Clone, PartialEq)]
pub struct ResTarget {
    pub name: Option<String>,
    pub indirection: Vec<Indirection>,
    pub val: RawExpr,
    pub loc: Location,
}

impl ResTarget {
    pub fn unnamed(val: RawExpr) -> Self {
        Self {
            name: None,
            indirection: Vec::new(),
            val,
            loc: Location::UNKNOWN,
        }
    }

    pub fn named(name: impl Into<String>, val: RawExpr) -> Self {
        Self {
            name: Some(name.into()),
            indirection: Vec::new(),
            val,
            loc: Location::UNKNOWN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alias {
    pub name: String,
    pub columns: Vec<String>,
}

impl Alias {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }
}

/// A (possibly schema-qualified) relation name in FROM or a DML target
#[derive(Debug, Clone, PartialEq)]
pub struct RangeVar {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<Alias>,
    pub inh: bool,
    pub loc: Location,
}

impl RangeVar {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
            alias: None,
            inh: true,
            loc: Location::UNKNOWN,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(Alias::new(alias));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromItem {
    Relation(RangeVar),
    Subselect {
        lateral: bool,
        query: Box<SelectStmt>,
        alias: Option<Alias>,
        loc: Location,
    },
    Function {
        lateral: bool,
        func: Box<FuncCall>,
        ordinality: bool,
        alias: Option<Alias>,
        loc: Location,
    },
    Join(Box<JoinExpr>),
}

impl FromItem {
    pub fn location(&self) -> Location {
        match self {
            FromItem::Relation(rv) => rv.loc,
            FromItem::Subselect { loc, .. } | FromItem::Function { loc, .. } => *loc,
            FromItem::Join(join) => join.loc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinExpr {
    pub kind: JoinKind,
    pub natural: bool,
    pub left: FromItem,
    pub right: FromItem,
    pub using: Vec<String>,
    pub quals: Option<RawExpr>,
    pub alias: Option<Alias>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupItem {
    Expr(RawExpr),
    /// `()`
    Empty,
    /// A parenthesised column list inside GROUPING SETS or ROLLUP/CUBE
    Simple(Vec<RawExpr>),
    Rollup(Vec<GroupItem>),
    Cube(Vec<GroupItem>),
    Sets(Vec<GroupItem>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameUnits {
    Rows,
    Range,
    Groups,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameBound {
    UnboundedPreceding,
    Preceding(Box<RawExpr>),
    CurrentRow,
    Following(Box<RawExpr>),
    UnboundedFollowing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameSpec {
    pub units: FrameUnits,
    pub start: FrameBound,
    pub end: Option<FrameBound>,
}

/// A window specification, either named in WINDOW or inline in OVER
#[derive(Debug, Clone, PartialEq)]
pub struct WindowDef {
    /// Definition name in `WINDOW w AS (...)`, or the referenced name in `OVER w`
    pub name: Option<String>,
    /// Base window in `OVER (w ORDER BY ...)`
    pub refname: Option<String>,
    pub partition_by: Vec<RawExpr>,
    pub order_by: Vec<SortBy>,
    pub frame: Option<FrameSpec>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStmt {
    pub relation: RangeVar,
    pub columns: Vec<ResTarget>,
    /// `None` for DEFAULT VALUES
    pub source: Option<Box<SelectStmt>>,
    pub returning: Vec<ResTarget>,
    pub with: Option<WithClause>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStmt {
    pub relation: RangeVar,
    pub targets: Vec<ResTarget>,
    pub from: Vec<FromItem>,
    pub where_clause: Option<RawExpr>,
    pub returning: Vec<ResTarget>,
    pub with: Option<WithClause>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStmt {
    pub relation: RangeVar,
    pub using: Vec<FromItem>,
    pub where_clause: Option<RawExpr>,
    pub returning: Vec<ResTarget>,
    pub with: Option<WithClause>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeStmt {
    pub target: RangeVar,
    pub source: FromItem,
    pub on: RawExpr,
    pub clauses: Vec<MergeWhen>,
    pub with: Option<WithClause>,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeWhen {
    pub matched: bool,
    pub condition: Option<RawExpr>,
    pub action: MergeAction,
    pub loc: Location,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MergeAction {
    Update(Vec<ResTarget>),
    Delete,
    Insert {
        columns: Vec<ResTarget>,
        /// `None` for INSERT DEFAULT VALUES / INSERT ROW
        values: Option<Vec<RawExpr>>,
    },
    DoNothing,
}

/// Type-name syntax
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeName {
    /// Dotted name, possibly schema- or package-qualified
    pub names: Vec<String>,
    pub typmods: Vec<RawExpr>,
    /// One entry per `[]`, -1 when no bound was written
    pub array_bounds: Vec<i32>,
    /// `name%TYPE`
    pub pct_type: bool,
    /// `name%ROWTYPE`
    pub pct_rowtype: bool,
    pub loc: Location,
}

impl TypeName {
    pub fn new(name: &str) -> Self {
        Self {
            names: vec![name.to_string()],
            ..Default::default()
        }
    }

    pub fn qualified(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn dotted(&self) -> String {
        self.names.join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnField {
    Name(String),
    Star,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    pub fields: Vec<ColumnField>,
    /// Marked by `PRIOR` in a CONNECT BY clause
    pub prior: bool,
    pub loc: Location,
}

impl ColumnRef {
    pub fn new(names: &[&str]) -> Self {
        Self {
            fields: names
                .iter()
                .map(|n| {
                    if *n == "*" {
                        ColumnField::Star
                    } else {
                        ColumnField::Name(n.to_string())
                    }
                })
                .collect(),
            prior: false,
            loc: Location::UNKNOWN,
        }
    }

    /// The field names, if none of them is a star
    pub fn names(&self) -> Option<Vec<&str>> {
        self.fields
            .iter()
            .map(|f| match f {
                ColumnField::Name(n) => Some(n.as_str()),
                ColumnField::Star => None,
            })
            .collect()
    }

    pub fn is_star(&self) -> bool {
        matches!(self.fields.last(), Some(ColumnField::Star))
    }

    /// Dotted rendering, used in messages
    pub fn dotted(&self) -> String {
        self.fields
            .iter()
            .map(|f| match f {
                ColumnField::Name(n) => n.as_str(),
                ColumnField::Star => "*",
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Indirection {
    Field(String),
    Star,
    Subscript {
        lower: Option<Box<RawExpr>>,
        upper: Option<Box<RawExpr>>,
        is_slice: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Integer(i64),
    /// Non-integral or out-of-range numeric text
    Numeric(String),
    String(String),
    Bool(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolTestKind {
    IsTrue,
    IsNotTrue,
    IsFalse,
    IsNotFalse,
    IsUnknown,
    IsNotUnknown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubLinkKind {
    Exists,
    /// `x op ANY (subquery)`, and `x IN (subquery)` as `= ANY`
    Any(String),
    All(String),
    Expr,
    Array,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncCall {
    pub name: Vec<String>,
    pub args: Vec<RawExpr>,
    /// Parallel to `args`: the name of a named argument
    pub arg_names: Vec<Option<String>>,
    pub agg_order: Vec<SortBy>,
    pub agg_filter: Option<Box<RawExpr>>,
    pub agg_within_group: bool,
    pub agg_star: bool,
    pub agg_distinct: bool,
    pub variadic: bool,
    pub over: Option<Box<WindowDef>>,
    pub loc: Location,
}

impl FuncCall {
    pub fn new(name: &str, args: Vec<RawExpr>) -> Self {
        let arg_names = vec![None; args.len()];
        Self {
            name: vec![name.to_string()],
            args,
            arg_names,
            agg_order: Vec::new(),
            agg_filter: None,
            agg_within_group: false,
            agg_star: false,
            agg_distinct: false,
            variadic: false,
            over: None,
            loc: Location::UNKNOWN,
        }
    }

    /// Last component of the function name
    pub fn func_name(&self) -> &str {
        self.name.last().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawExpr {
    ColumnRef(ColumnRef),
    Const(Literal, Location),
    /// `$n`
    Param(u32, Location),
    /// Binary or prefix operator
    Op {
        name: String,
        left: Option<Box<RawExpr>>,
        right: Option<Box<RawExpr>>,
        loc: Location,
    },
    Bool {
        op: BoolOp,
        args: Vec<RawExpr>,
        loc: Location,
    },
    In {
        expr: Box<RawExpr>,
        list: Vec<RawExpr>,
        negated: bool,
        loc: Location,
    },
    NullTest {
        arg: Box<RawExpr>,
        is_not: bool,
        loc: Location,
    },
    BoolTest {
        arg: Box<RawExpr>,
        kind: BoolTestKind,
        loc: Location,
    },
    DistinctFrom {
        left: Box<RawExpr>,
        right: Box<RawExpr>,
        negated: bool,
        loc: Location,
    },
    TypeCast {
        arg: Box<RawExpr>,
        type_name: TypeName,
        loc: Location,
    },
    Collate {
        arg: Box<RawExpr>,
        collation: Vec<String>,
        loc: Location,
    },
    FuncCall(Box<FuncCall>),
    SubLink {
        kind: SubLinkKind,
        test: Option<Box<RawExpr>>,
        subselect: Box<SelectStmt>,
        loc: Location,
    },
    Case {
        arg: Option<Box<RawExpr>>,
        whens: Vec<(RawExpr, RawExpr)>,
        default: Option<Box<RawExpr>>,
        loc: Location,
    },
    Coalesce(Vec<RawExpr>, Location),
    NullIf(Box<RawExpr>, Box<RawExpr>, Location),
    MinMax {
        greatest: bool,
        args: Vec<RawExpr>,
        loc: Location,
    },
    Row(Vec<RawExpr>, Location),
    Array(Vec<RawExpr>, Location),
    Indirection {
        arg: Box<RawExpr>,
        indirection: Vec<Indirection>,
        loc: Location,
    },
    /// The ROWNUM pseudo column
    Rownum(Location),
    GroupingFunc(Vec<RawExpr>, Location),
    /// `DEFAULT` in INSERT VALUES / UPDATE SET
    SetToDefault(Location),
}

impl RawExpr {
    pub fn column(names: &[&str]) -> Self {
        RawExpr::ColumnRef(ColumnRef::new(names))
    }

    pub fn int(value: i64) -> Self {
        RawExpr::Const(Literal::Integer(value), Location::UNKNOWN)
    }

    pub fn string(value: &str) -> Self {
        RawExpr::Const(Literal::String(value.to_string()), Location::UNKNOWN)
    }

    pub fn boolean(value: bool) -> Self {
        RawExpr::Const(Literal::Bool(value), Location::UNKNOWN)
    }

    pub fn op(name: &str, left: RawExpr, right: RawExpr) -> Self {
        RawExpr::Op {
            name: name.to_string(),
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            loc: Location::UNKNOWN,
        }
    }

    pub fn and(left: RawExpr, right: RawExpr) -> Self {
        RawExpr::Bool {
            op: BoolOp::And,
            args: vec![left, right],
            loc: Location::UNKNOWN,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            RawExpr::ColumnRef(c) => c.loc,
            RawExpr::FuncCall(f) => f.loc,
            RawExpr::Const(_, loc)
            | RawExpr::Param(_, loc)
            | RawExpr::Coalesce(_, loc)
            | RawExpr::NullIf(_, _, loc)
            | RawExpr::Row(_, loc)
            | RawExpr::Array(_, loc)
            | RawExpr::Rownum(loc)
            | RawExpr::GroupingFunc(_, loc)
            | RawExpr::SetToDefault(loc) => *loc,
            RawExpr::Op { loc, .. }
            | RawExpr::Bool { loc, .. }
            | RawExpr::In { loc, .. }
            | RawExpr::NullTest { loc, .. }
            | RawExpr::BoolTest { loc, .. }
            | RawExpr::DistinctFrom { loc, .. }
            | RawExpr::TypeCast { loc, .. }
            | RawExpr::Collate { loc, .. }
            | RawExpr::SubLink { loc, .. }
            | RawExpr::Case { loc, .. }
            | RawExpr::MinMax { loc, .. }
            | RawExpr::Indirection { loc, .. } => *loc,
        }
    }

    pub fn span(&self) -> Option<Span> {
        self.location().span()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_is_ignored_by_equality() {
        let a = RawExpr::Const(Literal::Integer(1), Location(Some(Span::new(3, 1))));
        let b = RawExpr::Const(Literal::Integer(1), Location::UNKNOWN);
        assert_eq!(a, b);
        assert_ne!(a, RawExpr::int(2));
    }

    #[test]
    fn test_column_ref_helpers() {
        let star = ColumnRef::new(&["t", "*"]);
        assert!(star.is_star());
        assert_eq!(star.names(), None);
        assert_eq!(star.dotted(), "t.*");

        let col = ColumnRef::new(&["t", "c"]);
        assert_eq!(col.names(), Some(vec!["t", "c"]));
    }
}
