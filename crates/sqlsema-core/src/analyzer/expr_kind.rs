//! Expression contexts and the placement rules attached to them

// The DDL, policy and DML-target contexts keep the full message table; only
// query statements are analyzed, so their variants are never built.
#![allow(dead_code)]

/// The syntactic context an expression is being analyzed in.
///
/// Aggregates, window functions, sublinks and set-returning functions are
/// legal only in some of these; the `*_error` methods return the message for
/// a call placed where it is not allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExprKind {
    #[default]
    Other,
    JoinOn,
    JoinUsing,
    FromSubselect,
    FromFunction,
    Where,
    Policy,
    Having,
    Filter,
    WindowPartition,
    WindowOrder,
    WindowFrameRange,
    WindowFrameRows,
    WindowFrameGroups,
    SelectTarget,
    InsertTarget,
    UpdateSource,
    UpdateTarget,
    MergeWhen,
    GroupBy,
    OrderBy,
    DistinctOn,
    Limit,
    Offset,
    Returning,
    Values,
    ValuesSingle,
    CheckConstraint,
    DomainCheck,
    ColumnDefault,
    FunctionDefault,
    IndexExpression,
    IndexPredicate,
    StatsExpression,
    AlterColTransform,
    ExecuteParameter,
    TriggerWhen,
    PartitionBound,
    PartitionExpression,
    CallArgument,
    CopyWhere,
    GeneratedColumn,
    CycleMark,
}

/// What a context says about one kind of construct
enum Rule {
    Allowed,
    Custom(&'static str),
    /// "... are not allowed in <context name>"
    Generic,
}

impl ExprKind {
    /// The name used in "not allowed in %s" messages
    pub fn name(self) -> &'static str {
        match self {
            ExprKind::Other => "extension expression",
            ExprKind::JoinOn => "JOIN/ON",
            ExprKind::JoinUsing => "JOIN/USING",
            ExprKind::FromSubselect => "sub-SELECT in FROM",
            ExprKind::FromFunction => "function in FROM",
            ExprKind::Where | ExprKind::CopyWhere => "WHERE",
            ExprKind::Policy => "POLICY",
            ExprKind::Having => "HAVING",
            ExprKind::Filter => "FILTER",
            ExprKind::WindowPartition => "window PARTITION BY",
            ExprKind::WindowOrder => "window ORDER BY",
            ExprKind::WindowFrameRange => "window RANGE",
            ExprKind::WindowFrameRows => "window ROWS",
            ExprKind::WindowFrameGroups => "window GROUPS",
            ExprKind::SelectTarget => "SELECT",
            ExprKind::InsertTarget => "INSERT",
            ExprKind::UpdateSource | ExprKind::UpdateTarget => "UPDATE",
            ExprKind::MergeWhen => "MERGE WHEN",
            ExprKind::GroupBy => "GROUP BY",
            ExprKind::OrderBy => "ORDER BY",
            ExprKind::DistinctOn => "DISTINCT ON",
            ExprKind::Limit => "LIMIT",
            ExprKind::Offset => "OFFSET",
            ExprKind::Returning => "RETURNING",
            ExprKind::Values | ExprKind::ValuesSingle => "VALUES",
            ExprKind::CheckConstraint | ExprKind::DomainCheck => "CHECK",
            ExprKind::ColumnDefault | ExprKind::FunctionDefault => "DEFAULT",
            ExprKind::IndexExpression => "index expression",
            ExprKind::IndexPredicate => "index predicate",
            ExprKind::StatsExpression => "statistics expression",
            ExprKind::AlterColTransform => "USING",
            ExprKind::ExecuteParameter => "EXECUTE",
            ExprKind::TriggerWhen => "WHEN",
            ExprKind::PartitionBound => "partition bound",
            ExprKind::PartitionExpression => "PARTITION BY",
            ExprKind::CallArgument => "CALL",
            ExprKind::GeneratedColumn => "GENERATED AS",
            ExprKind::CycleMark => "CYCLE",
        }
    }

    /// Object-definition contexts share one suffix per construct family
    fn ddl_suffix(self) -> Option<&'static str> {
        Some(match self {
            ExprKind::CheckConstraint | ExprKind::DomainCheck => "check constraints",
            ExprKind::ColumnDefault | ExprKind::FunctionDefault => "DEFAULT expressions",
            ExprKind::IndexExpression => "index expressions",
            ExprKind::IndexPredicate => "index predicates",
            ExprKind::StatsExpression => "statistics expressions",
            ExprKind::AlterColTransform => "transform expressions",
            ExprKind::ExecuteParameter => "EXECUTE parameters",
            ExprKind::TriggerWhen => "trigger WHEN conditions",
            ExprKind::PartitionBound => "partition bound",
            ExprKind::PartitionExpression => "partition key expressions",
            ExprKind::CallArgument => "CALL arguments",
            ExprKind::CopyWhere => "COPY FROM WHERE conditions",
            ExprKind::GeneratedColumn => "column generation expressions",
            ExprKind::Policy => "policy expressions",
            ExprKind::MergeWhen => "MERGE WHEN conditions",
            ExprKind::JoinOn | ExprKind::JoinUsing => "JOIN conditions",
            _ => return None,
        })
    }

    fn agg_rule(self) -> Rule {
        match self {
            ExprKind::Other
            | ExprKind::Having
            | ExprKind::WindowPartition
            | ExprKind::WindowOrder
            | ExprKind::SelectTarget
            | ExprKind::OrderBy
            | ExprKind::DistinctOn => Rule::Allowed,
            ExprKind::FromSubselect => Rule::Custom("FROM clause of their own query level"),
            ExprKind::FromFunction => Rule::Custom("functions in FROM"),
            ExprKind::WindowFrameRange => Rule::Custom("window RANGE"),
            ExprKind::WindowFrameRows => Rule::Custom("window ROWS"),
            ExprKind::WindowFrameGroups => Rule::Custom("window GROUPS"),
            kind => match kind.ddl_suffix() {
                Some(suffix) => Rule::Custom(suffix),
                None => Rule::Generic,
            },
        }
    }

    fn window_rule(self) -> Rule {
        match self {
            ExprKind::Other
            | ExprKind::SelectTarget
            | ExprKind::OrderBy
            | ExprKind::DistinctOn => Rule::Allowed,
            ExprKind::FromFunction => Rule::Custom("functions in FROM"),
            ExprKind::WindowPartition
            | ExprKind::WindowOrder
            | ExprKind::WindowFrameRange
            | ExprKind::WindowFrameRows
            | ExprKind::WindowFrameGroups => Rule::Custom("window definitions"),
            kind => match kind.ddl_suffix() {
                Some(suffix) => Rule::Custom(suffix),
                None => Rule::Generic,
            },
        }
    }

    fn srf_rule(self) -> Rule {
        match self {
            ExprKind::Other
            | ExprKind::FromFunction
            | ExprKind::WindowPartition
            | ExprKind::WindowOrder
            | ExprKind::SelectTarget
            | ExprKind::InsertTarget
            | ExprKind::GroupBy
            | ExprKind::OrderBy
            | ExprKind::DistinctOn
            | ExprKind::Returning
            | ExprKind::ValuesSingle => Rule::Allowed,
            ExprKind::WindowFrameRange
            | ExprKind::WindowFrameRows
            | ExprKind::WindowFrameGroups => Rule::Custom("window definitions"),
            kind => match kind.ddl_suffix() {
                Some(suffix) => Rule::Custom(suffix),
                None => Rule::Generic,
            },
        }
    }

    fn render(self, rule: Rule, subject: &str) -> Option<String> {
        match rule {
            Rule::Allowed => None,
            Rule::Custom(suffix) => Some(format!("{subject} are not allowed in {suffix}")),
            Rule::Generic => Some(format!("{subject} are not allowed in {}", self.name())),
        }
    }

    /// Error for an aggregate (`is_agg`) or a GROUPING operation whose
    /// semantic level analyzes in this context
    pub fn agg_error(self, is_agg: bool) -> Option<String> {
        let subject = if is_agg {
            "aggregate functions"
        } else {
            "grouping operations"
        };
        self.render(self.agg_rule(), subject)
    }

    pub fn window_error(self) -> Option<String> {
        self.render(self.window_rule(), "window functions")
    }

    /// Error for a set-returning function call in this context
    pub fn srf_error(self) -> Option<String> {
        self.render(self.srf_rule(), "set-returning functions")
    }

    /// Whether a set-returning function here counts as a target-list SRF
    pub fn srf_in_target(self) -> bool {
        !matches!(self, ExprKind::FromFunction | ExprKind::Other)
    }

    pub fn sublink_error(self) -> Option<&'static str> {
        Some(match self {
            ExprKind::CheckConstraint | ExprKind::DomainCheck => {
                "cannot use subquery in check constraint"
            }
            ExprKind::ColumnDefault | ExprKind::FunctionDefault => {
                "cannot use subquery in DEFAULT expression"
            }
            ExprKind::IndexExpression => "cannot use subquery in index expression",
            ExprKind::IndexPredicate => "cannot use subquery in index predicate",
            ExprKind::StatsExpression => "cannot use subquery in statistics expression",
            ExprKind::AlterColTransform => "cannot use subquery in transform expression",
            ExprKind::ExecuteParameter => "cannot use subquery in EXECUTE parameter",
            ExprKind::TriggerWhen => "cannot use subquery in trigger WHEN condition",
            ExprKind::PartitionBound => "cannot use subquery in partition bound",
            ExprKind::PartitionExpression => "cannot use subquery in partition key expression",
            ExprKind::CallArgument => "cannot use subquery in CALL argument",
            ExprKind::CopyWhere => "cannot use subquery in COPY FROM WHERE condition",
            ExprKind::GeneratedColumn => "cannot use subquery in column generation expression",
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_aggregate_placement_messages() {
        assert_eq!(ExprKind::SelectTarget.agg_error(true), None);
        assert_eq!(ExprKind::Having.agg_error(true), None);
        assert_eq!(
            ExprKind::Where.agg_error(true).as_deref(),
            Some("aggregate functions are not allowed in WHERE")
        );
        assert_eq!(
            ExprKind::JoinOn.agg_error(false).as_deref(),
            Some("grouping operations are not allowed in JOIN conditions")
        );
        assert_eq!(
            ExprKind::CheckConstraint.agg_error(true).as_deref(),
            Some("aggregate functions are not allowed in check constraints")
        );
        assert_eq!(
            ExprKind::FromSubselect.agg_error(true).as_deref(),
            Some("aggregate functions are not allowed in FROM clause of their own query level")
        );
    }

    #[test]
    fn test_window_placement_messages() {
        assert_eq!(ExprKind::OrderBy.window_error(), None);
        assert_eq!(
            ExprKind::Having.window_error().as_deref(),
            Some("window functions are not allowed in HAVING")
        );
        assert_eq!(
            ExprKind::WindowPartition.window_error().as_deref(),
            Some("window functions are not allowed in window definitions")
        );
    }

    #[test]
    fn test_srf_placement_messages() {
        assert_eq!(ExprKind::SelectTarget.srf_error(), None);
        assert_eq!(
            ExprKind::Where.srf_error().as_deref(),
            Some("set-returning functions are not allowed in WHERE")
        );
        assert_eq!(
            ExprKind::GeneratedColumn.srf_error().as_deref(),
            Some("set-returning functions are not allowed in column generation expressions")
        );
        assert_eq!(
            ExprKind::Values.srf_error().as_deref(),
            Some("set-returning functions are not allowed in VALUES")
        );
    }

    #[test]
    fn test_sublink_placement() {
        assert_eq!(ExprKind::Where.sublink_error(), None);
        assert_eq!(
            ExprKind::ColumnDefault.sublink_error(),
            Some("cannot use subquery in DEFAULT expression")
        );
    }
}
