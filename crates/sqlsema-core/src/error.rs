//! Error and diagnostic types

use std::fmt;

use miette::{LabeledSpan, SourceSpan};
use serde::{Deserialize, Serialize};

/// Source location span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset from start of source
    pub offset: usize,
    /// Length in bytes
    pub length: usize,
    /// Line number (1-indexed, 0 when unknown)
    pub line: usize,
    /// Column number (1-indexed, 0 when unknown)
    pub column: usize,
}

impl Span {
    /// Create a span from a byte offset
    pub fn new(offset: usize, length: usize) -> Self {
        Self {
            offset,
            length,
            line: 0,
            column: 0,
        }
    }

    /// Create a span with line and column information
    pub fn with_location(line: usize, column: usize, length: usize) -> Self {
        Self {
            offset: 0,
            length,
            line,
            column,
        }
    }

    /// Create a span from sqlparser's Span.
    ///
    /// Returns `None` for the empty span sqlparser uses when a node carries no
    /// position (literals, synthesized nodes).
    pub fn from_sqlparser(span: &sqlparser::tokenizer::Span) -> Option<Self> {
        let start = span.start;
        let end = span.end;
        if start.line == 0 {
            return None;
        }
        let length = if end.line == start.line && end.column > start.column {
            end.column as usize - start.column as usize
        } else {
            1
        };
        Some(Self {
            offset: 0,
            length,
            line: start.line as usize,
            column: start.column as usize,
        })
    }
}

impl From<Span> for SourceSpan {
    fn from(span: Span) -> Self {
        SourceSpan::new(span.offset.into(), span.length)
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

/// Diagnostic message for SQL analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
    pub detail: Option<String>,
    pub help: Option<String>,
    pub labels: Vec<Label>,
}

/// Label for source annotations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            span: None,
            detail: None,
            help: None,
            labels: Vec::new(),
        }
    }

    pub fn warning(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Warning,
            message: message.into(),
            span: None,
            detail: None,
            help: None,
            labels: Vec::new(),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Attach a span if one is known
    pub fn at(mut self, span: Option<Span>) -> Self {
        if span.is_some() {
            self.span = span;
        }
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn with_label(mut self, message: impl Into<String>, span: Span) -> Self {
        self.labels.push(Label {
            message: message.into(),
            span,
        });
        self
    }

    /// Get the error code string (e.g., "E0001")
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl miette::Diagnostic for Diagnostic {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(format!("{}({})", self.kind.code(), self.kind.name())))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.severity {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
            Severity::Info => miette::Severity::Advice,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match (&self.detail, &self.help) {
            (Some(detail), Some(help)) => Some(Box::new(format!("{detail}\n{help}"))),
            (Some(detail), None) => Some(Box::new(detail)),
            (None, Some(help)) => Some(Box::new(help)),
            (None, None) => None,
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let primary = self
            .span
            .map(|span| LabeledSpan::new_with_span(None, SourceSpan::from(span)));
        let secondary = self
            .labels
            .iter()
            .map(|l| LabeledSpan::new_with_span(Some(l.message.clone()), SourceSpan::from(l.span)));
        Some(Box::new(primary.into_iter().chain(secondary)))
    }
}

/// Types of diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    /// E0001: relation does not exist
    TableNotFound,
    /// E0002: column does not exist
    ColumnNotFound,
    /// E0003: datatype mismatch
    TypeMismatch,
    /// E0004: value cannot be coerced to the target type
    CannotCoerce,
    /// E0005: INSERT expression/column count mismatch
    ColumnCountMismatch,
    /// E0006: ambiguous column reference
    AmbiguousColumn,
    /// E0007: ambiguous table reference
    AmbiguousAlias,
    /// E0008: table name specified more than once
    DuplicateAlias,
    /// E0009: column specified more than once
    DuplicateColumn,
    /// E0010: function does not exist
    UndefinedFunction,
    /// E0011: type, window or other named object does not exist
    UndefinedObject,
    /// E0012: grouping rule violated
    GroupingError,
    /// E0013: window function misuse
    WindowingError,
    /// E0014: invalid column or FROM-clause reference
    InvalidColumnReference,
    /// E0015: invalid recursive query
    InvalidRecursion,
    /// E0016: invalid type modifier or parameter value
    InvalidParameterValue,
    /// E0017: object is of the wrong kind
    WrongObjectType,
    /// E0018: feature not supported
    FeatureNotSupported,
    /// E0019: program limit exceeded
    ProgramLimitExceeded,
    /// E0020: statement too complex
    StatementTooComplex,
    /// E0021: identifier too long
    NameTooLong,
    /// E0022: stack depth limit exceeded
    StackDepthExceeded,
    /// E0023: syntax error in an otherwise parsed statement
    SyntaxError,
    /// Parse error
    ParseError,
}

impl DiagnosticKind {
    pub fn code(&self) -> &'static str {
        match self {
            DiagnosticKind::TableNotFound => "E0001",
            DiagnosticKind::ColumnNotFound => "E0002",
            DiagnosticKind::TypeMismatch => "E0003",
            DiagnosticKind::CannotCoerce => "E0004",
            DiagnosticKind::ColumnCountMismatch => "E0005",
            DiagnosticKind::AmbiguousColumn => "E0006",
            DiagnosticKind::AmbiguousAlias => "E0007",
            DiagnosticKind::DuplicateAlias => "E0008",
            DiagnosticKind::DuplicateColumn => "E0009",
            DiagnosticKind::UndefinedFunction => "E0010",
            DiagnosticKind::UndefinedObject => "E0011",
            DiagnosticKind::GroupingError => "E0012",
            DiagnosticKind::WindowingError => "E0013",
            DiagnosticKind::InvalidColumnReference => "E0014",
            DiagnosticKind::InvalidRecursion => "E0015",
            DiagnosticKind::InvalidParameterValue => "E0016",
            DiagnosticKind::WrongObjectType => "E0017",
            DiagnosticKind::FeatureNotSupported => "E0018",
            DiagnosticKind::ProgramLimitExceeded => "E0019",
            DiagnosticKind::StatementTooComplex => "E0020",
            DiagnosticKind::NameTooLong => "E0021",
            DiagnosticKind::StackDepthExceeded => "E0022",
            DiagnosticKind::SyntaxError => "E0023",
            DiagnosticKind::ParseError => "E1000",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DiagnosticKind::TableNotFound => "table-not-found",
            DiagnosticKind::ColumnNotFound => "column-not-found",
            DiagnosticKind::TypeMismatch => "type-mismatch",
            DiagnosticKind::CannotCoerce => "cannot-coerce",
            DiagnosticKind::ColumnCountMismatch => "column-count-mismatch",
            DiagnosticKind::AmbiguousColumn => "ambiguous-column",
            DiagnosticKind::AmbiguousAlias => "ambiguous-alias",
            DiagnosticKind::DuplicateAlias => "duplicate-alias",
            DiagnosticKind::DuplicateColumn => "duplicate-column",
            DiagnosticKind::UndefinedFunction => "undefined-function",
            DiagnosticKind::UndefinedObject => "undefined-object",
            DiagnosticKind::GroupingError => "grouping-error",
            DiagnosticKind::WindowingError => "windowing-error",
            DiagnosticKind::InvalidColumnReference => "invalid-column-reference",
            DiagnosticKind::InvalidRecursion => "invalid-recursion",
            DiagnosticKind::InvalidParameterValue => "invalid-parameter-value",
            DiagnosticKind::WrongObjectType => "wrong-object-type",
            DiagnosticKind::FeatureNotSupported => "feature-not-supported",
            DiagnosticKind::ProgramLimitExceeded => "program-limit-exceeded",
            DiagnosticKind::StatementTooComplex => "statement-too-complex",
            DiagnosticKind::NameTooLong => "name-too-long",
            DiagnosticKind::StackDepthExceeded => "stack-depth-exceeded",
            DiagnosticKind::SyntaxError => "syntax-error",
            DiagnosticKind::ParseError => "parse-error",
        }
    }

    /// The SQLSTATE this kind corresponds to
    pub fn sqlstate(&self) -> &'static str {
        match self {
            DiagnosticKind::TableNotFound => "42P01",
            DiagnosticKind::ColumnNotFound => "42703",
            DiagnosticKind::TypeMismatch => "42804",
            DiagnosticKind::CannotCoerce => "42846",
            DiagnosticKind::ColumnCountMismatch => "42601",
            DiagnosticKind::AmbiguousColumn => "42702",
            DiagnosticKind::AmbiguousAlias => "42P09",
            DiagnosticKind::DuplicateAlias => "42712",
            DiagnosticKind::DuplicateColumn => "42701",
            DiagnosticKind::UndefinedFunction => "42883",
            DiagnosticKind::UndefinedObject => "42704",
            DiagnosticKind::GroupingError => "42803",
            DiagnosticKind::WindowingError => "42P20",
            DiagnosticKind::InvalidColumnReference => "42P10",
            DiagnosticKind::InvalidRecursion => "42P19",
            DiagnosticKind::InvalidParameterValue => "22023",
            DiagnosticKind::WrongObjectType => "42809",
            DiagnosticKind::FeatureNotSupported => "0A000",
            DiagnosticKind::ProgramLimitExceeded => "54000",
            DiagnosticKind::StatementTooComplex => "54001",
            DiagnosticKind::NameTooLong => "42622",
            DiagnosticKind::StackDepthExceeded => "54001",
            DiagnosticKind::SyntaxError | DiagnosticKind::ParseError => "42601",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Result type used throughout the analyzer
pub type Result<T> = std::result::Result<T, Diagnostic>;
