//! Lexical pre-pass for syntax the grammar crate lacks
//!
//! Subscripts on UPDATE SET targets (`SET arr[1] = ...`) are lifted out and
//! parsed separately, for every dialect.
//!
//! START WITH and CONNECT BY clauses are lifted out of the statement text,
//! so the rest parses as plain SQL whatever order the clauses come in and
//! whether or not START WITH is present. Each condition is kept as a copy of
//! the statement with everything else blanked, which parses on its own with
//! line and column positions intact. `PRIOR` inside a condition and
//! `SIBLINGS` in `ORDER SIBLINGS BY` are blanked too. Byte offsets never
//! move; the offset of the token following each removed keyword is recorded
//! so lowering can re-attach it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

/// One condition of a lifted hierarchical clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// The statement with every byte outside the condition blanked
    pub text: String,
    pub range: Range<usize>,
}

/// START WITH / CONNECT BY of one SELECT
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyClause {
    pub start_with: Option<Condition>,
    pub connect_by: Option<Condition>,
    pub nocycle: bool,
    /// The same part was given twice
    pub repeated: bool,
}

/// One `[...]` lifted from an assignment target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptMark {
    /// Number of name parts before the subscript
    pub position: usize,
    pub lower: Option<Condition>,
    pub upper: Option<Condition>,
    pub is_slice: bool,
}

/// Offsets recorded by the pre-pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanMarks {
    /// Lifted clauses, keyed by the offset of the SELECT keyword they belong to
    pub clauses: BTreeMap<usize, HierarchyClause>,
    /// Start of the operand of each `PRIOR`
    pub prior: BTreeSet<usize>,
    /// Start of the first sort expression after `ORDER SIBLINGS BY`
    pub siblings: BTreeSet<usize>,
    /// Subscripts of UPDATE SET targets, keyed by the offset of the target
    pub subscripts: BTreeMap<usize, Vec<SubscriptMark>>,
}

impl ScanMarks {
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
            && self.prior.is_empty()
            && self.siblings.is_empty()
            && self.subscripts.is_empty()
    }
}

/// Keywords that end a hierarchical condition at its own nesting level
const CLAUSE_END: &[&str] = &[
    "group", "having", "order", "window", "union", "intersect", "except", "minus", "limit",
    "offset", "fetch", "for", "returning",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Word,
    Open,
    Close,
    Semicolon,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct Token {
    kind: Kind,
    start: usize,
    end: usize,
    /// Parentheses enclosing the token
    depth: usize,
}

/// Split `sql` into tokens, skipping whitespace and comments. A string
/// literal is a single `Other` token, a quoted identifier a single `Word`.
fn tokens(sql: &str) -> Vec<Token> {
    let bytes = sql.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut depth = 0;
    let mut i = 0;
    while i < len {
        let start = i;
        let kind = match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < len {
                    if bytes[i] == quote {
                        i += 1;
                        if i < len && bytes[i] == quote {
                            i += 1;
                        } else {
                            break;
                        }
                    } else {
                        i += 1;
                    }
                }
                if quote == b'"' {
                    Kind::Word
                } else {
                    Kind::Other
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < len && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < len && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(len);
                continue;
            }
            b if b.is_ascii_whitespace() => {
                i += 1;
                continue;
            }
            b if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 => {
                while i < len
                    && (bytes[i].is_ascii_alphanumeric()
                        || bytes[i] == b'_'
                        || bytes[i] == b'$'
                        || bytes[i] >= 0x80)
                {
                    i += 1;
                }
                Kind::Word
            }
            b'(' => {
                i += 1;
                depth += 1;
                out.push(Token {
                    kind: Kind::Open,
                    start,
                    end: i,
                    depth: depth - 1,
                });
                continue;
            }
            b')' => {
                i += 1;
                depth = depth.saturating_sub(1);
                Kind::Close
            }
            b';' => {
                i += 1;
                Kind::Semicolon
            }
            _ => {
                i += 1;
                Kind::Other
            }
        };
        out.push(Token {
            kind,
            start,
            end: i,
            depth,
        });
    }
    out
}

/// Offset of the next non-blank, non-comment byte at or after `from`
fn next_token_start(sql: &str, from: usize) -> usize {
    let bytes = sql.as_bytes();
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b if b.is_ascii_whitespace() => i += 1,
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    i += 1;
                }
                i = (i + 2).min(bytes.len());
            }
            _ => break,
        }
    }
    i
}

/// `sql` with every byte for which `keep` is false turned into a space.
/// Line breaks always stay so positions after them do not move.
fn mask(sql: &str, keep: impl Fn(usize) -> bool) -> String {
    let bytes: Vec<u8> = sql
        .bytes()
        .enumerate()
        .map(|(i, b)| if keep(i) || b == b'\n' || b == b'\r' { b } else { b' ' })
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

struct Scanner<'a> {
    sql: &'a str,
    tokens: Vec<Token>,
}

impl Scanner<'_> {
    fn is(&self, i: usize, keyword: &str) -> bool {
        self.tokens
            .get(i)
            .is_some_and(|t| t.kind == Kind::Word && self.sql[t.start..t.end].eq_ignore_ascii_case(keyword))
    }

    /// Token `i` is the single punctuation byte `ch`
    fn punct(&self, i: usize, ch: u8) -> bool {
        self.tokens
            .get(i)
            .is_some_and(|t| t.kind == Kind::Other && t.end == t.start + 1 && self.sql.as_bytes()[t.start] == ch)
    }

    /// Index of the `]` closing the `[` at token `open`
    fn bracket_close(&self, open: usize) -> Option<usize> {
        let mut nesting = 0usize;
        for j in open..self.tokens.len() {
            if self.punct(j, b'[') {
                nesting += 1;
            } else if self.punct(j, b']') {
                nesting -= 1;
                if nesting == 0 {
                    return Some(j);
                }
            }
        }
        None
    }

    /// Byte range covered by tokens `from..to`, empty when there are none
    fn span(&self, from: usize, to: usize) -> Option<Range<usize>> {
        (to > from).then(|| self.tokens[from].start..self.tokens[to - 1].end)
    }

    fn isolate(&self, range: Option<Range<usize>>) -> Option<Condition> {
        range.map(|range| Condition {
            text: mask(self.sql, |b| range.contains(&b)),
            range,
        })
    }

    /// The subscript between tokens `open` and `close`
    fn subscript(&self, open: usize, close: usize, position: usize) -> SubscriptMark {
        let depth = self.tokens[open].depth;
        let mut nesting = 0usize;
        let mut colon = None;
        for j in open + 1..close {
            if self.punct(j, b'[') {
                nesting += 1;
            } else if self.punct(j, b']') {
                nesting = nesting.saturating_sub(1);
            } else if nesting == 0
                && self.tokens[j].depth == depth
                && self.punct(j, b':')
                && !self.punct(j - 1, b':')
                && !self.punct(j + 1, b':')
            {
                colon = Some(j);
                break;
            }
        }
        match colon {
            Some(colon) => SubscriptMark {
                position,
                lower: self.isolate(self.span(open + 1, colon)),
                upper: self.isolate(self.span(colon + 1, close)),
                is_slice: true,
            },
            None => SubscriptMark {
                position,
                lower: None,
                upper: self.isolate(self.span(open + 1, close)),
                is_slice: false,
            },
        }
    }

    /// Index of the token ending the assigned value that starts at `from`
    fn assignment_end(&self, from: usize, depth: usize) -> usize {
        let mut nesting = 0usize;
        let mut j = from;
        while let Some(t) = self.tokens.get(j) {
            if t.depth < depth {
                break;
            }
            if t.depth == depth {
                if self.punct(j, b'[') {
                    nesting += 1;
                } else if self.punct(j, b']') {
                    nesting = nesting.saturating_sub(1);
                } else if nesting == 0
                    && (self.punct(j, b',')
                        || t.kind == Kind::Semicolon
                        || ["where", "from", "returning"].iter().any(|kw| self.is(j, kw)))
                {
                    break;
                }
            }
            j += 1;
        }
        j
    }

    /// `START WITH` or `CONNECT BY` begins at token `i`
    fn opens_part(&self, i: usize) -> bool {
        (self.is(i, "start") && self.is(i + 1, "with")) || (self.is(i, "connect") && self.is(i + 1, "by"))
    }

    /// Index of the first token past a condition starting at `from`
    fn condition_end(&self, from: usize, depth: usize) -> usize {
        let mut j = from;
        while let Some(t) = self.tokens.get(j) {
            if t.depth < depth {
                break;
            }
            if t.depth == depth
                && (t.kind == Kind::Semicolon
                    || self.opens_part(j)
                    || CLAUSE_END.iter().any(|kw| self.is(j, kw)))
            {
                break;
            }
            j += 1;
        }
        j
    }
}

/// Lift the subscripts of UPDATE SET targets out of `sql`
pub fn strip_assignment_subscripts(sql: &str) -> (String, BTreeMap<usize, Vec<SubscriptMark>>) {
    let mut found = BTreeMap::new();
    if !sql.contains('[') {
        return (sql.to_string(), found);
    }
    let scan = Scanner {
        sql,
        tokens: tokens(sql),
    };
    let mut blank: Vec<Range<usize>> = Vec::new();

    let mut i = 0;
    while i < scan.tokens.len() {
        if !scan.is(i, "set") {
            i += 1;
            continue;
        }
        let depth = scan.tokens[i].depth;
        let mut j = i + 1;
        // col[.field|[sub]]... = value, ...
        while let Some(first) = scan.tokens.get(j).filter(|t| t.kind == Kind::Word) {
            let key = first.start;
            let mut parts = 1;
            let mut subscripts = Vec::new();
            j += 1;
            loop {
                if scan.punct(j, b'.') && scan.tokens.get(j + 1).is_some_and(|t| t.kind == Kind::Word) {
                    parts += 1;
                    j += 2;
                } else if scan.punct(j, b'[') {
                    let Some(close) = scan.bracket_close(j) else {
                        break;
                    };
                    subscripts.push(scan.subscript(j, close, parts));
                    blank.push(scan.tokens[j].start..scan.tokens[close].end);
                    j = close + 1;
                } else {
                    break;
                }
            }
            if !subscripts.is_empty() {
                found.insert(key, subscripts);
            }
            j = scan.assignment_end(j, depth);
            if !scan.punct(j, b',') {
                break;
            }
            j += 1;
        }
        i = j.max(i + 1);
    }

    if blank.is_empty() {
        return (sql.to_string(), found);
    }
    let text = mask(sql, |b| !blank.iter().any(|r| r.contains(&b)));
    (text, found)
}

/// Lift hierarchical clauses out of `sql` and blank `PRIOR` and `SIBLINGS`
pub fn strip_hierarchy_keywords(sql: &str) -> (String, ScanMarks) {
    let scan = Scanner {
        sql,
        tokens: tokens(sql),
    };
    let mut marks = ScanMarks::default();
    let mut blank: Vec<Range<usize>> = Vec::new();
    // last SELECT keyword seen at each nesting depth
    let mut selects: Vec<Option<usize>> = Vec::new();

    let mut i = 0;
    while let Some(&tok) = scan.tokens.get(i) {
        if selects.len() <= tok.depth {
            selects.resize(tok.depth + 1, None);
        }
        if scan.is(i, "select") {
            selects[tok.depth] = Some(tok.start);
        } else if scan.is(i, "siblings") && i > 0 && scan.is(i - 1, "order") && scan.is(i + 1, "by") {
            blank.push(tok.start..tok.end);
            let by = scan.tokens[i + 1];
            marks.siblings.insert(next_token_start(sql, by.end));
        } else if scan.opens_part(i) {
            if let Some(select) = selects[tok.depth] {
                let connect = scan.is(i, "connect");
                let mut from = i + 2;
                let nocycle = connect && scan.is(from, "nocycle");
                if nocycle {
                    from += 1;
                }
                let end = scan.condition_end(from, tok.depth);
                let range = match (scan.tokens.get(from), end > from) {
                    (Some(first), true) => first.start..scan.tokens[end - 1].end,
                    _ => tok.start..tok.start,
                };

                let mut holes = Vec::new();
                for k in from..end {
                    if scan.is(k, "prior") {
                        let prior = scan.tokens[k];
                        holes.push(prior.start..prior.end);
                        marks.prior.insert(next_token_start(sql, prior.end));
                    }
                }
                let condition = Condition {
                    text: mask(sql, |b| range.contains(&b) && !holes.iter().any(|h| h.contains(&b))),
                    range: range.clone(),
                };

                let clause = marks.clauses.entry(select).or_default();
                let part = if connect {
                    &mut clause.connect_by
                } else {
                    &mut clause.start_with
                };
                clause.repeated |= part.is_some();
                *part = Some(condition);
                clause.nocycle |= nocycle;

                let clause_end = if end > from { range.end } else { scan.tokens[from - 1].end };
                blank.push(tok.start..clause_end);
                i = end;
                continue;
            }
        }
        i += 1;
    }

    if blank.is_empty() {
        return (sql.to_string(), marks);
    }
    let text = mask(sql, |b| !blank.iter().any(|r| r.contains(&b)));
    (text, marks)
}

/// Byte offsets of line starts, for turning line/column positions into offsets
#[derive(Debug, Clone)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(sql: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(sql.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    /// Byte offset of a 1-based line and 1-based character column
    pub fn offset(&self, sql: &str, line: usize, column: usize) -> Option<usize> {
        let start = *self.starts.get(line.checked_sub(1)?)?;
        let rest = &sql[start..];
        let col = column.checked_sub(1)?;
        match rest.char_indices().nth(col) {
            Some((i, _)) => Some(start + i),
            None => Some(sql.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn condition(c: &Option<Condition>) -> &str {
        c.as_ref().map_or("", |c| c.text.trim())
    }

    #[test]
    fn test_clause_is_lifted_without_moving_offsets() {
        let sql = "SELECT * FROM t START WITH id = 1 CONNECT BY NOCYCLE PRIOR id = pid";
        let (out, marks) = strip_hierarchy_keywords(sql);
        assert_eq!(out.len(), sql.len());
        assert_eq!(out.trim_end(), "SELECT * FROM t");

        let clause = &marks.clauses[&0];
        assert!(clause.nocycle);
        assert!(!clause.repeated);
        assert_eq!(condition(&clause.start_with), "id = 1");
        assert_eq!(condition(&clause.connect_by), "id = pid");
        let connect_by = clause.connect_by.as_ref().unwrap();
        assert_eq!(connect_by.text.len(), sql.len());
        assert_eq!(&sql[connect_by.range.clone()], "PRIOR id = pid");
        assert_eq!(marks.prior.iter().copied().collect::<Vec<_>>(), vec![sql.find("id = pid").unwrap()]);
    }

    #[test]
    fn test_clauses_in_any_order_and_without_start_with() {
        let sql = "SELECT dept, count(*) FROM t CONNECT BY PRIOR id = pid START WITH pid IS NULL GROUP BY dept";
        let (out, marks) = strip_hierarchy_keywords(sql);
        assert!(out.starts_with("SELECT dept, count(*) FROM t "));
        assert!(out.ends_with(" GROUP BY dept"));
        let clause = &marks.clauses[&0];
        assert_eq!(condition(&clause.connect_by), "id = pid");
        assert_eq!(condition(&clause.start_with), "pid IS NULL");

        let sql = "SELECT id FROM t CONNECT BY PRIOR id = pid ORDER BY id";
        let (out, marks) = strip_hierarchy_keywords(sql);
        assert!(out.ends_with(" ORDER BY id"));
        assert_eq!(marks.clauses[&0].start_with, None);
    }

    #[test]
    fn test_prior_in_start_with_is_marked() {
        let sql = "SELECT * FROM t START WITH PRIOR id = 1 CONNECT BY PRIOR id = pid";
        let (_, marks) = strip_hierarchy_keywords(sql);
        assert_eq!(condition(&marks.clauses[&0].start_with), "id = 1");
        assert!(marks.prior.contains(&sql.find("id = 1").unwrap()));
    }

    #[test]
    fn test_clause_belongs_to_its_own_select() {
        let sql = "SELECT * FROM (SELECT id FROM t CONNECT BY PRIOR id = pid) s WHERE s.id > (1)";
        let (out, marks) = strip_hierarchy_keywords(sql);
        let inner = sql.find("SELECT id").unwrap();
        assert_eq!(marks.clauses.keys().copied().collect::<Vec<_>>(), vec![inner]);
        assert!(out.contains(") s WHERE s.id > (1)"));
        assert!(!out.contains("CONNECT"));
    }

    #[test]
    fn test_line_breaks_survive_blanking() {
        let sql = "SELECT id FROM t\nCONNECT BY PRIOR id\n  = pid\nORDER BY id";
        let (out, marks) = strip_hierarchy_keywords(sql);
        assert_eq!(out.lines().count(), 4);
        assert_eq!(out.lines().last(), Some("ORDER BY id"));
        let connect_by = marks.clauses[&0].connect_by.as_ref().unwrap();
        assert_eq!(connect_by.text.lines().nth(2), Some("  = pid"));
    }

    #[test]
    fn test_order_siblings_by() {
        let sql = "SELECT * FROM t CONNECT BY PRIOR id = pid ORDER SIBLINGS BY name";
        let (out, marks) = strip_hierarchy_keywords(sql);
        assert!(out.contains("ORDER          BY name"));
        assert_eq!(marks.siblings.into_iter().collect::<Vec<_>>(), vec![sql.find("name").unwrap()]);
    }

    #[test]
    fn test_keywords_inside_literals_are_left_alone() {
        let sql = "SELECT 'CONNECT BY NOCYCLE' FROM t";
        let (out, marks) = strip_hierarchy_keywords(sql);
        assert_eq!(out, sql);
        assert!(marks.is_empty());
    }

    #[test]
    fn test_assignment_subscripts_are_lifted() {
        let sql = "UPDATE t SET arr[1] = ARRAY[1, 2][1], p.xs[2:n] = '{}', name = 'a[1]' WHERE arr[1] > 0";
        let (out, found) = strip_assignment_subscripts(sql);
        assert_eq!(out.len(), sql.len());
        assert!(out.starts_with("UPDATE t SET arr    = ARRAY[1, 2][1], p.xs      = '{}', name = 'a[1]'"));
        assert!(out.ends_with("WHERE arr[1] > 0"));

        let arr = &found[&sql.find("arr").unwrap()];
        assert_eq!(arr.len(), 1);
        assert_eq!((arr[0].position, arr[0].is_slice), (1, false));
        assert_eq!(condition(&arr[0].upper), "1");
        assert_eq!(arr[0].lower, None);

        let p = &found[&sql.find("p.xs").unwrap()];
        assert_eq!((p[0].position, p[0].is_slice), (2, true));
        assert_eq!(condition(&p[0].lower), "2");
        assert_eq!(condition(&p[0].upper), "n");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_casts_in_subscripts_are_not_slices() {
        let sql = "UPDATE t SET arr[i::int] = 0";
        let (_, found) = strip_assignment_subscripts(sql);
        let marks = &found[&sql.find("arr").unwrap()];
        assert!(!marks[0].is_slice);
        assert_eq!(condition(&marks[0].upper), "i::int");
    }

    #[test]
    fn test_line_index() {
        let sql = "SELECT 1\nFROM t";
        let index = LineIndex::new(sql);
        assert_eq!(index.offset(sql, 2, 6), Some(14));
        assert_eq!(index.offset(sql, 1, 1), Some(0));
        assert_eq!(index.offset(sql, 3, 1), None);
    }
}
