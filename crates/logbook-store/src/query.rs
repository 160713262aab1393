//! Programmatic CQL construction.
//!
//! Builders render statement text from table and column names so that a
//! typo becomes a compile-time identifier rather than a malformed string.
//!
//! ```
//! use logbook_store::query::{bind_marker, eq, update};
//!
//! let cql = update("loginStats")
//!     .increment("count", 1i64)
//!     .where_(eq("user", bind_marker()))
//!     .and(eq("date", bind_marker()))
//!     .to_string();
//! assert_eq!(cql, "UPDATE loginStats SET count = count + 1 WHERE user = ? AND date = ?");
//! ```

use std::borrow::Cow;
use std::fmt;

/// A value position in a statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    /// A positional `?` marker, bound at execution time.
    BindMarker,
    Literal(i64),
}

pub fn bind_marker() -> Term {
    Term::BindMarker
}

impl From<i64> for Term {
    fn from(n: i64) -> Self {
        Term::Literal(n)
    }
}

impl From<i32> for Term {
    fn from(n: i32) -> Self {
        Term::Literal(i64::from(n))
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::BindMarker => f.write_str("?"),
            Term::Literal(n) => write!(f, "{n}"),
        }
    }
}

/// Render an identifier, quoting it unless it is a plain `[A-Za-z][A-Za-z0-9_]*` name.
pub fn ident(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Gt => ">",
            Op::Gte => ">=",
        }
    }
}

/// One `column op term` restriction of a WHERE clause.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Clause {
    column: String,
    op: Op,
    term: Term,
}

fn clause(column: &str, op: Op, term: impl Into<Term>) -> Clause {
    Clause {
        column: column.to_string(),
        op,
        term: term.into(),
    }
}

pub fn eq(column: &str, term: impl Into<Term>) -> Clause {
    clause(column, Op::Eq, term)
}

pub fn lt(column: &str, term: impl Into<Term>) -> Clause {
    clause(column, Op::Lt, term)
}

pub fn lte(column: &str, term: impl Into<Term>) -> Clause {
    clause(column, Op::Lte, term)
}

pub fn gt(column: &str, term: impl Into<Term>) -> Clause {
    clause(column, Op::Gt, term)
}

pub fn gte(column: &str, term: impl Into<Term>) -> Clause {
    clause(column, Op::Gte, term)
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", ident(&self.column), self.op.as_str(), self.term)
    }
}

fn write_where(f: &mut fmt::Formatter<'_>, clauses: &[Clause]) -> fmt::Result {
    for (i, c) in clauses.iter().enumerate() {
        f.write_str(if i == 0 { " WHERE " } else { " AND " })?;
        write!(f, "{c}")?;
    }
    Ok(())
}

// ── INSERT ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Insert {
    table: String,
    values: Vec<(String, Term)>,
    ttl: Option<Term>,
}

pub fn insert_into(table: &str) -> Insert {
    Insert {
        table: table.to_string(),
        values: Vec::new(),
        ttl: None,
    }
}

impl Insert {
    pub fn value(mut self, column: &str, term: impl Into<Term>) -> Self {
        self.values.push((column.to_string(), term.into()));
        self
    }

    pub fn using_ttl(mut self, seconds: impl Into<Term>) -> Self {
        self.ttl = Some(seconds.into());
        self
    }
}

impl fmt::Display for Insert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<_> = self.values.iter().map(|(c, _)| ident(c)).collect();
        let terms: Vec<_> = self.values.iter().map(|(_, t)| t.to_string()).collect();
        write!(
            f,
            "INSERT INTO {} ({}) VALUES ({})",
            ident(&self.table),
            columns.join(", "),
            terms.join(", ")
        )?;
        if let Some(ttl) = &self.ttl {
            write!(f, " USING TTL {ttl}")?;
        }
        Ok(())
    }
}

// ── UPDATE ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Update {
    table: String,
    increments: Vec<(String, Term)>,
    clauses: Vec<Clause>,
}

pub fn update(table: &str) -> Update {
    Update {
        table: table.to_string(),
        increments: Vec::new(),
        clauses: Vec::new(),
    }
}

impl Update {
    /// `column = column + term`, the only mutation a counter column accepts.
    pub fn increment(mut self, column: &str, by: impl Into<Term>) -> Self {
        self.increments.push((column.to_string(), by.into()));
        self
    }

    pub fn where_(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn and(self, clause: Clause) -> Self {
        self.where_(clause)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UPDATE {} SET ", ident(&self.table))?;
        for (i, (column, by)) in self.increments.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let column = ident(column);
            write!(f, "{column} = {column} + {by}")?;
        }
        write_where(f, &self.clauses)
    }
}

// ── SELECT ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct Select {
    columns: Vec<String>,
    table: String,
    clauses: Vec<Clause>,
}

/// Start a SELECT; finish it with [`SelectColumns::from`].
pub fn select(columns: &[&str]) -> SelectColumns {
    SelectColumns {
        columns: columns.iter().map(|c| (*c).to_string()).collect(),
    }
}

#[derive(Clone, Debug)]
pub struct SelectColumns {
    columns: Vec<String>,
}

impl SelectColumns {
    pub fn from(self, table: &str) -> Select {
        Select {
            columns: self.columns,
            table: table.to_string(),
            clauses: Vec::new(),
        }
    }
}

impl Select {
    pub fn where_(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn and(self, clause: Clause) -> Self {
        self.where_(clause)
    }
}

impl fmt::Display for Select {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns: Vec<_> = self.columns.iter().map(|c| ident(c)).collect();
        write!(f, "SELECT {} FROM {}", columns.join(", "), ident(&self.table))?;
        write_where(f, &self.clauses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_with_ttl() {
        let cql = insert_into("login")
            .value("user", bind_marker())
            .value("ts", bind_marker())
            .value("area", bind_marker())
            .using_ttl(2_592_000i64)
            .to_string();
        assert_eq!(cql, "INSERT INTO login (user, ts, area) VALUES (?, ?, ?) USING TTL 2592000");
    }

    #[test]
    fn update_increment_by_marker() {
        let cql = update("loginStats")
            .increment("count", bind_marker())
            .where_(eq("user", bind_marker()))
            .and(eq("date", bind_marker()))
            .to_string();
        assert_eq!(cql, "UPDATE loginStats SET count = count + ? WHERE user = ? AND date = ?");
    }

    #[test]
    fn select_range() {
        let cql = select(&["ts"])
            .from("login")
            .where_(eq("user", bind_marker()))
            .and(gte("ts", bind_marker()))
            .and(lt("ts", bind_marker()))
            .to_string();
        assert_eq!(cql, "SELECT ts FROM login WHERE user = ? AND ts >= ? AND ts < ?");
    }

    #[test]
    fn select_without_where() {
        assert_eq!(select(&["ts", "area"]).from("login").to_string(), "SELECT ts, area FROM login");
    }

    #[test]
    fn all_operators_render() {
        let cql = select(&["ts"])
            .from("login")
            .where_(gt("ts", 1i64))
            .and(lte("ts", 2i64))
            .to_string();
        assert_eq!(cql, "SELECT ts FROM login WHERE ts > 1 AND ts <= 2");
    }

    #[test]
    fn identifiers_are_quoted_when_needed() {
        assert_eq!(ident("loginStats"), "loginStats");
        assert_eq!(ident("area_2"), "area_2");
        assert_eq!(ident("2fast"), "\"2fast\"");
        assert_eq!(ident("user name"), "\"user name\"");
        assert_eq!(ident("evil\"; DROP"), "\"evil\"\"; DROP\"");
    }
}
