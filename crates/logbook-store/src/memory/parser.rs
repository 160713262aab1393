//! Lexer and parser for the CQL subset the access layer emits.

use crate::query::Op;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    /// Unquoted identifiers and keywords are folded to lower case.
    Ident(String),
    Number(i64),
    Str(String),
    Marker,
    Sym(&'static str),
}

fn lex(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '?' => {
                tokens.push(Token::Marker);
                i += 1;
            }
            '(' | ')' | ',' | '=' | '+' | '*' | ';' => {
                tokens.push(Token::Sym(match c {
                    '(' => "(",
                    ')' => ")",
                    ',' => ",",
                    '=' => "=",
                    '+' => "+",
                    '*' => "*",
                    _ => ";",
                }));
                i += 1;
            }
            '<' | '>' => {
                let with_eq = chars.get(i + 1) == Some(&'=');
                tokens.push(Token::Sym(match (c, with_eq) {
                    ('<', true) => "<=",
                    ('<', false) => "<",
                    ('>', true) => ">=",
                    _ => ">",
                }));
                i += if with_eq { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(format!("unterminated {quote} literal")),
                        Some(&ch) if ch == quote => {
                            if chars.get(i + 1) == Some(&quote) {
                                text.push(quote);
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(&ch) => {
                            text.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(if quote == '"' {
                    Token::Ident(text)
                } else {
                    Token::Str(text)
                });
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let n = literal
                    .parse()
                    .map_err(|_| format!("bad integer literal {literal}"))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(word.to_ascii_lowercase()));
            }
            other => return Err(format!("unexpected character {other:?}")),
        }
    }
    Ok(tokens)
}

/// A value position after parsing. Bind markers carry their position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Bind(usize),
    Int(i64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Predicate {
    pub column: String,
    pub op: Op,
    pub value: Term,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Insert {
        table: String,
        columns: Vec<String>,
        values: Vec<Term>,
        ttl: Option<Term>,
    },
    /// Only `SET c = c + term` assignments are understood.
    Update {
        table: String,
        increments: Vec<(String, Term)>,
        predicates: Vec<Predicate>,
    },
    Select {
        table: String,
        columns: Vec<String>,
        predicates: Vec<Predicate>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Parsed {
    pub statement: Statement,
    pub markers: usize,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    markers: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn keyword(&mut self, kw: &str) -> Result<(), String> {
        match self.next() {
            Some(Token::Ident(word)) if word == kw => Ok(()),
            other => Err(format!("expected {}, found {}", kw.to_uppercase(), describe(&other))),
        }
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == kw)
    }

    fn sym(&mut self, sym: &str) -> Result<(), String> {
        match self.next() {
            Some(Token::Sym(s)) if s == sym => Ok(()),
            other => Err(format!("expected `{sym}`, found {}", describe(&other))),
        }
    }

    fn at_sym(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Token::Sym(s)) if *s == sym)
    }

    fn ident(&mut self) -> Result<String, String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(format!("expected identifier, found {}", describe(&other))),
        }
    }

    fn term(&mut self) -> Result<Term, String> {
        match self.next() {
            Some(Token::Marker) => {
                self.markers += 1;
                Ok(Term::Bind(self.markers - 1))
            }
            Some(Token::Number(n)) => Ok(Term::Int(n)),
            Some(Token::Str(s)) => Ok(Term::Text(s)),
            other => Err(format!("expected value, found {}", describe(&other))),
        }
    }

    fn ident_list(&mut self) -> Result<Vec<String>, String> {
        let mut names = vec![self.ident()?];
        while self.at_sym(",") {
            self.pos += 1;
            names.push(self.ident()?);
        }
        Ok(names)
    }

    fn op(&mut self) -> Result<Op, String> {
        match self.next() {
            Some(Token::Sym("=")) => Ok(Op::Eq),
            Some(Token::Sym("<")) => Ok(Op::Lt),
            Some(Token::Sym("<=")) => Ok(Op::Lte),
            Some(Token::Sym(">")) => Ok(Op::Gt),
            Some(Token::Sym(">=")) => Ok(Op::Gte),
            other => Err(format!("expected comparison, found {}", describe(&other))),
        }
    }

    fn predicates(&mut self) -> Result<Vec<Predicate>, String> {
        let mut predicates = Vec::new();
        if !self.at_keyword("where") {
            return Ok(predicates);
        }
        self.pos += 1;
        loop {
            let column = self.ident()?;
            let op = self.op()?;
            let value = self.term()?;
            predicates.push(Predicate { column, op, value });
            if !self.at_keyword("and") {
                return Ok(predicates);
            }
            self.pos += 1;
        }
    }

    fn insert(&mut self) -> Result<Statement, String> {
        self.keyword("into")?;
        let table = self.ident()?;
        self.sym("(")?;
        let columns = self.ident_list()?;
        self.sym(")")?;
        self.keyword("values")?;
        self.sym("(")?;
        let mut values = vec![self.term()?];
        while self.at_sym(",") {
            self.pos += 1;
            values.push(self.term()?);
        }
        self.sym(")")?;
        if columns.len() != values.len() {
            return Err(format!(
                "{} columns but {} values",
                columns.len(),
                values.len()
            ));
        }
        let ttl = if self.at_keyword("using") {
            self.pos += 1;
            self.keyword("ttl")?;
            Some(self.term()?)
        } else {
            None
        };
        Ok(Statement::Insert {
            table,
            columns,
            values,
            ttl,
        })
    }

    fn update(&mut self) -> Result<Statement, String> {
        let table = self.ident()?;
        self.keyword("set")?;
        let mut increments = Vec::new();
        loop {
            let column = self.ident()?;
            self.sym("=")?;
            let base = self.ident()?;
            if base != column {
                return Err(format!("only `{column} = {column} + x` assignments are supported"));
            }
            self.sym("+")?;
            increments.push((column, self.term()?));
            if !self.at_sym(",") {
                break;
            }
            self.pos += 1;
        }
        let predicates = self.predicates()?;
        Ok(Statement::Update {
            table,
            increments,
            predicates,
        })
    }

    fn select(&mut self) -> Result<Statement, String> {
        if self.at_sym("*") {
            return Err("SELECT * is not supported; name the columns".into());
        }
        let columns = self.ident_list()?;
        self.keyword("from")?;
        let table = self.ident()?;
        let predicates = self.predicates()?;
        Ok(Statement::Select {
            table,
            columns,
            predicates,
        })
    }
}

fn describe(token: &Option<Token>) -> String {
    match token {
        None => "end of statement".into(),
        Some(Token::Ident(s)) => format!("`{s}`"),
        Some(Token::Number(n)) => n.to_string(),
        Some(Token::Str(s)) => format!("'{s}'"),
        Some(Token::Marker) => "`?`".into(),
        Some(Token::Sym(s)) => format!("`{s}`"),
    }
}

pub fn parse(cql: &str) -> Result<Parsed, String> {
    let mut parser = Parser {
        tokens: lex(cql)?,
        pos: 0,
        markers: 0,
    };
    let statement = match parser.next() {
        Some(Token::Ident(kw)) if kw == "insert" => parser.insert()?,
        Some(Token::Ident(kw)) if kw == "update" => parser.update()?,
        Some(Token::Ident(kw)) if kw == "select" => parser.select()?,
        other => return Err(format!("unsupported statement starting with {}", describe(&other))),
    };
    if parser.at_sym(";") {
        parser.pos += 1;
    }
    if let Some(extra) = parser.peek() {
        return Err(format!("trailing input at {}", describe(&Some(extra.clone()))));
    }
    Ok(Parsed {
        statement,
        markers: parser.markers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_insert_with_ttl() {
        let parsed =
            parse("INSERT INTO login (user, ts, area) VALUES (?, ?, 'index') USING TTL 60").unwrap();
        assert_eq!(parsed.markers, 2);
        assert_eq!(
            parsed.statement,
            Statement::Insert {
                table: "login".into(),
                columns: vec!["user".into(), "ts".into(), "area".into()],
                values: vec![Term::Bind(0), Term::Bind(1), Term::Text("index".into())],
                ttl: Some(Term::Int(60)),
            }
        );
    }

    #[test]
    fn folds_unquoted_names_and_keeps_quoted_ones() {
        let parsed = parse("update loginStats set count = count + ? where \"User\" = ?").unwrap();
        match parsed.statement {
            Statement::Update {
                table, predicates, ..
            } => {
                assert_eq!(table, "loginstats");
                assert_eq!(predicates[0].column, "User");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_range_select() {
        let parsed = parse("SELECT ts FROM login WHERE user = ? AND ts >= ? AND ts < ?;").unwrap();
        assert_eq!(parsed.markers, 3);
        match parsed.statement {
            Statement::Select { predicates, .. } => {
                let ops: Vec<_> = predicates.iter().map(|p| p.op).collect();
                assert_eq!(ops, vec![Op::Eq, Op::Gte, Op::Lt]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_plain_assignment() {
        let err = parse("UPDATE loginStats SET count = 5 WHERE user = ?").unwrap_err();
        assert!(err.contains("expected identifier"), "{err}");
    }

    #[test]
    fn rejects_mismatched_value_count() {
        assert!(parse("INSERT INTO login (user, ts) VALUES (?)").is_err());
    }

    #[test]
    fn rejects_trailing_input_and_garbage() {
        assert!(parse("SELECT ts FROM login LIMIT 1").is_err());
        assert!(parse("DROP TABLE login").is_err());
        assert!(parse("SELECT ts FROM login WHERE user = 'unterminated").is_err());
    }
}
