//! Filter-expression helpers.
//!
//! The index accepts OData-style filters. Only the subset the pipeline needs is produced here:
//! conjunctions of string equality clauses such as `Title eq 'Dev''s role' and Company eq 'X'`.
//! String literals are single-quoted with embedded quotes doubled.

use super::types::SearchError;

/// Escape a value for embedding in a single-quoted filter literal.
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Render `field eq 'value'` with the value escaped.
pub fn eq_clause(field: &str, value: &str) -> String {
    format!("{field} eq '{}'", escape_literal(value))
}

/// Join clauses with `and`.
pub fn and_all<I>(clauses: I) -> String
where
    I: IntoIterator<Item = String>,
{
    clauses.into_iter().collect::<Vec<_>>().join(" and ")
}

/// Parsed equality clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EqClause {
    /// Field name as written in the expression.
    pub field: String,
    /// Unescaped literal value.
    pub value: String,
}

/// Parse a conjunction of equality clauses produced by [`eq_clause`] and [`and_all`].
pub fn parse_filter(expression: &str) -> Result<Vec<EqClause>, SearchError> {
    let mut parser = Parser {
        chars: expression.chars().collect(),
        pos: 0,
    };
    let mut clauses = Vec::new();

    loop {
        parser.skip_whitespace();
        let field = parser.identifier()?;
        parser.skip_whitespace();
        parser.keyword("eq")?;
        parser.skip_whitespace();
        let value = parser.literal()?;
        clauses.push(EqClause { field, value });

        parser.skip_whitespace();
        if parser.at_end() {
            break;
        }
        parser.keyword("and")?;
    }

    Ok(clauses)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn identifier(&mut self) -> Result<String, SearchError> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected field name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn keyword(&mut self, keyword: &str) -> Result<(), SearchError> {
        let word = self.identifier()?;
        if word.eq_ignore_ascii_case(keyword) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{keyword}`, found `{word}`")))
        }
    }

    fn literal(&mut self) -> Result<String, SearchError> {
        if self.peek() != Some('\'') {
            return Err(self.error("expected quoted literal"));
        }
        self.pos += 1;

        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated literal")),
                Some('\'') => {
                    self.pos += 1;
                    if self.peek() == Some('\'') {
                        value.push('\'');
                        self.pos += 1;
                    } else {
                        return Ok(value);
                    }
                }
                Some(c) => {
                    value.push(c);
                    self.pos += 1;
                }
            }
        }
    }

    fn error(&self, message: &str) -> SearchError {
        SearchError::InvalidFilter(format!("{message} at position {}", self.pos))
    }
}
