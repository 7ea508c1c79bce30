//! Search filters
//!
//! Filters render to and parse from the usual parenthesised prefix form,
//! e.g. `(&(objectClass=dsGroupMember)(memberObject=cn=u1,ou=Members,dc=test))`.
//! Assertion values are escaped on rendering (`* ( ) \` and NUL as `\hh`).

use crate::adapter::Entry;
use crate::dn::Dn;
use crate::error::{DirectoryError, Result};
use std::fmt;
use std::str::FromStr;

/// A search filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// All sub-filters match
    And(Vec<Filter>),
    /// At least one sub-filter matches
    Or(Vec<Filter>),
    /// Sub-filter does not match
    Not(Box<Filter>),
    /// Attribute has a value equal to `value`
    Equals {
        /// Attribute name
        attr: String,
        /// Unescaped assertion value
        value: String,
    },
    /// Attribute has at least one value
    Present(String),
}

impl Filter {
    /// `(attr=value)`
    pub fn equals(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Filter::Equals {
            attr: attr.into(),
            value: value.into(),
        }
    }

    /// `(attr=*)`
    pub fn present(attr: impl Into<String>) -> Self {
        Filter::Present(attr.into())
    }

    /// Matches every entry: `(objectClass=*)`
    pub fn any() -> Self {
        Filter::present("objectClass")
    }

    /// `(objectClass=class)`
    pub fn object_class(class: impl Into<String>) -> Self {
        Filter::equals("objectClass", class)
    }

    /// Conjunction, collapsed when it has a single operand
    pub fn and(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Filter::And(filters)
    }

    /// Disjunction, collapsed when it has a single operand
    pub fn or(mut filters: Vec<Filter>) -> Self {
        if filters.len() == 1 {
            return filters.remove(0);
        }
        Filter::Or(filters)
    }

    /// Parse a filter string
    pub fn parse(s: &str) -> Result<Self> {
        let mut parser = Parser {
            src: s,
            pos: 0,
        };
        let filter = parser.filter()?;
        parser.skip_ws();
        if parser.pos != s.len() {
            return Err(parser.error("trailing characters"));
        }
        Ok(filter)
    }

    /// Evaluate against an entry
    ///
    /// Attribute names compare case-insensitively. `objectClass` values compare
    /// case-insensitively, path-valued attributes compare as paths, anything
    /// else compares exactly.
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Filter::Not(filter) => !filter.matches(entry),
            Filter::Present(attr) => !entry.values(attr).is_empty(),
            Filter::Equals { attr, value } => entry
                .values(attr)
                .iter()
                .any(|candidate| values_equal(attr, candidate, value)),
        }
    }
}

fn values_equal(attr: &str, candidate: &str, asserted: &str) -> bool {
    if attr.eq_ignore_ascii_case("objectClass") {
        return candidate.eq_ignore_ascii_case(asserted);
    }
    if candidate == asserted {
        return true;
    }
    match (Dn::parse(candidate), Dn::parse(asserted)) {
        (Ok(a), Ok(b)) if !a.is_empty() => a == b,
        _ => false,
    }
}

/// Escape an assertion value
pub fn escape_filter_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => out.push_str("\\2a"),
            '(' => out.push_str("\\28"),
            ')' => out.push_str("\\29"),
            '\\' => out.push_str("\\5c"),
            '\0' => out.push_str("\\00"),
            c => out.push(c),
        }
    }
    out
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::And(filters) => {
                f.write_str("(&")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Or(filters) => {
                f.write_str("(|")?;
                for filter in filters {
                    write!(f, "{}", filter)?;
                }
                f.write_str(")")
            }
            Filter::Not(filter) => write!(f, "(!{})", filter),
            Filter::Equals { attr, value } => {
                write!(f, "({}={})", attr, escape_filter_value(value))
            }
            Filter::Present(attr) => write!(f, "({}=*)", attr),
        }
    }
}

impl FromStr for Filter {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> DirectoryError {
        DirectoryError::configuration(format!(
            "Invalid filter '{}' at offset {}: {}",
            self.src, self.pos, reason
        ))
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_ws();
        match self.bump() {
            Some(c) if c == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", expected))),
        }
    }

    fn filter(&mut self) -> Result<Filter> {
        self.expect('(')?;
        self.skip_ws();
        let filter = match self.peek() {
            Some('&') => {
                self.bump();
                Filter::And(self.list()?)
            }
            Some('|') => {
                self.bump();
                Filter::Or(self.list()?)
            }
            Some('!') => {
                self.bump();
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(self.error("unexpected end")),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn list(&mut self) -> Result<Vec<Filter>> {
        let mut filters = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some('(') => filters.push(self.filter()?),
                _ => break,
            }
        }
        if filters.is_empty() {
            return Err(self.error("empty filter list"));
        }
        Ok(filters)
    }

    fn item(&mut self) -> Result<Filter> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c != '=' && c != ')' && c != '(') {
            self.bump();
        }
        let attr = self.src[start..self.pos].trim();
        if attr.is_empty() || !attr.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.') {
            return Err(self.error("invalid attribute name"));
        }
        if self.bump() != Some('=') {
            return Err(self.error("expected '='"));
        }

        let raw_start = self.pos;
        let mut value: Vec<u8> = Vec::new();
        let mut wildcard = false;
        loop {
            match self.peek() {
                None | Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('*') => {
                    wildcard = true;
                    self.bump();
                }
                Some('\\') => {
                    self.bump();
                    let hi = self.bump();
                    let lo = self.bump();
                    let byte = match (hi, lo) {
                        (Some(h), Some(l)) if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {
                            u8::from_str_radix(&format!("{}{}", h, l), 16)
                                .map_err(|_| self.error("invalid escape"))?
                        }
                        _ => return Err(self.error("invalid escape")),
                    };
                    value.push(byte);
                }
                Some(c) => {
                    let mut buf = [0u8; 4];
                    value.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                    self.bump();
                }
            }
        }

        if wildcard {
            if &self.src[raw_start..self.pos] == "*" {
                return Ok(Filter::Present(attr.to_string()));
            }
            return Err(self.error("substring filters are not supported"));
        }

        let value = String::from_utf8(value).map_err(|_| self.error("value is not UTF-8"))?;
        Ok(Filter::Equals {
            attr: attr.to_string(),
            value,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn entry(path: &str, attrs: &[(&str, &str)]) -> Entry {
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in attrs {
            attributes.entry(k.to_string()).or_default().push(v.to_string());
        }
        Entry::new(Dn::parse(path).unwrap(), attributes)
    }

    #[test]
    fn test_render_nested() {
        let filter = Filter::and(vec![
            Filter::object_class("dsGroupMember"),
            Filter::or(vec![
                Filter::equals("memberObject", "ou=g1,ou=Groups,dc=test"),
                Filter::equals("memberObject", "ou=g2,ou=Groups,dc=test"),
            ]),
        ]);
        assert_eq!(
            filter.to_string(),
            "(&(objectClass=dsGroupMember)(|(memberObject=ou=g1,ou=Groups,dc=test)(memberObject=ou=g2,ou=Groups,dc=test)))"
        );
    }

    #[test]
    fn test_single_operand_collapses() {
        let filter = Filter::or(vec![Filter::equals("cn", "x")]);
        assert_eq!(filter.to_string(), "(cn=x)");
    }

    #[test]
    fn test_value_escaping() {
        let filter = Filter::equals("cn", "a*(b)\\");
        assert_eq!(filter.to_string(), "(cn=a\\2a\\28b\\29\\5c)");
        assert_eq!(Filter::parse(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn test_parse() {
        assert_eq!(Filter::parse("(ou=*)").unwrap(), Filter::present("ou"));
        assert_eq!(
            Filter::parse("(&(objectClass=inetOrgPerson)(uid=tester))").unwrap(),
            Filter::And(vec![
                Filter::object_class("inetOrgPerson"),
                Filter::equals("uid", "tester"),
            ])
        );
        assert_eq!(
            Filter::parse("(!(cn=x))").unwrap(),
            Filter::Not(Box::new(Filter::equals("cn", "x")))
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Filter::parse("").is_err());
        assert!(Filter::parse("(cn=x").is_err());
        assert!(Filter::parse("(cn=a*b)").is_err());
        assert!(Filter::parse("(&)").is_err());
        assert!(Filter::parse("(cn=x))").is_err());
        assert!(Filter::parse("(=x)").is_err());
    }

    #[test]
    fn test_matches() {
        let e = entry(
            "cn=u1,ou=Admin,ou=Roles,ou=A1,ou=Archives,dc=test",
            &[
                ("objectClass", "dsGroupMember"),
                ("cn", "u1"),
                ("memberObject", "cn=u1,ou=Members,dc=test"),
            ],
        );

        assert!(Filter::any().matches(&e));
        assert!(Filter::object_class("DSGROUPMEMBER").matches(&e));
        assert!(Filter::equals("MemberObject", "cn=u1, ou=Members, dc=test").matches(&e));
        assert!(!Filter::equals("memberObject", "cn=u2,ou=Members,dc=test").matches(&e));
        assert!(!Filter::present("description").matches(&e));
        assert!(Filter::Not(Box::new(Filter::present("description"))).matches(&e));
    }
}
