//! Path templates
//!
//! A template is a path with positional `%s` placeholders, e.g.
//! `cn=%s,ou=%s,ou=Roles,ou=%s,ou=Archives,dc=test`. Composition escapes each
//! argument before substituting it, so caller input can never add or split
//! path components. `%%` stands for a literal percent sign.
//!
//! Every placeholder fills one whole component value, which lets a template
//! double as a layout: [`PathTemplate::extract`] recovers the arguments from a
//! path that has the template's shape and rejects any path that does not.

use crate::dn::{escape_value, split_components, Dn, Rdn};
use crate::error::{DirectoryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One component position in a template
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slot {
    /// Fixed component, must match exactly
    Literal(Rdn),
    /// Component whose value is the argument at `index`
    Placeholder { attr: String, index: usize },
}

/// Token produced while scanning template text
enum Token<'a> {
    Text(&'a str),
    Percent,
    Placeholder,
}

/// A parsed path template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathTemplate {
    raw: String,
    placeholders: usize,
    layout: Vec<Slot>,
}

impl PathTemplate {
    /// Parse a template
    ///
    /// # Errors
    ///
    /// Returns a configuration error for stray `%` sequences, placeholders that
    /// do not fill an entire component value, and malformed literal components.
    pub fn new(raw: &str) -> Result<Self> {
        let placeholders = tokenize(raw)?
            .iter()
            .filter(|t| matches!(t, Token::Placeholder))
            .count();

        let components = split_components(raw)
            .map_err(|e| DirectoryError::configuration(format!("Invalid template '{}': {}", raw, e)))?;

        let mut layout = Vec::with_capacity(components.len());
        let mut index = 0;
        for component in components {
            let (attr, value) = component.split_once('=').ok_or_else(|| {
                DirectoryError::configuration(format!(
                    "Invalid template '{}': component '{}' is missing '='",
                    raw,
                    component.trim()
                ))
            })?;

            let value = value.trim();
            if value == "%s" {
                let attr = attr.trim();
                Rdn::new(attr, "%s").map_err(|e| {
                    DirectoryError::configuration(format!("Invalid template '{}': {}", raw, e))
                })?;
                layout.push(Slot::Placeholder {
                    attr: attr.to_string(),
                    index,
                });
                index += 1;
                continue;
            }

            if tokenize(value)?.iter().any(|t| matches!(t, Token::Placeholder)) {
                return Err(DirectoryError::configuration(format!(
                    "Invalid template '{}': placeholder must be the entire value of '{}'",
                    raw,
                    component.trim()
                )));
            }

            let literal = Dn::parse(&unescape_percent(component)).map_err(|e| {
                DirectoryError::configuration(format!("Invalid template '{}': {}", raw, e))
            })?;
            layout.extend(literal.rdns().iter().cloned().map(Slot::Literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            placeholders,
            layout,
        })
    }

    /// Number of arguments `compose` expects
    pub fn placeholder_count(&self) -> usize {
        self.placeholders
    }

    /// Template text as configured
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Substitute `args` positionally and parse the result into a path
    ///
    /// # Errors
    ///
    /// Configuration error when the argument count does not match the
    /// placeholder count or the composed path is malformed (e.g. an empty
    /// argument).
    pub fn compose(&self, args: &[&str]) -> Result<Dn> {
        if args.len() != self.placeholders {
            return Err(DirectoryError::configuration(format!(
                "Template '{}' expects {} argument(s), got {}",
                self.raw,
                self.placeholders,
                args.len()
            )));
        }

        let mut composed = String::with_capacity(self.raw.len() + 16);
        let mut next = args.iter();
        for token in tokenize(&self.raw)? {
            match token {
                Token::Text(text) => composed.push_str(text),
                Token::Percent => composed.push('%'),
                Token::Placeholder => {
                    // Count was checked above
                    if let Some(arg) = next.next() {
                        composed.push_str(&escape_value(arg));
                    }
                }
            }
        }

        Dn::parse(&composed).map_err(|e| {
            DirectoryError::configuration(format!(
                "Template '{}' composed an invalid path '{}': {}",
                self.raw, composed, e
            ))
        })
    }

    /// Recover the arguments from a path with this template's shape
    ///
    /// Returns `None` when the component count differs, a literal component
    /// does not match, or a placeholder position carries another attribute type.
    pub fn extract(&self, path: &Dn) -> Option<Vec<String>> {
        if path.len() != self.layout.len() {
            return None;
        }

        let mut values = vec![String::new(); self.placeholders];
        for (slot, rdn) in self.layout.iter().zip(path.rdns()) {
            match slot {
                Slot::Literal(expected) if expected == rdn => {}
                Slot::Literal(_) => return None,
                Slot::Placeholder { attr, index } if rdn.has_attr(attr) => {
                    values[*index] = rdn.value().to_string();
                }
                Slot::Placeholder { .. } => return None,
            }
        }

        Some(values)
    }

    /// Whether `path` has this template's shape
    pub fn matches(&self, path: &Dn) -> bool {
        self.extract(path).is_some()
    }
}

fn tokenize(raw: &str) -> Result<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut chars = raw.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if ch != '%' {
            continue;
        }
        if start < idx {
            tokens.push(Token::Text(&raw[start..idx]));
        }
        match chars.next() {
            Some((_, 's')) => tokens.push(Token::Placeholder),
            Some((_, '%')) => tokens.push(Token::Percent),
            Some((_, other)) => {
                return Err(DirectoryError::configuration(format!(
                    "Invalid template '{}': unsupported placeholder '%{}'",
                    raw, other
                )))
            }
            None => {
                return Err(DirectoryError::configuration(format!(
                    "Invalid template '{}': dangling '%'",
                    raw
                )))
            }
        }
        start = chars.peek().map(|(i, _)| *i).unwrap_or(raw.len());
    }
    if start < raw.len() {
        tokens.push(Token::Text(&raw[start..]));
    }

    Ok(tokens)
}

fn unescape_percent(s: &str) -> String {
    s.replace("%%", "%")
}

impl FromStr for PathTemplate {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for PathTemplate {
    type Error = DirectoryError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<PathTemplate> for String {
    fn from(template: PathTemplate) -> Self {
        template.raw
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
