//! Distinguished names (directory paths)
//!
//! A path is a comma-separated sequence of `attr=value` components, most
//! specific first:
//!
//! ```text
//! cn=u1,ou=Admin,ou=Roles,ou=A1,ou=Archives,dc=test
//! ```
//!
//! Values are held unescaped. Rendering escapes the directory-reserved
//! characters, parsing reverses it, so `Dn::parse(&dn.to_string()) == dn`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while parsing a path
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    /// Component has no `=` separator
    #[error("component '{0}' is missing '='")]
    MissingEquals(String),

    /// Component has an empty or malformed attribute type
    #[error("invalid attribute type '{0}'")]
    InvalidAttribute(String),

    /// Component has an empty value
    #[error("component '{0}' has an empty value")]
    EmptyValue(String),

    /// Backslash escape that is neither a special character nor two hex digits
    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),

    /// Multi-valued components (`a=1+b=2`) are not supported
    #[error("multi-valued component '{0}' is not supported")]
    MultiValued(String),

    /// Empty component between separators
    #[error("empty component in '{0}'")]
    EmptyComponent(String),
}

/// Characters that must be escaped anywhere in a value
const SPECIAL: &[char] = &[',', '+', '"', '\\', '<', '>', ';', '='];

/// Escape a raw value for use as a path component value
///
/// Escapes `, + " \ < > ; =`, a leading space or `#`, a trailing space and NUL.
pub fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let last = value.chars().count().saturating_sub(1);

    for (idx, ch) in value.chars().enumerate() {
        match ch {
            '\0' => out.push_str("\\00"),
            c if SPECIAL.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            ' ' if idx == 0 || idx == last => out.push_str("\\ "),
            '#' if idx == 0 => out.push_str("\\#"),
            c => out.push(c),
        }
    }

    out
}

/// One path component (relative distinguished name)
#[derive(Debug, Clone)]
pub struct Rdn {
    attr: String,
    value: String,
}

impl Rdn {
    /// Create a component from an attribute type and an unescaped value
    pub fn new(attr: impl Into<String>, value: impl Into<String>) -> Result<Self, DnError> {
        let attr = attr.into();
        let value = value.into();
        validate_attribute(&attr)?;
        if value.is_empty() {
            return Err(DnError::EmptyValue(format!("{}=", attr)));
        }
        Ok(Self { attr, value })
    }

    /// Attribute type (`ou`, `cn`, ...)
    pub fn attr(&self) -> &str {
        &self.attr
    }

    /// Unescaped value
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the attribute type matches, ignoring case
    pub fn has_attr(&self, attr: &str) -> bool {
        self.attr.eq_ignore_ascii_case(attr)
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.attr.eq_ignore_ascii_case(&other.attr) && self.value == other.value
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.attr.to_ascii_lowercase().hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attr, escape_value(&self.value))
    }
}

/// A full path in the directory tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The empty path (root of the tree)
    pub fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    /// Build a path from components, most specific first
    pub fn from_rdns(rdns: Vec<Rdn>) -> Self {
        Self { rdns }
    }

    /// Parse a path string
    pub fn parse(s: &str) -> Result<Self, DnError> {
        if s.trim().is_empty() {
            return Ok(Self::root());
        }

        let mut rdns = Vec::new();
        for raw in split_components(s)? {
            rdns.push(parse_component(raw)?);
        }

        Ok(Self { rdns })
    }

    /// Components, most specific first
    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Number of components
    pub fn len(&self) -> usize {
        self.rdns.len()
    }

    /// Whether this is the root path
    pub fn is_empty(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Most specific component
    pub fn leaf(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    /// Value of the most specific component (the entry's short name)
    pub fn simple_name(&self) -> Option<&str> {
        self.leaf().map(Rdn::value)
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            return None;
        }
        Some(Self {
            rdns: self.rdns[1..].to_vec(),
        })
    }

    /// Path of a direct child of this path
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// Whether this path lies strictly below `ancestor`
    pub fn is_descendant_of(&self, ancestor: &Dn) -> bool {
        self.rdns.len() > ancestor.rdns.len() && self.ends_with(ancestor)
    }

    /// Whether this path is a direct child of `parent`
    pub fn is_child_of(&self, parent: &Dn) -> bool {
        self.rdns.len() == parent.rdns.len() + 1 && self.ends_with(parent)
    }

    fn ends_with(&self, suffix: &Dn) -> bool {
        let offset = match self.rdns.len().checked_sub(suffix.rdns.len()) {
            Some(offset) => offset,
            None => return false,
        };
        self.rdns[offset..] == suffix.rdns[..]
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = DnError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Dn> for String {
    fn from(dn: Dn) -> Self {
        dn.to_string()
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, rdn) in self.rdns.iter().enumerate() {
            if idx > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

fn validate_attribute(attr: &str) -> Result<(), DnError> {
    let valid = !attr.is_empty()
        && attr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(DnError::InvalidAttribute(attr.to_string()))
    }
}

/// Split on unescaped commas, keeping escapes intact for the component parser
pub(crate) fn split_components(s: &str) -> Result<Vec<&str>, DnError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (idx, ch) in s.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            ',' => {
                parts.push(&s[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if escaped {
        return Err(DnError::InvalidEscape(s.to_string()));
    }
    parts.push(&s[start..]);

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(DnError::EmptyComponent(s.to_string()));
    }
    Ok(parts)
}

fn parse_component(raw: &str) -> Result<Rdn, DnError> {
    let (attr, value) = raw
        .split_once('=')
        .ok_or_else(|| DnError::MissingEquals(raw.trim().to_string()))?;

    let attr = attr.trim();
    validate_attribute(attr)?;

    let value = unescape_value(value, raw)?;
    if value.is_empty() {
        return Err(DnError::EmptyValue(raw.trim().to_string()));
    }
    Ok(Rdn {
        attr: attr.to_string(),
        value,
    })
}

/// Unescape a component value, dropping unescaped leading/trailing spaces
fn unescape_value(raw_value: &str, component: &str) -> Result<String, DnError> {
    let mut bytes: Vec<u8> = Vec::with_capacity(raw_value.len());
    // Length up to the last byte that must be kept (non-space or escaped)
    let mut keep = 0;
    let mut chars = raw_value.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let next = chars
                    .next()
                    .ok_or_else(|| DnError::InvalidEscape(component.to_string()))?;
                if next.is_ascii_hexdigit() {
                    let low = chars
                        .next()
                        .filter(char::is_ascii_hexdigit)
                        .ok_or_else(|| DnError::InvalidEscape(component.to_string()))?;
                    let byte = u8::from_str_radix(&format!("{}{}", next, low), 16)
                        .map_err(|_| DnError::InvalidEscape(component.to_string()))?;
                    bytes.push(byte);
                } else if SPECIAL.contains(&next) || next == ' ' || next == '#' {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
                } else {
                    return Err(DnError::InvalidEscape(component.to_string()));
                }
                keep = bytes.len();
            }
            '+' => return Err(DnError::MultiValued(component.trim().to_string())),
            ' ' if bytes.is_empty() => {}
            c => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                if c != ' ' {
                    keep = bytes.len();
                }
            }
        }
    }

    bytes.truncate(keep);
    String::from_utf8(bytes).map_err(|_| DnError::InvalidEscape(component.to_string()))
}
