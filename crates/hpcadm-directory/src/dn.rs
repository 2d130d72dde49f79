//! Distinguished Name utilities.
//!
//! Parsing is intentionally strict so malformed DNs surface early, before
//! they are used as modification targets.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use hpcadm_core::Error as CoreError;

/// Errors that can occur when parsing distinguished names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component was not an `attribute=value` pair.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::DirectoryError(err.to_string())
    }
}

/// One `attribute=value` component of a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// The attribute name, as written in the DN.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// The unescaped attribute value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    fn matches(&self, other: &Self) -> bool {
        self.attribute.eq_ignore_ascii_case(&other.attribute)
            && self.value.eq_ignore_ascii_case(&other.value)
    }
}

/// Strongly-typed distinguished name wrapper.
///
/// Keeps a canonical string representation while providing access to the
/// individual `attribute=value` components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    raw: String,
    components: Vec<RelativeDistinguishedName>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the input is empty or a
    /// component is not an `attribute=value` pair.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let mut components = Vec::new();
        for part in split_escaped(raw)? {
            let (attribute, value) = part
                .split_once('=')
                .map(|(a, v)| (a.trim(), v.trim()))
                .ok_or_else(|| DistinguishedNameError::InvalidComponent(part.clone()))?;
            if attribute.is_empty() || value.is_empty() {
                return Err(DistinguishedNameError::InvalidComponent(part.clone()));
            }
            components.push(RelativeDistinguishedName {
                attribute: attribute.to_string(),
                value: unescape(value)?,
            });
        }

        Ok(Self {
            raw: raw.to_string(),
            components,
        })
    }

    /// Borrows the distinguished name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Looks up the value of the first component whose attribute matches
    /// (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components
            .iter()
            .find(|component| component.attribute.eq_ignore_ascii_case(attribute))
            .map(|component| component.value.as_str())
    }

    /// Returns true if the distinguished name contains a matching
    /// attribute/value pair (case-insensitive).
    #[must_use]
    pub fn contains(&self, attribute: &str, value: &str) -> bool {
        self.components.iter().any(|component| {
            component.attribute.eq_ignore_ascii_case(attribute)
                && component.value.eq_ignore_ascii_case(value)
        })
    }

    /// The leftmost (entry-specific) component value, e.g. the `uid` of a
    /// person entry.
    #[must_use]
    pub fn leaf_value(&self) -> Option<&str> {
        self.components
            .first()
            .map(|component| component.value.as_str())
    }

    /// The parsed components, leftmost first.
    #[must_use]
    pub fn components(&self) -> &[RelativeDistinguishedName] {
        &self.components
    }

    /// Compares two names component-wise, ignoring case and formatting
    /// differences (whitespace around separators, escaping).
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.components.len() == other.components.len()
            && self
                .components
                .iter()
                .zip(&other.components)
                .all(|(a, b)| a.matches(b))
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

fn split_escaped(input: &str) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push('\\');
            current.push(ch);
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            ',' => {
                parts.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }

    if escape {
        return Err(DistinguishedNameError::UnterminatedEscape);
    }

    parts.push(current.trim().to_string());
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn unescape(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut result = String::with_capacity(value.len());
    let mut chars = value.chars();

    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let next = chars
                .next()
                .ok_or(DistinguishedNameError::UnterminatedEscape)?;
            result.push(next);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_dn() {
        let dn =
            DistinguishedName::parse("uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu").unwrap();
        assert_eq!(dn.get("uid"), Some("jdoe"));
        assert_eq!(dn.get("ou"), Some("People"));
        assert!(dn.contains("dc", "cluster"));
        assert_eq!(dn.leaf_value(), Some("jdoe"));
        assert_eq!(
            dn.to_string(),
            "uid=jdoe,ou=People,dc=cluster,dc=example,dc=edu"
        );
    }

    #[test]
    fn parse_dn_with_escaped_comma() {
        let dn = DistinguishedName::parse("cn=Smith\\, John,ou=People,dc=example,dc=edu").unwrap();
        assert_eq!(dn.get("cn"), Some("Smith, John"));
    }

    #[test]
    fn attribute_lookup_is_case_insensitive() {
        let dn = DistinguishedName::parse("CN=hpcusers,ou=Groups,dc=example,dc=edu").unwrap();
        assert_eq!(dn.get("cn"), Some("hpcusers"));
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert!(matches!(
            DistinguishedName::parse("   "),
            Err(DistinguishedNameError::Empty)
        ));
        assert!(matches!(
            DistinguishedName::parse("uid=jdoe,"),
            Err(DistinguishedNameError::InvalidComponent(_))
        ));
        assert!(matches!(
            DistinguishedName::parse("nodelimiter"),
            Err(DistinguishedNameError::InvalidComponent(_))
        ));
    }

    #[test]
    fn matches_ignores_case_and_spacing() {
        let a = DistinguishedName::parse("uid=jdoe,ou=People,dc=example,dc=edu").unwrap();
        let b = DistinguishedName::parse("UID=JDoe, OU=people, DC=example, DC=edu").unwrap();
        assert!(a.matches(&b));

        let c = DistinguishedName::parse("uid=asmith,ou=People,dc=example,dc=edu").unwrap();
        assert!(!a.matches(&c));
    }

    #[test]
    fn matches_compares_unescaped_values() {
        let a = DistinguishedName::parse("cn=Smith\\, John,ou=People,dc=example,dc=edu").unwrap();
        let b = DistinguishedName::parse("CN=smith\\, john, ou=People, dc=example, dc=edu").unwrap();
        assert!(a.matches(&b));
        assert_eq!(a.components()[0].attribute(), "cn");
        assert_eq!(a.components()[0].value(), "Smith, John");
    }

    #[test]
    fn rejects_trailing_escape() {
        assert!(matches!(
            DistinguishedName::parse("cn=broken\\"),
            Err(DistinguishedNameError::UnterminatedEscape)
        ));
    }
}
