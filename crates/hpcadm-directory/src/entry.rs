//! Directory entries and the typed projection over them.

use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Raw directory entry returned by a search.
///
/// A mapping from attribute name to one-or-many string values plus the
/// distinguished name identifying the entry. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (value order preserved from the server).
    pub attributes: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes
            .get(attribute)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }

    /// Returns true when the entry carries the attribute.
    #[must_use]
    pub fn has(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }
}

/// Record of a multi-valued attribute flattened to its first value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncation {
    /// Attribute that was flattened.
    pub attribute: String,
    /// Number of values discarded beyond the first.
    pub discarded: usize,
}

/// Application-level view of a [`DirectoryEntry`].
///
/// Attributes named in the list set keep their full value sequence; every
/// other attribute is flattened to its first value. Flattening an
/// attribute that actually carried more than one value is recorded (and
/// logged) rather than silently dropping data. An attribute absent from
/// the entry is absent from the projection; accessors return `None`.
#[derive(Debug, Clone, Default)]
pub struct Projection {
    dn: String,
    scalars: HashMap<String, String>,
    lists: HashMap<String, Vec<String>>,
    truncations: Vec<Truncation>,
}

impl Projection {
    /// Project an entry, keeping the named attributes as lists.
    #[must_use]
    pub fn new(entry: &DirectoryEntry, list_attributes: &[&str]) -> Self {
        let list_set: HashSet<&str> = list_attributes.iter().copied().collect();
        let mut scalars = HashMap::new();
        let mut lists = HashMap::new();
        let mut truncations = Vec::new();

        for (attribute, values) in &entry.attributes {
            if list_set.contains(attribute.as_str()) {
                lists.insert(attribute.clone(), values.clone());
                continue;
            }
            let Some(first) = values.first() else {
                continue;
            };
            if values.len() > 1 {
                warn!(
                    attribute = attribute.as_str(),
                    discarded = values.len() - 1,
                    dn = entry.dn.as_str(),
                    "flattening multi-valued attribute to its first value"
                );
                truncations.push(Truncation {
                    attribute: attribute.clone(),
                    discarded: values.len() - 1,
                });
            }
            scalars.insert(attribute.clone(), first.clone());
        }

        Self {
            dn: entry.dn.clone(),
            scalars,
            lists,
            truncations,
        }
    }

    /// Distinguished name of the projected entry.
    #[must_use]
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// Scalar field value, when the attribute was present.
    #[must_use]
    pub fn scalar(&self, attribute: &str) -> Option<&str> {
        self.scalars.get(attribute).map(String::as_str)
    }

    /// List field value, when the attribute was present and declared a list.
    #[must_use]
    pub fn list(&self, attribute: &str) -> Option<&[String]> {
        self.lists.get(attribute).map(Vec::as_slice)
    }

    /// Attributes that lost values during flattening.
    #[must_use]
    pub fn truncations(&self) -> &[Truncation] {
        &self.truncations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> DirectoryEntry {
        let mut attributes = HashMap::new();
        attributes.insert("uid".to_string(), vec!["jdoe".to_string()]);
        attributes.insert("gidNumber".to_string(), vec!["5000".to_string()]);
        attributes.insert(
            "mail".to_string(),
            vec!["jdoe@example.edu".to_string(), "jd@example.edu".to_string()],
        );
        attributes.insert(
            "uniqueMember".to_string(),
            vec![
                "uid=a,ou=People,dc=example,dc=edu".to_string(),
                "uid=b,ou=People,dc=example,dc=edu".to_string(),
            ],
        );
        DirectoryEntry {
            dn: "uid=jdoe,ou=People,dc=example,dc=edu".to_string(),
            attributes,
        }
    }

    #[test]
    fn scalar_fields_take_first_value() {
        let projection = Projection::new(&entry(), &["uniqueMember"]);
        assert_eq!(projection.scalar("uid"), Some("jdoe"));
        assert_eq!(projection.scalar("gidNumber"), Some("5000"));
        // mail was not declared a list, so it flattens to the first value
        assert_eq!(projection.scalar("mail"), Some("jdoe@example.edu"));
    }

    #[test]
    fn declared_lists_keep_all_values() {
        let projection = Projection::new(&entry(), &["uniqueMember", "mail"]);
        assert_eq!(projection.list("uniqueMember").unwrap().len(), 2);
        assert_eq!(projection.list("mail").unwrap().len(), 2);
        assert!(projection.scalar("mail").is_none());
        assert!(projection.truncations().is_empty());
    }

    #[test]
    fn flattening_multi_values_is_recorded() {
        let projection = Projection::new(&entry(), &["uniqueMember"]);
        assert_eq!(projection.truncations().len(), 1);
        let truncation = &projection.truncations()[0];
        assert_eq!(truncation.attribute, "mail");
        assert_eq!(truncation.discarded, 1);
    }

    #[test]
    fn absent_attribute_is_absent_field() {
        let projection = Projection::new(&entry(), &[]);
        assert!(projection.scalar("loginShell").is_none());
        assert!(projection.list("memberOf").is_none());
    }

    #[test]
    fn dn_is_carried_through() {
        let projection = Projection::new(&entry(), &[]);
        assert_eq!(projection.dn(), "uid=jdoe,ou=People,dc=example,dc=edu");
    }
}
