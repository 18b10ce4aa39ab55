//! User records and operation results

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Directory attributes of a user, first value per attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Entry DN, when the directory returned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dn: Option<String>,

    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl UserRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the first value of each attribute; later values are dropped.
    pub fn absorb<'a, I, V>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (&'a String, V)>,
        V: AsRef<[String]>,
    {
        for (name, values) in attributes {
            if let Some(first) = values.as_ref().first() {
                self.attributes.insert(name.clone(), first.clone());
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    /// Case-insensitive lookup, attribute names are not case-sensitive
    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Result of authenticate, lookup and sync operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    #[serde(flatten)]
    pub user: UserRecord,

    /// Matched groups in request order; present only when requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
}

impl AuthResult {
    pub fn new(user: UserRecord) -> Self {
        Self { user, groups: None }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn in_group(&self, name: &str) -> bool {
        self.groups
            .as_ref()
            .map(|g| g.iter().any(|n| n == name))
            .unwrap_or(false)
    }
}
