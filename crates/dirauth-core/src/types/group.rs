//! Group specifications

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// A group the caller wants membership checked against.
///
/// In configuration files a bare string is a common name under the default
/// group container; a table overrides the container and attributes:
///
/// ```toml
/// default_groups = ["admins", { name = "ops", container = "ou=teams" }]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupSpec {
    Name(String),
    Override(GroupOverride),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GroupOverride {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub container: Option<String>,
    #[serde(default)]
    pub member_attribute: Option<String>,
    #[serde(default)]
    pub user_attribute: Option<String>,
}

/// Fully qualified group, ready to search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGroup {
    /// Common name
    pub name: String,
    /// Container relative to the root suffix, e.g. `ou=groups`
    pub container: String,
    /// Attribute on the group entry listing its members
    pub member_attribute: String,
    /// Attribute naming the user in each member value
    pub user_attribute: String,
}

impl GroupSpec {
    pub fn name(name: impl Into<String>) -> Self {
        GroupSpec::Name(name.into())
    }

    /// Apply instance defaults; overrides must carry both name and container.
    pub fn resolve(
        &self,
        default_container: &str,
        default_member_attribute: &str,
        default_user_attribute: &str,
    ) -> Result<ResolvedGroup> {
        match self {
            GroupSpec::Name(name) => {
                if name.trim().is_empty() {
                    return Err(Error::InvalidGroupSpec("group name is empty".to_string()));
                }
                Ok(ResolvedGroup {
                    name: name.clone(),
                    container: default_container.to_string(),
                    member_attribute: default_member_attribute.to_string(),
                    user_attribute: default_user_attribute.to_string(),
                })
            }
            GroupSpec::Override(spec) => {
                let name = non_empty(spec.name.as_deref()).ok_or_else(|| {
                    Error::InvalidGroupSpec("group override is missing 'name'".to_string())
                })?;
                let container = non_empty(spec.container.as_deref()).ok_or_else(|| {
                    Error::InvalidGroupSpec(format!(
                        "group override '{}' is missing 'container'",
                        name
                    ))
                })?;

                Ok(ResolvedGroup {
                    name: name.to_string(),
                    container: container.to_string(),
                    member_attribute: non_empty(spec.member_attribute.as_deref())
                        .unwrap_or(default_member_attribute)
                        .to_string(),
                    user_attribute: non_empty(spec.user_attribute.as_deref())
                        .unwrap_or(default_user_attribute)
                        .to_string(),
                })
            }
        }
    }
}

impl From<&str> for GroupSpec {
    fn from(name: &str) -> Self {
        GroupSpec::Name(name.to_string())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
