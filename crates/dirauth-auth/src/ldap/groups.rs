//! Group membership resolution
//!
//! Two strategies decide which of the requested groups a user belongs to:
//!
//! - **Per group** reads each group entry by DN and looks for the user in
//!   its member attribute. The reads run concurrently on the leased
//!   connection. A group that cannot be read counts as "not a member".
//! - **Simplified** asks the directory once per container for groups whose
//!   name is one of the requested names and whose member attribute holds
//!   the user's DN. A failing search fails the whole resolution.
//!
//! Both return matched group names in request order.

use crate::ldap::adapter::*;
use crate::ldap::dn::member_identifier;
use crate::ldap::filter::Filter;
use crate::ldap::session::search_error;
use dirauth_core::{EffectiveOptions, Result, ResolvedGroup};
use futures::future::join_all;
use ldap3::dn_escape;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Attribute holding a group's name
pub const GROUP_NAME_ATTRIBUTE: &str = "cn";

/// The user a membership check is about
#[derive(Debug, Clone, Copy)]
pub struct Member<'a> {
    /// Identifying value, e.g. `alice`
    pub name: &'a str,
    /// Full entry DN
    pub dn: &'a str,
}

pub struct GroupResolver<'a> {
    conn: &'a dyn DirectoryConnection,
    opts: &'a EffectiveOptions,
}

impl<'a> GroupResolver<'a> {
    pub fn new(conn: &'a dyn DirectoryConnection, opts: &'a EffectiveOptions) -> Self {
        Self { conn, opts }
    }

    /// Names of the `groups` that `member` belongs to, using the strategy
    /// selected in the options.
    pub async fn resolve(&self, groups: &[ResolvedGroup], member: Member<'_>) -> Result<Vec<String>> {
        if groups.is_empty() {
            return Ok(Vec::new());
        }
        if self.opts.use_simplified_group_search {
            self.combined(groups, member).await
        } else {
            Ok(self.per_group(groups, member).await)
        }
    }

    /// Per-group strategy; unreadable groups are skipped.
    pub async fn per_group(&self, groups: &[ResolvedGroup], member: Member<'_>) -> Vec<String> {
        let checks = groups.iter().map(|group| async move {
            match self.members(group).await {
                Ok(members) => members.iter().any(|m| m.eq_ignore_ascii_case(member.name)),
                Err(e) => {
                    warn!("Group {} could not be read, treating as non-member: {}", group.name, e);
                    false
                }
            }
        });

        let outcomes = join_all(checks).await;

        groups
            .iter()
            .zip(outcomes)
            .filter(|(_, is_member)| *is_member)
            .map(|(group, _)| group.name.clone())
            .collect()
    }

    /// Simplified strategy: one search per (container, member attribute).
    pub async fn combined(&self, groups: &[ResolvedGroup], member: Member<'_>) -> Result<Vec<String>> {
        let mut batches: Vec<(&str, &str, Vec<&str>)> = Vec::new();
        for group in groups {
            match batches
                .iter_mut()
                .find(|(c, a, _)| *c == group.container && *a == group.member_attribute)
            {
                Some((_, _, names)) => names.push(group.name.as_str()),
                None => batches.push((
                    group.container.as_str(),
                    group.member_attribute.as_str(),
                    vec![group.name.as_str()],
                )),
            }
        }

        let mut found = HashSet::new();
        for (container, member_attribute, names) in batches {
            let request = SearchRequest::new(
                self.opts.groups_base(container),
                SearchScope::Subtree,
                Filter::And(vec![
                    Filter::any_of(GROUP_NAME_ATTRIBUTE, names),
                    Filter::eq(member_attribute, member.dn),
                ]),
            )
            .attributes([GROUP_NAME_ATTRIBUTE]);

            let entries = self.conn.search(&request).await.map_err(search_error)?;
            for entry in &entries {
                for name in entry.values(GROUP_NAME_ATTRIBUTE) {
                    found.insert(name.to_lowercase());
                }
            }
        }

        Ok(groups
            .iter()
            .filter(|g| found.contains(&g.name.to_lowercase()))
            .map(|g| g.name.clone())
            .collect())
    }

    /// Identifying values of every member of `group`.
    ///
    /// DN-valued members are reduced to the value of the group's user
    /// attribute; members that cannot be reduced are skipped.
    pub async fn members(&self, group: &ResolvedGroup) -> std::result::Result<Vec<String>, ProtocolError> {
        let request = SearchRequest::new(self.group_dn(group), SearchScope::Base, Filter::any())
            .attributes([group.member_attribute.as_str()]);

        let entries = self.conn.search(&request).await?;

        let mut members = Vec::new();
        for entry in &entries {
            for value in entry.values(&group.member_attribute) {
                match member_identifier(value, &group.user_attribute) {
                    Some(id) => members.push(id),
                    None => debug!("Skipping member {} of {}", value, group.name),
                }
            }
        }
        Ok(members)
    }

    fn group_dn(&self, group: &ResolvedGroup) -> String {
        format!(
            "{}={},{}",
            GROUP_NAME_ATTRIBUTE,
            dn_escape(group.name.as_str()),
            self.opts.groups_base(&group.container)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::mock::{self, MockDirectory};
    use dirauth_core::{CallOptions, DirectoryConfig, EndpointSet, GroupSpec, TlsOptions};
    use dirauth_core::types::GroupOverride;
    use std::time::Duration;

    fn options(call: CallOptions) -> EffectiveOptions {
        DirectoryConfig::new(vec!["ldap://a".to_string()], mock::ROOT).merge(&call)
    }

    async fn connect(dir: &MockDirectory) -> Box<dyn DirectoryConnection> {
        let endpoint = EndpointSet::parse(["ldap://a"]).unwrap().get(0).unwrap().clone();
        dir.connector()
            .connect(&endpoint, &TlsOptions::default(), Duration::from_millis(300))
            .await
            .unwrap()
    }

    fn member(name: &str) -> (String, String) {
        (name.to_string(), mock::user_dn(name))
    }

    #[tokio::test]
    async fn test_per_group_matches_in_request_order() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;
        let opts = options(CallOptions::new().with_groups(["ops", "admins", "missing"]));
        let groups = opts.resolve_groups().unwrap();
        let (name, dn) = member("carol");

        let matched = GroupResolver::new(conn.as_ref(), &opts)
            .resolve(&groups, Member { name: &name, dn: &dn })
            .await
            .unwrap();

        assert_eq!(matched, vec!["ops", "admins"]);
        // One base read per group.
        let searches = dir.searches();
        assert_eq!(searches.len(), 3);
        assert!(searches.iter().all(|s| s.scope == SearchScope::Base));
    }

    #[tokio::test]
    async fn test_per_group_skips_unreadable_group() {
        let dir = MockDirectory::standard();
        dir.fail_searches_under("cn=admins,ou=groups,dc=example,dc=com");
        let conn = connect(&dir).await;
        let opts = options(CallOptions::new().with_groups(["admins", "ops"]));
        let groups = opts.resolve_groups().unwrap();
        let (name, dn) = member("carol");

        let matched = GroupResolver::new(conn.as_ref(), &opts)
            .per_group(&groups, Member { name: &name, dn: &dn })
            .await;

        assert_eq!(matched, vec!["ops"]);
    }

    #[tokio::test]
    async fn test_plain_member_values_with_override() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;
        let devs = GroupSpec::Override(GroupOverride {
            name: Some("devs".to_string()),
            container: Some("ou=teams".to_string()),
            member_attribute: Some("memberUid".to_string()),
            user_attribute: None,
        });
        let opts = options(CallOptions::new().with_groups([devs, GroupSpec::name("admins")]));
        let groups = opts.resolve_groups().unwrap();
        let (name, dn) = member("bob");

        let matched = GroupResolver::new(conn.as_ref(), &opts)
            .resolve(&groups, Member { name: &name, dn: &dn })
            .await
            .unwrap();

        assert_eq!(matched, vec!["devs"]);
    }

    #[tokio::test]
    async fn test_combined_search_single_request() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;
        let opts = options(
            CallOptions::new()
                .with_groups(["ops", "admins"])
                .simplified(true),
        );
        let groups = opts.resolve_groups().unwrap();
        let (name, dn) = member("alice");

        let matched = GroupResolver::new(conn.as_ref(), &opts)
            .resolve(&groups, Member { name: &name, dn: &dn })
            .await
            .unwrap();

        assert_eq!(matched, vec!["admins"]);
        let searches = dir.searches();
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].base, "ou=groups,dc=example,dc=com");
        assert_eq!(
            searches[0].filter.to_string(),
            "(&(|(cn=ops)(cn=admins))(member=uid=alice,ou=users,dc=example,dc=com))"
        );
    }

    #[tokio::test]
    async fn test_combined_search_batches_by_container() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;
        let devs = GroupSpec::Override(GroupOverride {
            name: Some("devs".to_string()),
            container: Some("ou=teams".to_string()),
            member_attribute: Some("memberUid".to_string()),
            user_attribute: None,
        });
        let opts = options(
            CallOptions::new()
                .with_groups([GroupSpec::name("admins"), devs, GroupSpec::name("ops")])
                .simplified(true),
        );
        let groups = opts.resolve_groups().unwrap();
        let (name, dn) = member("carol");

        let matched = GroupResolver::new(conn.as_ref(), &opts)
            .resolve(&groups, Member { name: &name, dn: &dn })
            .await
            .unwrap();

        assert_eq!(matched, vec!["admins", "ops"]);
        assert_eq!(dir.searches().len(), 2);
    }

    #[tokio::test]
    async fn test_combined_search_failure_propagates() {
        let dir = MockDirectory::standard();
        dir.fail_searches_under("ou=groups,dc=example,dc=com");
        let conn = connect(&dir).await;
        let opts = options(CallOptions::new().with_groups(["admins"]).simplified(true));
        let groups = opts.resolve_groups().unwrap();
        let (name, dn) = member("alice");

        let err = GroupResolver::new(conn.as_ref(), &opts)
            .resolve(&groups, Member { name: &name, dn: &dn })
            .await
            .unwrap_err();

        assert_eq!(err.code(), "SearchFailure");
    }

    #[tokio::test]
    async fn test_members_reduces_dns() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;
        let opts = options(CallOptions::new().with_groups(["admins"]));
        let groups = opts.resolve_groups().unwrap();

        let members = GroupResolver::new(conn.as_ref(), &opts)
            .members(&groups[0])
            .await
            .unwrap();

        assert_eq!(members, vec!["alice", "carol"]);
    }
}
