//! Bulk user synchronization
//!
//! Fetches many users with a single search, then reads every requested
//! group once and distributes its members over the fetched users.

use crate::ldap::adapter::*;
use crate::ldap::filter::Filter;
use crate::ldap::groups::GroupResolver;
use crate::ldap::session::search_error;
use dirauth_core::{AuthResult, EffectiveOptions, ResolvedGroup, Result, UserRecord};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

pub(crate) async fn sync_users(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    groups: &[ResolvedGroup],
    names: &[String],
) -> Result<Vec<AuthResult>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }

    let uid = opts.user_id_attribute.as_str();
    let mut attributes = opts.user_attributes.clone();
    if !attributes.is_empty() && !attributes.iter().any(|a| a.eq_ignore_ascii_case(uid)) {
        attributes.push(uid.to_string());
    }

    let request = SearchRequest::new(
        opts.users_base(),
        SearchScope::Subtree,
        Filter::any_of(uid, names.iter().cloned()),
    )
    .attributes(attributes);

    let entries = conn.search(&request).await.map_err(search_error)?;
    debug!("Sync search matched {} of {} users", entries.len(), names.len());

    let users: Vec<UserRecord> = entries
        .iter()
        .map(|entry| {
            let mut record = UserRecord::new();
            record.dn = Some(entry.dn.clone());
            record.absorb(entry.attrs.iter());
            record
        })
        .collect();

    if groups.is_empty() {
        return Ok(users.into_iter().map(AuthResult::new).collect());
    }

    let requested: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let memberships = memberships(conn, opts, groups, &requested).await?;

    let results = users
        .into_iter()
        .map(|user| {
            let groups = user
                .get_ignore_case(uid)
                .and_then(|id| memberships.get(&id.to_lowercase()))
                .cloned()
                .unwrap_or_default();
            AuthResult::new(user).with_groups(groups)
        })
        .collect::<Vec<_>>();

    info!("Synchronized {} users against {} groups", results.len(), groups.len());
    Ok(results)
}

/// Lowercased user name to the requested groups it is a member of, in
/// request order. Only names in `requested` are kept.
async fn memberships(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    groups: &[ResolvedGroup],
    requested: &HashSet<String>,
) -> Result<HashMap<String, Vec<String>>> {
    let resolver = GroupResolver::new(conn, opts);
    let mut memberships: HashMap<String, Vec<String>> = HashMap::new();

    for group in groups {
        let members = resolver.members(group).await.map_err(search_error)?;
        for member in members {
            let key = member.to_lowercase();
            if requested.contains(&key) {
                let entry = memberships.entry(key).or_default();
                if !entry.contains(&group.name) {
                    entry.push(group.name.clone());
                }
            }
        }
    }

    Ok(memberships)
}
