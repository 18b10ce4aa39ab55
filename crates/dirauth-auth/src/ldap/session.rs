//! Bind and user-entry searches on a leased connection

use crate::ldap::adapter::*;
use crate::ldap::filter::Filter;
use dirauth_core::{EffectiveOptions, Error, Result, UserRecord};
use ldap3::dn_escape;
use tracing::debug;

/// `{uid}={user},{users base}`
pub(crate) fn user_dn(opts: &EffectiveOptions, user: &str) -> String {
    format!(
        "{}={},{}",
        opts.user_id_attribute,
        dn_escape(user),
        opts.users_base()
    )
}

/// Bind as the user, then fetch the user's own entry.
pub(crate) async fn bind_and_fetch(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    user: &str,
    password: &str,
) -> Result<UserRecord> {
    let dn = user_dn(opts, user);
    debug!("Binding as {}", dn);

    conn.bind(&dn, password).await.map_err(bind_error)?;

    let request = SearchRequest::new(
        opts.users_base(),
        SearchScope::Subtree,
        Filter::And(vec![Filter::eq(&opts.user_id_attribute, user)]),
    )
    .attributes(opts.user_attributes.iter().cloned());

    let entries = conn.search(&request).await.map_err(search_error)?;
    if entries.is_empty() {
        debug!("Self search for {} returned no entries", user);
    }
    Ok(collect_record(&entries))
}

/// Bind with the service account when one is configured.
pub(crate) async fn service_bind(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
) -> Result<()> {
    match &opts.service_account {
        Some(account) => {
            debug!("Binding as service account {}", account.bind_dn);
            conn.bind(&account.bind_dn, &account.password)
                .await
                .map_err(bind_error)
        }
        None => Ok(()),
    }
}

/// Read the entry at the user's DN.
pub(crate) async fn lookup_entry(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    user: &str,
) -> Result<UserRecord> {
    let request = SearchRequest::new(user_dn(opts, user), SearchScope::Subtree, Filter::any())
        .attributes(opts.user_attributes.iter().cloned());

    let entries = match conn.search(&request).await {
        Ok(entries) => entries,
        Err(ProtocolError::Search { rc: RC_NO_SUCH_OBJECT, .. }) => Vec::new(),
        Err(e) => return Err(search_error(e)),
    };

    if entries.is_empty() {
        return Err(Error::UserNotFound(user.to_string()));
    }
    Ok(collect_record(&entries))
}

/// Fold entries into one record; the DN is taken from the first entry and
/// later entries overwrite earlier attribute values.
pub(crate) fn collect_record(entries: &[DirEntry]) -> UserRecord {
    let mut record = UserRecord::new();
    for entry in entries {
        if record.dn.is_none() {
            record.dn = Some(entry.dn.clone());
        }
        record.absorb(entry.attrs.iter());
    }
    record
}

pub(crate) fn bind_error(e: ProtocolError) -> Error {
    match e {
        ProtocolError::Bind { rc: RC_INVALID_CREDENTIALS, .. } => {
            Error::BindFailure("invalid credentials".to_string())
        }
        other => Error::BindFailure(other.to_string()),
    }
}

pub(crate) fn search_error(e: ProtocolError) -> Error {
    Error::SearchFailure(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ldap::mock::{self, MockDirectory};
    use dirauth_core::{CallOptions, DirectoryConfig, EndpointSet, TlsOptions};
    use std::time::Duration;

    fn options() -> EffectiveOptions {
        DirectoryConfig::new(vec!["ldap://a".to_string()], mock::ROOT).merge(&CallOptions::new())
    }

    async fn connect(dir: &MockDirectory) -> Box<dyn DirectoryConnection> {
        let endpoint = EndpointSet::parse(["ldap://a"]).unwrap().get(0).unwrap().clone();
        dir.connector()
            .connect(&endpoint, &TlsOptions::default(), Duration::from_millis(300))
            .await
            .unwrap()
    }

    #[test]
    fn test_user_dn_escapes_name() {
        let opts = options();
        assert_eq!(user_dn(&opts, "alice"), "uid=alice,ou=users,dc=example,dc=com");
        assert_eq!(
            user_dn(&opts, "smith, john"),
            "uid=smith\\2c john,ou=users,dc=example,dc=com"
        );
    }

    #[tokio::test]
    async fn test_bind_and_fetch() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;

        let record = bind_and_fetch(conn.as_ref(), &options(), "alice", mock::PASSWORD)
            .await
            .unwrap();
        assert_eq!(record.dn.as_deref(), Some(mock::user_dn("alice").as_str()));
        assert_eq!(record.get("mail"), Some("alice@example.com"));

        let search = &dir.searches()[0];
        assert_eq!(search.base, "ou=users,dc=example,dc=com");
        assert_eq!(search.filter.to_string(), "(&(uid=alice))");
    }

    #[tokio::test]
    async fn test_wrong_password_is_bind_failure() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;

        let err = bind_and_fetch(conn.as_ref(), &options(), "alice", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BindFailure");
        assert!(dir.searches().is_empty());
    }

    #[tokio::test]
    async fn test_requested_attributes_only() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;
        let mut opts = options();
        opts.user_attributes = vec!["cn".to_string()];

        let record = bind_and_fetch(conn.as_ref(), &opts, "bob", mock::PASSWORD)
            .await
            .unwrap();
        assert_eq!(record.get("cn"), Some("Bob Ross"));
        assert_eq!(record.get("mail"), None);
    }

    #[tokio::test]
    async fn test_lookup_missing_user() {
        let dir = MockDirectory::standard();
        let conn = connect(&dir).await;

        let err = lookup_entry(conn.as_ref(), &options(), "mallory")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UserNotFound");

        let record = lookup_entry(conn.as_ref(), &options(), "carol").await.unwrap();
        assert_eq!(record.get("cn"), Some("Carol Danvers"));
    }

    #[test]
    fn test_collect_record_merges_entries() {
        let mut first = DirEntry {
            dn: "uid=a,dc=x".to_string(),
            ..Default::default()
        };
        first.attrs.insert("cn".to_string(), vec!["A".to_string()]);
        let mut second = DirEntry {
            dn: "uid=b,dc=x".to_string(),
            ..Default::default()
        };
        second.attrs.insert("cn".to_string(), vec!["B".to_string()]);
        second.attrs.insert("mail".to_string(), vec!["b@x".to_string()]);

        let record = collect_record(&[first, second]);
        assert_eq!(record.dn.as_deref(), Some("uid=a,dc=x"));
        assert_eq!(record.get("cn"), Some("B"));
        assert_eq!(record.get("mail"), Some("b@x"));
    }
}
