//! Directory client
//!
//! Entry point for authentication, user lookup, group member listing and
//! bulk sync. Every operation merges its [`CallOptions`] over the instance
//! configuration, validates the request, leases one endpoint from the
//! [`ConnectionBroker`] and releases it when the operation finishes,
//! whatever the outcome.

use crate::ldap::adapter::{DirectoryConnection, DirectoryConnector, ReadinessProbe};
use crate::ldap::broker::ConnectionBroker;
use crate::ldap::connection::{Ldap3Connector, TcpProbe};
use crate::ldap::groups::{GroupResolver, Member};
use crate::ldap::session::{self, search_error};
use crate::ldap::sync;
use crate::metrics;
use dirauth_core::{
    AuthResult, CallOptions, DirectoryConfig, EffectiveOptions, EndpointSet, Error, GroupSpec,
    ResolvedGroup, Result,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DirectoryClient {
    config: DirectoryConfig,
    broker: ConnectionBroker,
}

impl DirectoryClient {
    /// Create a client that talks to real servers.
    pub fn new(config: DirectoryConfig) -> Result<Self> {
        Self::with_adapter(config, Arc::new(Ldap3Connector::new()), Arc::new(TcpProbe))
    }

    /// Create a client on a custom protocol adapter.
    pub fn with_adapter(
        config: DirectoryConfig,
        connector: Arc<dyn DirectoryConnector>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Result<Self> {
        config.validate()?;
        let endpoints = EndpointSet::parse(&config.servers)?;
        debug!("Directory client configured with {} servers", endpoints.len());

        Ok(Self {
            config,
            broker: ConnectionBroker::new(endpoints, connector, probe),
        })
    }

    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    pub fn broker(&self) -> &ConnectionBroker {
        &self.broker
    }

    /// Authenticate `user` and, when groups are requested, require
    /// membership in at least one of them.
    pub async fn authenticate(
        &self,
        user: &str,
        password: &str,
        call: &CallOptions,
    ) -> Result<AuthResult> {
        let outcome = self.authenticate_inner(user, password, call).await;
        match &outcome {
            Ok(_) => {
                info!("User {} authenticated", user);
                metrics::record_authentication("success");
            }
            Err(e) => {
                warn!("Authentication of {} failed: {}", user, e);
                metrics::record_authentication(e.code());
            }
        }
        outcome
    }

    async fn authenticate_inner(
        &self,
        user: &str,
        password: &str,
        call: &CallOptions,
    ) -> Result<AuthResult> {
        let opts = self.config.merge(call);
        require_user_name(user)?;
        if password.is_empty() {
            return Err(Error::BindFailure("empty password".to_string()));
        }
        let groups = opts.resolve_groups()?;
        let endpoints = self.endpoints(&opts)?;

        let lease = self
            .broker
            .acquire(&endpoints, &opts.tls, opts.connect_timeout)
            .await?;
        let outcome = authorize(lease.connection(), &opts, &groups, user, password).await;
        lease.release().await;
        outcome
    }

    /// Read a user's entry with the service identity. Groups, when
    /// requested, are informational and never fail the lookup.
    pub async fn lookup_user(&self, user: &str, call: &CallOptions) -> Result<AuthResult> {
        let opts = self.config.merge(call);
        require_user_name(user)?;
        let groups = opts.resolve_groups()?;
        let endpoints = self.endpoints(&opts)?;

        let lease = self
            .broker
            .acquire(&endpoints, &opts.tls, opts.connect_timeout)
            .await?;
        let outcome = lookup(lease.connection(), &opts, &groups, user).await;
        lease.release().await;
        outcome
    }

    /// Members of `group`, optionally restricted to names in `only`.
    pub async fn list_group_members(
        &self,
        group: &str,
        call: &CallOptions,
        only: Option<&HashSet<String>>,
    ) -> Result<Vec<String>> {
        let opts = self.config.merge(call);
        let group = GroupSpec::name(group).resolve(
            &opts.groups_container,
            &opts.group_member_attribute,
            &opts.user_id_attribute,
        )?;
        let endpoints = self.endpoints(&opts)?;

        let lease = self
            .broker
            .acquire(&endpoints, &opts.tls, opts.connect_timeout)
            .await?;
        let outcome = members(lease.connection(), &opts, &group).await;
        lease.release().await;

        let members = outcome?;
        Ok(match only {
            Some(only) => {
                let only: HashSet<String> = only.iter().map(|n| n.to_lowercase()).collect();
                members
                    .into_iter()
                    .filter(|m| only.contains(&m.to_lowercase()))
                    .collect()
            }
            None => members,
        })
    }

    /// Fetch many users in one search, with their memberships in the
    /// requested groups.
    pub async fn sync_users<I, S>(&self, names: I, call: &CallOptions) -> Result<Vec<AuthResult>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let opts = self.config.merge(call);
        let groups = opts.resolve_groups()?;

        let mut seen = HashSet::new();
        let names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty() && seen.insert(n.to_lowercase()))
            .collect();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let endpoints = self.endpoints(&opts)?;
        let lease = self
            .broker
            .acquire(&endpoints, &opts.tls, opts.connect_timeout)
            .await?;
        let outcome = sync_with_service(lease.connection(), &opts, &groups, &names).await;
        lease.release().await;
        outcome
    }

    /// The call's server list, or the instance pool itself so the broker
    /// rotates through it.
    fn endpoints(&self, opts: &EffectiveOptions) -> Result<EndpointSet> {
        match &opts.servers {
            Some(servers) => EndpointSet::parse(servers),
            None => Ok(self.broker.default_set().clone()),
        }
    }
}

fn require_user_name(user: &str) -> Result<()> {
    if user.trim().is_empty() {
        return Err(Error::InvalidConfig("user name must not be empty".to_string()));
    }
    Ok(())
}

async fn authorize(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    groups: &[ResolvedGroup],
    user: &str,
    password: &str,
) -> Result<AuthResult> {
    let record = session::bind_and_fetch(conn, opts, user, password).await?;
    if groups.is_empty() {
        return Ok(AuthResult::new(record));
    }

    let dn = session::user_dn(opts, user);
    let matched = GroupResolver::new(conn, opts)
        .resolve(groups, Member { name: user, dn: &dn })
        .await?;

    if matched.is_empty() {
        return Err(Error::NotAuthorized {
            user: user.to_string(),
        });
    }

    debug!("User {} matched groups {:?}", user, matched);
    let result = AuthResult::new(record);
    Ok(if opts.include_groups_in_result {
        result.with_groups(matched)
    } else {
        result
    })
}

async fn lookup(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    groups: &[ResolvedGroup],
    user: &str,
) -> Result<AuthResult> {
    session::service_bind(conn, opts).await?;
    let record = session::lookup_entry(conn, opts, user).await?;
    if groups.is_empty() || !opts.include_groups_in_result {
        return Ok(AuthResult::new(record));
    }

    let dn = record
        .dn
        .clone()
        .unwrap_or_else(|| session::user_dn(opts, user));
    let matched = match GroupResolver::new(conn, opts)
        .resolve(groups, Member { name: user, dn: &dn })
        .await
    {
        Ok(matched) => matched,
        Err(e) => {
            warn!("Group lookup for {} failed: {}", user, e);
            Vec::new()
        }
    };

    Ok(AuthResult::new(record).with_groups(matched))
}

async fn members(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    group: &ResolvedGroup,
) -> Result<Vec<String>> {
    session::service_bind(conn, opts).await?;
    GroupResolver::new(conn, opts)
        .members(group)
        .await
        .map_err(search_error)
}

async fn sync_with_service(
    conn: &dyn DirectoryConnection,
    opts: &EffectiveOptions,
    groups: &[ResolvedGroup],
    names: &[String],
) -> Result<Vec<AuthResult>> {
    session::service_bind(conn, opts).await?;
    sync::sync_users(conn, opts, groups, names).await
}
