//! In-memory directory for tests

use crate::ldap::adapter::*;
use crate::ldap::filter::Filter;
use async_trait::async_trait;
use dirauth_core::{ServerEndpoint, TlsOptions};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const ROOT: &str = "dc=example,dc=com";
pub const PASSWORD: &str = "secret";
pub const READER_DN: &str = "cn=reader,dc=example,dc=com";
pub const READER_PASSWORD: &str = "reader-pw";

#[derive(Default)]
struct State {
    entries: Vec<DirEntry>,
    passwords: HashMap<String, String>,
    unreachable: HashSet<String>,
    refusing: HashSet<String>,
    failing_bases: HashSet<String>,
    probes: Vec<String>,
    connects: Vec<String>,
    searches: Vec<SearchRequest>,
}

/// Shared directory contents plus a call log. Cloning shares the state.
#[derive(Clone, Default)]
pub struct MockDirectory {
    state: Arc<Mutex<State>>,
    unbinds: Arc<AtomicUsize>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// alice is in admins; carol is in admins and ops; bob is in no group.
    /// `devs` lists plain `memberUid` values instead of DNs.
    pub fn standard() -> Self {
        let dir = Self::new();
        dir.add_user("alice", "Alice Liddell");
        dir.add_user("bob", "Bob Ross");
        dir.add_user("carol", "Carol Danvers");
        let (alice, carol) = (user_dn("alice"), user_dn("carol"));
        dir.add_group("admins", "ou=groups", "member", &[alice.as_str(), carol.as_str()]);
        dir.add_group("ops", "ou=groups", "member", &[carol.as_str()]);
        dir.add_group("devs", "ou=teams", "memberUid", &["bob"]);
        dir.set_password(READER_DN, READER_PASSWORD);
        dir
    }

    pub fn add_entry(&self, dn: &str, attrs: Vec<(&str, Vec<&str>)>) {
        let attrs = attrs
            .into_iter()
            .map(|(k, vs)| (k.to_string(), vs.into_iter().map(str::to_string).collect()))
            .collect();
        self.state.lock().entries.push(DirEntry {
            dn: dn.to_string(),
            attrs,
        });
    }

    pub fn add_user(&self, uid: &str, name: &str) {
        let dn = user_dn(uid);
        let mail = format!("{}@example.com", uid);
        self.add_entry(
            &dn,
            vec![
                ("uid", vec![uid]),
                ("cn", vec![name]),
                ("mail", vec![mail.as_str()]),
                ("objectClass", vec!["inetOrgPerson"]),
            ],
        );
        self.set_password(&dn, PASSWORD);
    }

    pub fn add_group(&self, name: &str, container: &str, member_attribute: &str, members: &[&str]) {
        self.add_entry(
            &format!("cn={},{},{}", name, container, ROOT),
            vec![
                ("cn", vec![name]),
                (member_attribute, members.to_vec()),
                ("objectClass", vec!["groupOfNames"]),
            ],
        );
    }

    pub fn set_password(&self, dn: &str, password: &str) {
        self.state
            .lock()
            .passwords
            .insert(dn.to_ascii_lowercase(), password.to_string());
    }

    /// Probes of this host fail
    pub fn mark_unreachable(&self, host: &str) {
        self.state.lock().unreachable.insert(host.to_string());
    }

    /// Probes of this host pass but protocol connects fail
    pub fn mark_refusing(&self, host: &str) {
        self.state.lock().refusing.insert(host.to_string());
    }

    /// Searches rooted at this base fail
    pub fn fail_searches_under(&self, base: &str) {
        self.state.lock().failing_bases.insert(base.to_ascii_lowercase());
    }

    pub fn probes(&self) -> Vec<String> {
        self.state.lock().probes.clone()
    }

    pub fn connects(&self) -> Vec<String> {
        self.state.lock().connects.clone()
    }

    pub fn searches(&self) -> Vec<SearchRequest> {
        self.state.lock().searches.clone()
    }

    pub fn unbinds(&self) -> usize {
        self.unbinds.load(Ordering::SeqCst)
    }

    pub fn connector(&self) -> Arc<dyn DirectoryConnector> {
        Arc::new(self.clone())
    }

    pub fn probe(&self) -> Arc<dyn ReadinessProbe> {
        Arc::new(self.clone())
    }
}

pub fn user_dn(uid: &str) -> String {
    format!("uid={},ou=users,{}", uid, ROOT)
}

#[async_trait]
impl ReadinessProbe for MockDirectory {
    async fn probe(&self, endpoint: &ServerEndpoint, _timeout: Duration) -> Result<(), ProtocolError> {
        let mut state = self.state.lock();
        state.probes.push(endpoint.host.clone());
        if state.unreachable.contains(&endpoint.host) {
            return Err(ProtocolError::Unreachable {
                endpoint: endpoint.url(),
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryConnector for MockDirectory {
    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        _tls: &TlsOptions,
        _timeout: Duration,
    ) -> Result<Box<dyn DirectoryConnection>, ProtocolError> {
        {
            let mut state = self.state.lock();
            state.connects.push(endpoint.host.clone());
            if state.refusing.contains(&endpoint.host) {
                return Err(ProtocolError::Connect {
                    endpoint: endpoint.url(),
                    message: "handshake failed".to_string(),
                });
            }
        }
        Ok(Box::new(MockConnection {
            directory: self.clone(),
        }))
    }
}

struct MockConnection {
    directory: MockDirectory,
}

#[async_trait]
impl DirectoryConnection for MockConnection {
    async fn bind(&self, dn: &str, password: &str) -> Result<(), ProtocolError> {
        let state = self.directory.state.lock();
        match state.passwords.get(&dn.to_ascii_lowercase()) {
            Some(expected) if expected == password => Ok(()),
            _ => Err(ProtocolError::Bind {
                rc: RC_INVALID_CREDENTIALS,
                message: "invalid credentials".to_string(),
            }),
        }
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirEntry>, ProtocolError> {
        // Let concurrent searches interleave.
        tokio::task::yield_now().await;

        let mut state = self.directory.state.lock();
        state.searches.push(request.clone());

        let base = request.base.to_ascii_lowercase();
        if state.failing_bases.contains(&base) {
            return Err(ProtocolError::Search {
                rc: 1,
                message: "operations error".to_string(),
            });
        }

        let in_scope = |entry: &DirEntry| {
            let dn = entry.dn.to_ascii_lowercase();
            match request.scope {
                SearchScope::Base => dn == base,
                SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{}", base)),
            }
        };

        if request.scope == SearchScope::Base
            && !state.entries.iter().any(|e| e.dn.eq_ignore_ascii_case(&request.base))
        {
            return Err(ProtocolError::Search {
                rc: RC_NO_SUCH_OBJECT,
                message: "no such object".to_string(),
            });
        }

        Ok(state
            .entries
            .iter()
            .filter(|e| in_scope(e) && evaluate(&request.filter, e))
            .map(|e| project(e, &request.attributes))
            .collect())
    }

    async fn unbind(&self) {
        self.directory.unbinds.fetch_add(1, Ordering::SeqCst);
    }
}

fn evaluate(filter: &Filter, entry: &DirEntry) -> bool {
    match filter {
        Filter::And(filters) => filters.iter().all(|f| evaluate(f, entry)),
        Filter::Or(filters) => filters.iter().any(|f| evaluate(f, entry)),
        Filter::Equals { attribute, value } => entry
            .values(attribute)
            .iter()
            .any(|v| v.eq_ignore_ascii_case(value)),
        Filter::Present { attribute } => {
            attribute.eq_ignore_ascii_case("objectClass") || !entry.values(attribute).is_empty()
        }
    }
}

fn project(entry: &DirEntry, attributes: &[String]) -> DirEntry {
    if attributes.is_empty() || attributes.iter().any(|a| a == "*") {
        return entry.clone();
    }
    DirEntry {
        dn: entry.dn.clone(),
        attrs: entry
            .attrs
            .iter()
            .filter(|(k, _)| attributes.iter().any(|a| a.eq_ignore_ascii_case(k)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    }
}
