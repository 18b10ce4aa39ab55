//! ldap3-backed protocol adapter
//!
//! Handles LDAP and LDAPS URLs, optional STARTTLS upgrades and custom CA or
//! client certificate material.

use crate::ldap::adapter::*;
use crate::ldap::tls;
use async_trait::async_trait;
use dirauth_core::{ServerEndpoint, TlsOptions};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, Scope, SearchEntry, SearchResult};
use parking_lot::Mutex;
use rustls::ClientConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// Opens connections with the `ldap3` crate.
///
/// TLS configurations built from certificate files are kept per distinct
/// [`TlsOptions`], so files are read once per connector.
#[derive(Default)]
pub struct Ldap3Connector {
    tls_configs: Mutex<HashMap<TlsOptions, Arc<ClientConfig>>>,
}

impl Ldap3Connector {
    pub fn new() -> Self {
        Self::default()
    }

    fn tls_config(&self, tls: &TlsOptions) -> dirauth_core::Result<Option<Arc<ClientConfig>>> {
        if let Some(config) = self.tls_configs.lock().get(tls) {
            return Ok(Some(config.clone()));
        }

        let Some(config) = tls::client_config(tls)? else {
            return Ok(None);
        };
        self.tls_configs.lock().insert(tls.clone(), config.clone());
        Ok(Some(config))
    }
}

#[async_trait]
impl DirectoryConnector for Ldap3Connector {
    fn prepare(&self, tls: &TlsOptions) -> dirauth_core::Result<()> {
        self.tls_config(tls).map(|_| ())
    }

    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        tls: &TlsOptions,
        timeout: Duration,
    ) -> Result<Box<dyn DirectoryConnection>, ProtocolError> {
        let url = endpoint.url();
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_starttls(tls.starttls && !endpoint.scheme.is_secure())
            .set_no_tls_verify(tls.skip_verify);

        let config = self.tls_config(tls).map_err(|e| ProtocolError::Connect {
            endpoint: url.clone(),
            message: e.to_string(),
        })?;
        if let Some(config) = config {
            settings = settings.set_config(config);
        }

        debug!("Connecting to LDAP server: {}", url);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, &url)
            .await
            .map_err(|e| ProtocolError::Connect {
                endpoint: url.clone(),
                message: e.to_string(),
            })?;

        let driver_url = url.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection to {} ended with error: {}", driver_url, e);
            }
        });

        Ok(Box::new(Ldap3Connection { ldap, url }))
    }
}

/// Live `ldap3` connection. Each operation works on a clone of the handle,
/// so concurrent searches share one underlying connection.
struct Ldap3Connection {
    ldap: Ldap,
    url: String,
}

#[async_trait]
impl DirectoryConnection for Ldap3Connection {
    async fn bind(&self, dn: &str, password: &str) -> Result<(), ProtocolError> {
        let mut ldap = self.ldap.clone();
        let result = ldap
            .simple_bind(dn, password)
            .await
            .map_err(|e| ProtocolError::Closed(e.to_string()))?;

        if result.rc != 0 {
            return Err(ProtocolError::Bind {
                rc: result.rc,
                message: result.text,
            });
        }
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirEntry>, ProtocolError> {
        let mut ldap = self.ldap.clone();
        let filter = request.filter.to_string();
        let scope = match request.scope {
            SearchScope::Base => Scope::Base,
            SearchScope::Subtree => Scope::Subtree,
        };
        let attrs: Vec<&str> = request.attributes.iter().map(String::as_str).collect();

        debug!(
            "Searching {} ({:?}) with filter {}",
            request.base, request.scope, filter
        );

        let SearchResult(entries, result) = ldap
            .search(&request.base, scope, &filter, attrs)
            .await
            .map_err(|e| ProtocolError::Closed(e.to_string()))?;

        if result.rc != 0 {
            return Err(ProtocolError::Search {
                rc: result.rc,
                message: result.text,
            });
        }

        Ok(entries
            .into_iter()
            .map(|raw| {
                let entry = SearchEntry::construct(raw);
                DirEntry {
                    dn: entry.dn,
                    attrs: entry.attrs,
                }
            })
            .collect())
    }

    async fn unbind(&self) {
        let mut ldap = self.ldap.clone();
        if let Err(e) = ldap.unbind().await {
            debug!("Unbind from {} failed: {}", self.url, e);
        }
    }
}

/// Plain TCP connect used as a readiness check
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl ReadinessProbe for TcpProbe {
    async fn probe(&self, endpoint: &ServerEndpoint, timeout: Duration) -> Result<(), ProtocolError> {
        let target = (endpoint.host.as_str(), endpoint.port);

        match tokio::time::timeout(timeout, TcpStream::connect(target)).await {
            Ok(Ok(_stream)) => Ok(()),
            Ok(Err(e)) => Err(ProtocolError::Unreachable {
                endpoint: endpoint.url(),
                message: e.to_string(),
            }),
            Err(_) => Err(ProtocolError::Unreachable {
                endpoint: endpoint.url(),
                message: format!("no answer within {}ms", timeout.as_millis()),
            }),
        }
    }
}
