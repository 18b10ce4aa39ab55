//! Directory protocol adapter interface
//!
//! The engine never speaks the wire protocol itself. It drives connections
//! through these traits; [`crate::ldap::Ldap3Connector`] is the production
//! implementation and tests plug in an in-memory directory.

use async_trait::async_trait;
use dirauth_core::{ServerEndpoint, TlsOptions};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::ldap::filter::Filter;

/// Search scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the base entry
    Base,
    /// The base entry and everything below it
    Subtree,
}

/// A single search request
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: Filter,
    /// Requested attributes; empty requests all user attributes
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(base: impl Into<String>, scope: SearchScope, filter: Filter) -> Self {
        Self {
            base: base.into(),
            scope,
            filter,
            attributes: Vec::new(),
        }
    }

    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// One entry returned by a search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirEntry {
    /// Values of an attribute; names compare case-insensitively
    pub fn values(&self, name: &str) -> &[String] {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(|s| s.as_str())
    }
}

/// Failures reported by the protocol adapter
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("{endpoint}: not reachable: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("{endpoint}: connection failed: {message}")]
    Connect { endpoint: String, message: String },

    #[error("bind rejected (rc={rc}): {message}")]
    Bind { rc: u32, message: String },

    #[error("search failed (rc={rc}): {message}")]
    Search { rc: u32, message: String },

    #[error("connection closed: {0}")]
    Closed(String),
}

/// Result code the directory returns for wrong credentials
pub const RC_INVALID_CREDENTIALS: u32 = 49;

/// Result code for a search base that does not exist
pub const RC_NO_SUCH_OBJECT: u32 = 32;

/// Opens protocol-level connections
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Check TLS settings before any endpoint is leased
    fn prepare(&self, _tls: &TlsOptions) -> dirauth_core::Result<()> {
        Ok(())
    }

    async fn connect(
        &self,
        endpoint: &ServerEndpoint,
        tls: &TlsOptions,
        timeout: Duration,
    ) -> Result<Box<dyn DirectoryConnection>, ProtocolError>;
}

/// A live connection. Methods take `&self` so independent searches can be
/// issued concurrently on one connection.
#[async_trait]
pub trait DirectoryConnection: Send + Sync {
    async fn bind(&self, dn: &str, password: &str) -> Result<(), ProtocolError>;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<DirEntry>, ProtocolError>;

    /// Close the connection; errors are not reported
    async fn unbind(&self);
}

/// TCP readiness check run before a protocol connection is opened
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn probe(&self, endpoint: &ServerEndpoint, timeout: Duration) -> Result<(), ProtocolError>;
}
