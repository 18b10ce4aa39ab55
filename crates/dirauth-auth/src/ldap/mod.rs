//! LDAP directory access
//!
//! - Connection brokering across replicas with failover
//! - Simple bind authentication
//! - Group authorization (per-group or combined search)
//! - Bulk user sync
//! - TLS/STARTTLS through `ldap3`, with optional CA and client certificates

mod adapter;
mod broker;
mod client;
mod connection;
mod groups;
mod session;
mod sync;
mod tls;

pub mod dn;
pub mod filter;

#[cfg(test)]
mod mock;

pub use adapter::{
    DirEntry, DirectoryConnection, DirectoryConnector, ProtocolError, ReadinessProbe,
    SearchRequest, SearchScope, RC_INVALID_CREDENTIALS, RC_NO_SUCH_OBJECT,
};
pub use broker::{ConnectionBroker, Lease};
pub use client::DirectoryClient;
pub use connection::{Ldap3Connector, TcpProbe};
pub use filter::Filter;
pub use groups::{GroupResolver, Member, GROUP_NAME_ATTRIBUTE};
