//! Directory authentication for Dirauth
//!
//! Authenticates users against a pool of replicated directory servers,
//! authorizes them by group membership and synchronizes users in bulk.

pub mod ldap;
pub mod metrics;

pub use ldap::{
    ConnectionBroker, DirEntry, DirectoryClient, DirectoryConnection, DirectoryConnector,
    Filter, GroupResolver, Lease, Ldap3Connector, Member, ProtocolError, ReadinessProbe,
    SearchRequest, SearchScope, TcpProbe,
};
