//! Dirauth Core Library
//!
//! Core types, configuration, and errors shared by the directory
//! authentication engine and its command-line front end.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CallOptions, DirectoryConfig, EffectiveOptions, ServiceAccount, TlsOptions};
pub use error::{Error, Result};
pub use types::{AuthResult, EndpointSet, GroupSpec, ResolvedGroup, Scheme, ServerEndpoint, UserRecord};

/// Dirauth version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for plain directory connections
pub const DEFAULT_LDAP_PORT: u16 = 389;

/// Default port for TLS directory connections
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// Default TCP readiness probe timeout in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 300;
