//! Configuration for Dirauth
//!
//! [`DirectoryConfig`] holds instance-level defaults. Every public operation
//! also takes a [`CallOptions`] whose set fields win over the instance values;
//! [`DirectoryConfig::merge`] produces the [`EffectiveOptions`] an operation
//! actually runs with.

use crate::types::{GroupSpec, ResolvedGroup};
use crate::{Error, Result, DEFAULT_CONNECT_TIMEOUT_MS};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DirectoryConfig {
    /// Candidate servers, e.g. `ldaps://ldap1.example.com`
    pub servers: Vec<String>,

    /// Naming context appended to every container, e.g. `dc=example,dc=com`
    pub root_suffix: String,

    #[serde(default = "default_users_container")]
    pub users_container: String,

    /// Attribute naming users in their DN and in self searches
    #[serde(default = "default_user_id_attribute")]
    pub user_id_attribute: String,

    #[serde(default = "default_groups_container")]
    pub groups_container: String,

    #[serde(default = "default_group_member_attribute")]
    pub group_member_attribute: String,

    /// Groups checked when a call does not name its own
    #[serde(default)]
    pub default_groups: Vec<GroupSpec>,

    /// TCP readiness probe timeout
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default)]
    pub tls: TlsOptions,

    /// One compound search instead of one search per group
    #[serde(default)]
    pub use_simplified_group_search: bool,

    /// Attach the matched group list to results
    #[serde(default)]
    pub include_groups_in_result: bool,

    /// Attributes fetched for users; empty fetches all user attributes
    #[serde(default)]
    pub user_attributes: Vec<String>,

    /// Bind identity for lookup, member listing and sync
    #[serde(default)]
    pub service_account: Option<ServiceAccount>,
}

fn default_users_container() -> String {
    "ou=users".to_string()
}

fn default_user_id_attribute() -> String {
    "uid".to_string()
}

fn default_groups_container() -> String {
    "ou=groups".to_string()
}

fn default_group_member_attribute() -> String {
    "member".to_string()
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// TLS settings handed to the protocol adapter
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TlsOptions {
    /// Upgrade plain connections with STARTTLS
    #[serde(default)]
    pub starttls: bool,

    /// Skip certificate verification (testing only)
    #[serde(default)]
    pub skip_verify: bool,

    /// PEM file with the CA certificates trusted for server certificates.
    /// When CA material is given it replaces the system roots.
    #[serde(default)]
    pub ca_cert_path: Option<PathBuf>,

    /// Inline PEM CA certificates, added to those from `ca_cert_path`
    #[serde(default)]
    pub ca_cert_pem: Option<String>,

    /// PEM certificate chain presented to the server
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,

    /// PEM private key for `client_cert_path`
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
}

impl TlsOptions {
    pub fn has_ca_material(&self) -> bool {
        self.ca_cert_path.is_some() || self.ca_cert_pem.is_some()
    }

    pub fn has_client_cert(&self) -> bool {
        self.client_cert_path.is_some()
    }

    /// Whether the adapter needs a TLS configuration of its own
    pub fn has_custom_material(&self) -> bool {
        self.has_ca_material() || self.has_client_cert()
    }

    /// Check that the settings fit together. Files are not read here.
    pub fn validate(&self) -> Result<()> {
        match (&self.client_cert_path, &self.client_key_path) {
            (Some(_), None) => {
                return Err(Error::InvalidConfig(
                    "client certificate given without a private key".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(Error::InvalidConfig(
                    "client private key given without a certificate".to_string(),
                ))
            }
            _ => {}
        }

        if self.skip_verify && self.has_client_cert() {
            return Err(Error::InvalidConfig(
                "client certificates cannot be combined with skip_verify".to_string(),
            ));
        }

        Ok(())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServiceAccount {
    pub bind_dn: String,
    pub password: String,
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"***REDACTED***")
            .finish()
    }
}

/// Per-call overrides; `None` keeps the instance value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CallOptions {
    #[serde(default)]
    pub servers: Option<Vec<String>>,
    #[serde(default)]
    pub root_suffix: Option<String>,
    #[serde(default)]
    pub users_container: Option<String>,
    #[serde(default)]
    pub user_id_attribute: Option<String>,
    #[serde(default)]
    pub groups_container: Option<String>,
    #[serde(default)]
    pub group_member_attribute: Option<String>,
    #[serde(default)]
    pub search_groups: Option<Vec<GroupSpec>>,
    #[serde(default)]
    pub tls: Option<TlsOptions>,
    #[serde(default)]
    pub use_simplified_group_search: Option<bool>,
    #[serde(default)]
    pub include_groups_in_result: Option<bool>,
    #[serde(default)]
    pub user_attributes: Option<Vec<String>>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_groups<I, G>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = G>,
        G: Into<GroupSpec>,
    {
        self.search_groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_servers<I, S>(mut self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.servers = Some(servers.into_iter().map(Into::into).collect());
        self
    }

    pub fn include_groups(mut self, include: bool) -> Self {
        self.include_groups_in_result = Some(include);
        self
    }

    pub fn simplified(mut self, simplified: bool) -> Self {
        self.use_simplified_group_search = Some(simplified);
        self
    }
}

/// Options an operation runs with after merging
#[derive(Debug, Clone)]
pub struct EffectiveOptions {
    /// Server override; `None` means the client's default pool
    pub servers: Option<Vec<String>>,
    pub root_suffix: String,
    pub users_container: String,
    pub user_id_attribute: String,
    pub groups_container: String,
    pub group_member_attribute: String,
    pub search_groups: Vec<GroupSpec>,
    pub tls: TlsOptions,
    pub use_simplified_group_search: bool,
    pub include_groups_in_result: bool,
    pub user_attributes: Vec<String>,
    pub service_account: Option<ServiceAccount>,
    pub connect_timeout: Duration,
}

impl EffectiveOptions {
    /// Base DN of the user container
    pub fn users_base(&self) -> String {
        join_dn(&self.users_container, &self.root_suffix)
    }

    /// Base DN of a group container
    pub fn groups_base(&self, container: &str) -> String {
        join_dn(container, &self.root_suffix)
    }

    pub fn wants_groups(&self) -> bool {
        !self.search_groups.is_empty()
    }

    /// Validate every group spec against the merged defaults.
    pub fn resolve_groups(&self) -> Result<Vec<ResolvedGroup>> {
        self.search_groups
            .iter()
            .map(|spec| {
                spec.resolve(
                    &self.groups_container,
                    &self.group_member_attribute,
                    &self.user_id_attribute,
                )
            })
            .collect()
    }
}

/// Join a relative container and the root suffix into one DN
pub fn join_dn(container: &str, root_suffix: &str) -> String {
    let container = container.trim().trim_end_matches(',');
    let root_suffix = root_suffix.trim().trim_start_matches(',');
    match (container.is_empty(), root_suffix.is_empty()) {
        (true, _) => root_suffix.to_string(),
        (false, true) => container.to_string(),
        (false, false) => format!("{},{}", container, root_suffix),
    }
}

impl DirectoryConfig {
    pub fn new(servers: Vec<String>, root_suffix: impl Into<String>) -> Self {
        Self {
            servers,
            root_suffix: root_suffix.into(),
            users_container: default_users_container(),
            user_id_attribute: default_user_id_attribute(),
            groups_container: default_groups_container(),
            group_member_attribute: default_group_member_attribute(),
            default_groups: Vec::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            tls: TlsOptions::default(),
            use_simplified_group_search: false,
            include_groups_in_result: false,
            user_attributes: Vec::new(),
            service_account: None,
        }
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::InvalidConfig(format!("Failed to read config {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config {}: {}", path, e)))
    }

    /// Build from `DIRAUTH_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::new(Vec::new(), String::new());
        config.apply_env();
        config
    }

    /// Override fields from the environment where the variables are set
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Override fields from `DIRAUTH_*` values returned by `lookup`
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(servers) = lookup("DIRAUTH_SERVERS") {
            let servers: Vec<String> = servers
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !servers.is_empty() {
                self.servers = servers;
            }
        }
        if let Some(root) = lookup("DIRAUTH_ROOT_SUFFIX") {
            self.root_suffix = root;
        }
        if let Some(container) = lookup("DIRAUTH_USERS_CONTAINER") {
            self.users_container = container;
        }
        if let Some(attr) = lookup("DIRAUTH_USER_ID_ATTRIBUTE") {
            self.user_id_attribute = attr;
        }
        if let Some(container) = lookup("DIRAUTH_GROUPS_CONTAINER") {
            self.groups_container = container;
        }
        if let Some(attr) = lookup("DIRAUTH_GROUP_MEMBER_ATTRIBUTE") {
            self.group_member_attribute = attr;
        }
        if let Some(timeout) = lookup("DIRAUTH_CONNECT_TIMEOUT_MS") {
            match timeout.parse() {
                Ok(ms) => self.connect_timeout_ms = ms,
                Err(_) => warn!("Ignoring invalid DIRAUTH_CONNECT_TIMEOUT_MS: {}", timeout),
            }
        }
        if let (Some(bind_dn), Some(password)) =
            (lookup("DIRAUTH_BIND_DN"), lookup("DIRAUTH_BIND_PASSWORD"))
        {
            self.service_account = Some(ServiceAccount { bind_dn, password });
        }
        if let Some(path) = lookup("DIRAUTH_TLS_CA_CERT") {
            self.tls.ca_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("DIRAUTH_TLS_CLIENT_CERT") {
            self.tls.client_cert_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("DIRAUTH_TLS_CLIENT_KEY") {
            self.tls.client_key_path = Some(PathBuf::from(path));
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::InvalidServerList(
                "at least one server must be configured".to_string(),
            ));
        }

        if self.root_suffix.trim().is_empty() {
            return Err(Error::InvalidConfig("root suffix is required".to_string()));
        }

        if self.user_id_attribute.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "user id attribute must not be empty".to_string(),
            ));
        }

        if self.group_member_attribute.trim().is_empty() {
            return Err(Error::InvalidConfig(
                "group member attribute must not be empty".to_string(),
            ));
        }

        if self.connect_timeout_ms == 0 {
            return Err(Error::InvalidConfig(
                "connect timeout must be greater than zero".to_string(),
            ));
        }

        self.tls.validate()
    }

    /// Merge per-call overrides over the instance defaults (call level wins).
    pub fn merge(&self, call: &CallOptions) -> EffectiveOptions {
        EffectiveOptions {
            servers: call.servers.clone(),
            root_suffix: call
                .root_suffix
                .clone()
                .unwrap_or_else(|| self.root_suffix.clone()),
            users_container: call
                .users_container
                .clone()
                .unwrap_or_else(|| self.users_container.clone()),
            user_id_attribute: call
                .user_id_attribute
                .clone()
                .unwrap_or_else(|| self.user_id_attribute.clone()),
            groups_container: call
                .groups_container
                .clone()
                .unwrap_or_else(|| self.groups_container.clone()),
            group_member_attribute: call
                .group_member_attribute
                .clone()
                .unwrap_or_else(|| self.group_member_attribute.clone()),
            search_groups: call
                .search_groups
                .clone()
                .unwrap_or_else(|| self.default_groups.clone()),
            tls: call.tls.clone().unwrap_or_else(|| self.tls.clone()),
            use_simplified_group_search: call
                .use_simplified_group_search
                .unwrap_or(self.use_simplified_group_search),
            include_groups_in_result: call
                .include_groups_in_result
                .unwrap_or(self.include_groups_in_result),
            user_attributes: call
                .user_attributes
                .clone()
                .unwrap_or_else(|| self.user_attributes.clone()),
            service_account: self.service_account.clone(),
            connect_timeout: self.connect_timeout(),
        }
    }
}
