//! Configuration loading for the Dirauth CLI
//!
//! Config file location: ~/.dirauth/config.toml
//!
//! Example config:
//! ```toml
//! servers = ["ldaps://ldap1.example.com", "ldaps://ldap2.example.com"]
//! root_suffix = "dc=example,dc=com"
//! default_groups = ["admins"]
//!
//! [service_account]
//! bind_dn = "cn=reader,dc=example,dc=com"
//! password = "secret"
//! ```
//!
//! `DIRAUTH_*` environment variables override file values; command-line
//! flags override both.

use anyhow::{Context, Result};
use dirauth_core::DirectoryConfig;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Get config directory path
pub fn config_dir() -> Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .context("Could not determine home directory")?
        .home_dir()
        .to_path_buf();

    Ok(home.join(".dirauth"))
}

/// Get config file path
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load configuration from `explicit` or the home config file, then apply
/// environment overrides. Without any file the environment alone is used.
pub fn load(explicit: Option<&str>) -> Result<DirectoryConfig> {
    let path = match explicit {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = config_path()?;
            if !default_path.exists() {
                debug!("No config file at {:?}, using environment only", default_path);
                return Ok(DirectoryConfig::from_env());
            }
            default_path
        }
    };

    let mut config = read_file(&path)?;
    config.apply_env();
    Ok(config)
}

fn read_file(path: &Path) -> Result<DirectoryConfig> {
    DirectoryConfig::from_file(&path.to_string_lossy())
        .with_context(|| format!("Failed to load config file: {:?}", path))
}

/// Apply global command-line flags.
pub fn apply_flags(
    config: &mut DirectoryConfig,
    servers: &[String],
    simplified: bool,
    include_groups: bool,
) {
    if !servers.is_empty() {
        config.servers = servers.to_vec();
    }
    if simplified {
        config.use_simplified_group_search = true;
    }
    if include_groups {
        config.include_groups_in_result = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        let path = config_path().unwrap();
        assert!(path.ends_with(".dirauth/config.toml"));
    }

    #[test]
    fn test_read_file() {
        let path = std::env::temp_dir().join(format!("dirauth-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            servers = ["ldap://ldap1.example.com"]
            root_suffix = "dc=example,dc=com"
            use_simplified_group_search = true
            "#,
        )
        .unwrap();

        let config = read_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.servers, vec!["ldap://ldap1.example.com"]);
        assert!(config.use_simplified_group_search);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = read_file(Path::new("/nonexistent/dirauth.toml")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config"));
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = DirectoryConfig::new(vec!["ldap://a".to_string()], "dc=example");

        apply_flags(&mut config, &[], false, false);
        assert_eq!(config.servers, vec!["ldap://a"]);
        assert!(!config.include_groups_in_result);

        apply_flags(&mut config, &["ldap://b".to_string()], true, true);
        assert_eq!(config.servers, vec!["ldap://b"]);
        assert!(config.use_simplified_group_search);
        assert!(config.include_groups_in_result);
    }
}
