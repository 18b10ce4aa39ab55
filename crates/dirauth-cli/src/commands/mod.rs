//! CLI command implementations

pub mod auth;
pub mod lookup;
pub mod members;
pub mod sync;

use crate::OutputFormat;
use anyhow::Result;
use colored::Colorize;
use dirauth_auth::DirectoryClient;
use dirauth_core::{AuthResult, CallOptions, DirectoryConfig};

/// Context passed to all commands
pub struct CommandContext {
    pub client: DirectoryClient,
    pub output_format: OutputFormat,
}

impl CommandContext {
    pub fn new(config: DirectoryConfig, output_format: OutputFormat) -> Result<Self> {
        Ok(Self {
            client: DirectoryClient::new(config)?,
            output_format,
        })
    }

    /// Check if output should be JSON
    pub fn is_json(&self) -> bool {
        matches!(self.output_format, OutputFormat::Json)
    }

    /// Call options for the groups given on the command line; none keeps
    /// the configured default groups.
    pub fn call_options(&self, groups: &[String]) -> CallOptions {
        if groups.is_empty() {
            CallOptions::new()
        } else {
            CallOptions::new().with_groups(groups.iter().map(String::as_str))
        }
    }

    /// Print one result as JSON or text
    pub fn print_result(&self, result: &AuthResult) -> Result<()> {
        if self.is_json() {
            println!("{}", serde_json::to_string_pretty(result)?);
        } else {
            print_text(result);
        }
        Ok(())
    }
}

fn print_text(result: &AuthResult) {
    match &result.user.dn {
        Some(dn) => println!("{}", dn.blue().bold()),
        None => println!("{}", "(no entry returned)".dimmed()),
    }
    for (name, value) in &result.user.attributes {
        println!("  {}: {}", name.cyan(), value);
    }
    if let Some(groups) = &result.groups {
        let list = if groups.is_empty() {
            "-".to_string()
        } else {
            groups.join(", ")
        };
        println!("  {}: {}", "groups".cyan(), list);
    }
}
