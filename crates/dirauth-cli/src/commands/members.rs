//! members command - list the members of a group

use super::CommandContext;
use anyhow::{Context, Result};
use colored::Colorize;
use dirauth_core::CallOptions;
use serde::Serialize;
use std::collections::HashSet;

#[derive(Serialize)]
struct MembersResult<'a> {
    group: &'a str,
    members: &'a [String],
}

pub async fn execute(ctx: &CommandContext, group: &str, only: &[String]) -> Result<()> {
    let only: HashSet<String> = only.iter().cloned().collect();
    let filter = if only.is_empty() { None } else { Some(&only) };

    let members = ctx
        .client
        .list_group_members(group, &CallOptions::new(), filter)
        .await
        .with_context(|| format!("Listing members of {} failed", group))?;

    if ctx.is_json() {
        let result = MembersResult {
            group,
            members: &members,
        };
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} ({})", group.blue().bold(), members.len());
        for member in &members {
            println!("  {}", member);
        }
    }

    Ok(())
}
