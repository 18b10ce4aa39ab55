//! sync command - fetch several users and their memberships at once

use super::CommandContext;
use anyhow::{Context, Result};
use colored::Colorize;

pub async fn execute(ctx: &CommandContext, users: &[String], groups: &[String]) -> Result<()> {
    let results = ctx
        .client
        .sync_users(users, &ctx.call_options(groups))
        .await
        .context("User sync failed")?;

    if ctx.is_json() {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    for result in &results {
        ctx.print_result(result)?;
        println!();
    }

    if results.len() < users.len() {
        println!(
            "{}",
            format!("{} of {} users found", results.len(), users.len()).yellow()
        );
    }

    Ok(())
}
