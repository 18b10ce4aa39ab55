//! auth command - verify a user's password and group membership

use super::CommandContext;
use anyhow::{Context, Result};
use colored::Colorize;

pub async fn execute(
    ctx: &CommandContext,
    user: &str,
    password: Option<String>,
    groups: &[String],
) -> Result<()> {
    let password = password.context("Password required. Use --password or set DIRAUTH_PASSWORD")?;

    let result = ctx
        .client
        .authenticate(user, &password, &ctx.call_options(groups))
        .await
        .with_context(|| format!("Authentication of {} failed", user))?;

    if !ctx.is_json() {
        println!("{} {}", "Authenticated".green().bold(), user);
    }
    ctx.print_result(&result)
}
