//! lookup command - show a user's entry

use super::CommandContext;
use anyhow::{Context, Result};

pub async fn execute(ctx: &CommandContext, user: &str, groups: &[String]) -> Result<()> {
    let result = ctx
        .client
        .lookup_user(user, &ctx.call_options(groups))
        .await
        .with_context(|| format!("Lookup of {} failed", user))?;

    ctx.print_result(&result)
}
