//! `health` command handler.

use owo_colors::OwoColorize;

use pocketlink_api::{Client, HealthStatus};
use pocketlink_core::{RetryPolicy, with_retry};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

fn detail(status: &HealthStatus, url: &str, color: bool) -> String {
    let state = if color {
        status.message.green().to_string()
    } else {
        status.message.clone()
    };
    format!("{url}  {state} ({})", status.code)
}

pub async fn handle(client: &Client, global: &GlobalOpts) -> Result<(), CliError> {
    let status = with_retry(&RetryPolicy::default(), || client.health()).await?;
    tracing::debug!(code = status.code, "health check passed");

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &status,
        |s| detail(s, client.base_url(), color),
        |s| s.message.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
