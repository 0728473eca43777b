//! Command dispatch: bridges CLI args to SDK calls and output formatting.

pub mod auth;
pub mod config_cmd;
pub mod health;
pub mod records;
pub mod util;
pub mod watch;

use pocketlink_api::Client;

use crate::cli::{Command, GlobalOpts};
use crate::config::Target;
use crate::error::CliError;

/// Dispatch a server-bound command to its handler.
pub async fn dispatch(
    cmd: Command,
    client: &Client,
    target: &Target,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Records(args) => records::handle(client, args, global).await,
        Command::Auth(args) => auth::handle(client, target, args, global).await,
        Command::Watch(args) => watch::handle(client, args, global).await,
        Command::Health => health::handle(client, global).await,
        // Handled before a client exists
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
