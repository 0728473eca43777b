//! Auth command handlers: login, refresh, logout, status.

use std::io::IsTerminal;

use owo_colors::OwoColorize;
use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;

use pocketlink_api::{AuthStore, Client, RecordModel};
use pocketlink_config::ConfigError;
use pocketlink_core::safe_call;

use crate::cli::{AuthArgs, AuthCommand, GlobalOpts};
use crate::config::Target;
use crate::error::CliError;
use crate::output;

/// Snapshot of the stored session, as shown by `auth status`.
#[derive(Debug, Serialize)]
struct SessionStatus {
    profile: String,
    url: String,
    authenticated: bool,
    valid: bool,
    superuser: bool,
    expires_at: Option<String>,
    record_id: Option<String>,
    collection: Option<String>,
    identity: Option<String>,
}

impl SessionStatus {
    fn capture(target: &Target, auth: &AuthStore) -> Self {
        let record = auth.record();
        let field = |key: &str| {
            record
                .as_ref()
                .and_then(|r| r.get(key))
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        Self {
            profile: target.name.clone(),
            url: target.profile.url.clone(),
            authenticated: !auth.token().is_empty(),
            valid: auth.is_valid(),
            superuser: auth.is_superuser(),
            expires_at: auth.expires_at().map(|t| t.to_rfc3339()),
            record_id: field("id"),
            collection: field("collectionName"),
            identity: field("email").or_else(|| field("username")),
        }
    }
}

fn status_detail(s: &SessionStatus, color: bool) -> String {
    let state = match (s.authenticated, s.valid) {
        (false, _) => "signed out".to_owned(),
        (true, true) => "valid".to_owned(),
        (true, false) => "expired".to_owned(),
    };
    let state = match (color, s.valid) {
        (false, _) => state,
        (true, true) => state.green().to_string(),
        (true, false) => state.red().to_string(),
    };

    let mut lines = vec![
        format!("{}   {}", output::label("Profile", color), s.profile),
        format!("{}    {}", output::label("Server", color), s.url),
        format!("{}   {state}", output::label("Session", color)),
    ];
    if let Some(ref identity) = s.identity {
        lines.push(format!("{}  {identity}", output::label("Identity", color)));
    }
    if let (Some(id), Some(collection)) = (&s.record_id, &s.collection) {
        lines.push(format!("{}    {collection}/{id}", output::label("Record", color)));
    }
    if let Some(ref exp) = s.expires_at {
        lines.push(format!("{}   {exp}", output::label("Expires", color)));
    }
    if s.superuser {
        lines.push(format!("{}      superuser", output::label("Role", color)));
    }
    lines.join("\n")
}

/// Password from the usual sources, or an interactive prompt as last resort.
fn password_for(target: &Target) -> Result<SecretString, CliError> {
    match pocketlink_config::resolve_password(&target.profile, &target.name) {
        Ok(password) => Ok(password),
        Err(ConfigError::NoCredentials { .. }) if std::io::stdin().is_terminal() => {
            let password = rpassword::prompt_password("Password: ")?;
            Ok(SecretString::from(password))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_status(client: &Client, target: &Target, global: &GlobalOpts) -> Result<(), CliError> {
    let status = SessionStatus::capture(target, client.auth_store());
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &status,
        |s| status_detail(s, color),
        |s| s.identity.clone().unwrap_or_default(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

pub async fn handle(
    client: &Client,
    target: &Target,
    args: AuthArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        AuthCommand::Login {
            collection,
            identity,
        } => {
            let collection = collection.unwrap_or_else(|| target.profile.auth_collection.clone());
            let identity = match identity {
                Some(identity) => identity,
                None => pocketlink_config::resolve_identity(&target.profile, &target.name)?,
            };
            let password = password_for(target)?;

            let auth = safe_call(
                client
                    .collection(&collection)
                    .auth_with_password::<RecordModel>(&identity, &password),
            )
            .await?;
            tracing::info!(record = %auth.record.id, %collection, "signed in");

            if !target.saved && !global.quiet {
                eprintln!("Session is not persisted: profile '{}' is not saved", target.name);
            }
            print_status(client, target, global)
        }

        AuthCommand::Refresh { collection } => {
            if client.auth_store().token().is_empty() {
                return Err(CliError::AuthFailed {
                    message: "no stored session to refresh".into(),
                });
            }
            let collection = collection.unwrap_or_else(|| target.profile.auth_collection.clone());
            safe_call(client.collection(&collection).auth_refresh::<Value>()).await?;
            print_status(client, target, global)
        }

        AuthCommand::Logout => {
            client.auth_store().clear();
            if !global.quiet {
                eprintln!("Signed out of profile '{}'", target.name);
            }
            Ok(())
        }

        AuthCommand::Status => print_status(client, target, global),
    }
}
