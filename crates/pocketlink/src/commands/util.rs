//! Shared helpers for command handlers.

use std::io::{IsTerminal, Read};
use std::path::Path;

use serde_json::Value;

use crate::cli::BodyArgs;
use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so `--yes` is required.
pub fn confirm(action: &str, message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    let confirmed = dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))?;
    Ok(confirmed)
}

/// Record body from `--data` or `--from-file` (`-` reads stdin).
pub fn read_body(body: &BodyArgs) -> Result<Value, CliError> {
    let (field, raw) = match (&body.data, &body.from_file) {
        (Some(data), _) => ("data", data.clone()),
        (None, Some(path)) => ("from-file", read_source(path)?),
        (None, None) => {
            return Err(CliError::Validation {
                field: "data".into(),
                reason: "either --data or --from-file is required".into(),
            });
        }
    };
    parse_object(field, &raw)
}

fn read_source(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Parse `raw` as a JSON object; records are always objects.
pub fn parse_object(field: &str, raw: &str) -> Result<Value, CliError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("invalid JSON: {e}"),
    })?;
    if !value.is_object() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "expected a JSON object".into(),
        });
    }
    Ok(value)
}
