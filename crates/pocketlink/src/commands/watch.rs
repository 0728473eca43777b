//! `watch` command: stream realtime record changes until interrupted.

use std::collections::BTreeSet;
use std::time::Duration;

use owo_colors::OwoColorize;
use serde_json::Value;
use tokio::sync::mpsc;

use pocketlink_api::{Client, RealtimeAction, RealtimeEvent};
use pocketlink_core::{TtlCache, safe_call};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::error::CliError;
use crate::output;

/// Records remembered for update diffs.
const SEEN_CAPACITY: usize = 1024;
const SEEN_TTL: Duration = Duration::from_secs(600);

/// How often the connection task is checked for having given up.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(1);

enum Incoming {
    Event(RealtimeEvent),
    Error(String),
}

fn record_id(record: &Value) -> String {
    record
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// Names of fields whose values differ between two versions of a record.
/// `updated` is ignored since every update touches it.
fn changed_fields(before: &Value, after: &Value) -> Vec<String> {
    let (Some(before), Some(after)) = (before.as_object(), after.as_object()) else {
        return Vec::new();
    };
    let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|k| k.as_str() != "updated" && before.get(*k) != after.get(*k))
        .cloned()
        .collect()
}

fn format_line(event: &RealtimeEvent, changed: Option<&[String]>, color: bool) -> String {
    let id = record_id(&event.record);
    let action = format!("{:<6}", event.action.as_ref());
    let action = match (color, event.action) {
        (false, _) => action,
        (true, RealtimeAction::Create) => action.green().to_string(),
        (true, RealtimeAction::Update) => action.yellow().to_string(),
        (true, RealtimeAction::Delete) => action.red().to_string(),
    };
    let collection = event.topic.split('/').next().unwrap_or_default();
    let time = chrono::Local::now().format("%H:%M:%S");

    let mut line = format!("{time}  {action}  {collection}/{id}");
    if let Some(changed) = changed.filter(|c| !c.is_empty()) {
        line.push_str(&format!("  [{}]", changed.join(", ")));
    }
    line
}

fn render_event(
    event: &RealtimeEvent,
    changed: Option<&[String]>,
    global: &GlobalOpts,
) -> Result<String, CliError> {
    Ok(match global.output {
        OutputFormat::Table => format_line(event, changed, output::should_color(&global.color)),
        // One document per line so the stream can be piped
        OutputFormat::Json | OutputFormat::JsonCompact => serde_json::to_string(event)?,
        OutputFormat::Yaml => format!("---\n{}", serde_yaml::to_string(event)?),
        OutputFormat::Plain => format!("{} {}", event.action, record_id(&event.record)),
    })
}

/// Update the seen-record cache and return the changed fields for updates.
fn track(seen: &TtlCache<String, Value>, event: &RealtimeEvent) -> Option<Vec<String>> {
    let id = record_id(&event.record);
    match event.action {
        RealtimeAction::Delete => {
            seen.remove(&id);
            None
        }
        RealtimeAction::Create => {
            seen.insert(id, event.record.clone());
            None
        }
        RealtimeAction::Update => {
            let changed = seen
                .get(&id)
                .map(|before| changed_fields(&before, &event.record));
            seen.insert(id, event.record.clone());
            changed
        }
    }
}

pub async fn handle(client: &Client, args: WatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::unbounded_channel();

    let error_tx = tx.clone();
    client.realtime().on_error(move |e| {
        let _ = error_tx.send(Incoming::Error(e.to_string()));
    });

    let service = client.collection(&args.collection);
    let topic = args.record.as_deref().unwrap_or("*");
    let subscription = safe_call(service.subscribe(topic, move |event| {
        let _ = tx.send(Incoming::Event(event));
    }))
    .await?;

    if !global.quiet {
        eprintln!("Watching {} (Ctrl-C to stop)", subscription.topic());
    }

    let seen: TtlCache<String, Value> = TtlCache::new(SEEN_CAPACITY, SEEN_TTL);
    let mut received: u64 = 0;
    let mut last_error: Option<String> = None;
    let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),

            _ = liveness.tick() => {
                if !client.realtime().is_running() {
                    break Err(CliError::ConnectionFailed {
                        message: last_error
                            .take()
                            .unwrap_or_else(|| "realtime connection closed".into()),
                    });
                }
                seen.purge_expired();
            }

            message = rx.recv() => match message {
                Some(Incoming::Event(event)) => {
                    let changed = track(&seen, &event);
                    let line = render_event(&event, changed.as_deref(), global)?;
                    output::print_output(&line, global.quiet);

                    received += 1;
                    if args.count.is_some_and(|n| received >= n) {
                        break Ok(());
                    }
                }
                Some(Incoming::Error(message)) => {
                    tracing::warn!(error = %message, "realtime connection error");
                    last_error = Some(message);
                }
                None => break Ok(()),
            },
        }
    };

    if let Err(e) = subscription.unsubscribe().await {
        tracing::debug!(error = %e, "unsubscribe on exit failed");
    }
    outcome
}
