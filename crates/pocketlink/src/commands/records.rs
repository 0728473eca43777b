//! Records command handlers.

use serde_json::Value;
use tabled::Tabled;

use pocketlink_api::{Client, ListOptions, RecordModel};
use pocketlink_core::{RetryPolicy, safe_call, with_retry};

use crate::cli::{GlobalOpts, ListArgs, OutputFormat, RecordsArgs, RecordsCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ────────────────────────────────────────────────────────

#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Updated")]
    updated: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

fn row(r: &RecordModel) -> RecordRow {
    RecordRow {
        id: r.id.clone(),
        updated: r.updated.clone().unwrap_or_default(),
        fields: output::truncate(&field_summary(r)),
    }
}

/// `key=value` pairs of the non-system fields, in record order.
fn field_summary(record: &RecordModel) -> String {
    record
        .fields
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| format!("{k}={}", output::scalar(v)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn detail(record: &RecordModel, color: bool) -> String {
    let value = serde_json::to_value(record).unwrap_or(Value::Null);
    output::format_object(&value, color)
}

fn list_options(args: &ListArgs) -> ListOptions {
    ListOptions {
        sort: args.sort.clone(),
        filter: args.filter.clone(),
        expand: args.expand.clone(),
        fields: args.fields.clone(),
        skip_total: false,
    }
}

fn print_record(record: &RecordModel, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        record,
        |r| detail(r, color),
        |r| r.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(client: &Client, args: RecordsArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let policy = RetryPolicy::default();

    match args.command {
        RecordsCommand::List { collection, list } => {
            let service = client.collection(&collection);
            let options = list_options(&list);
            let (service, opts) = (&service, &options);

            let (records, footer) = if list.all {
                let all: Vec<RecordModel> =
                    with_retry(&policy, move || service.get_full_list(list.per_page, opts)).await?;
                let footer = format!("{} records", all.len());
                (all, footer)
            } else {
                let (page, per_page) = (list.page, list.per_page);
                let result = with_retry(&policy, move || {
                    service.get_list::<RecordModel>(page, per_page, opts)
                })
                .await?;
                let footer = format!(
                    "Page {}/{} ({} records)",
                    result.page,
                    result.total_pages.max(1),
                    result.total_items.max(0)
                );
                (result.items, footer)
            };

            let out = output::render_list(&global.output, &records, row, |r| {
                r.id.clone()
            })?;
            output::print_output(&out, global.quiet);
            if matches!(global.output, OutputFormat::Table) && !global.quiet {
                eprintln!("{footer}");
            }
            Ok(())
        }

        RecordsCommand::Get {
            collection,
            id,
            expand,
            fields,
        } => {
            let service = client.collection(&collection);
            let options = ListOptions {
                expand,
                fields,
                ..ListOptions::default()
            };
            let (service, opts, id) = (&service, &options, id.as_str());
            let record: RecordModel =
                with_retry(&policy, move || service.get_one_with(id, opts)).await?;
            print_record(&record, global)
        }

        RecordsCommand::Create { collection, body } => {
            let body = util::read_body(&body)?;
            let record: RecordModel = safe_call(client.collection(&collection).create(&body)).await?;
            if !global.quiet {
                eprintln!("Created {}/{}", collection, record.id);
            }
            print_record(&record, global)
        }

        RecordsCommand::Update {
            collection,
            id,
            body,
        } => {
            let body = util::read_body(&body)?;
            let record: RecordModel =
                safe_call(client.collection(&collection).update(&id, &body)).await?;
            print_record(&record, global)
        }

        RecordsCommand::Delete { collection, id } => {
            let prompt = format!("Delete record {id} from '{collection}'?");
            if !util::confirm("records delete", &prompt, global.yes)? {
                return Ok(());
            }
            safe_call(client.collection(&collection).delete(&id)).await?;
            if !global.quiet {
                eprintln!("Deleted {collection}/{id}");
            }
            Ok(())
        }
    }
}
