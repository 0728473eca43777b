// Wire types shared by the pipeline, the record service and realtime.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};

// ── Error envelope ───────────────────────────────────────────────────

/// Error body returned by PocketBase for non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Newer servers name this field `status`.
    #[serde(alias = "status")]
    pub code: i64,
    pub message: String,
    /// Per-field validation details, when present.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl ErrorEnvelope {
    /// Envelope used when the body could not be decoded.
    pub fn synthetic(status: u16, reason: &str) -> Self {
        Self {
            code: i64::from(status),
            message: reason.to_owned(),
            data: Value::Null,
        }
    }

    /// Field names flagged by a validation failure (`data.<field>`).
    pub fn invalid_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .data
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        fields.sort();
        fields
    }
}

// ── Pagination ───────────────────────────────────────────────────────

/// Pagination envelope produced by list endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResult<T> {
    pub page: u32,
    pub per_page: u32,
    /// `-1` when the request was sent with `skipTotal`.
    pub total_items: i64,
    pub total_pages: i64,
    pub items: Vec<T>,
}

/// Query options accepted by the list endpoints.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub sort: Option<String>,
    pub filter: Option<String>,
    pub expand: Option<String>,
    pub fields: Option<String>,
    /// Skip the `COUNT(*)` query; totals come back as `-1`.
    pub skip_total: bool,
}

impl ListOptions {
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }

    /// Render as query pairs, in a stable order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        let optional = [
            ("sort", &self.sort),
            ("filter", &self.filter),
            ("expand", &self.expand),
            ("fields", &self.fields),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                query.push((key.to_owned(), v.clone()));
            }
        }
        if self.skip_total {
            query.push(("skipTotal".to_owned(), "1".to_owned()));
        }
        query
    }
}

// ── Records ──────────────────────────────────────────────────────────

/// A single record with the system fields pulled out and everything else
/// kept in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordModel {
    pub id: String,
    #[serde(default)]
    pub collection_id: String,
    #[serde(default)]
    pub collection_name: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl RecordModel {
    /// Look up a non-system field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String value of a non-system field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }
}

/// Response of `auth-with-password` and `auth-refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse<T = RecordModel> {
    pub token: String,
    pub record: T,
    /// OAuth2 metadata and similar extras.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// `GET /api/health` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Value,
}

// ── Realtime ─────────────────────────────────────────────────────────

/// Change kind carried by a realtime record event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RealtimeAction {
    Create,
    Update,
    Delete,
}

/// A decoded realtime record change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEvent {
    /// The topic the event was routed on (`posts` or `posts/abc123`).
    pub topic: String,
    pub action: RealtimeAction,
    pub record: Value,
}

/// Wire shape of a record event payload.
#[derive(Deserialize)]
struct RealtimePayload {
    action: RealtimeAction,
    record: Value,
}

impl RealtimeEvent {
    /// Decode the `data:` payload of an SSE frame routed on `topic`.
    ///
    /// Accepts the `{action, record}` envelope. A bare object is taken as
    /// the record itself, with the action read from the topic's last path
    /// segment when it names one, otherwise `update`.
    pub fn decode(topic: &str, payload: Value) -> Self {
        if payload.get("action").is_some() && payload.get("record").is_some() {
            if let Ok(p) = serde_json::from_value::<RealtimePayload>(payload.clone()) {
                return Self {
                    topic: topic.to_owned(),
                    action: p.action,
                    record: p.record,
                };
            }
        }

        let action = topic
            .rsplit('/')
            .next()
            .and_then(|segment| segment.parse().ok())
            .unwrap_or(RealtimeAction::Update);

        Self {
            topic: topic.to_owned(),
            action,
            record: payload,
        }
    }
}

/// What a low-level realtime listener receives.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeMessage {
    /// Connection established; carries the id used to register topics.
    Connected { client_id: String },
    /// A change on a subscribed topic.
    Record(RealtimeEvent),
}
