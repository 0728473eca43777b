// Record service
//
// Typed facade binding one collection name to the request pipeline and
// the realtime manager. Paths follow PocketBase's record API:
// `/api/collections/{collection}/records[/{id}]`.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::Error;
use crate::models::{AuthResponse, ErrorEnvelope, ListOptions, ListResult, RealtimeMessage};
use crate::pipeline::{Pipeline, RequestOptions, encode_component};
use crate::realtime::{RealtimeService, Subscription};

/// Page size used by [`RecordService::get_full_list`] when none is given.
pub const DEFAULT_BATCH_SIZE: u32 = 500;

/// CRUD, auth and realtime operations for a single collection.
#[derive(Debug, Clone)]
pub struct RecordService {
    pipeline: Arc<Pipeline>,
    realtime: RealtimeService,
    collection: String,
}

impl RecordService {
    pub(crate) fn new(
        pipeline: Arc<Pipeline>,
        realtime: RealtimeService,
        collection: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            realtime,
            collection: collection.into(),
        }
    }

    /// The collection id or name this service is bound to.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    // ── Paths ────────────────────────────────────────────────────────

    fn collection_path(&self) -> String {
        format!("/api/collections/{}", encode_component(&self.collection))
    }

    fn records_path(&self) -> String {
        format!("{}/records", self.collection_path())
    }

    fn record_path(&self, id: &str) -> String {
        format!("{}/{}", self.records_path(), encode_component(id))
    }

    // ── CRUD ─────────────────────────────────────────────────────────

    /// Fetch one page of records.
    pub async fn get_list<T: DeserializeOwned>(
        &self,
        page: u32,
        per_page: u32,
        options: &ListOptions,
    ) -> Result<ListResult<T>, Error> {
        let request = RequestOptions::get()
            .with_query("page", page.to_string())
            .with_query("perPage", per_page.to_string())
            .with_query_pairs(options.to_query());
        self.pipeline.send_as(&self.records_path(), request).await
    }

    /// Fetch every record, `batch` at a time, until a short page arrives.
    pub async fn get_full_list<T: DeserializeOwned>(
        &self,
        batch: u32,
        options: &ListOptions,
    ) -> Result<Vec<T>, Error> {
        let batch = if batch == 0 { DEFAULT_BATCH_SIZE } else { batch };
        let options = ListOptions {
            skip_total: true,
            ..options.clone()
        };

        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let result: ListResult<T> = self.get_list(page, batch, &options).await?;
            let received = result.items.len();
            items.extend(result.items);
            debug!(page, received, "fetched record page");

            if u32::try_from(received).map_or(true, |n| n < batch) {
                break;
            }
            page += 1;
        }
        Ok(items)
    }

    /// The first record matching `filter`, or a 404 response error.
    pub async fn get_first_list_item<T: DeserializeOwned>(
        &self,
        filter: &str,
        options: &ListOptions,
    ) -> Result<T, Error> {
        let options = ListOptions {
            skip_total: true,
            ..options.clone()
        }
        .filter(filter);

        let result: ListResult<T> = self.get_list(1, 1, &options).await?;
        result.items.into_iter().next().ok_or_else(|| Error::Response {
            url: self.pipeline.build_url(&self.records_path(), &options.to_query()),
            status: 404,
            envelope: ErrorEnvelope::synthetic(404, "The requested resource wasn't found."),
        })
    }

    /// Fetch a single record by id.
    pub async fn get_one<T: DeserializeOwned>(&self, id: &str) -> Result<T, Error> {
        self.get_one_with(id, &ListOptions::default()).await
    }

    /// Fetch a single record by id with `expand`/`fields` options.
    pub async fn get_one_with<T: DeserializeOwned>(
        &self,
        id: &str,
        options: &ListOptions,
    ) -> Result<T, Error> {
        let request = RequestOptions::get().with_query_pairs(options.to_query());
        self.pipeline.send_as(&self.record_path(id), request).await
    }

    /// Create a record from any serializable body.
    pub async fn create<T: DeserializeOwned>(&self, body: &impl Serialize) -> Result<T, Error> {
        let request = RequestOptions::post(body)?;
        self.pipeline.send_as(&self.records_path(), request).await
    }

    /// Patch a record. Updating the signed-in auth record refreshes the
    /// record held by the auth store.
    pub async fn update<T: DeserializeOwned>(
        &self,
        id: &str,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        let request = RequestOptions::patch(body)?;
        let value: Value = self.pipeline.send_as(&self.record_path(id), request).await?;

        if self.is_current_auth_record(id) {
            let auth = self.pipeline.auth_store();
            auth.save(auth.token(), Some(value.clone()));
        }

        decode_value(value)
    }

    /// Delete a record. Deleting the signed-in auth record clears the
    /// auth store.
    pub async fn delete(&self, id: &str) -> Result<(), Error> {
        self.pipeline
            .send_empty(&self.record_path(id), RequestOptions::delete())
            .await?;

        if self.is_current_auth_record(id) {
            self.pipeline.auth_store().clear();
        }
        Ok(())
    }

    fn is_current_auth_record(&self, id: &str) -> bool {
        let Some(record) = self.pipeline.auth_store().record() else {
            return false;
        };
        let same_id = record.get("id").and_then(Value::as_str) == Some(id);
        let same_collection = ["collectionId", "collectionName"]
            .iter()
            .any(|k| record.get(*k).and_then(Value::as_str) == Some(self.collection.as_str()));
        same_id && same_collection
    }

    // ── Auth ─────────────────────────────────────────────────────────

    /// `POST /api/collections/{c}/auth-with-password`; saves the returned
    /// token and record into the auth store.
    pub async fn auth_with_password<T: DeserializeOwned>(
        &self,
        identity: &str,
        password: &SecretString,
    ) -> Result<AuthResponse<T>, Error> {
        let body = json!({
            "identity": identity,
            "password": password.expose_secret(),
        });
        let path = format!("{}/auth-with-password", self.collection_path());
        debug!(collection = %self.collection, "authenticating with password");
        self.authenticate(&path, RequestOptions::post(&body)?).await
    }

    /// `POST /api/collections/{c}/auth-refresh` with the current token.
    pub async fn auth_refresh<T: DeserializeOwned>(&self) -> Result<AuthResponse<T>, Error> {
        let path = format!("{}/auth-refresh", self.collection_path());
        self.authenticate(&path, RequestOptions::new(reqwest::Method::POST))
            .await
    }

    async fn authenticate<T: DeserializeOwned>(
        &self,
        path: &str,
        request: RequestOptions,
    ) -> Result<AuthResponse<T>, Error> {
        let response: AuthResponse<Value> = self.pipeline.send_as(path, request).await?;
        self.pipeline
            .auth_store()
            .save(response.token.clone(), Some(response.record.clone()));

        Ok(AuthResponse {
            token: response.token,
            record: decode_value(response.record)?,
            meta: response.meta,
        })
    }

    // ── Realtime ─────────────────────────────────────────────────────

    fn topic_for(&self, topic: &str) -> String {
        if topic == "*" {
            self.collection.clone()
        } else {
            format!("{}/{topic}", self.collection)
        }
    }

    /// Subscribe to `"*"` (the whole collection) or a single record id.
    pub async fn subscribe<F>(&self, topic: &str, callback: F) -> Result<Subscription, Error>
    where
        F: Fn(crate::models::RealtimeEvent) + Send + Sync + 'static,
    {
        self.realtime
            .subscribe(self.topic_for(topic), move |message| {
                if let RealtimeMessage::Record(event) = message {
                    callback(event.clone());
                }
            })
            .await
    }

    /// `None` drops every topic of this collection; `Some("*")` the
    /// collection topic; `Some(id)` a single record topic.
    pub async fn unsubscribe(&self, topic: Option<&str>) -> Result<(), Error> {
        match topic {
            None => self.realtime.unsubscribe_by_prefix(&self.collection).await,
            Some(t) => self.realtime.unsubscribe(&self.topic_for(t)).await,
        }
    }
}

fn decode_value<T: DeserializeOwned>(value: Value) -> Result<T, Error> {
    serde_json::from_value(value.clone()).map_err(|e| Error::Deserialization {
        message: e.to_string(),
        body: value.to_string(),
    })
}
