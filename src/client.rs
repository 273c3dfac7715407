//! Mailbox access: the `MessageStore` contract and its Gmail implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use google_gmail1::api::{BatchModifyMessagesRequest, Label, Message as ApiMessage};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::auth::{GmailHub, MODIFY_SCOPE};
use crate::config::GmailConfig;
use crate::error::{GmailError, Result};
use crate::models::{message_ids, DetailLevel, Message};
use crate::query::ResultCap;

/// Gmail allows up to 1000 ids per batchModify call
const BATCH_SIZE: usize = 1000;

const METADATA_HEADERS: &[&str] = &["From", "Subject", "Date"];

/// The mailbox operations the triage pipeline depends on
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Messages matching `query`, at most `cap` of them
    async fn query_messages(
        &self,
        query: &str,
        cap: ResultCap,
        detail: DetailLevel,
    ) -> Result<Vec<Message>>;

    /// Load the given messages at `detail`, in the order given
    async fn load_messages(&self, ids: &[String], detail: DetailLevel) -> Result<Vec<Message>>;

    /// Add and remove labels (by name) on every message in `ids`
    async fn modify_labels(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<()>;

    /// Move every message in `ids` to the trash
    async fn trash(&self, ids: &[String]) -> Result<()>;
}

/// Label info returned from Gmail API
#[derive(Debug, Clone)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}

/// Two-way label id/name lookup. Name lookups ignore case.
#[derive(Debug, Default)]
pub struct LabelDirectory {
    loaded: bool,
    names_by_id: HashMap<String, String>,
    ids_by_name: HashMap<String, String>,
}

impl LabelDirectory {
    pub fn new(labels: impl IntoIterator<Item = LabelInfo>) -> Self {
        let mut directory = Self {
            loaded: true,
            ..Self::default()
        };
        for label in labels {
            directory.insert(label);
        }
        directory
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn insert(&mut self, label: LabelInfo) {
        self.ids_by_name
            .insert(label.name.to_lowercase(), label.id.clone());
        self.names_by_id.insert(label.id, label.name);
    }

    /// Display name for a label id; unknown ids are returned unchanged
    pub fn name_for<'a>(&'a self, id: &'a str) -> &'a str {
        self.names_by_id.get(id).map(String::as_str).unwrap_or(id)
    }

    pub fn id_for(&self, name: &str) -> Option<&str> {
        self.ids_by_name.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names_by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names_by_id.is_empty()
    }
}

/// Exponential backoff for transient Gmail failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }

    fn should_retry(error: &GmailError) -> bool {
        error.is_transient()
    }

    /// Run `operation`, retrying transient failures up to `max_retries` times
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = self.initial_delay;
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= self.max_retries => {
                    let wait = match &e {
                        GmailError::RateLimitExceeded { retry_after } => {
                            delay.max(Duration::from_secs(*retry_after)).min(self.max_delay)
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        self.max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, self.max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `MessageStore` backed by the Gmail API.
///
/// Paging, label name resolution and retries happen here; callers see one
/// logical call per operation.
pub struct GmailMessageStore {
    hub: GmailHub,
    settings: GmailConfig,
    retry: RetryPolicy,
    labels: Mutex<LabelDirectory>,
}

impl GmailMessageStore {
    pub fn new(hub: GmailHub, settings: GmailConfig) -> Self {
        let retry = RetryPolicy::new(settings.max_retries);
        Self {
            hub,
            settings,
            retry,
            labels: Mutex::new(LabelDirectory::default()),
        }
    }

    async fn fetch_labels(&self) -> Result<Vec<LabelInfo>> {
        self.retry
            .run("list_labels", || async move {
                let (_, response) = self
                    .hub
                    .users()
                    .labels_list("me")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await?;

                Ok(response
                    .labels
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|label| match (label.id, label.name) {
                        (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                        _ => None,
                    })
                    .collect())
            })
            .await
    }

    /// The label directory, fetched on first use
    async fn label_directory(&self) -> Result<MutexGuard<'_, LabelDirectory>> {
        let mut directory = self.labels.lock().await;
        if !directory.is_loaded() {
            let labels = self.fetch_labels().await?;
            *directory = LabelDirectory::new(labels);
            debug!("Loaded {} labels", directory.len());
        }
        Ok(directory)
    }

    async fn create_label(&self, name: &str) -> Result<String> {
        self.retry
            .run("create_label", || async move {
                let label = Label {
                    name: Some(name.to_string()),
                    message_list_visibility: Some("show".to_string()),
                    label_list_visibility: Some("labelShow".to_string()),
                    ..Default::default()
                };

                let (_, created) = self
                    .hub
                    .users()
                    .labels_create(label, "me")
                    .add_scope(MODIFY_SCOPE)
                    .doit()
                    .await?;

                created
                    .id
                    .ok_or_else(|| GmailError::LabelError("Created label has no ID".to_string()))
            })
            .await
    }

    /// Map label names to ids. Missing labels are created when `create_missing`
    /// is set and skipped otherwise.
    async fn resolve_label_ids(&self, names: &[String], create_missing: bool) -> Result<Vec<String>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut directory = self.label_directory().await?;
        let mut ids = Vec::with_capacity(names.len());

        for name in names {
            if let Some(id) = directory.id_for(name).map(str::to_string) {
                ids.push(id);
                continue;
            }

            if create_missing {
                let id = self.create_label(name).await?;
                info!("Created label '{}'", name);
                directory.insert(LabelInfo {
                    id: id.clone(),
                    name: name.clone(),
                });
                ids.push(id);
            } else {
                debug!("Label '{}' does not exist, nothing to remove", name);
            }
        }

        Ok(ids)
    }

    async fn fetch_raw(&self, id: &str, detail: DetailLevel) -> Result<ApiMessage> {
        self.retry
            .run("get_message", || async move {
                let mut call = self
                    .hub
                    .users()
                    .messages_get("me", id)
                    .format(detail.api_format());
                if detail == DetailLevel::Metadata {
                    for header in METADATA_HEADERS {
                        call = call.add_metadata_headers(header);
                    }
                }

                let (_, msg) = call.add_scope(MODIFY_SCOPE).doit().await?;
                Ok(msg)
            })
            .await
    }
}

/// Convert a Gmail API message, translating label ids into names
fn parse_message(msg: ApiMessage, labels: &LabelDirectory, detail: DetailLevel) -> Result<Message> {
    let id = msg
        .id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing message ID".to_string()))?;

    let thread_id = msg
        .thread_id
        .ok_or_else(|| GmailError::InvalidMessageFormat("Missing thread ID".to_string()))?;

    let mut message = Message::ids_only(id, thread_id);
    message.detail = detail;
    message.snippet = msg.snippet.filter(|s| !s.is_empty());
    message.labels = msg
        .label_ids
        .unwrap_or_default()
        .iter()
        .map(|label_id| labels.name_for(label_id).to_string())
        .collect();

    let headers = msg
        .payload
        .and_then(|p| p.headers)
        .unwrap_or_default();

    for header in headers {
        if let (Some(name), Some(value)) = (header.name, header.value) {
            match name.to_lowercase().as_str() {
                "from" => message.from = Some(value),
                "subject" => message.subject = Some(value),
                "date" => message.date_received = parse_date(&value).ok(),
                _ => {}
            }
        }
    }

    Ok(message)
}

/// Parse RFC 2822 date string
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(date_str)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| DateTime::parse_from_rfc3339(date_str).map(|dt| dt.with_timezone(&Utc)))
        .map_err(|e| GmailError::InvalidMessageFormat(format!("Invalid date format: {}", e)))
}

/// Size of the next list page given how many results are already held
fn next_page_size(cap: ResultCap, taken: usize, page_size: u32) -> Option<u32> {
    match cap.remaining(taken) {
        Some(0) => None,
        Some(n) => Some(u32::try_from(n).unwrap_or(u32::MAX).min(page_size)),
        None => Some(page_size),
    }
}

#[async_trait]
impl MessageStore for GmailMessageStore {
    async fn query_messages(
        &self,
        query: &str,
        cap: ResultCap,
        detail: DetailLevel,
    ) -> Result<Vec<Message>> {
        let mut messages = Vec::new();
        let mut page_token: Option<String> = None;

        while let Some(page_size) = next_page_size(cap, messages.len(), self.settings.page_size) {
            let token = page_token.as_deref();
            let (_, response) = self
                .retry
                .run("list_messages", || async move {
                    let mut call = self
                        .hub
                        .users()
                        .messages_list("me")
                        .q(query)
                        .max_results(page_size)
                        .include_spam_trash(false);

                    if let Some(token) = token {
                        call = call.page_token(token);
                    }

                    Ok(call.add_scope(MODIFY_SCOPE).doit().await?)
                })
                .await?;

            messages.extend(
                response
                    .messages
                    .unwrap_or_default()
                    .into_iter()
                    .filter_map(|m| Some(Message::ids_only(m.id?, m.thread_id.unwrap_or_default()))),
            );

            page_token = response.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        if let ResultCap::AtMost(n) = cap {
            messages.truncate(n);
        }
        debug!("Query {:?} returned {} messages", query, messages.len());

        match detail {
            DetailLevel::IdsOnly => Ok(messages),
            DetailLevel::Metadata => self.load_messages(&message_ids(&messages), detail).await,
        }
    }

    async fn load_messages(&self, ids: &[String], detail: DetailLevel) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // Collected before streaming; a borrowing map closure breaks the Send bound
        let fetches: Vec<_> = ids.iter().map(|id| self.fetch_raw(id, detail)).collect();
        let raw: Vec<ApiMessage> = stream::iter(fetches)
            .buffered(self.settings.max_concurrent_requests)
            .try_collect()
            .await?;

        let directory = self.label_directory().await?;
        raw.into_iter()
            .map(|msg| parse_message(msg, &directory, detail))
            .collect()
    }

    async fn modify_labels(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<()> {
        if ids.is_empty() || (add.is_empty() && remove.is_empty()) {
            return Ok(());
        }

        let add_ids = self.resolve_label_ids(add, true).await?;
        let remove_ids = self.resolve_label_ids(remove, false).await?;
        let add_ids = (!add_ids.is_empty()).then_some(add_ids);
        let remove_ids = (!remove_ids.is_empty()).then_some(remove_ids);

        for chunk in ids.chunks(BATCH_SIZE) {
            let add_ids = &add_ids;
            let remove_ids = &remove_ids;
            self.retry
                .run("batch_modify", || async move {
                    let request = BatchModifyMessagesRequest {
                        ids: Some(chunk.to_vec()),
                        add_label_ids: add_ids.clone(),
                        remove_label_ids: remove_ids.clone(),
                    };

                    self.hub
                        .users()
                        .messages_batch_modify(request, "me")
                        .add_scope(MODIFY_SCOPE)
                        .doit()
                        .await?;

                    Ok(())
                })
                .await?;
            debug!("Modified labels on {} messages", chunk.len());
        }

        Ok(())
    }

    async fn trash(&self, ids: &[String]) -> Result<()> {
        for id in ids {
            let id = id.as_str();
            self.retry
                .run("trash", || async move {
                    self.hub
                        .users()
                        .messages_trash("me", id)
                        .add_scope(MODIFY_SCOPE)
                        .doit()
                        .await?;
                    Ok(())
                })
                .await?;
        }
        debug!("Trashed {} messages", ids.len());
        Ok(())
    }
}
