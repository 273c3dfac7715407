use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How much of a message the store returned
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Only message and thread identifiers
    #[default]
    IdsOnly,
    /// Identifiers plus labels and headers
    Metadata,
}

impl DetailLevel {
    /// Value of the Gmail API `format` parameter for this level
    pub fn api_format(self) -> &'static str {
        match self {
            DetailLevel::IdsOnly => "minimal",
            DetailLevel::Metadata => "metadata",
        }
    }
}

/// A message as seen by the triage pipeline.
///
/// Labels are label *names*. The set is a snapshot taken when the message was
/// loaded; the mailbox is the only authority on a message's current labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_received: Option<DateTime<Utc>>,
    #[serde(default)]
    pub detail: DetailLevel,
}

impl Message {
    pub fn ids_only(id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            thread_id: thread_id.into(),
            labels: BTreeSet::new(),
            from: None,
            subject: None,
            snippet: None,
            date_received: None,
            detail: DetailLevel::IdsOnly,
        }
    }

    /// Metadata-level message carrying the given label names
    pub fn with_labels<I, S>(id: impl Into<String>, thread_id: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut message = Self::ids_only(id, thread_id);
        message.labels = labels.into_iter().map(Into::into).collect();
        message.detail = DetailLevel::Metadata;
        message
    }

    pub fn has_metadata(&self) -> bool {
        self.detail == DetailLevel::Metadata
    }
}

/// Identifiers of a message list, in order
pub fn message_ids(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.id.clone()).collect()
}
