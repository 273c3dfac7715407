//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_triage::client::MessageStore;
use gmail_triage::config::RulesConfig;
use gmail_triage::confirm::ConfirmationGate;
use gmail_triage::error::{GmailError, PipelineStage, Result};
use gmail_triage::models::{DetailLevel, Message};
use gmail_triage::pipeline::QueryPipeline;
use gmail_triage::query::ResultCap;
use gmail_triage::report::{OutputMode, ReportLevel, Reporter};
use gmail_triage::rules::RuleSet;
use mockall::mock;
use std::sync::{Arc, Mutex};

/// A store call, as observed by [`RecordingStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Query {
        query: String,
        cap: ResultCap,
        detail: DetailLevel,
    },
    Load {
        ids: Vec<String>,
        detail: DetailLevel,
    },
    Modify {
        ids: Vec<String>,
        add: Vec<String>,
        remove: Vec<String>,
    },
    Trash {
        ids: Vec<String>,
    },
}

impl Call {
    pub fn is_mutation(&self) -> bool {
        matches!(self, Call::Modify { .. } | Call::Trash { .. })
    }
}

/// In-memory mailbox that records every call made against it
#[derive(Default)]
pub struct RecordingStore {
    mailbox: Vec<Message>,
    calls: Mutex<Vec<Call>>,
    failing_label: Option<String>,
    fail_queries: bool,
}

impl RecordingStore {
    pub fn with_messages(mailbox: Vec<Message>) -> Self {
        Self {
            mailbox,
            ..Self::default()
        }
    }

    /// Any `modify_labels` call adding `label` fails
    pub fn failing_when_adding(mut self, label: &str) -> Self {
        self.failing_label = Some(label.to_string());
        self
    }

    pub fn failing_queries(mut self) -> Self {
        self.fail_queries = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutation_calls(&self) -> Vec<Call> {
        self.calls().into_iter().filter(Call::is_mutation).collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MessageStore for RecordingStore {
    async fn query_messages(&self, query: &str, cap: ResultCap, detail: DetailLevel) -> Result<Vec<Message>> {
        self.record(Call::Query {
            query: query.to_string(),
            cap,
            detail,
        });
        if self.fail_queries {
            return Err(GmailError::NetworkError("connection reset".to_string()));
        }

        let limit = match cap {
            ResultCap::Unbounded => self.mailbox.len(),
            ResultCap::AtMost(n) => n,
        };
        Ok(self
            .mailbox
            .iter()
            .take(limit)
            .map(|m| Message::ids_only(m.id.clone(), m.thread_id.clone()))
            .collect())
    }

    async fn load_messages(&self, ids: &[String], detail: DetailLevel) -> Result<Vec<Message>> {
        self.record(Call::Load {
            ids: ids.to_vec(),
            detail,
        });
        ids.iter()
            .map(|id| {
                self.mailbox
                    .iter()
                    .find(|m| &m.id == id)
                    .cloned()
                    .ok_or_else(|| GmailError::MessageNotFound(id.clone()))
            })
            .collect()
    }

    async fn modify_labels(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<()> {
        self.record(Call::Modify {
            ids: ids.to_vec(),
            add: add.to_vec(),
            remove: remove.to_vec(),
        });
        match &self.failing_label {
            Some(label) if add.contains(label) => Err(GmailError::Forbidden(format!(
                "cannot add label {}",
                label
            ))),
            _ => Ok(()),
        }
    }

    async fn trash(&self, ids: &[String]) -> Result<()> {
        self.record(Call::Trash { ids: ids.to_vec() });
        Ok(())
    }
}

/// Gate that always gives the same answer and remembers what it was asked
pub struct RecordingGate {
    answer: bool,
    prompts: Mutex<Vec<(String, bool)>>,
}

impl RecordingGate {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far with their default answer
    pub fn prompts(&self) -> Vec<(String, bool)> {
        self.prompts.lock().unwrap().clone()
    }
}

impl ConfirmationGate for RecordingGate {
    fn ask(&self, prompt: &str, default_yes: bool) -> Result<bool> {
        self.prompts
            .lock()
            .unwrap()
            .push((prompt.to_string(), default_yes));
        Ok(self.answer)
    }
}

/// Reporter that keeps everything it is told
#[derive(Default)]
pub struct RecordingReporter {
    lines: Mutex<Vec<(ReportLevel, String)>>,
    shown: Mutex<Vec<(Vec<String>, OutputMode)>>,
    stages: Mutex<Vec<PipelineStage>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<(ReportLevel, String)> {
        self.lines.lock().unwrap().clone()
    }

    pub fn has_line(&self, level: ReportLevel, text: &str) -> bool {
        self.lines()
            .iter()
            .any(|(l, line)| *l == level && line.contains(text))
    }

    /// Ids of each `show_messages` call with its output mode
    pub fn shown(&self) -> Vec<(Vec<String>, OutputMode)> {
        self.shown.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<PipelineStage> {
        self.stages.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }

    fn show_messages(&self, messages: &[Message], mode: OutputMode, _rules: &RuleSet) -> Result<()> {
        let ids = messages.iter().map(|m| m.id.clone()).collect();
        self.shown.lock().unwrap().push((ids, mode));
        Ok(())
    }

    fn stage_started(&self, stage: PipelineStage) {
        self.stages.lock().unwrap().push(stage);
    }
}

// Mock implementation of MessageStore for testing
mock! {
    pub Store {}

    #[async_trait::async_trait]
    impl MessageStore for Store {
        async fn query_messages(&self, query: &str, cap: ResultCap, detail: DetailLevel) -> Result<Vec<Message>>;
        async fn load_messages(&self, ids: &[String], detail: DetailLevel) -> Result<Vec<Message>>;
        async fn modify_labels(&self, ids: &[String], add: &[String], remove: &[String]) -> Result<()>;
        async fn trash(&self, ids: &[String]) -> Result<()>;
    }
}

/// Rules with uninteresting pattern "spam", interesting pattern "inbox",
/// touch label "triaged" and uninteresting label "meh"
pub fn standard_rules() -> RuleSet {
    RuleSet::compile(&RulesConfig {
        interesting_message_query: "is:unread in:inbox".to_string(),
        uninteresting_label_patterns: vec!["spam".to_string()],
        interesting_label_patterns: vec!["inbox".to_string()],
        apply_label_to_uninteresting: "meh".to_string(),
        apply_label_on_touch: "triaged".to_string(),
        ..RulesConfig::default()
    })
    .unwrap()
}

pub fn rules_without_labels() -> RuleSet {
    RuleSet::compile(&RulesConfig {
        uninteresting_label_patterns: vec!["spam".to_string()],
        interesting_label_patterns: vec!["inbox".to_string()],
        ..RulesConfig::default()
    })
    .unwrap()
}

/// Messages A (interesting), B (uninteresting) and C (neutral)
pub fn abc_mailbox() -> Vec<Message> {
    vec![
        Message::with_labels("A", "tA", ["INBOX"]),
        Message::with_labels("B", "tB", ["SPAM", "INBOX"]),
        Message::with_labels("C", "tC", ["promo"]),
    ]
}

pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub gate: Arc<RecordingGate>,
    pub reporter: Arc<RecordingReporter>,
    pub pipeline: QueryPipeline,
}

pub fn harness(store: RecordingStore, rules: RuleSet, answer: bool) -> Harness {
    let store = Arc::new(store);
    let gate = Arc::new(RecordingGate::answering(answer));
    let reporter = Arc::new(RecordingReporter::default());
    let pipeline = QueryPipeline::new(store.clone(), rules, gate.clone(), reporter.clone());
    Harness {
        store,
        gate,
        reporter,
        pipeline,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abc_mailbox() {
        let mailbox = abc_mailbox();
        assert_eq!(mailbox.len(), 3);
        assert!(mailbox.iter().all(Message::has_metadata));
    }

    #[tokio::test]
    async fn test_recording_store_strips_metadata_on_query() {
        let store = RecordingStore::with_messages(abc_mailbox());
        let found = store
            .query_messages("", ResultCap::AtMost(2), DetailLevel::IdsOnly)
            .await
            .unwrap();

        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|m| !m.has_metadata()));
        assert_eq!(store.calls().len(), 1);
    }
}
