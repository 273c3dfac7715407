//! Gmail Triage
//!
//! A command-line assistant for triaging Gmail: build a search query, classify the
//! matched messages as interesting or uninteresting with configurable label
//! patterns, then label, touch or trash them after confirmation.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gmail_triage::{auth, config::Config, client::GmailMessageStore};
//! use gmail_triage::confirm::InquireGate;
//! use gmail_triage::pipeline::{QueryPipeline, SearchFlags, SearchRequest};
//! use gmail_triage::report::ConsoleReporter;
//! use gmail_triage::rules::RuleSet;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!     let rules = RuleSet::compile(&config.rules)?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         "token.json".as_ref(),
//!     ).await?;
//!
//!     let pipeline = QueryPipeline::new(
//!         Arc::new(GmailMessageStore::new(hub, config.gmail.clone())),
//!         rules,
//!         Arc::new(InquireGate),
//!         Arc::new(ConsoleReporter::new(Arc::new(indicatif::MultiProgress::new()), false)),
//!     );
//!
//!     let flags = SearchFlags {
//!         query: Some("is:unread".to_string()),
//!         interesting: true,
//!         ..SearchFlags::default()
//!     };
//!     pipeline.run(&SearchRequest::from_flags(&flags)?).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - `MessageStore` trait and the Gmail implementation
//! - [`classifier`] - Interest classification from message labels
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`confirm`] - Yes/no confirmation gate
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures
//! - [`pipeline`] - Query, classify, confirm and mutate flow
//! - [`query`] - Gmail query construction
//! - [`report`] - Progress and result output
//! - [`rules`] - Compiled label patterns

pub mod auth;
pub mod client;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod confirm;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod query;
pub mod report;
pub mod rules;

// Re-export commonly used types for convenience
pub use error::{GmailError, PipelineStage, Result};

pub use models::{DetailLevel, Message};

pub use classifier::{classify, InterestClassifier, InterestVerdict};

pub use client::{GmailMessageStore, MessageStore};

pub use config::{Config, ConfigSource, FileConfigSource};

pub use confirm::{ConfirmationGate, InquireGate};

pub use pipeline::{
    InterestFilter, Interaction, MutationPlan, MutationRequest, QueryPipeline, SearchFlags,
    SearchOutcome, SearchRequest, SearchSummary,
};

pub use query::{QuerySpec, ResultCap};

pub use report::{ConsoleReporter, OutputMode, ReportLevel, Reporter};

pub use rules::{Pattern, RuleSet};
