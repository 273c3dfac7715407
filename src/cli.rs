//! Command-line interface

use clap::{Args, Parser, Subcommand};
use indicatif::MultiProgress;
use std::path::PathBuf;
use std::sync::Arc;

use crate::auth;
use crate::client::GmailMessageStore;
use crate::config::{config_dir, default_config_path, ConfigSource, ExecutionConfig, FileConfigSource};
use crate::confirm::InquireGate;
use crate::error::Result;
use crate::pipeline::{MutationRequest, QueryPipeline, SearchFlags, SearchOutcome, SearchRequest};
use crate::query::ResultCap;
use crate::report::ConsoleReporter;
use crate::rules::RuleSet;

fn default_credentials_path() -> PathBuf {
    config_dir().join("credentials.json")
}

fn default_token_cache_path() -> PathBuf {
    config_dir().join("token.json")
}

#[derive(Parser, Debug)]
#[command(name = "gmail-triage")]
#[command(version)]
#[command(about = "Search, classify and triage Gmail messages", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value_os_t = default_config_path())]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, global = true, default_value_os_t = default_credentials_path())]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, global = true, default_value_os_t = default_token_cache_path())]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Don't prompt or show messages; only print counts
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Search messages, then optionally label, touch or trash them
    #[command(visible_alias = "find")]
    Search(SearchArgs),

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file (defaults to the --config path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration and check its patterns
    ShowConfig,
}

#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Gmail search text, e.g. "from:boss is:unread"
    pub query: Option<String>,

    /// Only messages with a label matching this Gmail label expression (repeatable)
    #[arg(short = 'l', long = "labelp", value_name = "LABEL")]
    pub label_filters: Vec<String>,

    /// Add this label to every matched message (repeatable)
    #[arg(long = "add-label", value_name = "LABEL")]
    pub add_labels: Vec<String>,

    /// Add the configured touch label to every matched message
    #[arg(short, long)]
    pub touch: bool,

    /// Move every matched message to the trash
    #[arg(long)]
    pub trash: bool,

    /// Keep only messages classified as interesting
    #[arg(short, long)]
    pub interesting: bool,

    /// Keep only messages classified as uninteresting
    #[arg(short, long)]
    pub uninteresting: bool,

    /// Print `id,thread_id` per message instead of details
    #[arg(long)]
    pub ids_only: bool,

    /// Print messages as JSON
    #[arg(long)]
    pub json: bool,

    /// Maximum number of messages (-1 for no limit)
    #[arg(short, long, default_value_t = ResultCap::UNBOUNDED_SENTINEL, allow_negative_numbers = true)]
    pub max: i64,

    /// Append the configured interesting query to the search
    #[arg(long)]
    pub interesting_query: bool,

    /// Add the configured uninteresting label to every matched message
    #[arg(long)]
    pub mark_uninteresting: bool,

    /// Report what would change without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// With --quiet, apply requested changes without asking
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl SearchArgs {
    /// Combine with global switches and `[execution]` defaults
    pub fn to_flags(&self, quiet: bool, execution: &ExecutionConfig) -> SearchFlags {
        SearchFlags {
            query: self.query.clone(),
            label_filters: self.label_filters.clone(),
            max: self.max,
            interesting: self.interesting,
            uninteresting: self.uninteresting,
            ids_only: self.ids_only,
            json: self.json,
            interesting_query: self.interesting_query,
            add_labels: self.add_labels.clone(),
            touch: self.touch,
            trash: self.trash,
            mark_uninteresting: self.mark_uninteresting,
            quiet,
            assume_yes: self.yes || execution.assume_yes_when_quiet,
            dry_run: self.dry_run || execution.dry_run,
        }
    }
}

/// Run one search end to end against Gmail
pub async fn run_search(cli: &Cli, args: &SearchArgs, multi: Arc<MultiProgress>) -> Result<SearchOutcome> {
    let source = FileConfigSource::new(&cli.config);
    let config = source.load_config().await?;
    let rules = RuleSet::compile(&config.rules)?;

    let flags = args.to_flags(cli.quiet, &config.execution);
    let request = SearchRequest::from_flags(&flags)?;
    // Fail on a bad mutation setup before opening a browser for OAuth
    MutationRequest::resolve(&request.mutations, &rules)?;

    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache).await?;
    let store = Arc::new(GmailMessageStore::new(hub, config.gmail.clone()));
    let reporter = Arc::new(ConsoleReporter::new(multi, cli.quiet));
    // Quiet runs never reach the gate; the pipeline decides from `assume_yes`
    let gate = Arc::new(InquireGate);

    if request.dry_run && !cli.quiet {
        tracing::info!("Dry run: no messages will be changed");
    }

    QueryPipeline::new(store, rules, gate, reporter)
        .run(&request)
        .await
}
