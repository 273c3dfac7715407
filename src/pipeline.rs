//! The search pipeline: build query → fetch → classify → confirm → mutate
//!
//! Every mailbox call goes through [`MessageStore`] and is awaited in turn, so
//! mutations always run in the order labels, touch, trash. A failing call stops
//! the run and comes back as [`GmailError::Stage`].

use std::future::Future;
use std::sync::Arc;

use crate::classifier::{InterestClassifier, InterestVerdict};
use crate::client::MessageStore;
use crate::confirm::ConfirmationGate;
use crate::error::{GmailError, PipelineStage, Result};
use crate::models::{message_ids, DetailLevel, Message};
use crate::query::{QuerySpec, ResultCap};
use crate::report::{OutputMode, ReportLevel, Reporter};
use crate::rules::RuleSet;

/// Which messages survive classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterestFilter {
    #[default]
    All,
    InterestingOnly,
    UninterestingOnly,
}

impl InterestFilter {
    /// `-i` and `-u` are mutually exclusive
    pub fn from_flags(interesting: bool, uninteresting: bool) -> Result<Self> {
        match (interesting, uninteresting) {
            (true, true) => Err(GmailError::ConflictingFilters),
            (true, false) => Ok(InterestFilter::InterestingOnly),
            (false, true) => Ok(InterestFilter::UninterestingOnly),
            (false, false) => Ok(InterestFilter::All),
        }
    }

    /// The verdict kept by this filter, `None` when everything is kept
    pub fn verdict(self) -> Option<InterestVerdict> {
        match self {
            InterestFilter::All => None,
            InterestFilter::InterestingOnly => Some(InterestVerdict::Interesting),
            InterestFilter::UninterestingOnly => Some(InterestVerdict::Uninteresting),
        }
    }
}

/// Changes the user asked for, before label names are looked up in the rules
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationPlan {
    pub add_labels: Vec<String>,
    pub touch: bool,
    pub trash: bool,
    /// Also add the configured uninteresting label
    pub mark_uninteresting: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interaction {
    #[default]
    Prompt,
    /// Never prompt or display; mutations run only with `assume_yes`
    Quiet { assume_yes: bool },
}

/// Raw command-line switches for one search
#[derive(Debug, Clone)]
pub struct SearchFlags {
    pub query: Option<String>,
    pub label_filters: Vec<String>,
    pub max: i64,
    pub interesting: bool,
    pub uninteresting: bool,
    pub ids_only: bool,
    pub json: bool,
    pub interesting_query: bool,
    pub add_labels: Vec<String>,
    pub touch: bool,
    pub trash: bool,
    pub mark_uninteresting: bool,
    pub quiet: bool,
    pub assume_yes: bool,
    pub dry_run: bool,
}

impl Default for SearchFlags {
    fn default() -> Self {
        Self {
            query: None,
            label_filters: Vec::new(),
            max: ResultCap::UNBOUNDED_SENTINEL,
            interesting: false,
            uninteresting: false,
            ids_only: false,
            json: false,
            interesting_query: false,
            add_labels: Vec::new(),
            touch: false,
            trash: false,
            mark_uninteresting: false,
            quiet: false,
            assume_yes: false,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: QuerySpec,
    /// Append the configured interesting query to the free text
    pub include_interesting_query: bool,
    pub filter: InterestFilter,
    pub output: OutputMode,
    pub mutations: MutationPlan,
    pub interaction: Interaction,
    pub dry_run: bool,
}

impl SearchRequest {
    /// Validate switch combinations and build a request
    pub fn from_flags(flags: &SearchFlags) -> Result<Self> {
        let filter = InterestFilter::from_flags(flags.interesting, flags.uninteresting)?;
        let cap = ResultCap::from_flag(flags.max)?;

        let output = match (flags.ids_only, flags.json) {
            (true, true) => {
                return Err(GmailError::ConfigError(
                    "--ids-only and --json cannot be used together".to_string(),
                ))
            }
            (true, false) => OutputMode::IdsOnly,
            (false, true) => OutputMode::Json,
            (false, false) => OutputMode::Categorized,
        };

        let interaction = if flags.quiet {
            Interaction::Quiet {
                assume_yes: flags.assume_yes,
            }
        } else {
            Interaction::Prompt
        };

        Ok(Self {
            query: QuerySpec::new(flags.label_filters.clone(), flags.query.clone(), cap),
            include_interesting_query: flags.interesting_query,
            filter,
            output,
            mutations: MutationPlan {
                add_labels: flags.add_labels.clone(),
                touch: flags.touch,
                trash: flags.trash,
                mark_uninteresting: flags.mark_uninteresting,
            },
            interaction,
            dry_run: flags.dry_run,
        })
    }
}

/// Concrete mutations for a matched set, label names resolved
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationRequest {
    pub ids: Vec<String>,
    pub add_labels: Vec<String>,
    pub touch_label: Option<String>,
    pub trash: bool,
}

impl MutationRequest {
    /// Resolve a plan against the rules. Fails when touch or mark-uninteresting
    /// is requested but the matching label is not configured.
    pub fn resolve(plan: &MutationPlan, rules: &RuleSet) -> Result<Self> {
        let touch_label = if plan.touch {
            Some(
                rules
                    .touch_label()
                    .ok_or(GmailError::TouchLabelNotConfigured)?
                    .to_string(),
            )
        } else {
            None
        };

        let mut add_labels: Vec<String> = Vec::with_capacity(plan.add_labels.len() + 1);
        let mut push_label = |label: &str| {
            let label = label.trim();
            if !label.is_empty() && !add_labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                add_labels.push(label.to_string());
            }
        };
        for label in &plan.add_labels {
            push_label(label);
        }
        if plan.mark_uninteresting {
            push_label(
                rules
                    .uninteresting_label()
                    .ok_or(GmailError::UninterestingLabelNotConfigured)?,
            );
        }

        Ok(Self {
            ids: Vec::new(),
            add_labels,
            touch_label,
            trash: plan.trash,
        })
    }

    /// True when no mutation was requested
    pub fn is_empty(&self) -> bool {
        self.add_labels.is_empty() && self.touch_label.is_none() && !self.trash
    }

    /// Human-readable list of the requested actions, in execution order
    pub fn describe(&self) -> Vec<String> {
        let mut actions = Vec::new();
        if !self.add_labels.is_empty() {
            actions.push(format!("add label(s) {}", self.add_labels.join(", ")));
        }
        if let Some(touch) = &self.touch_label {
            actions.push(format!("touch (label '{}')", touch));
        }
        if self.trash {
            actions.push("move to trash".to_string());
        }
        actions
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchSummary {
    pub matched: usize,
    pub displayed: bool,
    /// Messages given the requested labels
    pub labeled: usize,
    pub touched: usize,
    pub trashed: usize,
    /// Nothing was changed; counts say what would have been
    pub dry_run: bool,
    /// Mutations were requested but skipped (quiet mode without assume-yes)
    pub mutations_skipped: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The query (after filtering) matched nothing; nothing was asked or changed
    NoMatches,
    /// The user said no; nothing was shown or changed
    Declined { matched: usize },
    Completed(SearchSummary),
}

fn confirm_prompt(request: &MutationRequest, dry_run: bool) -> String {
    if request.is_empty() {
        return "Show messages?".to_string();
    }
    let suffix = if dry_run { " (dry run)" } else { "" };
    format!("Show messages and {}?{}", request.describe().join(", then "), suffix)
}

pub struct QueryPipeline {
    store: Arc<dyn MessageStore>,
    rules: RuleSet,
    gate: Arc<dyn ConfirmationGate>,
    reporter: Arc<dyn Reporter>,
}

impl QueryPipeline {
    pub fn new(
        store: Arc<dyn MessageStore>,
        rules: RuleSet,
        gate: Arc<dyn ConfirmationGate>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            store,
            rules,
            gate,
            reporter,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Render the query, appending the interesting query when asked to
    pub fn build_query(&self, request: &SearchRequest) -> String {
        let mut spec = request.query.clone();
        let interesting = self.rules.interesting_query();
        if request.include_interesting_query && !interesting.is_empty() {
            spec.free_text = Some(match spec.free_text.take() {
                Some(text) => format!("{} {}", text, interesting),
                None => interesting.to_string(),
            });
        }
        spec.build()
    }

    pub async fn run(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        // Configuration problems surface before the mailbox is touched
        let mut mutation = MutationRequest::resolve(&request.mutations, &self.rules)?;

        let query = self.build_query(request);
        if query.trim().is_empty() {
            self.reporter.report(
                ReportLevel::Warn,
                "No query provided, searching all messages",
            );
        }
        tracing::debug!(query = %query, cap = %request.query.cap, "Running search");

        let mut messages = self
            .staged(
                PipelineStage::Fetch,
                self.store
                    .query_messages(&query, request.query.cap, DetailLevel::IdsOnly),
            )
            .await?;
        self.reporter.report(
            ReportLevel::Debug,
            &format!("Query returned {} messages", messages.len()),
        );

        if let Some(wanted) = request.filter.verdict() {
            messages = self.load_metadata(messages).await?;
            let classifier = InterestClassifier::new(&self.rules);
            let (interesting, uninteresting, neutral) = classifier.tally(&messages);
            self.reporter.report(
                ReportLevel::Debug,
                &format!(
                    "Verdicts: {} interesting, {} uninteresting, {} neutral",
                    interesting, uninteresting, neutral
                ),
            );
            messages.retain(|m| classifier.classify(m) == wanted);
        }

        if messages.is_empty() {
            self.reporter
                .report(ReportLevel::Always, "Query matched no messages");
            return Ok(SearchOutcome::NoMatches);
        }

        let matched = messages.len();
        self.reporter
            .report(ReportLevel::Always, &format!("Query matched {} messages", matched));

        let mut summary = SearchSummary {
            matched,
            dry_run: request.dry_run,
            ..SearchSummary::default()
        };

        let apply_mutations = match request.interaction {
            Interaction::Quiet { assume_yes } => {
                let proceed = assume_yes || request.dry_run;
                if !mutation.is_empty() && !proceed {
                    self.reporter.report(
                        ReportLevel::Warn,
                        &format!(
                            "Quiet mode without --yes, not applying: {}",
                            mutation.describe().join(", ")
                        ),
                    );
                    summary.mutations_skipped = true;
                }
                proceed
            }
            Interaction::Prompt => {
                let ids_without_changes =
                    request.output == OutputMode::IdsOnly && mutation.is_empty();
                if !ids_without_changes {
                    let prompt = confirm_prompt(&mutation, request.dry_run);
                    if !self.gate.ask(&prompt, mutation.is_empty())? {
                        self.reporter.report(ReportLevel::Info, "Nothing changed.");
                        return Ok(SearchOutcome::Declined { matched });
                    }
                }

                if request.output.needs_metadata() {
                    messages = self.load_metadata(messages).await?;
                }
                self.reporter
                    .show_messages(&messages, request.output, &self.rules)?;
                summary.displayed = true;
                true
            }
        };

        if apply_mutations && !mutation.is_empty() {
            mutation.ids = message_ids(&messages);
            self.apply(&mutation, request.dry_run, &mut summary).await?;
        }

        Ok(SearchOutcome::Completed(summary))
    }

    /// Bring messages up to metadata detail with one batched load
    async fn load_metadata(&self, messages: Vec<Message>) -> Result<Vec<Message>> {
        if messages.iter().all(Message::has_metadata) {
            return Ok(messages);
        }
        let ids = message_ids(&messages);
        self.staged(
            PipelineStage::LoadMetadata,
            self.store.load_messages(&ids, DetailLevel::Metadata),
        )
        .await
    }

    async fn apply(
        &self,
        mutation: &MutationRequest,
        dry_run: bool,
        summary: &mut SearchSummary,
    ) -> Result<()> {
        let count = mutation.ids.len();
        let verb = |done: &str, would: &str| if dry_run { would.to_string() } else { done.to_string() };

        if !mutation.add_labels.is_empty() {
            if !dry_run {
                self.staged(
                    PipelineStage::AddLabels,
                    self.store.modify_labels(&mutation.ids, &mutation.add_labels, &[]),
                )
                .await?;
            }
            summary.labeled = count;
            self.reporter.report(
                ReportLevel::Info,
                &format!(
                    "{} {} to {} messages",
                    verb("Added", "Would add"),
                    mutation.add_labels.join(", "),
                    count
                ),
            );
        }

        if let Some(touch) = &mutation.touch_label {
            if !dry_run {
                self.staged(
                    PipelineStage::Touch,
                    self.store
                        .modify_labels(&mutation.ids, std::slice::from_ref(touch), &[]),
                )
                .await?;
            }
            summary.touched = count;
            self.reporter.report(
                ReportLevel::Info,
                &format!("{} {} messages with '{}'", verb("Touched", "Would touch"), count, touch),
            );
        }

        if mutation.trash {
            if !dry_run {
                self.staged(PipelineStage::Trash, self.store.trash(&mutation.ids))
                    .await?;
            }
            summary.trashed = count;
            self.reporter.report(
                ReportLevel::Info,
                &format!("{} {} messages to trash", verb("Moved", "Would move"), count),
            );
        }

        Ok(())
    }

    /// Await one store call, tagging any failure with its stage
    async fn staged<T>(
        &self,
        stage: PipelineStage,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        self.reporter.stage_started(stage);
        let result = call.await;
        self.reporter.stage_finished(stage);
        result.map_err(|e| {
            tracing::error!("{} failed: {}", stage, e);
            GmailError::at_stage(stage, e)
        })
    }
}
