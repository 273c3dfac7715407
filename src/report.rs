//! Progress and result output

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;
use std::io::IsTerminal;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::classifier::{InterestClassifier, InterestVerdict};
use crate::error::{PipelineStage, Result};
use crate::models::Message;
use crate::rules::RuleSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReportLevel {
    Debug,
    Info,
    Warn,
    /// Printed even in quiet mode
    Always,
}

/// How matched messages are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Grouped by interest verdict
    #[default]
    Categorized,
    Json,
    /// One `id,thread_id` line per message
    IdsOnly,
}

impl OutputMode {
    pub fn needs_metadata(self) -> bool {
        self != OutputMode::IdsOnly
    }
}

/// Receives everything the pipeline wants the user to see
pub trait Reporter: Send + Sync {
    fn report(&self, level: ReportLevel, message: &str);

    fn show_messages(&self, messages: &[Message], mode: OutputMode, rules: &RuleSet) -> Result<()>;

    fn stage_started(&self, _stage: PipelineStage) {}

    fn stage_finished(&self, _stage: PipelineStage) {}
}

#[derive(Serialize)]
struct ClassifiedMessage<'a> {
    #[serde(flatten)]
    message: &'a Message,
    verdict: InterestVerdict,
}

/// Render messages as pretty JSON, each annotated with its verdict
pub fn render_json(messages: &[Message], rules: &RuleSet) -> Result<String> {
    let classifier = InterestClassifier::new(rules);
    let annotated: Vec<ClassifiedMessage<'_>> = messages
        .iter()
        .map(|message| ClassifiedMessage {
            message,
            verdict: classifier.classify(message),
        })
        .collect();
    Ok(serde_json::to_string_pretty(&annotated)?)
}

pub fn render_ids(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{},{}\n", m.id, m.thread_id))
        .collect()
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// `#rrggbb` to an ANSI 24-bit foreground sequence
fn ansi_color(hex: &str) -> Option<String> {
    let hex = hex.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    Some(format!("\x1b[38;2;{};{};{}m", channel(0)?, channel(2)?, channel(4)?))
}

fn format_label(label: &str, rules: &RuleSet, colored: bool) -> String {
    match rules.label_color(label).filter(|_| colored).and_then(ansi_color) {
        Some(color) => format!("{}{}\x1b[0m", color, label),
        None => label.to_string(),
    }
}

fn format_message_line(message: &Message, rules: &RuleSet, colored: bool) -> String {
    let date = message
        .date_received
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".repeat(16));
    let from = truncate(message.from.as_deref().unwrap_or("(unknown sender)"), 30);
    let subject = truncate(message.subject.as_deref().unwrap_or("(no subject)"), 60);
    let labels: Vec<String> = message
        .labels
        .iter()
        .map(|label| format_label(label, rules, colored))
        .collect();

    format!("  {}  {:<30}  {}  [{}]", date, from, subject, labels.join(", "))
}

/// Render messages grouped under Interesting, Neutral and Uninteresting headings
pub fn render_categorized(messages: &[Message], rules: &RuleSet, colored: bool) -> String {
    let classifier = InterestClassifier::new(rules);
    let mut out = String::new();

    for verdict in [
        InterestVerdict::Interesting,
        InterestVerdict::Neutral,
        InterestVerdict::Uninteresting,
    ] {
        let group: Vec<&Message> = messages
            .iter()
            .filter(|m| classifier.classify(m) == verdict)
            .collect();
        if group.is_empty() {
            continue;
        }

        out.push_str(&format!("{} ({}):\n", verdict, group.len()));
        for message in group {
            out.push_str(&format_message_line(message, rules, colored));
            out.push('\n');
        }
    }

    out
}

/// Where a status line ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusRoute {
    DebugLog,
    WarnLog,
    Stderr,
}

/// Console reporter; spinners and status lines go to stderr, message listings to stdout
pub struct ConsoleReporter {
    multi: Arc<MultiProgress>,
    spinner_style: ProgressStyle,
    quiet: bool,
    colored: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new(multi: Arc<MultiProgress>, quiet: bool) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
            quiet,
            colored: std::io::stdout().is_terminal(),
            spinner: Mutex::new(None),
        }
    }

    fn route(&self, level: ReportLevel) -> StatusRoute {
        match level {
            ReportLevel::Debug => StatusRoute::DebugLog,
            ReportLevel::Warn => StatusRoute::WarnLog,
            ReportLevel::Info if self.quiet => StatusRoute::DebugLog,
            ReportLevel::Info | ReportLevel::Always => StatusRoute::Stderr,
        }
    }

    fn stage_message(stage: PipelineStage) -> &'static str {
        match stage {
            PipelineStage::Fetch => "Searching messages...",
            PipelineStage::LoadMetadata => "Loading message details...",
            PipelineStage::AddLabels => "Applying labels...",
            PipelineStage::Touch => "Touching messages...",
            PipelineStage::Trash => "Moving messages to trash...",
        }
    }
}

impl Reporter for ConsoleReporter {
    fn report(&self, level: ReportLevel, message: &str) {
        match self.route(level) {
            StatusRoute::DebugLog => tracing::debug!("{}", message),
            StatusRoute::WarnLog => tracing::warn!("{}", message),
            StatusRoute::Stderr => {
                let text = message.trim_end_matches('\n');
                self.multi.suspend(|| eprintln!("{}", text));
            }
        }
    }

    fn show_messages(&self, messages: &[Message], mode: OutputMode, rules: &RuleSet) -> Result<()> {
        let rendered = match mode {
            OutputMode::Json => render_json(messages, rules)?,
            OutputMode::IdsOnly => render_ids(messages),
            OutputMode::Categorized => render_categorized(messages, rules, self.colored),
        };
        if !rendered.is_empty() {
            // stdout carries only the listing so --json and --ids-only stay pipeable
            let text = rendered.trim_end_matches('\n');
            self.multi.suspend(|| println!("{}", text));
        }
        Ok(())
    }

    fn stage_started(&self, stage: PipelineStage) {
        if self.quiet {
            return;
        }
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(Self::stage_message(stage));
        pb.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(previous) = slot.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    fn stage_finished(&self, _stage: PipelineStage) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RulesConfig;

    fn rules() -> RuleSet {
        let mut raw = RulesConfig {
            uninteresting_label_patterns: vec!["spam".to_string()],
            interesting_label_patterns: vec!["inbox".to_string()],
            ..RulesConfig::default()
        };
        raw.label_colors.insert("INBOX".to_string(), "#16a766".to_string());
        RuleSet::compile(&raw).unwrap()
    }

    fn sample() -> Vec<Message> {
        let mut a = Message::with_labels("a", "ta", ["INBOX"]);
        a.subject = Some("Lunch?".to_string());
        let b = Message::with_labels("b", "tb", ["SPAM", "INBOX"]);
        let c = Message::with_labels("c", "tc", ["promo"]);
        vec![a, b, c]
    }

    #[test]
    fn test_render_ids() {
        assert_eq!(render_ids(&sample()), "a,ta\nb,tb\nc,tc\n");
    }

    #[test]
    fn test_render_categorized_groups_by_verdict() {
        let out = render_categorized(&sample(), &rules(), false);

        let interesting = out.find("Interesting (1):").unwrap();
        let neutral = out.find("Neutral (1):").unwrap();
        let uninteresting = out.find("Uninteresting (1):").unwrap();
        assert!(interesting < neutral && neutral < uninteresting);
        assert!(out.contains("Lunch?"));
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn test_render_categorized_colors_labels() {
        let out = render_categorized(&sample(), &rules(), true);
        assert!(out.contains("\x1b[38;2;22;167;102mINBOX\x1b[0m"));
    }

    #[test]
    fn test_render_json_includes_verdict() {
        let json = render_json(&sample(), &rules()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["id"], "a");
        assert_eq!(value[0]["verdict"], "interesting");
        assert_eq!(value[1]["verdict"], "uninteresting");
        assert_eq!(value[2]["verdict"], "neutral");
    }

    #[test]
    fn test_ansi_color() {
        assert_eq!(ansi_color("#ff0080").as_deref(), Some("\x1b[38;2;255;0;128m"));
        assert_eq!(ansi_color("ff0080"), None);
        assert_eq!(ansi_color("#fff"), None);
        assert_eq!(ansi_color("#zz0000"), None);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long subject line", 10), "a very ...");
    }

    #[test]
    fn test_status_lines_never_reach_stdout() {
        let loud = ConsoleReporter::new(Arc::new(MultiProgress::new()), false);
        assert_eq!(loud.route(ReportLevel::Info), StatusRoute::Stderr);
        assert_eq!(loud.route(ReportLevel::Always), StatusRoute::Stderr);
        assert_eq!(loud.route(ReportLevel::Warn), StatusRoute::WarnLog);
        assert_eq!(loud.route(ReportLevel::Debug), StatusRoute::DebugLog);

        let quiet = ConsoleReporter::new(Arc::new(MultiProgress::new()), true);
        assert_eq!(quiet.route(ReportLevel::Info), StatusRoute::DebugLog);
        assert_eq!(quiet.route(ReportLevel::Always), StatusRoute::Stderr);
    }

    #[test]
    fn test_json_listing_is_a_single_document() {
        // The whole listing must parse on its own, with nothing before or after it
        let json = render_json(&sample(), &rules()).unwrap();
        let value: serde_json::Value = serde_json::from_str(json.trim_end()).unwrap();
        assert_eq!(value.as_array().map(Vec::len), Some(3));
        assert!(json.starts_with('['));
    }

    #[test]
    fn test_output_mode_metadata_needs() {
        assert!(OutputMode::Categorized.needs_metadata());
        assert!(OutputMode::Json.needs_metadata());
        assert!(!OutputMode::IdsOnly.needs_metadata());
    }
}
