//! Compiled classification rules
//!
//! A [`RuleSet`] is built once from [`RulesConfig`] and never changes afterwards.
//! Every pattern is compiled case-insensitively; a single bad pattern fails the
//! whole load so a partial rule set can never be used.

use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::RulesConfig;
use crate::error::{GmailError, PatternList, Result};

const CASE_INSENSITIVE: &str = "(?i)";

/// A case-insensitive label pattern together with the text it was compiled from
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn compile(list: PatternList, source: &str) -> Result<Self> {
        let regex = Regex::new(&format!("{}{}", CASE_INSENSITIVE, source)).map_err(|e| {
            GmailError::InvalidPattern {
                list,
                pattern: source.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Pattern text as written in the configuration
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the pattern matches anywhere in `label`
    pub fn matches(&self, label: &str) -> bool {
        self.regex.is_match(label)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pattern").field(&self.source).finish()
    }
}

fn compile_patterns(list: PatternList, sources: &[String]) -> Result<Vec<Pattern>> {
    sources
        .iter()
        .map(|source| Pattern::compile(list, source))
        .collect()
}

fn non_empty(label: &str) -> Option<String> {
    let label = label.trim();
    (!label.is_empty()).then(|| label.to_string())
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    interesting_query: String,
    uninteresting_patterns: Vec<Pattern>,
    interesting_patterns: Vec<Pattern>,
    uninteresting_label: Option<String>,
    touch_label: Option<String>,
    label_colors: BTreeMap<String, String>,
}

impl RuleSet {
    /// Compile raw rules, uninteresting list first.
    ///
    /// The first pattern that fails to compile aborts the load.
    pub fn compile(raw: &RulesConfig) -> Result<Self> {
        let uninteresting_patterns =
            compile_patterns(PatternList::Uninteresting, &raw.uninteresting_label_patterns)?;
        let interesting_patterns =
            compile_patterns(PatternList::Interesting, &raw.interesting_label_patterns)?;

        tracing::debug!(
            uninteresting = uninteresting_patterns.len(),
            interesting = interesting_patterns.len(),
            "Compiled label patterns"
        );

        Ok(Self {
            interesting_query: raw.interesting_message_query.trim().to_string(),
            uninteresting_patterns,
            interesting_patterns,
            uninteresting_label: non_empty(&raw.apply_label_to_uninteresting),
            touch_label: non_empty(&raw.apply_label_on_touch),
            label_colors: raw.label_colors.clone(),
        })
    }

    pub fn interesting_query(&self) -> &str {
        &self.interesting_query
    }

    pub fn uninteresting_patterns(&self) -> &[Pattern] {
        &self.uninteresting_patterns
    }

    pub fn interesting_patterns(&self) -> &[Pattern] {
        &self.interesting_patterns
    }

    /// Label applied when uninteresting messages are marked, if configured
    pub fn uninteresting_label(&self) -> Option<&str> {
        self.uninteresting_label.as_deref()
    }

    /// Label applied by "touch", if configured
    pub fn touch_label(&self) -> Option<&str> {
        self.touch_label.as_deref()
    }

    /// Display color for a label. Lookup ignores case, as Gmail label names do.
    pub fn label_color(&self, label: &str) -> Option<&str> {
        self.label_colors
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(label))
            .map(|(_, color)| color.as_str())
    }

    pub fn label_colors(&self) -> &BTreeMap<String, String> {
        &self.label_colors
    }
}
