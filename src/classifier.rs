//! Label-based interest classification

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::Message;
use crate::rules::{Pattern, RuleSet};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum InterestVerdict {
    Interesting,
    Uninteresting,
    Neutral,
}

impl fmt::Display for InterestVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InterestVerdict::Interesting => "Interesting",
            InterestVerdict::Uninteresting => "Uninteresting",
            InterestVerdict::Neutral => "Neutral",
        };
        f.write_str(name)
    }
}

fn any_label_matches<I, S>(labels: I, patterns: &[Pattern]) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    labels
        .into_iter()
        .any(|label| patterns.iter().any(|p| p.matches(label.as_ref())))
}

/// Classify a label set.
///
/// Uninteresting patterns are checked before interesting ones, so a label set
/// matching both lists is `Uninteresting`.
pub fn classify<I, S>(labels: I, rules: &RuleSet) -> InterestVerdict
where
    I: IntoIterator<Item = S> + Copy,
    S: AsRef<str>,
{
    if any_label_matches(labels, rules.uninteresting_patterns()) {
        InterestVerdict::Uninteresting
    } else if any_label_matches(labels, rules.interesting_patterns()) {
        InterestVerdict::Interesting
    } else {
        InterestVerdict::Neutral
    }
}

/// Classifier bound to one rule set
#[derive(Debug, Clone, Copy)]
pub struct InterestClassifier<'a> {
    rules: &'a RuleSet,
}

impl<'a> InterestClassifier<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    pub fn classify(&self, message: &Message) -> InterestVerdict {
        classify(&message.labels, self.rules)
    }

    /// Per-verdict totals, in (interesting, uninteresting, neutral) order
    pub fn tally(&self, messages: &[Message]) -> (usize, usize, usize) {
        messages
            .iter()
            .fold((0, 0, 0), |(i, u, n), msg| match self.classify(msg) {
                InterestVerdict::Interesting => (i + 1, u, n),
                InterestVerdict::Uninteresting => (i, u + 1, n),
                InterestVerdict::Neutral => (i, u, n + 1),
            })
    }
}
