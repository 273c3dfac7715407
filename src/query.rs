//! Gmail search query construction

use std::fmt;

use crate::error::{GmailError, Result};

/// Upper bound on how many messages a query returns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultCap {
    #[default]
    Unbounded,
    AtMost(usize),
}

impl ResultCap {
    /// The command-line sentinel for "no cap"
    pub const UNBOUNDED_SENTINEL: i64 = -1;

    /// Convert a command-line `--max` value; `-1` means unbounded
    pub fn from_flag(max: i64) -> Result<Self> {
        match max {
            Self::UNBOUNDED_SENTINEL => Ok(ResultCap::Unbounded),
            n if n > 0 => usize::try_from(n)
                .map(ResultCap::AtMost)
                .map_err(|_| GmailError::ConfigError(format!("--max {} is too large", n))),
            n => Err(GmailError::ConfigError(format!(
                "--max must be a positive number or -1 for no limit, got {}",
                n
            ))),
        }
    }

    /// How many more results may be taken after `taken` have been collected
    pub fn remaining(self, taken: usize) -> Option<usize> {
        match self {
            ResultCap::Unbounded => None,
            ResultCap::AtMost(n) => Some(n.saturating_sub(taken)),
        }
    }
}

impl fmt::Display for ResultCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCap::Unbounded => f.write_str("unbounded"),
            ResultCap::AtMost(n) => write!(f, "at most {}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QuerySpec {
    pub label_filters: Vec<String>,
    pub free_text: Option<String>,
    pub cap: ResultCap,
}

impl QuerySpec {
    pub fn new(label_filters: Vec<String>, free_text: Option<String>, cap: ResultCap) -> Self {
        // Blank text is dropped; anything else is passed through untouched
        let free_text = free_text.filter(|text| !text.trim().is_empty());
        Self {
            label_filters,
            free_text,
            cap,
        }
    }

    /// Render the Gmail query.
    ///
    /// Each label filter becomes `label:(<filter>) ` in order; free text, if any,
    /// is appended last followed by a space.
    pub fn build(&self) -> String {
        let mut query = String::new();
        for label in &self.label_filters {
            query.push_str("label:(");
            query.push_str(label);
            query.push_str(") ");
        }
        if let Some(text) = &self.free_text {
            query.push_str(text);
            query.push(' ');
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_then_free_text() {
        let spec = QuerySpec::new(
            vec!["work".to_string(), "urgent".to_string()],
            Some("is:unread".to_string()),
            ResultCap::Unbounded,
        );
        assert_eq!(spec.build(), "label:(work) label:(urgent) is:unread ");
    }

    #[test]
    fn test_labels_only() {
        let spec = QuerySpec::new(vec!["a|b".to_string()], None, ResultCap::Unbounded);
        assert_eq!(spec.build(), "label:(a|b) ");
    }

    #[test]
    fn test_free_text_only() {
        let spec = QuerySpec::new(vec![], Some("from:boss".to_string()), ResultCap::Unbounded);
        assert_eq!(spec.build(), "from:boss ");
    }

    #[test]
    fn test_free_text_is_kept_verbatim() {
        let spec = QuerySpec::new(vec![], Some("  from:x  ".to_string()), ResultCap::Unbounded);
        assert_eq!(spec.build(), "  from:x   ");
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(QuerySpec::default().build(), "");

        let blank = QuerySpec::new(vec![], Some("   ".to_string()), ResultCap::Unbounded);
        assert_eq!(blank.free_text, None);
        assert_eq!(blank.build(), "");
    }

    #[test]
    fn test_cap_from_flag() {
        assert_eq!(ResultCap::from_flag(-1).unwrap(), ResultCap::Unbounded);
        assert_eq!(ResultCap::from_flag(25).unwrap(), ResultCap::AtMost(25));
        assert!(ResultCap::from_flag(0).unwrap_err().is_configuration());
        assert!(ResultCap::from_flag(-2).is_err());
    }

    #[test]
    fn test_cap_remaining() {
        assert_eq!(ResultCap::Unbounded.remaining(1000), None);
        assert_eq!(ResultCap::AtMost(10).remaining(4), Some(6));
        assert_eq!(ResultCap::AtMost(10).remaining(12), Some(0));
    }
}
