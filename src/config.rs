use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{GmailError, Result};
use crate::rules::RuleSet;

/// Directory under the user's home holding the configuration
pub const CONFIG_DIR_NAME: &str = ".gmailcli";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub gmail: GmailConfig,
}

/// Raw classification rules, before pattern compilation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default = "default_interesting_query", alias = "InterestingMessageQuery")]
    pub interesting_message_query: String,
    #[serde(default, alias = "UninterestingLabelPatterns")]
    pub uninteresting_label_patterns: Vec<String>,
    #[serde(default, alias = "InterestingLabelPatterns")]
    pub interesting_label_patterns: Vec<String>,
    #[serde(default, alias = "ApplyLabelToUninteresting")]
    pub apply_label_to_uninteresting: String,
    #[serde(default, alias = "ApplyLabelOnTouch")]
    pub apply_label_on_touch: String,
    #[serde(default, alias = "LabelColors")]
    pub label_colors: BTreeMap<String, String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            interesting_message_query: default_interesting_query(),
            uninteresting_label_patterns: Vec::new(),
            interesting_label_patterns: Vec::new(),
            apply_label_to_uninteresting: String::new(),
            apply_label_on_touch: String::new(),
            label_colors: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub dry_run: bool,
    /// In quiet mode, apply requested mutations without asking
    #[serde(default)]
    pub assume_yes_when_quiet: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmailConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
        }
    }
}

fn default_interesting_query() -> String {
    "is:unread in:inbox".to_string()
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_page_size() -> u32 {
    500
}

/// `~/.gmailcli`, or the current directory if no home directory is known
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// `~/.gmailcli/config.toml`
pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

impl Config {
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config = Self::parse(&content)?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Parse and validate TOML configuration text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| GmailError::ConfigError(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        tracing::debug!("config: {:?}", config);
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                GmailError::ConfigError(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| GmailError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        tokio::fs::write(path, content)
            .await
            .map_err(|e| GmailError::ConfigError(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Validate configuration values.
    ///
    /// Pattern syntax is not checked here; that happens when the rule set is compiled.
    pub fn validate(&self) -> Result<()> {
        if self.gmail.max_concurrent_requests == 0 {
            return Err(GmailError::ConfigError(
                "gmail.max_concurrent_requests must be at least 1".to_string(),
            ));
        }
        if self.gmail.max_concurrent_requests > 50 {
            return Err(GmailError::ConfigError(
                "gmail.max_concurrent_requests cannot exceed 50".to_string(),
            ));
        }

        if self.gmail.max_retries > 10 {
            return Err(GmailError::ConfigError(
                "gmail.max_retries cannot exceed 10".to_string(),
            ));
        }

        if self.gmail.page_size == 0 || self.gmail.page_size > 500 {
            return Err(GmailError::ConfigError(
                "gmail.page_size must be between 1 and 500".to_string(),
            ));
        }

        for (list, patterns) in [
            ("uninteresting_label_patterns", &self.rules.uninteresting_label_patterns),
            ("interesting_label_patterns", &self.rules.interesting_label_patterns),
        ] {
            if patterns.iter().any(|p| p.is_empty()) {
                tracing::warn!("rules.{} has an empty pattern, which matches every label", list);
            }
        }

        for (label, color) in &self.rules.label_colors {
            if label.trim().is_empty() || color.trim().is_empty() {
                return Err(GmailError::ConfigError(
                    "rules.label_colors entries need a label name and a color".to_string(),
                ));
            }
        }

        tracing::debug!("Configuration validation passed");
        Ok(())
    }

    /// Create an example configuration file
    pub async fn create_example(path: &Path) -> Result<()> {
        let mut config = Self::default();
        config.rules.uninteresting_label_patterns = vec!["^promotions?$".to_string(), "spam".to_string()];
        config.rules.interesting_label_patterns = vec!["^inbox$".to_string(), "important".to_string()];
        config.rules.apply_label_on_touch = "triaged".to_string();
        config.rules.apply_label_to_uninteresting = "uninteresting".to_string();
        config.save(path).await
    }
}

/// Something that can produce the process's compiled rule set
#[async_trait]
pub trait ConfigSource: Send + Sync {
    async fn load_config(&self) -> Result<Config>;

    /// Load configuration and compile its rules; fails if any pattern is invalid
    async fn load_rules(&self) -> Result<RuleSet> {
        let config = self.load_config().await?;
        RuleSet::compile(&config.rules)
    }
}

/// Configuration read from a TOML file on disk
#[derive(Debug, Clone)]
pub struct FileConfigSource {
    path: PathBuf,
}

impl FileConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConfigSource for FileConfigSource {
    async fn load_config(&self) -> Result<Config> {
        Config::load(&self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.rules.interesting_message_query, "is:unread in:inbox");
        assert!(config.rules.uninteresting_label_patterns.is_empty());
        assert!(config.rules.interesting_label_patterns.is_empty());
        assert!(config.rules.apply_label_on_touch.is_empty());
        assert!(config.rules.label_colors.is_empty());

        assert!(!config.execution.dry_run);
        assert!(!config.execution.assume_yes_when_quiet);

        assert_eq!(config.gmail.max_concurrent_requests, 10);
        assert_eq!(config.gmail.max_retries, 3);
        assert_eq!(config.gmail.page_size, 500);

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_max_concurrent_bounds() {
        let mut config = Config::default();
        config.gmail.max_concurrent_requests = 0;
        assert!(config.validate().unwrap_err().to_string().contains("at least 1"));

        config.gmail.max_concurrent_requests = 51;
        assert!(config.validate().unwrap_err().to_string().contains("cannot exceed 50"));

        config.gmail.max_concurrent_requests = 50;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_page_size() {
        let mut config = Config::default();
        config.gmail.page_size = 0;
        assert!(config.validate().is_err());

        config.gmail.page_size = 501;
        assert!(config.validate().is_err());

        config.gmail.page_size = 1;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_pattern_is_accepted_and_matches_everything() {
        let config = Config::parse(
            r#"
[rules]
interesting_label_patterns = [""]
"#,
        )
        .unwrap();
        assert_eq!(config.rules.interesting_label_patterns, vec![String::new()]);

        let rules = crate::rules::RuleSet::compile(&config.rules).unwrap();
        assert!(rules.interesting_patterns()[0].matches("anything"));
    }

    #[test]
    fn test_config_validation_blank_color() {
        let mut config = Config::default();
        config.rules.label_colors.insert("work".to_string(), " ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_snake_case_keys() {
        let config = Config::parse(
            r##"
[rules]
interesting_message_query = "is:starred"
uninteresting_label_patterns = ["spam", "^promo"]
interesting_label_patterns = ["inbox"]
apply_label_on_touch = "touched"

[rules.label_colors]
touched = "#16a766"

[execution]
assume_yes_when_quiet = true
"##,
        )
        .unwrap();

        assert_eq!(config.rules.interesting_message_query, "is:starred");
        assert_eq!(config.rules.uninteresting_label_patterns, vec!["spam", "^promo"]);
        assert_eq!(config.rules.apply_label_on_touch, "touched");
        assert_eq!(config.rules.label_colors.get("touched").map(String::as_str), Some("#16a766"));
        assert!(config.execution.assume_yes_when_quiet);
        // untouched sections keep defaults
        assert_eq!(config.gmail.max_retries, 3);
    }

    #[test]
    fn test_parse_accepts_legacy_key_names() {
        let config = Config::parse(
            r#"
[rules]
InterestingMessageQuery = "is:unread"
UninterestingLabelPatterns = ["spam"]
InterestingLabelPatterns = ["inbox"]
ApplyLabelToUninteresting = "meh"
ApplyLabelOnTouch = "seen"
"#,
        )
        .unwrap();

        assert_eq!(config.rules.interesting_message_query, "is:unread");
        assert_eq!(config.rules.uninteresting_label_patterns, vec!["spam"]);
        assert_eq!(config.rules.apply_label_to_uninteresting, "meh");
        assert_eq!(config.rules.apply_label_on_touch, "seen");
    }

    #[tokio::test]
    async fn test_config_load_nonexistent_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("missing.toml")).await.unwrap();
        assert_eq!(config.gmail.page_size, 500);
    }

    #[tokio::test]
    async fn test_config_load_invalid_toml() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "this is not valid toml {[}]")
            .await
            .unwrap();

        let result = Config::load(temp_file.path()).await;
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Failed to parse config file"));
    }

    #[tokio::test]
    async fn test_config_create_example_loads_and_compiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        Config::create_example(&path).await.unwrap();
        assert!(path.exists());

        let rules = FileConfigSource::new(&path).load_rules().await.unwrap();
        assert_eq!(rules.touch_label(), Some("triaged"));
        assert_eq!(rules.uninteresting_patterns().len(), 2);
    }

    #[tokio::test]
    async fn test_load_rules_rejects_bad_pattern() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(
            temp_file.path(),
            "[rules]\nuninteresting_label_patterns = [\"(unclosed\"]\n",
        )
        .await
        .unwrap();

        let err = FileConfigSource::new(temp_file.path())
            .load_rules()
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("(unclosed"));
    }

    #[test]
    fn test_default_config_path_ends_with_file_name() {
        let path = default_config_path();
        assert!(path.ends_with(CONFIG_FILE_NAME));
    }
}
