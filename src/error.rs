use std::fmt;

use thiserror::Error;

/// Type alias for Result with GmailError
pub type Result<T> = std::result::Result<T, GmailError>;

/// Which of the two configured pattern lists a pattern came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternList {
    Uninteresting,
    Interesting,
}

impl fmt::Display for PatternList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternList::Uninteresting => write!(f, "uninteresting_label_patterns"),
            PatternList::Interesting => write!(f, "interesting_label_patterns"),
        }
    }
}

/// Pipeline stage that issued a failing mailbox call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Fetch,
    LoadMetadata,
    AddLabels,
    Touch,
    Trash,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Fetch => "fetch",
            PipelineStage::LoadMetadata => "load metadata",
            PipelineStage::AddLabels => "add labels",
            PipelineStage::Touch => "touch",
            PipelineStage::Trash => "trash",
        };
        f.write_str(name)
    }
}

/// Error types for the triage tool
#[derive(Error, Debug)]
pub enum GmailError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded - should retry after specified seconds
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// User interrupted a prompt
    #[error("Operation cancelled: {0}")]
    OperationCancelled(String),

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Invalid message format or parsing error
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// Label-related errors
    #[error("Label error: {0}")]
    LabelError(String),

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A label pattern failed to compile; no rule set was produced
    #[error("Configuration error: invalid pattern \"{pattern}\" in {list}: {reason}")]
    InvalidPattern {
        list: PatternList,
        pattern: String,
        reason: String,
    },

    /// Both interest filters were requested at once
    #[error("Configuration error: --interesting and --uninteresting are mutually exclusive")]
    ConflictingFilters,

    /// Touch requested but no touch label is configured
    #[error("Configuration error: touch requested but rules.apply_label_on_touch is not set")]
    TouchLabelNotConfigured,

    /// Uninteresting labelling requested but no label is configured
    #[error("Configuration error: rules.apply_label_to_uninteresting is not set")]
    UninterestingLabelNotConfigured,

    /// Quota exceeded
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// A mailbox call failed while the pipeline was in `stage`
    #[error("{stage} failed: {source}")]
    Stage {
        stage: PipelineStage,
        #[source]
        source: Box<GmailError>,
    },

    /// Generic catch-all error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl GmailError {
    /// Wrap a mailbox failure with the stage it happened in
    pub fn at_stage(stage: PipelineStage, source: GmailError) -> Self {
        GmailError::Stage {
            stage,
            source: Box::new(source),
        }
    }

    /// Check if the error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            GmailError::RateLimitExceeded { .. }
            | GmailError::ServerError { .. }
            | GmailError::NetworkError(_) => true,
            GmailError::Stage { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// Check if the error is permanent and should not be retried
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Errors raised before any mailbox call is made
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GmailError::ConfigError(_)
                | GmailError::InvalidPattern { .. }
                | GmailError::ConflictingFilters
                | GmailError::TouchLabelNotConfigured
                | GmailError::UninterestingLabelNotConfigured
        )
    }

    /// The pipeline stage a failure was raised in, if any
    pub fn stage(&self) -> Option<PipelineStage> {
        match self {
            GmailError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The header is either delay-seconds ("120") or an HTTP-date. Returns 5 seconds
/// when the header is missing, invalid, or in the past.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|at| at.duration_since(std::time::SystemTime::now()).ok())
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for GmailError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => GmailError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => GmailError::MessageNotFound("Resource not found".to_string()),
                    400 => GmailError::BadRequest(message),
                    403 => GmailError::Forbidden(message),
                    500..=599 => GmailError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => GmailError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => GmailError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                GmailError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => GmailError::NetworkError(err.to_string()),
            google_gmail1::Error::MissingToken(ref err) => {
                GmailError::AuthError(format!("Missing token: {}", err))
            }
            _ => GmailError::ApiError(error.to_string()),
        }
    }
}
