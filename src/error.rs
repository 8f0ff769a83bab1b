/// Error types for the link statistics aggregator
use thiserror::Error;

/// Main error type for aggregator construction and I/O
#[derive(Error, Debug)]
pub enum LinkStatsError {
    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A required option was not supplied
    #[error("{0} must be set in linkstatmetric filter plugin")]
    MissingOption(&'static str),

    /// The field path could not be split into dimensions and a measured field
    #[error("Invalid field path '{0}': need at least one dimension and a measured field")]
    InvalidFieldPath(String),

    /// Input could not be turned into an event
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// YAML parsing failed
    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    /// JSON parsing failed
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime execution error
    #[error("Runtime error: {0}")]
    Runtime(String),
}

/// Result type alias for aggregator operations
pub type Result<T> = std::result::Result<T, LinkStatsError>;
