use thiserror::Error;

/// Custom error type for Juryscope operations.
#[derive(Debug, Error)]
pub enum JuryscopeError {
    /// Corpus is empty or too small for the requested analysis.
    #[error("Input error: {0}")]
    Input(String),

    /// Contradictory or out-of-range parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A candidate configuration cannot produce a valid partition.
    ///
    /// Searches record this as `valid = false` in their leaderboard; it only
    /// reaches callers that invoke the clustering engine directly.
    #[error("Degenerate clustering: {0}")]
    DegenerateClustering(String),

    /// Embedding or label synthesis call failed or timed out.
    #[error("External service '{service}' failed: {message}")]
    ExternalService { service: String, message: String },

    /// The run was superseded and abandoned.
    #[error("Analysis cancelled")]
    Cancelled,

    /// Result or input (de)serialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(String),
}

impl JuryscopeError {
    /// Shorthand for a [`JuryscopeError::ExternalService`] error.
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        JuryscopeError::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Errors that must fail the run instead of being recovered locally.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JuryscopeError::Input(_)
                | JuryscopeError::Configuration(_)
                | JuryscopeError::Cancelled
                | JuryscopeError::Io(_)
                | JuryscopeError::Serialization(_)
        )
    }
}

impl From<serde_json::Error> for JuryscopeError {
    fn from(err: serde_json::Error) -> Self {
        JuryscopeError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml_ng::Error> for JuryscopeError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        JuryscopeError::Serialization(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for JuryscopeError {
    fn from(err: toml::de::Error) -> Self {
        JuryscopeError::Configuration(format!("TOML parse error: {}", err))
    }
}

impl From<std::io::Error> for JuryscopeError {
    fn from(err: std::io::Error) -> Self {
        JuryscopeError::Io(err.to_string())
    }
}
