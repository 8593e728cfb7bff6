//! Error types shared by every layer of the dataprovider.

use crate::config::SettingsError;

/// Result type alias for dataprovider operations.
pub type Result<T> = std::result::Result<T, DataProviderError>;

/// Every failure a query, read or mutation can surface to its caller.
#[derive(Debug, thiserror::Error)]
pub enum DataProviderError {
    // === Parse errors ===
    #[error("cannot parse '{input}' at offset {position}: {message}")]
    Parse {
        input: String,
        position: usize,
        message: String,
    },

    #[error("invalid criterion '{input}' at offset {position}: {message}")]
    InvalidCriterion {
        input: String,
        position: usize,
        message: String,
    },

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    // === Validation errors ===
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("paths refer to several domains: {}", .0.join(", "))]
    AmbiguousDomain(Vec<String>),

    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("no backend available for domain '{0}'")]
    NoBackend(String),

    #[error("a backend is already registered for domain '{0}'")]
    DuplicateBackend(String),

    #[error("operator '{operator}' is not supported by {context}")]
    UnsupportedOperator { operator: String, context: String },

    #[error("invalid parameter '{name}': {message}")]
    InvalidParameter { name: String, message: String },

    #[error("cannot convert '{value}' to {target}")]
    Conversion { value: String, target: String },

    // === Backend compile errors ===
    #[error("no join path from table '{from}' to table '{to}'")]
    JoinGraph { from: String, to: String },

    #[error("cannot bucket time series: {0}")]
    TimeBounds(String),

    #[error("{0}")]
    Unsupported(String),

    // === Backend execution errors ===
    #[error("backend request failed: {0}")]
    BackendRequest(String),

    #[error("{0}")]
    BackendQuery(String),

    #[error("Cannot further browse results. Please use a more specific filter.")]
    ResultWindow,

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Configuration ===
    #[error(transparent)]
    Configuration(#[from] SettingsError),
}

impl DataProviderError {
    pub(crate) fn invalid_parameter(name: &str, message: impl Into<String>) -> Self {
        DataProviderError::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Byte offset of the offending token, for errors raised by the text parsers.
    pub fn position(&self) -> Option<usize> {
        match self {
            DataProviderError::Parse { position, .. }
            | DataProviderError::InvalidCriterion { position, .. } => Some(*position),
            _ => None,
        }
    }
}
