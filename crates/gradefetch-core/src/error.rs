use thiserror::Error;

/// Validation errors for inbound lookup keys and configured identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("roll number cannot be empty")]
    EmptyRoll,
    #[error("roll number length {len} exceeds max {max}")]
    RollTooLong { len: usize, max: usize },
    #[error("roll number contains invalid character '{ch}' at index {index}")]
    RollInvalidChar { ch: char, index: usize },

    #[error("regulation must be a four digit year: '{value}'")]
    InvalidRegulation { value: String },

    #[error("program name cannot be empty")]
    EmptyProgram,
    #[error("program name length {len} exceeds max {max}")]
    ProgramTooLong { len: usize, max: usize },

    #[error("source id must be lowercase ascii letters, digits, '-' or '_': '{value}'")]
    InvalidSourceId { value: String },

    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },
}

/// Registry-level errors. Only these and [`ValidationError`] are hard errors
/// surfaced to callers; per-source query failures degrade to misses.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("source '{id}' is not configured")]
    UnknownSource { id: String },

    #[error("source '{id}' is configured more than once")]
    DuplicateSource { id: String },

    #[error("search order references unknown source '{id}'")]
    UnknownSearchOrderEntry { id: String },

    #[error("source '{id}' is unavailable: {message}")]
    Unavailable { id: String, message: String },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
