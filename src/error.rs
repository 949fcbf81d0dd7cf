//! Error types for Tourly.

/// Top-level error type for tour and step operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Translation error: {0}")]
    Upstream(#[from] TranslationError),

    #[error("Database error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    pub fn tour_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Tour",
            id: id.to_string(),
        }
    }

    pub fn step_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "Step",
            id: id.to_string(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Translation provider errors. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum TranslationError {
    #[error("No translation provider configured")]
    NotConfigured,

    #[error("Provider request failed ({status}): {reason}")]
    RequestFailed { status: String, reason: String },

    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),

    #[error("Failed to build translation prompt: {0}")]
    Prompt(String),
}

/// Result type alias for Tourly.
pub type Result<T> = std::result::Result<T, Error>;
