//! Error types for SchemaMover

use thiserror::Error;

/// Result type for SchemaMover operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for SchemaMover
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Parse error in `{statement}`: {reason}")]
    ParseError { statement: String, reason: String },

    #[error("Unsupported statement `{keyword}` in `{statement}`")]
    UnsupportedStatement { keyword: String, statement: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Introspection error: {0}")]
    IntrospectionError(String),

    #[error("Execution of `{statement}` failed: {message}")]
    HardExecutionError { statement: String, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl Error {
    /// Build a parse error, keeping only a readable prefix of the statement
    pub fn parse(statement: &str, reason: impl Into<String>) -> Self {
        Error::ParseError {
            statement: crate::utils::naming::preview(statement, 80),
            reason: reason.into(),
        }
    }
}

/// An `ALTER`/`CREATE` operation the database rejected.
///
/// These are collected during execution rather than propagated; most of them
/// mean the object was already in the desired state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("`{statement}` raised: {message}")]
pub struct SoftExecutionError {
    pub statement: String,
    pub message: String,
}

/// Config parse failures
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::ConfigError(format!("Failed to parse config file: {}", error))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Error::ConfigError(format!("Failed to parse config file: {}", error))
    }
}

impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(format!("Failed to parse config file: {}", error))
    }
}

/// Ignore rules are user-supplied regexes
impl From<regex::Error> for Error {
    fn from(error: regex::Error) -> Self {
        Error::ConfigError(format!("Invalid ignore pattern: {}", error))
    }
}
