//! Error types for AttendChain
//!
//! Integrity failures (a tampered block, a broken anchor) are deliberately
//! absent here: the validator reports them as booleans, never as errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("Invalid input: {0}")]
    ValidationInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Mining budget of {attempts} attempts exhausted at difficulty {difficulty}")]
    MiningBudgetExhausted { attempts: u64, difficulty: usize },

    #[error("Background task failed: {0}")]
    Join(String),
}

impl LedgerError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound { kind, id: id.into() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::ValidationInput(msg.into())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Storage(format!("sqlite: {}", err))
    }
}

impl From<tempfile::PersistError> for LedgerError {
    fn from(err: tempfile::PersistError) -> Self {
        LedgerError::Storage(format!("atomic replace failed: {}", err.error))
    }
}

impl From<toml::de::Error> for LedgerError {
    fn from(err: toml::de::Error) -> Self {
        LedgerError::Config(err.to_string())
    }
}

impl From<tokio::task::JoinError> for LedgerError {
    fn from(err: tokio::task::JoinError) -> Self {
        LedgerError::Join(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
