//! Core error types for topthree-core.
//!
//! This module defines the error hierarchy using thiserror. Planner
//! failures that a user can recover from (`DailyLimitReached`,
//! `NoFreezeTokens`) are typed variants checked before any mutation, so a
//! returned error never implies a partially-applied change.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Core error type for topthree-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The destination day already holds the maximum number of priorities.
    #[error("{day} already has {limit} priorities; move one out first")]
    DailyLimitReached { day: NaiveDate, limit: usize },

    /// A freeze token was requested but none are available.
    #[error("No freeze tokens available")]
    NoFreezeTokens,

    /// No item with the given id exists in the store.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Calendar collaborator errors
    #[error("Calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Whether the caller can fix the condition without outside help
    /// (move an item out, wait for a token, edit the input).
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::DailyLimitReached { .. }
                | CoreError::NoFreezeTokens
                | CoreError::Validation(_)
                | CoreError::Calendar(CalendarError::Conflict { .. })
        )
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded into a model value
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Could not determine or create the data directory
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Errors from the auth collaborator that supplies bearer tokens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No stored credentials
    #[error("Not signed in to the calendar provider")]
    NotAuthenticated,

    /// Token refresh failed
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// OS keyring could not be read or written
    #[error("Keyring error: {0}")]
    Keyring(String),
}

/// Calendar REST collaborator errors.
#[derive(Error, Debug)]
pub enum CalendarError {
    /// Not signed in / token refresh failed
    #[error("{0}")]
    Auth(#[from] AuthError),

    /// Transport-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-success HTTP status from the API
    #[error("Calendar API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Malformed or unexpected payload
    #[error("Invalid calendar response: {0}")]
    InvalidResponse(String),

    /// Submission attempted while the proposal overlaps a busy range
    #[error("Proposed slot {start} - {end} conflicts with an existing event")]
    Conflict { start: NaiveDateTime, end: NaiveDateTime },

    /// Submission attempted with no slot proposed
    #[error("No slot has been proposed")]
    NoProposal,
}

impl From<reqwest::Error> for CalendarError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            CalendarError::InvalidResponse(err.to_string())
        } else if let Some(status) = err.status() {
            CalendarError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            CalendarError::Network(err.to_string())
        }
    }
}

/// Validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Title empty after trimming
    #[error("Title must not be empty")]
    EmptyTitle,

    /// Streaks are only defined up to today
    #[error("{day} is after today ({today})")]
    FutureDay { day: NaiveDate, today: NaiveDate },

    /// A reorder list must contain items of exactly one day
    #[error("Reorder list must contain items from a single day")]
    MixedDays,

    /// Backlog items are unordered and have no rank to change
    #[error("Backlog items cannot be reordered")]
    BacklogNotOrderable,

    /// Backlog items are never scheduled on a calendar
    #[error("Backlog items cannot be scheduled")]
    BacklogNotSchedulable,

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _msg) => {
                if e.code == rusqlite::ErrorCode::DatabaseLocked
                    || e.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<AuthError> for CoreError {
    fn from(err: AuthError) -> Self {
        CoreError::Calendar(CalendarError::Auth(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
