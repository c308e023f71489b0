//! Error taxonomy shared by every MoMo crate.

use thiserror::Error;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, MomoError>;

#[derive(Debug, Error)]
pub enum MomoError {
    /// No snapshot has ever been loaded.
    #[error("Dataset unavailable")]
    DataUnavailable,

    /// Notification time outside 00:00-23:59.
    #[error("Invalid notification time {hour}:{minute} (hour 0-23, minute 0-59)")]
    InvalidTimeRange { hour: u32, minute: u32 },

    /// The recipient can never be reached again (blocked, deactivated).
    #[error("Permanent delivery failure: {0}")]
    DeliveryPermanent(String),

    /// Network hiccup, rate limit or upstream 5xx.
    #[error("Transient delivery failure: {0}")]
    DeliveryTransient(String),

    #[error("Dataset refresh failed: {0}")]
    Refresh(String),

    #[error("Invalid scope selector: {0}")]
    InvalidSelector(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MomoError {
    /// Shorthand used by the SQLite layer.
    pub fn db(context: &str, e: impl std::fmt::Display) -> Self {
        Self::Database(format!("{context}: {e}"))
    }
}
