//! Error types for the trade mission bot.

use crate::mission::state::WorkflowPhase;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
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
}

/// Interaction host errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),
}

/// Forum publishing errors.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Publishing is not configured")]
    NotConfigured,

    #[error("Authentication with the forum failed: {0}")]
    Auth(String),

    #[error("Request to {channel} failed: {reason}")]
    RequestFailed { channel: String, reason: String },

    #[error("Post to {channel} was rejected: {reason}")]
    Rejected { channel: String, reason: String },

    #[error("Invalid response from forum: {0}")]
    InvalidResponse(String),
}

/// Errors raised by the trade mission workflow.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Trade mission is already {phase}; no further changes accepted")]
    Terminal { phase: WorkflowPhase },

    #[error("Cannot {action} while trade mission is {phase}")]
    InvalidTransition {
        phase: WorkflowPhase,
        action: &'static str,
    },

    #[error("Trade mission is incomplete, missing: {}", .missing.join(", "))]
    Incomplete { missing: Vec<&'static str> },

    #[error("Session key {got} does not match this trade mission ({expected})")]
    SessionMismatch { expected: String, got: String },

    #[error("No open trade mission for session {0}")]
    UnknownSession(String),

    #[error("Failed to save trade mission: {0}")]
    Persistence(#[from] DatabaseError),

    #[error("{}: {source}", publish_prefix(.saved))]
    Publish { saved: bool, source: PublishError },
}

fn publish_prefix(saved: &bool) -> &'static str {
    if *saved {
        "Trade mission saved but not published"
    } else {
        "Trade mission not published"
    }
}
