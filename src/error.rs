//! Error types for linkguard.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Task-queue transport errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Broker connection failed: {0}")]
    Connection(String),

    #[error("Queue declare failed: {0}")]
    Declare(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Consume failed: {0}")]
    Consume(String),

    #[error("Malformed task payload: {0}")]
    Payload(String),
}

/// Chat-platform (reply sink) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message to chat {chat_id}: {reason}")]
    SendFailed { chat_id: i64, reason: String },

    #[error("Update poll failed: {0}")]
    PollFailed(String),

    #[error("File download failed for token {token}: {reason}")]
    DownloadFailed { token: String, reason: String },

    #[error("Member listing failed for chat {chat_id}: {reason}")]
    MembersFailed { chat_id: i64, reason: String },
}

/// Result type alias for linkguard.
pub type Result<T> = std::result::Result<T, Error>;
