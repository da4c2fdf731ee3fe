//! Error types for the bot core.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Messenger error: {0}")]
    Messenger(#[from] MessengerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Repository/storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound delivery errors.
///
/// `RateLimited` is kept distinct so the broadcast loop can apply its
/// penalty delay without retrying the message.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("Failed to send to {recipient}: {reason}")]
    SendFailed { recipient: String, reason: String },

    #[error("Rate limited while sending to {recipient}")]
    RateLimited { recipient: String },
}

impl MessengerError {
    /// Whether this failure is the remote channel's rate limit.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Result type alias for the bot core.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_is_distinguishable() {
        let rl = MessengerError::RateLimited {
            recipient: "123".into(),
        };
        let other = MessengerError::SendFailed {
            recipient: "123".into(),
            reason: "bad request".into(),
        };
        assert!(rl.is_rate_limited());
        assert!(!other.is_rate_limited());
    }
}
