//! Unified error handling for the client runtime.

use thiserror::Error;

/// Errors surfaced by the synchronization runtime.
///
/// Nothing here is fatal: transport errors trigger reconnection instead of
/// propagating to callers, and handler errors are isolated per change event.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("subscription closed")]
    SubscriptionClosed,

    #[error("handler error: {0}")]
    Handler(String),

    #[error("collection sync torn down")]
    TornDown,
}

impl SyncError {
    /// A handler failure with context.
    pub fn handler(message: impl Into<String>) -> Self {
        SyncError::Handler(message.into())
    }

    /// A transport failure with context.
    pub fn transport(message: impl Into<String>) -> Self {
        SyncError::Transport(message.into())
    }
}

/// Result type alias for the client runtime.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SyncError::transport("socket reset");
        assert_eq!(err.to_string(), "transport error: socket reset");

        let err = SyncError::handler("callback panicked on x");
        assert_eq!(err.to_string(), "handler error: callback panicked on x");
    }
}
