//! Error types for backend operations

use thiserror::Error;

use crate::ids::{ChatId, MsgId};

/// Error returned by [`crate::Backend`] operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The store has not been opened (or was closed)
    #[error("store is not open")]
    NotOpen,

    /// The store could not be opened
    #[error("open failed: {0}")]
    Open(String),

    /// Configuration could not be started
    #[error("configure failed: {0}")]
    Configure(String),

    /// No chat with this id
    #[error("chat not found: {0}")]
    ChatNotFound(ChatId),

    /// No message with this id
    #[error("message not found: {0}")]
    MessageNotFound(MsgId),

    /// Other error
    #[error("error: {0}")]
    Other(String),
}

impl BackendError {
    /// Whether the error means an id did not resolve. Such errors are
    /// expected when event payloads race with local state.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ChatNotFound(_) | Self::MessageNotFound(_))
    }
}
