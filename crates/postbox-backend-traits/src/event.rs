//! Raw events emitted by a backend

use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MsgId};

/// Configuration progress value reporting success.
pub const CONFIGURE_PROGRESS_DONE: u16 = 1000;

/// Configuration progress value reporting that configuration failed.
pub const CONFIGURE_PROGRESS_FAILED: u16 = 0;

/// An event as the backend emits it, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawEvent {
    /// A message from a known sender arrived in `chat_id`.
    IncomingMessage {
        /// Chat the message was filed into
        chat_id: ChatId,
        /// The new message
        msg_id: MsgId,
    },
    /// Messages changed. Also fired for messages from unknown senders, which
    /// never get an `IncomingMessage`.
    MessagesChanged {
        /// Chat the change concerns (may be `0`)
        chat_id: ChatId,
        /// Message the change concerns (may be `0`)
        msg_id: MsgId,
    },
    /// The IMAP connection is up. Also fired on every reconnection.
    ImapConnected,
    /// Account configuration progress in permille (`0` = failed, `1000` = done).
    ConfigureProgress {
        /// Progress, 0..=1000
        permille: u16,
    },
}

impl RawEvent {
    /// Short name for logs.
    pub fn tag(&self) -> &'static str {
        match self {
            RawEvent::IncomingMessage { .. } => "IncomingMessage",
            RawEvent::MessagesChanged { .. } => "MessagesChanged",
            RawEvent::ImapConnected => "ImapConnected",
            RawEvent::ConfigureProgress { .. } => "ConfigureProgress",
        }
    }
}
