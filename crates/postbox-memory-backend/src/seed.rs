//! Declarative initial contents for a [`crate::MemoryBackend`]

use postbox_backend_traits::{Chat, ChatId, Message, MsgId};
use serde::{Deserialize, Serialize};

/// Where `create_chat_by_message` should file a given message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promotion {
    /// Unclassified message
    pub msg_id: MsgId,
    /// Chat the message ends up in
    pub chat_id: ChatId,
}

/// Everything a memory backend starts out with.
///
/// Deserializable so scenarios can live in JSON files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySeed {
    /// Store already holds a configured account
    pub configured: bool,
    /// Make `open` fail with this cause
    pub open_error: Option<String>,
    /// Make `configure` fail with this cause
    pub configure_error: Option<String>,
    /// Known chats
    pub chats: Vec<Chat>,
    /// Stored messages
    pub messages: Vec<Message>,
    /// Fixed promotion targets; messages without one get a fresh chat
    pub promotions: Vec<Promotion>,
}
