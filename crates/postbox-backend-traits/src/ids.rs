//! Chat and message identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a chat inside the backend store.
///
/// `ChatId(0)` never names a real chat; engines use it for "several chats".
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ChatId(pub u32);

/// Identifier of a message inside the backend store.
///
/// `MsgId(0)` never names a real message; engines use it for bulk changes.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MsgId(pub u32);

impl ChatId {
    /// Whether this id refers to a specific chat.
    pub fn is_specific(self) -> bool {
        self.0 != 0
    }
}

impl MsgId {
    /// Whether this id refers to a specific message.
    pub fn is_specific(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chat#{}", self.0)
    }
}

impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg#{}", self.0)
    }
}

impl From<u32> for ChatId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<u32> for MsgId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}
