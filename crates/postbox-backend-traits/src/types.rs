//! Records returned by backend lookups

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{ChatId, MsgId};

/// A conversation the application can address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id
    pub id: ChatId,
    /// Display name
    pub name: String,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message id
    pub id: MsgId,
    /// Chat the message currently lives in
    pub chat_id: ChatId,
    /// Sender address
    pub from_addr: String,
    /// Plain-text body
    pub text: String,
    /// Sender is not associated with any chat yet (the "deaddrop")
    #[serde(default)]
    pub unclassified: bool,
}

impl Message {
    /// Whether the message still sits in the unknown-sender bucket and must be
    /// promoted before it has an addressable chat.
    pub fn is_unclassified(&self) -> bool {
        self.unclassified
    }
}

/// Account credentials handed to [`crate::Backend::configure`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Email address of the account
    pub address: String,
    /// Account password
    pub password: String,
}

impl Credentials {
    /// Build credentials from an address and password.
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("address", &self.address)
            .field("password", &"<redacted>")
            .finish()
    }
}
