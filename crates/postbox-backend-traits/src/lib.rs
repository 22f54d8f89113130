//! Postbox backend contract
//!
//! The postbox core never talks to a mail/chat engine directly. Everything it
//! needs from one (opening the local store, configuring an account, looking up
//! chats and messages, promoting an unknown-sender message into a chat, and a
//! stream of lifecycle/message events) goes through the [`Backend`] trait.
//!
//! Implementations are expected to be cheap to share behind an `Arc` and to
//! deliver events from whatever thread they like: the core funnels them into
//! its own queue before acting on them.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::path::Path;

pub mod error;
pub mod event;
pub mod ids;
pub mod types;

pub use error::BackendError;
pub use event::{CONFIGURE_PROGRESS_DONE, CONFIGURE_PROGRESS_FAILED, RawEvent};
pub use ids::{ChatId, MsgId};
pub use types::{Chat, Credentials, Message};

/// Callback a backend invokes for every event it emits.
pub type EventSink = Box<dyn Fn(RawEvent) + Send + Sync>;

/// Operations the postbox core relies on.
///
/// All methods take `&self`; implementations handle their own interior
/// locking.
pub trait Backend: Send + Sync {
    /// Register the sink that receives every subsequent event.
    ///
    /// Called once, before [`Backend::open`], so no event emitted while the
    /// store opens is lost. A later call replaces the previous sink.
    fn subscribe(&self, sink: EventSink);

    /// Open (or create) the local store rooted at `root`.
    fn open(&self, root: &Path) -> Result<(), BackendError>;

    /// Whether the opened store already holds a configured account.
    fn is_configured(&self) -> bool;

    /// Start configuring the account.
    ///
    /// Returns once configuration has been *started*; completion is reported
    /// through [`RawEvent::ConfigureProgress`] events.
    fn configure(&self, credentials: &Credentials) -> Result<(), BackendError>;

    /// Look up a chat.
    fn chat(&self, id: ChatId) -> Result<Chat, BackendError>;

    /// Look up a message.
    fn message(&self, id: MsgId) -> Result<Message, BackendError>;

    /// Create (or find) a real chat for an unclassified message and move the
    /// message into it. Returns the id of that chat.
    fn create_chat_by_message(&self, id: MsgId) -> Result<ChatId, BackendError>;

    /// Release store handles and network connections. Must be idempotent.
    fn close(&self);
}
