//! Memory-based backend for postbox.
//!
//! [`MemoryBackend`] implements the [`Backend`] contract entirely in memory.
//! It is non-persistent and never touches the network; the "engine" side of
//! the contract is driven by hand through [`MemoryBackend::emit`].
//!
//! It is the backend used by the postbox tests and by `postbox simulate`.
//!
//! ```rust
//! use postbox_backend_traits::{Backend, Chat, ChatId, Message, MsgId};
//! use postbox_memory_backend::MemoryBackend;
//!
//! let backend = MemoryBackend::new()
//!     .with_chat(Chat { id: ChatId(7), name: "alice".into() })
//!     .with_message(Message {
//!         id: MsgId(42),
//!         chat_id: ChatId(7),
//!         from_addr: "alice@example.org".into(),
//!         text: "hi".into(),
//!         unclassified: false,
//!     });
//! backend.open(std::path::Path::new("/tmp/postbox")).unwrap();
//! assert_eq!(backend.chat(ChatId(7)).unwrap().name, "alice");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use postbox_backend_traits::{
    Backend, BackendError, CONFIGURE_PROGRESS_DONE, Chat, ChatId, Credentials, EventSink,
    Message, MsgId, RawEvent,
};

mod seed;

pub use self::seed::{MemorySeed, Promotion};

/// First id handed out for chats created by promotion.
const FIRST_PROMOTED_CHAT_ID: u32 = 1000;

#[derive(Debug, Default)]
struct Store {
    open_root: Option<PathBuf>,
    configured: bool,
    /// A `configure` call succeeded and has not completed yet.
    configuring: bool,
    open_error: Option<String>,
    configure_error: Option<String>,
    chats: HashMap<ChatId, Chat>,
    messages: HashMap<MsgId, Message>,
    promotions: HashMap<MsgId, ChatId>,
    next_chat_id: u32,
    chat_lookup_failures: usize,

    // Observations for tests.
    open_calls: usize,
    configure_calls: Vec<Credentials>,
    promote_calls: Vec<MsgId>,
    close_count: usize,
}

impl Store {
    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.open_root.is_none() {
            return Err(BackendError::NotOpen);
        }
        Ok(())
    }

    fn allocate_chat_id(&mut self) -> ChatId {
        loop {
            let id = ChatId(self.next_chat_id);
            self.next_chat_id += 1;
            if !self.chats.contains_key(&id) {
                return id;
            }
        }
    }
}

/// In-memory [`Backend`].
pub struct MemoryBackend {
    store: RwLock<Store>,
    sink: Mutex<Option<EventSink>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Empty, unconfigured backend.
    pub fn new() -> Self {
        Self {
            store: RwLock::new(Store {
                next_chat_id: FIRST_PROMOTED_CHAT_ID,
                ..Store::default()
            }),
            sink: Mutex::new(None),
        }
    }

    /// Backend pre-populated from a [`MemorySeed`].
    pub fn from_seed(seed: MemorySeed) -> Self {
        let mut backend = Self::new()
            .with_configured(seed.configured)
            .with_chats(seed.chats)
            .with_messages(seed.messages);
        for p in seed.promotions {
            backend = backend.with_promotion(p.msg_id, p.chat_id);
        }
        if let Some(cause) = seed.open_error {
            backend = backend.with_open_error(cause);
        }
        if let Some(cause) = seed.configure_error {
            backend = backend.with_configure_error(cause);
        }
        backend
    }

    /// Sets whether the store already holds a configured account.
    pub fn with_configured(self, configured: bool) -> Self {
        self.store.write().configured = configured;
        self
    }

    /// Makes every `open` call fail with `cause`.
    pub fn with_open_error(self, cause: impl Into<String>) -> Self {
        self.store.write().open_error = Some(cause.into());
        self
    }

    /// Makes every `configure` call fail with `cause`.
    pub fn with_configure_error(self, cause: impl Into<String>) -> Self {
        self.store.write().configure_error = Some(cause.into());
        self
    }

    /// Adds a chat.
    pub fn with_chat(self, chat: Chat) -> Self {
        self.insert_chat(chat);
        self
    }

    /// Adds several chats.
    pub fn with_chats(self, chats: impl IntoIterator<Item = Chat>) -> Self {
        for chat in chats {
            self.insert_chat(chat);
        }
        self
    }

    /// Adds a message.
    pub fn with_message(self, message: Message) -> Self {
        self.insert_message(message);
        self
    }

    /// Adds several messages.
    pub fn with_messages(self, messages: impl IntoIterator<Item = Message>) -> Self {
        for message in messages {
            self.insert_message(message);
        }
        self
    }

    /// Pins the chat `create_chat_by_message(msg_id)` returns.
    pub fn with_promotion(self, msg_id: MsgId, chat_id: ChatId) -> Self {
        self.store.write().promotions.insert(msg_id, chat_id);
        self
    }

    /// Adds or replaces a chat at any time.
    pub fn insert_chat(&self, chat: Chat) {
        self.store.write().chats.insert(chat.id, chat);
    }

    /// Adds or replaces a message at any time (e.g. right before emitting
    /// the event announcing it).
    pub fn insert_message(&self, message: Message) {
        self.store.write().messages.insert(message.id, message);
    }

    /// Makes the next `n` chat lookups fail with `ChatNotFound`, as when an
    /// event races ahead of the engine's local state.
    pub fn fail_next_chat_lookups(&self, n: usize) {
        self.store.write().chat_lookup_failures = n;
    }

    /// Emits `event` to the subscribed sink, as the engine would.
    ///
    /// A `ConfigureProgress` of 1000 also marks the store configured, but
    /// only once `configure` has been called. Returns `false` when nobody is
    /// subscribed.
    pub fn emit(&self, event: RawEvent) -> bool {
        if event
            == (RawEvent::ConfigureProgress {
                permille: CONFIGURE_PROGRESS_DONE,
            })
        {
            let mut store = self.store.write();
            if store.configuring {
                store.configuring = false;
                store.configured = true;
            }
        }

        let sink = self.sink.lock();
        match sink.as_ref() {
            Some(sink) => {
                sink(event);
                true
            }
            None => {
                tracing::debug!(event = event.tag(), "memory backend: no subscriber");
                false
            }
        }
    }

    /// Whether the store is currently open.
    pub fn is_open(&self) -> bool {
        self.store.read().open_root.is_some()
    }

    /// Root the store was opened at, if open.
    pub fn open_root(&self) -> Option<PathBuf> {
        self.store.read().open_root.clone()
    }

    /// Number of `open` calls so far.
    pub fn open_calls(&self) -> usize {
        self.store.read().open_calls
    }

    /// Credentials passed to every `configure` call so far.
    pub fn configure_calls(&self) -> Vec<Credentials> {
        self.store.read().configure_calls.clone()
    }

    /// Messages passed to `create_chat_by_message` so far.
    pub fn promote_calls(&self) -> Vec<MsgId> {
        self.store.read().promote_calls.clone()
    }

    /// Number of `close` calls so far.
    pub fn close_count(&self) -> usize {
        self.store.read().close_count
    }

    /// Whether a sink is currently subscribed.
    pub fn has_subscriber(&self) -> bool {
        self.sink.lock().is_some()
    }
}

impl Backend for MemoryBackend {
    fn subscribe(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn open(&self, root: &Path) -> Result<(), BackendError> {
        let mut store = self.store.write();
        store.open_calls += 1;
        if let Some(cause) = &store.open_error {
            return Err(BackendError::Open(cause.clone()));
        }
        store.open_root = Some(root.to_path_buf());
        Ok(())
    }

    fn is_configured(&self) -> bool {
        let store = self.store.read();
        store.open_root.is_some() && store.configured
    }

    fn configure(&self, credentials: &Credentials) -> Result<(), BackendError> {
        let mut store = self.store.write();
        store.ensure_open()?;
        store.configure_calls.push(credentials.clone());
        if let Some(cause) = &store.configure_error {
            return Err(BackendError::Configure(cause.clone()));
        }
        store.configuring = true;
        Ok(())
    }

    fn chat(&self, id: ChatId) -> Result<Chat, BackendError> {
        let mut store = self.store.write();
        store.ensure_open()?;
        if store.chat_lookup_failures > 0 {
            store.chat_lookup_failures -= 1;
            return Err(BackendError::ChatNotFound(id));
        }
        store
            .chats
            .get(&id)
            .cloned()
            .ok_or(BackendError::ChatNotFound(id))
    }

    fn message(&self, id: MsgId) -> Result<Message, BackendError> {
        let store = self.store.read();
        store.ensure_open()?;
        store
            .messages
            .get(&id)
            .cloned()
            .ok_or(BackendError::MessageNotFound(id))
    }

    fn create_chat_by_message(&self, id: MsgId) -> Result<ChatId, BackendError> {
        let mut store = self.store.write();
        store.ensure_open()?;
        store.promote_calls.push(id);

        let Some(message) = store.messages.get(&id).cloned() else {
            return Err(BackendError::MessageNotFound(id));
        };
        if !message.is_unclassified() {
            return Ok(message.chat_id);
        }

        let chat_id = match store.promotions.get(&id).copied() {
            Some(chat_id) => chat_id,
            None => store.allocate_chat_id(),
        };
        store.chats.entry(chat_id).or_insert_with(|| Chat {
            id: chat_id,
            name: message.from_addr.clone(),
        });
        if let Some(stored) = store.messages.get_mut(&id) {
            stored.chat_id = chat_id;
            stored.unclassified = false;
        }
        Ok(chat_id)
    }

    fn close(&self) {
        {
            let mut store = self.store.write();
            store.close_count += 1;
            store.open_root = None;
        }
        *self.sink.lock() = None;
    }
}
