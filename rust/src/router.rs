//! Delivers each new message to the application exactly once.

use std::num::NonZeroUsize;

use lru::LruCache;
use postbox_backend_traits::{Backend, ChatId, MsgId};

use crate::error::RouteError;
use crate::events::NormalizedMessage;
use crate::MessageHandler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered {
        chat_id: ChatId,
        msg_id: MsgId,
        /// The message was moved out of the unknown-sender bucket first.
        promoted: bool,
    },
    /// Already delivered earlier (e.g. IncomingMessage followed by a
    /// MessagesChanged for the same id).
    Duplicate,
}

pub struct MessageRouter {
    // Bounded so a long-running bot does not grow without limit; an id older
    // than `capacity` deliveries could in theory be delivered again.
    delivered: LruCache<MsgId, ()>,
    // Promoted, but a lookup failed before delivery. The engine no longer
    // reports these as unclassified, so the promoted chat is kept here.
    pending: LruCache<MsgId, ChatId>,
}

impl MessageRouter {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            delivered: LruCache::new(capacity),
            pending: LruCache::new(capacity),
        }
    }

    pub fn was_delivered(&self, msg_id: MsgId) -> bool {
        self.delivered.contains(&msg_id)
    }

    /// Whether `msg_id` was promoted but not delivered yet.
    pub fn is_pending(&self, msg_id: MsgId) -> bool {
        self.pending.contains(&msg_id)
    }

    pub fn route(
        &mut self,
        msg: &NormalizedMessage,
        backend: &dyn Backend,
        handler: &dyn MessageHandler,
    ) -> Result<RouteOutcome, RouteError> {
        if self.delivered.contains(&msg.msg_id) {
            tracing::debug!(msg_id = %msg.msg_id, "already delivered, skipping");
            return Ok(RouteOutcome::Duplicate);
        }

        let (chat_id, promoted) = if let Some(chat_id) = self.pending.get(&msg.msg_id).copied() {
            tracing::debug!(msg_id = %msg.msg_id, chat_id = %chat_id, "retrying promoted message");
            (chat_id, true)
        } else if msg.is_unclassified {
            let chat_id = backend.create_chat_by_message(msg.msg_id)?;
            tracing::info!(
                msg_id = %msg.msg_id,
                raw_chat_id = %msg.chat_id,
                chat_id = %chat_id,
                "promoted unknown-sender message"
            );
            self.pending.put(msg.msg_id, chat_id);
            (chat_id, true)
        } else {
            (msg.chat_id, false)
        };

        let chat = backend.chat(chat_id)?;
        let message = backend.message(msg.msg_id)?;

        tracing::debug!(chat_id = %chat_id, msg_id = %msg.msg_id, "delivering message");
        handler.on_new_message(chat, message);
        self.pending.pop(&msg.msg_id);
        self.delivered.put(msg.msg_id, ());

        Ok(RouteOutcome::Delivered {
            chat_id,
            msg_id: msg.msg_id,
            promoted,
        })
    }
}
