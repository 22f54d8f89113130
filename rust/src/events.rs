//! Turns raw backend events into the few events the core acts on.

use postbox_backend_traits::{
    Backend, CONFIGURE_PROGRESS_DONE, CONFIGURE_PROGRESS_FAILED, ChatId, MsgId, RawEvent,
};

use crate::readiness::StartupBranch;

/// A message event worth routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedMessage {
    pub chat_id: ChatId,
    pub msg_id: MsgId,
    /// Message sits in the unknown-sender bucket and needs promotion.
    pub is_unclassified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected,
    ConfigureComplete,
    ConfigureFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizedEvent {
    Message(NormalizedMessage),
    Lifecycle(LifecycleEvent),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeContext {
    /// `None` while the store is still opening.
    pub branch: Option<StartupBranch>,
}

pub fn normalize(
    event: RawEvent,
    ctx: &NormalizeContext,
    backend: &dyn Backend,
) -> Option<NormalizedEvent> {
    match event {
        RawEvent::IncomingMessage { chat_id, msg_id } => {
            Some(NormalizedEvent::Message(NormalizedMessage {
                chat_id,
                msg_id,
                is_unclassified: false,
            }))
        }
        RawEvent::MessagesChanged { chat_id, msg_id } => {
            // Unknown senders never get IncomingMessage; this is the only way
            // to notice them.
            if !msg_id.is_specific() {
                return None;
            }
            match backend.message(msg_id) {
                Ok(message) if message.is_unclassified() => {
                    Some(NormalizedEvent::Message(NormalizedMessage {
                        chat_id,
                        msg_id,
                        is_unclassified: true,
                    }))
                }
                Ok(_) => None,
                Err(err) => {
                    tracing::debug!(msg_id = %msg_id, err = %err, "changed message not found, skipping");
                    None
                }
            }
        }
        RawEvent::ImapConnected => match ctx.branch {
            Some(StartupBranch::AlreadyConfigured) => {
                Some(NormalizedEvent::Lifecycle(LifecycleEvent::Connected))
            }
            _ => None,
        },
        RawEvent::ConfigureProgress { permille } => {
            if ctx.branch.is_none() {
                return None;
            }
            match permille {
                CONFIGURE_PROGRESS_DONE => {
                    Some(NormalizedEvent::Lifecycle(LifecycleEvent::ConfigureComplete))
                }
                CONFIGURE_PROGRESS_FAILED => {
                    Some(NormalizedEvent::Lifecycle(LifecycleEvent::ConfigureFailed))
                }
                _ => {
                    tracing::debug!(permille, "configure progress");
                    None
                }
            }
        }
    }
}
