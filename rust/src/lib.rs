mod config;
mod core;
mod error;
mod events;
mod logging;
mod readiness;
mod router;

use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use flume::Sender;

pub use config::{
    ConfigureFailurePolicy, PostboxConfig, CONFIG_FILE_NAME, ENV_EMAIL_ADDRESS, ENV_EMAIL_PASSWORD,
};
pub use error::{ConfigError, RouteError, StartError};
pub use events::{normalize, LifecycleEvent, NormalizeContext, NormalizedEvent, NormalizedMessage};
pub use logging::init_logging;
pub use readiness::{
    LifecycleState, ReadinessFuture, ReadinessResolver, ReadinessTracker, ReadyWait,
    StartupBranch, Transition,
};
pub use router::{MessageRouter, RouteOutcome};

pub use postbox_backend_traits::{
    Backend, BackendError, Chat, ChatId, Credentials, Message, MsgId, RawEvent,
};

use crate::core::{CoreMsg, PostboxCore};

/// Receives every new message, once.
///
/// Called on the core thread; slow handlers delay event processing.
pub trait MessageHandler: Send + 'static {
    fn on_new_message(&self, chat: Chat, message: Message);
}

impl<F> MessageHandler for F
where
    F: Fn(Chat, Message) + Send + 'static,
{
    fn on_new_message(&self, chat: Chat, message: Message) {
        self(chat, message)
    }
}

/// Handle to a running postbox core.
///
/// Dropping it (or calling [`Postbox::shutdown`]) stops the core thread and
/// closes the backend.
pub struct Postbox {
    core_tx: Sender<CoreMsg>,
    shared_state: Arc<RwLock<LifecycleState>>,
    worker: Option<JoinHandle<()>>,
}

impl Postbox {
    /// Start the core on its own thread.
    ///
    /// Subscribes to `backend`, opens the store at the configured root and,
    /// on first run, configures the account with the configured credentials.
    /// The returned future resolves once the backend is usable. Messages may
    /// be delivered to `handler` before that.
    pub fn start(
        backend: Arc<dyn Backend>,
        config: PostboxConfig,
        handler: impl MessageHandler,
    ) -> Result<(Self, ReadinessFuture), StartError> {
        tracing::info!(data_dir = %config.data_dir.display(), "Postbox::start()");

        let (core_tx, core_rx) = flume::unbounded::<CoreMsg>();
        let shared_state = Arc::new(RwLock::new(LifecycleState::Configuring));
        let (resolver, ready) = readiness::channel();

        let core = PostboxCore::new(
            backend,
            config,
            Box::new(handler),
            resolver,
            shared_state.clone(),
        );
        let core_tx_for_core = core_tx.clone();
        let worker = thread::Builder::new()
            .name("postbox-core".to_string())
            .spawn(move || crate::core::run(core, core_tx_for_core, core_rx))
            .map_err(|e| StartError::Spawn(e.to_string()))?;

        Ok((
            Self {
                core_tx,
                shared_state,
                worker: Some(worker),
            },
            ready,
        ))
    }

    pub fn state(&self) -> LifecycleState {
        match self.shared_state.read() {
            Ok(g) => *g,
            Err(poison) => *poison.into_inner(),
        }
    }

    /// Stop the core and wait for it to close the backend.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.core_tx.send(CoreMsg::Shutdown);
        if worker.thread().id() == thread::current().id() {
            // Dropped from inside a handler; the loop exits on its own.
            return;
        }
        if worker.join().is_err() {
            tracing::error!("postbox core thread panicked");
        }
    }
}

impl Drop for Postbox {
    fn drop(&mut self) {
        self.stop();
    }
}
