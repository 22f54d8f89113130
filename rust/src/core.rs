use std::ops::ControlFlow;
use std::sync::{Arc, RwLock};

use flume::{Receiver, Sender};
use postbox_backend_traits::{Backend, RawEvent};

use crate::config::PostboxConfig;
use crate::error::StartError;
use crate::events::{normalize, NormalizeContext, NormalizedEvent, NormalizedMessage};
use crate::readiness::{LifecycleState, ReadinessResolver, ReadinessTracker, StartupBranch, Transition};
use crate::router::{MessageRouter, RouteOutcome};
use crate::MessageHandler;

#[derive(Debug)]
pub(crate) enum CoreMsg {
    Backend(RawEvent),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Opening,
    Running,
    /// Store never opened; events are dropped until shutdown.
    Failed,
}

/// Closes the backend when the core thread exits, however it exits.
struct CloseOnExit {
    backend: Arc<dyn Backend>,
}

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        tracing::info!("closing backend");
        self.backend.close();
    }
}

/// Body of the core thread: start up, then drain the queue until shutdown.
pub(crate) fn run(mut core: PostboxCore, core_tx: Sender<CoreMsg>, core_rx: Receiver<CoreMsg>) {
    let _close = CloseOnExit {
        backend: core.backend.clone(),
    };
    core.start(core_tx);
    while let Ok(msg) = core_rx.recv() {
        if core.handle_message(msg).is_break() {
            break;
        }
    }
    tracing::debug!("core loop finished");
}

pub(crate) struct PostboxCore {
    backend: Arc<dyn Backend>,
    config: PostboxConfig,
    handler: Box<dyn MessageHandler>,
    tracker: ReadinessTracker,
    router: MessageRouter,
    normalize_ctx: NormalizeContext,
    phase: Phase,
}

impl PostboxCore {
    pub(crate) fn new(
        backend: Arc<dyn Backend>,
        config: PostboxConfig,
        handler: Box<dyn MessageHandler>,
        resolver: ReadinessResolver,
        shared_state: Arc<RwLock<LifecycleState>>,
    ) -> Self {
        let tracker = ReadinessTracker::new(resolver, config.configure_failure, shared_state);
        let router = MessageRouter::new(config.dedup_capacity());
        Self {
            backend,
            config,
            handler,
            tracker,
            router,
            normalize_ctx: NormalizeContext::default(),
            phase: Phase::Opening,
        }
    }

    /// Subscribe, open the store, pick the startup branch.
    ///
    /// Events emitted meanwhile queue up in `core_tx` and are handled once
    /// this returns, in order.
    pub(crate) fn start(&mut self, core_tx: Sender<CoreMsg>) {
        self.backend.subscribe(Box::new(move |event| {
            // Contract: never block the engine's event thread.
            let _ = core_tx.send(CoreMsg::Backend(event));
        }));

        let root = self.config.store_root();
        tracing::info!(root = %root.display(), "opening store");
        if let Err(err) = self.backend.open(&root) {
            self.phase = Phase::Failed;
            self.tracker.fail(StartError::OpenFailure {
                cause: err.to_string(),
            });
            return;
        }
        self.phase = Phase::Running;

        if self.backend.is_configured() {
            self.set_branch(StartupBranch::AlreadyConfigured);
            return;
        }

        self.set_branch(StartupBranch::NeedsConfiguration);
        let Some(credentials) = self.config.credentials() else {
            self.tracker.fail(StartError::MissingCredentials);
            return;
        };
        tracing::info!(address = %credentials.address, "configuring account");
        if let Err(err) = self.backend.configure(&credentials) {
            self.tracker.fail(StartError::ConfigurationFailure {
                cause: err.to_string(),
            });
        }
    }

    pub(crate) fn handle_message(&mut self, msg: CoreMsg) -> ControlFlow<()> {
        match msg {
            CoreMsg::Backend(event) => {
                self.handle_backend_event(event);
                ControlFlow::Continue(())
            }
            CoreMsg::Shutdown => {
                tracing::info!("shutdown requested");
                if self.tracker.state() != LifecycleState::Ready {
                    self.tracker.fail(StartError::Shutdown);
                }
                ControlFlow::Break(())
            }
        }
    }

    fn set_branch(&mut self, branch: StartupBranch) {
        self.normalize_ctx.branch = Some(branch);
        self.tracker.begin(branch);
    }

    fn handle_backend_event(&mut self, event: RawEvent) {
        if self.phase != Phase::Running {
            tracing::debug!(event = event.tag(), "store not open, dropping event");
            return;
        }

        // A promoted message whose delivery failed now looks classified to the
        // engine; only the router still knows it is owed.
        if let RawEvent::MessagesChanged { chat_id, msg_id } = event {
            if self.router.is_pending(msg_id) {
                self.deliver(NormalizedMessage {
                    chat_id,
                    msg_id,
                    is_unclassified: true,
                });
                return;
            }
        }

        let tag = event.tag();
        let Some(normalized) = normalize(event, &self.normalize_ctx, self.backend.as_ref()) else {
            tracing::trace!(event = tag, "nothing to do");
            return;
        };

        match normalized {
            NormalizedEvent::Lifecycle(ev) => {
                if self.tracker.on_lifecycle(ev) == Transition::Failed {
                    tracing::warn!(?ev, "readiness failed");
                }
            }
            NormalizedEvent::Message(msg) => self.deliver(msg),
        }
    }

    fn deliver(&mut self, msg: NormalizedMessage) {
        match self
            .router
            .route(&msg, self.backend.as_ref(), self.handler.as_ref())
        {
            Ok(RouteOutcome::Delivered { .. }) | Ok(RouteOutcome::Duplicate) => {}
            Err(err) => {
                tracing::warn!(
                    chat_id = %msg.chat_id,
                    msg_id = %msg.msg_id,
                    err = %err,
                    "skipping message"
                );
            }
        }
    }
}
