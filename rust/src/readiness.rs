//! Configuring → Ready lifecycle and the one-shot readiness signal.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};

use crate::config::ConfigureFailurePolicy;
use crate::error::StartError;
use crate::events::LifecycleEvent;

type Outcome = Result<(), StartError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Configuring,
    Ready,
}

/// Which event ends the Configuring phase, decided once the store is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupBranch {
    /// Store holds an account: the first connection means ready.
    AlreadyConfigured,
    /// First run: ready once configuration reports completion.
    NeedsConfiguration,
}

/// Create a connected resolver/future pair.
pub fn channel() -> (ReadinessResolver, ReadinessFuture) {
    let (tx, rx) = flume::bounded(1);
    (ReadinessResolver { tx }, ReadinessFuture { rx })
}

/// Write side of the readiness signal. Resolving consumes it.
#[derive(Debug)]
pub struct ReadinessResolver {
    tx: Sender<Outcome>,
}

impl ReadinessResolver {
    pub fn resolve(self, outcome: Outcome) {
        // The caller may have dropped the future; nothing to report then.
        let _ = self.tx.send(outcome);
    }
}

/// Resolves once the backend is usable, or fails with the reason it never
/// will be.
///
/// Await it (`ready.await`), block on it ([`ReadinessFuture::wait`]), or
/// bound the wait ([`ReadinessFuture::wait_timeout`]). If the core stops
/// before readiness the result is [`StartError::Shutdown`].
#[derive(Debug)]
pub struct ReadinessFuture {
    rx: Receiver<Outcome>,
}

impl ReadinessFuture {
    /// Block the current thread until the outcome is known.
    pub fn wait(self) -> Outcome {
        self.rx.recv().unwrap_or(Err(StartError::Shutdown))
    }

    pub fn wait_timeout(self, timeout: Duration) -> Outcome {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(StartError::Timeout(timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(StartError::Shutdown),
        }
    }

    /// Whether the outcome is already known: resolved, or the core is gone.
    pub fn is_settled(&self) -> bool {
        !self.rx.is_empty() || self.rx.is_disconnected()
    }
}

impl IntoFuture for ReadinessFuture {
    type Output = Outcome;
    type IntoFuture = ReadyWait;

    fn into_future(self) -> Self::IntoFuture {
        ReadyWait {
            inner: Box::pin(self.rx.into_recv_async()),
        }
    }
}

/// Future returned by awaiting a [`ReadinessFuture`].
pub struct ReadyWait {
    inner: Pin<Box<flume::r#async::RecvFut<'static, Outcome>>>,
}

impl Future for ReadyWait {
    type Output = Outcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner
            .as_mut()
            .poll(cx)
            .map(|res| res.unwrap_or(Err(StartError::Shutdown)))
    }
}

/// What a lifecycle event did to the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BecameReady,
    Failed,
    Ignored,
}

/// Drives [`LifecycleState`] and resolves the readiness signal exactly once.
///
/// The tracker is the only writer of the shared state cell.
pub struct ReadinessTracker {
    state: LifecycleState,
    branch: Option<StartupBranch>,
    policy: ConfigureFailurePolicy,
    resolver: Option<ReadinessResolver>,
    shared_state: Arc<RwLock<LifecycleState>>,
}

impl ReadinessTracker {
    pub fn new(
        resolver: ReadinessResolver,
        policy: ConfigureFailurePolicy,
        shared_state: Arc<RwLock<LifecycleState>>,
    ) -> Self {
        Self {
            state: LifecycleState::Configuring,
            branch: None,
            policy,
            resolver: Some(resolver),
            shared_state,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn branch(&self) -> Option<StartupBranch> {
        self.branch
    }

    /// Record the startup branch. Only the first call counts.
    pub fn begin(&mut self, branch: StartupBranch) {
        if self.branch.is_some() {
            return;
        }
        tracing::debug!(?branch, "readiness: waiting");
        self.branch = Some(branch);
    }

    pub fn on_lifecycle(&mut self, event: LifecycleEvent) -> Transition {
        if self.state == LifecycleState::Ready || self.resolver.is_none() {
            // Reconnections after readiness land here on purpose; stay quiet.
            tracing::trace!(?event, "readiness: already settled");
            return Transition::Ignored;
        }

        match (self.branch, event) {
            (Some(StartupBranch::AlreadyConfigured), LifecycleEvent::Connected) => {
                tracing::info!("connected, postbox is ready");
                self.mark_ready()
            }
            (Some(StartupBranch::NeedsConfiguration), LifecycleEvent::ConfigureComplete) => {
                tracing::info!("configuration finished, postbox is ready");
                self.mark_ready()
            }
            (Some(StartupBranch::NeedsConfiguration), LifecycleEvent::ConfigureFailed) => {
                match self.policy {
                    ConfigureFailurePolicy::Wait => {
                        tracing::warn!("engine reported configuration failure; still waiting");
                        Transition::Ignored
                    }
                    ConfigureFailurePolicy::Fail => {
                        let failed = self.fail(StartError::ConfigurationFailure {
                            cause: "engine reported configuration failure".to_string(),
                        });
                        if failed {
                            Transition::Failed
                        } else {
                            Transition::Ignored
                        }
                    }
                }
            }
            (branch, event) => {
                tracing::trace!(?branch, ?event, "readiness: event not relevant to branch");
                Transition::Ignored
            }
        }
    }

    /// Fail the readiness signal. Returns `false` when it was already settled.
    pub fn fail(&mut self, err: StartError) -> bool {
        match self.resolver.take() {
            Some(resolver) => {
                tracing::error!(err = %err, "postbox will not become ready");
                resolver.resolve(Err(err));
                true
            }
            None => false,
        }
    }

    fn mark_ready(&mut self) -> Transition {
        let Some(resolver) = self.resolver.take() else {
            return Transition::Ignored;
        };
        self.state = LifecycleState::Ready;
        match self.shared_state.write() {
            Ok(mut g) => *g = LifecycleState::Ready,
            Err(poison) => *poison.into_inner() = LifecycleState::Ready,
        }
        resolver.resolve(Ok(()));
        Transition::BecameReady
    }
}
