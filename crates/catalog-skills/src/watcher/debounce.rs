//! Trailing-edge debounce with single-flight reloads.
//!
//! Every change signal pushes the deadline out by the debounce window. When
//! the deadline passes a reload starts; if another deadline passes while a
//! reload is still running, exactly one follow-up reload is queued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, error};

/// Something that refreshes the catalog. Called at most once at a time.
#[async_trait]
pub(crate) trait ReloadHandler: Send + Sync + 'static {
    async fn reload(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DebounceState {
    Idle,
    Pending { deadline: Instant },
    Reloading { deadline: Option<Instant> },
    /// A deadline passed mid-reload; run once more when it finishes.
    ReloadingQueued { deadline: Option<Instant> },
}

impl DebounceState {
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match *self {
            Self::Idle => None,
            Self::Pending { deadline } => Some(deadline),
            Self::Reloading { deadline } | Self::ReloadingQueued { deadline } => deadline,
        }
    }

    /// A relevant change arrived at `now`.
    pub(crate) fn on_event(self, now: Instant, window: Duration) -> Self {
        let deadline = now + window;
        match self {
            Self::Idle | Self::Pending { .. } => Self::Pending { deadline },
            Self::Reloading { .. } => Self::Reloading {
                deadline: Some(deadline),
            },
            Self::ReloadingQueued { .. } => Self::ReloadingQueued {
                deadline: Some(deadline),
            },
        }
    }

    /// The deadline elapsed. Returns the next state and whether to start a reload.
    pub(crate) fn on_deadline(self) -> (Self, bool) {
        match self {
            Self::Pending { .. } => (Self::Reloading { deadline: None }, true),
            Self::Reloading { deadline: Some(_) } | Self::ReloadingQueued { deadline: Some(_) } => {
                (Self::ReloadingQueued { deadline: None }, false)
            }
            other => (other, false),
        }
    }

    /// The in-flight reload completed. Returns the next state and whether to start another.
    pub(crate) fn on_reload_finished(self) -> (Self, bool) {
        match self {
            Self::Reloading {
                deadline: Some(deadline),
            } => (Self::Pending { deadline }, false),
            Self::Reloading { deadline: None } => (Self::Idle, false),
            Self::ReloadingQueued { deadline } => (Self::Reloading { deadline }, true),
            other => (other, false),
        }
    }
}

/// Handle to a running debounce loop.
pub(crate) struct Debouncer {
    signals: mpsc::UnboundedSender<()>,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Debouncer {
    pub(crate) fn spawn<H: ReloadHandler>(
        runtime: &tokio::runtime::Handle,
        handler: Arc<H>,
        window: Duration,
    ) -> Self {
        let (signals, signal_rx) = mpsc::unbounded_channel();
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = runtime.spawn(run(handler, window, signal_rx, shutdown_rx));
        Self {
            signals,
            shutdown,
            task,
        }
    }

    /// Sender for change signals; the loop also ends when every sender is gone.
    pub(crate) fn sender(&self) -> mpsc::UnboundedSender<()> {
        self.signals.clone()
    }

    /// Cancel any pending deadline and wait for an in-flight reload.
    pub(crate) async fn stop(self) {
        let Self {
            signals,
            shutdown,
            task,
        } = self;
        drop(signals);
        let _ = shutdown.send(());
        if let Err(e) = task.await {
            error!("Debounce task failed: {}", e);
        }
    }
}

async fn run<H: ReloadHandler>(
    handler: Arc<H>,
    window: Duration,
    mut signals: mpsc::UnboundedReceiver<()>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut state = DebounceState::Idle;
    let mut in_flight: Option<JoinHandle<()>> = None;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            signal = signals.recv() => match signal {
                Some(()) => {
                    state = state.on_event(Instant::now(), window);
                    debug!("Change signal, reload deadline moved");
                }
                None => break,
            },

            _ = sleep_until(state.deadline()) => {
                let (next, start) = state.on_deadline();
                state = next;
                if start {
                    in_flight = Some(spawn_reload(&handler));
                } else {
                    debug!("Reload in progress, queued one more");
                }
            }

            result = wait_for(&mut in_flight) => {
                in_flight = None;
                if let Err(e) = result {
                    error!("Reload task failed: {}", e);
                }
                let (next, start) = state.on_reload_finished();
                state = next;
                if start {
                    in_flight = Some(spawn_reload(&handler));
                }
            }
        }
    }

    if let Some(handle) = in_flight {
        debug!("Waiting for in-flight reload before stopping");
        if let Err(e) = handle.await {
            error!("Reload task failed: {}", e);
        }
    }
}

fn spawn_reload<H: ReloadHandler>(handler: &Arc<H>) -> JoinHandle<()> {
    let handler = Arc::clone(handler);
    tokio::spawn(async move { handler.reload().await })
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn wait_for(in_flight: &mut Option<JoinHandle<()>>) -> Result<(), JoinError> {
    match in_flight {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}
