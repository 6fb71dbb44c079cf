//! Contains the [`BackgroundCommandHandler`] that runs a session's data transfer next to its
//! control loop.
//
// The control channel has to keep reading while a transfer runs, otherwise an ABOR (or a
// client hanging up) would only be noticed once the transfer is done. So transfer commands are
// spawned onto their own task. There is one slot per session: FTP has a single data connection
// per session, a second transfer is refused rather than queued.

use super::reply::Reply;
use super::error::{BackgroundCommandError, DisposalStage, DisposalWarning};
use crate::metrics;
use std::{
    future::Future,
    pin::Pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context, Poll},
};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;

/// How a background command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command ran to completion; send this reply.
    Completed(Reply),
    /// The command noticed its cancellation and unwound.
    Aborted,
    /// The command failed; send this reply.
    Failed(Reply),
}

impl CommandOutcome {
    /// The reply for the control channel.
    pub fn reply(&self) -> Reply {
        match self {
            CommandOutcome::Completed(reply) | CommandOutcome::Failed(reply) => reply.clone(),
            CommandOutcome::Aborted => Reply::transfer_aborted(),
        }
    }

    /// True for [`CommandOutcome::Aborted`].
    pub fn is_aborted(&self) -> bool {
        matches!(self, CommandOutcome::Aborted)
    }

    fn label(&self) -> &'static str {
        match self {
            CommandOutcome::Completed(_) => "completed",
            CommandOutcome::Aborted => "aborted",
            CommandOutcome::Failed(_) => "failed",
        }
    }

    // The task went away without reporting, i.e. it panicked.
    fn lost() -> Self {
        CommandOutcome::Failed(Reply::new(super::reply::ReplyCode::LocalError, "Transfer failed unexpectedly"))
    }
}

/// Resolves to the outcome of a command started with [`BackgroundCommandHandler::execute`].
///
/// By the time the outcome is available the handler is idle again. The control loop can poll it
/// in a `select!` next to reading commands, or check it with [`try_outcome`](Self::try_outcome).
#[derive(Debug)]
pub struct CommandCompletion {
    rx: oneshot::Receiver<CommandOutcome>,
}

impl CommandCompletion {
    /// Returns the outcome if the command has finished, without waiting.
    ///
    /// Once this returned `Some` it must not be called again.
    pub fn try_outcome(&mut self) -> Option<CommandOutcome> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(CommandOutcome::lost()),
        }
    }
}

impl Future for CommandCompletion {
    type Output = CommandOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CommandOutcome> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.unwrap_or_else(|_| CommandOutcome::lost()))
    }
}

/// The observable state of a [`BackgroundCommandHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerState {
    /// Nothing runs, a command can be started.
    Idle,
    /// A command runs.
    Running,
    /// Cancellation was requested, the command has not unwound yet.
    Cancelling,
    /// The handler was disposed and accepts no more commands.
    Disposed,
}

#[derive(Debug)]
struct Slot {
    task_id: u64,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Debug)]
enum State {
    Idle,
    Running(Slot),
    Cancelling(Slot),
    Disposed,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // The state is a plain enum and stays consistent even if a holder panicked.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

// Owned by the spawned task. Puts the handler back to idle before the outcome is sent, and also
// when the command panics and the task unwinds.
struct CompletionGuard {
    state: Arc<Mutex<State>>,
    task_id: u64,
    tx: Option<oneshot::Sender<CommandOutcome>>,
}

impl CompletionGuard {
    fn release(&self) {
        let mut state = lock(&self.state);
        if matches!(&*state, State::Running(slot) | State::Cancelling(slot) if slot.task_id == self.task_id) {
            *state = State::Idle;
        }
    }

    fn finish(mut self, outcome: CommandOutcome) {
        self.release();
        if let Some(tx) = self.tx.take() {
            // The control loop may not be waiting anymore.
            let _ = tx.send(outcome);
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.release();
        }
    }
}

/// Runs at most one cancellable command per session.
#[derive(Debug)]
pub struct BackgroundCommandHandler {
    state: Arc<Mutex<State>>,
    next_task_id: AtomicU64,
    logger: slog::Logger,
}

impl BackgroundCommandHandler {
    /// Creates an idle handler.
    pub fn new(logger: slog::Logger) -> Self {
        BackgroundCommandHandler {
            state: Arc::new(Mutex::new(State::Idle)),
            next_task_id: AtomicU64::new(1),
            logger,
        }
    }

    /// The current state.
    pub fn state(&self) -> HandlerState {
        match &*lock(&self.state) {
            State::Idle => HandlerState::Idle,
            State::Running(_) => HandlerState::Running,
            State::Cancelling(_) => HandlerState::Cancelling,
            State::Disposed => HandlerState::Disposed,
        }
    }

    /// Starts `command` on its own task.
    ///
    /// The command gets a [`CancellationToken`] it has to check at least once per I/O chunk; when
    /// it is cancelled the command should clean up and return [`CommandOutcome::Aborted`].
    ///
    /// Fails with [`BackgroundCommandError::AlreadyRunning`] while another command runs or is
    /// still cancelling. Must be called from within a tokio runtime.
    pub fn execute<F, Fut>(&self, command: F) -> Result<CommandCompletion, BackgroundCommandError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = CommandOutcome> + Send + 'static,
    {
        // Build the future before locking so the closure can't deadlock on the state.
        let token = CancellationToken::new();
        let command = command(token.clone());

        let mut state = lock(&self.state);
        match &*state {
            State::Idle => {}
            State::Running(_) | State::Cancelling(_) => return Err(BackgroundCommandError::AlreadyRunning),
            State::Disposed => return Err(BackgroundCommandError::Disposed),
        }

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let guard = CompletionGuard {
            state: Arc::clone(&self.state),
            task_id,
            tx: Some(tx),
        };
        let logger = self.logger.new(slog::o!("task" => task_id));
        slog::debug!(logger, "Starting background command");
        metrics::inc_background_command("started");

        let handle = tokio::spawn(async move {
            let outcome = command.await;
            slog::debug!(logger, "Background command ended: {}", outcome.label());
            metrics::inc_background_command(outcome.label());
            guard.finish(outcome);
        });

        *state = State::Running(Slot {
            task_id,
            token,
            handle: Some(handle),
        });
        Ok(CommandCompletion { rx })
    }

    /// Requests cancellation of the running command and returns right away. The command's own
    /// completion moves the handler back to idle.
    ///
    /// Fails with [`BackgroundCommandError::NotRunning`] if nothing runs. Cancelling a command
    /// that is already cancelling succeeds.
    pub fn cancel(&self) -> Result<(), BackgroundCommandError> {
        let mut state = lock(&self.state);
        let (next, result) = match std::mem::replace(&mut *state, State::Idle) {
            State::Running(slot) => {
                slog::info!(self.logger, "Cancelling background command"; "task" => slot.task_id);
                slot.token.cancel();
                (State::Cancelling(slot), Ok(()))
            }
            State::Cancelling(slot) => (State::Cancelling(slot), Ok(())),
            State::Idle => (State::Idle, Err(BackgroundCommandError::NotRunning)),
            State::Disposed => (State::Disposed, Err(BackgroundCommandError::Disposed)),
        };
        *state = next;
        result
    }

    /// Cancels a running command and waits for it to end. The handler is idle afterwards and
    /// accepts new commands.
    pub async fn stop(&self) -> Result<(), DisposalWarning> {
        let handle = {
            let mut state = lock(&self.state);
            match std::mem::replace(&mut *state, State::Idle) {
                State::Running(mut slot) | State::Cancelling(mut slot) => {
                    slot.token.cancel();
                    let handle = slot.handle.take();
                    *state = State::Cancelling(slot);
                    handle
                }
                other => {
                    *state = other;
                    None
                }
            }
        };
        self.join(handle).await
    }

    /// Cancels a running command, waits for it to end and refuses any further commands. Calling
    /// it again does nothing.
    #[tracing_attributes::instrument(skip(self))]
    pub async fn dispose(&self) -> Result<(), DisposalWarning> {
        let handle = {
            let mut state = lock(&self.state);
            match std::mem::replace(&mut *state, State::Disposed) {
                State::Running(mut slot) | State::Cancelling(mut slot) => {
                    slot.token.cancel();
                    slot.handle.take()
                }
                State::Idle | State::Disposed => None,
            }
        };
        self.join(handle).await
    }

    async fn join(&self, handle: Option<JoinHandle<()>>) -> Result<(), DisposalWarning> {
        let Some(handle) = handle else {
            return Ok(());
        };
        slog::debug!(self.logger, "Waiting for background command to finish");
        handle.await.map_err(|e| {
            slog::error!(self.logger, "Background command did not finish cleanly: {}", e);
            DisposalWarning {
                stage: DisposalStage::BackgroundCommand,
                message: e.to_string(),
            }
        })
    }
}

impl Drop for BackgroundCommandHandler {
    fn drop(&mut self) {
        if let State::Running(slot) | State::Cancelling(slot) = &*lock(&self.state) {
            slot.token.cancel();
        }
    }
}
