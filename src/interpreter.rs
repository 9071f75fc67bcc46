use futures::stream::StreamExt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::StreamConfig;
use crate::error::{InterpretError, UpstreamError};
use crate::generator::ContentGenerator;
use crate::request::Request;
use crate::state::{InterpretationState, ResultStateMachine};

const CANCELLED_MESSAGE: &str = "Request cancelled";

struct Session {
    /// Bumped on every submit or cancel. A task may only publish while its
    /// own generation is still the current one.
    generation: u64,
    machine: ResultStateMachine,
    token: Option<CancellationToken>,
}

/// Runs one request at a time against a [`ContentGenerator`] and publishes
/// every state change to subscribers.
///
/// Submitting while a request is running cancels it. Observers only ever see
/// the latest state; a new subscriber starts from the current value.
#[derive(Clone)]
pub struct Interpreter {
    generator: Arc<dyn ContentGenerator>,
    session: Arc<Mutex<Session>>,
    state_tx: Arc<watch::Sender<InterpretationState>>,
    chunk_timeout: Duration,
    shutdown_token: CancellationToken,
}

impl Interpreter {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        settings: &StreamConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(InterpretationState::Idle);

        Self {
            generator,
            session: Arc::new(Mutex::new(Session {
                generation: 0,
                machine: ResultStateMachine::new(settings.scan_mode),
                token: None,
            })),
            state_tx: Arc::new(state_tx),
            chunk_timeout: Duration::from_secs(settings.chunk_timeout_secs),
            shutdown_token,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<InterpretationState> {
        self.state_tx.subscribe()
    }

    pub fn current(&self) -> InterpretationState {
        self.state_tx.borrow().clone()
    }

    /// Start interpreting `request`, superseding any request still running.
    ///
    /// An invalid request, or any request after [`Interpreter::shutdown`], is
    /// rejected here and never reaches `Running`. Must be called from within a
    /// tokio runtime.
    pub fn submit(&self, request: Request) -> Result<JoinHandle<()>, InterpretError> {
        if self.shutdown_token.is_cancelled() {
            warn!("Rejecting request, interpreter is shut down");
            return Err(InterpretError::ShuttingDown);
        }

        let (generation, token) = {
            let mut session = self.lock_session();
            let was_running = matches!(
                session.machine.state(),
                InterpretationState::Running { .. }
            );

            let running = session.machine.start(&request)?.clone();

            if let Some(previous) = session.token.take() {
                previous.cancel();
                if was_running {
                    info!("Superseding request #{}", session.generation);
                }
            }

            session.generation += 1;
            let token = self.shutdown_token.child_token();
            session.token = Some(token.clone());
            self.state_tx.send_replace(running);

            (session.generation, token)
        };

        info!(
            "Submitting request #{} to {} ({} images)",
            generation,
            self.generator.name(),
            request.images().len()
        );

        let worker = self.clone();
        Ok(tokio::spawn(async move {
            worker.run(generation, token, request).await;
        }))
    }

    /// Cancel the running request, if any, leaving it `Failed`
    pub fn cancel(&self) -> bool {
        let mut session = self.lock_session();
        if !matches!(
            session.machine.state(),
            InterpretationState::Running { .. }
        ) {
            return false;
        }

        if let Some(token) = session.token.take() {
            token.cancel();
        }
        session.generation += 1;

        match session.machine.on_stream_error(CANCELLED_MESSAGE) {
            Ok(state) => {
                let state = state.clone();
                self.state_tx.send_replace(state);
            }
            Err(e) => error!("Failed to cancel request: {}", e),
        }

        info!("Cancelled running request");
        true
    }

    pub fn shutdown(&self) {
        self.cancel();
        self.shutdown_token.cancel();
    }

    async fn run(self, generation: u64, token: CancellationToken, request: Request) {
        let opened = tokio::select! {
            _ = token.cancelled() => {
                debug!("Request #{} cancelled before the stream opened", generation);
                self.publish(generation, |machine| {
                    machine.on_stream_error(CANCELLED_MESSAGE).cloned()
                });
                return;
            }
            opened = self.generator.generate_stream(&request) => opened,
        };

        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(e) => {
                error!("Request #{} could not start: {}", generation, e);
                self.publish(generation, |machine| {
                    machine.on_stream_error(&e.to_string()).cloned()
                });
                return;
            }
        };

        let mut chunk_count = 0usize;
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => {
                    debug!("Request #{} cancelled after {} chunks", generation, chunk_count);
                    self.publish(generation, |machine| {
                        machine.on_stream_error(CANCELLED_MESSAGE).cloned()
                    });
                    return;
                }
                next = tokio::time::timeout(self.chunk_timeout, chunks.next()) => next,
            };

            let keep_going = match next {
                Ok(Some(Ok(text))) => {
                    chunk_count += 1;
                    debug!("Request #{} chunk #{}: {:?}", generation, chunk_count, text);
                    self.publish(generation, |machine| machine.on_chunk(&text).cloned())
                }
                Ok(Some(Err(e))) => {
                    error!("Request #{} stream error: {}", generation, e);
                    self.publish(generation, |machine| {
                        machine.on_stream_error(&e.to_string()).cloned()
                    });
                    false
                }
                Ok(None) => {
                    self.publish(generation, |machine| machine.on_stream_end().cloned());
                    false
                }
                Err(_) => {
                    let e = UpstreamError::Timeout(self.chunk_timeout.as_secs());
                    warn!("Request #{}: {}", generation, e);
                    self.publish(generation, |machine| {
                        machine.on_stream_error(&e.to_string()).cloned()
                    });
                    false
                }
            };

            if !keep_going {
                break;
            }
        }

        debug!("Request #{} finished after {} chunks", generation, chunk_count);
    }

    /// Apply a transition and publish the result if `generation` is still
    /// current. Returns whether the task should keep consuming its stream.
    fn publish<F>(&self, generation: u64, apply: F) -> bool
    where
        F: FnOnce(&mut ResultStateMachine) -> Result<InterpretationState, InterpretError>,
    {
        let mut session = self.lock_session();
        if session.generation != generation {
            debug!("Dropping update from superseded request #{}", generation);
            return false;
        }

        match apply(&mut session.machine) {
            Ok(state) => {
                let terminal = state.is_terminal();
                self.state_tx.send_replace(state);
                !terminal
            }
            Err(e) => {
                error!("Request #{} rejected by state machine: {}", generation, e);
                false
            }
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
