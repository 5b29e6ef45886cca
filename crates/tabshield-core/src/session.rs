use crate::backend::{Acquire, EvaluationBackend};
use crate::error::{BackendError, SearchError, SearchResult, Stage};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use strum_macros::Display;
use tabshield_protocol::{
    Model, ProtectionType, SessionStatus, SessionToken, SUPPORTED_PROTOCOL_VERSION,
};
use tokio::sync::{mpsc, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Longest wait, in ticks, between two attempts.
pub const MAX_POLL_DELAY: u32 = 128;

/// Delay policy used both for acquiring a session and for polling a running
/// one: 0, 1, 2, 4, ... ticks, capped at [`MAX_POLL_DELAY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollBackoff {
    ticks: u32,
}

impl PollBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn escalate(&mut self) -> u32 {
        self.ticks = match self.ticks {
            0 => 1,
            t => (t * 2).min(MAX_POLL_DELAY),
        };
        self.ticks
    }

    pub fn reset(&mut self) {
        self.ticks = 0;
    }

    pub fn delay(&self, tick: Duration) -> Duration {
        tick * self.ticks
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Unallocated,
    Acquiring,
    Running,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }
}

#[derive(Debug, Default)]
struct GateState {
    backoff: PollBackoff,
    /// No acquisition is attempted before this instant.
    not_before: Option<Instant>,
}

/// Acquisition back-off shared by every unallocated session of one batch.
/// Sessions take turns: one attempt at a time, and each Busy reply delays the
/// next attempt by one more step. Any session giving its token back clears
/// the delay.
#[derive(Debug, Default)]
pub struct AcquireGate {
    state: Mutex<GateState>,
    turn: tokio::sync::Mutex<()>,
    freed: Notify,
}

impl AcquireGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn current(&self) -> PollBackoff {
        self.state().backoff
    }

    fn escalate(&self, tick: Duration) -> PollBackoff {
        let mut state = self.state();
        state.backoff.escalate();
        state.not_before = Some(Instant::now() + state.backoff.delay(tick));
        state.backoff
    }

    pub fn session_freed(&self) {
        let mut state = self.state();
        state.backoff.reset();
        state.not_before = None;
        drop(state);
        self.freed.notify_waiters();
    }

    /// Resolves once the shared delay has passed or a session was freed.
    async fn ready(&self) {
        loop {
            let freed = self.freed.notified();
            let not_before = self.state().not_before;
            let Some(at) = not_before else {
                return;
            };
            if at <= Instant::now() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep_until(at) => return,
                _ = freed => {}
            }
        }
    }
}

/// Everything a session needs to run one evaluation.
#[derive(Debug, Clone)]
pub struct SessionJob {
    /// Position of the individual in the scheduler's batch.
    pub slot: usize,
    pub table: PathBuf,
    pub permutation: Vec<u64>,
    pub protection: ProtectionType,
    pub model: Model,
    pub ceiling: f64,
    pub fetch_output: bool,
}

#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub slot: usize,
    pub costs: Vec<f64>,
    pub fitness: f64,
    pub output: Option<Vec<u8>>,
    pub elapsed_secs: u64,
    pub polls: u32,
}

#[derive(Debug)]
pub enum SessionEvent {
    State { slot: usize, state: SessionState },
    Finished(SessionOutcome),
    Failed { slot: usize, error: SearchError },
}

/// Per-batch resources handed to every session task.
#[derive(Clone)]
pub struct SessionContext {
    pub backend: Arc<dyn EvaluationBackend>,
    pub gate: Arc<AcquireGate>,
    pub tick: Duration,
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub shutdown: watch::Receiver<bool>,
}

/// Book-keeping for one session over its lifetime.
#[derive(Debug)]
pub struct WorkerSession {
    pub slot: usize,
    pub token: Option<SessionToken>,
    pub state: SessionState,
    pub backoff: PollBackoff,
    pub polls: u32,
}

impl WorkerSession {
    pub fn new(slot: usize) -> Self {
        Self {
            slot,
            token: None,
            state: SessionState::Unallocated,
            backoff: PollBackoff::new(),
            polls: 0,
        }
    }

    fn advance(&mut self, state: SessionState, events: &mpsc::UnboundedSender<SessionEvent>) {
        if self.state != state {
            trace!("Session slot {}: {} -> {}", self.slot, self.state, state);
            self.state = state;
            // The receiver only goes away once the batch is over.
            let _ = events.send(SessionEvent::State {
                slot: self.slot,
                state,
            });
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Drives one evaluation from acquisition to harvest and reports the outcome
/// on the event channel. The session token is released on every exit path.
pub async fn run_session(ctx: SessionContext, job: SessionJob) {
    let mut session = WorkerSession::new(job.slot);
    let mut shutdown = ctx.shutdown.clone();

    let token = match acquire(&ctx, &mut session, &mut shutdown).await {
        Ok(Some(token)) => token,
        Ok(None) => {
            trace!("Session slot {} cancelled before acquisition", job.slot);
            return;
        }
        Err(error) => {
            session.advance(SessionState::Failed, &ctx.events);
            let _ = ctx.events.send(SessionEvent::Failed {
                slot: job.slot,
                error,
            });
            return;
        }
    };
    session.token = Some(token.clone());

    // A grant that arrives after shutdown is handed straight back.
    let result = if *shutdown.borrow() {
        None
    } else {
        session.advance(SessionState::Running, &ctx.events);
        tokio::select! {
            r = drive(&ctx, &job, &token, &mut session) => Some(r),
            _ = shutdown_requested(&mut shutdown) => None,
        }
    };

    let released = ctx.backend.release(&token).await;
    session.token = None;
    ctx.gate.session_freed();

    let result = match (result, released) {
        (None, released) => {
            if let Err(e) = released {
                warn!("Failed to release session {} on shutdown: {}", token, e);
            }
            debug!("Session {} released on shutdown", token);
            return;
        }
        (Some(Ok(outcome)), Ok(())) => Ok(outcome),
        (Some(Ok(_)), Err(e)) => Err(SearchError::backend(Stage::Harvest, Some(&token), e)),
        (Some(Err(error)), released) => {
            if let Err(e) = released {
                warn!("Failed to release session {}: {}", token, e);
            }
            Err(error)
        }
    };

    match result {
        Ok(outcome) => {
            session.advance(SessionState::Completed, &ctx.events);
            let _ = ctx.events.send(SessionEvent::Finished(outcome));
        }
        Err(error) => {
            session.advance(SessionState::Failed, &ctx.events);
            let _ = ctx.events.send(SessionEvent::Failed {
                slot: job.slot,
                error,
            });
        }
    }
}

/// Takes turns with the other unallocated sessions of the batch until the
/// server grants a session. Returns `None` if shutdown arrives while waiting.
/// A request already sent to the server is never abandoned.
async fn acquire(
    ctx: &SessionContext,
    session: &mut WorkerSession,
    shutdown: &mut watch::Receiver<bool>,
) -> SearchResult<Option<SessionToken>> {
    let gate = ctx.gate.as_ref();
    loop {
        let turn = tokio::select! {
            biased;
            _ = shutdown_requested(shutdown) => return Ok(None),
            turn = async {
                let turn = gate.turn.lock().await;
                gate.ready().await;
                turn
            } => turn,
        };

        session.advance(SessionState::Acquiring, &ctx.events);
        let reply = ctx
            .backend
            .acquire_session()
            .await
            .map_err(|e| SearchError::backend(Stage::Acquisition, None, e))?;

        match reply {
            Acquire::Granted(token) => {
                debug!("Session slot {} acquired {}", session.slot, token);
                return Ok(Some(token));
            }
            Acquire::Busy => {
                session.advance(SessionState::Unallocated, &ctx.events);
                let backoff = gate.escalate(ctx.tick);
                drop(turn);
                trace!(
                    "Server busy, next acquisition in {} ticks (slot {})",
                    backoff.ticks(),
                    session.slot
                );
            }
        }
    }
}

async fn drive(
    ctx: &SessionContext,
    job: &SessionJob,
    token: &SessionToken,
    session: &mut WorkerSession,
) -> SearchResult<SessionOutcome> {
    let backend = ctx.backend.as_ref();

    let version = backend
        .protocol_version()
        .await
        .map_err(|e| SearchError::backend(Stage::Protocol, Some(token), e))?;
    if version != SUPPORTED_PROTOCOL_VERSION {
        return Err(SearchError::UnsupportedProtocol {
            found: version,
            expected: SUPPORTED_PROTOCOL_VERSION,
        });
    }

    backend
        .submit(
            token,
            &job.table,
            &job.permutation,
            job.protection,
            job.model,
            job.ceiling,
        )
        .await
        .map_err(|e| SearchError::backend(Stage::Submission, Some(token), e))?;

    loop {
        let status = backend
            .poll_status(token)
            .await
            .map_err(|e| SearchError::backend(Stage::Polling, Some(token), e))?;
        session.polls += 1;
        trace!("Session {} status {}", token, status.code());

        match status {
            SessionStatus::Complete => break,
            SessionStatus::Running => {
                session.backoff.escalate();
                trace!(
                    "Session {} still running, next poll in {} ticks",
                    token,
                    session.backoff.ticks()
                );
                tokio::time::sleep(session.backoff.delay(ctx.tick)).await;
            }
            SessionStatus::Error(code) => {
                return Err(SearchError::SolverFailed {
                    session: token.clone(),
                    code,
                });
            }
        }
    }

    let harvest = |e: BackendError| SearchError::backend(Stage::Harvest, Some(token), e);
    let fitness = backend.fetch_result(token).await.map_err(harvest)?;
    let costs = backend.fetch_costs(token).await.map_err(harvest)?;
    let elapsed_secs = backend.fetch_elapsed(token).await.map_err(harvest)?;
    let output = if job.fetch_output {
        Some(backend.fetch_output_table(token).await.map_err(harvest)?)
    } else {
        None
    };

    Ok(SessionOutcome {
        slot: job.slot,
        costs,
        fitness,
        output,
        elapsed_secs,
        polls: session.polls,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_progression() {
        let mut backoff = PollBackoff::new();
        let seen: Vec<u32> = (0..10).map(|_| backoff.escalate()).collect();
        assert_eq!(seen, vec![1, 2, 4, 8, 16, 32, 64, 128, 128, 128]);

        backoff.reset();
        assert_eq!(backoff.ticks(), 0);
        assert_eq!(backoff.delay(Duration::from_millis(10)), Duration::ZERO);
        backoff.escalate();
        backoff.escalate();
        assert_eq!(
            backoff.delay(Duration::from_millis(10)),
            Duration::from_millis(20)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_delays_until_session_freed() {
        let tick = Duration::from_millis(10);
        let gate = AcquireGate::new();
        let start = Instant::now();

        gate.ready().await;
        assert_eq!(start.elapsed(), Duration::ZERO);

        gate.escalate(tick);
        gate.escalate(tick);
        assert_eq!(gate.current().ticks(), 2);
        gate.ready().await;
        assert_eq!(start.elapsed(), Duration::from_millis(20));

        gate.escalate(tick);
        let freer = Arc::clone(&gate);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            freer.session_freed();
        });
        gate.ready().await;
        assert_eq!(start.elapsed(), Duration::from_millis(25));
        assert_eq!(gate.current().ticks(), 0);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Completed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::Unallocated.is_terminal());
        assert!(!SessionState::Acquiring.is_terminal());
        assert!(!SessionState::Running.is_terminal());
    }
}
