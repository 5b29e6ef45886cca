#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tabshield_core::backend::{Acquire, EvaluationBackend};
use tabshield_core::error::BackendError;
use tabshield_core::{Model, ProtectionType};
use tabshield_protocol::{SessionStatus, SessionToken};

/// One submitted run as seen by the stub.
#[derive(Debug, Clone)]
pub struct Submission {
    pub permutation: Vec<u64>,
    pub model: Model,
    pub protection: ProtectionType,
    pub ceiling: f64,
    pub input: Vec<u8>,
}

#[derive(Debug, Default)]
struct Run {
    submission: Option<Submission>,
    polls: usize,
}

/// In-memory solver server. Protecting the cell at position `i` of the
/// permutation costs `weight * (i + 1)`, so heavy cells are best placed early.
pub struct StubBackend {
    pub capacity: u32,
    pub protocol: u32,
    pub weights: HashMap<u64, f64>,
    /// Acquisitions answered with Busy before any session is granted.
    pub busy_for: AtomicUsize,
    /// Running replies before a run completes.
    pub running_polls: usize,
    /// Status code reported instead of completion.
    pub fail_code: Option<i32>,
    /// Added to the reported result to break the result/costs agreement.
    pub result_skew: f64,
    /// Session number whose grant reply is held back, and for how long. The
    /// session is already open on the server while the reply is delayed.
    pub slow_grant: Option<(usize, Duration)>,

    sessions: Mutex<HashMap<String, Run>>,
    next_id: AtomicUsize,
    pub acquisitions: AtomicUsize,
    pub busy_replies: AtomicUsize,
    pub releases: AtomicUsize,
    pub peak_sessions: AtomicUsize,
    pub submissions: Mutex<Vec<Submission>>,
    /// When each acquisition request arrived, relative to `started`.
    pub attempt_times: Mutex<Vec<Duration>>,
    started: Instant,
}

impl StubBackend {
    pub fn new(capacity: u32) -> Self {
        Self {
            capacity,
            protocol: 4,
            weights: HashMap::new(),
            busy_for: AtomicUsize::new(0),
            running_polls: 1,
            fail_code: None,
            result_skew: 0.0,
            slow_grant: None,
            sessions: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            acquisitions: AtomicUsize::new(0),
            busy_replies: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            peak_sessions: AtomicUsize::new(0),
            submissions: Mutex::new(Vec::new()),
            attempt_times: Mutex::new(Vec::new()),
            started: Instant::now(),
        }
    }

    pub fn with_weights(mut self, weights: &[(u64, f64)]) -> Self {
        self.weights = weights.iter().copied().collect();
        self
    }

    pub fn with_protocol(mut self, protocol: u32) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn busy_for(self, attempts: usize) -> Self {
        self.busy_for.store(attempts, Ordering::SeqCst);
        self
    }

    pub fn failing_with(mut self, code: i32) -> Self {
        self.fail_code = Some(code);
        self
    }

    pub fn slow_grant(mut self, session: usize, delay: Duration) -> Self {
        self.slow_grant = Some((session, delay));
        self
    }

    /// Gaps between consecutive acquisition requests.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        self.attempt_times
            .lock()
            .unwrap()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }

    pub fn skewed(mut self, skew: f64) -> Self {
        self.result_skew = skew;
        self
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn submitted(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Cost sequence for a permutation, stopping at the first prefix above a
    /// non-zero ceiling.
    pub fn costs_for(&self, permutation: &[u64], ceiling: f64) -> Vec<f64> {
        let mut costs = Vec::with_capacity(permutation.len());
        let mut total = 0.0;
        for (i, cell) in permutation.iter().enumerate() {
            total += self.weights.get(cell).copied().unwrap_or(1.0) * (i + 1) as f64;
            costs.push(total);
            if ceiling > 0.0 && total > ceiling {
                break;
            }
        }
        costs
    }

    fn with_run<T>(
        &self,
        token: &SessionToken,
        f: impl FnOnce(&mut Run) -> T,
    ) -> Result<T, BackendError> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions
            .get_mut(token.as_str())
            .map(f)
            .ok_or_else(|| BackendError::Rejected(format!("unknown session {}", token)))
    }

    fn finished_costs(&self, token: &SessionToken) -> Result<Vec<f64>, BackendError> {
        let submission = self
            .with_run(token, |run| run.submission.clone())?
            .ok_or_else(|| BackendError::Rejected("nothing submitted".into()))?;
        Ok(self.costs_for(&submission.permutation, submission.ceiling))
    }
}

#[async_trait]
impl EvaluationBackend for StubBackend {
    async fn acquire_session(&self) -> Result<Acquire, BackendError> {
        self.attempt_times
            .lock()
            .unwrap()
            .push(self.started.elapsed());

        let pending_busy = self
            .busy_for
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let number = {
            let mut sessions = self.sessions.lock().unwrap();
            if pending_busy || sessions.len() >= self.capacity as usize {
                self.busy_replies.fetch_add(1, Ordering::SeqCst);
                return Ok(Acquire::Busy);
            }

            let number = self.next_id.fetch_add(1, Ordering::SeqCst);
            sessions.insert(format!("s{}", number), Run::default());
            self.acquisitions.fetch_add(1, Ordering::SeqCst);
            self.peak_sessions.fetch_max(sessions.len(), Ordering::SeqCst);
            number
        };

        if let Some((slow, delay)) = self.slow_grant {
            if slow == number {
                tokio::time::sleep(delay).await;
            }
        }
        Ok(Acquire::Granted(SessionToken::new(format!("s{}", number))))
    }

    async fn capacity(&self) -> Result<u32, BackendError> {
        Ok(self.capacity)
    }

    async fn protocol_version(&self) -> Result<u32, BackendError> {
        Ok(self.protocol)
    }

    async fn submit(
        &self,
        token: &SessionToken,
        table: &Path,
        permutation: &[u64],
        protection: ProtectionType,
        model: Model,
        ceiling: f64,
    ) -> Result<(), BackendError> {
        let input = std::fs::read(table)?;
        let submission = Submission {
            permutation: permutation.to_vec(),
            model,
            protection,
            ceiling,
            input,
        };
        self.submissions.lock().unwrap().push(submission.clone());
        self.with_run(token, |run| run.submission = Some(submission))
    }

    async fn poll_status(&self, token: &SessionToken) -> Result<SessionStatus, BackendError> {
        let polls = self.with_run(token, |run| {
            run.polls += 1;
            run.polls
        })?;
        if polls <= self.running_polls {
            return Ok(SessionStatus::Running);
        }
        Ok(match self.fail_code {
            Some(code) => SessionStatus::Error(code),
            None => SessionStatus::Complete,
        })
    }

    async fn fetch_result(&self, token: &SessionToken) -> Result<f64, BackendError> {
        let costs = self.finished_costs(token)?;
        Ok(costs.last().copied().unwrap_or(0.0) + self.result_skew)
    }

    async fn fetch_costs(&self, token: &SessionToken) -> Result<Vec<f64>, BackendError> {
        self.finished_costs(token)
    }

    async fn fetch_elapsed(&self, _token: &SessionToken) -> Result<u64, BackendError> {
        Ok(1)
    }

    async fn fetch_output_table(&self, token: &SessionToken) -> Result<Vec<u8>, BackendError> {
        let submission = self
            .with_run(token, |run| run.submission.clone())?
            .ok_or_else(|| BackendError::Rejected("nothing submitted".into()))?;
        let cells: Vec<String> = submission.permutation.iter().map(u64::to_string).collect();
        Ok(format!("{} {}", submission.model, cells.join(",")).into_bytes())
    }

    async fn release(&self, token: &SessionToken) -> Result<(), BackendError> {
        self.sessions.lock().unwrap().remove(token.as_str());
        self.releases.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Writes a small input table and returns the directory keeping it alive.
pub fn input_table() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.jj");
    std::fs::write(&path, b"input table").unwrap();
    (dir, path)
}

/// Weights 5, 4, 3, ... for cells 0, 1, 2, ...
pub fn descending_weights(n: u64) -> Vec<(u64, f64)> {
    (0..n).map(|c| (c, (n - c) as f64)).collect()
}
