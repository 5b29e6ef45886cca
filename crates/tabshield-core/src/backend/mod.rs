pub mod http;

use crate::error::BackendError;
use async_trait::async_trait;
use std::path::Path;
use tabshield_protocol::{Model, ProtectionType, SessionStatus, SessionToken};

pub use http::HttpBackend;

/// Outcome of asking the backend for a solver session. `Busy` is the normal
/// answer while every session is taken, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquire {
    Granted(SessionToken),
    Busy,
}

/// Remote LP-solver service. One token is one claimed solver session; a
/// session runs one model at a time.
#[async_trait]
pub trait EvaluationBackend: Send + Sync {
    async fn acquire_session(&self) -> Result<Acquire, BackendError>;

    /// Number of sessions the server can run at once.
    async fn capacity(&self) -> Result<u32, BackendError>;

    async fn protocol_version(&self) -> Result<u32, BackendError>;

    /// Uploads the input table and the permutation, then starts the model.
    /// A `ceiling` of zero disables early termination.
    async fn submit(
        &self,
        token: &SessionToken,
        table: &Path,
        permutation: &[u64],
        protection: ProtectionType,
        model: Model,
        ceiling: f64,
    ) -> Result<(), BackendError>;

    async fn poll_status(&self, token: &SessionToken) -> Result<SessionStatus, BackendError>;

    async fn fetch_result(&self, token: &SessionToken) -> Result<f64, BackendError>;

    async fn fetch_costs(&self, token: &SessionToken) -> Result<Vec<f64>, BackendError>;

    /// Solver wall time in seconds.
    async fn fetch_elapsed(&self, token: &SessionToken) -> Result<u64, BackendError>;

    async fn fetch_output_table(&self, token: &SessionToken) -> Result<Vec<u8>, BackendError>;

    async fn release(&self, token: &SessionToken) -> Result<(), BackendError>;
}
