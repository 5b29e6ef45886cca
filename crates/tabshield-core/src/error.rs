use strum_macros::Display;
use tabshield_protocol::{ProtocolError, SessionToken};
use thiserror::Error;

/// Where in the search a fatal condition was detected. Reported to the caller
/// so a backend outage can be told apart from a logic defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    Acquisition,
    Protocol,
    Submission,
    Polling,
    Harvest,
    Consistency,
    Crossover,
    Configuration,
    Scheduling,
    Storage,
}

/// Failure talking to the evaluation backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Server returned HTTP status {0}")]
    Status(u16),

    #[error(transparent)]
    Wire(#[from] ProtocolError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Rejected(String),
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("{stage} failed (session {session}): {source}")]
    Backend {
        stage: Stage,
        session: String,
        #[source]
        source: BackendError,
    },

    #[error("Unsupported solver protocol version {found} (expected {expected})")]
    UnsupportedProtocol { found: u32, expected: u32 },

    #[error("Solver error {code} reported for session {session}")]
    SolverFailed { session: SessionToken, code: i32 },

    #[error("Consistency Error: {0}")]
    Consistency(String),

    #[error("Invalid offspring from {operator} crossover: {detail}")]
    InvalidOffspring {
        operator: &'static str,
        detail: String,
    },

    #[error("{0} crossover is not implemented")]
    UnimplementedOperator(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Evaluation task failed: {0}")]
    Task(String),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV Parsing Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON Parsing Error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn backend(stage: Stage, session: Option<&SessionToken>, source: BackendError) -> Self {
        SearchError::Backend {
            stage,
            session: session.map_or_else(|| "-".to_string(), |s| s.to_string()),
            source,
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            SearchError::Backend { stage, .. } => *stage,
            SearchError::UnsupportedProtocol { .. } => Stage::Protocol,
            SearchError::SolverFailed { .. } => Stage::Polling,
            SearchError::Consistency(_) => Stage::Consistency,
            SearchError::InvalidOffspring { .. } => Stage::Crossover,
            SearchError::UnimplementedOperator(_) | SearchError::Config(_) => Stage::Configuration,
            SearchError::Task(_) => Stage::Scheduling,
            SearchError::Io(_) | SearchError::Csv(_) | SearchError::Json(_) => Stage::Storage,
        }
    }
}

pub type SearchResult<T> = Result<T, SearchError>;
