use crate::model::{Model, ProtectionType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The only solver server protocol revision this client understands.
pub const SUPPORTED_PROTOCOL_VERSION: u32 = 4;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Malformed {what} reply: {reply:?}")]
    Malformed { what: &'static str, reply: String },

    #[error("Malformed cost on line {line}: {value:?}")]
    MalformedCost { line: usize, value: String },
}

/// Opaque identifier the server issues for one claimed solver session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Interprets the body of a `session` reply. The server answers `0` when
    /// every session is taken.
    pub fn from_reply(reply: &str) -> Result<Option<Self>, ProtocolError> {
        let id = reply.trim();
        if id.is_empty() {
            return Err(ProtocolError::Malformed {
                what: "session",
                reply: reply.to_string(),
            });
        }
        if id == "0" {
            return Ok(None);
        }
        Ok(Some(Self(id.to_string())))
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a submitted model as reported by `status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Running,
    Complete,
    /// Solver exited with a non-zero code (or the server reported an unknown state).
    Error(i32),
}

impl SessionStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            -2 | -1 => SessionStatus::Running,
            0 => SessionStatus::Complete,
            other => SessionStatus::Error(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            SessionStatus::Running => -1,
            SessionStatus::Complete => 0,
            SessionStatus::Error(c) => c,
        }
    }
}

/// Query string for resources addressed to a single session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionQuery<'a> {
    pub session: &'a str,
}

/// Query string that uploads a permutation and starts the model.
/// A `maxcost` of zero means no early termination.
#[derive(Debug, Clone, Serialize)]
pub struct RunQuery<'a> {
    pub session: &'a str,
    pub protection: ProtectionType,
    pub model: Model,
    pub maxcost: f64,
}

/// One gene per line, newline terminated.
pub fn encode_permutation(order: &[u64]) -> String {
    let mut body = String::with_capacity(order.len() * 4);
    for gene in order {
        body.push_str(&gene.to_string());
        body.push('\n');
    }
    body
}

/// Reads a cost file body: one float per line. Parsing stops at the first
/// blank line, mirroring how the solver terminates a truncated run.
pub fn parse_costs(body: &str) -> Result<Vec<f64>, ProtocolError> {
    let mut costs = Vec::new();
    for (line, raw) in body.lines().enumerate() {
        let value = raw.trim();
        if value.is_empty() {
            break;
        }
        let cost = value.parse::<f64>().map_err(|_| ProtocolError::MalformedCost {
            line: line + 1,
            value: value.to_string(),
        })?;
        costs.push(cost);
    }
    Ok(costs)
}

/// Parses a single scalar reply (`limit`, `protocol`, `status`, `result`, `time`).
pub fn parse_scalar<T: FromStr>(what: &'static str, reply: &str) -> Result<T, ProtocolError> {
    reply
        .split_whitespace()
        .next()
        .and_then(|tok| tok.parse::<T>().ok())
        .ok_or_else(|| ProtocolError::Malformed {
            what,
            reply: reply.to_string(),
        })
}
