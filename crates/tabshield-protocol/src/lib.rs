//! Wire vocabulary shared between the search engine and the remote solver
//! server: protection and model names, session tokens, status codes and the
//! plain-text bodies exchanged for permutations and cost sequences.

pub mod model;
pub mod protocol;

pub use model::{Model, ProtectionType};
pub use protocol::{
    encode_permutation, parse_costs, parse_scalar, ProtocolError, RunQuery, SessionQuery,
    SessionStatus, SessionToken, SUPPORTED_PROTOCOL_VERSION,
};
