pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod genome;
pub mod optimizer;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod table;

pub use backend::{Acquire, EvaluationBackend, HttpBackend};
pub use cache::{CacheKey, EvaluationCache};
pub use config::{BackendConfig, SearchParams};
pub use error::{BackendError, SearchError, SearchResult, Stage};
pub use genome::{Gene, Genome, Individual};
pub use optimizer::{PopulationManager, SearchBuildParams, SearchSummary, TerminationReason};
pub use scheduler::{BatchReport, EvaluationRequest, Scheduler};
pub use source::{GenomeSource, GroupSource, PrimaryCellSource};
pub use table::CellTable;
pub use tabshield_protocol::{Model, ProtectionType};
