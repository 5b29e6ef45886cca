pub mod crossover;
pub mod initialization;
pub mod mutation;
pub mod replacement;
pub mod runner;
pub mod selection;

pub use self::runner::{
    PopulationManager, SearchBuildParams, SearchSummary, TerminationReason,
};
