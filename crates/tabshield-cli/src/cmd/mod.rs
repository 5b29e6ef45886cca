pub mod probe;
pub mod search;
