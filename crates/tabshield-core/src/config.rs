use crate::error::{SearchError, SearchResult};
use clap::{Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    Truncation,
    Tournament,
    FitnessProportionate,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CrossoverMethod {
    PartiallyMapped,
    /// Listed for completeness; selecting it aborts the search.
    Edge,
    Order,
    /// Listed for completeness; selecting it aborts the search.
    Cycle,
    DistancePreserving,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MutationMethod {
    Swap,
    Insert,
    Inversion,
    Scramble,
    /// Round-robin over the four concrete strategies.
    Assorted,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter, ValueEnum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReplacementMethod {
    Oldest,
    Worst,
    Tournament,
    WorstByTournament,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    #[arg(long, value_enum, default_value_t = SelectionMethod::Tournament)]
    pub selection: SelectionMethod,
    #[arg(long, value_enum, default_value_t = CrossoverMethod::Order)]
    pub crossover: CrossoverMethod,
    #[arg(long, value_enum, default_value_t = MutationMethod::Assorted)]
    pub mutation: MutationMethod,
    #[arg(long, value_enum, default_value_t = ReplacementMethod::Tournament)]
    pub replacement: ReplacementMethod,

    /// Maximum size of the parent pool.
    #[arg(long, default_value_t = 20)]
    pub pool_parent_capacity: usize,
    #[arg(long, default_value_t = 0.7)]
    pub crossover_probability: f64,

    /// Global cap on budget-counted evaluations (further limited by N!).
    #[arg(long, default_value_t = 1000)]
    pub max_evaluations: usize,
    #[arg(long, default_value_t = 1000)]
    pub stable_generations: usize,
    #[arg(long, default_value_t = 1e-6)]
    pub fitness_tolerance: f64,
    /// Wall-clock allotment for one search.
    #[arg(long, default_value_t = 3600)]
    pub max_seconds: u64,
    #[arg(long, default_value_t = 10_000)]
    pub max_randomisation_attempts: usize,

    /// Solver sessions to use: 0 picks the server's advertised limit.
    #[arg(long, default_value_t = 0)]
    pub cores: u32,
    /// One back-off tick.
    #[arg(long, default_value_t = 10)]
    pub poll_tick_ms: u64,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Keep every intermediate output table (needed by excess-suppression elimination).
    #[arg(long, default_value_t = false)]
    pub run_elimination: bool,
    /// Skip the yminus verification of the best parent after each generation.
    #[arg(long, default_value_t = false)]
    pub skip_verification: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            selection: SelectionMethod::Tournament,
            crossover: CrossoverMethod::Order,
            mutation: MutationMethod::Assorted,
            replacement: ReplacementMethod::Tournament,
            pool_parent_capacity: 20,
            crossover_probability: 0.7,
            max_evaluations: 1000,
            stable_generations: 1000,
            fitness_tolerance: 1e-6,
            max_seconds: 3600,
            max_randomisation_attempts: 10_000,
            cores: 0,
            poll_tick_ms: 10,
            seed: None,
            run_elimination: false,
            skip_verification: false,
        }
    }
}

impl SearchParams {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> SearchResult<Self> {
        let content = fs::read_to_string(path)?;
        let params: SearchParams = serde_json::from_str(&content)?;
        params.validate()?;
        Ok(params)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.pool_parent_capacity < 2 {
            return Err(SearchError::Config(
                "pool_parent_capacity must be at least 2".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.crossover_probability) {
            return Err(SearchError::Config(format!(
                "crossover_probability {} is outside [0, 1]",
                self.crossover_probability
            )));
        }
        if self.cores == 1 {
            return Err(SearchError::Config(
                "Minimum allowable number of cores is two".into(),
            ));
        }
        if self.poll_tick_ms == 0 {
            return Err(SearchError::Config("poll_tick_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn poll_tick(&self) -> Duration {
        Duration::from_millis(self.poll_tick_ms)
    }

    pub fn time_budget(&self) -> Duration {
        Duration::from_secs(self.max_seconds)
    }
}

/// Where the solver server lives.
#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    #[arg(long, default_value = "localhost")]
    pub host: String,
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

impl BackendConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::str::FromStr;

    #[test]
    fn test_partial_json_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "crossover": "distance_preserving", "seed": 7 }}"#).unwrap();

        let params = SearchParams::load_from_file(file.path()).unwrap();
        assert_eq!(params.crossover, CrossoverMethod::DistancePreserving);
        assert_eq!(params.seed, Some(7));
        assert_eq!(params.pool_parent_capacity, 20);
        assert_eq!(params.replacement, ReplacementMethod::Tournament);
    }

    #[test]
    fn test_rejects_single_core() {
        let params = SearchParams {
            cores: 1,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(SearchError::Config(_))));
    }

    #[test]
    fn test_operator_names() {
        assert_eq!(
            <MutationMethod as FromStr>::from_str("assorted").unwrap(),
            MutationMethod::Assorted
        );
        assert_eq!(
            ReplacementMethod::WorstByTournament.to_string(),
            "worst_by_tournament"
        );
    }

    #[test]
    fn test_base_url() {
        let cfg = BackendConfig {
            host: "solver".into(),
            port: 9000,
        };
        assert_eq!(cfg.base_url(), "http://solver:9000");
    }
}
