mod tables;

pub use self::tables::{probe as print_probe_report, search as print_search_report};

use serde::Serialize;
use strum::IntoEnumIterator;
use tabshield_core::{EvaluationCache, Model, SearchResult, SearchSummary};

#[derive(Serialize)]
struct CacheRecord {
    model: String,
    requests: usize,
    hits: usize,
    misses: usize,
}

#[derive(Serialize)]
struct SummaryRecord {
    termination: String,
    best_fitness: f64,
    verified_fitness: Option<f64>,
    best_cells: Vec<u64>,
    generations: usize,
    evaluations: usize,
    counted_evaluations: usize,
    truncated_evaluations: usize,
    elapsed_secs: f64,
    cache: Vec<CacheRecord>,
}

pub fn print_summary_json(summary: &SearchSummary, cache: &EvaluationCache) -> SearchResult<()> {
    let record = SummaryRecord {
        termination: summary.termination.to_string(),
        best_fitness: summary.best_fitness,
        verified_fitness: summary.verified_fitness,
        best_cells: summary.best_cells.clone(),
        generations: summary.generations,
        evaluations: summary.evaluations,
        counted_evaluations: summary.counted_evaluations,
        truncated_evaluations: summary.truncated_evaluations,
        elapsed_secs: summary.elapsed.as_secs_f64(),
        cache: Model::iter()
            .map(|model| {
                let c = cache.counters(model);
                CacheRecord {
                    model: model.to_string(),
                    requests: c.requests,
                    hits: c.hits,
                    misses: c.misses,
                }
            })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
