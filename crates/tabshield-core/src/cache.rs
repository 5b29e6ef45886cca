use crate::genome::{format_genes, Gene, Genome};
use fnv::FnvHashMap;
use std::io::{self, Write};
use std::path::Path;
use tabshield_protocol::Model;
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, trace};

/// Intermediate output table downloaded from the solver. The backing file is
/// removed when the handle is dropped.
#[derive(Debug)]
pub struct OutputTable {
    path: TempPath,
}

impl OutputTable {
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn copy_to<P: AsRef<Path>>(&self, dest: P) -> io::Result<u64> {
        std::fs::copy(&self.path, dest)
    }
}

/// Structural identity of an evaluation: gene order plus model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub genes: Genome,
    pub model: Model,
}

impl CacheKey {
    pub fn new(genes: &[Gene], model: Model) -> Self {
        Self {
            genes: genes.to_vec(),
            model,
        }
    }
}

#[derive(Debug)]
pub struct CachedEvaluation {
    pub costs: Vec<f64>,
    pub fitness: f64,
    pub output: Option<OutputTable>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub requests: usize,
    pub hits: usize,
    pub misses: usize,
}

/// Results of every evaluation performed during one search run.
#[derive(Debug, Default)]
pub struct EvaluationCache {
    entries: [FnvHashMap<Genome, CachedEvaluation>; Model::COUNT],
    counters: [CacheCounters; Model::COUNT],
}

impl EvaluationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup that feeds the hit/miss counters.
    pub fn cached(&mut self, genes: &[Gene], model: Model) -> bool {
        let hit = self.entries[model.index()].contains_key(genes);
        self.record(model, hit)
    }

    /// Like [`EvaluationCache::cached`], but an entry without an output
    /// table counts as a miss.
    pub fn cached_with_output(&mut self, genes: &[Gene], model: Model) -> bool {
        let hit = self.output_table(genes, model).is_some();
        self.record(model, hit)
    }

    fn record(&mut self, model: Model, hit: bool) -> bool {
        let counters = &mut self.counters[model.index()];
        counters.requests += 1;
        if hit {
            counters.hits += 1;
        } else {
            counters.misses += 1;
        }
        hit
    }

    pub fn lookup(&self, genes: &[Gene], model: Model) -> Option<&CachedEvaluation> {
        self.entries[model.index()].get(genes)
    }

    pub fn output_table(&self, genes: &[Gene], model: Model) -> Option<&OutputTable> {
        self.lookup(genes, model).and_then(|e| e.output.as_ref())
    }

    /// Stores a result, dropping (and so deleting the file of) any previous
    /// entry for the same key.
    pub fn add(
        &mut self,
        genes: &[Gene],
        model: Model,
        output: Option<OutputTable>,
        costs: &[f64],
        fitness: f64,
    ) {
        let entry = CachedEvaluation {
            costs: costs.to_vec(),
            fitness,
            output,
        };
        if let Some(previous) = self.entries[model.index()].insert(genes.to_vec(), entry) {
            trace!(
                "Replaced cached {} evaluation (fitness {:.3})",
                model,
                previous.fitness
            );
        }
        debug!("Cached {} genome: {}", model, format_genes(genes));
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|m| m.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self, model: Model) -> CacheCounters {
        self.counters[model.index()]
    }

    pub fn log_summary(&self) {
        for model in [Model::YPlus, Model::YMinus] {
            let c = self.counters(model);
            if c.requests == 0 {
                info!("Evaluation cache {} requests: 0", model);
                continue;
            }
            let pct = |n: usize| n as f64 * 100.0 / c.requests as f64;
            info!(
                "Evaluation cache {} requests: {} (hits {} {:.1}%, misses {} {:.1}%)",
                model,
                c.requests,
                c.hits,
                pct(c.hits),
                c.misses,
                pct(c.misses)
            );
        }
    }
}
