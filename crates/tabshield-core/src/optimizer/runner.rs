use crate::backend::EvaluationBackend;
use crate::cache::EvaluationCache;
use crate::config::{CrossoverMethod, SearchParams};
use crate::error::{SearchError, SearchResult, Stage};
use crate::genome::{format_genes, permutation_bound, Gene, Individual};
use crate::optimizer::crossover::crossover;
use crate::optimizer::initialization::{fill_parent_pool, grow_clone_pool};
use crate::optimizer::mutation::Mutator;
use crate::optimizer::replacement::Replacer;
use crate::optimizer::selection::select;
use crate::scheduler::{EvaluationRequest, Scheduler};
use crate::source::GenomeSource;
use fastrand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum_macros::Display;
use tabshield_protocol::{Model, SUPPORTED_PROTOCOL_VERSION};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

/// Why a search stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TerminationReason {
    #[strum(serialize = "nothing to protect")]
    NoGenes,
    #[strum(serialize = "evaluation limit reached")]
    EvaluationBudget,
    #[strum(serialize = "fitness stable")]
    Stable,
    #[strum(serialize = "time limit reached")]
    TimeLimit,
    #[strum(serialize = "generation cap reached")]
    GenerationCap,
}

#[derive(Debug, Clone)]
pub struct SearchSummary {
    pub best_fitness: f64,
    /// Result of the last yminus check of the best parent, if one ran.
    pub verified_fitness: Option<f64>,
    pub best_genome: Vec<Gene>,
    pub best_cells: Vec<u64>,
    pub generations: usize,
    pub evaluations: usize,
    pub counted_evaluations: usize,
    pub truncated_evaluations: usize,
    pub termination: TerminationReason,
    pub elapsed: Duration,
}

#[derive(TypedBuilder)]
pub struct SearchBuildParams {
    pub backend: Arc<dyn EvaluationBackend>,
    pub source: Arc<dyn GenomeSource>,
    /// Input table uploaded for every yplus evaluation.
    #[builder(setter(into))]
    pub table: PathBuf,
    #[builder(default)]
    pub params: SearchParams,
    /// Where the verified best parent's output table is written.
    #[builder(default, setter(strip_option, into))]
    pub output: Option<PathBuf>,
}

impl SearchBuildParams {
    pub async fn connect(self) -> SearchResult<PopulationManager> {
        PopulationManager::connect(self).await
    }
}

/// Owns the pools and the evaluation cache of one search and runs it one
/// generation at a time.
pub struct PopulationManager {
    params: SearchParams,
    source: Arc<dyn GenomeSource>,
    table: PathBuf,
    output: Option<PathBuf>,
    scheduler: Scheduler,
    cache: EvaluationCache,
    rng: Rng,
    mutator: Mutator,
    replacer: Replacer,
    parents: Vec<Individual>,
    cores: usize,
    max_evaluations: usize,
    default_clones: usize,
    generations: usize,
    stable_fitness: f64,
    stable_generations: usize,
    terminated: Option<TerminationReason>,
    verified_fitness: Option<f64>,
    started: Instant,
}

impl PopulationManager {
    /// Negotiates capacity with the backend, sizes the pools, and evaluates
    /// the initial population.
    pub async fn connect(build: SearchBuildParams) -> SearchResult<Self> {
        let SearchBuildParams {
            backend,
            source,
            table,
            params,
            output,
        } = build;
        params.validate()?;
        if matches!(params.crossover, CrossoverMethod::Edge | CrossoverMethod::Cycle) {
            return Err(SearchError::UnimplementedOperator(params.crossover.to_string()));
        }

        let started = Instant::now();
        let genes = source.gene_count();
        info!(
            "🛡️  Protecting {} ({} genes, {} protection)",
            table.display(),
            genes,
            source.protection_type()
        );

        let rng = match params.seed {
            Some(seed) => Rng::with_seed(seed),
            None => Rng::new(),
        };
        let scheduler = Scheduler::new(backend.clone(), params.poll_tick(), params.run_elimination);

        let mut manager = Self {
            mutator: Mutator::new(params.mutation),
            replacer: Replacer::new(params.replacement, params.pool_parent_capacity),
            params,
            source,
            table,
            output,
            scheduler,
            cache: EvaluationCache::new(),
            rng,
            parents: Vec::new(),
            cores: 0,
            max_evaluations: 0,
            default_clones: 0,
            generations: 0,
            stable_fitness: f64::MAX,
            stable_generations: 0,
            terminated: None,
            verified_fitness: None,
            started,
        };

        if genes == 0 {
            info!("No genes to order, nothing to search");
            return Ok(manager);
        }

        manager.cores = negotiate_cores(backend.as_ref(), &manager.params).await?;
        manager.size_pools(genes);
        manager.initial_population().await?;
        Ok(manager)
    }

    fn size_pools(&mut self, genes: usize) {
        self.max_evaluations = permutation_bound(genes, self.params.max_evaluations);
        let initial = self.cores.min(self.max_evaluations);
        self.default_clones = self.cores.min(self.max_evaluations - initial);
        info!("Maximum number of evaluations {}", self.max_evaluations);
        info!(
            "Initial parents {}, default clones {}",
            initial, self.default_clones
        );
        self.parents.reserve(self.params.pool_parent_capacity);
        self.parents.extend(
            self.source
                .seed_genomes()
                .into_iter()
                .take(initial)
                .map(Individual::new),
        );
    }

    async fn initial_population(&mut self) -> SearchResult<()> {
        let template = match self.parents.first() {
            Some(seed) => seed.genes.clone(),
            None => return Ok(()),
        };
        let size = self.cores.min(self.max_evaluations);
        fill_parent_pool(
            &mut self.parents,
            &template,
            size,
            &self.cache,
            self.params.max_randomisation_attempts,
            &mut self.rng,
        );

        let request = EvaluationRequest::new(Model::YPlus, self.source.protection_type());
        let report = self
            .scheduler
            .evaluate(
                &mut self.parents,
                &mut self.cache,
                self.source.as_ref(),
                &self.table,
                &request,
            )
            .await?;
        info!(
            "🧬 Initial population of {} evaluated ({} solver runs), best {:.3}",
            self.parents.len(),
            report.submitted,
            self.current_best_fitness()
        );

        if !self.params.skip_verification {
            self.evaluate_best_parent().await?;
        }
        Ok(())
    }

    /// Runs one generation: select, cross, clone, mutate, grow, evaluate,
    /// replace, then re-check the best parent with the yminus model. With
    /// `limit_cost` the solver stops clone runs that exceed the worst parent.
    pub async fn run_one_generation(&mut self, limit_cost: bool) -> SearchResult<()> {
        if self.parents.is_empty() {
            return Ok(());
        }
        let worst = self.worst_fitness();

        let mating = select(self.params.selection, &mut self.parents, &mut self.rng);
        let offspring = if self.rng.f64() < self.params.crossover_probability {
            crossover(
                self.params.crossover,
                &mating[0].genes,
                &mating[1].genes,
                &mut self.rng,
            )?
        } else {
            mating[0].genes.clone()
        };

        let mut clones = vec![Individual::new(offspring.clone()); self.default_clones];
        let randomise_first = self.parents.len() < self.replacer.capacity();
        self.mutator
            .mutate_clones(&mut clones, randomise_first, &mut self.rng);

        let remaining = self.max_evaluations.saturating_sub(self.counted_evaluations());
        let max_solvers = self.default_clones.min(remaining);
        if max_solvers != self.default_clones {
            warn!("Maximum number of solvers is limited to {}", max_solvers);
        }
        let pool_size = grow_clone_pool(
            &mut clones,
            &offspring,
            max_solvers,
            &self.cache,
            self.params.max_randomisation_attempts,
            &mut self.rng,
        );

        let ceiling = if limit_cost { worst } else { 0.0 };
        let request = EvaluationRequest::new(Model::YPlus, self.source.protection_type())
            .with_ceiling(ceiling);
        let report = self
            .scheduler
            .evaluate(
                &mut clones,
                &mut self.cache,
                self.source.as_ref(),
                &self.table,
                &request,
            )
            .await?;

        let slot = self
            .replacer
            .replace(&mut self.parents, &clones, &mut self.rng);
        self.generations += 1;

        debug!(
            "Generation {}: {} clones, {:?}, replaced {:?}",
            self.generations, pool_size, report, slot
        );
        info!(
            "🧬 Generation {}: best {:.3}, evaluations {}/{}",
            self.generations,
            self.current_best_fitness(),
            self.counted_evaluations(),
            self.max_evaluations
        );

        if !self.params.skip_verification {
            self.evaluate_best_parent().await?;
        }
        Ok(())
    }

    /// Re-evaluates a copy of the best parent with the yminus model, without
    /// charging the budget or limiting the cost. Writes the output table when
    /// an output path was configured.
    pub async fn evaluate_best_parent(&mut self) -> SearchResult<f64> {
        let Some(best) = self.best_parent() else {
            return Ok(0.0);
        };
        let mut copy = [self.parents[best].clone()];
        debug!("Evaluating best parent {}", best);

        let mut request =
            EvaluationRequest::new(Model::YMinus, self.source.protection_type()).uncounted();
        request.keep_output = self.output.clone();

        self.scheduler
            .evaluate(
                &mut copy,
                &mut self.cache,
                self.source.as_ref(),
                &self.table,
                &request,
            )
            .await?;

        let fitness = copy[0].fitness;
        self.verified_fitness = Some(fitness);
        Ok(fitness)
    }

    /// Checks, in order: no genes, evaluation budget, fitness stability and
    /// wall-clock budget. Once true it stays true.
    pub fn time_to_terminate(&mut self) -> bool {
        if self.terminated.is_some() {
            return true;
        }
        if self.parents.is_empty() {
            return self.stop(TerminationReason::NoGenes);
        }
        if self.counted_evaluations() >= self.max_evaluations {
            return self.stop(TerminationReason::EvaluationBudget);
        }

        let best = self.current_best_fitness();
        if (best - self.stable_fitness).abs() < self.params.fitness_tolerance {
            self.stable_generations += 1;
        } else {
            self.stable_generations = 0;
        }
        self.stable_fitness = best;
        if self.stable_generations >= self.params.stable_generations {
            return self.stop(TerminationReason::Stable);
        }

        if self.started.elapsed() > self.params.time_budget() {
            return self.stop(TerminationReason::TimeLimit);
        }
        false
    }

    fn stop(&mut self, reason: TerminationReason) -> bool {
        info!(
            "🏁 Search terminated: {} ({} generations, {} evaluations)",
            reason,
            self.generations,
            self.counted_evaluations()
        );
        self.terminated = Some(reason);
        true
    }

    /// Runs generations until a termination condition holds or
    /// `generation_cap` generations have run.
    pub async fn run(&mut self, limit_cost: bool, generation_cap: Option<usize>) -> SearchResult<SearchSummary> {
        let mut ran = 0;
        while !self.time_to_terminate() {
            if generation_cap.is_some_and(|cap| ran >= cap) {
                self.stop(TerminationReason::GenerationCap);
                break;
            }
            self.run_one_generation(limit_cost).await?;
            ran += 1;
        }
        Ok(self.summary())
    }

    pub fn summary(&self) -> SearchSummary {
        let best_genome = self.best_genome().map(<[Gene]>::to_vec).unwrap_or_default();
        SearchSummary {
            best_fitness: self.current_best_fitness(),
            verified_fitness: self.verified_fitness,
            best_cells: self.source.submission_order(&best_genome),
            best_genome,
            generations: self.generations,
            evaluations: self.evaluations_so_far(),
            counted_evaluations: self.counted_evaluations(),
            truncated_evaluations: self.scheduler.truncated(),
            termination: self.terminated.unwrap_or(TerminationReason::GenerationCap),
            elapsed: self.started.elapsed(),
        }
    }

    fn best_parent(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, p) in self.parents.iter().enumerate() {
            match best {
                Some(b) if self.parents[b].fitness <= p.fitness => {}
                _ => best = Some(i),
            }
        }
        best
    }

    fn worst_fitness(&self) -> f64 {
        self.parents
            .iter()
            .map(|p| p.fitness)
            .fold(0.0, f64::max)
    }

    pub fn current_best_fitness(&self) -> f64 {
        self.best_parent()
            .map_or(0.0, |b| self.parents[b].fitness)
    }

    pub fn best_genome(&self) -> Option<&[Gene]> {
        self.best_parent().map(|b| self.parents[b].genes.as_slice())
    }

    /// Every solver run so far, counted or not.
    pub fn evaluations_so_far(&self) -> usize {
        self.scheduler.evaluations()
    }

    pub fn counted_evaluations(&self) -> usize {
        self.scheduler.counted()
    }

    pub fn verified_fitness(&self) -> Option<f64> {
        self.verified_fitness
    }

    pub fn termination_reason(&self) -> Option<TerminationReason> {
        self.terminated
    }

    pub fn parents(&self) -> &[Individual] {
        &self.parents
    }

    pub fn cache(&self) -> &EvaluationCache {
        &self.cache
    }

    pub fn cores(&self) -> usize {
        self.cores
    }

    pub fn max_evaluations(&self) -> usize {
        self.max_evaluations
    }

    pub fn default_clones(&self) -> usize {
        self.default_clones
    }

    pub fn generations(&self) -> usize {
        self.generations
    }
}

impl Drop for PopulationManager {
    fn drop(&mut self) {
        self.cache.log_summary();
        info!(
            "Search over {} took {:.1}s",
            self.table.display(),
            self.started.elapsed().as_secs_f64()
        );
        if let Some(genes) = self.best_genome() {
            debug!("Best genome: {}", format_genes(genes));
        }
    }
}

/// Checks the protocol revision and picks the number of solver sessions.
async fn negotiate_cores(backend: &dyn EvaluationBackend, params: &SearchParams) -> SearchResult<usize> {
    let version = backend
        .protocol_version()
        .await
        .map_err(|e| SearchError::backend(Stage::Protocol, None, e))?;
    if version != SUPPORTED_PROTOCOL_VERSION {
        return Err(SearchError::UnsupportedProtocol {
            found: version,
            expected: SUPPORTED_PROTOCOL_VERSION,
        });
    }

    let available = backend
        .capacity()
        .await
        .map_err(|e| SearchError::backend(Stage::Protocol, None, e))? as usize;
    if available < 2 {
        return Err(SearchError::Config(format!(
            "server offers {} cores, at least two are required",
            available
        )));
    }

    let cores = match params.cores as usize {
        0 => available,
        requested => requested.min(available),
    }
    .min(params.pool_parent_capacity);

    info!("🖥️  {} cores available, using {}", available, cores);
    Ok(cores)
}
