use crate::backend::EvaluationBackend;
use crate::cache::{CacheKey, EvaluationCache, OutputTable};
use crate::error::{SearchError, SearchResult};
use crate::genome::{format_genes, Individual};
use crate::session::{
    run_session, AcquireGate, SessionContext, SessionEvent, SessionJob, SessionOutcome,
    SessionState,
};
use crate::source::GenomeSource;
use fnv::{FnvHashMap, FnvHashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabshield_protocol::{Model, ProtectionType};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

/// Largest accepted difference between the reported result and the last
/// cost of the sequence.
pub const FLOAT_TOLERANCE: f64 = 1e-6;

/// How one batch is to be evaluated.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub model: Model,
    pub protection: ProtectionType,
    pub counts_toward_budget: bool,
    /// Solver stops once the cumulative cost exceeds this. Zero disables it.
    pub cost_ceiling: f64,
    /// Copy the output table of the batch's first individual here.
    pub keep_output: Option<PathBuf>,
}

impl EvaluationRequest {
    pub fn new(model: Model, protection: ProtectionType) -> Self {
        Self {
            model,
            protection,
            counts_toward_budget: true,
            cost_ceiling: 0.0,
            keep_output: None,
        }
    }

    pub fn uncounted(mut self) -> Self {
        self.counts_toward_budget = false;
        self
    }

    pub fn with_ceiling(mut self, ceiling: f64) -> Self {
        self.cost_ceiling = ceiling;
        self
    }

    pub fn keep_output(mut self, dest: impl Into<PathBuf>) -> Self {
        self.keep_output = Some(dest.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Remote evaluations run for this batch.
    pub submitted: usize,
    pub cached: usize,
    /// Filled from a peer with the same genome in the batch.
    pub duplicates: usize,
    /// Runs stopped early by the cost ceiling.
    pub truncated: usize,
    pub counted: usize,
}

/// Maps batches of individuals onto the backend's solver sessions.
pub struct Scheduler {
    backend: Arc<dyn EvaluationBackend>,
    tick: Duration,
    run_elimination: bool,
    evaluations: usize,
    counted: usize,
    truncated: usize,
}

impl Scheduler {
    pub fn new(backend: Arc<dyn EvaluationBackend>, tick: Duration, run_elimination: bool) -> Self {
        Self {
            backend,
            tick,
            run_elimination,
            evaluations: 0,
            counted: 0,
            truncated: 0,
        }
    }

    pub fn backend(&self) -> &Arc<dyn EvaluationBackend> {
        &self.backend
    }

    /// Remote evaluations completed so far, counted or not.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Evaluations charged against the search budget.
    pub fn counted(&self) -> usize {
        self.counted
    }

    pub fn truncated(&self) -> usize {
        self.truncated
    }

    /// Number of solver runs `batch` would need under `model`: individuals
    /// that are neither cached nor repeats of an earlier member.
    pub fn solvers_required(batch: &[Individual], cache: &EvaluationCache, model: Model) -> usize {
        let mut distinct: FnvHashSet<&[u32]> = FnvHashSet::default();
        batch
            .iter()
            .filter(|ind| cache.lookup(&ind.genes, model).is_none())
            .filter(|ind| distinct.insert(ind.genes.as_slice()))
            .count()
    }

    /// Evaluates every individual of `batch` with `request.model`. Returns
    /// once all sessions are finished; a fatal error aborts the whole batch.
    pub async fn evaluate(
        &mut self,
        batch: &mut [Individual],
        cache: &mut EvaluationCache,
        source: &dyn GenomeSource,
        table: &Path,
        request: &EvaluationRequest,
    ) -> SearchResult<BatchReport> {
        let model = request.model;
        let mut report = BatchReport::default();
        let mut representatives: FnvHashMap<CacheKey, usize> = FnvHashMap::default();
        let mut duplicates: Vec<(usize, usize)> = Vec::new();
        let mut jobs: Vec<SessionJob> = Vec::new();

        for slot in 0..batch.len() {
            let keeps_output = slot == 0 && request.keep_output.is_some();
            let genes = &batch[slot].genes;

            // The kept output must come from a cached table or a fresh run.
            let hit = if keeps_output {
                cache.cached_with_output(genes, model)
            } else {
                cache.cached(genes, model)
            };
            if let Some(entry) = cache.lookup(genes, model).filter(|_| hit) {
                let (costs, fitness) = (entry.costs.clone(), entry.fitness);
                batch[slot].set_evaluation(&costs, fitness);
                report.cached += 1;
                continue;
            }

            let key = CacheKey::new(genes, model);
            if let Some(&rep) = representatives.get(&key) {
                duplicates.push((slot, rep));
                continue;
            }
            representatives.insert(key, slot);

            let input = match model {
                Model::YPlus => table.to_path_buf(),
                Model::YMinus => cache
                    .output_table(genes, Model::YPlus)
                    .map(|t| t.path().to_path_buf())
                    .ok_or_else(|| {
                        SearchError::Consistency(format!(
                            "no cached yplus output table for genome: {}",
                            format_genes(genes)
                        ))
                    })?,
            };

            jobs.push(SessionJob {
                slot,
                table: input,
                permutation: source.submission_order(genes),
                protection: request.protection,
                model,
                ceiling: request.cost_ceiling,
                fetch_output: model == Model::YPlus || self.run_elimination || keeps_output,
            });
        }

        if !jobs.is_empty() {
            let outcomes = self.dispatch(jobs).await?;
            for outcome in outcomes {
                self.harvest(batch, cache, request, outcome, &mut report)?;
            }
        }

        for (slot, rep) in duplicates {
            let peer = batch[rep].clone();
            batch[slot].copy_evaluation(&peer);
            report.duplicates += 1;
        }

        if let Some(dest) = &request.keep_output {
            if !batch.is_empty() {
                match cache.output_table(&batch[0].genes, model) {
                    Some(output) => {
                        output.copy_to(dest)?;
                        info!("💾 Output table written to {}", dest.display());
                    }
                    None => warn!("No output table available for {}", dest.display()),
                }
            }
        }

        trace!("Batch finished: {:?}", report);
        Ok(report)
    }

    /// Runs one session task per job and waits until every task has exited.
    /// Outcomes come back ordered by slot.
    async fn dispatch(&self, jobs: Vec<SessionJob>) -> SearchResult<Vec<SessionOutcome>> {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ctx = SessionContext {
            backend: Arc::clone(&self.backend),
            gate: AcquireGate::new(),
            tick: self.tick,
            events: events_tx,
            shutdown: shutdown_rx,
        };

        let total = jobs.len();
        debug!("Dispatching {} evaluations", total);
        let mut tasks = JoinSet::new();
        for job in jobs {
            tasks.spawn(run_session(ctx.clone(), job));
        }
        // Only the tasks hold senders now, so the channel closes once they exit.
        drop(ctx);

        let mut outcomes: Vec<SessionOutcome> = Vec::with_capacity(total);
        let mut failure: Option<SearchError> = None;
        let mut running = 0usize;

        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::State { slot, state } => {
                    if state == SessionState::Running {
                        running += 1;
                    } else if state.is_terminal() {
                        running = running.saturating_sub(1);
                    }
                    trace!("Slot {} is {} ({} running)", slot, state, running);
                }
                SessionEvent::Finished(outcome) => {
                    debug!(
                        "Slot {} finished after {} polls ({}s solver time)",
                        outcome.slot, outcome.polls, outcome.elapsed_secs
                    );
                    outcomes.push(outcome);
                }
                SessionEvent::Failed { slot, error } => {
                    if failure.is_none() {
                        error!("Evaluation of slot {} failed: {}", slot, error);
                        let _ = shutdown_tx.send(true);
                        failure = Some(error);
                    } else {
                        debug!("Slot {} also failed: {}", slot, error);
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                failure.get_or_insert(SearchError::Task(e.to_string()));
            }
        }

        if let Some(error) = failure {
            return Err(error);
        }
        if outcomes.len() != total {
            return Err(SearchError::Task(format!(
                "{} of {} evaluations reported no outcome",
                total - outcomes.len(),
                total
            )));
        }

        outcomes.sort_by_key(|o| o.slot);
        Ok(outcomes)
    }

    fn harvest(
        &mut self,
        batch: &mut [Individual],
        cache: &mut EvaluationCache,
        request: &EvaluationRequest,
        outcome: SessionOutcome,
        report: &mut BatchReport,
    ) -> SearchResult<()> {
        let individual = &mut batch[outcome.slot];
        let costs = &outcome.costs;

        if costs.len() > individual.len() {
            return Err(SearchError::Consistency(format!(
                "{} costs reported for a genome of {}",
                costs.len(),
                individual.len()
            )));
        }
        if let Some(pos) = costs.windows(2).position(|w| w[1] < w[0] - FLOAT_TOLERANCE) {
            return Err(SearchError::Consistency(format!(
                "cost sequence decreases at position {}: {} -> {}",
                pos + 1,
                costs[pos],
                costs[pos + 1]
            )));
        }
        individual.set_evaluation(costs, outcome.fitness);
        if (individual.fitness - individual.final_cost()).abs() >= FLOAT_TOLERANCE {
            return Err(SearchError::Consistency(format!(
                "result {} does not match final cost {}",
                individual.fitness,
                individual.final_cost()
            )));
        }

        let output = outcome
            .output
            .as_deref()
            .map(OutputTable::from_bytes)
            .transpose()?;
        cache.add(&individual.genes, request.model, output, costs, outcome.fitness);

        self.evaluations += 1;
        report.submitted += 1;
        if request.counts_toward_budget {
            self.counted += 1;
            report.counted += 1;
        }
        if individual.is_truncated() {
            self.truncated += 1;
            report.truncated += 1;
            debug!(
                "Truncated at {} of {} genes by ceiling {}",
                costs.len(),
                individual.len(),
                request.cost_ceiling
            );
        }

        debug!(
            "Evaluated {} fitness {:.3} genome: {}",
            request.model,
            outcome.fitness,
            format_genes(&individual.genes)
        );
        trace!("costs: {:?}", costs);
        Ok(())
    }
}
