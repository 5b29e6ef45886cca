use crate::cache::EvaluationCache;
use crate::genome::{Gene, Individual};
use crate::scheduler::Scheduler;
use fastrand::Rng;
use tabshield_protocol::Model;
use tracing::{debug, warn};

/// Appends shuffled copies of `template` to `pool` until `target` solver
/// runs would be needed. A candidate that adds no new run (cached, or equal
/// to a member) is shuffled again; `max_attempts` such failures
/// in a row end the growth. Returns the number of runs now required.
pub fn grow_distinct(
    pool: &mut Vec<Individual>,
    template: &[Gene],
    target: usize,
    cache: &EvaluationCache,
    model: Model,
    max_attempts: usize,
    rng: &mut Rng,
) -> usize {
    let mut required = Scheduler::solvers_required(pool, cache, model);
    let mut attempts = 0;
    let mut candidate: Option<Individual> = None;

    while required < target && attempts < max_attempts {
        let mut next = candidate
            .take()
            .unwrap_or_else(|| Individual::new(template.to_vec()));
        rng.shuffle(&mut next.genes);
        pool.push(next);

        let now = Scheduler::solvers_required(pool, cache, model);
        if now > required {
            required = now;
            attempts = 0;
        } else {
            candidate = pool.pop();
            attempts += 1;
        }
    }

    if required < target {
        warn!(
            "Gave up growing pool after {} attempts: {} of {} solvers used",
            attempts, required, target
        );
    }
    required
}

/// Completes the initial parent pool with random orders.
pub fn fill_parent_pool(
    parents: &mut Vec<Individual>,
    template: &[Gene],
    size: usize,
    cache: &EvaluationCache,
    max_attempts: usize,
    rng: &mut Rng,
) {
    parents.truncate(size);
    let required = grow_distinct(parents, template, size, cache, Model::YPlus, max_attempts, rng);
    debug!("Parent pool holds {} individuals ({} distinct)", parents.len(), required);
}

/// Adds random clones so that up to `max_solvers` sessions have work.
/// Returns the final pool size.
pub fn grow_clone_pool(
    clones: &mut Vec<Individual>,
    template: &[Gene],
    max_solvers: usize,
    cache: &EvaluationCache,
    max_attempts: usize,
    rng: &mut Rng,
) -> usize {
    grow_distinct(clones, template, max_solvers, cache, Model::YPlus, max_attempts, rng);
    clones.len()
}
