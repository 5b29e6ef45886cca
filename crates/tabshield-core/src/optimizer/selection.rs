use crate::config::SelectionMethod;
use crate::genome::Individual;
use fastrand::Rng;

pub const MATING_POOL_SIZE: usize = 2;

/// Picks the mating pool from the parents. Truncation sorts `parents` in
/// place, which later replacement steps observe.
pub fn select(method: SelectionMethod, parents: &mut [Individual], rng: &mut Rng) -> Vec<Individual> {
    if parents.is_empty() {
        return Vec::new();
    }
    match method {
        SelectionMethod::Truncation => select_truncation(parents),
        SelectionMethod::Tournament => select_tournament(parents, rng),
        SelectionMethod::FitnessProportionate => select_proportionate(parents, rng),
    }
}

pub fn sort_by_fitness(pool: &mut [Individual]) {
    pool.sort_by(|a, b| a.fitness.total_cmp(&b.fitness));
}

pub fn select_truncation(parents: &mut [Individual]) -> Vec<Individual> {
    sort_by_fitness(parents);
    let last = parents.len() - 1;
    (0..MATING_POOL_SIZE)
        .map(|i| parents[i.min(last)].clone())
        .collect()
}

/// Binary tournament per slot. Ties go to the second draw.
pub fn select_tournament(parents: &[Individual], rng: &mut Rng) -> Vec<Individual> {
    let n = parents.len();
    (0..MATING_POOL_SIZE)
        .map(|_| {
            let l = rng.usize(0..n);
            let k = rng.usize(0..n);
            if parents[l].fitness < parents[k].fitness {
                parents[l].clone()
            } else {
                parents[k].clone()
            }
        })
        .collect()
}

/// Roulette over the normalised cumulative fitness: the chosen index is the
/// last one whose cumulative share lies below the draw (0 if none).
pub fn select_proportionate(parents: &[Individual], rng: &mut Rng) -> Vec<Individual> {
    let total: f64 = parents.iter().map(|p| p.fitness).sum();
    let cumulative: Vec<f64> = parents
        .iter()
        .scan(0.0, |acc, p| {
            *acc += p.fitness / total;
            Some(*acc)
        })
        .collect();

    (0..MATING_POOL_SIZE)
        .map(|_| {
            let r = rng.f64();
            let l = cumulative.iter().rposition(|&c| r > c).unwrap_or(0);
            parents[l].clone()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(fitness: &[f64]) -> Vec<Individual> {
        fitness
            .iter()
            .enumerate()
            .map(|(i, &f)| {
                let mut ind = Individual::new(vec![i as u32]);
                ind.set_evaluation(&[f], f);
                ind
            })
            .collect()
    }

    #[test]
    fn test_truncation_takes_best_two() {
        let mut parents = pool(&[5.0, 1.0, 3.0, 2.0]);
        let mating = select_truncation(&mut parents);
        assert_eq!(mating.len(), 2);
        assert_eq!(mating[0].fitness, 1.0);
        assert_eq!(mating[1].fitness, 2.0);
        // Parents are left sorted.
        let order: Vec<f64> = parents.iter().map(|p| p.fitness).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0, 5.0]);
    }

    #[test]
    fn test_truncation_single_parent() {
        let mut parents = pool(&[4.0]);
        let mating = select_truncation(&mut parents);
        assert_eq!(mating.len(), 2);
        assert!(mating.iter().all(|m| m.fitness == 4.0));
    }

    #[test]
    fn test_tournament_favours_the_fitter() {
        let parents = pool(&[1.0, 9.0]);
        let mut rng = Rng::with_seed(7);
        // The worst wins only when drawn twice.
        let mut wins = 0;
        for _ in 0..200 {
            wins += select_tournament(&parents, &mut rng)
                .iter()
                .filter(|m| m.fitness == 1.0)
                .count();
        }
        assert!(wins > 200, "best parent should win about 3 in 4 slots");
    }

    #[test]
    fn test_proportionate_picks_members() {
        let parents = pool(&[1.0, 1.0, 2.0]);
        let mut rng = Rng::with_seed(3);
        for _ in 0..100 {
            for m in select_proportionate(&parents, &mut rng) {
                assert!(parents.iter().any(|p| p.genes == m.genes));
            }
        }
    }

    #[test]
    fn test_proportionate_zero_total_falls_back_to_first() {
        let parents = pool(&[0.0, 0.0]);
        let mut rng = Rng::with_seed(1);
        let mating = select_proportionate(&parents, &mut rng);
        assert!(mating.iter().all(|m| m.genes == vec![0]));
    }
}
