use crate::config::ReplacementMethod;
use crate::genome::Individual;
use crate::optimizer::selection::sort_by_fitness;
use fastrand::Rng;

/// Index of the fittest clone; ties are broken uniformly at random.
pub fn fittest_clone(clones: &[Individual], rng: &mut Rng) -> Option<usize> {
    let best = clones
        .iter()
        .map(|c| c.fitness)
        .min_by(|a, b| a.total_cmp(b))?;
    let tied: Vec<usize> = clones
        .iter()
        .enumerate()
        .filter(|(_, c)| c.fitness == best)
        .map(|(i, _)| i)
        .collect();
    if tied.len() == 1 {
        Some(tied[0])
    } else {
        Some(tied[rng.usize(0..tied.len())])
    }
}

/// Moves the fittest clone into the parent pool. The pool grows until it
/// reaches `capacity`; after that the configured method picks the victim.
#[derive(Debug, Clone)]
pub struct Replacer {
    method: ReplacementMethod,
    capacity: usize,
    next: usize,
}

impl Replacer {
    pub fn new(method: ReplacementMethod, capacity: usize) -> Self {
        Self {
            method,
            capacity,
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the parent slot that received the clone, if any.
    pub fn replace(
        &mut self,
        parents: &mut Vec<Individual>,
        clones: &[Individual],
        rng: &mut Rng,
    ) -> Option<usize> {
        let fittest = &clones[fittest_clone(clones, rng)?];

        if parents.len() < self.capacity {
            parents.push(fittest.clone());
            return Some(parents.len() - 1);
        }
        if parents.is_empty() {
            return None;
        }

        match self.method {
            ReplacementMethod::Oldest => {
                let slot = self.next % parents.len();
                parents[slot] = fittest.clone();
                self.next = (slot + 1) % parents.len();
                Some(slot)
            }
            ReplacementMethod::Worst => {
                sort_by_fitness(parents);
                let slot = parents.len() - 1;
                parents[slot] = fittest.clone();
                Some(slot)
            }
            ReplacementMethod::Tournament => {
                let slot = self.next % parents.len();
                self.next = (slot + 1) % parents.len();
                if parents[slot].fitness > fittest.fitness {
                    parents[slot] = fittest.clone();
                    Some(slot)
                } else {
                    None
                }
            }
            ReplacementMethod::WorstByTournament => {
                let mut worst = 0;
                for (i, p) in parents.iter().enumerate().skip(1) {
                    if p.fitness > parents[worst].fitness {
                        worst = i;
                    }
                }
                if parents[worst].fitness > fittest.fitness {
                    parents[worst] = fittest.clone();
                    Some(worst)
                } else {
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    fn ind(tag: u32, fitness: f64) -> Individual {
        let mut i = Individual::new(vec![tag]);
        i.set_evaluation(&[fitness], fitness);
        i
    }

    #[test]
    fn test_fittest_clone_tie_break_is_uniform() {
        let clones = vec![ind(0, 2.0), ind(1, 1.0), ind(2, 1.0), ind(3, 5.0)];
        let mut rng = Rng::with_seed(9);
        let mut hits = [0usize; 4];
        for _ in 0..400 {
            hits[fittest_clone(&clones, &mut rng).unwrap()] += 1;
        }
        assert_eq!(hits[0] + hits[3], 0);
        assert!(hits[1] > 120 && hits[2] > 120, "{:?}", hits);
    }

    #[test]
    fn test_grows_until_capacity() {
        let mut rng = Rng::with_seed(1);
        let mut replacer = Replacer::new(ReplacementMethod::Tournament, 2);
        let mut parents = vec![ind(0, 3.0)];
        assert_eq!(replacer.replace(&mut parents, &[ind(1, 9.0)], &mut rng), Some(1));
        assert_eq!(parents.len(), 2);
        // Full: a worse clone is rejected by the tournament.
        assert_eq!(replacer.replace(&mut parents, &[ind(2, 10.0)], &mut rng), None);
        assert_eq!(parents.len(), 2);
    }

    #[test]
    fn test_oldest_cycles() {
        let mut rng = Rng::with_seed(1);
        let mut replacer = Replacer::new(ReplacementMethod::Oldest, 3);
        let mut parents = vec![ind(0, 1.0), ind(1, 1.0), ind(2, 1.0)];
        let slots: Vec<Option<usize>> = (0..4)
            .map(|k| replacer.replace(&mut parents, &[ind(10 + k, 50.0)], &mut rng))
            .collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(2), Some(0)]);
        assert_eq!(parents[0].genes, vec![13]);
    }

    #[test]
    fn test_worst_sorts_and_replaces_last() {
        let mut rng = Rng::with_seed(1);
        let mut replacer = Replacer::new(ReplacementMethod::Worst, 3);
        let mut parents = vec![ind(0, 5.0), ind(1, 1.0), ind(2, 3.0)];
        replacer.replace(&mut parents, &[ind(9, 4.0)], &mut rng);
        let fitness: Vec<f64> = parents.iter().map(|p| p.fitness).collect();
        assert_eq!(fitness, vec![1.0, 3.0, 4.0]);
    }

    #[test]
    fn test_tournament_advances_even_when_rejected() {
        let mut rng = Rng::with_seed(1);
        let mut replacer = Replacer::new(ReplacementMethod::Tournament, 2);
        let mut parents = vec![ind(0, 1.0), ind(1, 8.0)];
        assert_eq!(replacer.replace(&mut parents, &[ind(5, 2.0)], &mut rng), None);
        assert_eq!(replacer.replace(&mut parents, &[ind(6, 2.0)], &mut rng), Some(1));
    }

    #[rstest]
    #[case(4.0, Some(0))]
    #[case(9.0, None)]
    #[case(6.0, None)]
    fn test_worst_by_tournament(#[case] clone_fitness: f64, #[case] expected: Option<usize>) {
        let mut rng = Rng::with_seed(1);
        let mut replacer = Replacer::new(ReplacementMethod::WorstByTournament, 3);
        let mut parents = vec![ind(0, 6.0), ind(1, 2.0), ind(2, 6.0)];
        assert_eq!(
            replacer.replace(&mut parents, &[ind(7, clone_fitness)], &mut rng),
            expected
        );
    }

    proptest! {
        #[test]
        fn prop_pool_never_exceeds_capacity(
            capacity in 1usize..10,
            rounds in proptest::collection::vec(proptest::collection::vec(0.0f64..100.0, 1..5), 1..30),
            method in prop_oneof![
                Just(ReplacementMethod::Oldest),
                Just(ReplacementMethod::Worst),
                Just(ReplacementMethod::Tournament),
                Just(ReplacementMethod::WorstByTournament),
            ],
        ) {
            let mut rng = Rng::with_seed(capacity as u64);
            let mut replacer = Replacer::new(method, capacity);
            let mut parents = Vec::new();
            for (r, fitness) in rounds.iter().enumerate() {
                let clones: Vec<Individual> =
                    fitness.iter().map(|&f| ind(r as u32, f)).collect();
                let before = parents.len();
                replacer.replace(&mut parents, &clones, &mut rng);
                prop_assert!(parents.len() <= capacity);
                prop_assert!(parents.len() >= before);
            }
        }
    }
}
