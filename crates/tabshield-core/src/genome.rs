use itertools::Itertools;
use std::fmt::Write;

pub type Gene = u32;

/// Attack/protection order: a permutation of `0..N`.
pub type Genome = Vec<Gene>;

/// One candidate order together with its evaluation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Individual {
    pub genes: Genome,
    /// Cumulative suppression cost per evaluated prefix. Shorter than the
    /// genome when the solver stopped at the cost ceiling.
    pub costs: Vec<f64>,
    pub fitness: f64,
}

impl Individual {
    pub fn new(genes: Genome) -> Self {
        Self {
            genes,
            costs: Vec::new(),
            fitness: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    pub fn set_evaluation(&mut self, costs: &[f64], fitness: f64) {
        self.costs.clear();
        self.costs.extend_from_slice(costs);
        self.fitness = fitness;
    }

    /// Copies the evaluation of `other` without touching the genes.
    pub fn copy_evaluation(&mut self, other: &Individual) {
        self.set_evaluation(&other.costs, other.fitness);
    }

    pub fn is_truncated(&self) -> bool {
        self.costs.len() < self.genes.len()
    }

    /// Last cost of the sequence, or 0 for an unevaluated or empty genome.
    pub fn final_cost(&self) -> f64 {
        self.costs.last().copied().unwrap_or(0.0)
    }
}

pub fn identity(n: usize) -> Genome {
    (0..n as Gene).collect()
}

pub fn is_permutation(genes: &[Gene]) -> bool {
    permutation_defects(genes).is_none()
}

/// Describes every missing or repeated gene, or `None` for a valid permutation.
pub fn permutation_defects(genes: &[Gene]) -> Option<String> {
    let n = genes.len();
    let mut counts = vec![0usize; n];
    let mut report = String::new();

    for &g in genes {
        match counts.get_mut(g as usize) {
            Some(c) => *c += 1,
            None => {
                let _ = write!(report, " out-of-range gene {}", g);
            }
        }
    }

    for (gene, &count) in counts.iter().enumerate() {
        if count == 0 {
            let _ = write!(report, " missing gene {}", gene);
        } else if count > 1 {
            let _ = write!(report, " duplicate gene {}", gene);
        }
    }

    if report.is_empty() {
        None
    } else {
        Some(report.trim_start().to_string())
    }
}

/// Number of evaluations worth spending on `n` genes: `min(n!, cap)`.
pub fn permutation_bound(n: usize, cap: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let mut perms: usize = 1;
    for i in 2..=n {
        perms = perms.saturating_mul(i);
        if perms > cap {
            break;
        }
    }
    perms.min(cap)
}

pub fn format_genes(genes: &[Gene]) -> String {
    genes.iter().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_permutation_check() {
        assert!(is_permutation(&[2, 0, 1]));
        assert!(is_permutation(&[]));

        let report = permutation_defects(&[0, 0, 2]).unwrap();
        assert!(report.contains("missing gene 1"));
        assert!(report.contains("duplicate gene 0"));

        let report = permutation_defects(&[0, 5]).unwrap();
        assert!(report.contains("out-of-range gene 5"));
    }

    #[rstest]
    #[case(0, 1000, 0)]
    #[case(1, 1000, 1)]
    #[case(3, 1000, 6)]
    #[case(6, 1000, 720)]
    #[case(7, 1000, 1000)]
    #[case(40, 1000, 1000)]
    #[case(4, 10, 10)]
    fn test_permutation_bound(#[case] n: usize, #[case] cap: usize, #[case] expected: usize) {
        assert_eq!(permutation_bound(n, cap), expected);
    }

    #[test]
    fn test_truncation_flag() {
        let mut ind = Individual::new(identity(4));
        ind.set_evaluation(&[1.0, 2.0], 2.0);
        assert!(ind.is_truncated());
        assert_eq!(ind.final_cost(), 2.0);

        ind.set_evaluation(&[1.0, 2.0, 2.0, 3.0], 3.0);
        assert!(!ind.is_truncated());
    }
}
