use crate::config::CrossoverMethod;
use crate::error::{SearchError, SearchResult};
use crate::genome::{permutation_defects, Gene, Genome};
use fastrand::Rng;

/// Recombines two parents into one offspring.
pub fn crossover(
    method: CrossoverMethod,
    p1: &[Gene],
    p2: &[Gene],
    rng: &mut Rng,
) -> SearchResult<Genome> {
    match method {
        CrossoverMethod::Order => crossover_order(p1, p2, rng),
        CrossoverMethod::PartiallyMapped => crossover_partially_mapped(p1, p2, rng),
        CrossoverMethod::DistancePreserving => crossover_distance_preserving(p1, p2),
        CrossoverMethod::Edge | CrossoverMethod::Cycle => {
            Err(SearchError::UnimplementedOperator(method.to_string()))
        }
    }
}

/// Two distinct cut points, returned as (min, max).
fn cut_points(n: usize, rng: &mut Rng) -> (usize, usize) {
    let i = rng.usize(0..n);
    let mut j = i;
    while j == i {
        j = rng.usize(0..n);
    }
    (i.min(j), i.max(j))
}

fn position_table(genes: &[Gene]) -> Vec<usize> {
    let mut pos = vec![0; genes.len()];
    for (idx, &g) in genes.iter().enumerate() {
        pos[g as usize] = idx;
    }
    pos
}

fn check(operator: &'static str, child: &[Gene]) -> SearchResult<()> {
    match permutation_defects(child) {
        None => Ok(()),
        Some(detail) => Err(SearchError::InvalidOffspring { operator, detail }),
    }
}

fn unwrap_slots(operator: &'static str, slots: Vec<Option<Gene>>) -> SearchResult<Genome> {
    slots
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            slot.ok_or_else(|| SearchError::InvalidOffspring {
                operator,
                detail: format!("position {} left empty", idx),
            })
        })
        .collect()
}

/// Order crossover (OX1): keeps `p1[min..=max]` in place and fills the rest,
/// wrapping from `max + 1`, with the remaining genes in `p2`'s cyclic order.
pub fn crossover_order(p1: &[Gene], p2: &[Gene], rng: &mut Rng) -> SearchResult<Genome> {
    let n = p1.len();
    if n < 2 {
        return Ok(p1.to_vec());
    }
    let (min, max) = cut_points(n, rng);
    order_with_cuts(p1, p2, min, max)
}

pub fn order_with_cuts(p1: &[Gene], p2: &[Gene], min: usize, max: usize) -> SearchResult<Genome> {
    let n = p1.len();
    let mut slots: Vec<Option<Gene>> = vec![None; n];
    let mut taken = vec![false; n];

    for k in min..=max {
        slots[k] = Some(p1[k]);
        taken[p1[k] as usize] = true;
    }

    let mut fill = (max + 1) % n;
    for k in 0..n {
        let g = p2[(max + k + 1) % n];
        if !taken[g as usize] {
            taken[g as usize] = true;
            slots[fill] = Some(g);
            fill = (fill + 1) % n;
        }
    }

    let child = unwrap_slots("order", slots)?;
    check("order", &child)?;
    Ok(child)
}

/// Partially mapped crossover (PMX).
pub fn crossover_partially_mapped(p1: &[Gene], p2: &[Gene], rng: &mut Rng) -> SearchResult<Genome> {
    let n = p1.len();
    if n < 2 {
        return Ok(p1.to_vec());
    }
    let (min, max) = cut_points(n, rng);
    partially_mapped_with_cuts(p1, p2, min, max)
}

pub fn partially_mapped_with_cuts(
    p1: &[Gene],
    p2: &[Gene],
    min: usize,
    max: usize,
) -> SearchResult<Genome> {
    let n = p1.len();
    let pos1 = position_table(p1);
    let pos2 = position_table(p2);
    let mut slots: Vec<Option<Gene>> = vec![None; n];

    for k in min..=max {
        slots[k] = Some(p1[k]);
    }

    for k in min..=max {
        let g2 = p2[k];
        let j = pos1[g2 as usize];
        if j >= min && j <= max {
            continue;
        }
        // Follow p1[k] -> its place in p2 until a free slot turns up.
        let mut g1 = p1[k];
        let mut hops = 0;
        loop {
            let j = pos2[g1 as usize];
            if slots[j].is_none() {
                slots[j] = Some(g2);
                break;
            }
            g1 = p1[j];
            hops += 1;
            if hops > n {
                return Err(SearchError::InvalidOffspring {
                    operator: "partially mapped",
                    detail: format!("mapping chain for gene {} does not terminate", g2),
                });
            }
        }
    }

    for (k, slot) in slots.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(p2[k]);
        }
    }

    let child = unwrap_slots("partially mapped", slots)?;
    check("partially mapped", &child)?;
    Ok(child)
}

#[derive(Debug, Clone, Copy)]
struct Fragment {
    p1_start: usize,
    p2_start: usize,
    len: usize,
    reversed: bool,
}

/// Distance preserving crossover: splits `p1` into maximal runs that also
/// occur in `p2` (forwards or backwards), orders the runs by their summed
/// positions in both parents and lays them out taking alternately the `p1`
/// and the `p2` reading of each run.
pub fn crossover_distance_preserving(p1: &[Gene], p2: &[Gene]) -> SearchResult<Genome> {
    let n = p1.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let pos2 = position_table(p2);
    let mut fragments: Vec<Fragment> = Vec::new();
    let mut open: Option<Fragment> = None;

    for i in 0..n {
        let j = pos2[p1[i] as usize];
        let next_i = (i + 1) % n;
        let next_j = (j + 1) % n;
        let prev_j = (j + n - 1) % n;

        let fragment = match open.as_mut() {
            None => open.insert(Fragment {
                p1_start: i,
                p2_start: j,
                len: 1,
                reversed: p1[next_i] != p2[next_j] && p1[next_i] == p2[prev_j],
            }),
            Some(f) => {
                f.len += 1;
                if f.reversed {
                    f.p2_start = j;
                }
                f
            }
        };

        let continues = if fragment.reversed {
            p1[next_i] == p2[prev_j]
        } else {
            p1[next_i] == p2[next_j]
        };
        if !continues || i == n - 1 {
            fragments.extend(open.take());
        }
    }

    fragments.sort_by_key(|f| f.p1_start + f.p2_start);

    let mut child = Vec::with_capacity(n);
    for (k, f) in fragments.iter().enumerate() {
        let (parent, start) = if k % 2 == 0 {
            (p1, f.p1_start)
        } else {
            (p2, f.p2_start)
        };
        child.extend((0..f.len).map(|d| parent[(start + d) % n]));
    }

    check("distance preserving", &child)?;
    Ok(child)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genome::is_permutation;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_order_known_cut() {
        let p1 = vec![0, 1, 2, 3, 4, 5, 6, 7];
        let p2 = vec![7, 6, 5, 4, 3, 2, 1, 0];
        let child = order_with_cuts(&p1, &p2, 2, 4).unwrap();
        // Slice 2,3,4 kept; filling starts at 5 with p2 read from index 5.
        assert_eq!(child, vec![6, 5, 2, 3, 4, 1, 0, 7]);
    }

    #[test]
    fn test_pmx_known_cut() {
        let p1 = vec![0, 1, 2, 3, 4, 5, 6, 7];
        let p2 = vec![3, 7, 5, 1, 6, 0, 2, 4];
        let child = partially_mapped_with_cuts(&p1, &p2, 3, 5).unwrap();
        assert_eq!(&child[3..=5], &[3, 4, 5]);
        assert!(is_permutation(&child));
        // 1, 6 and 0 are placed by following the mapping chain.
        assert_eq!(child, vec![1, 7, 0, 3, 4, 5, 2, 6]);
    }

    #[test]
    fn test_dpx_identical_parents() {
        let p = vec![3, 1, 0, 2];
        let child = crossover_distance_preserving(&p, &p).unwrap();
        assert_eq!(child, p);
    }

    #[test]
    fn test_dpx_reversed_parent() {
        let p1 = vec![0, 1, 2, 3, 4];
        let p2 = vec![4, 3, 2, 1, 0];
        let child = crossover_distance_preserving(&p1, &p2).unwrap();
        assert!(is_permutation(&child));
    }

    #[rstest]
    #[case(CrossoverMethod::Edge)]
    #[case(CrossoverMethod::Cycle)]
    fn test_unimplemented_operators(#[case] method: CrossoverMethod) {
        let mut rng = Rng::with_seed(1);
        let err = crossover(method, &[0, 1, 2], &[2, 1, 0], &mut rng).unwrap_err();
        assert!(matches!(err, SearchError::UnimplementedOperator(_)));
    }

    #[rstest]
    #[case(CrossoverMethod::Order)]
    #[case(CrossoverMethod::PartiallyMapped)]
    #[case(CrossoverMethod::DistancePreserving)]
    fn test_single_gene(#[case] method: CrossoverMethod) {
        let mut rng = Rng::with_seed(1);
        assert_eq!(crossover(method, &[0], &[0], &mut rng).unwrap(), vec![0]);
    }

    fn parents() -> impl Strategy<Value = (Vec<u32>, Vec<u32>, u64)> {
        (2usize..40).prop_flat_map(|n| {
            let base: Vec<u32> = (0..n as u32).collect();
            (
                Just(base.clone()).prop_shuffle(),
                Just(base).prop_shuffle(),
                any::<u64>(),
            )
        })
    }

    proptest! {
        #[test]
        fn prop_offspring_are_permutations((p1, p2, seed) in parents()) {
            let mut rng = Rng::with_seed(seed);
            for method in [
                CrossoverMethod::Order,
                CrossoverMethod::PartiallyMapped,
                CrossoverMethod::DistancePreserving,
            ] {
                let child = crossover(method, &p1, &p2, &mut rng).unwrap();
                prop_assert!(is_permutation(&child), "{:?} produced {:?}", method, child);
            }
        }
    }
}
