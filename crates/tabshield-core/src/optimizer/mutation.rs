use crate::config::MutationMethod;
use crate::genome::{Gene, Individual};
use fastrand::Rng;

/// Rotation used by [`MutationMethod::Assorted`].
const ASSORTED_CYCLE: [MutationMethod; 4] = [
    MutationMethod::Swap,
    MutationMethod::Insert,
    MutationMethod::Scramble,
    MutationMethod::Inversion,
];

/// A second position different from `i`.
fn partner(i: usize, n: usize, rng: &mut Rng) -> usize {
    let mut j = i;
    while j == i {
        j = rng.usize(0..n);
    }
    j
}

/// Visits each position and, with probability `rate`, applies `op(i, j)`
/// with a random partner `j != i`.
fn for_each_mutation<F>(genes: &mut [Gene], rate: f64, rng: &mut Rng, mut op: F)
where
    F: FnMut(&mut [Gene], usize, usize, &mut Rng),
{
    let n = genes.len();
    if n < 2 {
        return;
    }
    for i in 0..n {
        if rng.f64() <= rate {
            let j = partner(i, n, rng);
            op(genes, i, j, rng);
        }
    }
}

pub fn mutate_swap(genes: &mut [Gene], rate: f64, rng: &mut Rng) {
    for_each_mutation(genes, rate, rng, |g, i, j, _| g.swap(i, j));
}

/// Moves the gene at `j` next to position `i` (just after it when `j` lies
/// to the right, just before it otherwise).
pub fn insert_move(genes: &mut [Gene], i: usize, j: usize) {
    if i < j {
        genes[i + 1..=j].rotate_right(1);
    } else if j < i {
        genes[j..i].rotate_left(1);
    }
}

pub fn mutate_insert(genes: &mut [Gene], rate: f64, rng: &mut Rng) {
    for_each_mutation(genes, rate, rng, |g, i, j, _| insert_move(g, i, j));
}

/// `len` random swaps with both positions drawn from `[min, max)`. The upper
/// bound is exclusive, so a range of adjacent positions stays unchanged.
pub fn scramble_range(genes: &mut [Gene], min: usize, max: usize, rng: &mut Rng) {
    if max <= min {
        return;
    }
    for _ in 0..genes.len() {
        let m = rng.usize(min..max);
        let n = rng.usize(min..max);
        genes.swap(m, n);
    }
}

pub fn mutate_scramble(genes: &mut [Gene], rate: f64, rng: &mut Rng) {
    for_each_mutation(genes, rate, rng, |g, i, j, rng| {
        scramble_range(g, i.min(j), i.max(j), rng)
    });
}

/// Swaps `(max - min) / 2` mirrored pairs around the centre of `[min, max]`.
/// Adjacent bounds give zero pairs; an odd-sized span leaves its inner pair
/// in place.
pub fn invert_range(genes: &mut [Gene], min: usize, max: usize) {
    let pairs = max.saturating_sub(min) / 2;
    for k in 0..pairs {
        genes.swap(min + k, max - k);
    }
}

pub fn mutate_inversion(genes: &mut [Gene], rate: f64, rng: &mut Rng) {
    for_each_mutation(genes, rate, rng, |g, i, j, _| {
        invert_range(g, i.min(j), i.max(j))
    });
}

/// Swap mutation at rate 1: every position swaps with a random partner.
pub fn randomise(genes: &mut [Gene], rng: &mut Rng) {
    mutate_swap(genes, 1.0, rng);
}

pub fn mutate(method: MutationMethod, genes: &mut [Gene], rate: f64, rng: &mut Rng) {
    match method {
        MutationMethod::Swap => mutate_swap(genes, rate, rng),
        MutationMethod::Insert => mutate_insert(genes, rate, rng),
        MutationMethod::Scramble => mutate_scramble(genes, rate, rng),
        MutationMethod::Inversion => mutate_inversion(genes, rate, rng),
        MutationMethod::Assorted => mutate_swap(genes, rate, rng),
    }
}

/// Applies the configured mutation to a clone pool. Keeps the assorted
/// rotation between generations.
#[derive(Debug, Clone)]
pub struct Mutator {
    method: MutationMethod,
    next_assorted: usize,
}

impl Mutator {
    pub fn new(method: MutationMethod) -> Self {
        Self {
            method,
            next_assorted: 0,
        }
    }

    pub fn method(&self) -> MutationMethod {
        self.method
    }

    fn next_method(&mut self) -> MutationMethod {
        match self.method {
            MutationMethod::Assorted => {
                let m = ASSORTED_CYCLE[self.next_assorted];
                self.next_assorted = (self.next_assorted + 1) % ASSORTED_CYCLE.len();
                m
            }
            other => other,
        }
    }

    /// Mutates every clone at rate `1/N`. With `randomise_first` the first
    /// clone is fully randomised instead.
    pub fn mutate_clones(&mut self, clones: &mut [Individual], randomise_first: bool, rng: &mut Rng) {
        let skip = usize::from(randomise_first && !clones.is_empty());
        if skip == 1 {
            randomise(&mut clones[0].genes, rng);
        }

        for clone in clones.iter_mut().skip(skip) {
            let n = clone.genes.len();
            if n == 0 {
                continue;
            }
            let rate = 1.0 / n as f64;
            let method = self.next_method();
            mutate(method, &mut clone.genes, rate, rng);
        }
    }
}
