use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::models::{Placement, RankedStudent};

/// Supplies the base class order for each sub-group.
pub trait PermutationSource {
    /// A permutation of the class ids `1..=class_count`.
    fn permutation(&mut self, class_count: usize) -> Vec<u32>;
}

/// Shuffles class ids with a seedable RNG so that no class id is
/// systematically first in line for the best student.
pub struct ShuffledClasses {
    rng: StdRng,
}

impl ShuffledClasses {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::from_seed(seed),
            None => Self::from_entropy(),
        }
    }
}

impl PermutationSource for ShuffledClasses {
    fn permutation(&mut self, class_count: usize) -> Vec<u32> {
        let mut ids: Vec<u32> = (1..=class_count as u32).collect();
        ids.shuffle(&mut self.rng);
        ids
    }
}

/// Orders students best first; equal scores keep input order.
pub fn by_score_then_input(a: &RankedStudent, b: &RankedStudent) -> Ordering {
    b.student
        .score
        .total_cmp(&a.student.score)
        .then_with(|| a.student.input_index.cmp(&b.student.input_index))
}

/// Forward, then reversed, repeated and cut to `len` entries.
pub fn snake_sequence(base: &[u32], len: usize) -> Vec<u32> {
    if base.is_empty() {
        return Vec::new();
    }

    base.iter()
        .chain(base.iter().rev())
        .copied()
        .cycle()
        .take(len)
        .collect()
}

pub struct SnakeDistributor<P: PermutationSource> {
    class_count: usize,
    source: P,
}

impl<P: PermutationSource> SnakeDistributor<P> {
    pub fn new(class_count: usize, source: P) -> Self {
        Self {
            class_count,
            source,
        }
    }

    /// Assign one sub-group to classes.
    ///
    /// Members are ranked by score (input order on ties) and walk a snake
    /// through a freshly drawn class order, so within every block of `2K`
    /// students each class receives one from the top half and one from the
    /// bottom half. An empty group draws nothing and yields nothing.
    pub fn distribute(&mut self, group: Vec<RankedStudent>) -> Vec<Placement> {
        if group.is_empty() {
            return Vec::new();
        }

        let mut group = group;
        group.sort_by(by_score_then_input);

        let base = self.source.permutation(self.class_count);
        let sequence = snake_sequence(&base, group.len());
        debug!(size = group.len(), order = ?base, "distributing sub-group");

        group
            .into_iter()
            .zip(sequence)
            .map(|(ranked, class_id)| Placement {
                class_id,
                grade_rank: ranked.grade_rank,
                student: ranked.student,
            })
            .collect()
    }
}
