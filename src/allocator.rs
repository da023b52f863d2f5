use tracing::{debug, info};

use crate::error::Result;
use crate::grouping::split_tier;
use crate::models::{AllocationConfig, Placement, RankedStudent, Roster, Student};
use crate::snake::{by_score_then_input, PermutationSource, SnakeDistributor};
use crate::tiers::partition;

/// Result of one allocation run.
#[derive(Debug, Clone)]
pub struct Allocation {
    /// Sorted by class, then score descending
    pub placements: Vec<Placement>,
    /// Classes `1..=class_count` exist even when one receives nobody
    pub class_count: usize,
    pub has_origin: bool,
    pub extra_columns: Vec<String>,
}

/// Grade rank of every student, aligned with the input slice.
///
/// Equal scores share the smallest rank of their run; the next distinct score
/// resumes at one more than the number of strictly higher scores.
pub fn grade_ranks(students: &[Student]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..students.len()).collect();
    order.sort_by(|&a, &b| students[b].score.total_cmp(&students[a].score));

    let mut ranks = vec![0u32; students.len()];
    let mut previous: Option<(f64, u32)> = None;

    for (position, &idx) in order.iter().enumerate() {
        let score = students[idx].score;
        let rank = match previous {
            Some((prev_score, prev_rank)) if prev_score == score => prev_rank,
            _ => position as u32 + 1,
        };
        ranks[idx] = rank;
        previous = Some((score, rank));
    }

    ranks
}

/// Attach grade ranks and order the roster best first.
pub fn rank_roster(students: Vec<Student>) -> Vec<RankedStudent> {
    let ranks = grade_ranks(&students);

    let mut ranked: Vec<RankedStudent> = students
        .into_iter()
        .zip(ranks)
        .map(|(student, grade_rank)| RankedStudent { student, grade_rank })
        .collect();
    ranked.sort_by(by_score_then_input);
    ranked
}

pub struct ClassAllocator<P: PermutationSource> {
    config: AllocationConfig,
    distributor: SnakeDistributor<P>,
}

impl<P: PermutationSource> ClassAllocator<P> {
    pub fn new(config: AllocationConfig, source: P) -> Self {
        Self {
            config,
            distributor: SnakeDistributor::new(config.class_count, source),
        }
    }

    /// Rank the whole roster, cut it into tiers, split every tier into
    /// demographic sub-groups and snake-distribute each sub-group on its own.
    ///
    /// Fails with `InsufficientData` before anything is distributed when the
    /// roster cannot fill the top and bottom quotas.
    pub fn allocate(&mut self, roster: Roster) -> Result<Allocation> {
        let Roster {
            students,
            has_origin,
            extra_columns,
        } = roster;
        let total = students.len();

        let ranked = rank_roster(students);
        let tiers = partition(ranked, &self.config)?;

        let mut placements = Vec::with_capacity(total);
        for tier in tiers {
            debug!(tier = ?tier.kind, size = tier.members.len(), "splitting tier");

            for group in split_tier(tier.members, has_origin) {
                debug!(tier = ?tier.kind, key = ?group.key, size = group.members.len(), "sub-group");
                placements.extend(self.distributor.distribute(group.members));
            }
        }

        placements.sort_by(|a, b| {
            a.class_id
                .cmp(&b.class_id)
                .then_with(|| b.student.score.total_cmp(&a.student.score))
                .then_with(|| a.student.input_index.cmp(&b.student.input_index))
        });

        info!(
            students = placements.len(),
            classes = self.config.class_count,
            has_origin,
            "allocation finished"
        );

        Ok(Allocation {
            placements,
            class_count: self.config.class_count,
            has_origin,
            extra_columns,
        })
    }
}
