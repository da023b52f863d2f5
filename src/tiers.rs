use crate::error::{AllocationError, Result};
use crate::models::{AllocationConfig, RankedStudent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierKind {
    Top,
    Middle,
    Bottom,
}

#[derive(Debug, Clone)]
pub struct Tier {
    pub kind: TierKind,
    pub members: Vec<RankedStudent>,
}

/// Split a roster already sorted best-first into Top, Middle and Bottom.
///
/// Top takes the first `top_n_per_class * K` students, Bottom the last
/// `bottom_n_per_class * K`, Middle whatever lies between (possibly nothing).
pub fn partition(sorted: Vec<RankedStudent>, config: &AllocationConfig) -> Result<[Tier; 3]> {
    let top_quota = config.top_quota();
    let bottom_quota = config.bottom_quota();
    let required = config.required();

    if sorted.len() < required {
        return Err(AllocationError::InsufficientData {
            required,
            available: sorted.len(),
        });
    }

    let mut top = sorted;
    let mut middle = top.split_off(top_quota);
    let bottom = middle.split_off(middle.len() - bottom_quota);

    Ok([
        Tier {
            kind: TierKind::Top,
            members: top,
        },
        Tier {
            kind: TierKind::Middle,
            members: middle,
        },
        Tier {
            kind: TierKind::Bottom,
            members: bottom,
        },
    ])
}
