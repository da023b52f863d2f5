use crate::models::{Gender, Origin, RankedStudent};

/// Demographic key of a sub-group. `origin` is `None` in 2-way grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub gender: Gender,
    pub origin: Option<Origin>,
}

#[derive(Debug, Clone)]
pub struct SubGroup {
    pub key: GroupKey,
    pub members: Vec<RankedStudent>,
}

/// The sub-group keys in the order they are distributed.
pub fn group_keys(has_origin: bool) -> Vec<GroupKey> {
    let genders = [Gender::Male, Gender::Female];

    if has_origin {
        genders
            .iter()
            .flat_map(|&gender| {
                [Origin::Urban, Origin::Rural].map(|origin| GroupKey {
                    gender,
                    origin: Some(origin),
                })
            })
            .collect()
    } else {
        genders
            .iter()
            .map(|&gender| GroupKey { gender, origin: None })
            .collect()
    }
}

/// Split a tier by gender, or by gender × origin when `has_origin` is set.
///
/// Every key yields a group, empty or not; members keep their tier order.
pub fn split_tier(members: Vec<RankedStudent>, has_origin: bool) -> Vec<SubGroup> {
    let mut groups: Vec<SubGroup> = group_keys(has_origin)
        .into_iter()
        .map(|key| SubGroup {
            key,
            members: Vec::new(),
        })
        .collect();

    for member in members {
        let key = GroupKey {
            gender: member.student.gender,
            origin: if has_origin { member.student.origin } else { None },
        };

        // The loader guarantees an origin on every student when `has_origin` is set
        if let Some(group) = groups.iter_mut().find(|group| group.key == key) {
            group.members.push(member);
        }
    }

    groups
}
