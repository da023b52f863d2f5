use serde::{Deserialize, Serialize};

use crate::error::{AllocationError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub class_count: Option<usize>,
    pub top_n_per_class: usize,
    pub bottom_n_per_class: usize,
    // Pins the class-order shuffle; leave unset for a fresh shuffle every run
    pub seed: Option<u64>,
    pub output_directory: Option<String>,
    pub columns: ColumnNames,
    pub labels: Labels,
    pub summary: SummaryLabels,
}

/// Header names looked up in the input sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub name: String,
    pub gender: String,
    pub score: String,
    pub origin: String,
    pub class: String,
    pub rank: String,
}

/// Cell literals recognized for gender and origin.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Labels {
    pub male: String,
    pub female: String,
    pub urban: String,
    pub rural: String,
}

/// Headers of the class summary sheet and the label of its average row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryLabels {
    pub class: String,
    pub headcount: String,
    pub mean_score: String,
    pub male: String,
    pub female: String,
    pub urban: String,
    pub rural: String,
    pub average: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            class_count: None,
            top_n_per_class: 10,
            bottom_n_per_class: 10,
            seed: None,
            output_directory: None,
            columns: ColumnNames::default(),
            labels: Labels::default(),
            summary: SummaryLabels::default(),
        }
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            name: "姓名".to_string(),
            gender: "性别".to_string(),
            score: "总分".to_string(),
            origin: "城乡".to_string(),
            class: "班级".to_string(),
            rank: "年级排名".to_string(),
        }
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            male: "男".to_string(),
            female: "女".to_string(),
            urban: "城区".to_string(),
            rural: "乡下".to_string(),
        }
    }
}

impl Default for SummaryLabels {
    fn default() -> Self {
        Self {
            class: "班级".to_string(),
            headcount: "总人数".to_string(),
            mean_score: "平均分".to_string(),
            male: "男生".to_string(),
            female: "女生".to_string(),
            urban: "城区".to_string(),
            rural: "乡下".to_string(),
            average: "平均".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file(file_path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(file_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, file_path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(file_path, content)?;
        Ok(())
    }
}

impl Labels {
    pub fn parse_gender(&self, value: &str) -> Option<Gender> {
        let value = value.trim();
        if value == self.male {
            Some(Gender::Male)
        } else if value == self.female {
            Some(Gender::Female)
        } else {
            None
        }
    }

    pub fn parse_origin(&self, value: &str) -> Option<Origin> {
        let value = value.trim();
        if value == self.urban {
            Some(Origin::Urban)
        } else if value == self.rural {
            Some(Origin::Rural)
        } else {
            None
        }
    }

    pub fn gender_label(&self, gender: Gender) -> &str {
        match gender {
            Gender::Male => &self.male,
            Gender::Female => &self.female,
        }
    }

    pub fn origin_label(&self, origin: Origin) -> &str {
        match origin {
            Origin::Urban => &self.urban,
            Origin::Rural => &self.rural,
        }
    }
}

/// Validated parameters of one allocation run.
///
/// Both quotas and their sum are known to fit in `usize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationConfig {
    pub class_count: usize,
    top_quota: usize,
    bottom_quota: usize,
}

impl AllocationConfig {
    pub fn new(class_count: usize, top_n_per_class: usize, bottom_n_per_class: usize) -> Result<Self> {
        if class_count == 0 {
            return Err(AllocationError::InvalidConfig(
                "class count must be a positive integer".to_string(),
            ));
        }

        let too_large = || {
            AllocationError::InvalidConfig(format!(
                "tier sizes too large: {} top + {} bottom per class for {} classes",
                top_n_per_class, bottom_n_per_class, class_count
            ))
        };
        let top_quota = top_n_per_class.checked_mul(class_count).ok_or_else(too_large)?;
        let bottom_quota = bottom_n_per_class.checked_mul(class_count).ok_or_else(too_large)?;
        top_quota.checked_add(bottom_quota).ok_or_else(too_large)?;

        Ok(Self {
            class_count,
            top_quota,
            bottom_quota,
        })
    }

    pub fn top_quota(&self) -> usize {
        self.top_quota
    }

    pub fn bottom_quota(&self) -> usize {
        self.bottom_quota
    }

    /// Smallest roster that fills both the top and the bottom tier.
    pub fn required(&self) -> usize {
        self.top_quota + self.bottom_quota
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    Urban,
    Rural,
}

/// One validated roster row.
#[derive(Debug, Clone, PartialEq)]
pub struct Student {
    pub name: String,
    pub gender: Gender,
    pub score: f64,
    pub origin: Option<Origin>,
    /// Position in the input file, used as the tie-break between equal scores
    pub input_index: usize,
    /// Values of the pass-through columns, aligned with `Roster::extra_columns`
    pub extra: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedStudent {
    pub student: Student,
    pub grade_rank: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    pub class_id: u32,
    pub grade_rank: u32,
    pub student: Student,
}

#[derive(Debug, Clone)]
pub struct Roster {
    pub students: Vec<Student>,
    pub has_origin: bool,
    pub extra_columns: Vec<String>,
}

/// Parse a score cell, accepting a decimal comma. Non-finite values are rejected.
pub fn parse_score(value: &str) -> Option<f64> {
    value
        .trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
}
