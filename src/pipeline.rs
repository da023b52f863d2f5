use std::path::{Path, PathBuf};

use tracing::info;

use crate::allocator::{Allocation, ClassAllocator};
use crate::error::Result;
use crate::loader::{load_allocated, LoadReport, RosterLoader};
use crate::models::{AllocationConfig, Config};
use crate::report::{export_roster, export_summary, ClassSummary};
use crate::snake::PermutationSource;

/// Where the two result sheets of an allocation are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPaths {
    pub roster: PathBuf,
    pub summary: PathBuf,
}

fn file_stem(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .unwrap_or_else(|| "roster".to_string())
}

fn target_dir(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    }
}

impl ExportPaths {
    /// `<stem>_allocation.csv` and `<stem>_allocation_summary.csv`, next to the
    /// input unless `output_dir` is given.
    pub fn for_input(input: &Path, output_dir: Option<&Path>) -> Self {
        let dir = target_dir(input, output_dir);
        let stem = file_stem(input);

        Self {
            roster: dir.join(format!("{}_allocation.csv", stem)),
            summary: dir.join(format!("{}_allocation_summary.csv", stem)),
        }
    }
}

/// `<stem>_report.csv` for the balance check.
pub fn balance_report_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    target_dir(input, output_dir).join(format!("{}_report.csv", file_stem(input)))
}

#[derive(Debug, Clone)]
pub struct AllocationRun {
    pub allocation: Allocation,
    pub summary: ClassSummary,
    pub load_report: LoadReport,
}

/// Load `input`, allocate it and build the class summary. Nothing is written.
pub fn allocate_file<P: PermutationSource>(
    input: &Path,
    config: &Config,
    allocation_config: AllocationConfig,
    source: P,
) -> Result<AllocationRun> {
    let (roster, load_report) = RosterLoader::new(&config.columns, &config.labels).load(input)?;

    let allocation = ClassAllocator::new(allocation_config, source).allocate(roster)?;
    let summary = ClassSummary::from_allocation(&allocation);

    Ok(AllocationRun {
        allocation,
        summary,
        load_report,
    })
}

/// Write both sheets of a finished run. May be retried with other paths.
pub fn export_run(run: &AllocationRun, config: &Config, paths: &ExportPaths) -> Result<()> {
    export_roster(&run.allocation, &config.columns, &config.labels, &paths.roster)?;
    export_summary(&run.summary, &config.summary, &paths.summary)?;
    info!(roster = %paths.roster.display(), summary = %paths.summary.display(), "allocation exported");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BalanceCheck {
    pub summary: ClassSummary,
    pub unlabeled_rows: usize,
}

/// Summarize a file that already has class labels.
pub fn balance_check(input: &Path, config: &Config) -> Result<BalanceCheck> {
    let table = load_allocated(input, &config.columns, &config.labels)?;
    let summary = ClassSummary::build(&table.rows, table.has_score, table.has_origin);

    Ok(BalanceCheck {
        summary,
        unlabeled_rows: table.unlabeled_rows,
    })
}
