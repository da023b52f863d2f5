use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use csv::Writer;
use tracing::info;

use crate::allocator::Allocation;
use crate::error::{AllocationError, Result};
use crate::models::{ColumnNames, Gender, Labels, Origin, Placement, SummaryLabels};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// The fields of one student the statistics look at.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub class_label: String,
    pub gender: Option<Gender>,
    pub score: Option<f64>,
    pub origin: Option<Origin>,
}

impl From<&Placement> for ReportRow {
    fn from(placement: &Placement) -> Self {
        Self {
            class_label: placement.class_id.to_string(),
            gender: Some(placement.student.gender),
            score: Some(placement.student.score),
            origin: placement.student.origin,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassStats {
    pub label: String,
    pub headcount: usize,
    pub mean_score: Option<f64>,
    pub male: usize,
    pub female: usize,
    pub urban: Option<usize>,
    pub rural: Option<usize>,
}

/// Column means over all classes.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageRow {
    pub headcount: f64,
    pub mean_score: Option<f64>,
    pub male: f64,
    pub female: f64,
    pub urban: Option<f64>,
    pub rural: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ClassSummary {
    pub classes: Vec<ClassStats>,
    pub average: Option<AverageRow>,
    pub has_score: bool,
    pub has_origin: bool,
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Numeric labels in numeric order first, anything else after them alphabetically.
fn class_order(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => std::cmp::Ordering::Less,
        (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

impl ClassSummary {
    /// Per-class statistics. Score and origin statistics are only produced when
    /// the corresponding column exists.
    pub fn build(rows: &[ReportRow], has_score: bool, has_origin: bool) -> Self {
        Self::summarize(rows, &[], has_score, has_origin)
    }

    /// Like [`ClassSummary::build`], but every label in `expected` gets a row
    /// even when no student carries it.
    fn summarize(rows: &[ReportRow], expected: &[String], has_score: bool, has_origin: bool) -> Self {
        let mut by_class: HashMap<&str, Vec<&ReportRow>> = HashMap::new();
        for label in expected {
            by_class.entry(label.as_str()).or_default();
        }
        for row in rows {
            by_class.entry(row.class_label.as_str()).or_default().push(row);
        }

        let mut labels: Vec<&str> = by_class.keys().copied().collect();
        labels.sort_by(|a, b| class_order(a, b));

        let classes: Vec<ClassStats> = labels
            .into_iter()
            .map(|label| {
                let members = &by_class[label];
                let count_origin =
                    |origin: Origin| members.iter().filter(|r| r.origin == Some(origin)).count();

                ClassStats {
                    label: label.to_string(),
                    headcount: members.len(),
                    mean_score: if has_score {
                        mean(members.iter().filter_map(|r| r.score))
                    } else {
                        None
                    },
                    male: members.iter().filter(|r| r.gender == Some(Gender::Male)).count(),
                    female: members.iter().filter(|r| r.gender == Some(Gender::Female)).count(),
                    urban: has_origin.then(|| count_origin(Origin::Urban)),
                    rural: has_origin.then(|| count_origin(Origin::Rural)),
                }
            })
            .collect();

        let average = (!classes.is_empty()).then(|| AverageRow {
            headcount: mean(classes.iter().map(|c| c.headcount as f64)).unwrap_or_default(),
            mean_score: mean(classes.iter().filter_map(|c| c.mean_score)),
            male: mean(classes.iter().map(|c| c.male as f64)).unwrap_or_default(),
            female: mean(classes.iter().map(|c| c.female as f64)).unwrap_or_default(),
            urban: mean(classes.iter().filter_map(|c| c.urban.map(|n| n as f64))),
            rural: mean(classes.iter().filter_map(|c| c.rural.map(|n| n as f64))),
        });

        Self {
            classes,
            average,
            has_score,
            has_origin,
        }
    }

    pub fn from_allocation(allocation: &Allocation) -> Self {
        let rows: Vec<ReportRow> = allocation.placements.iter().map(ReportRow::from).collect();
        let classes: Vec<String> = (1..=allocation.class_count).map(|id| id.to_string()).collect();
        Self::summarize(&rows, &classes, true, allocation.has_origin)
    }

    /// Gap between the best and the worst class mean score.
    pub fn mean_score_spread(&self) -> Option<f64> {
        let means: Vec<f64> = self.classes.iter().filter_map(|c| c.mean_score).collect();
        let max = means.iter().copied().reduce(f64::max)?;
        let min = means.iter().copied().reduce(f64::min)?;
        Some(max - min)
    }

    pub fn headers<'a>(&self, labels: &'a SummaryLabels) -> Vec<&'a str> {
        let mut headers = vec![labels.class.as_str(), labels.headcount.as_str()];
        if self.has_score {
            headers.push(labels.mean_score.as_str());
        }
        headers.extend([labels.male.as_str(), labels.female.as_str()]);
        if self.has_origin {
            headers.extend([labels.urban.as_str(), labels.rural.as_str()]);
        }
        headers
    }

    /// Table body with the average row last; `precision` applies to fractional values.
    pub fn rows(&self, precision: usize, labels: &SummaryLabels) -> Vec<Vec<String>> {
        let fmt = |value: f64| format!("{:.*}", precision, value);
        let mut rows = Vec::with_capacity(self.classes.len() + 1);

        for class in &self.classes {
            let mut row = vec![class.label.clone(), class.headcount.to_string()];
            if self.has_score {
                row.push(class.mean_score.map(fmt).unwrap_or_default());
            }
            row.push(class.male.to_string());
            row.push(class.female.to_string());
            if self.has_origin {
                row.push(class.urban.unwrap_or_default().to_string());
                row.push(class.rural.unwrap_or_default().to_string());
            }
            rows.push(row);
        }

        if let Some(average) = &self.average {
            let mut row = vec![labels.average.clone(), fmt(average.headcount)];
            if self.has_score {
                row.push(average.mean_score.map(fmt).unwrap_or_default());
            }
            row.push(fmt(average.male));
            row.push(fmt(average.female));
            if self.has_origin {
                row.push(average.urban.map(fmt).unwrap_or_default());
                row.push(average.rural.map(fmt).unwrap_or_default());
            }
            rows.push(row);
        }

        rows
    }

    /// Aligned plain-text table for the console.
    pub fn render(&self, labels: &SummaryLabels) -> String {
        let headers = self.headers(labels);
        let rows = self.rows(1, labels);

        let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
        for row in &rows {
            for (width, value) in widths.iter_mut().zip(row) {
                *width = (*width).max(value.chars().count());
            }
        }

        let mut content = String::new();
        let line = |cells: Vec<&str>| -> String {
            cells
                .iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{:>width$}", cell, width = *width))
                .collect::<Vec<_>>()
                .join("  ")
        };

        content.push_str(&line(headers.clone()));
        content.push('\n');
        for row in &rows {
            content.push_str(&line(row.iter().map(String::as_str).collect()));
            content.push('\n');
        }
        content
    }
}

pub fn print_summary(title: &str, summary: &ClassSummary, labels: &SummaryLabels) {
    println!("\n{}", "=".repeat(50));
    println!(" 📊 {}", title);
    println!("{}", "=".repeat(50));
    print!("{}", summary.render(labels));
    println!("{}", "=".repeat(50));
}

// Windows reports a file held open by another program as a sharing or
// lock violation rather than as a permission error
#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Whether a write failure means the target is held by someone else.
fn is_locked(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }

    #[cfg(windows)]
    if matches!(err.raw_os_error(), Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)) {
        return true;
    }

    false
}

/// Map a write failure on `path`; a locked or read-only target becomes
/// `ExportLocked` so the caller can retry elsewhere.
pub fn classify_write_error(path: &Path, err: io::Error) -> AllocationError {
    if is_locked(&err) {
        AllocationError::ExportLocked(path.to_path_buf())
    } else {
        AllocationError::Io(err)
    }
}

fn csv_write_error(path: &Path, err: csv::Error) -> AllocationError {
    match err.into_kind() {
        csv::ErrorKind::Io(io_err) => classify_write_error(path, io_err),
        other => AllocationError::CsvParseError(format!("{:?}", other)),
    }
}

/// Open `path` for a spreadsheet-friendly CSV export (UTF-8 with BOM).
fn create_export(path: &Path) -> Result<Writer<File>> {
    let mut file = File::create(path).map_err(|e| classify_write_error(path, e))?;
    file.write_all(UTF8_BOM).map_err(|e| classify_write_error(path, e))?;
    Ok(Writer::from_writer(file))
}

fn write_rows<I>(path: &Path, header: Vec<String>, rows: I) -> Result<()>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut writer = create_export(path)?;
    writer.write_record(&header).map_err(|e| csv_write_error(path, e))?;
    for row in rows {
        writer.write_record(&row).map_err(|e| csv_write_error(path, e))?;
    }
    writer.flush().map_err(|e| classify_write_error(path, e))?;
    Ok(())
}

/// Detailed roster: class and grade rank first, then the student fields and
/// every pass-through column, in allocation order.
pub fn export_roster(
    allocation: &Allocation,
    columns: &ColumnNames,
    labels: &Labels,
    path: &Path,
) -> Result<()> {
    let mut header = vec![
        columns.class.clone(),
        columns.rank.clone(),
        columns.name.clone(),
        columns.gender.clone(),
        columns.score.clone(),
    ];
    if allocation.has_origin {
        header.push(columns.origin.clone());
    }
    header.extend(allocation.extra_columns.iter().cloned());

    let rows = allocation.placements.iter().map(|placement| {
        let student = &placement.student;
        let mut row = vec![
            placement.class_id.to_string(),
            placement.grade_rank.to_string(),
            student.name.clone(),
            labels.gender_label(student.gender).to_string(),
            student.score.to_string(),
        ];
        if allocation.has_origin {
            row.push(
                student
                    .origin
                    .map(|origin| labels.origin_label(origin).to_string())
                    .unwrap_or_default(),
            );
        }
        row.extend(student.extra.iter().cloned());
        row
    });

    write_rows(path, header, rows)?;
    info!(path = %path.display(), rows = allocation.placements.len(), "roster exported");
    Ok(())
}

pub fn export_summary(summary: &ClassSummary, labels: &SummaryLabels, path: &Path) -> Result<()> {
    let header = summary.headers(labels).into_iter().map(String::from).collect();
    write_rows(path, header, summary.rows(2, labels))?;
    info!(path = %path.display(), classes = summary.classes.len(), "summary exported");
    Ok(())
}
