use std::fs::File;
use std::path::Path;

use calamine::{open_workbook_auto, Reader};
use csv::ReaderBuilder;
use tracing::{debug, info, warn};

use crate::error::{AllocationError, Result};
use crate::models::{parse_score, ColumnNames, Labels, Roster, Student};
use crate::report::ReportRow;

/// Header row plus data rows, every cell as trimmed text.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    fn missing_columns(&self, required: &[&str]) -> Vec<String> {
        required
            .iter()
            .filter(|column| self.column_index(column).is_none())
            .map(|column| column.to_string())
            .collect()
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Counts gathered while cleaning the input rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub dropped_invalid_score: usize,
    pub dropped_unrecognized: usize,
}

/// Read a CSV or spreadsheet file into a [`RawTable`], choosing the parser by extension.
pub fn read_table(path: &Path) -> Result<RawTable> {
    if !path.exists() {
        return Err(AllocationError::FileNotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xls" | "xlsm" | "ods" => read_spreadsheet(path),
        _ => Err(AllocationError::UnsupportedFormat(ext)),
    }
}

fn read_csv(path: &Path) -> Result<RawTable> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row: Vec<String> = record.iter().map(|value| value.trim().to_string()).collect();

        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

fn read_spreadsheet(path: &Path) -> Result<RawTable> {
    let mut workbook = open_workbook_auto(path)?;

    // Only the first sheet holds the roster
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| AllocationError::ExcelParseError("workbook has no sheets".to_string()))?;
    let range = workbook.worksheet_range(&sheet_name)?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .ok_or_else(|| AllocationError::ExcelParseError(format!("sheet '{}' is empty", sheet_name)))?
        .iter()
        .map(|cell| cell.to_string().trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for data_row in rows_iter {
        let row: Vec<String> = data_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect();

        if row.iter().all(|v| v.is_empty()) {
            continue;
        }
        rows.push(row);
    }

    debug!(sheet = %sheet_name, rows = rows.len(), "spreadsheet read");
    Ok(RawTable { headers, rows })
}

pub struct RosterLoader<'a> {
    columns: &'a ColumnNames,
    labels: &'a Labels,
}

impl<'a> RosterLoader<'a> {
    pub fn new(columns: &'a ColumnNames, labels: &'a Labels) -> Self {
        Self { columns, labels }
    }

    pub fn load(&self, path: &Path) -> Result<(Roster, LoadReport)> {
        let table = read_table(path)?;
        self.build_roster(table)
    }

    /// Validate the schema and turn raw rows into students.
    ///
    /// Existing class and rank columns are discarded. Rows whose score is not a
    /// number, or whose gender/origin literal is not recognized, are dropped and
    /// counted in the returned [`LoadReport`].
    pub fn build_roster(&self, table: RawTable) -> Result<(Roster, LoadReport)> {
        let columns = self.columns;
        let has_origin = table.column_index(&columns.origin).is_some();

        let missing = table.missing_columns(&[
            columns.name.as_str(),
            columns.gender.as_str(),
            columns.score.as_str(),
        ]);
        if !missing.is_empty() {
            return Err(AllocationError::SchemaError { missing });
        }

        // Checked above
        let name_idx = table.column_index(&columns.name).unwrap_or_default();
        let gender_idx = table.column_index(&columns.gender).unwrap_or_default();
        let score_idx = table.column_index(&columns.score).unwrap_or_default();
        let origin_idx = table.column_index(&columns.origin);

        let known = [
            &columns.name,
            &columns.gender,
            &columns.score,
            &columns.origin,
            &columns.class,
            &columns.rank,
        ];
        let extra_indices: Vec<usize> = table
            .headers
            .iter()
            .enumerate()
            .filter(|(_, header)| !header.is_empty() && !known.contains(header))
            .map(|(idx, _)| idx)
            .collect();
        let extra_columns: Vec<String> = extra_indices
            .iter()
            .map(|&idx| table.headers[idx].clone())
            .collect();

        let mut report = LoadReport {
            total_rows: table.rows.len(),
            ..LoadReport::default()
        };
        let mut students = Vec::with_capacity(table.rows.len());

        for (row_idx, row) in table.rows.iter().enumerate() {
            // +2: 1-based, header row skipped
            let row_number = row_idx + 2;

            let Some(score) = parse_score(cell(row, score_idx)) else {
                warn!(row = row_number, value = cell(row, score_idx), "dropping row with invalid score");
                report.dropped_invalid_score += 1;
                continue;
            };

            let Some(gender) = self.labels.parse_gender(cell(row, gender_idx)) else {
                warn!(row = row_number, value = cell(row, gender_idx), "dropping row with unrecognized gender");
                report.dropped_unrecognized += 1;
                continue;
            };

            let origin = match origin_idx {
                Some(idx) => match self.labels.parse_origin(cell(row, idx)) {
                    Some(origin) => Some(origin),
                    None => {
                        warn!(row = row_number, value = cell(row, idx), "dropping row with unrecognized origin");
                        report.dropped_unrecognized += 1;
                        continue;
                    }
                },
                None => None,
            };

            students.push(Student {
                name: cell(row, name_idx).to_string(),
                gender,
                score,
                origin,
                input_index: row_idx,
                extra: extra_indices.iter().map(|&idx| cell(row, idx).to_string()).collect(),
            });
        }

        report.valid_rows = students.len();
        info!(
            total = report.total_rows,
            valid = report.valid_rows,
            has_origin,
            "roster loaded"
        );

        Ok((
            Roster {
                students,
                has_origin,
                extra_columns,
            },
            report,
        ))
    }
}

/// An already allocated sheet, read for the balance check.
#[derive(Debug, Clone)]
pub struct AllocatedTable {
    pub rows: Vec<ReportRow>,
    pub has_score: bool,
    pub has_origin: bool,
    /// Rows without a class label, left out of the statistics
    pub unlabeled_rows: usize,
}

/// Load a file that already carries class labels. Class and gender columns are
/// required; score and origin are used when present.
pub fn load_allocated(path: &Path, columns: &ColumnNames, labels: &Labels) -> Result<AllocatedTable> {
    let table = read_table(path)?;

    let missing = table.missing_columns(&[columns.class.as_str(), columns.gender.as_str()]);
    if !missing.is_empty() {
        return Err(AllocationError::SchemaError { missing });
    }

    let class_idx = table.column_index(&columns.class).unwrap_or_default();
    let gender_idx = table.column_index(&columns.gender).unwrap_or_default();
    let score_idx = table.column_index(&columns.score);
    let origin_idx = table.column_index(&columns.origin);

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut unlabeled_rows = 0;

    for row in &table.rows {
        let class_label = cell(row, class_idx);
        if class_label.is_empty() {
            unlabeled_rows += 1;
            continue;
        }

        rows.push(ReportRow {
            class_label: class_label.to_string(),
            gender: labels.parse_gender(cell(row, gender_idx)),
            score: score_idx.and_then(|idx| parse_score(cell(row, idx))),
            origin: origin_idx.and_then(|idx| labels.parse_origin(cell(row, idx))),
        });
    }

    if unlabeled_rows > 0 {
        warn!(unlabeled_rows, "rows without a class label were skipped");
    }

    Ok(AllocatedTable {
        rows,
        has_score: score_idx.is_some(),
        has_origin: origin_idx.is_some(),
        unlabeled_rows,
    })
}
