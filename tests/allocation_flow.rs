use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use sunshine_classes::models::{AllocationConfig, Config};
use sunshine_classes::pipeline::{self, ExportPaths};
use sunshine_classes::snake::ShuffledClasses;
use sunshine_classes::AllocationError;
use tempfile::TempDir;

struct Row {
    name: String,
    gender: &'static str,
    score: String,
    origin: Option<&'static str>,
}

fn write_roster(dir: &TempDir, file_name: &str, rows: &[Row]) -> PathBuf {
    let with_origin = rows.iter().any(|r| r.origin.is_some());
    let mut content = String::from("学号,姓名,性别,总分");
    if with_origin {
        content.push_str(",城乡");
    }
    content.push('\n');

    for (i, row) in rows.iter().enumerate() {
        content.push_str(&format!("S{:03},{},{},{}", i, row.name, row.gender, row.score));
        if let Some(origin) = row.origin {
            content.push_str(&format!(",{}", origin));
        }
        content.push('\n');
    }

    let path = dir.path().join(file_name);
    fs::write(&path, content).unwrap();
    path
}

fn alternating_roster(size: usize, with_origin: bool) -> Vec<Row> {
    (0..size)
        .map(|i| Row {
            name: format!("学生{}", i),
            gender: if i % 2 == 0 { "男" } else { "女" },
            score: format!("{}", 700 - i * 3),
            origin: with_origin.then_some(if i % 3 == 0 { "乡下" } else { "城区" }),
        })
        .collect()
}

/// Header plus records of an exported CSV, BOM removed.
fn read_export(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let text = fs::read_to_string(path).unwrap();
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::Reader::from_reader(text.as_bytes());

    let headers = reader.headers().unwrap().iter().map(String::from).collect();
    let records = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (headers, records)
}

#[test]
fn forty_students_split_evenly_into_two_classes() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(&dir, "grade.csv", &alternating_roster(40, false));
    let config = Config::default();

    let run = pipeline::allocate_file(
        &input,
        &config,
        AllocationConfig::new(2, 10, 10).unwrap(),
        ShuffledClasses::from_entropy(),
    )
    .unwrap();

    let paths = ExportPaths::for_input(&input, None);
    pipeline::export_run(&run, &config, &paths).unwrap();

    let (headers, records) = read_export(&paths.roster);
    assert_eq!(&headers[..5], &["班级", "年级排名", "姓名", "性别", "总分"]);
    assert_eq!(headers[5], "学号");
    assert_eq!(records.len(), 40);

    let mut per_class: HashMap<String, (usize, usize)> = HashMap::new();
    for record in &records {
        let entry = per_class.entry(record[0].clone()).or_default();
        entry.0 += 1;
        if record[3] == "男" {
            entry.1 += 1;
        }
    }
    assert_eq!(per_class.len(), 2);
    assert_eq!(per_class["1"], (20, 10));
    assert_eq!(per_class["2"], (20, 10));

    // Best student keeps rank 1 wherever they landed
    let best = records.iter().find(|r| r[2] == "学生0").unwrap();
    assert_eq!(best[1], "1");

    let (summary_headers, summary_rows) = read_export(&paths.summary);
    assert_eq!(summary_headers, vec!["班级", "总人数", "平均分", "男生", "女生"]);
    assert_eq!(summary_rows.len(), 3);
    assert_eq!(summary_rows[2][0], "平均");
    assert_eq!(summary_rows[2][1], "20.00");
}

#[test]
fn non_numeric_score_row_is_dropped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let mut rows = alternating_roster(40, false);
    rows.push(Row {
        name: "缺考".to_string(),
        gender: "女",
        score: "N/A".to_string(),
        origin: None,
    });
    let input = write_roster(&dir, "grade.csv", &rows);

    let run = pipeline::allocate_file(
        &input,
        &Config::default(),
        AllocationConfig::new(2, 10, 10).unwrap(),
        ShuffledClasses::from_seed(1),
    )
    .unwrap();

    assert_eq!(run.load_report.total_rows, 41);
    assert_eq!(run.load_report.dropped_invalid_score, 1);
    assert_eq!(run.allocation.placements.len(), 40);
    assert!(run.allocation.placements.iter().all(|p| p.student.name != "缺考"));
}

#[test]
fn undersized_roster_aborts_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(&dir, "small.csv", &alternating_roster(15, false));
    let paths = ExportPaths::for_input(&input, None);

    let err = pipeline::allocate_file(
        &input,
        &Config::default(),
        AllocationConfig::new(2, 10, 10).unwrap(),
        ShuffledClasses::from_seed(1),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        AllocationError::InsufficientData {
            required: 40,
            available: 15
        }
    ));
    assert!(!paths.roster.exists());
    assert!(!paths.summary.exists());
}

#[test]
fn origin_column_enables_origin_counts() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(&dir, "grade.csv", &alternating_roster(120, true));

    let run = pipeline::allocate_file(
        &input,
        &Config::default(),
        AllocationConfig::new(3, 10, 10).unwrap(),
        ShuffledClasses::from_seed(99),
    )
    .unwrap();

    assert!(run.allocation.has_origin);
    assert_eq!(run.summary.classes.len(), 3);
    for class in &run.summary.classes {
        let urban = class.urban.unwrap();
        let rural = class.rural.unwrap();
        assert_eq!(urban + rural, class.headcount);
        assert_eq!(class.male + class.female, class.headcount);
    }
    assert!(run.summary.headers(&Config::default().summary).contains(&"城区"));
}

#[test]
fn same_seed_reproduces_the_allocation() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(&dir, "grade.csv", &alternating_roster(90, true));
    let config = Config::default();
    let allocation_config = AllocationConfig::new(4, 5, 5).unwrap();

    let first = pipeline::allocate_file(&input, &config, allocation_config, ShuffledClasses::from_seed(7)).unwrap();
    let second = pipeline::allocate_file(&input, &config, allocation_config, ShuffledClasses::from_seed(7)).unwrap();

    assert_eq!(first.allocation.placements, second.allocation.placements);
}

#[test]
fn missing_columns_are_named() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("bad.csv");
    fs::write(&input, "姓名,成绩\n张三,600\n").unwrap();

    let err = pipeline::allocate_file(
        &input,
        &Config::default(),
        AllocationConfig::new(1, 0, 0).unwrap(),
        ShuffledClasses::from_seed(1),
    )
    .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("性别"), "{message}");
    assert!(message.contains("总分"), "{message}");
}

#[test]
fn balance_check_reads_exported_roster() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(&dir, "grade.csv", &alternating_roster(60, true));
    let config = Config::default();

    let run = pipeline::allocate_file(
        &input,
        &config,
        AllocationConfig::new(3, 5, 5).unwrap(),
        ShuffledClasses::from_seed(5),
    )
    .unwrap();
    let paths = ExportPaths::for_input(&input, None);
    pipeline::export_run(&run, &config, &paths).unwrap();

    let check = pipeline::balance_check(&paths.roster, &config).unwrap();

    assert_eq!(check.unlabeled_rows, 0);
    assert_eq!(check.summary.classes, run.summary.classes);
}

#[test]
fn balance_check_without_score_column() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("classes.csv");
    fs::write(&input, "班级,姓名,性别\n1,甲,男\n1,乙,女\n2,丙,女\n").unwrap();

    let check = pipeline::balance_check(&input, &Config::default()).unwrap();
    let report_path = pipeline::balance_report_path(&input, None);
    sunshine_classes::report::export_summary(&check.summary, &Config::default().summary, &report_path).unwrap();

    let (headers, rows) = read_export(&report_path);
    assert_eq!(headers, vec!["班级", "总人数", "男生", "女生"]);
    assert_eq!(rows[0], vec!["1", "2", "1", "1"]);
    assert_eq!(rows[1], vec!["2", "1", "0", "1"]);
    assert_eq!(rows[2], vec!["平均", "1.50", "0.50", "1.00"]);
}

#[test]
fn summary_labels_follow_config() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(&dir, "grade.csv", &alternating_roster(20, false));
    let mut config = Config::default();
    config.summary.class = "Class".to_string();
    config.summary.average = "Average".to_string();

    let run = pipeline::allocate_file(
        &input,
        &config,
        AllocationConfig::new(2, 5, 5).unwrap(),
        ShuffledClasses::from_seed(3),
    )
    .unwrap();
    let paths = ExportPaths::for_input(&input, None);
    pipeline::export_run(&run, &config, &paths).unwrap();

    let (headers, rows) = read_export(&paths.summary);
    assert_eq!(headers[0], "Class");
    assert_eq!(headers[1], "总人数");
    assert_eq!(rows.last().unwrap()[0], "Average");
}

#[cfg(unix)]
#[test]
fn read_only_export_target_is_reported_as_locked() {
    use std::fs::OpenOptions;
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let input = write_roster(&dir, "grade.csv", &alternating_roster(40, false));
    let config = Config::default();
    let run = pipeline::allocate_file(
        &input,
        &config,
        AllocationConfig::new(2, 10, 10).unwrap(),
        ShuffledClasses::from_seed(4),
    )
    .unwrap();

    let paths = ExportPaths::for_input(&input, None);
    fs::write(&paths.roster, "").unwrap();
    fs::set_permissions(&paths.roster, fs::Permissions::from_mode(0o444)).unwrap();

    // Privileged users write through file modes; nothing to check then
    if OpenOptions::new().write(true).open(&paths.roster).is_ok() {
        return;
    }

    let err = pipeline::export_run(&run, &config, &paths).unwrap_err();
    assert!(matches!(&err, AllocationError::ExportLocked(p) if *p == paths.roster), "{err}");

    // The finished run can still be written somewhere else
    let elsewhere = tempfile::tempdir().unwrap();
    let retry = ExportPaths::for_input(&input, Some(elsewhere.path()));
    pipeline::export_run(&run, &config, &retry).unwrap();
    assert!(retry.roster.exists());
    assert!(retry.summary.exists());
}
