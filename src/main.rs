use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

use sunshine_classes::models::{AllocationConfig, Config};
use sunshine_classes::pipeline::{self, ExportPaths};
use sunshine_classes::report::print_summary;
use sunshine_classes::snake::ShuffledClasses;
use sunshine_classes::{logging, AllocationError};

fn main() -> Result<()> {
    logging::init();

    let matches = Command::new("sunshine-classes")
        .version("0.1")
        .about("Splits a student roster into classes balanced by score, gender and origin")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("sunshine.toml")
                .global(true),
        )
        .arg(
            Arg::new("init-config")
                .long("init-config")
                .help("Write the default configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("allocate")
                .about("Allocate a roster to classes (default when no subcommand is given)")
                .arg(input_arg())
                .arg(
                    Arg::new("classes")
                        .short('k')
                        .long("classes")
                        .value_name("K")
                        .help("Number of classes")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("top")
                        .long("top")
                        .value_name("N")
                        .help("Top-tier students per class")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("bottom")
                        .long("bottom")
                        .value_name("N")
                        .help("Bottom-tier students per class")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_name("SEED")
                        .help("Fix the class-order shuffle for a reproducible allocation")
                        .value_parser(value_parser!(u64)),
                )
                .arg(output_dir_arg()),
        )
        .subcommand(
            Command::new("report")
                .about("Check the balance of an already allocated sheet")
                .arg(input_arg())
                .arg(output_dir_arg()),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("sunshine.toml");

    if matches.get_flag("init-config") {
        Config::default().save_to_file(config_file)?;
        println!("📝 Default configuration written to: {}", config_file);
        return Ok(());
    }

    let config = load_config(config_file)?;

    match matches.subcommand() {
        Some(("report", sub)) => run_report(&config, sub),
        Some(("allocate", sub)) => run_allocate(&config, Some(sub)),
        _ => run_allocate(&config, None),
    }
}

fn input_arg() -> Arg {
    Arg::new("input")
        .short('i')
        .long("input")
        .value_name("FILE")
        .help("Roster file (.csv, .xlsx, .xls)")
}

fn output_dir_arg() -> Arg {
    Arg::new("output-dir")
        .short('o')
        .long("output-dir")
        .value_name("DIR")
        .help("Directory for the result files (defaults to the input's directory)")
}

fn load_config(config_file: &str) -> Result<Config> {
    if Path::new(config_file).exists() {
        println!("📋 Loading configuration from: {}", config_file);
        Config::load_from_file(config_file)
            .with_context(|| format!("Failed to read configuration: {}", config_file))
    } else {
        Ok(Config::default())
    }
}

fn run_allocate(config: &Config, args: Option<&ArgMatches>) -> Result<()> {
    println!("{}", "=".repeat(50));
    println!("      Sunshine balanced class allocation");
    println!("{}", "=".repeat(50));

    let input = resolve_input(args)?;

    let class_count = match args.and_then(|a| a.get_one::<usize>("classes").copied()).or(config.class_count) {
        Some(count) => count,
        None => prompt_class_count()?,
    };
    let top = args
        .and_then(|a| a.get_one::<usize>("top").copied())
        .unwrap_or(config.top_n_per_class);
    let bottom = args
        .and_then(|a| a.get_one::<usize>("bottom").copied())
        .unwrap_or(config.bottom_n_per_class);
    let seed = args.and_then(|a| a.get_one::<u64>("seed").copied()).or(config.seed);

    let allocation_config = AllocationConfig::new(class_count, top, bottom)?;

    println!("\n🔄 Computing the allocation for {} classes...", class_count);
    let run = pipeline::allocate_file(&input, config, allocation_config, ShuffledClasses::new(seed))?;

    let load = &run.load_report;
    println!("✅ Read {} rows, {} valid", load.total_rows, load.valid_rows);
    if load.dropped_invalid_score > 0 {
        println!("   ⚠️  Dropped {} rows with a non-numeric score", load.dropped_invalid_score);
    }
    if load.dropped_unrecognized > 0 {
        println!(
            "   ⚠️  Dropped {} rows with an unrecognized gender or origin value",
            load.dropped_unrecognized
        );
    }
    if run.allocation.has_origin {
        println!("ℹ️  '{}' column found: balancing by gender and origin", config.columns.origin);
    } else {
        println!("ℹ️  No '{}' column: balancing by gender only", config.columns.origin);
    }

    print_summary("Allocation summary", &run.summary, &config.summary);
    if let Some(spread) = run.summary.mean_score_spread() {
        println!("\n📈 Largest gap between class mean scores: {:.2}", spread);
    }

    let output_dir = output_dir(config, args);
    let paths = write_with_retry(
        ExportPaths::for_input(&input, output_dir.as_deref()),
        |dir| ExportPaths::for_input(&input, Some(dir)),
        |paths| pipeline::export_run(&run, config, paths),
    )?;

    println!("\n🎉 Done! Result files:");
    println!("   👉 {}", paths.roster.display());
    println!("   👉 {}", paths.summary.display());
    Ok(())
}

fn run_report(config: &Config, args: &ArgMatches) -> Result<()> {
    let input = resolve_input(Some(args))?;

    println!("🔄 Analyzing class balance...");
    let check = pipeline::balance_check(&input, config)?;
    if check.unlabeled_rows > 0 {
        println!("   ⚠️  Skipped {} rows without a class label", check.unlabeled_rows);
    }

    print_summary("Class balance report", &check.summary, &config.summary);

    let output_dir = output_dir(config, Some(args));
    let path = write_with_retry(
        pipeline::balance_report_path(&input, output_dir.as_deref()),
        |dir| pipeline::balance_report_path(&input, Some(dir)),
        |path| sunshine_classes::report::export_summary(&check.summary, &config.summary, path),
    )?;

    println!("\n✅ Report written:\n👉 {}", path.display());
    Ok(())
}

fn output_dir(config: &Config, args: Option<&ArgMatches>) -> Option<PathBuf> {
    args.and_then(|a| a.get_one::<String>("output-dir"))
        .or(config.output_directory.as_ref())
        .map(PathBuf::from)
}

fn resolve_input(args: Option<&ArgMatches>) -> Result<PathBuf> {
    match args.and_then(|a| a.get_one::<String>("input")) {
        Some(raw) => {
            let path = clean_path_input(raw);
            if !path.exists() {
                return Err(AllocationError::FileNotFound(path).into());
            }
            Ok(path)
        }
        None => prompt_existing_path(),
    }
}

/// Write through `write`; when the target is locked, ask for another
/// directory (or retry the same one) as long as a terminal is attached.
fn write_with_retry<T>(
    initial: T,
    relocate: impl Fn(&Path) -> T,
    mut write: impl FnMut(&T) -> sunshine_classes::Result<()>,
) -> Result<T> {
    let mut target = initial;

    loop {
        match write(&target) {
            Ok(()) => return Ok(target),
            Err(AllocationError::ExportLocked(path)) => {
                println!(
                    "\n❌ Could not save {}: close it if it is open in a spreadsheet program.",
                    path.display()
                );
                if !io::stdin().is_terminal() {
                    bail!("export target is locked: {}", path.display());
                }

                let answer = prompt_line("Enter another output directory, or press Enter to retry:")?;
                if !answer.is_empty() {
                    target = relocate(&clean_path_input(&answer));
                }
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Strip the quotes a dragged-in path arrives with.
fn clean_path_input(raw: &str) -> PathBuf {
    PathBuf::from(raw.trim().replace(['"', '\''], ""))
}

fn prompt_line(message: &str) -> Result<String> {
    println!("\n{}", message);
    print!("> ");
    io::stdout().flush()?;

    let mut line = String::new();
    if io::stdin().read_line(&mut line)? == 0 {
        bail!("input closed while waiting for an answer");
    }
    Ok(line.trim().to_string())
}

fn prompt_existing_path() -> Result<PathBuf> {
    loop {
        let answer = prompt_line("Enter the full path of the roster file (e.g. D:\\data\\students.xlsx):")?;
        let path = clean_path_input(&answer);

        if !answer.is_empty() && path.exists() {
            return Ok(path);
        }
        println!("❌ Path not found, please try again");
    }
}

fn prompt_class_count() -> Result<usize> {
    loop {
        let answer = prompt_line("Enter the number of classes (e.g. 16):")?;
        match answer.parse::<usize>() {
            Ok(count) if count > 0 => return Ok(count),
            _ => println!("⚠️  Please enter a positive whole number"),
        }
    }
}
