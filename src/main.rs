use clap::{Parser, Subcommand};
use classplan::conflicts::{self, NameDirectory};
use classplan::error::SolveError;
use classplan::loader::{self, JsonFileSource, RawSnapshot, SnapshotSource};
use classplan::server;
use classplan::solver;
use classplan::time;
use log::{error, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "classplan", about = "Weekly academic timetable generator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a timetable for one (semester, school year) period
    Generate {
        #[arg(long)]
        semester: String,
        #[arg(long)]
        school_year: String,
        /// Scheduling window start, HH:MM
        #[arg(long, default_value = "07:00")]
        from: String,
        /// Scheduling window end, HH:MM
        #[arg(long, default_value = "19:00")]
        to: String,
        /// Shuffle seed for domain diversification
        #[arg(long)]
        seed: Option<u64>,
        /// Abort search after this many nodes
        #[arg(long)]
        node_budget: Option<u64>,
        /// Snapshot JSON from the data source
        #[arg(long)]
        input: PathBuf,
        /// Where to write the schedule diff (stdout when omitted)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Scan committed sessions for double-bookings
    Conflicts {
        #[arg(long)]
        input: PathBuf,
    },
    /// Serve the engine over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Generate {
            semester,
            school_year,
            from,
            to,
            seed,
            node_budget,
            input,
            output,
        } => generate(
            semester,
            school_year,
            &from,
            &to,
            seed,
            node_budget,
            &input,
            output.as_deref(),
        ),
        Command::Conflicts { input } => conflicts_scan(&input),
        Command::Serve { bind } => {
            server::run_server(&bind).await;
            ExitCode::SUCCESS
        }
    }
}

fn read_snapshot(path: &Path) -> Result<RawSnapshot, SolveError> {
    JsonFileSource::new(path).load_snapshot()
}

fn exit_for(err: &SolveError) -> ExitCode {
    if err.is_infeasible() {
        ExitCode::from(2)
    } else if matches!(err, SolveError::InputInvalid(_)) {
        ExitCode::from(3)
    } else {
        ExitCode::FAILURE
    }
}

#[allow(clippy::too_many_arguments)]
fn generate(
    semester: String,
    school_year: String,
    from: &str,
    to: &str,
    seed: Option<u64>,
    node_budget: Option<u64>,
    input: &Path,
    output: Option<&Path>,
) -> ExitCode {
    let mut raw = match read_snapshot(input) {
        Ok(raw) => raw,
        Err(e) => {
            error!("{e}");
            return exit_for(&e);
        }
    };
    let (Some(start), Some(end)) = (time::parse_hhmm(from), time::parse_hhmm(to)) else {
        error!("invalid time window {from}..{to}");
        return ExitCode::from(3);
    };

    // flags override whatever the snapshot file carried
    raw.semester = Some(semester);
    raw.school_year = Some(school_year);
    raw.window_start = Some(start);
    raw.window_end = Some(end);
    if seed.is_some() {
        raw.config.seed = seed;
    }
    if node_budget.is_some() {
        raw.config.node_budget = node_budget;
    }

    let mut diagnostics = Vec::new();
    let result = solver::solve(&raw, &mut diagnostics);
    for diagnostic in &diagnostics {
        warn!("{diagnostic}");
    }
    match result {
        Ok(outcome) => {
            let rendered = serde_json::to_string_pretty(&outcome.diff)
                .expect("diff serialization cannot fail");
            match output {
                Some(path) => {
                    if let Err(e) = std::fs::write(path, rendered) {
                        error!("cannot write {}: {e}", path.display());
                        return ExitCode::FAILURE;
                    }
                }
                None => println!("{rendered}"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            exit_for(&e)
        }
    }
}

fn conflicts_scan(input: &Path) -> ExitCode {
    let raw = match read_snapshot(input) {
        Ok(raw) => raw,
        Err(e) => {
            error!("{e}");
            return exit_for(&e);
        }
    };
    let rows = match loader::committed_rows(&raw) {
        Ok(rows) => rows,
        Err(e) => {
            error!("{e}");
            return exit_for(&e);
        }
    };
    let names = NameDirectory::from_raw(&raw);
    let found = conflicts::detect(&rows, &names);
    println!(
        "{}",
        serde_json::to_string_pretty(&found).expect("conflict serialization cannot fail")
    );
    ExitCode::SUCCESS
}
