use std::path::Path;
use std::process::{exit, Command, ExitStatus};

use clap::{Parser, Subcommand, ValueEnum};

// ── CLI definition ─────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "xtask",
    about = "Task runner for the ride dispatch workspace",
    long_about = "A unified CLI for running the dispatch demo, load tests,\n\
                  benchmarks, and CI checks in the ride dispatch workspace."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the threaded dispatch demo
    Run {
        /// Log filter passed through as RUST_LOG
        #[arg(long, env = "RUST_LOG", default_value = "warn")]
        log: String,
    },
    /// Run the test suite for dispatch_core
    Test,
    /// Run Criterion benchmarks
    Bench,
    /// Compare benchmarks: stash changes, create baseline, restore, compare
    BenchCompare,
    /// Run CI checks (fmt, clippy, tests, examples, benchmarks)
    Ci {
        /// Job to run
        #[arg(value_enum, default_value_t = CiJob::Check)]
        job: CiJob,
    },
    /// Run load tests (ignored tests in dispatch_core)
    LoadTest,
}

#[derive(Clone, ValueEnum)]
enum CiJob {
    /// Formatting, clippy, and tests
    Check,
    /// Build and run the demo
    Examples,
    /// Run benchmarks
    Bench,
    /// Run check + examples + bench
    All,
}

// ── helpers ────────────────────────────────────────────────────────

fn step(label: &str) {
    eprintln!("\n=== {label} ===");
}

fn command_status(program: &str, args: &[&str], envs: &[(&str, &str)]) -> ExitStatus {
    eprintln!("+ {program} {}", args.join(" "));
    match Command::new(program)
        .args(args)
        .envs(envs.iter().copied())
        .status()
    {
        Ok(status) => status,
        Err(err) => {
            eprintln!("failed to execute {program}: {err}");
            exit(1);
        }
    }
}

fn run_cargo(args: &[&str]) {
    run_cargo_with_env(args, &[]);
}

fn run_cargo_with_env(args: &[&str], envs: &[(&str, &str)]) {
    let status = command_status("cargo", args, envs);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

fn run_git(args: &[&str]) {
    let status = command_status("git", args, &[]);
    if !status.success() {
        exit(status.code().unwrap_or(1));
    }
}

const BENCH_ARGS: [&str; 5] = ["bench", "--package", "dispatch_core", "--bench", "performance"];

fn bench_with(extra: &[&str]) {
    let mut args = BENCH_ARGS.to_vec();
    if !extra.is_empty() {
        args.push("--");
        args.extend_from_slice(extra);
    }
    run_cargo(&args);
}

// ── CI jobs ────────────────────────────────────────────────────────

fn ci_check() {
    step("Check formatting");
    run_cargo(&["fmt", "--all", "--", "--check"]);

    step("Clippy");
    run_cargo(&[
        "clippy",
        "--all-targets",
        "--all-features",
        "--",
        "-D",
        "warnings",
    ]);

    step("Test dispatch_core");
    run_cargo(&["test", "-p", "dispatch_core"]);
}

fn ci_examples() {
    step("Run dispatch_run (100 drivers, 500 riders, 4 threads)");
    run_cargo(&[
        "run",
        "-p",
        "dispatch_core",
        "--example",
        "dispatch_run",
        "--release",
    ]);
}

fn ci_bench() {
    step("Run benchmarks");
    bench_with(&[]);
}

// ── main ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { log } => {
            run_cargo_with_env(
                &[
                    "run",
                    "-p",
                    "dispatch_core",
                    "--example",
                    "dispatch_run",
                    "--release",
                ],
                &[("RUST_LOG", log.as_str())],
            );
        }
        Commands::Test => {
            run_cargo(&["test", "-p", "dispatch_core"]);
        }
        Commands::Bench => bench_with(&[]),
        Commands::BenchCompare => {
            let baseline_dir = Path::new("target/criterion");
            if baseline_dir.exists() {
                step("Removing existing benchmark data");
                if let Err(err) = std::fs::remove_dir_all(baseline_dir) {
                    eprintln!("failed to remove target/criterion: {err}");
                    exit(1);
                }
            }

            step("Stashing current changes");
            run_git(&[
                "stash",
                "push",
                "-m",
                "Temporary stash for benchmark comparison",
            ]);

            step("Running benchmark to create baseline");
            bench_with(&["--save-baseline", "main"]);

            step("Reapplying changes");
            run_git(&["stash", "pop"]);

            step("Running benchmark comparing against baseline");
            bench_with(&["--baseline", "main"]);

            eprintln!("\nDone! Check the output above to see performance comparison.");
        }
        Commands::Ci { job } => {
            match job {
                CiJob::Check => ci_check(),
                CiJob::Examples => ci_examples(),
                CiJob::Bench => ci_bench(),
                CiJob::All => {
                    ci_check();
                    ci_examples();
                    ci_bench();
                }
            }
            eprintln!("\nCI job passed.");
        }
        Commands::LoadTest => {
            run_cargo(&[
                "test",
                "-p",
                "dispatch_core",
                "--test",
                "load_tests",
                "--release",
                "--",
                "--ignored",
                "--nocapture",
            ]);
        }
    }
}
