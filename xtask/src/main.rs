use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "thread_slot workspace automation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark suite once per global allocator and write a report
    Bench {
        /// Short measurement windows, for CI
        #[arg(long, default_value_t = false)]
        quick: bool,

        /// Only rebuild the report from existing criterion output
        #[arg(long, default_value_t = false)]
        report_only: bool,

        /// Restrict the run to these allocators (system, mimalloc, snmalloc, jemalloc)
        #[arg(long, value_delimiter = ',')]
        only: Vec<String>,

        /// Where to write the markdown report
        #[arg(long, default_value = "benchmark_results/report.md")]
        out: PathBuf,
    },
}

const ALLOCATORS: &[&str] = &["system", "mimalloc", "snmalloc", "jemalloc"];

/// workload -> allocator -> operations per second
type Results = BTreeMap<String, BTreeMap<String, f64>>;

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Bench {
            quick,
            report_only,
            only,
            out,
        } => {
            let allocators = select_allocators(&only)?;
            if !report_only {
                run_benchmarks(&allocators, quick)?;
            }
            let results = collect_results(Path::new("target/criterion"))?;
            write_report(&results, &allocators, &out)?;
        }
    }

    Ok(())
}

fn select_allocators(only: &[String]) -> Result<Vec<&'static str>> {
    if only.is_empty() {
        return Ok(ALLOCATORS.to_vec());
    }
    only.iter()
        .map(|name| {
            ALLOCATORS
                .iter()
                .copied()
                .find(|a| *a == name.as_str())
                .with_context(|| format!("unknown allocator `{name}`"))
        })
        .collect()
}

fn run_benchmarks(allocators: &[&str], quick: bool) -> Result<()> {
    println!("Compiling benchmark suite...");
    let status = Command::new("cargo")
        .args(["build", "--bench", "suite", "--release"])
        .status()
        .context("failed to spawn cargo")?;
    if !status.success() {
        bail!("failed to compile the benchmark suite");
    }

    for &alloc in allocators {
        println!("\n>>> Benchmarking with the {alloc} allocator");
        let start = Instant::now();

        let mut cmd = Command::new("cargo");
        cmd.args(["bench", "--bench", "suite", "--no-default-features"])
            .arg("--features")
            .arg(format!("alloc-{alloc}"))
            .arg("--")
            .args(["--save-baseline", alloc]);

        if quick {
            cmd.args(["--measurement-time", "0.1", "--sample-size", "10", "--noplot"]);
        }

        let status = cmd
            .status()
            .with_context(|| format!("failed to run the suite for {alloc}"))?;
        if status.success() {
            println!("Finished {alloc} in {:.2?}", start.elapsed());
        } else {
            eprintln!("Warning: suite failed for {alloc}");
        }
    }

    Ok(())
}

/// Walks criterion's `<group>/<bench>/<baseline>/estimates.json` layout.
fn collect_results(root: &Path) -> Result<Results> {
    let mut results = Results::new();
    if !root.exists() {
        eprintln!("No criterion output found at {}", root.display());
        return Ok(results);
    }
    visit(root, &mut results)?;
    Ok(results)
}

fn visit(dir: &Path, results: &mut Results) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            visit(&path, results)?;
            continue;
        }
        if path.file_name().and_then(|s| s.to_str()) != Some("estimates.json") {
            continue;
        }

        let Some(baseline_dir) = path.parent() else { continue };
        let Some(bench_dir) = baseline_dir.parent() else { continue };
        let baseline = file_name(baseline_dir);
        let workload = file_name(bench_dir);
        if !ALLOCATORS.contains(&baseline.as_str()) || workload == "report" {
            continue;
        }

        let elements = read_json(&bench_dir.join("benchmark.json"))
            .ok()
            .and_then(|json| json.pointer("/throughput/Elements").and_then(|v| v.as_f64()))
            .unwrap_or(1.0);
        let mean_ns = read_json(&path)?
            .pointer("/mean/point_estimate")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or(0.0);
        if mean_ns > 0.0 {
            results
                .entry(workload)
                .or_default()
                .insert(baseline, elements * 1e9 / mean_ns);
        }
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn format_ops(ops: f64) -> String {
    if ops > 1_000_000.0 {
        format!("{:.2}M", ops / 1_000_000.0)
    } else if ops > 1_000.0 {
        format!("{:.2}K", ops / 1_000.0)
    } else {
        format!("{ops:.0}")
    }
}

fn write_report(results: &Results, allocators: &[&str], out: &Path) -> Result<()> {
    let mut report = String::from("# thread_slot Benchmark Report\n\n| Workload |");
    for alloc in allocators {
        write!(report, " {alloc} (ops/s) | vs system |")?;
    }
    report.push_str("\n|---|");
    for _ in allocators {
        report.push_str("---|---|");
    }
    report.push('\n');

    for (workload, by_alloc) in results {
        let system = by_alloc.get("system").copied().unwrap_or(0.0);
        write!(report, "| {workload} |")?;
        for alloc in allocators {
            match by_alloc.get(*alloc) {
                Some(ops) => {
                    let rel = if system > 0.0 { ops / system } else { 0.0 };
                    write!(report, " {} | **{rel:.2}x** |", format_ops(*ops))?;
                }
                None => report.push_str(" N/A | - |"),
            }
        }
        report.push('\n');
    }

    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(out, report).with_context(|| format!("writing {}", out.display()))?;
    println!("Report written to {}", out.display());
    Ok(())
}
