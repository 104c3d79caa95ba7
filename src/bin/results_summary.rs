//! results_summary - verify and summarize a person_counter results log
//!
//! Checks that:
//! - The log parses as detection events (JSON array or JSON lines)
//! - Every run starts at frame_number 1
//! - Frame numbers within a run increase by exactly 1
//!
//! Then prints per-source totals. Exits non-zero if numbering is broken.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;

use person_counter::results::read_log;
use person_counter::DetectionEvent;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "results_summary",
    about = "Verify frame numbering and summarize a person_counter results log"
)]
struct Args {
    /// Results log to read
    #[arg(long, default_value = "results/detection_results.json")]
    results: PathBuf,

    /// Print every numbering problem instead of the first few
    #[arg(short, long)]
    verbose: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Default, Debug)]
struct SourceTotals {
    events: u64,
    runs: u64,
    person_sum: u64,
    max_persons: u32,
}

const SHOWN_PROBLEMS: usize = 5;

fn main() -> Result<()> {
    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::from_args(Some(&args.ui), is_tty, !stdout_is_tty);

    let events = {
        let _stage = ui.stage("Read results log");
        read_log(&args.results)?
    };

    println!("results_summary: {}", args.results.display());
    println!("events: {}", events.len());
    println!();

    let problems = {
        let mut stage = ui.stage("Verify frame numbering");
        let problems = numbering_problems(&events);
        if !problems.is_empty() {
            stage.fail(format!("{} problems", problems.len()));
        }
        problems
    };

    println!("=== Sources ===");
    for (source, totals) in summarize(&events) {
        let mean = totals.person_sum as f64 / totals.events.max(1) as f64;
        println!(
            "{}: {} events in {} runs, max {} persons, mean {:.2}",
            source, totals.events, totals.runs, totals.max_persons, mean
        );
    }

    if problems.is_empty() {
        println!();
        println!("frame numbering OK");
        return Ok(());
    }

    println!();
    println!("=== Numbering problems ===");
    let shown = if args.verbose {
        problems.len()
    } else {
        SHOWN_PROBLEMS
    };
    for problem in problems.iter().take(shown) {
        println!("  {}", problem);
    }
    if problems.len() > shown {
        println!("  ... {} more (use --verbose)", problems.len() - shown);
    }
    Err(anyhow!("{} frame numbering problems", problems.len()))
}

/// A run begins wherever frame_number is 1; inside a run each number is previous + 1.
fn numbering_problems(events: &[DetectionEvent]) -> Vec<String> {
    let mut problems = Vec::new();
    let mut previous: Option<u64> = None;
    for (i, event) in events.iter().enumerate() {
        match (previous, event.frame_number) {
            (_, 1) => {}
            (None, n) => problems.push(format!(
                "event {}: log starts at frame_number {} ({})",
                i + 1,
                n,
                event.source
            )),
            (Some(prev), n) if n != prev + 1 => problems.push(format!(
                "event {}: frame_number {} follows {} ({})",
                i + 1,
                n,
                prev,
                event.source
            )),
            _ => {}
        }
        previous = Some(event.frame_number);
    }
    problems
}

fn summarize(events: &[DetectionEvent]) -> BTreeMap<&str, SourceTotals> {
    let mut totals: BTreeMap<&str, SourceTotals> = BTreeMap::new();
    for event in events {
        let entry = totals.entry(event.source.as_str()).or_default();
        entry.events += 1;
        if event.frame_number == 1 {
            entry.runs += 1;
        }
        entry.person_sum += u64::from(event.person_count);
        entry.max_persons = entry.max_persons.max(event.person_count);
    }
    totals
}
