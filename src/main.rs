// src/main.rs
// Command-line application for Volt Reader

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use volt_reader::{AnchorMatch, Cycle, SmoothingParams, Voltammogram};

/// Inspect, split and smooth cyclic voltammetry exports.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Display scan parameters and cycle layout
    Info {
        file: PathBuf,

        /// Match anchor rows within this many volts instead of exactly
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// List cycles with their row ranges
    Cycles {
        file: PathBuf,

        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Write one cycle (or the whole trace) to CSV
    Export {
        file: PathBuf,

        /// Cycle to export; negative values count from the last cycle
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        nth: i64,

        /// Export the whole trace instead of one cycle
        #[arg(long)]
        all: bool,

        /// Output CSV path (default: <input stem>_origin.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Smooth one cycle's current and write it to CSV
    Smooth {
        file: PathBuf,

        /// Cycle to smooth; negative values count from the last cycle
        #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
        nth: i64,

        /// Savitzky-Golay window length (odd, > 1)
        #[arg(short, long, default_value_t = 7)]
        window: usize,

        /// Order of the fitted polynomial
        #[arg(short, long, default_value_t = 2)]
        polyorder: usize,

        /// Output CSV path (default: <input stem>_smoothed.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        tolerance: Option<f64>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Info { file, tolerance } => {
            let volt = load_or_exit(&file);
            print_file_info(&volt, matching(tolerance));
        }

        Command::Cycles { file, tolerance } => {
            let volt = load_or_exit(&file);
            let cycles = volt.cycles_with(matching(tolerance));
            if cycles.is_empty() {
                println!("No cycles found");
            }
            for (i, cycle) in cycles.iter().enumerate() {
                print_cycle_line(i, cycle);
            }
        }

        Command::Export {
            file,
            nth,
            all,
            output,
            tolerance,
        } => {
            let volt = load_or_exit(&file);
            let output_file = output.unwrap_or_else(|| default_output(&file, "origin"));

            let result = if all {
                volt.write_csv(&output_file)
            } else {
                let cycles = volt.cycles_with(matching(tolerance));
                let index = resolve_index(nth, cycles.len());
                cycles[index].write_csv(&output_file)
            };

            if let Err(e) = result {
                eprintln!("Error writing CSV file '{}': {}", output_file.display(), e);
                process::exit(1);
            }
            println!("Successfully exported {} to {}", file.display(), output_file.display());
        }

        Command::Smooth {
            file,
            nth,
            window,
            polyorder,
            output,
            tolerance,
        } => {
            let volt = load_or_exit(&file);
            let matching = matching(tolerance);
            let index = resolve_index(nth, volt.cycles_with(matching).len());
            let params = SmoothingParams::new(window, polyorder);

            let smoothed = match volt.smooth_cycle_with(index, &params, matching) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("Error smoothing cycle {}: {}", index, e);
                    process::exit(1);
                }
            };

            let output_file = output.unwrap_or_else(|| default_output(&file, "smoothed"));
            if let Err(e) = smoothed.write_csv(&output_file) {
                eprintln!("Error writing CSV file '{}': {}", output_file.display(), e);
                process::exit(1);
            }
            println!(
                "Smoothed cycle {} ({} samples) written to {}",
                index,
                smoothed.len(),
                output_file.display()
            );
        }
    }
}

fn load_or_exit(file: &Path) -> Voltammogram {
    match Voltammogram::load_file(file) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error loading voltammogram '{}': {}", file.display(), e);
            process::exit(1);
        }
    }
}

fn matching(tolerance: Option<f64>) -> AnchorMatch {
    tolerance.map_or(AnchorMatch::Exact, AnchorMatch::Tolerance)
}

/// Map a possibly negative cycle number onto `0..count`.
fn resolve_index(nth: i64, count: usize) -> usize {
    let resolved = if nth < 0 { count as i64 + nth } else { nth };
    if resolved < 0 || resolved >= count as i64 {
        eprintln!("Error: Cycle {} not found (file has {} cycles)", nth, count);
        process::exit(1);
    }
    resolved as usize
}

fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "voltammogram".to_string());
    PathBuf::from(format!("{}_{}.csv", stem, suffix))
}

fn print_cycle_line(index: usize, cycle: &Cycle<'_>) {
    let potentials = cycle.potentials();
    if potentials.is_empty() {
        println!("  Cycle {}: rows {}..{} (empty)", index, cycle.start(), cycle.end());
        return;
    }
    let min = potentials.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    let max = potentials.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
    println!(
        "  Cycle {}: rows {}..{} ({} samples, {:.3} V to {:.3} V)",
        index,
        cycle.start(),
        cycle.end(),
        cycle.len(),
        min,
        max
    );
}

fn print_file_info(volt: &Voltammogram, matching: AnchorMatch) {
    let meta = volt.metadata();

    println!("Voltammogram Information");
    println!("========================");
    println!();
    println!("File: {}", volt.file_path());
    println!("Recorded: {}", meta.timestamp);
    println!("Technique: {}", meta.technique);
    println!();

    println!("Scan Parameters:");
    println!("  Initial potential: {} V", meta.initial_potential);
    println!("  High potential: {} V", meta.high_potential);
    println!("  Low potential: {} V", meta.low_potential);
    println!("  Scan direction: {}", meta.scan_direction);
    println!("  Scan rate: {} V/s", meta.scan_rate);
    println!("  Segments: {}", meta.segment_count);
    println!("  Sample interval: {}", meta.sample_interval);
    println!();

    let currents = volt.currents();
    println!("Trace:");
    println!("  Samples: {}", currents.len());
    if !currents.is_empty() {
        let min_i = currents.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max_i = currents.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        println!("  Current range: {:.3e} A to {:.3e} A", min_i, max_i);
    }
    println!();

    let cycles = volt.cycles_with(matching);
    println!("Cycles ({}):", cycles.len());
    for (i, cycle) in cycles.iter().enumerate() {
        print_cycle_line(i, cycle);
    }
}
