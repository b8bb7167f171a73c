// src/lib.rs
// Volt Reader Library - Public API

//! # Volt Reader
//!
//! A Rust library for reading cyclic voltammetry exports from potentiostat
//! instruments.
//!
//! ## Features
//!
//! - Parse the plain-text export header (timestamp, technique, scan parameters)
//! - Load the potential/current trace in acquisition order
//! - Split the trace into scan cycles
//! - Smooth a cycle's current with a Savitzky-Golay filter
//! - Export cycles to CSV format
//!
//! ## Example
//!
//! ```no_run
//! use volt_reader::{SmoothingParams, Voltammogram};
//!
//! let volt = Voltammogram::load_file("cv 200 mvs.txt").expect("Failed to load file");
//!
//! println!("Scan rate: {} V/s", volt.metadata().scan_rate);
//!
//! for cycle in volt.cycles() {
//!     println!("Cycle rows {:?}", cycle.range());
//! }
//!
//! // Smooth the second cycle and export it
//! let smoothed = volt
//!     .smooth_cycle(1, &SmoothingParams::default())
//!     .expect("Failed to smooth cycle");
//! smoothed.write_csv("cycle1.csv").expect("Failed to write CSV");
//! ```

mod cycles;
mod savgol;
mod volt_tools;

pub use cycles::{anchor_rows, segment_bounds, AnchorMatch, Cycle};
pub use savgol::{savgol_filter, savgol_weights, SmoothedCycle, SmoothingParams};
pub use volt_tools::{
    ParseError, Result, Sample, ScanDirection, ScanMetadata, VoltError, Voltammogram, DATA_MARKER,
};
