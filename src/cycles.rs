// Cycle segmentation
// Splits a voltammogram trace into scan cycles at anchor rows.

use log::warn;
use std::ops::Range;
use std::path::Path;

use crate::volt_tools::{
    write_samples_csv, Result, Sample, ScanDirection, ScanMetadata, VoltError, Voltammogram,
};

/// How a sample potential is compared with the reference bound.
///
/// The instrument writes the literal bound value at each reversal row, so
/// `Exact` is the default. `Tolerance` must be asked for explicitly since it
/// changes cycle counts on noisy traces.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum AnchorMatch {
    #[default]
    Exact,
    Tolerance(f64),
}

impl AnchorMatch {
    pub fn matches(&self, value: f64, reference: f64) -> bool {
        match *self {
            AnchorMatch::Exact => value == reference,
            AnchorMatch::Tolerance(eps) => (value - reference).abs() <= eps,
        }
    }
}

/// Row indices whose potential matches `reference`.
pub fn anchor_rows(samples: &[Sample], reference: f64, matching: AnchorMatch) -> Vec<usize> {
    samples
        .iter()
        .enumerate()
        .filter(|(_, s)| matching.matches(s.potential, reference))
        .map(|(i, _)| i)
        .collect()
}

/// Row ranges of each cycle, in trace order.
///
/// Negative-first scans start a cycle at every row sitting on the initial
/// potential; rows ahead of the first such row belong to no cycle.
/// Positive-first scans cut the trace at every row sitting on the low
/// potential, giving one more cycle than there are cuts. When the scan also
/// starts on the low potential, row 0 is not a cut.
pub fn segment_bounds(
    metadata: &ScanMetadata,
    samples: &[Sample],
    matching: AnchorMatch,
) -> Vec<Range<usize>> {
    let len = samples.len();

    match metadata.scan_direction {
        ScanDirection::Negative => {
            let anchors = anchor_rows(samples, metadata.initial_potential, matching);
            anchors
                .iter()
                .enumerate()
                .map(|(i, &start)| start..anchors.get(i + 1).copied().unwrap_or(len))
                .collect()
        }
        ScanDirection::Positive => {
            if samples.is_empty() {
                return Vec::new();
            }

            let mut anchors = anchor_rows(samples, metadata.low_potential, matching);
            if matching.matches(metadata.initial_potential, metadata.low_potential) {
                if anchors.first() == Some(&0) {
                    anchors.remove(0);
                } else {
                    warn!(
                        "Scan starts at the low potential {} but row 0 is at {}; keeping all {} anchors",
                        metadata.low_potential,
                        samples[0].potential,
                        anchors.len()
                    );
                }
            }

            let mut bounds = Vec::with_capacity(anchors.len() + 1);
            let mut start = 0;
            for &anchor in &anchors {
                bounds.push(start..anchor);
                start = anchor;
            }
            bounds.push(start..len);
            bounds
        }
    }
}

/// A borrowed view over one cycle of a voltammogram trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cycle<'a> {
    start: usize,
    end: usize,
    samples: &'a [Sample],
}

impl<'a> Cycle<'a> {
    /// First row of the cycle in the full trace.
    pub fn start(&self) -> usize {
        self.start
    }

    /// One past the last row of the cycle in the full trace.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &'a [Sample] {
        self.samples
    }

    pub fn potentials(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.potential).collect()
    }

    pub fn currents(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.current).collect()
    }

    /// Write the cycle rows to a CSV file
    pub fn write_csv<P: AsRef<Path>>(&self, output_file: P) -> Result<()> {
        write_samples_csv(output_file, self.samples)
    }
}

impl Voltammogram {
    /// Split the trace into cycles using exact anchor matching.
    pub fn cycles(&self) -> Vec<Cycle<'_>> {
        self.cycles_with(AnchorMatch::Exact)
    }

    pub fn cycles_with(&self, matching: AnchorMatch) -> Vec<Cycle<'_>> {
        let samples = self.samples();
        segment_bounds(self.metadata(), samples, matching)
            .into_iter()
            .map(|range| Cycle {
                start: range.start,
                end: range.end,
                samples: &samples[range],
            })
            .collect()
    }

    /// Get a single cycle by its 0-based position.
    pub fn cycle(&self, index: usize) -> Result<Cycle<'_>> {
        self.cycle_with(index, AnchorMatch::Exact)
    }

    pub fn cycle_with(&self, index: usize, matching: AnchorMatch) -> Result<Cycle<'_>> {
        let cycles = self.cycles_with(matching);
        let count = cycles.len();
        cycles
            .into_iter()
            .nth(index)
            .ok_or(VoltError::IndexOutOfRange { index, count })
    }
}
