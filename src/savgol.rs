// Savitzky-Golay smoothing of cycle currents

use serde::Serialize;
use std::ops::Range;
use std::path::Path;

use crate::cycles::AnchorMatch;
use crate::volt_tools::{Result, Sample, VoltError, Voltammogram};

/// Window and polynomial order for the local least-squares fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SmoothingParams {
    pub window_length: usize,
    pub polyorder: usize,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        SmoothingParams {
            window_length: 7,
            polyorder: 2,
        }
    }
}

impl SmoothingParams {
    pub fn new(window_length: usize, polyorder: usize) -> Self {
        SmoothingParams {
            window_length,
            polyorder,
        }
    }

    /// Window must be odd and greater than 1, polyorder below the window.
    pub fn validate(&self) -> Result<()> {
        if self.window_length % 2 == 0 || self.window_length <= 1 {
            return Err(VoltError::InvalidParameter {
                name: "window_length",
                reason: format!("{} is not an odd number greater than 1", self.window_length),
            });
        }
        if self.polyorder >= self.window_length {
            return Err(VoltError::InvalidParameter {
                name: "polyorder",
                reason: format!(
                    "{} must be less than window_length {}",
                    self.polyorder, self.window_length
                ),
            });
        }
        Ok(())
    }
}

/// Weights that evaluate the least-squares polynomial fitted over a window at
/// `offset` samples from the window centre. Applying them to the window data
/// (in order) gives the smoothed value at that position.
pub fn savgol_weights(window_length: usize, polyorder: usize, offset: f64) -> Result<Vec<f64>> {
    let half = (window_length / 2) as f64;
    let positions: Vec<f64> = (0..window_length).map(|i| i as f64 - half).collect();
    let terms = polyorder + 1;

    // Normal equations (J^T J) a = e(offset), J[i][k] = x_i^k
    let mut normal = vec![vec![0.0; terms]; terms];
    for (j, row) in normal.iter_mut().enumerate() {
        for (k, cell) in row.iter_mut().enumerate() {
            *cell = positions.iter().map(|x| x.powi((j + k) as i32)).sum();
        }
    }
    let rhs: Vec<f64> = (0..terms).map(|k| offset.powi(k as i32)).collect();

    let coeffs = solve_linear(normal, rhs).ok_or_else(|| VoltError::InvalidParameter {
        name: "polyorder",
        reason: format!(
            "singular fit for window_length {} and polyorder {}",
            window_length, polyorder
        ),
    })?;

    Ok(positions
        .iter()
        .map(|x| {
            coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * x.powi(k as i32))
                .sum()
        })
        .collect())
}

/// Smooth `data` with a Savitzky-Golay filter.
///
/// Interior points use the centred window. The first and last
/// `window_length / 2` points are taken from the polynomial fitted to the
/// first and last full window.
pub fn savgol_filter(data: &[f64], params: &SmoothingParams) -> Result<Vec<f64>> {
    params.validate()?;

    let window = params.window_length;
    let n = data.len();
    if window > n {
        return Err(VoltError::FilterInputTooShort { window, samples: n });
    }
    let half = window / 2;

    let mut smoothed = vec![0.0; n];

    let centre = savgol_weights(window, params.polyorder, 0.0)?;
    for i in half..n - half {
        smoothed[i] = dot(&centre, &data[i - half..=i + half]);
    }

    let head = &data[..window];
    let tail = &data[n - window..];
    for i in 0..half {
        let leading = savgol_weights(window, params.polyorder, i as f64 - half as f64)?;
        smoothed[i] = dot(&leading, head);

        let trailing = savgol_weights(window, params.polyorder, (i + 1) as f64)?;
        smoothed[n - half + i] = dot(&trailing, tail);
    }

    Ok(smoothed)
}

fn dot(weights: &[f64], values: &[f64]) -> f64 {
    weights.iter().zip(values).map(|(w, v)| w * v).sum()
}

/// Gaussian elimination with partial pivoting. `None` when singular.
fn solve_linear(mut m: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r1, &r2| m[r1][col].abs().total_cmp(&m[r2][col].abs()))?;
        if m[pivot][col] == 0.0 {
            return None;
        }
        m.swap(col, pivot);
        b.swap(col, pivot);

        let pivot_row = m[col].clone();
        let pivot_rhs = b[col];
        for row in col + 1..n {
            let factor = m[row][col] / pivot_row[col];
            for (cell, p) in m[row].iter_mut().zip(&pivot_row).skip(col) {
                *cell -= factor * p;
            }
            b[row] -= factor * pivot_rhs;
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| m[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / m[row][row];
    }
    Some(x)
}

/// A copy of one cycle with its smoothed current column.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothedCycle {
    start: usize,
    end: usize,
    samples: Vec<Sample>,
    smoothed_current: Vec<f64>,
}

#[derive(Serialize)]
struct SmoothedRow {
    #[serde(rename = "Potential")]
    potential: f64,
    #[serde(rename = "Current")]
    current: f64,
    #[serde(rename = "Smoothed Current")]
    smoothed_current: f64,
}

impl SmoothedCycle {
    /// First row of the source cycle in the full trace.
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Smoothed current, aligned row for row with `samples()`.
    pub fn smoothed_current(&self) -> &[f64] {
        &self.smoothed_current
    }

    pub fn currents(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.current).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn potentials(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.potential).collect()
    }

    /// Write potential, raw and smoothed current to a CSV file
    pub fn write_csv<P: AsRef<Path>>(&self, output_file: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(output_file)?;
        for (sample, &smoothed_current) in self.samples.iter().zip(&self.smoothed_current) {
            writer.serialize(SmoothedRow {
                potential: sample.potential,
                current: sample.current,
                smoothed_current,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Voltammogram {
    /// Smooth the current of the cycle at `index` (0-based).
    pub fn smooth_cycle(&self, index: usize, params: &SmoothingParams) -> Result<SmoothedCycle> {
        self.smooth_cycle_with(index, params, AnchorMatch::Exact)
    }

    pub fn smooth_cycle_with(
        &self,
        index: usize,
        params: &SmoothingParams,
        matching: AnchorMatch,
    ) -> Result<SmoothedCycle> {
        params.validate()?;
        let cycle = self.cycle_with(index, matching)?;
        let smoothed_current = savgol_filter(&cycle.currents(), params)?;

        Ok(SmoothedCycle {
            start: cycle.start(),
            end: cycle.end(),
            samples: cycle.samples().to_vec(),
            smoothed_current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volt_tools::{ScanDirection, ScanMetadata};
    use chrono::NaiveDate;

    fn assert_close(actual: &[f64], expected: &[f64], tol: f64) {
        assert_eq!(actual.len(), expected.len());
        for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
            assert!((a - e).abs() < tol, "value {} mismatch: {} != {}", i, a, e);
        }
    }

    fn test_voltammogram() -> Voltammogram {
        let metadata = ScanMetadata {
            timestamp: NaiveDate::from_ymd_opt(2020, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
            technique: "Cyclic Voltammetry".to_string(),
            initial_potential: 0.0,
            high_potential: 0.5,
            low_potential: 0.0,
            scan_direction: ScanDirection::Negative,
            scan_rate: 0.1,
            segment_count: 4,
            sample_interval: 0.1,
        };
        let mut samples = Vec::new();
        for _ in 0..2 {
            for step in 0..10 {
                let potential = if step <= 5 { step as f64 * 0.1 } else { (10 - step) as f64 * 0.1 };
                samples.push(Sample {
                    potential,
                    current: (step as f64 * 0.7).sin(),
                });
            }
        }
        Voltammogram::new(metadata, samples)
    }

    #[test]
    fn test_centre_weights() {
        let weights = savgol_weights(5, 2, 0.0).unwrap();
        let expected: Vec<f64> = [-3.0, 12.0, 17.0, 12.0, -3.0].iter().map(|w| w / 35.0).collect();
        assert_close(&weights, &expected, 1e-12);
    }

    #[test]
    fn test_moving_average_weights() {
        let weights = savgol_weights(5, 0, 0.0).unwrap();
        assert_close(&weights, &[0.2; 5], 1e-12);
    }

    #[test]
    fn test_quadratic_is_preserved() {
        let data: Vec<f64> = (0..15)
            .map(|i| {
                let x = i as f64;
                0.5 * x * x - 3.0 * x + 2.0
            })
            .collect();
        let smoothed = savgol_filter(&data, &SmoothingParams::new(7, 2)).unwrap();
        assert_close(&smoothed, &data, 1e-8);
    }

    #[test]
    fn test_noise_is_reduced() {
        let data: Vec<f64> = (0..21).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let smoothed = savgol_filter(&data, &SmoothingParams::new(5, 1)).unwrap();
        for value in &smoothed[2..19] {
            assert!(value.abs() < 0.25);
        }
    }

    #[test]
    fn test_window_equal_to_length() {
        let data = [1.0, 2.0, 4.0];
        let smoothed = savgol_filter(&data, &SmoothingParams::new(3, 1)).unwrap();
        let expected = [5.0 / 6.0, 7.0 / 3.0, 23.0 / 6.0];
        assert_close(&smoothed, &expected, 1e-12);
    }

    #[test]
    fn test_invalid_window() {
        for window in [0, 1, 4, 8] {
            let result = savgol_filter(&[0.0; 20], &SmoothingParams::new(window, 0));
            assert!(matches!(
                result,
                Err(VoltError::InvalidParameter { name: "window_length", .. })
            ));
        }
    }

    #[test]
    fn test_invalid_polyorder() {
        let result = savgol_filter(&[0.0; 20], &SmoothingParams::new(5, 5));
        assert!(matches!(
            result,
            Err(VoltError::InvalidParameter { name: "polyorder", .. })
        ));
    }

    #[test]
    fn test_window_longer_than_data() {
        let result = savgol_filter(&[1.0, 2.0, 3.0], &SmoothingParams::new(5, 2));
        assert!(matches!(
            result,
            Err(VoltError::FilterInputTooShort { window: 5, samples: 3 })
        ));
    }

    #[test]
    fn test_smooth_cycle_alignment() {
        let volt = test_voltammogram();
        let cycles = volt.cycles();
        assert_eq!(cycles.len(), 2);

        let smoothed = volt.smooth_cycle(1, &SmoothingParams::default()).unwrap();
        assert_eq!(smoothed.range(), cycles[1].range());
        assert_eq!(smoothed.len(), cycles[1].len());
        assert_eq!(smoothed.smoothed_current().len(), smoothed.len());
        assert_eq!(smoothed.samples(), cycles[1].samples());
        assert_eq!(smoothed.currents(), cycles[1].currents());
    }

    #[test]
    fn test_smooth_cycle_errors() {
        let volt = test_voltammogram();

        assert!(matches!(
            volt.smooth_cycle(0, &SmoothingParams::new(4, 2)),
            Err(VoltError::InvalidParameter { name: "window_length", .. })
        ));
        assert!(matches!(
            volt.smooth_cycle(2, &SmoothingParams::default()),
            Err(VoltError::IndexOutOfRange { index: 2, count: 2 })
        ));
        assert!(matches!(
            volt.smooth_cycle(0, &SmoothingParams::new(11, 2)),
            Err(VoltError::FilterInputTooShort { window: 11, samples: 10 })
        ));
    }
}
