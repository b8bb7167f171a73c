// VoltReader Module
// TK Ales, 2024
// Version 1.0 - Plain-text potentiostat export reader

use chrono::{Month, NaiveDate, NaiveDateTime};
use log::debug;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

/// Column header line that closes the parameter block.
pub const DATA_MARKER: &str = "Potential/V, Current/A";

/// Lines between the technique line and the parameter block.
const UNUSED_HEADER_LINES: usize = 6;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\w{3})[\w.]?\s+(\d{1,2}),\s+(\d{4})\s+(\d{2}):(\d{2}):(\d{2})")
        .expect("timestamp pattern is valid")
});

/// Malformed or truncated export. Line numbers are 1-based.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line {line}: malformed timestamp '{content}'")]
    BadTimestamp { line: usize, content: String },

    #[error("line {line}: malformed {name} parameter '{content}': {reason}")]
    BadParameter {
        line: usize,
        name: &'static str,
        content: String,
        reason: String,
    },

    #[error("line {line}: malformed data row '{content}'")]
    BadDataRow { line: usize, content: String },

    #[error("line {line}: unexpected end of file, expected {expected}")]
    UnexpectedEof { line: usize, expected: &'static str },

    #[error("truncated header: no 'Potential/V, Current/A' line before end of file")]
    MissingDataMarker,
}

#[derive(Error, Debug)]
pub enum VoltError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Cycle index {index} out of range: voltammogram has {count} cycles")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("Filter window of {window} samples exceeds cycle length of {samples}")]
    FilterInputTooShort { window: usize, samples: usize },
}

pub type Result<T> = std::result::Result<T, VoltError>;

/// Direction of the first sweep away from the initial potential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    /// Recorded as `N`.
    Negative,
    /// Any other recorded value.
    Positive,
}

impl ScanDirection {
    pub fn from_label(label: &str) -> Self {
        if label.trim() == "N" {
            ScanDirection::Negative
        } else {
            ScanDirection::Positive
        }
    }
}

impl fmt::Display for ScanDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanDirection::Negative => write!(f, "N"),
            ScanDirection::Positive => write!(f, "P"),
        }
    }
}

/// Scan parameters as declared in the export header.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanMetadata {
    pub timestamp: NaiveDateTime,
    pub technique: String,
    pub initial_potential: f64,
    pub high_potential: f64,
    pub low_potential: f64,
    pub scan_direction: ScanDirection,
    pub scan_rate: f64,
    pub segment_count: u32,
    pub sample_interval: f64,
}

/// One acquired (potential, current) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Sample {
    #[serde(rename = "Potential")]
    pub potential: f64,
    #[serde(rename = "Current")]
    pub current: f64,
}

/// A parsed voltammetry export: header metadata plus the sample trace in
/// acquisition order.
#[derive(Clone, Debug)]
pub struct Voltammogram {
    file_path: String,
    metadata: ScanMetadata,
    samples: Vec<Sample>,
}

impl Voltammogram {
    /// Build a voltammogram from already decoded parts.
    pub fn new(metadata: ScanMetadata, samples: Vec<Sample>) -> Self {
        Voltammogram {
            file_path: String::new(),
            metadata,
            samples,
        }
    }

    /// Load an export from the given path
    pub fn load_file<P: AsRef<Path>>(input_file: P) -> Result<Self> {
        let file_handle = File::open(&input_file)?;
        let mut volt = Self::from_reader(file_handle)?;
        volt.file_path = input_file.as_ref().to_string_lossy().to_string();
        Ok(volt)
    }

    /// Read the whole source into memory and parse it. Invalid UTF-8 is
    /// replaced, so a bad byte only fails the line that needs it.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let text = String::from_utf8_lossy(&bytes);
        Ok(Self::parse_str(&text)?)
    }

    pub fn parse_str(text: &str) -> std::result::Result<Self, ParseError> {
        let mut lines = HeaderLines::new(text);

        let (line, content) = lines.next_line("timestamp line")?;
        let timestamp = parse_timestamp(line, content)?;

        let (_, technique) = lines.next_line("technique line")?;
        let technique = technique.trim().to_string();

        for _ in 0..UNUSED_HEADER_LINES {
            lines.next_line("header line")?;
        }

        let initial_potential = lines.float_parameter("INIT E")?;
        let high_potential = lines.float_parameter("HIGH E")?;
        let low_potential = lines.float_parameter("LOW E")?;
        let (_, direction) = lines.parameter("SCAN DIRECTION")?;
        let scan_direction = ScanDirection::from_label(direction);
        let scan_rate = lines.float_parameter("SCAN RATE")?;
        let segment_count = lines.integer_parameter("SEGMENTS")?;
        let sample_interval = lines.float_parameter("SAMPLE INTERVAL")?;

        let metadata = ScanMetadata {
            timestamp,
            technique,
            initial_potential,
            high_potential,
            low_potential,
            scan_direction,
            scan_rate,
            segment_count,
            sample_interval,
        };
        debug!("Parsed scan header: {:?}", metadata);

        loop {
            match lines.next_line("data marker") {
                Ok((_, content)) if content.contains(DATA_MARKER) => break,
                Ok(_) => continue,
                Err(_) => return Err(ParseError::MissingDataMarker),
            }
        }

        // Blank lines are allowed right after the marker and at end of file only
        let mut rows: Vec<(usize, &str)> = lines
            .rest()
            .skip_while(|(_, content)| content.trim().is_empty())
            .collect();
        while rows.last().is_some_and(|(_, content)| content.trim().is_empty()) {
            rows.pop();
        }

        let mut samples = Vec::with_capacity(rows.len());
        for (line, content) in rows {
            samples.push(parse_data_row(line, content)?);
        }
        debug!("Parsed {} samples", samples.len());

        Ok(Voltammogram {
            file_path: String::new(),
            metadata,
            samples,
        })
    }

    /// Path the voltammogram was loaded from; empty when parsed from memory.
    pub fn file_path(&self) -> &str {
        &self.file_path
    }

    pub fn metadata(&self) -> &ScanMetadata {
        &self.metadata
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn potentials(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.potential).collect()
    }

    pub fn currents(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.current).collect()
    }

    /// Write the whole trace to a CSV file
    pub fn write_csv<P: AsRef<Path>>(&self, output_file: P) -> Result<()> {
        write_samples_csv(output_file, &self.samples)
    }
}

pub(crate) fn write_samples_csv<P: AsRef<Path>>(output_file: P, samples: &[Sample]) -> Result<()> {
    let mut writer = csv::Writer::from_path(output_file)?;
    for sample in samples {
        writer.serialize(sample)?;
    }
    writer.flush()?;
    Ok(())
}

/// Numbered line cursor over the export text.
struct HeaderLines<'a> {
    lines: std::iter::Enumerate<std::str::Lines<'a>>,
    consumed: usize,
}

impl<'a> HeaderLines<'a> {
    fn new(text: &'a str) -> Self {
        HeaderLines {
            lines: text.lines().enumerate(),
            consumed: 0,
        }
    }

    fn next_line(&mut self, expected: &'static str) -> std::result::Result<(usize, &'a str), ParseError> {
        match self.lines.next() {
            Some((idx, content)) => {
                self.consumed = idx + 1;
                Ok((idx + 1, content))
            }
            None => Err(ParseError::UnexpectedEof {
                line: self.consumed + 1,
                expected,
            }),
        }
    }

    fn rest(self) -> impl Iterator<Item = (usize, &'a str)> {
        self.lines.map(|(idx, content)| (idx + 1, content))
    }

    /// Value after the first `=`, trimmed.
    fn parameter(&mut self, name: &'static str) -> std::result::Result<(usize, &'a str), ParseError> {
        let (line, content) = self.next_line(name)?;
        match content.split_once('=') {
            Some((_, value)) => Ok((line, value.trim())),
            None => Err(ParseError::BadParameter {
                line,
                name,
                content: content.to_string(),
                reason: "missing '='".to_string(),
            }),
        }
    }

    fn float_parameter(&mut self, name: &'static str) -> std::result::Result<f64, ParseError> {
        let (line, value) = self.parameter(name)?;
        value.parse::<f64>().map_err(|e| ParseError::BadParameter {
            line,
            name,
            content: value.to_string(),
            reason: e.to_string(),
        })
    }

    fn integer_parameter(&mut self, name: &'static str) -> std::result::Result<u32, ParseError> {
        let (line, value) = self.parameter(name)?;
        value.parse::<u32>().map_err(|e| ParseError::BadParameter {
            line,
            name,
            content: value.to_string(),
            reason: e.to_string(),
        })
    }
}

fn parse_timestamp(line: usize, content: &str) -> std::result::Result<NaiveDateTime, ParseError> {
    let bad = || ParseError::BadTimestamp {
        line,
        content: content.to_string(),
    };

    let caps = TIMESTAMP_RE.captures(content.trim()).ok_or_else(bad)?;
    let month = caps[1].parse::<Month>().map_err(|_| bad())?;
    let day: u32 = caps[2].parse().map_err(|_| bad())?;
    let year: i32 = caps[3].parse().map_err(|_| bad())?;
    let hour: u32 = caps[4].parse().map_err(|_| bad())?;
    let minute: u32 = caps[5].parse().map_err(|_| bad())?;
    let second: u32 = caps[6].parse().map_err(|_| bad())?;

    NaiveDate::from_ymd_opt(year, month.number_from_month(), day)
        .and_then(|date| date.and_hms_opt(hour, minute, second))
        .ok_or_else(bad)
}

fn parse_data_row(line: usize, content: &str) -> std::result::Result<Sample, ParseError> {
    let bad = || ParseError::BadDataRow {
        line,
        content: content.to_string(),
    };

    let mut fields = content.split(',');
    let (potential, current) = match (fields.next(), fields.next(), fields.next()) {
        (Some(p), Some(c), None) => (p, c),
        _ => return Err(bad()),
    };

    Ok(Sample {
        potential: potential.trim().parse().map_err(|_| bad())?,
        current: current.trim().parse().map_err(|_| bad())?,
    })
}
