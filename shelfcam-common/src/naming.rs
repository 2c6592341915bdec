//! Filename encodings used across the stores
//!
//! - Sorted images: `<8-digit sequence>_<timestamp>.<ext>`
//! - Raw captures from the robot camera: `<prefix>-<sequence>.<ext>`
//! - Run archives: `M_D_YY[_RUN]_SHELVES.zip`

use crate::{Error, Result};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Zero-padded width of the sequence prefix on sorted images
pub const SEQUENCE_WIDTH: usize = 8;

/// Name of a sorted image: sequence prefix, capture timestamp and extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageName {
    pub sequence: u64,
    pub timestamp: String,
    pub extension: String,
}

impl ImageName {
    pub fn new(sequence: u64, timestamp: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            sequence,
            timestamp: timestamp.into(),
            extension: extension.into(),
        }
    }

    /// Parse `00000006_1570000000.123456.png`
    ///
    /// The timestamp is everything between the first `_` and the last `.`,
    /// so fractional timestamps survive a round trip.
    pub fn parse(name: &str) -> Result<Self> {
        let (sequence, rest) = name
            .split_once('_')
            .ok_or_else(|| Error::invalid_name(name, "missing '_' after sequence prefix"))?;

        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_name(name, "sequence prefix is not numeric"));
        }
        let sequence = sequence
            .parse::<u64>()
            .map_err(|e| Error::invalid_name(name, e.to_string()))?;

        let (timestamp, extension) = rest
            .rsplit_once('.')
            .ok_or_else(|| Error::invalid_name(name, "missing extension"))?;

        if timestamp.is_empty() {
            return Err(Error::invalid_name(name, "empty timestamp"));
        }

        Ok(Self::new(sequence, timestamp, extension))
    }

    /// Same timestamp and extension under a new sequence prefix
    pub fn with_sequence(&self, sequence: u64) -> Self {
        Self {
            sequence,
            ..self.clone()
        }
    }

    pub fn file_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ImageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:0width$}_{}.{}",
            self.sequence,
            self.timestamp,
            self.extension,
            width = SEQUENCE_WIDTH
        )
    }
}

/// Render a modification time as `<unix seconds>.<microseconds>`
pub fn format_timestamp(time: SystemTime) -> String {
    let since_epoch = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{}.{:06}", since_epoch.as_secs(), since_epoch.subsec_micros())
}

/// Sequence number embedded in a raw capture name (`shelf-0042.png` → 42)
pub fn parse_capture_sequence(name: &str) -> Option<u64> {
    let stem = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
    let (_, digits) = stem.rsplit_once('-')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Extension of a file name, lowercased (empty when absent)
pub fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Parsed run archive name `M_D_YY[_RUN]_SHELVES`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunKey {
    pub month: u32,
    pub day: u32,
    pub year: u32,
    pub run: Option<u32>,
    pub shelves: u32,
}

impl RunKey {
    /// Parse an archive file name (`1_6_20_2.zip`) or bare run name (`1_6_20_1_2`)
    pub fn parse(name: &str) -> Result<Self> {
        let stem = run_name(name);
        let fields: Vec<&str> = stem.split('_').collect();

        let numbers = fields
            .iter()
            .map(|f| f.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| Error::invalid_name(name, "run name fields must be numeric"))?;

        let key = match numbers.as_slice() {
            [month, day, year, shelves] => Self {
                month: *month,
                day: *day,
                year: *year,
                run: None,
                shelves: *shelves,
            },
            [month, day, year, run, shelves] => Self {
                month: *month,
                day: *day,
                year: *year,
                run: Some(*run),
                shelves: *shelves,
            },
            _ => {
                return Err(Error::invalid_name(
                    name,
                    "expected M_D_YY_SHELVES or M_D_YY_RUN_SHELVES",
                ))
            }
        };

        if !(1..=12).contains(&key.month) || !(1..=31).contains(&key.day) {
            return Err(Error::invalid_name(name, "month or day out of range"));
        }
        if key.shelves == 0 {
            return Err(Error::invalid_name(name, "shelf count must be positive"));
        }

        Ok(key)
    }

    fn chronological(&self) -> (u32, u32, u32, u32) {
        (self.year, self.month, self.day, self.run.unwrap_or(0))
    }
}

impl PartialOrd for RunKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RunKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.chronological()
            .cmp(&other.chronological())
            .then(self.shelves.cmp(&other.shelves))
    }
}

/// Run name of an archive: the file name without its extension
pub fn run_name(file_name: &str) -> &str {
    file_name
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(file_name)
}
