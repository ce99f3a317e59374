use std::fs;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::CurveError;

pub const DEFAULT_SEGMENT_COUNT: usize = 40;
pub const DEFAULT_SEGMENT_SAMPLES: usize = 50;

/// Per-segment sample counts, indexed by segment position.
///
/// Entries are always positive, so every generated segment has a last sample
/// to carry into the next one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SegmentTable {
    lengths: Vec<usize>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TableJson {
    Bare(Vec<usize>),
    Object { lengths: Vec<usize> },
}

impl SegmentTable {
    pub fn new(lengths: Vec<usize>) -> Result<Self, CurveError> {
        if lengths.is_empty() {
            return Err(CurveError::InvalidSegmentTable("table has no entries".into()));
        }
        if let Some(idx) = lengths.iter().position(|&len| len == 0) {
            return Err(CurveError::InvalidSegmentTable(format!(
                "entry {} is zero; segment lengths must be positive",
                idx
            )));
        }
        Ok(Self { lengths })
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    /// Length of `segment`, or a bounds error naming the segment.
    pub fn get(&self, segment: usize) -> Result<usize, CurveError> {
        self.lengths
            .get(segment)
            .copied()
            .ok_or(CurveError::SegmentTableExhausted {
                segment,
                available: self.lengths.len(),
            })
    }

    /// Parse a comma separated list such as `3,2,4`.
    pub fn parse_list(input: &str) -> Result<Self, CurveError> {
        let mut lengths = Vec::new();
        for token in input.split(',') {
            let trimmed = token.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value: usize = trimmed.parse().map_err(|_| {
                CurveError::InvalidSegmentTable(format!(
                    "'{}' is not a non-negative integer",
                    trimmed
                ))
            })?;
            lengths.push(value);
        }
        Self::new(lengths)
    }

    /// Accepts either `[3, 2, 4]` or `{"lengths": [3, 2, 4]}`.
    pub fn from_json_str(text: &str) -> Result<Self, CurveError> {
        let parsed: TableJson = serde_json::from_str(text)
            .map_err(|e| CurveError::InvalidSegmentTable(e.to_string()))?;
        Self::from_json(parsed)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CurveError> {
        let parsed: TableJson = serde_json::from_reader(reader)
            .map_err(|e| CurveError::InvalidSegmentTable(e.to_string()))?;
        Self::from_json(parsed)
    }

    pub fn from_path(path: &Path) -> Result<Self, CurveError> {
        let text = fs::read_to_string(path).map_err(|e| {
            CurveError::InvalidSegmentTable(format!("{}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    fn from_json(parsed: TableJson) -> Result<Self, CurveError> {
        match parsed {
            TableJson::Bare(lengths) | TableJson::Object { lengths } => Self::new(lengths),
        }
    }
}

impl Default for SegmentTable {
    fn default() -> Self {
        Self {
            lengths: vec![DEFAULT_SEGMENT_SAMPLES; DEFAULT_SEGMENT_COUNT],
        }
    }
}
