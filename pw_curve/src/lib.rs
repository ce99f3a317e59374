//! Piecewise curve construction: alternating parabolic and linear segments
//! chained together so every segment starts where the previous one ended.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod continuous;
mod piecewise;
mod segments;

pub use continuous::{build_continuous, ContinuousCurve, CurvePoint};
pub use piecewise::{
    build_piecewise, build_piecewise_with, plan_segments, required_table_len, Piecewise,
    Polynomial, SegmentKind, SegmentPlan, SegmentSpan,
};
pub use segments::{SegmentTable, DEFAULT_SEGMENT_COUNT, DEFAULT_SEGMENT_SAMPLES};

/// Upper bound on the samples or points a single build may produce.
pub const MAX_SAMPLES: usize = 5_000_000;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    #[error("no arguments supplied: the first value is the starting point of the curve")]
    EmptyArguments,
    #[error("argument {position} ('{value}') is not a valid number")]
    InvalidArgument { position: usize, value: String },
    #[error("segment {segment} needs a length but the segment table only has {available} entries")]
    SegmentTableExhausted { segment: usize, available: usize },
    #[error("incomplete trailing coefficient group: {remaining} value(s) left over")]
    IncompleteGroup { remaining: usize },
    #[error("invalid segment table: {0}")]
    InvalidSegmentTable(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// What to do with a coefficient group that is cut short at the end of the
/// argument list.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrailingPolicy {
    /// A group missing only its slope yields a lone parabola; a lone leading
    /// coefficient is dropped and reported in the result.
    Ignore,
    /// Every group must be complete.
    Reject,
}

impl Default for TrailingPolicy {
    fn default() -> Self {
        TrailingPolicy::Ignore
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BuildOptions {
    pub trailing: TrailingPolicy,
}

impl BuildOptions {
    pub fn strict() -> Self {
        Self {
            trailing: TrailingPolicy::Reject,
        }
    }
}

/// Parse raw command-line tokens into real numbers.
///
/// Positions in errors are 1-based, matching how the values appear after the
/// program name. Non-finite literals such as `inf` or `NaN` are rejected.
pub fn parse_arguments<S: AsRef<str>>(raw: &[S]) -> Result<Vec<f64>, CurveError> {
    raw.iter()
        .enumerate()
        .map(|(idx, token)| {
            let token = token.as_ref();
            let invalid = || CurveError::InvalidArgument {
                position: idx + 1,
                value: token.to_string(),
            };
            let value: f64 = token.trim().parse().map_err(|_| invalid())?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(invalid())
            }
        })
        .collect()
}
