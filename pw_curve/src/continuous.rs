use serde::{Deserialize, Serialize};

use crate::piecewise::{plan_segments, Polynomial, SegmentKind, SegmentPlan, SegmentSpan};
use crate::{BuildOptions, CurveError, SegmentTable, MAX_SAMPLES};

const STEP_EPS: f64 = 1e-9;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct CurvePoint {
    pub x: f64,
    pub y: f64,
}

/// Curve laid out along a real x axis. Segment `n` covers table entry `n`
/// as a width, starting where segment `n - 1` ended.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContinuousCurve {
    pub points: Vec<CurvePoint>,
    pub segments: Vec<SegmentSpan>,
    pub ignored: Vec<f64>,
    pub resolution: f64,
}

impl ContinuousCurve {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn xs(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.x).collect()
    }

    pub fn ys(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }
}

/// Sample each segment every `resolution` units of x.
///
/// A segment starting at `(x0, y)` gets its constant term solved so the
/// polynomial passes through that point, so the curve stays continuous in
/// x as well as in value.
pub fn build_continuous(
    args: &[f64],
    table: &SegmentTable,
    resolution: f64,
    opts: &BuildOptions,
) -> Result<ContinuousCurve, CurveError> {
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(CurveError::InvalidParameter(format!(
            "resolution must be a positive number, got {}",
            resolution
        )));
    }
    let (plans, ignored) = plan_segments(args, opts)?;

    let too_many = || {
        CurveError::InvalidParameter(format!(
            "resolution {} would produce more than {} points",
            resolution, MAX_SAMPLES
        ))
    };

    let mut steps = Vec::with_capacity(plans.len());
    let mut total = 0usize;
    for ordinal in 0..plans.len() {
        let width = table.get(ordinal)? as f64;
        let intervals = (width / resolution + STEP_EPS).floor();
        if !intervals.is_finite() || intervals >= MAX_SAMPLES as f64 {
            return Err(too_many());
        }
        let count = intervals as usize + 1;
        total = total
            .checked_add(count)
            .filter(|&t| t <= MAX_SAMPLES)
            .ok_or_else(too_many)?;
        steps.push((width, count));
    }

    let mut points = Vec::with_capacity(total);
    let mut segments = Vec::with_capacity(plans.len());
    let mut y = args[0];
    let mut x0 = 0.0;

    for (ordinal, (plan, &(width, count))) in plans.iter().zip(steps.iter()).enumerate() {
        let poly = anchored(plan, x0, y);
        let start = points.len();
        points.extend((0..count).map(|k| {
            let x = x0 + k as f64 * resolution;
            CurvePoint {
                x,
                y: poly.value(x),
            }
        }));
        let carry = points.last().map(|p| p.y).unwrap_or(y);
        segments.push(SegmentSpan {
            kind: plan.kind,
            table_index: ordinal,
            start,
            len: count,
            seed: y,
            carry,
        });
        y = carry;
        x0 += width;
    }

    Ok(ContinuousCurve {
        points,
        segments,
        ignored,
        resolution,
    })
}

fn anchored(plan: &SegmentPlan, x0: f64, y: f64) -> Polynomial {
    match (plan.kind, plan.coefficients.as_slice()) {
        (SegmentKind::Parabola, &[a, b]) => Polynomial::parabola(a, b, y - a * x0 * x0 - b * x0),
        (SegmentKind::Line, &[m]) => Polynomial::line(m, y - m * x0),
        _ => plan.polynomial(y),
    }
}
