use ndarray::{array, Array1};
use serde::{Deserialize, Serialize};

use crate::{BuildOptions, CurveError, SegmentTable, TrailingPolicy, MAX_SAMPLES};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SegmentKind {
    Parabola,
    Line,
}

impl SegmentKind {
    pub fn id(&self) -> &'static str {
        match self {
            SegmentKind::Parabola => "parabola",
            SegmentKind::Line => "line",
        }
    }
}

/// Polynomial in one variable, coefficients stored highest degree first.
#[derive(Clone, Debug, PartialEq)]
pub struct Polynomial {
    coefs: Array1<f64>,
}

impl Polynomial {
    pub fn parabola(leading: f64, linear: f64, constant: f64) -> Self {
        Self {
            coefs: array![leading, linear, constant],
        }
    }

    pub fn line(slope: f64, intercept: f64) -> Self {
        Self {
            coefs: array![slope, intercept],
        }
    }

    pub fn degree(&self) -> usize {
        self.coefs.len() - 1
    }

    /// Term-by-term sum `c0·x^n + c1·x^(n-1) + .. + cn`, each power built by
    /// repeated multiplication, so `a·x·x + b·x + c` rounds exactly as written.
    pub fn value(&self, x: f64) -> f64 {
        let degree = self.degree();
        self.coefs
            .iter()
            .enumerate()
            .map(|(k, &beta)| (0..degree - k).fold(beta, |term, _| term * x))
            .reduce(|acc, term| acc + term)
            .unwrap_or(0.0)
    }

    /// Values at `x = 0, 1, .., count - 1`.
    pub fn sample(&self, count: usize) -> Array1<f64> {
        Array1::from_iter((0..count).map(|j| self.value(j as f64)))
    }
}

/// One segment as decoded from the argument vector, before sampling.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentPlan {
    pub kind: SegmentKind,
    /// Entry of the segment table that supplies this segment's length.
    pub table_index: usize,
    /// Every coefficient except the carried constant term.
    pub coefficients: Vec<f64>,
}

impl SegmentPlan {
    pub fn polynomial(&self, carry: f64) -> Polynomial {
        match (self.kind, self.coefficients.as_slice()) {
            (SegmentKind::Parabola, &[leading, linear]) => {
                Polynomial::parabola(leading, linear, carry)
            }
            (SegmentKind::Line, &[slope]) => Polynomial::line(slope, carry),
            _ => {
                let mut coefs = self.coefficients.clone();
                coefs.push(carry);
                Polynomial {
                    coefs: Array1::from_vec(coefs),
                }
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpan {
    pub kind: SegmentKind,
    pub table_index: usize,
    /// Offset of the first sample in [`Piecewise::samples`].
    pub start: usize,
    pub len: usize,
    /// Carry the segment was seeded with; equals its first sample.
    pub seed: f64,
    /// Last sample of the segment, carried into the next one.
    pub carry: f64,
}

impl SegmentSpan {
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Piecewise {
    pub samples: Vec<f64>,
    pub segments: Vec<SegmentSpan>,
    /// Trailing argument values that did not form a segment.
    pub ignored: Vec<f64>,
}

impl Piecewise {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn segment_samples(&self, span: &SegmentSpan) -> &[f64] {
        &self.samples[span.start..span.end()]
    }
}

/// Split `args[1..]` into parabola/line segments.
///
/// Groups are `(leading, linear, slope)`. The parabola of group `k` reads
/// table entry `k` and its line reads entry `k + 1`. Returns the plans and
/// any trailing values that were dropped under [`TrailingPolicy::Ignore`].
pub fn plan_segments(
    args: &[f64],
    opts: &BuildOptions,
) -> Result<(Vec<SegmentPlan>, Vec<f64>), CurveError> {
    let (_, rest) = args.split_first().ok_or(CurveError::EmptyArguments)?;
    let mut plans = Vec::with_capacity(2 * rest.len().div_ceil(3));
    let mut ignored = Vec::new();

    for (group, values) in rest.chunks(3).enumerate() {
        match values {
            [leading, linear, slope @ ..] => {
                if slope.is_empty() && opts.trailing == TrailingPolicy::Reject {
                    return Err(CurveError::IncompleteGroup { remaining: 2 });
                }
                plans.push(SegmentPlan {
                    kind: SegmentKind::Parabola,
                    table_index: group,
                    coefficients: vec![*leading, *linear],
                });
                if let Some(&slope) = slope.first() {
                    plans.push(SegmentPlan {
                        kind: SegmentKind::Line,
                        table_index: group + 1,
                        coefficients: vec![slope],
                    });
                }
            }
            [lone] => {
                if opts.trailing == TrailingPolicy::Reject {
                    return Err(CurveError::IncompleteGroup { remaining: 1 });
                }
                ignored.push(*lone);
            }
            [] => {}
        }
    }

    Ok((plans, ignored))
}

/// Smallest segment table that can serve `args`.
pub fn required_table_len(args: &[f64]) -> usize {
    let rest = args.len().saturating_sub(1);
    let full = rest / 3;
    if full > 0 || rest % 3 == 2 {
        full + 1
    } else {
        0
    }
}

/// Build the concatenated sample sequence with default options.
pub fn build_piecewise(args: &[f64], table: &SegmentTable) -> Result<Vec<f64>, CurveError> {
    build_piecewise_with(args, table, &BuildOptions::default()).map(|curve| curve.samples)
}

pub fn build_piecewise_with(
    args: &[f64],
    table: &SegmentTable,
    opts: &BuildOptions,
) -> Result<Piecewise, CurveError> {
    let (plans, ignored) = plan_segments(args, opts)?;
    let seed = args[0];

    let mut total = 0usize;
    for plan in &plans {
        total = total
            .checked_add(table.get(plan.table_index)?)
            .filter(|&t| t <= MAX_SAMPLES)
            .ok_or_else(|| {
                CurveError::InvalidParameter(format!(
                    "segment table would produce more than {} samples",
                    MAX_SAMPLES
                ))
            })?;
    }

    let (samples, segments, _) = plans.iter().try_fold(
        (Vec::<f64>::with_capacity(total), Vec::with_capacity(plans.len()), seed),
        |(mut samples, mut spans, carry), plan| {
            let count = table.get(plan.table_index)?;
            let (values, next) = sample_segment(plan, carry, count);
            spans.push(SegmentSpan {
                kind: plan.kind,
                table_index: plan.table_index,
                start: samples.len(),
                len: values.len(),
                seed: carry,
                carry: next,
            });
            samples.extend(values.iter().copied());
            Ok::<_, CurveError>((samples, spans, next))
        },
    )?;

    Ok(Piecewise {
        samples,
        segments,
        ignored,
    })
}

fn sample_segment(plan: &SegmentPlan, carry: f64, count: usize) -> (Array1<f64>, f64) {
    let values = plan.polynomial(carry).sample(count);
    let next = values.iter().next_back().copied().unwrap_or(carry);
    (values, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(lengths: &[usize]) -> SegmentTable {
        SegmentTable::new(lengths.to_vec()).unwrap()
    }

    #[test]
    fn test_single_value_yields_no_samples() {
        let samples = build_piecewise(&[7.5], &table(&[3])).unwrap();
        assert!(samples.is_empty());
    }

    #[test]
    fn test_empty_arguments_fail() {
        assert_eq!(
            build_piecewise(&[], &SegmentTable::default()),
            Err(CurveError::EmptyArguments)
        );
    }

    #[test]
    fn test_all_zero_coefficients() {
        let samples = build_piecewise(&[0.0, 0.0, 0.0, 0.0], &table(&[4, 3])).unwrap();
        assert_eq!(samples.len(), 7);
        assert!(samples.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_lone_parabola() {
        let samples = build_piecewise(&[10.0, 1.0, 2.0], &table(&[3])).unwrap();
        assert_eq!(samples, vec![10.0, 13.0, 18.0]);
    }

    #[test]
    fn test_parabola_then_line() {
        let samples = build_piecewise(&[10.0, 1.0, 2.0, 3.0], &table(&[3, 2])).unwrap();
        assert_eq!(samples, vec![10.0, 13.0, 18.0, 18.0, 21.0]);
    }

    #[test]
    fn test_short_table_is_bounds_error() {
        let err = build_piecewise(&[10.0, 1.0, 2.0, 3.0], &table(&[3])).unwrap_err();
        assert_eq!(
            err,
            CurveError::SegmentTableExhausted {
                segment: 1,
                available: 1
            }
        );
    }

    #[test]
    fn test_line_and_next_parabola_share_table_entry() {
        let (plans, ignored) =
            plan_segments(&[0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0], &BuildOptions::default()).unwrap();
        let indices: Vec<usize> = plans.iter().map(|p| p.table_index).collect();
        let kinds: Vec<SegmentKind> = plans.iter().map(|p| p.kind).collect();
        assert_eq!(indices, vec![0, 1, 1, 2]);
        assert_eq!(
            kinds,
            vec![
                SegmentKind::Parabola,
                SegmentKind::Line,
                SegmentKind::Parabola,
                SegmentKind::Line
            ]
        );
        assert!(ignored.is_empty());
    }

    #[test]
    fn test_continuity_across_segments() {
        let args = [1.0, 0.5, -2.0, 3.0, -0.25, 1.0, -1.0, 2.0, 0.1];
        let curve =
            build_piecewise_with(&args, &table(&[4, 5, 6, 7]), &BuildOptions::default()).unwrap();
        assert_eq!(curve.segments.len(), 5);
        assert_eq!(curve.segments[0].seed, args[0]);
        for span in &curve.segments {
            let values = curve.segment_samples(span);
            assert_eq!(values[0], span.seed);
            assert_eq!(*values.last().unwrap(), span.carry);
        }
        for pair in curve.segments.windows(2) {
            assert_eq!(pair[1].seed, pair[0].carry);
            assert_eq!(pair[1].start, pair[0].end());
        }
    }

    #[test]
    fn test_sample_count_matches_table_entries_read() {
        let args = [2.0, 1.0, 0.0, -1.0, 0.5, 0.5];
        let lengths = [3, 4, 5];
        let curve =
            build_piecewise_with(&args, &table(&lengths), &BuildOptions::default()).unwrap();
        let expected: usize = curve.segments.iter().map(|s| lengths[s.table_index]).sum();
        assert_eq!(curve.len(), expected);
        assert_eq!(curve.len(), 3 + 4 + 4);
    }

    #[test]
    fn test_trailing_lone_value_is_reported() {
        let curve = build_piecewise_with(
            &[5.0, 1.0, 2.0, 3.0, 9.0],
            &table(&[2, 2]),
            &BuildOptions::default(),
        )
        .unwrap();
        assert_eq!(curve.ignored, vec![9.0]);
        assert_eq!(curve.segments.len(), 2);
    }

    #[test]
    fn test_strict_rejects_incomplete_groups() {
        let strict = BuildOptions::strict();
        assert_eq!(
            plan_segments(&[5.0, 1.0, 2.0, 3.0, 9.0], &strict).unwrap_err(),
            CurveError::IncompleteGroup { remaining: 1 }
        );
        assert_eq!(
            plan_segments(&[5.0, 1.0, 2.0], &strict).unwrap_err(),
            CurveError::IncompleteGroup { remaining: 2 }
        );
        assert!(plan_segments(&[5.0, 1.0, 2.0, 3.0], &strict).is_ok());
    }

    #[test]
    fn test_required_table_len() {
        assert_eq!(required_table_len(&[]), 0);
        assert_eq!(required_table_len(&[1.0]), 0);
        assert_eq!(required_table_len(&[1.0, 2.0]), 0);
        assert_eq!(required_table_len(&[1.0, 2.0, 3.0]), 1);
        assert_eq!(required_table_len(&[1.0, 2.0, 3.0, 4.0]), 2);
        assert_eq!(required_table_len(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), 2);
        assert_eq!(required_table_len(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]), 3);
    }

    #[test]
    fn test_polynomial_evaluation() {
        let p = Polynomial::parabola(2.0, -3.0, 1.0);
        assert_eq!(p.degree(), 2);
        assert!((p.value(1.5) - 1.0).abs() < 1e-12);
        let l = Polynomial::line(0.5, 4.0);
        assert_eq!(l.degree(), 1);
        assert_eq!(l.sample(3).to_vec(), vec![4.0, 4.5, 5.0]);
    }

    #[test]
    fn test_parabola_matches_written_form_bitwise() {
        let (a, b, c) = (0.1, 0.2, 0.3);
        let p = Polynomial::parabola(a, b, c);
        for j in 0..1000 {
            let x = j as f64;
            assert_eq!(p.value(x).to_bits(), (a * x * x + b * x + c).to_bits(), "x = {}", x);
        }
        let l = Polynomial::line(0.7, -0.3);
        for j in 0..1000 {
            let x = j as f64;
            assert_eq!(l.value(x).to_bits(), (0.7 * x + -0.3f64).to_bits(), "x = {}", x);
        }
    }

    #[test]
    fn test_oversized_table_entry_is_rejected() {
        let err = build_piecewise(&[0.0, 0.0, 0.0], &table(&[usize::MAX])).unwrap_err();
        assert!(matches!(err, CurveError::InvalidParameter(_)));
        let err = build_piecewise(&[0.0, 0.0, 0.0, 0.0], &table(&[MAX_SAMPLES, 1])).unwrap_err();
        assert!(matches!(err, CurveError::InvalidParameter(_)));
        let curve = build_piecewise(&[0.0, 0.0, 0.0, 0.0], &table(&[MAX_SAMPLES - 1, 1])).unwrap();
        assert_eq!(curve.len(), MAX_SAMPLES);
    }
}
