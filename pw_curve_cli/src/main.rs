use std::fs::File;
use std::io::{self, Write};
use std::panic;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueHint};
use plotters::prelude::*;
use plotters::style::{FontDesc, FontFamily, FontStyle};
use pw_curve::{
    build_continuous, build_piecewise_with, parse_arguments, required_table_len, BuildOptions,
    ContinuousCurve, Piecewise, SegmentKind, SegmentSpan, SegmentTable, TrailingPolicy,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CHART_SIZE: (u32, u32) = (1280, 760);
const PARABOLA_COLOR: RGBColor = RGBColor(200, 0, 100);
const LINE_COLOR: RGBColor = RGBColor(30, 144, 255);

#[derive(Parser, Debug)]
#[command(author, version, about = "Piecewise parabola/line curve plotter", long_about = None)]
struct Cli {
    /// Starting value, then groups of (leading, linear, slope) coefficients
    #[arg(value_name = "COEFFICIENT", allow_negative_numbers = true)]
    coefficients: Vec<String>,

    /// Segment length table as JSON (`[3, 2]` or `{"lengths": [3, 2]}`)
    #[arg(long, value_hint = ValueHint::FilePath)]
    segments: Option<PathBuf>,

    /// Segment length table as a comma separated list (overrides --segments)
    #[arg(long)]
    lengths: Option<String>,

    /// Reject a trailing coefficient group that is not complete
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Lay segments out along a real x axis, sampling every STEP units
    #[arg(long, value_name = "STEP")]
    resolution: Option<f64>,

    /// Output CSV of the samples (`-` for stdout)
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    output: Option<PathBuf>,

    /// Output PNG figure path
    #[arg(long, default_value = "piecewise.png", value_hint = ValueHint::FilePath)]
    png: PathBuf,

    /// Output SVG figure path
    #[arg(long, value_hint = ValueHint::FilePath)]
    svg: Option<PathBuf>,

    /// Disable plot generation
    #[arg(long, action = ArgAction::SetTrue)]
    no_plot: bool,

    /// Chart caption
    #[arg(long, default_value = "Piecewise curve")]
    title: String,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    handle_curve(cli)
}

fn handle_curve(cli: Cli) -> Result<()> {
    let args = parse_arguments(cli.coefficients.as_slice())?;
    let table = load_segment_table(cli.lengths.as_deref(), cli.segments.as_deref())?;
    let opts = BuildOptions {
        trailing: if cli.strict {
            TrailingPolicy::Reject
        } else {
            TrailingPolicy::Ignore
        },
    };

    let curve = match cli.resolution {
        Some(resolution) => {
            CurveData::Continuous(build_continuous(&args, &table, resolution, &opts)?)
        }
        None => {
            debug!(
                "{} values need {} table entries ({} available)",
                args.len(),
                required_table_len(&args),
                table.len()
            );
            CurveData::Discrete(build_piecewise_with(&args, &table, &opts)?)
        }
    };

    if !curve.ignored().is_empty() {
        warn!(
            "Ignoring {} trailing value(s) that do not form a segment: {:?}",
            curve.ignored().len(),
            curve.ignored()
        );
    }
    info!(
        "Curve built: {} segments, {} samples",
        curve.spans().len(),
        curve.len()
    );

    if let Some(output) = cli.output.as_ref() {
        if output.as_os_str() == "-" {
            write_curve_stdout(&curve)?;
        } else {
            write_curve_csv(&curve, output)?;
            info!("Wrote samples CSV: {}", output.display());
        }
    }

    if cli.no_plot {
        return Ok(());
    }
    if curve.len() == 0 {
        info!("Nothing to plot");
        return Ok(());
    }

    let plot_opts = PlotOptions {
        title: cli.title.clone(),
        size: CHART_SIZE,
    };
    if let Err(err) = render_chart_guard(&curve, &cli.png, ChartKind::Png, &plot_opts) {
        warn!("Skipping PNG render ({}): {}", cli.png.display(), err);
    } else {
        info!("Wrote plot: {}", cli.png.display());
    }
    if let Some(path) = cli.svg.as_ref() {
        if let Err(err) = render_chart_guard(&curve, path, ChartKind::Svg, &plot_opts) {
            warn!("Skipping SVG render ({}): {}", path.display(), err);
        } else {
            info!("Wrote plot: {}", path.display());
        }
    }

    Ok(())
}

fn load_segment_table(lengths: Option<&str>, path: Option<&Path>) -> Result<SegmentTable> {
    if let Some(list) = lengths {
        if let Some(path) = path {
            warn!("--lengths overrides segment table {}", path.display());
        }
        return SegmentTable::parse_list(list)
            .with_context(|| format!("invalid --lengths '{}'", list));
    }
    if let Some(path) = path {
        let table = SegmentTable::from_path(path)
            .with_context(|| format!("failed to load segment table {}", path.display()))?;
        debug!("Loaded {} segment lengths from {}", table.len(), path.display());
        return Ok(table);
    }
    Ok(SegmentTable::default())
}

enum CurveData {
    Discrete(Piecewise),
    Continuous(ContinuousCurve),
}

impl CurveData {
    fn len(&self) -> usize {
        match self {
            CurveData::Discrete(curve) => curve.len(),
            CurveData::Continuous(curve) => curve.len(),
        }
    }

    fn spans(&self) -> &[SegmentSpan] {
        match self {
            CurveData::Discrete(curve) => &curve.segments,
            CurveData::Continuous(curve) => &curve.segments,
        }
    }

    fn ignored(&self) -> &[f64] {
        match self {
            CurveData::Discrete(curve) => &curve.ignored,
            CurveData::Continuous(curve) => &curve.ignored,
        }
    }

    /// `(x, value)` pairs; x is the sample index in discrete mode.
    fn points(&self) -> Vec<(f64, f64)> {
        match self {
            CurveData::Discrete(curve) => curve
                .samples
                .iter()
                .enumerate()
                .map(|(idx, &v)| (idx as f64, v))
                .collect(),
            CurveData::Continuous(curve) => curve.points.iter().map(|p| (p.x, p.y)).collect(),
        }
    }

    fn position_label(&self) -> &'static str {
        match self {
            CurveData::Discrete(_) => "index",
            CurveData::Continuous(_) => "x",
        }
    }

    fn format_position(&self, x: f64) -> String {
        match self {
            CurveData::Discrete(_) => format!("{:.0}", x),
            CurveData::Continuous(_) => format!("{:.6}", x),
        }
    }

    fn tick_precision(&self) -> usize {
        match self {
            CurveData::Discrete(_) => 0,
            CurveData::Continuous(_) => 1,
        }
    }

    /// X positions where a new segment starts.
    fn boundaries(&self, points: &[(f64, f64)]) -> Vec<f64> {
        self.spans()
            .iter()
            .skip(1)
            .filter_map(|span| points.get(span.start).map(|p| p.0))
            .collect()
    }
}

fn write_curve_stdout(curve: &CurveData) -> Result<()> {
    let stdout = io::stdout();
    let handle = stdout.lock();
    let mut writer = csv::Writer::from_writer(handle);
    write_curve_rows(curve, &mut writer)
}

fn write_curve_csv(curve: &CurveData, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_curve_rows(curve, &mut writer)
}

fn write_curve_rows<W: Write>(curve: &CurveData, writer: &mut csv::Writer<W>) -> Result<()> {
    writer.write_record([curve.position_label(), "segment", "kind", "value"])?;

    let points = curve.points();
    for (ordinal, span) in curve.spans().iter().enumerate() {
        for &(x, value) in &points[span.start..span.end()] {
            writer.write_record([
                curve.format_position(x),
                ordinal.to_string(),
                span.kind.id().to_string(),
                format!("{:.6}", value),
            ])?;
        }
    }

    writer.flush()?;
    Ok(())
}

#[derive(Clone, Debug)]
struct PlotOptions {
    title: String,
    size: (u32, u32),
}

enum ChartKind {
    Png,
    Svg,
}

fn render_chart_guard(
    curve: &CurveData,
    path: &Path,
    kind: ChartKind,
    opts: &PlotOptions,
) -> Result<(), String> {
    let render = || -> Result<(), String> {
        render_chart(curve, path, kind, opts).map_err(|e| format!("plotting error: {}", e))
    };

    panic::catch_unwind(panic::AssertUnwindSafe(render))
        .map_err(|_| "plotting backend panicked".to_string())?
}

fn render_chart(curve: &CurveData, path: &Path, kind: ChartKind, opts: &PlotOptions) -> Result<()> {
    let points = curve.points();
    if points.is_empty() {
        return Ok(());
    }

    match kind {
        // Without a system font the bitmap backend cannot rasterise glyphs,
        // so PNG output is drawn without any text.
        ChartKind::Png => {
            let root = BitMapBackend::new(path, opts.size).into_drawing_area();
            draw_chart(root, curve, &points, opts, false)?;
        }
        ChartKind::Svg => {
            let root = SVGBackend::new(path, opts.size).into_drawing_area();
            draw_chart(root, curve, &points, opts, true)?;
        }
    }

    Ok(())
}

fn axis_range(values: impl Iterator<Item = f64>, include_zero: bool) -> (f64, f64) {
    let (mut lo, mut hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if include_zero {
        lo = lo.min(0.0);
        hi = hi.max(0.0);
    }
    if (hi - lo).abs() < f64::EPSILON {
        hi = lo + 1.0;
    }
    (lo, hi)
}

/// `count + 1` evenly spaced values from `lo` to `hi` inclusive.
fn grid_ticks(lo: f64, hi: f64, count: usize) -> Vec<f64> {
    let step = (hi - lo) / count.max(1) as f64;
    (0..=count.max(1)).map(|k| lo + k as f64 * step).collect()
}

fn draw_chart<DB>(
    root: DrawingArea<DB, plotters::coord::Shift>,
    curve: &CurveData,
    points: &[(f64, f64)],
    opts: &PlotOptions,
    with_text: bool,
) -> Result<()>
where
    DB: DrawingBackend,
    DB::ErrorType: 'static,
{
    let area = root;
    area.fill(&WHITE)?;

    let (x_min, x_max) = axis_range(points.iter().map(|p| p.0), false);
    let (y_lo, y_hi) = axis_range(points.iter().map(|p| p.1), true);
    let pad = (y_hi - y_lo) * 0.05;
    let (y_lo, y_hi) = (y_lo - pad, y_hi + pad);

    let mut builder = ChartBuilder::on(&area);
    builder.margin(25);
    if with_text {
        builder
            .caption(
                &opts.title,
                FontDesc::new(FontFamily::SansSerif, 24.0, FontStyle::Normal),
            )
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40);
    }
    let mut chart = builder.build_cartesian_2d(x_min..x_max, y_lo..y_hi)?;

    if with_text {
        let precision = curve.tick_precision();
        chart
            .configure_mesh()
            .x_desc(curve.position_label())
            .y_desc("value")
            .x_label_formatter(&|v| format!("{:.*}", precision, v))
            .y_label_formatter(&|v| format!("{:.1}", v))
            .label_style(FontDesc::new(
                FontFamily::SansSerif,
                18.0,
                FontStyle::Normal,
            ))
            .draw()?;
    } else {
        // Grid lines only
        for x in grid_ticks(x_min, x_max, 10) {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x, y_lo), (x, y_hi)],
                BLACK.mix(0.08),
            )))?;
        }
        for y in grid_ticks(y_lo, y_hi, 8) {
            chart.draw_series(std::iter::once(PathElement::new(
                vec![(x_min, y), (x_max, y)],
                BLACK.mix(0.08),
            )))?;
        }
    }

    // Segment boundaries
    for x in curve.boundaries(points) {
        chart.draw_series(std::iter::once(PathElement::new(
            vec![(x, y_lo), (x, y_hi)],
            BLACK.mix(0.15),
        )))?;
    }

    let mut labelled_parabola = false;
    let mut labelled_line = false;
    for span in curve.spans() {
        let color = match span.kind {
            SegmentKind::Parabola => PARABOLA_COLOR,
            SegmentKind::Line => LINE_COLOR,
        };
        let style = ShapeStyle {
            color: color.to_rgba(),
            filled: false,
            stroke_width: 2,
        };
        let anno = chart.draw_series(LineSeries::new(
            points[span.start..span.end()].iter().copied(),
            style,
        ))?;
        let first_of_kind = match span.kind {
            SegmentKind::Parabola => !std::mem::replace(&mut labelled_parabola, true),
            SegmentKind::Line => !std::mem::replace(&mut labelled_line, true),
        };
        if first_of_kind && with_text {
            anno.label(span.kind.id())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 30, y)], color));
        }
    }

    if with_text {
        chart
            .configure_series_labels()
            .background_style(&WHITE.mix(0.7))
            .border_style(&BLACK.mix(0.3))
            .label_font(FontDesc::new(
                FontFamily::SansSerif,
                16.0,
                FontStyle::Normal,
            ))
            .position(SeriesLabelPosition::UpperLeft)
            .draw()?;
    }

    area.present()?;
    Ok(())
}
