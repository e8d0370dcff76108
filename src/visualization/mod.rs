//! Diagnostic plots for classification analysis.
//!
//! Every chart is written as `<root>/<kind dir>/<prefix>_<label>.png` using the
//! plotters bitmap backend. The kind directory is created on demand.

use std::ops::Range;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::PlotConfig;
use crate::core::stats::BetaParams;
use crate::core::writers::{ensure_dir, is_plain_component, WriteError};

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("Failed to create plot directory: {0}")]
    Directory(#[from] WriteError),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("Invalid chart label: '{0}'")]
    InvalidLabel(String),

    #[error("Empty input: {0}")]
    EmptyInput(&'static str),

    #[error("Length mismatch: {what} has {found} values, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

type Chart<'a, 'b> = ChartContext<'a, BitMapBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// The chart kinds, each with its own output directory and file prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PlotKind {
    Pdf,
    Cdf,
    BetaPdf,
    BetaCdf,
    Ks,
    Oar,
}

impl PlotKind {
    pub fn dir_name(self) -> &'static str {
        match self {
            PlotKind::Pdf => "PDF",
            PlotKind::Cdf => "CDF",
            PlotKind::BetaPdf => "betaPDF",
            PlotKind::BetaCdf => "betaCDF",
            PlotKind::Ks => "KStest",
            PlotKind::Oar => "OAR",
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            PlotKind::Pdf => "PDF",
            PlotKind::Cdf => "CDF",
            PlotKind::BetaPdf => "beta_PDF",
            PlotKind::BetaCdf => "beta_CDF",
            PlotKind::Ks => "KStest",
            PlotKind::Oar => "OAR",
        }
    }
}

/// Histogram bars over the bin edges `(k + 1) / edges` for `k` in `0..edges`.
///
/// Returns `(left, right, count)` per bin. Bins are half-open except the last,
/// values outside the edges are not counted.
pub fn histogram_bars(values: &[f64], edges: usize) -> Vec<(f64, f64, usize)> {
    let bounds: Vec<f64> = (0..edges).map(|k| (k as f64 + 1.0) / edges as f64).collect();
    let mut bars: Vec<(f64, f64, usize)> = bounds.windows(2).map(|w| (w[0], w[1], 0)).collect();
    let n = bars.len();

    for &v in values {
        if let Some(i) = bars.iter().position(|&(lo, hi, _)| v >= lo && v < hi) {
            bars[i].2 += 1;
        } else if n > 0 && v == bars[n - 1].1 {
            bars[n - 1].2 += 1;
        }
    }
    bars
}

/// One-against-rest layout: the rest distances split into series of `chunk`
/// values, element `j` of every series drawn at `x = j` next to self sample `j`.
pub fn oar_points(rest: &[f64], chunk: usize) -> Vec<(f64, f64)> {
    rest.chunks(chunk.max(1))
        .flat_map(|group| group.iter().enumerate().map(|(j, &v)| (j as f64, v)))
        .collect()
}

fn padded_range(lo: f64, hi: f64) -> Range<f64> {
    if (hi - lo).abs() < f64::EPSILON {
        (lo - 1.0)..(hi + 1.0)
    } else {
        let pad = (hi - lo) * 0.05;
        (lo - pad)..(hi + pad)
    }
}

fn bounds(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

fn check_len(what: &'static str, expected: usize, values: &[f64]) -> Result<()> {
    if values.len() != expected {
        return Err(VisualizationError::LengthMismatch {
            what,
            expected,
            found: values.len(),
        });
    }
    Ok(())
}

/// Renders diagnostic charts under a fixed output root.
#[derive(Debug, Clone)]
pub struct PlotRenderer {
    root: PathBuf,
    width: u32,
    height: u32,
    pdf_bins: usize,
    beta_bins: usize,
    oar_chunk: usize,
    annotate: bool,
}

impl PlotRenderer {
    pub fn new(config: &PlotConfig) -> Self {
        Self {
            root: config.output_root.clone(),
            width: config.width,
            height: config.height,
            pdf_bins: config.pdf_bins,
            beta_bins: config.beta_bins,
            oar_chunk: config.oar_chunk,
            annotate: config.annotate,
        }
    }

    /// Same settings, different output root.
    pub fn with_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.root = root.into();
        self
    }

    /// Output path of a chart. Creates the kind directory.
    pub fn target(&self, kind: PlotKind, label: &str) -> Result<PathBuf> {
        if !is_plain_component(label) {
            return Err(VisualizationError::InvalidLabel(label.to_string()));
        }
        let dir = self.root.join(kind.dir_name());
        ensure_dir(&dir)?;
        Ok(dir.join(format!("{}_{}.png", kind.prefix(), label)))
    }

    fn area<'p>(&self, path: &'p Path) -> Result<DrawingArea<BitMapBackend<'p>, Shift>> {
        let root = BitMapBackend::new(path, (self.width, self.height)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;
        Ok(root)
    }

    fn chart<'a, 'b>(
        &self,
        root: &'a DrawingArea<BitMapBackend<'b>, Shift>,
        title: &str,
        x: Range<f64>,
        y: Range<f64>,
        x_desc: &str,
        y_desc: &str,
    ) -> Result<Chart<'a, 'b>> {
        let mut builder = ChartBuilder::on(root);
        builder.margin(10);
        if self.annotate {
            builder
                .caption(title, ("sans-serif", 20))
                .x_label_area_size(35)
                .y_label_area_size(45);
        }

        let mut chart = builder.build_cartesian_2d(x, y).map_err(plot_err)?;

        if self.annotate {
            chart
                .configure_mesh()
                .x_desc(x_desc)
                .y_desc(y_desc)
                .draw()
                .map_err(plot_err)?;
        }
        Ok(chart)
    }

    fn draw_legend<'a, 'b: 'a>(&self, chart: &mut Chart<'a, 'b>) -> Result<()> {
        if self.annotate {
            chart
                .configure_series_labels()
                .position(SeriesLabelPosition::LowerRight)
                .background_style(&WHITE.mix(0.8))
                .border_style(&BLACK)
                .draw()
                .map_err(plot_err)?;
        }
        Ok(())
    }

    /// Histogram of `values` over `pdf_bins` edges in (0, 1].
    pub fn plot_pdf(&self, values: &[f64], label: &str) -> Result<PathBuf> {
        if values.is_empty() {
            return Err(VisualizationError::EmptyInput("PDF values"));
        }

        let bars = histogram_bars(values, self.pdf_bins);
        let max_count = bars.iter().map(|b| b.2).max().unwrap_or(0).max(1) as f64;

        let path = self.target(PlotKind::Pdf, label)?;
        let file = path.clone();
        let root = self.area(&file)?;
        let mut chart = self.chart(
            &root,
            &format!("{} PDF", label),
            0.0..1.0,
            0.0..max_count * 1.1,
            "value",
            "count",
        )?;

        let fill = GREEN.mix(0.5).filled();
        chart
            .draw_series(bars.iter().map(|&(lo, hi, count)| {
                let mid = (lo + hi) / 2.0;
                let half = (hi - lo) * 0.15;
                Rectangle::new([(mid - half, 0.0), (mid + half, count as f64)], fill)
            }))
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        Ok(path)
    }

    /// Empirical CDF of `values`: sorted values against `(i + 1) / n`.
    pub fn plot_cdf(&self, values: &[f64], label: &str) -> Result<PathBuf> {
        if values.is_empty() {
            return Err(VisualizationError::EmptyInput("CDF values"));
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n = sorted.len() as f64;
        let (lo, hi) = bounds(&sorted);

        let path = self.target(PlotKind::Cdf, label)?;
        let file = path.clone();
        let root = self.area(&file)?;
        let mut chart = self.chart(
            &root,
            &format!("{} CDF", label),
            padded_range(lo, hi),
            0.0..1.05,
            "u",
            "F(u)",
        )?;

        chart
            .draw_series(LineSeries::new(
                sorted.iter().enumerate().map(|(i, &v)| (v, (i as f64 + 1.0) / n)),
                &BLACK,
            ))
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        Ok(path)
    }

    fn plot_beta_curve(
        &self,
        kind: PlotKind,
        params: &BetaParams,
        label: &str,
        curve: impl Fn(&BetaParams, f64) -> f64,
        color: &RGBColor,
    ) -> Result<PathBuf> {
        let xs = params.quantile_grid(self.beta_bins);
        if xs.is_empty() {
            return Err(VisualizationError::EmptyInput("beta sample points"));
        }
        let points: Vec<(f64, f64)> = xs.iter().map(|&x| (x, curve(params, x))).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();
        let (x_lo, x_hi) = bounds(&xs);
        let (_, y_hi) = bounds(&ys);

        let title = format!(
            "{} {} (alpha = {}, beta = {})",
            label,
            if kind == PlotKind::BetaPdf { "beta PDF" } else { "beta CDF" },
            params.alpha,
            params.beta
        );

        let path = self.target(kind, label)?;
        let file = path.clone();
        let root = self.area(&file)?;
        let mut chart = self.chart(&root, &title, padded_range(x_lo, x_hi), 0.0..(y_hi.max(0.0) * 1.1 + 1e-9), "x", "f(x)")?;

        chart
            .draw_series(LineSeries::new(points, color))
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        Ok(path)
    }

    /// Beta density between the `1/bins` and `1 - 1/bins` quantiles.
    pub fn plot_beta_pdf(&self, params: &BetaParams, label: &str) -> Result<PathBuf> {
        self.plot_beta_curve(PlotKind::BetaPdf, params, label, |p, x| p.pdf(x), &BLACK)
    }

    /// Beta CDF over the same grid as [`Self::plot_beta_pdf`].
    pub fn plot_beta_cdf(&self, params: &BetaParams, label: &str) -> Result<PathBuf> {
        self.plot_beta_curve(PlotKind::BetaCdf, params, label, |p, x| p.cdf(x), &RED)
    }

    /// Hypothesized CDF against the empirical CDF on shared x values, with the
    /// fitted parameters and p-value in the title.
    pub fn plot_ks_test(
        &self,
        x: &[f64],
        empirical: &[f64],
        hypothesized: &[f64],
        params: &BetaParams,
        p_value: f64,
        label: &str,
    ) -> Result<PathBuf> {
        if x.is_empty() {
            return Err(VisualizationError::EmptyInput("KS x values"));
        }
        check_len("empirical CDF", x.len(), empirical)?;
        check_len("hypothesized CDF", x.len(), hypothesized)?;

        let (x_lo, x_hi) = bounds(x);
        let title = format!(
            "{} beta CDF (alpha = {:.4}, beta = {:.4}, p-value = {:.4})",
            label, params.alpha, params.beta, p_value
        );

        let path = self.target(PlotKind::Ks, label)?;
        let file = path.clone();
        let root = self.area(&file)?;
        let mut chart = self.chart(&root, &title, padded_range(x_lo, x_hi), 0.0..1.05, "x", "F(x)")?;

        let hypo = chart
            .draw_series(LineSeries::new(
                x.iter().copied().zip(hypothesized.iter().copied()),
                &BLACK,
            ))
            .map_err(plot_err)?;
        if self.annotate {
            hypo.label("hypoCDF")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));
        }

        let empi = chart
            .draw_series(LineSeries::new(
                x.iter().copied().zip(empirical.iter().copied()),
                &RED,
            ))
            .map_err(plot_err)?;
        if self.annotate {
            empi.label("empiCDF")
                .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));
        }

        self.draw_legend(&mut chart)?;
        root.present().map_err(plot_err)?;
        Ok(path)
    }

    /// Self distances as circles at `x = index`, rest distances as crosses,
    /// one series per `oar_chunk` values sharing the same x positions.
    pub fn plot_one_against_rest(&self, label: &str, one: &[f64], rest: &[f64]) -> Result<PathBuf> {
        if one.is_empty() {
            return Err(VisualizationError::EmptyInput("one-against-rest self distances"));
        }

        let rest_points = oar_points(rest, self.oar_chunk);
        let columns = rest_points.iter().map(|p| p.0 as usize + 1).max().unwrap_or(0).max(one.len());
        let y_max = one
            .iter()
            .copied()
            .chain(rest_points.iter().map(|p| p.1))
            .fold(f64::MIN, f64::max);
        let y_top = if y_max > 0.0 { y_max * 1.1 } else { 1.0 };

        let path = self.target(PlotKind::Oar, label)?;
        let file = path.clone();
        let root = self.area(&file)?;
        let mut chart = self.chart(
            &root,
            &format!("{} OAR", label),
            -1.0..columns as f64,
            -1.0..y_top,
            "sample",
            "distance",
        )?;

        chart
            .draw_series(
                one.iter()
                    .enumerate()
                    .map(|(i, &v)| Circle::new((i as f64, v), 3, BLUE.filled())),
            )
            .map_err(plot_err)?;
        chart
            .draw_series(rest_points.iter().map(|&p| Cross::new(p, 3, &BLACK)))
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn renderer(root: &Path) -> PlotRenderer {
        let config = PlotConfig {
            annotate: false,
            width: 320,
            height: 240,
            ..PlotConfig::default()
        };
        PlotRenderer::new(&config).with_root(root)
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(PlotKind::BetaPdf.dir_name(), "betaPDF");
        assert_eq!(PlotKind::BetaPdf.prefix(), "beta_PDF");
        assert_eq!(PlotKind::Ks.dir_name(), "KStest");
    }

    #[test]
    fn test_target_creates_kind_directory() {
        let dir = tempdir().unwrap();
        let path = renderer(dir.path()).target(PlotKind::Oar, "car").unwrap();
        assert_eq!(path, dir.path().join("OAR").join("OAR_car.png"));
        assert!(dir.path().join("OAR").is_dir());
    }

    #[test]
    fn test_histogram_bars() {
        let bars = histogram_bars(&[0.0, 0.3, 0.3, 0.6, 1.0], 4);
        // Edges 0.25, 0.5, 0.75, 1.0
        assert_eq!(bars.len(), 3);
        assert_eq!(bars.iter().map(|b| b.2).collect::<Vec<_>>(), vec![2, 1, 1]);
    }

    #[test]
    fn test_oar_points_chunking() {
        let rest: Vec<f64> = (0..9).map(|i| i as f64).collect();
        let points = oar_points(&rest, 3);

        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 0.0, 1.0, 2.0, 0.0, 1.0, 2.0]);
        assert_eq!(points[4], (1.0, 4.0));
    }

    #[test]
    fn test_label_must_be_plain_file_name() {
        let dir = tempdir().unwrap();
        let r = renderer(dir.path());

        assert!(matches!(
            r.target(PlotKind::Pdf, "../x"),
            Err(VisualizationError::InvalidLabel(_))
        ));
        assert!(matches!(r.plot_cdf(&[0.5], ""), Err(VisualizationError::InvalidLabel(_))));
        assert!(!dir.path().join("x.png").exists());
    }

    #[test]
    fn test_render_all_kinds() {
        let dir = tempdir().unwrap();
        let r = renderer(dir.path());
        let values: Vec<f64> = (1..40).map(|i| i as f64 / 40.0).collect();
        let params = BetaParams::new(2.0, 3.0).unwrap();

        let paths = vec![
            r.plot_pdf(&values, "a").unwrap(),
            r.plot_cdf(&values, "a").unwrap(),
            r.plot_beta_pdf(&params, "a").unwrap(),
            r.plot_beta_cdf(&params, "a").unwrap(),
            r.plot_ks_test(&values, &values, &values, &params, 0.5, "a").unwrap(),
            r.plot_one_against_rest("a", &values[..5], &values).unwrap(),
        ];

        for path in &paths {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(paths[2].ends_with("betaPDF/beta_PDF_a.png"));
        assert!(paths[4].ends_with("KStest/KStest_a.png"));
    }

    #[test]
    fn test_empty_input_rejected() {
        let dir = tempdir().unwrap();
        let r = renderer(dir.path());
        assert!(matches!(r.plot_pdf(&[], "x"), Err(VisualizationError::EmptyInput(_))));
        assert!(matches!(
            r.plot_one_against_rest("x", &[], &[1.0]),
            Err(VisualizationError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_ks_length_mismatch() {
        let dir = tempdir().unwrap();
        let params = BetaParams::new(1.0, 1.0).unwrap();
        let result = renderer(dir.path()).plot_ks_test(&[0.1, 0.2], &[0.1], &[0.1, 0.2], &params, 0.9, "x");
        assert!(matches!(result, Err(VisualizationError::LengthMismatch { .. })));
    }
}
