//! Distribution statistics for classification diagnostics.
//!
//! Histogram and empirical CDF over values in [0, 1], beta distributions fitted
//! by moment matching, and the Kolmogorov-Smirnov distance with its p-value.

use std::f64::consts::PI;

use thiserror::Error;

/// Errors that can occur while computing statistics.
#[derive(Error, Debug, PartialEq)]
pub enum StatsError {
    #[error("empty input")]
    EmptyInput,

    #[error("sample lengths differ: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type for statistics operations.
pub type Result<T> = std::result::Result<T, StatsError>;

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEF: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

/// Natural log of the gamma function (Lanczos approximation).
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        return (PI / (PI * x).sin()).ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS_COEF
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS_COEF[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

fn ln_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

/// Continued fraction for the incomplete beta function (modified Lentz).
fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITER: usize = 300;
    const EPS: f64 = 3e-16;
    const FPMIN: f64 = 1e-300;

    let fix = |v: f64| if v.abs() < FPMIN { FPMIN } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / fix(1.0 - qab * x / qap);
    let mut h = d;

    for m in 1..=MAX_ITER {
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / fix(1.0 + aa * d);
        c = fix(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / fix(1.0 + aa * d);
        c = fix(1.0 + aa / c);
        let del = d * c;
        h *= del;

        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// Regularized incomplete beta function I_x(a, b).
pub fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let front = (a * x.ln() + b * (1.0 - x).ln() - ln_beta(a, b)).exp();
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

/// Shape parameters of a beta distribution on [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaParams {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaParams {
    pub fn new(alpha: f64, beta: f64) -> Result<Self> {
        if !(alpha.is_finite() && beta.is_finite() && alpha > 0.0 && beta > 0.0) {
            return Err(StatsError::InvalidParameter(format!(
                "beta shape must be positive, got alpha={}, beta={}",
                alpha, beta
            )));
        }
        Ok(Self { alpha, beta })
    }

    /// Density; zero outside the open unit interval.
    pub fn pdf(&self, x: f64) -> f64 {
        if x <= 0.0 || x >= 1.0 {
            return 0.0;
        }
        ((self.alpha - 1.0) * x.ln() + (self.beta - 1.0) * (1.0 - x).ln()
            - ln_beta(self.alpha, self.beta))
        .exp()
    }

    pub fn cdf(&self, x: f64) -> f64 {
        regularized_incomplete_beta(self.alpha, self.beta, x)
    }

    /// Quantile function, found by bisection on the CDF.
    pub fn ppf(&self, p: f64) -> f64 {
        if p <= 0.0 {
            return 0.0;
        }
        if p >= 1.0 {
            return 1.0;
        }
        let (mut lo, mut hi) = (0.0f64, 1.0f64);
        for _ in 0..200 {
            let mid = 0.5 * (lo + hi);
            if self.cdf(mid) < p {
                lo = mid;
            } else {
                hi = mid;
            }
            if hi - lo < 1e-14 {
                break;
            }
        }
        0.5 * (lo + hi)
    }

    /// `points` evenly spaced x values between the `1/points` and
    /// `1 - 1/points` quantiles.
    pub fn quantile_grid(&self, points: usize) -> Vec<f64> {
        if points == 0 {
            return Vec::new();
        }
        let tail = 1.0 / points as f64;
        let start = self.ppf(tail);
        let end = self.ppf(1.0 - tail);
        if points == 1 {
            return vec![start];
        }
        let step = (end - start) / (points - 1) as f64;
        (0..points).map(|i| start + step * i as f64).collect()
    }
}

/// Beta parameters matching a mean and variance on [0, 1].
pub fn moment_match(mean: f64, var: f64) -> Result<BetaParams> {
    if !(mean > 0.0 && mean < 1.0) {
        return Err(StatsError::InvalidParameter(format!(
            "mean must lie in (0, 1), got {}",
            mean
        )));
    }
    if !(var > 0.0) {
        return Err(StatsError::InvalidParameter(format!(
            "variance must be positive, got {}",
            var
        )));
    }
    let ml = mean;
    let um = 1.0 - mean;
    let alpha = (mean * ((ml * um) / var - 1.0)).abs();
    BetaParams::new(alpha, alpha * (um / ml))
}

/// Mean and sample variance.
pub fn mean_variance(values: &[f64]) -> Result<(f64, f64)> {
    if values.is_empty() {
        return Err(StatsError::EmptyInput);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = if values.len() > 1 {
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)
    } else {
        0.0
    };
    Ok((mean, var))
}

/// Counts of values in `(k/bins, (k+1)/bins]`.
///
/// Values at or below 0 fall in the first bin, values above 1 in the last.
pub fn histogram(data: &[f64], bins: usize) -> Vec<usize> {
    let mut hist = vec![0usize; bins];
    if bins == 0 {
        return hist;
    }
    let last = bins as isize - 1;
    for &x in data {
        let idx = ((x * bins as f64).ceil() as isize - 1).clamp(0, last);
        hist[idx as usize] += 1;
    }
    hist
}

/// Cumulative histogram normalized to end at 1.
pub fn empirical_cdf(data: &[f64], bins: usize) -> Result<Vec<f64>> {
    if data.is_empty() || bins == 0 {
        return Err(StatsError::EmptyInput);
    }
    let total = data.len() as f64;
    let mut cum = 0usize;
    Ok(histogram(data, bins)
        .into_iter()
        .map(|count| {
            cum += count;
            cum as f64 / total
        })
        .collect())
}

/// Complementary Kolmogorov distribution Q_KS(lambda).
pub fn ks_pvalue(lambda: f64) -> f64 {
    const EPS1: f64 = 0.001;
    const EPS2: f64 = 1.0e-8;

    let a2 = -2.0 * lambda * lambda;
    let mut fac = 2.0;
    let mut sum = 0.0;
    let mut prev = 0.0;

    for j in 1..=100 {
        let j = j as f64;
        let term = fac * (a2 * j * j).exp();
        sum += term;
        if term.abs() <= EPS1 * prev || term.abs() <= EPS2 * sum {
            return sum;
        }
        fac = -fac;
        prev = term.abs();
    }
    1.0
}

/// Outcome of a Kolmogorov-Smirnov comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KsResult {
    /// Largest absolute difference between the two curves
    pub d: f64,
    pub p_value: f64,
}

/// Compare two equally sized CDF curves.
pub fn ks_test(a: &[f64], b: &[f64]) -> Result<KsResult> {
    if a.len() != b.len() {
        return Err(StatsError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    if a.is_empty() {
        return Err(StatsError::EmptyInput);
    }

    let d = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f64, f64::max);

    let (n1, n2) = (a.len() as f64, b.len() as f64);
    let en = (n1 * n2 / (n1 + n2)).sqrt();

    Ok(KsResult {
        d,
        p_value: ks_pvalue((en + 0.23 / en) * d),
    })
}

/// A beta distribution fitted to samples, with its goodness of fit.
#[derive(Debug, Clone, PartialEq)]
pub struct BetaFit {
    pub params: BetaParams,
    /// Right bin edges `1/bins ..= 1`
    pub xaxis: Vec<f64>,
    pub ecdf: Vec<f64>,
    pub model_cdf: Vec<f64>,
    pub ks: KsResult,
}

/// Fit a beta distribution to samples in [0, 1] by moment matching and test
/// the empirical CDF against it.
pub fn fit_beta(values: &[f64], bins: usize) -> Result<BetaFit> {
    let (mean, var) = mean_variance(values)?;
    let params = moment_match(mean, var)?;

    let ecdf = empirical_cdf(values, bins)?;
    let xaxis: Vec<f64> = (1..=bins).map(|i| i as f64 / bins as f64).collect();
    let model_cdf: Vec<f64> = xaxis.iter().map(|&x| params.cdf(x)).collect();
    let ks = ks_test(&ecdf, &model_cdf)?;

    Ok(BetaFit {
        params,
        xaxis,
        ecdf,
        model_cdf,
        ks,
    })
}
