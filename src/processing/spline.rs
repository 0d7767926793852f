//! Closed cubic splines through refined membrane points, with optional
//! restriction to the arcs that are actually supported by nearby picks.

use crate::error::{RepickError, RepickResult};
use crate::processing::correct::{Edge, Layer};
use crate::processing::geometry::Point;

/// Periodic cubic fitting needs `degree + 1` points.
pub const MIN_SPLINE_POINTS: usize = 4;

/// Whether spline output is cut down to well-supported arcs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SupportSeparation {
    /// Return every sample of the closed curve.
    Unrestricted,
    /// Keep only arcs whose consecutive outer-leaflet picks are closer than
    /// this many Å.
    Within(f64),
}

impl SupportSeparation {
    /// Maps the command-line convention (`-1` disables restriction).
    pub fn from_cli(value: f64) -> Self {
        if value == -1.0 {
            SupportSeparation::Unrestricted
        } else {
            SupportSeparation::Within(value)
        }
    }
}

/// Solve a tridiagonal system with the Thomas algorithm.
/// `lower[i - 1]` and `upper[i]` are the off-diagonal entries of row `i`.
pub fn solve_tridiagonal(
    lower: &[f64],
    diag: &[f64],
    upper: &[f64],
    rhs: &[f64],
) -> RepickResult<Vec<f64>> {
    let n = diag.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];

    if diag[0].abs() < 1e-14 {
        return Err(RepickError::FittingFailure(
            "singular tridiagonal system".to_string(),
        ));
    }
    if n > 1 {
        c_prime[0] = upper[0] / diag[0];
    }
    d_prime[0] = rhs[0] / diag[0];

    for i in 1..n {
        let denom = diag[i] - lower[i - 1] * c_prime[i - 1];
        if denom.abs() < 1e-14 {
            return Err(RepickError::FittingFailure(
                "singular tridiagonal system".to_string(),
            ));
        }
        if i < n - 1 {
            c_prime[i] = upper[i] / denom;
        }
        d_prime[i] = (rhs[i] - lower[i - 1] * d_prime[i - 1]) / denom;
    }

    let mut x = vec![0.0; n];
    x[n - 1] = d_prime[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d_prime[i] - c_prime[i] * x[i + 1];
    }
    Ok(x)
}

/// Solve a cyclic tridiagonal system (corner entries `corner` at `(0, n-1)`
/// and `(n-1, 0)`) via Sherman-Morrison on top of the Thomas algorithm.
fn solve_cyclic_tridiagonal(
    lower: &[f64],
    diag: &[f64],
    upper: &[f64],
    corner: f64,
    rhs: &[f64],
) -> RepickResult<Vec<f64>> {
    let n = diag.len();
    let gamma = -diag[0];
    let mut modified = diag.to_vec();
    modified[0] -= gamma;
    modified[n - 1] -= corner * corner / gamma;

    let x = solve_tridiagonal(lower, &modified, upper, rhs)?;
    let mut u = vec![0.0; n];
    u[0] = gamma;
    u[n - 1] = corner;
    let z = solve_tridiagonal(lower, &modified, upper, &u)?;

    let denom = 1.0 + z[0] + corner * z[n - 1] / gamma;
    if denom.abs() < 1e-14 {
        return Err(RepickError::FittingFailure(
            "singular cyclic system".to_string(),
        ));
    }
    let fact = (x[0] + corner * x[n - 1] / gamma) / denom;
    Ok(x.iter().zip(&z).map(|(xi, zi)| xi - fact * zi).collect())
}

/// Per-segment polynomial `a + b·dt + c·dt² + d·dt³`.
#[derive(Debug, Clone, Copy)]
struct Cubic {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
}

impl Cubic {
    #[inline]
    fn eval(&self, dt: f64) -> f64 {
        self.a + dt * (self.b + dt * (self.c + dt * self.d))
    }
}

fn periodic_coefficients(knots: &[f64], y: &[f64]) -> RepickResult<Vec<Cubic>> {
    let n = y.len();
    let h: Vec<f64> = knots.windows(2).map(|w| w[1] - w[0]).collect();
    let slope = |i: usize| (y[(i + 1) % n] - y[i]) / h[i];

    let mut lower = vec![0.0; n - 1];
    let mut diag = vec![0.0; n];
    let mut upper = vec![0.0; n - 1];
    let mut rhs = vec![0.0; n];
    for i in 0..n {
        let prev = (i + n - 1) % n;
        diag[i] = 2.0 * (h[prev] + h[i]);
        if i > 0 {
            lower[i - 1] = h[prev];
        }
        if i < n - 1 {
            upper[i] = h[i];
        }
        rhs[i] = 3.0 * (slope(i) - slope(prev));
    }

    let c = solve_cyclic_tridiagonal(&lower, &diag, &upper, h[n - 1], &rhs)?;

    Ok((0..n)
        .map(|i| {
            let next = (i + 1) % n;
            Cubic {
                a: y[i],
                b: slope(i) - h[i] * (2.0 * c[i] + c[next]) / 3.0,
                c: c[i],
                d: (c[next] - c[i]) / (3.0 * h[i]),
            }
        })
        .collect())
}

/// Closed interpolating cubic through a point loop, parametrised by
/// normalised chord length `u ∈ [0, 1)`.
#[derive(Debug, Clone)]
pub struct PeriodicSpline {
    knots: Vec<f64>,
    x: Vec<Cubic>,
    y: Vec<Cubic>,
}

impl PeriodicSpline {
    pub fn fit(points: &[Point]) -> RepickResult<Self> {
        if points.len() < MIN_SPLINE_POINTS {
            return Err(RepickError::InsufficientData {
                required: MIN_SPLINE_POINTS,
                actual: points.len(),
                context: "periodic spline".to_string(),
            });
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(RepickError::NonFiniteCoordinates {
                context: "periodic spline".to_string(),
            });
        }

        let n = points.len();
        let chords: Vec<f64> = (0..n)
            .map(|i| (points[(i + 1) % n] - points[i]).norm())
            .collect();
        if let Some(i) = chords.iter().position(|&c| c <= f64::EPSILON) {
            return Err(RepickError::FittingFailure(format!(
                "points {} and {} coincide",
                i,
                (i + 1) % n
            )));
        }
        let total: f64 = chords.iter().sum();

        let mut knots = Vec::with_capacity(n + 1);
        let mut acc = 0.0;
        knots.push(0.0);
        for c in &chords[..n - 1] {
            acc += c;
            knots.push(acc / total);
        }
        knots.push(1.0);

        let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
        Ok(Self {
            x: periodic_coefficients(&knots, &xs)?,
            y: periodic_coefficients(&knots, &ys)?,
            knots,
        })
    }

    /// Position at parameter `u`, wrapped into `[0, 1)`.
    pub fn eval(&self, u: f64) -> Point {
        let u = u.rem_euclid(1.0);
        let seg = self
            .knots
            .partition_point(|&k| k <= u)
            .saturating_sub(1)
            .min(self.x.len() - 1);
        let dt = u - self.knots[seg];
        Point::new(self.x[seg].eval(dt), self.y[seg].eval(dt))
    }

    /// `density` samples at evenly spaced parameters `k / density`.
    pub fn sample(&self, density: usize) -> Vec<Point> {
        (0..density)
            .map(|k| self.eval(k as f64 / density as f64))
            .collect()
    }
}

/// Index ranges `(start, end)` into the outer-leaflet loop (with its first
/// point repeated at the end) along which consecutive picks stay closer
/// than `separation` Å. Single-point runs are dropped.
pub fn support_intervals(outer: &[Point], separation: f64, psize: f64) -> Vec<(usize, usize)> {
    let closed: Vec<Point> = outer.iter().chain(outer.first()).cloned().collect();
    let limit = separation * separation;

    let mut intervals = Vec::new();
    let (mut start, mut end) = (0, 0);
    for j in 1..closed.len() {
        let d2 = psize * psize * (closed[j] - closed[end]).norm_squared();
        if d2 < limit {
            end = j;
        } else {
            if start != end {
                intervals.push((start, end));
            }
            start = j;
            end = j;
        }
    }
    if start != end {
        intervals.push((start, end));
    }
    intervals
}

fn nearest_sample(samples: &[Point], target: &Point) -> usize {
    samples
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(best, best_d), (i, s)| {
            let d = (s - target).norm_squared();
            if d < best_d {
                (i, d)
            } else {
                (best, best_d)
            }
        })
        .0
}

/// Concatenates the dense-sample runs between the samples nearest to each
/// interval's endpoints. `closed_points` is the layer's input loop with its
/// first point repeated. Samples are assumed to follow input order.
pub fn restrict_to_support(
    samples: &[Point],
    closed_points: &[Point],
    intervals: &[(usize, usize)],
) -> Vec<Point> {
    let Some(last) = samples.len().checked_sub(1) else {
        return Vec::new();
    };

    let mut supported = Vec::new();
    for &(start, end) in intervals {
        let mut idx1 = nearest_sample(samples, &closed_points[start]);
        let mut idx2 = nearest_sample(samples, &closed_points[end]);
        if idx1 == last {
            idx1 = 0;
        }
        if idx2 == 0 {
            idx2 = last;
        }
        supported.extend_from_slice(&samples[idx1.min(idx2)..=idx1.max(idx2)]);
    }
    supported
}

/// Result of fitting one layer of one vesicle.
#[derive(Debug)]
pub enum SplineOutcome {
    Fitted(Vec<Point>),
    Skipped(RepickError),
}

impl SplineOutcome {
    pub fn points(&self) -> Option<&[Point]> {
        match self {
            SplineOutcome::Fitted(points) => Some(points),
            SplineOutcome::Skipped(_) => None,
        }
    }
}

/// Spline outcomes for the three layers of one vesicle.
#[derive(Debug)]
pub struct VesicleSplines {
    pub vesicle: usize,
    pub inner: SplineOutcome,
    pub intermembrane: SplineOutcome,
    pub outer: SplineOutcome,
}

impl VesicleSplines {
    pub fn get(&self, layer: Layer) -> &SplineOutcome {
        match layer {
            Layer::Inner => &self.inner,
            Layer::Intermembrane => &self.intermembrane,
            Layer::Outer => &self.outer,
        }
    }

    pub fn all_fitted(&self) -> bool {
        Layer::ALL.iter().all(|&l| self.get(l).points().is_some())
    }

    pub fn fitted_points(&self) -> impl Iterator<Item = &Point> {
        Layer::ALL
            .into_iter()
            .filter_map(move |l| self.get(l).points())
            .flatten()
    }
}

fn fit_layer(
    points: &[Point],
    density: usize,
    intervals: Option<&[(usize, usize)]>,
) -> RepickResult<Vec<Point>> {
    let spline = PeriodicSpline::fit(points)?;
    let samples = spline.sample(density);
    Ok(match intervals {
        None => samples,
        Some(intervals) => {
            let closed: Vec<Point> = points.iter().chain(points.first()).cloned().collect();
            restrict_to_support(&samples, &closed, intervals)
        }
    })
}

/// Fits all three layers of a cleaned edge. Support arcs, if requested, are
/// derived from the outer leaflet and applied to every layer. A failing
/// layer is reported in its outcome and does not affect the others.
pub fn fit_vesicle(
    vesicle: usize,
    edge: &Edge,
    density: usize,
    support: SupportSeparation,
    psize: f64,
) -> VesicleSplines {
    let layer_points =
        |layer: Layer| -> Vec<Point> { edge.iter().map(|t| t.layer(layer)).collect() };

    let intervals = match support {
        SupportSeparation::Unrestricted => None,
        SupportSeparation::Within(sep) => {
            Some(support_intervals(&layer_points(Layer::Outer), sep, psize))
        }
    };

    let outcome = |layer: Layer| match fit_layer(&layer_points(layer), density, intervals.as_deref())
    {
        Ok(points) => SplineOutcome::Fitted(points),
        Err(e) => {
            log::debug!("vesicle {}: skipping {} spline: {}", vesicle, layer.name(), e);
            SplineOutcome::Skipped(e)
        }
    };

    VesicleSplines {
        vesicle,
        inner: outcome(Layer::Inner),
        intermembrane: outcome(Layer::Intermembrane),
        outer: outcome(Layer::Outer),
    }
}

/// Fits a closed spline through an unordered point cloud and returns the
/// distinct whole-pixel positions it passes through, sorted by `(x, y)`.
pub fn respline_points(points: &[Point], density: usize) -> RepickResult<Vec<(i64, i64)>> {
    let mut contour = crate::processing::contours::Contour::new(0, points.to_vec());
    contour.sort_by_angle();
    let spline = PeriodicSpline::fit(&contour.points)?;
    let mut pixels: Vec<(i64, i64)> = spline
        .sample(density)
        .iter()
        .map(|p| (p.x.round() as i64, p.y.round() as i64))
        .collect();
    pixels.sort_unstable();
    pixels.dedup();
    Ok(pixels)
}
