use std::f64::consts::PI;

use crate::processing::correct::{Edge, RefinedTriplet};
use crate::processing::filters::ImageF32;
use crate::processing::geometry::Point;

/// Points on a circle at ascending angles `2πi/n`, starting on the +x axis.
pub fn generate_circle_points(radius: f64, num_points: usize, centre: (f64, f64)) -> Vec<Point> {
    (0..num_points)
        .map(|i| {
            let theta = 2.0 * PI * (i as f64) / (num_points as f64);
            Point::new(
                centre.0 + radius * theta.cos(),
                centre.1 + radius * theta.sin(),
            )
        })
        .collect()
}

/// Builds an edge whose intermembrane and outer layers are the given inner
/// points shifted by 3 and 6 px along y.
pub fn triplets_from_inner(inner: &[Point]) -> Edge {
    inner
        .iter()
        .map(|p| RefinedTriplet {
            inner: *p,
            mid: p + Point::new(0.0, 3.0),
            outer: p + Point::new(0.0, 6.0),
        })
        .collect()
}

fn gaussian(d: f64, sigma: f64) -> f64 {
    (-(d * d) / (2.0 * sigma * sigma)).exp()
}

/// Synthetic vesicle: two dark leaflets at `radius ± half_separation` with a
/// faint bright band between them, on a zero background.
pub fn vesicle_image(
    w: usize,
    h: usize,
    centre: (f64, f64),
    radius: f64,
    half_separation: f64,
) -> ImageF32 {
    let mut img = ImageF32::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let r = ((x as f64 - centre.0).powi(2) + (y as f64 - centre.1).powi(2)).sqrt();
            let dark = gaussian(r - radius + half_separation, 4.0)
                + gaussian(r - radius - half_separation, 4.0);
            let bright = gaussian(r - radius, 4.0);
            img.set(x, y, (0.6 * bright - dark) as f32);
        }
    }
    img
}
