use crate::error::RepickError;
use crate::processing::geometry::{signed_area, Point};

/// One vesicle boundary as picked by the upstream segmentation, logically
/// closed (the last point connects back to the first).
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    pub id: usize,
    pub points: Vec<Point>,
    pub centroid: (f64, f64),
}

impl Contour {
    pub fn new(id: usize, points: Vec<Point>) -> Self {
        let centroid = Self::compute_centroid(&points);
        Contour {
            id,
            points,
            centroid,
        }
    }

    pub fn compute_centroid(points: &[Point]) -> (f64, f64) {
        if points.is_empty() {
            return (0.0, 0.0);
        }
        let (sum_x, sum_y) = points
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        let n = points.len() as f64;
        (sum_x / n, sum_y / n)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sorts points by ascending polar angle around the centroid. This is the
    /// canonical orientation expected by the profiler. Contours with deep
    /// folds may come out interleaved.
    pub fn sort_by_angle(&mut self) {
        let (cx, cy) = self.centroid;
        self.points.sort_by(|a, b| {
            let angle_a = (a.y - cy).atan2(a.x - cx);
            let angle_b = (b.y - cy).atan2(b.x - cx);
            angle_a.total_cmp(&angle_b)
        });
    }

    /// Angle-sorts the contour and keeps a sparse subset in which every point
    /// is at least `spacing` Å from the previously kept one. The first
    /// sorted point is always kept.
    pub fn downsample(&self, spacing: f64, psize: f64) -> Contour {
        let mut sorted = self.clone();
        sorted.sort_by_angle();

        let mut kept: Vec<Point> = Vec::with_capacity(sorted.points.len());
        for p in sorted.points {
            match kept.last() {
                Some(last) if (p - last).norm() * psize < spacing => {}
                _ => kept.push(p),
            }
        }

        Contour::new(self.id, kept)
    }

    pub fn signed_area(&self) -> f64 {
        signed_area(&self.points)
    }

    /// Rejects contours whose traversal would put the edge normal on the
    /// wrong side of the membrane. Degenerate (zero-area) contours fail too.
    pub fn validate_orientation(&self) -> Result<(), RepickError> {
        let area = self.signed_area();
        if area > 0.0 {
            Ok(())
        } else {
            Err(RepickError::Orientation { area })
        }
    }
}
