use std::collections::HashSet;

use nalgebra::Vector2;

use crate::processing::filters::ImageF32;
use crate::processing::geometry::{edge_normal, projected_distance, Pixel, Point};

/// Slack kept on either side of the reported window, in Å.
pub const PROFILE_MARGIN: i64 = 3;

/// Pixel intensities accumulated by signed offset (Å) from an edge.
///
/// Storage is a dense array over `[-half_window - 3, half_window + 3)`;
/// offsets outside that range are dropped on insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensityProfile {
    half_window: usize,
    sums: Vec<f64>,
    counts: Vec<u32>,
}

impl IntensityProfile {
    pub fn new(half_window: usize) -> Self {
        let len = 2 * (half_window + PROFILE_MARGIN as usize);
        Self {
            half_window,
            sums: vec![0.0; len],
            counts: vec![0; len],
        }
    }

    fn lowest_offset(&self) -> i64 {
        -(self.half_window as i64 + PROFILE_MARGIN)
    }

    fn slot(&self, offset: i64) -> Option<usize> {
        let lo = self.lowest_offset();
        let hi = self.half_window as i64 + PROFILE_MARGIN;
        (lo..hi).contains(&offset).then(|| (offset - lo) as usize)
    }

    /// Records one intensity. Returns `false` if the offset is out of range.
    pub fn add(&mut self, offset: i64, value: f64) -> bool {
        match self.slot(offset) {
            Some(i) => {
                self.sums[i] += value;
                self.counts[i] += 1;
                true
            }
            None => false,
        }
    }

    pub fn count(&self, offset: i64) -> usize {
        self.slot(offset).map_or(0, |i| self.counts[i] as usize)
    }

    pub fn total_count(&self) -> usize {
        self.counts.iter().map(|&c| c as usize).sum()
    }

    pub fn mean(&self, offset: i64) -> Option<f64> {
        let i = self.slot(offset)?;
        (self.counts[i] > 0).then(|| self.sums[i] / self.counts[i] as f64)
    }

    /// Offsets holding at least one sample, ascending.
    pub fn populated_offsets(&self) -> impl Iterator<Item = i64> + '_ {
        let lo = self.lowest_offset();
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &c)| c > 0)
            .map(move |(i, _)| lo + i as i64)
    }

    /// Mean intensity for every offset in `[-half_window, half_window]`,
    /// `0.0` where no pixel landed. Index `i` holds offset `i - half_window`.
    pub fn means(&self) -> Vec<f64> {
        let hw = self.half_window as i64;
        (-hw..=hw).map(|o| self.mean(o).unwrap_or(0.0)).collect()
    }
}

/// Bins the image intensities of `pixels` by their signed distance (Å) from
/// the line through `p1` and `p2`, measured along the edge normal.
/// Pixels outside the image are skipped.
pub fn bin_rectangle(
    image: &ImageF32,
    p1: &Point,
    p2: &Point,
    pixels: &HashSet<Pixel>,
    psize: f64,
    half_window: usize,
) -> IntensityProfile {
    let normal = edge_normal(p1, p2);
    let mut profile = IntensityProfile::new(half_window);

    for &(x, y) in pixels {
        let Some(value) = image.get_checked(x, y) else {
            continue;
        };
        let v = Vector2::new(x as f64 - p1.x, y as f64 - p1.y);
        let offset = (projected_distance(&v, &normal) * psize).round() as i64;
        profile.add(offset, value as f64);
    }
    profile
}

#[cfg(test)]
mod profile_tests {
    use super::*;
    use crate::processing::geometry::pixels_in_rectangle;
    use approx::assert_relative_eq;

    fn row_gradient(w: usize, h: usize) -> ImageF32 {
        let mut img = ImageF32::new(w, h);
        for y in 0..h {
            for x in 0..w {
                img.set(x, y, y as f32);
            }
        }
        img
    }

    #[test]
    fn test_horizontal_edge_bins_rows() {
        let img = row_gradient(64, 64);
        let p1 = Point::new(20.0, 30.0);
        let p2 = Point::new(30.0, 30.0);
        let pixels = pixels_in_rectangle(&p1, &p2);
        let hw = 25;
        let profile = bin_rectangle(&img, &p1, &p2, &pixels, 1.0, hw);
        let means = profile.means();

        assert_eq!(means.len(), 2 * hw + 1);
        // The rectangle covers rows 10..50. The normal is (0, -1), so row
        // `y` lands at offset `30 - y`, i.e. offsets -19..=20.
        for o in -19i64..=20 {
            assert_relative_eq!(means[(o + hw as i64) as usize], 30.0 - o as f64);
            assert_eq!(profile.count(o), 10);
        }
        assert_eq!(means[(21 + hw as i64) as usize], 0.0);
        assert_eq!(means[(-20 + hw as i64) as usize], 0.0);
        assert_eq!(profile.total_count(), 400);
    }

    #[test]
    fn test_offsets_stay_inside_window() {
        let img = row_gradient(80, 80);
        let p1 = Point::new(31.0, 44.0);
        let p2 = Point::new(40.0, 36.0);
        let pixels = pixels_in_rectangle(&p1, &p2);
        let hw = 5;
        let psize = 1.7;
        let profile = bin_rectangle(&img, &p1, &p2, &pixels, psize, hw);

        let normal = edge_normal(&p1, &p2);
        let mut expected = 0;
        for &(x, y) in &pixels {
            let v = Vector2::new(x as f64 - p1.x, y as f64 - p1.y);
            let off = (projected_distance(&v, &normal) * psize).round() as i64;
            if off >= -(hw as i64) - 3 && off < hw as i64 + 3 {
                expected += 1;
            }
        }
        assert_eq!(profile.total_count(), expected);
        assert!(profile.total_count() < pixels.len());
        for o in profile.populated_offsets() {
            assert!(o >= -(hw as i64) - 5 && o < hw as i64 + 5);
            assert!(o.abs() <= hw as i64 + 3);
        }
    }

    #[test]
    fn test_pixels_outside_image_are_skipped() {
        let img = row_gradient(16, 16);
        let p1 = Point::new(0.0, 2.0);
        let p2 = Point::new(10.0, 2.0);
        let pixels = pixels_in_rectangle(&p1, &p2);
        let profile = bin_rectangle(&img, &p1, &p2, &pixels, 1.0, 30);
        // Rows -18..22 requested, only rows 0..16 exist. Row `y` lands at
        // offset `2 - y`.
        assert_eq!(profile.total_count(), 10 * 16);
        assert_eq!(profile.mean(5), None);
        assert_relative_eq!(profile.mean(-3).unwrap(), 5.0);
    }

    #[test]
    fn test_add_rejects_out_of_range() {
        let mut profile = IntensityProfile::new(2);
        assert!(profile.add(-5, 1.0));
        assert!(profile.add(4, 1.0));
        assert!(!profile.add(5, 1.0));
        assert!(!profile.add(-6, 1.0));
        assert_eq!(profile.means(), vec![0.0; 5]);
        assert_eq!(profile.populated_offsets().collect::<Vec<_>>(), vec![-5, 4]);
    }
}
