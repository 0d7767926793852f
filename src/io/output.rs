use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::{GrayImage, Luma};
use serde::Serialize;

use crate::io::input::MicrographRecord;
use crate::io::npy::write_points;
use crate::processing::correct::{Edge, Layer};
use crate::processing::filters::ImageF32;
use crate::processing::spline::VesicleSplines;

/// Half-width of the square drawn for each pick in diagnostic renders.
const MARKER_RADIUS: i64 = 4;

pub fn spline_file_name(uid: u64, vesicle: usize, layer: Layer) -> String {
    format!("{}_vesicle_{}_{}.npy", uid, vesicle, layer.name())
}

/// Writes the three layer splines of every fully fitted vesicle. Returns the
/// number of vesicles written.
pub fn write_vesicle_splines(dir: &Path, uid: u64, splines: &[VesicleSplines]) -> Result<usize> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {:?}", dir))?;
    let mut written = 0;
    for vesicle in splines.iter().filter(|v| v.all_fitted()) {
        for layer in Layer::ALL {
            if let Some(points) = vesicle.get(layer).points() {
                write_points(dir.join(spline_file_name(uid, vesicle.vesicle, layer)), points)?;
            }
        }
        written += 1;
    }
    Ok(written)
}

/// One row of the aggregate pick table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickRecord {
    pub micrograph_uid: u64,
    pub exp_group_id: u32,
    pub micrograph_path: String,
    pub micrograph_shape_y: u32,
    pub micrograph_shape_x: u32,
    pub center_x_frac: f32,
    pub center_y_frac: f32,
    #[serde(rename = "micrograph_psize_A")]
    pub micrograph_psize_a: f32,
}

/// One pick per fitted spline sample, all layers, in vesicle order.
pub fn pick_records(
    record: &MicrographRecord,
    image: &ImageF32,
    psize: f64,
    splines: &[VesicleSplines],
) -> Vec<PickRecord> {
    let path = record.path.to_string_lossy().into_owned();
    splines
        .iter()
        .flat_map(|v| v.fitted_points())
        .map(|p| PickRecord {
            micrograph_uid: record.uid,
            exp_group_id: record.exp_group_id,
            micrograph_path: path.clone(),
            micrograph_shape_y: image.h as u32,
            micrograph_shape_x: image.w as u32,
            center_x_frac: (p.x / image.w as f64) as f32,
            center_y_frac: (p.y / image.h as f64) as f32,
            micrograph_psize_a: psize as f32,
        })
        .collect()
}

pub fn write_pick_table(path: &Path, rows: &[PickRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create pick table {:?}", path))?;
    if rows.is_empty() {
        wtr.write_record([
            "micrograph_uid",
            "exp_group_id",
            "micrograph_path",
            "micrograph_shape_y",
            "micrograph_shape_x",
            "center_x_frac",
            "center_y_frac",
            "micrograph_psize_A",
        ])?;
    }
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Grey render of `image` with every refined point of `edges` stamped as a
/// 9×9 block at the image maximum, linearly scaled to 8 bits.
pub fn render_picks(image: &ImageF32, edges: &[Edge]) -> GrayImage {
    let mut canvas = image.clone();
    let (lo, hi) = image.min_max().unwrap_or((0.0, 0.0));

    for p in edges.iter().flatten().flat_map(|t| t.points()) {
        let (px, py) = (p.x as i64, p.y as i64);
        for dy in -MARKER_RADIUS..=MARKER_RADIUS {
            for dx in -MARKER_RADIUS..=MARKER_RADIUS {
                let (x, y) = (px + dx, py + dy);
                if canvas.get_checked(x, y).is_some() {
                    canvas.set(x as usize, y as usize, hi);
                }
            }
        }
    }

    let scale = if hi > lo { 255.0 / (hi - lo) } else { 0.0 };
    GrayImage::from_fn(image.w as u32, image.h as u32, |x, y| {
        let v = canvas.get(x as usize, y as usize);
        Luma([((v - lo) * scale).round().clamp(0.0, 255.0) as u8])
    })
}

pub fn write_pick_render(path: &Path, image: &ImageF32, edges: &[Edge]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("failed to create {:?}", parent))?;
    }
    render_picks(image, edges)
        .save(path)
        .with_context(|| format!("failed to write render {:?}", path))
}

#[cfg(test)]
mod output_tests {
    use super::*;
    use crate::io::npy::read_points;
    use crate::processing::correct::RefinedTriplet;
    use crate::processing::geometry::Point;
    use crate::processing::spline::SplineOutcome;
    use crate::error::RepickError;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn record() -> MicrographRecord {
        MicrographRecord {
            uid: 99,
            exp_group_id: 3,
            path: PathBuf::from("mics/99.mrc"),
        }
    }

    fn vesicle(id: usize, outer: SplineOutcome) -> VesicleSplines {
        VesicleSplines {
            vesicle: id,
            inner: SplineOutcome::Fitted(vec![Point::new(10.0, 20.0)]),
            intermembrane: SplineOutcome::Fitted(vec![Point::new(11.0, 21.0)]),
            outer,
        }
    }

    #[test]
    fn test_spline_files_only_for_complete_vesicles() {
        let dir = tempdir().unwrap();
        let splines = vec![
            vesicle(0, SplineOutcome::Fitted(vec![Point::new(12.0, 22.0)])),
            vesicle(
                1,
                SplineOutcome::Skipped(RepickError::FittingFailure("test".to_string())),
            ),
        ];
        let written = write_vesicle_splines(dir.path(), 99, &splines).unwrap();
        assert_eq!(written, 1);

        let outer = dir.path().join("99_vesicle_0_outer.npy");
        assert_eq!(read_points(&outer).unwrap(), vec![Point::new(12.0, 22.0)]);
        assert!(dir.path().join("99_vesicle_0_intermembrane.npy").exists());
        assert!(!dir.path().join("99_vesicle_1_inner.npy").exists());
    }

    #[test]
    fn test_pick_records_are_fractions() {
        let image = ImageF32::new(100, 50);
        let splines = vec![vesicle(0, SplineOutcome::Fitted(vec![Point::new(50.0, 25.0)]))];
        let rows = pick_records(&record(), &image, 0.8, &splines);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].center_x_frac, 0.1);
        assert_eq!(rows[0].center_y_frac, 0.4);
        assert_eq!(rows[2].center_x_frac, 0.5);
        assert_eq!(rows[2].micrograph_shape_y, 50);
        assert_eq!(rows[2].micrograph_path, "mics/99.mrc");
    }

    #[test]
    fn test_pick_table_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("picks.csv");
        let image = ImageF32::new(10, 10);
        let splines = vec![vesicle(0, SplineOutcome::Fitted(vec![Point::new(5.0, 5.0)]))];
        write_pick_table(&path, &pick_records(&record(), &image, 1.0, &splines)).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "micrograph_uid,exp_group_id,micrograph_path,micrograph_shape_y,\
             micrograph_shape_x,center_x_frac,center_y_frac,micrograph_psize_A"
        );
        assert_eq!(lines.count(), 3);

        let empty = dir.path().join("empty.csv");
        write_pick_table(&empty, &[]).unwrap();
        assert_eq!(fs::read_to_string(&empty).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_render_marks_picks() {
        let mut image = ImageF32::new(20, 20);
        image.set(0, 0, 2.0);
        let point = Point::new(10.0, 10.0);
        let edges = vec![vec![RefinedTriplet {
            inner: point,
            mid: point,
            outer: point,
        }]];
        let render = render_picks(&image, &edges);
        assert_eq!(render.get_pixel(0, 0)[0], 255);
        assert_eq!(render.get_pixel(6, 14)[0], 255);
        assert_eq!(render.get_pixel(10, 10)[0], 255);
        assert_eq!(render.get_pixel(5, 10)[0], 0);
        assert_eq!(render.get_pixel(15, 10)[0], 0);
    }
}
