use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use csv::ReaderBuilder;
use serde::Deserialize;

use crate::error::RepickError;
use crate::io::mrc::read_mrc;
use crate::io::npy::read_points;
use crate::processing::contours::Contour;
use crate::processing::filters::ImageF32;

/// Utility: detect whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open file for delimiter sniffing: {:?}",
            path.as_ref()
        )
    })?;
    let mut first_line = String::new();
    BufReader::new(file)
        .read_line(&mut first_line)
        .with_context(|| "failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();
    Ok(if tabs > commas { b'\t' } else { b',' })
}

/// Contour files for one micrograph: `{uid}*intermembrane.npy` in `dir`,
/// sorted by file name. An empty match is a [`RepickError::MissingInput`].
pub fn find_contour_files(dir: &Path, uid: u64) -> Result<Vec<PathBuf>> {
    let prefix = uid.to_string();
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to list contour directory {:?}", dir))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(&prefix) && name.ends_with("intermembrane.npy")
        })
        .map(|entry| entry.path())
        .collect();

    if files.is_empty() {
        return Err(RepickError::MissingInput {
            uid,
            dir: dir.to_path_buf(),
        }
        .into());
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Loads each file as one contour; ids follow file order.
pub fn load_contours(files: &[PathBuf]) -> Result<Vec<Contour>> {
    files
        .iter()
        .enumerate()
        .map(|(id, path)| {
            let points = read_points(path)
                .with_context(|| format!("failed to load contour {:?}", path))?;
            Ok(Contour::new(id, points))
        })
        .collect()
}

/// One row of the micrograph manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MicrographRecord {
    pub uid: u64,
    pub exp_group_id: u32,
    pub path: PathBuf,
}

pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<MicrographRecord>> {
    let path = path.as_ref();
    let delimiter = detect_delimiter(path)?;
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("failed to open manifest {:?}", path))?;

    reader
        .deserialize::<MicrographRecord>()
        .enumerate()
        .map(|(i, row)| row.with_context(|| format!("bad manifest row {} in {:?}", i + 1, path)))
        .collect()
}

/// A loaded micrograph. `psize` is the header pixel size when the format
/// carries one.
#[derive(Debug, Clone)]
pub struct Micrograph {
    pub image: ImageF32,
    pub psize: Option<f64>,
}

/// Where micrographs and their metadata come from.
pub trait MicrographSource: Sync {
    fn records(&self) -> Result<Vec<MicrographRecord>>;
    fn load(&self, record: &MicrographRecord) -> Result<Micrograph>;
}

/// Manifest CSV plus image files on the local file system.
#[derive(Debug, Clone)]
pub struct LocalMicrographSource {
    pub manifest: PathBuf,
    pub root: PathBuf,
}

impl LocalMicrographSource {
    pub fn new(manifest: PathBuf, root: PathBuf) -> Self {
        Self { manifest, root }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl MicrographSource for LocalMicrographSource {
    fn records(&self) -> Result<Vec<MicrographRecord>> {
        read_manifest(&self.manifest)
    }

    fn load(&self, record: &MicrographRecord) -> Result<Micrograph> {
        let path = self.resolve(&record.path);
        let is_mrc = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| matches!(e.to_ascii_lowercase().as_str(), "mrc" | "mrcs" | "map"))
            .unwrap_or(false);

        if is_mrc {
            let mrc = read_mrc(&path)?;
            return Ok(Micrograph {
                image: mrc.image,
                psize: mrc.psize,
            });
        }

        let decoded = image::open(&path)
            .with_context(|| format!("failed to decode micrograph {:?}", path))?
            .to_luma32f();
        let (w, h) = (decoded.width() as usize, decoded.height() as usize);
        let image = ImageF32::from_vec(w, h, decoded.into_raw())
            .with_context(|| format!("unexpected buffer size for {:?}", path))?;
        Ok(Micrograph { image, psize: None })
    }
}

#[cfg(test)]
mod input_tests {
    use super::*;
    use crate::io::npy::write_points;
    use crate::processing::geometry::Point;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_find_contour_files_filters_and_sorts() {
        let dir = tempdir().unwrap();
        for name in [
            "42_vesicle_1_intermembrane.npy",
            "42_vesicle_0_intermembrane.npy",
            "42_vesicle_0_inner.npy",
            "43_vesicle_0_intermembrane.npy",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let files = find_contour_files(dir.path(), 42).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "42_vesicle_0_intermembrane.npy",
                "42_vesicle_1_intermembrane.npy"
            ]
        );
    }

    #[test]
    fn test_missing_contours_are_typed() {
        let dir = tempdir().unwrap();
        let err = find_contour_files(dir.path(), 7).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RepickError>(),
            Some(RepickError::MissingInput { uid: 7, .. })
        ));
    }

    #[test]
    fn test_load_contours_assigns_ids() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("1_a_intermembrane.npy");
        let b = dir.path().join("1_b_intermembrane.npy");
        write_points(&a, &[Point::new(0.0, 0.0), Point::new(2.0, 0.0)]).unwrap();
        write_points(&b, &[Point::new(4.0, 4.0)]).unwrap();
        let contours = load_contours(&[a, b]).unwrap();
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[1].id, 1);
        assert_eq!(contours[0].centroid, (1.0, 0.0));
    }

    #[test]
    fn test_manifest_comma_and_tab() {
        let dir = tempdir().unwrap();
        let csv_path = dir.path().join("m.csv");
        let mut f = File::create(&csv_path).unwrap();
        writeln!(f, "uid,exp_group_id,path").unwrap();
        writeln!(f, "1001,2,mics/a.mrc").unwrap();
        writeln!(f, "1002, 2, mics/b.mrc").unwrap();
        drop(f);
        let records = read_manifest(&csv_path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].uid, 1002);
        assert_eq!(records[1].path, PathBuf::from("mics/b.mrc"));

        let tsv_path = dir.path().join("m.tsv");
        fs::write(&tsv_path, "uid\texp_group_id\tpath\n5\t1\tx.png\n").unwrap();
        assert_eq!(read_manifest(&tsv_path).unwrap()[0].exp_group_id, 1);
    }

    #[test]
    fn test_local_source_decodes_png() {
        let dir = tempdir().unwrap();
        let mut img = image::GrayImage::new(4, 3);
        img.put_pixel(1, 2, image::Luma([255]));
        img.save(dir.path().join("m.png")).unwrap();

        let source = LocalMicrographSource::new(dir.path().join("unused.csv"), dir.path().into());
        let record = MicrographRecord {
            uid: 1,
            exp_group_id: 0,
            path: PathBuf::from("m.png"),
        };
        let micrograph = source.load(&record).unwrap();
        assert_eq!((micrograph.image.w, micrograph.image.h), (4, 3));
        assert!((micrograph.image.get(1, 2) - 1.0).abs() < 1e-6);
        assert_eq!(micrograph.image.get(0, 0), 0.0);
        assert_eq!(micrograph.psize, None);
    }
}
