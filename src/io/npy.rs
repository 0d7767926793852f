//! Minimal reader/writer for the NumPy `.npy` format, limited to the 2-D
//! `(N, 2)` coordinate arrays exchanged with the picking tools.

use std::fs;
use std::path::Path;

use crate::error::{RepickError, RepickResult};
use crate::processing::geometry::Point;

const MAGIC: &[u8] = b"\x93NUMPY";

fn npy_error(path: &Path, message: impl Into<String>) -> RepickError {
    RepickError::Npy {
        path: path.to_path_buf(),
        message: message.into(),
    }
}

/// Element types accepted for coordinate arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F8,
    F4,
    I8,
    I4,
    I2,
    U1,
}

impl Dtype {
    fn parse(descr: &str) -> Option<Self> {
        match descr {
            "<f8" => Some(Dtype::F8),
            "<f4" => Some(Dtype::F4),
            "<i8" => Some(Dtype::I8),
            "<i4" => Some(Dtype::I4),
            "<i2" => Some(Dtype::I2),
            "|u1" => Some(Dtype::U1),
            _ => None,
        }
    }

    fn size(&self) -> usize {
        match self {
            Dtype::F8 | Dtype::I8 => 8,
            Dtype::F4 | Dtype::I4 => 4,
            Dtype::I2 => 2,
            Dtype::U1 => 1,
        }
    }

    fn decode(&self, b: &[u8]) -> f64 {
        match self {
            Dtype::F8 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
            Dtype::F4 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Dtype::I8 => i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64,
            Dtype::I4 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64,
            Dtype::I2 => i16::from_le_bytes([b[0], b[1]]) as f64,
            Dtype::U1 => b[0] as f64,
        }
    }
}

/// Value of `'key': ...` in the header dictionary, up to the next top-level
/// comma or closing brace.
fn header_value<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let start = header.find(&format!("'{}'", key))? + key.len() + 2;
    let rest = header[start..].trim_start().strip_prefix(':')?.trim_start();
    let end = if rest.starts_with('(') {
        rest.find(')')? + 1
    } else {
        rest.find(|c: char| c == ',' || c == '}')?
    };
    Some(rest[..end].trim())
}

fn parse_shape(value: &str) -> Option<Vec<usize>> {
    value
        .strip_prefix('(')?
        .strip_suffix(')')?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

/// Reads an `(N, 2)` array of `(x, y)` coordinates.
pub fn read_points<P: AsRef<Path>>(path: P) -> RepickResult<Vec<Point>> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| npy_error(path, e.to_string()))?;
    parse_points(&bytes).map_err(|m| npy_error(path, m))
}

fn parse_points(bytes: &[u8]) -> Result<Vec<Point>, String> {
    if bytes.len() < 10 || !bytes.starts_with(MAGIC) {
        return Err("missing NUMPY magic".to_string());
    }
    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated header".to_string());
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
            (len, 12)
        }
        v => return Err(format!("unsupported format version {}", v)),
    };
    let data_start = header_start + header_len;
    let header = bytes
        .get(header_start..data_start)
        .and_then(|h| std::str::from_utf8(h).ok())
        .ok_or("truncated or non-text header")?;

    let descr = header_value(header, "descr")
        .map(|d| d.trim_matches(|c: char| c == '\'' || c == '"'))
        .ok_or("header has no descr")?;
    let dtype = Dtype::parse(descr).ok_or_else(|| format!("unsupported dtype {}", descr))?;
    if header_value(header, "fortran_order") != Some("False") {
        return Err("only C-ordered arrays are supported".to_string());
    }
    let shape = header_value(header, "shape")
        .and_then(parse_shape)
        .ok_or("header has no valid shape")?;
    let rows = match shape.as_slice() {
        [n, 2] => *n,
        [0] => 0,
        other => return Err(format!("expected shape (N, 2), got {:?}", other)),
    };

    let data = &bytes[data_start..];
    let needed = rows
        .checked_mul(2 * dtype.size())
        .ok_or_else(|| format!("shape ({}, 2) is too large", rows))?;
    if data.len() < needed {
        return Err(format!(
            "expected {} data bytes, found {}",
            needed,
            data.len()
        ));
    }

    Ok(data[..needed]
        .chunks_exact(2 * dtype.size())
        .map(|row| {
            let (x, y) = row.split_at(dtype.size());
            Point::new(dtype.decode(x), dtype.decode(y))
        })
        .collect())
}

fn encode(descr: &str, rows: usize, body: Vec<u8>) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': ({}, 2), }}",
        descr, rows
    );
    // Magic, version and length take 10 bytes; pad so data is 64-byte aligned.
    let unpadded = 10 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut out = Vec::with_capacity(10 + header.len() + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend(body);
    out
}

/// Writes `(x, y)` coordinates as a little-endian `float64` `(N, 2)` array.
pub fn write_points<P: AsRef<Path>>(path: P, points: &[Point]) -> RepickResult<()> {
    let path = path.as_ref();
    let body = points
        .iter()
        .flat_map(|p| [p.x, p.y])
        .flat_map(f64::to_le_bytes)
        .collect();
    fs::write(path, encode("<f8", points.len(), body)).map_err(|e| npy_error(path, e.to_string()))
}

/// Writes integer pixel coordinates as a little-endian `int64` `(N, 2)` array.
pub fn write_pixels<P: AsRef<Path>>(path: P, pixels: &[(i64, i64)]) -> RepickResult<()> {
    let path = path.as_ref();
    let body = pixels
        .iter()
        .flat_map(|&(x, y)| [x, y])
        .flat_map(i64::to_le_bytes)
        .collect();
    fs::write(path, encode("<i8", pixels.len(), body)).map_err(|e| npy_error(path, e.to_string()))
}

#[cfg(test)]
mod npy_tests {
    use super::*;
    use tempfile::tempdir;

    /// Hand-assembled file in the layout `numpy.save` produces.
    fn numpy_file(descr: &str, shape: &str, body: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            descr, shape
        );
        while (10 + header.len() + 1) % 64 != 0 {
            header.push(' ');
        }
        header.push('\n');
        let mut out = b"\x93NUMPY\x01\x00".to_vec();
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn test_header_alignment() {
        let bytes = encode("<f8", 3, vec![0; 48]);
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        assert_eq!(bytes[10 + header_len - 1], b'\n');
    }

    #[test]
    fn test_write_then_read_float_points() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1234_vesicle_0_inner.npy");
        let points = vec![Point::new(1.5, -2.0), Point::new(1e6, 0.25)];
        write_points(&path, &points).unwrap();
        assert_eq!(read_points(&path).unwrap(), points);
    }

    #[test]
    fn test_integer_dtypes() {
        let body: Vec<u8> = [3i32, 4, -5, 6].iter().flat_map(|v| v.to_le_bytes()).collect();
        let points = parse_points(&numpy_file("<i4", "(2, 2)", &body)).unwrap();
        assert_eq!(points, vec![Point::new(3.0, 4.0), Point::new(-5.0, 6.0)]);

        let body: Vec<u8> = vec![7, 8, 255, 0];
        let points = parse_points(&numpy_file("|u1", "(2, 2)", &body)).unwrap();
        assert_eq!(points, vec![Point::new(7.0, 8.0), Point::new(255.0, 0.0)]);

        let dir = tempdir().unwrap();
        let path = dir.path().join("pixels.npy");
        write_pixels(&path, &[(10, 20), (-1, 3)]).unwrap();
        assert_eq!(
            read_points(&path).unwrap(),
            vec![Point::new(10.0, 20.0), Point::new(-1.0, 3.0)]
        );
    }

    #[test]
    fn test_rejects_bad_files() {
        assert!(parse_points(b"not a numpy file").is_err());
        assert!(parse_points(&numpy_file("<f8", "(2, 3)", &[0; 48])).is_err());
        assert!(parse_points(&numpy_file(">f8", "(1, 2)", &[0; 16])).is_err());
        assert!(parse_points(&numpy_file("<f8", "(4, 2)", &[0; 16])).is_err());

        let missing = read_points("/no/such/file.npy").unwrap_err();
        assert!(matches!(missing, RepickError::Npy { .. }));
    }

    #[test]
    fn test_oversized_shape_is_an_error() {
        // 2^62 rows of 16 bytes overflow usize.
        let err = parse_points(&numpy_file("<f8", "(4611686018427387904, 2)", &[0; 16]))
            .unwrap_err();
        assert!(err.contains("too large"), "{}", err);
    }

    #[test]
    fn test_empty_array() {
        assert!(parse_points(&numpy_file("<f8", "(0, 2)", &[])).unwrap().is_empty());
    }
}
